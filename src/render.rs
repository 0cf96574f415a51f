//! Path visualizer: min-max normalizes a drive onto a drawing surface.
//!
//! [`project`] is the pure geometry; [`draw`] puts the result on a [`Surface`].

use crate::{
    config::Render,
    model::{GeoPath, IncidentEvent},
};
use anyhow::{Context, Result, anyhow};
use image::{Rgba, RgbaImage};
use std::fmt::Write;
use std::path::Path;

/// Span substituted when every fix shares a latitude or longitude (degrees).
pub const MIN_SPAN: f64 = 0.001;

/// Largest raster side, in device pixels.
pub const MAX_DEVICE_SIDE: u32 = 16_384;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pixel {
    pub x: f64,
    pub y: f64,
}

/// Logical drawing area, before device-pixel scaling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
    pub padding: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Sketch {
    /// Fewer than two fixes: nothing is drawn and the caller shows its own placeholder.
    Untracked,
    Drawn {
        polyline: Vec<Pixel>,
        markers: Vec<Pixel>,
    },
}

impl Sketch {
    pub fn is_untracked(&self) -> bool {
        matches!(self, Sketch::Untracked)
    }
}

pub fn project(path: &GeoPath, incidents: &[IncidentEvent], viewport: &Viewport) -> Sketch {
    if !path.is_tracked() {
        return Sketch::Untracked;
    }
    let Some(b) = path.bounds() else {
        return Sketch::Untracked;
    };

    let lat_span = span(b.max_lat - b.min_lat);
    let lng_span = span(b.max_lng - b.min_lng);
    let width = viewport.width.max(0.0);
    let height = viewport.height.max(0.0);
    let pad_x = viewport.padding.max(0.0).min(width / 2.0);
    let pad_y = viewport.padding.max(0.0).min(height / 2.0);
    let inner_w = width - 2.0 * pad_x;
    let inner_h = height - 2.0 * pad_y;

    let to_pixel = |lat: f64, lng: f64| Pixel {
        x: pad_x + (lng - b.min_lng) / lng_span * inner_w,
        y: height - (pad_y + (lat - b.min_lat) / lat_span * inner_h),
    };

    let polyline = path
        .points()
        .iter()
        .map(|p| {
            let px = to_pixel(p.latitude, p.longitude);
            Pixel {
                x: px.x.max(pad_x).min(width - pad_x),
                y: px.y.max(pad_y).min(height - pad_y),
            }
        })
        .collect();
    // Incidents keep their true position; the surface clips anything outside it.
    let markers = incidents
        .iter()
        .map(|i| to_pixel(i.location.latitude, i.location.longitude))
        .collect();

    Sketch::Drawn { polyline, markers }
}

fn span(range: f64) -> f64 {
    if range.is_finite() && range > 0.0 {
        range
    } else {
        MIN_SPAN
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderStyle {
    pub viewport: Viewport,
    pub device_pixel_ratio: f64,
    pub line_width: f64,
    pub marker_radius: f64,
    pub background: Rgba<u8>,
    pub path_color: Rgba<u8>,
    pub marker_color: Rgba<u8>,
}

impl RenderStyle {
    pub fn from_config(cfg: &Render) -> Result<Self> {
        Ok(Self {
            viewport: Viewport {
                width: cfg.width as f64,
                height: cfg.height as f64,
                padding: cfg.padding,
            },
            device_pixel_ratio: checked_dpr(cfg.device_pixel_ratio)?,
            line_width: cfg.line_width,
            marker_radius: cfg.marker_radius,
            background: parse_hex_color(&cfg.background)?,
            path_color: parse_hex_color(&cfg.path_color)?,
            marker_color: parse_hex_color(&cfg.marker_color)?,
        })
    }
}

fn checked_dpr(dpr: f64) -> Result<f64> {
    if !dpr.is_finite() || dpr <= 0.0 {
        return Err(anyhow!("invalid device_pixel_ratio: {dpr}"));
    }
    Ok(dpr)
}

pub fn parse_hex_color(s: &str) -> Result<Rgba<u8>> {
    let hex = s.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(anyhow!("invalid color (expected #rrggbb): {s}"));
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16);
    Ok(Rgba([channel(0)?, channel(2)?, channel(4)?, 255]))
}

/// A 2-D drawing target in logical coordinates.
pub trait Surface {
    fn clear(&mut self, color: Rgba<u8>);
    fn stroke_polyline(&mut self, points: &[Pixel], width: f64, color: Rgba<u8>);
    fn fill_circle(&mut self, center: Pixel, radius: f64, color: Rgba<u8>);
}

/// Clears the surface and draws the path, then incident markers on top of it.
pub fn draw(
    surface: &mut dyn Surface,
    path: &GeoPath,
    incidents: &[IncidentEvent],
    style: &RenderStyle,
) -> Sketch {
    surface.clear(style.background);
    let sketch = project(path, incidents, &style.viewport);
    if let Sketch::Drawn { polyline, markers } = &sketch {
        surface.stroke_polyline(polyline, style.line_width, style.path_color);
        for m in markers {
            surface.fill_circle(*m, style.marker_radius, style.marker_color);
        }
    }
    sketch
}

/// RGBA pixel buffer sized `logical * device_pixel_ratio`.
pub struct RasterSurface {
    image: RgbaImage,
    scale: f64,
}

impl RasterSurface {
    pub fn new(viewport: &Viewport, device_pixel_ratio: f64) -> Result<Self> {
        let scale = checked_dpr(device_pixel_ratio)?;
        let side = |logical: f64, name: &str| -> Result<u32> {
            let device = (logical * scale).round().max(1.0);
            if !device.is_finite() || device > MAX_DEVICE_SIDE as f64 {
                return Err(anyhow!(
                    "raster {name} {logical} x dpr {scale} exceeds {MAX_DEVICE_SIDE} device pixels"
                ));
            }
            Ok(device as u32)
        };
        let w = side(viewport.width, "width")?;
        let h = side(viewport.height, "height")?;
        Ok(Self {
            image: RgbaImage::new(w, h),
            scale,
        })
    }

    pub fn for_style(style: &RenderStyle) -> Result<Self> {
        Self::new(&style.viewport, style.device_pixel_ratio)
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn save_png(&self, path: &Path) -> Result<()> {
        self.image
            .save_with_format(path, image::ImageFormat::Png)
            .with_context(|| format!("writing PNG: {}", path.display()))
    }

    /// Fills every device pixel whose center lies within `radius` of `center`.
    fn disc(&mut self, center: Pixel, radius: f64, color: Rgba<u8>) {
        let cx = center.x * self.scale;
        let cy = center.y * self.scale;
        let r = radius * self.scale;
        if !(cx.is_finite() && cy.is_finite() && r.is_finite()) || r <= 0.0 {
            return;
        }
        let (w, h) = (self.image.width() as f64, self.image.height() as f64);
        let x0 = (cx - r).floor().max(0.0);
        let x1 = (cx + r).ceil().min(w - 1.0);
        let y0 = (cy - r).floor().max(0.0);
        let y1 = (cy + r).ceil().min(h - 1.0);
        if x0 > x1 || y0 > y1 {
            return;
        }
        for y in y0 as u32..=y1 as u32 {
            for x in x0 as u32..=x1 as u32 {
                let dx = x as f64 + 0.5 - cx;
                let dy = y as f64 + 0.5 - cy;
                if dx * dx + dy * dy <= r * r {
                    self.image.put_pixel(x, y, color);
                }
            }
        }
    }
}

impl Surface for RasterSurface {
    fn clear(&mut self, color: Rgba<u8>) {
        for px in self.image.pixels_mut() {
            *px = color;
        }
    }

    fn stroke_polyline(&mut self, points: &[Pixel], width: f64, color: Rgba<u8>) {
        let radius = (width / 2.0).max(0.5);
        let Some(first) = points.first() else {
            return;
        };
        self.disc(*first, radius, color);
        // Round joins and caps: stamp discs along each segment at sub-pixel spacing.
        for seg in points.windows(2) {
            let (a, b) = (seg[0], seg[1]);
            let len = ((b.x - a.x).powi(2) + (b.y - a.y).powi(2)).sqrt() * self.scale;
            let steps = (len / 0.5).ceil().max(1.0) as u32;
            for i in 1..=steps {
                let t = i as f64 / steps as f64;
                let p = Pixel {
                    x: a.x + (b.x - a.x) * t,
                    y: a.y + (b.y - a.y) * t,
                };
                self.disc(p, radius, color);
            }
        }
    }

    fn fill_circle(&mut self, center: Pixel, radius: f64, color: Rgba<u8>) {
        self.disc(center, radius, color);
    }
}

/// Scalable vector output; coordinates stay logical and the viewBox carries the scale.
pub struct SvgSurface {
    width: f64,
    height: f64,
    scale: f64,
    body: String,
}

impl SvgSurface {
    pub fn new(viewport: &Viewport, device_pixel_ratio: f64) -> Self {
        Self {
            width: viewport.width,
            height: viewport.height,
            scale: if device_pixel_ratio > 0.0 {
                device_pixel_ratio
            } else {
                1.0
            },
            body: String::new(),
        }
    }

    pub fn for_style(style: &RenderStyle) -> Self {
        Self::new(&style.viewport, style.device_pixel_ratio)
    }

    pub fn finish(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{:.0}" height="{:.0}" viewBox="0 0 {:.2} {:.2}">"#,
            self.width * self.scale,
            self.height * self.scale,
            self.width,
            self.height
        );
        out.push_str(&self.body);
        out.push_str("</svg>\n");
        out
    }
}

fn css(c: Rgba<u8>) -> String {
    format!("#{:02x}{:02x}{:02x}", c[0], c[1], c[2])
}

impl Surface for SvgSurface {
    fn clear(&mut self, color: Rgba<u8>) {
        self.body.clear();
        let _ = writeln!(
            self.body,
            r#"  <rect x="0" y="0" width="{:.2}" height="{:.2}" fill="{}"/>"#,
            self.width,
            self.height,
            css(color)
        );
    }

    fn stroke_polyline(&mut self, points: &[Pixel], width: f64, color: Rgba<u8>) {
        let pts = points
            .iter()
            .map(|p| format!("{:.2},{:.2}", p.x, p.y))
            .collect::<Vec<_>>()
            .join(" ");
        let _ = writeln!(
            self.body,
            r#"  <polyline points="{}" fill="none" stroke="{}" stroke-width="{:.2}" stroke-linejoin="round" stroke-linecap="round"/>"#,
            pts,
            css(color),
            width
        );
    }

    fn fill_circle(&mut self, center: Pixel, radius: f64, color: Rgba<u8>) {
        if !(center.x.is_finite() && center.y.is_finite()) {
            return;
        }
        let _ = writeln!(
            self.body,
            r#"  <circle cx="{:.2}" cy="{:.2}" r="{:.2}" fill="{}"/>"#,
            center.x,
            center.y,
            radius,
            css(color)
        );
    }
}
