use dec_drive::{
    config::Config,
    model::{GeoPath, GeoPoint, IncidentEvent},
    render::{
        Pixel, RasterSurface, RenderStyle, Sketch, Surface, SvgSurface, Viewport, draw, project,
    },
};
use image::Rgba;

fn viewport() -> Viewport {
    Viewport {
        width: 300.0,
        height: 120.0,
        padding: 20.0,
    }
}

fn path(coords: &[(f64, f64)]) -> GeoPath {
    coords
        .iter()
        .enumerate()
        .map(|(i, (lat, lng))| GeoPoint::new(*lat, *lng, i as i64))
        .collect::<Vec<_>>()
        .into()
}

fn incident(lat: f64, lng: f64) -> IncidentEvent {
    IncidentEvent {
        id: format!("{lat}:{lng}"),
        location: GeoPoint::new(lat, lng, 0),
        note: "x".into(),
        captured_at_millis: 0,
    }
}

fn drawn(sketch: Sketch) -> (Vec<Pixel>, Vec<Pixel>) {
    match sketch {
        Sketch::Drawn { polyline, markers } => (polyline, markers),
        Sketch::Untracked => panic!("expected a drawn sketch"),
    }
}

#[test]
fn short_paths_are_untracked() {
    let vp = viewport();
    assert!(project(&GeoPath::new(), &[], &vp).is_untracked());
    assert!(project(&path(&[(44.4, 8.9)]), &[incident(44.4, 8.9)], &vp).is_untracked());
}

#[test]
fn projected_points_stay_inside_padding() {
    let vp = viewport();
    let p = path(&[
        (44.4183, 8.9516),
        (44.4190, 8.9531),
        (44.4199, 8.9544),
        (44.4211, 8.9552),
        (44.4224, 8.9549),
    ]);
    let (polyline, _) = drawn(project(&p, &[], &vp));
    assert_eq!(polyline.len(), 5);
    for px in polyline {
        assert!(px.x >= 20.0 && px.x <= 280.0, "x out of bounds: {}", px.x);
        assert!(px.y >= 20.0 && px.y <= 100.0, "y out of bounds: {}", px.y);
    }
}

#[test]
fn extremes_land_on_the_padding_edges() {
    let vp = viewport();
    let p = path(&[(45.0, 9.0), (45.002, 9.002)]);
    let (polyline, _) = drawn(project(&p, &[], &vp));
    // South-west corner is bottom-left, north-east is top-right.
    assert!((polyline[0].x - 20.0).abs() < 1e-9);
    assert!((polyline[0].y - 100.0).abs() < 1e-9);
    assert!((polyline[1].x - 280.0).abs() < 1e-9);
    assert!((polyline[1].y - 20.0).abs() < 1e-9);
}

#[test]
fn higher_latitude_is_drawn_higher() {
    let vp = viewport();
    let p = path(&[(44.0, 8.0), (44.5, 8.1), (44.2, 8.2), (44.9, 8.3)]);
    let (polyline, _) = drawn(project(&p, &[], &vp));
    let pts = p.points();
    for i in 0..pts.len() {
        for j in 0..pts.len() {
            if pts[i].latitude > pts[j].latitude {
                assert!(polyline[i].y < polyline[j].y);
            }
        }
    }
}

#[test]
fn degenerate_paths_render_finite_coordinates() {
    let vp = viewport();
    let cases = [
        path(&[(44.4, 8.9), (44.4, 8.9), (44.4, 8.9)]),
        path(&[(44.4, 8.9), (44.4, 8.95), (44.4, 9.0)]),
        path(&[(44.4, 8.9), (44.5, 8.9)]),
    ];
    for p in &cases {
        let (polyline, markers) = drawn(project(p, &[incident(44.4, 8.9)], &vp));
        for px in polyline.iter().chain(markers.iter()) {
            assert!(px.x.is_finite() && px.y.is_finite());
            assert!(px.x >= 20.0 && px.x <= 280.0);
            assert!(px.y >= 20.0 && px.y <= 100.0);
        }
    }
}

#[test]
fn padding_larger_than_surface_is_capped() {
    let vp = Viewport {
        width: 30.0,
        height: 10.0,
        padding: 20.0,
    };
    let (polyline, _) = drawn(project(&path(&[(1.0, 1.0), (2.0, 2.0)]), &[], &vp));
    for px in polyline {
        assert_eq!(px.x, 15.0);
        assert_eq!(px.y, 5.0);
    }
}

#[test]
fn markers_use_incident_locations() {
    let vp = viewport();
    let p = path(&[(45.0, 9.0), (45.002, 9.002)]);
    let (_, markers) = drawn(project(&p, &[incident(45.001, 9.001)], &vp));
    assert_eq!(markers.len(), 1);
    assert!((markers[0].x - 150.0).abs() < 1e-6);
    assert!((markers[0].y - 60.0).abs() < 1e-6);
}

#[derive(Default)]
struct CallLog(Vec<&'static str>);

impl Surface for CallLog {
    fn clear(&mut self, _color: Rgba<u8>) {
        self.0.push("clear");
    }
    fn stroke_polyline(&mut self, _points: &[Pixel], _width: f64, _color: Rgba<u8>) {
        self.0.push("line");
    }
    fn fill_circle(&mut self, _center: Pixel, _radius: f64, _color: Rgba<u8>) {
        self.0.push("marker");
    }
}

#[test]
fn markers_are_drawn_after_the_line() {
    let style = RenderStyle::from_config(&Config::default().render).unwrap();
    let mut log = CallLog::default();
    let p = path(&[(45.0, 9.0), (45.002, 9.002)]);
    draw(&mut log, &p, &[incident(45.0, 9.0), incident(45.002, 9.002)], &style);
    assert_eq!(log.0, vec!["clear", "line", "marker", "marker"]);

    let mut log = CallLog::default();
    let sketch = draw(&mut log, &path(&[(45.0, 9.0)]), &[incident(45.0, 9.0)], &style);
    assert!(sketch.is_untracked());
    assert_eq!(log.0, vec!["clear"]);
}

#[test]
fn raster_output_is_idempotent_and_dpr_scaled() {
    let mut cfg = Config::default().render;
    cfg.device_pixel_ratio = 2.0;
    let style = RenderStyle::from_config(&cfg).unwrap();
    let p = path(&[(45.0, 9.0), (45.001, 9.002), (45.002, 9.001)]);
    let incidents = [incident(45.001, 9.002), incident(0.0, 0.0)];

    let mut surface = RasterSurface::for_style(&style).unwrap();
    draw(&mut surface, &p, &incidents, &style);
    let first = surface.image().clone();
    draw(&mut surface, &p, &incidents, &style);
    assert_eq!(first.as_raw(), surface.image().as_raw());

    let mut other = RasterSurface::for_style(&style).unwrap();
    draw(&mut other, &p, &incidents, &style);
    assert_eq!(first.as_raw(), other.image().as_raw());

    assert_eq!(first.width(), cfg.width * 2);
    assert_eq!(first.height(), cfg.height * 2);

    // The marker sits on top of the path at its own location.
    let (_, markers) = drawn(project(&p, &incidents, &style.viewport));
    let m = markers[0];
    let px = first.get_pixel((m.x * 2.0) as u32, (m.y * 2.0) as u32);
    assert_eq!(*px, style.marker_color);
}

#[test]
fn svg_output_is_idempotent() {
    let style = RenderStyle::from_config(&Config::default().render).unwrap();
    let p = path(&[(45.0, 9.0), (45.002, 9.002)]);
    let mut a = SvgSurface::for_style(&style);
    draw(&mut a, &p, &[incident(45.001, 9.001)], &style);
    let first = a.finish();
    draw(&mut a, &p, &[incident(45.001, 9.001)], &style);
    assert_eq!(first, a.finish());
    assert!(first.contains("<polyline"));
    assert_eq!(first.matches("<circle").count(), 1);
}

#[test]
fn oversized_or_invalid_raster_is_rejected() {
    let vp = Viewport {
        width: 360.0,
        height: 128.0,
        padding: 20.0,
    };
    let err = RasterSurface::new(&vp, 1.0e6).err().unwrap();
    assert!(err.to_string().contains("exceeds"));
    assert!(RasterSurface::new(&vp, f64::NAN).is_err());
    assert!(RasterSurface::new(&vp, 0.0).is_err());

    let wide = Viewport {
        width: 20_000.0,
        ..vp
    };
    assert!(RasterSurface::new(&wide, 1.0).is_err());
    assert!(RasterSurface::new(&vp, 2.0).is_ok());

    let mut cfg = Config::default().render;
    cfg.device_pixel_ratio = f64::INFINITY;
    assert!(RenderStyle::from_config(&cfg).is_err());
    cfg.device_pixel_ratio = -1.0;
    assert!(RenderStyle::from_config(&cfg).is_err());
}
