//! The fixed evaluation rubric: categories of skills an instructor grades
//! during a drive.

use crate::model::{Grade, GradeMap};

#[derive(Debug, Clone, Copy)]
pub struct RubricItem {
    pub id: &'static str,
    pub label: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct RubricCategory {
    pub id: &'static str,
    pub title: &'static str,
    pub items: &'static [RubricItem],
}

const fn item(id: &'static str, label: &'static str) -> RubricItem {
    RubricItem { id, label }
}

pub const CATEGORIES: &[RubricCategory] = &[
    RubricCategory {
        id: "w1_posture",
        title: "Postura Guida",
        items: &[
            item("seat", "Sedile"),
            item("backrest", "Schienale"),
            item("headrest", "Poggiatesta"),
            item("mirrors", "Specchietti"),
            item("seatbelts", "Cinture"),
        ],
    },
    RubricCategory {
        id: "w1_gaze_steering",
        title: "Sguardo e Volante",
        items: &[
            item("anticipate_pull", "Anticipa tira"),
            item("ant_pull_incr_rel", "Ant tira incr ril"),
            item("curve", "Curva"),
            item("reverse", "Retromarcia"),
            item("lane_change", "Cambi corsia"),
            item("turn_right", "Svolta dx"),
            item("turn_left", "Svolta sx"),
            item("roundabout", "Rotatoria"),
            item("highway", "Autostrada"),
            item("w1_signs_1", "Lettura Segnaletica"),
        ],
    },
    RubricCategory {
        id: "w1_pedals",
        title: "Freno e Acceleratore",
        items: &[
            item("brake_descend", "Freno: Modulare in discesa"),
            item("brake_50_10", "Freno: 50/10"),
            item("brake_70_30", "Freno: 70/30"),
            item("acc_static", "ACC: Modulazione statica"),
            item("acc_30_70", "ACC: 30/70"),
        ],
    },
    RubricCategory {
        id: "w2_gears",
        title: "Cambio",
        items: &[
            item("gear_343", "3-4-3"),
            item("gear_121", "1-2-1"),
            item("gear_232", "2-3-2"),
            item("gear_454", "4-5-4"),
            item("gear_seq_up", "1-2-3-4-5"),
            item("gear_seq_down", "5-4-3-2-1"),
            item("gear_flat", "Pianura"),
            item("gear_uphill", "Salita"),
            item("gear_downhill", "Discesa"),
        ],
    },
    RubricCategory {
        id: "w2_clutch",
        title: "Frizione",
        items: &[
            item("clutch_engage", "Innesto"),
            item("clutch_start_bal", "Part. Salita-equilibrio"),
            item("clutch_start_fm", "Part. Sal. F.m."),
            item("clutch_maneuver", "Manovra"),
        ],
    },
    RubricCategory {
        id: "month2",
        title: "Tutti i comandi",
        items: &[
            item("m2_lane_change", "Cambi corsia"),
            item("m2_sv_dx", "SV DX"),
            item("m2_sv_sx", "SV SX"),
            item("m2_rotatories", "Rotatorie"),
            item("m2_highway", "Autostrada"),
            item("m2_park_pettine_dx", "Parcheggio a pettine dx"),
            item("m2_park_pettine_sx", "Parcheggio a pettine sx"),
            item("m2_reverse_straight", "Retromarcia dritta"),
            item("m2_u_turn", "Inversione a U"),
            item("m2_park_line_dx", "Parcheggio in linea dx"),
            item("m2_park_line_sx", "Parcheggio in linea sx"),
            item("m2_signs", "Lettura Segnaletica"),
        ],
    },
    RubricCategory {
        id: "exam_zones",
        title: "Zone Esame",
        items: &[
            item("zone_staglieno", "Staglieno-Marassi-Molassana"),
            item("zone_bolza", "Bolzaneto"),
            item("zone_sampi", "Sampierdarena"),
            item("zone_nervi", "Nervi-Quarto"),
            item("zone_sestri_erzelli", "Sestri P.-Erzelli"),
            item("zone_recco", "Recco"),
        ],
    },
];

pub fn find_item(id: &str) -> Option<(&'static RubricCategory, &'static RubricItem)> {
    CATEGORIES
        .iter()
        .find_map(|c| c.items.iter().find(|i| i.id == id).map(|i| (c, i)))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradedItem {
    pub category: &'static str,
    pub label: &'static str,
    pub grade: Grade,
}

/// Graded items in rubric order. Unset grades and unknown ids are skipped.
pub fn graded_items(grades: &GradeMap) -> Vec<GradedItem> {
    CATEGORIES
        .iter()
        .flat_map(|c| c.items.iter().map(move |i| (c, i)))
        .filter_map(|(c, i)| {
            let grade = *grades.get(i.id)?;
            grade.is_set().then_some(GradedItem {
                category: c.title,
                label: i.label,
                grade,
            })
        })
        .collect()
}
