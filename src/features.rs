use std::collections::HashMap;

use lazy_static::*;
use serde::{Deserialize, Serialize};

/// Fixed vocabulary of findings, in id order.
pub const FEATURES: &[(&str, u32)] = &[
    ("Cephalization", 1),
    ("Artery", 2),
    ("Heart", 3),
    ("Kerley", 4),
    ("Bronchus", 5),
    ("Effusion", 6),
    ("Bat", 7),
    ("Infiltrate", 8),
    ("Cuffing", 9),
    ("Lungs", 10),
];

/// Sentinel finding used for "No edema" images without feature rows.
pub const NO_FINDINGS: &str = "No_findings";

/// Findings annotated with lines rather than polygons
pub const LINELIKE_FINDINGS: &[&str] = &["Kerley", "Cephalization"];

pub const LUNGS: &str = "Lungs";

lazy_static! {
    pub static ref FEATURE_MAP: HashMap<&'static str, u32> = FEATURES.iter().cloned().collect();
    pub static ref FEATURE_NAMES: HashMap<u32, &'static str> =
        FEATURES.iter().map(|(name, id)| (*id, *name)).collect();
    /// All edema findings for which masks are prepared.
    pub static ref EDEMA_FINDINGS: Vec<&'static str> = FEATURES
        .iter()
        .map(|(name, _)| *name)
        .filter(|name| *name != "Heart" && *name != LUNGS)
        .collect();
}

pub fn feature_id(name: &str) -> Option<u32> {
    FEATURE_MAP.get(name).copied()
}

pub fn feature_name(id: u32) -> Option<&'static str> {
    FEATURE_NAMES.get(&id).copied()
}

pub fn is_edema_finding(name: &str) -> bool {
    EDEMA_FINDINGS.iter().any(|f| *f == name)
}

/// `No_findings` followed by every edema finding; the order of masks built for an image.
pub fn mask_finding_names() -> Vec<&'static str> {
    std::iter::once(NO_FINDINGS)
        .chain(EDEMA_FINDINGS.iter().copied())
        .collect()
}

/// Centre and size of a box given by its corners
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxSizes {
    pub xc: i64,
    pub yc: i64,
    pub width: i64,
    pub height: i64,
    pub area: i64,
}

pub fn get_box_sizes(x1: i64, y1: i64, x2: i64, y2: i64) -> BoxSizes {
    let width = x2 - x1;
    let height = y2 - y1;
    BoxSizes {
        xc: x1 + width / 2,
        yc: y1 + height / 2,
        width,
        height,
        area: width * height,
    }
}
