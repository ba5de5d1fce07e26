//! Electrode positions.
//!
//! `Montage::standard_1010` places the 10-10 system on an idealised spherical
//! head: midline sites sit on the nasion-inion arc, the 10% ring (Fp1, F7,
//! T7, P7, O1, ...) lies 72° from the vertex, and the sites in between follow
//! the great circle from the midline to the ring. `Montage::from_loc_file`
//! reads the EEGLAB `.loc` files the Tsinghua datasets ship with.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use log::debug;

use crate::error::{DatasetError, Result};

/// Head radius in metres used to scale unit-sphere positions
pub const HEAD_RADIUS: f64 = 0.095;

// 10% 环相对头顶的极角（度）
const RING_POLAR: f64 = 72.0;

/// Row prefix, midline angle from Cz (anterior positive) and the azimuth of
/// the row's ring electrode measured from the nose.
const ROWS: [(&str, f64, f64); 13] = [
    ("FP", 72.0, 18.0),
    ("AF", 54.0, 36.0),
    ("F", 36.0, 54.0),
    ("FC", 18.0, 72.0),
    ("FT", 18.0, 72.0),
    ("C", 0.0, 90.0),
    ("T", 0.0, 90.0),
    ("CP", -18.0, 108.0),
    ("TP", -18.0, 108.0),
    ("P", -36.0, 126.0),
    ("PO", -54.0, 144.0),
    ("O", -72.0, 162.0),
    ("I", -90.0, 180.0),
];

/// Sites outside the 10-10 grid: (name, polar angle, azimuth, side)
const EXTRA_SITES: [(&str, f64, f64, f64); 5] = [
    ("NZ", 90.0, 0.0, 0.0),
    ("M1", 100.0, 108.0, -1.0),
    ("M2", 100.0, 108.0, 1.0),
    ("CB1", 100.0, 160.0, -1.0),
    ("CB2", 100.0, 160.0, 1.0),
];

/// A named mapping from channel name to 3D position (metres, x right, y
/// anterior, z up). Lookups ignore case.
#[derive(Debug, Clone)]
pub struct Montage {
    name: String,
    positions: BTreeMap<String, [f64; 3]>,
}

impl Montage {
    pub fn new(name: &str) -> Self {
        Montage {
            name: name.to_string(),
            positions: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn insert(&mut self, channel: &str, position: [f64; 3]) {
        self.positions.insert(channel.to_uppercase(), position);
    }

    /// Position of `channel`, matched case-insensitively
    pub fn position(&self, channel: &str) -> Option<[f64; 3]> {
        self.positions.get(&channel.to_uppercase()).copied()
    }

    /// Upper-cased channel names in sorted order
    pub fn ch_names(&self) -> impl Iterator<Item = &str> {
        self.positions.keys().map(|k| k.as_str())
    }

    /// The 10-10 system on a spherical head of radius `HEAD_RADIUS`, plus
    /// nasion, inion, mastoid (M1/M2) and cerebellar (CB1/CB2) sites.
    pub fn standard_1010() -> Self {
        let mut montage = Montage::new("standard_1010");

        for &(row, midline_angle, ring_azimuth) in ROWS.iter() {
            let midline = midline_point(midline_angle);
            let lateral_rows = !matches!(row, "FT" | "T" | "TP");
            let edge_row = matches!(row, "FP" | "O" | "I");
            let temporal_twin = matches!(row, "FC" | "C" | "CP");

            if lateral_rows {
                montage.insert(&format!("{}z", row), scale(midline));
            }
            if row == "I" {
                continue;
            }

            for number in 1..=10usize {
                let side = if number % 2 == 1 { -1.0 } else { 1.0 };
                let column = if number % 2 == 1 { number } else { number - 1 };
                // FT/T/TP 只有 7-10 列；Fp/O 只有 1/2 列
                if !lateral_rows && column < 7 {
                    continue;
                }
                if (edge_row && column > 1) || (temporal_twin && column >= 7) {
                    continue;
                }

                let ring = sphere_point(RING_POLAR, ring_azimuth, side);
                let fraction = if edge_row {
                    1.0
                } else {
                    (column + 1) as f64 / 8.0
                };
                let point = slerp(midline, ring, fraction);
                montage.insert(&format!("{}{}", row, number), scale(point));
            }
        }

        for &(name, polar, azimuth, side) in EXTRA_SITES.iter() {
            montage.insert(name, scale(sphere_point(polar, azimuth, side)));
        }

        montage
    }

    /// Reads an EEGLAB `.loc` file: `index theta radius label` per line,
    /// theta in degrees clockwise from the nose and radius 0.5 at the
    /// equator.
    pub fn from_loc_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(&path).map_err(|e| {
            DatasetError::FileNotFound(format!("{}: {}", path.as_ref().display(), e))
        })?;
        let name = path
            .as_ref()
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("loc");
        Self::from_loc_str(name, &text)
    }

    pub fn from_loc_str(name: &str, text: &str) -> Result<Self> {
        let mut montage = Montage::new(name);

        for (line_no, line) in text.lines().enumerate() {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.is_empty() {
                continue;
            }
            if fields.len() < 4 {
                return Err(DatasetError::InvalidFormat(format!(
                    "Line {} of {} has {} columns, expected 4",
                    line_no + 1,
                    name,
                    fields.len()
                )));
            }

            let parse = |s: &str| {
                s.parse::<f64>().map_err(|_| {
                    DatasetError::InvalidFormat(format!(
                        "Line {} of {}: '{}' is not a number",
                        line_no + 1,
                        name,
                        s
                    ))
                })
            };
            let theta = parse(fields[1])?;
            let radius = parse(fields[2])?;
            let label = fields[3].trim_end_matches('.');

            let polar = radius * 180.0;
            montage.insert(label, scale(sphere_point(polar, theta.abs(), theta.signum())));
        }

        debug!("Read {} positions from {}", montage.len(), name);
        Ok(montage)
    }
}

fn midline_point(angle: f64) -> [f64; 3] {
    let a = angle.to_radians();
    [0.0, a.sin(), a.cos()]
}

/// Unit vector at `polar` degrees from the vertex and `azimuth` degrees from
/// the nose; `side` is -1 for left, 1 for right, 0 on the midline.
fn sphere_point(polar: f64, azimuth: f64, side: f64) -> [f64; 3] {
    let p = polar.to_radians();
    let a = azimuth.to_radians();
    [side * p.sin() * a.sin(), p.sin() * a.cos(), p.cos()]
}

/// Great-circle interpolation; `t > 1` extrapolates past `b`
fn slerp(a: [f64; 3], b: [f64; 3], t: f64) -> [f64; 3] {
    let dot = (a[0] * b[0] + a[1] * b[1] + a[2] * b[2]).clamp(-1.0, 1.0);
    let omega = dot.acos();
    if omega.abs() < 1e-12 {
        return a;
    }
    let wa = ((1.0 - t) * omega).sin() / omega.sin();
    let wb = (t * omega).sin() / omega.sin();
    [
        wa * a[0] + wb * b[0],
        wa * a[1] + wb * b[1],
        wa * a[2] + wb * b[2],
    ]
}

fn scale(point: [f64; 3]) -> [f64; 3] {
    [point[0] * HEAD_RADIUS, point[1] * HEAD_RADIUS, point[2] * HEAD_RADIUS]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: [f64; 3], b: [f64; 3]) -> bool {
        a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() < 1e-9)
    }

    fn norm(p: [f64; 3]) -> f64 {
        (p[0] * p[0] + p[1] * p[1] + p[2] * p[2]).sqrt()
    }

    #[test]
    fn test_standard_positions() {
        let montage = Montage::standard_1010();
        let cz = montage.position("Cz").unwrap();
        assert!(close(cz, [0.0, 0.0, HEAD_RADIUS]));

        // 左侧为负 x，右侧为正 x
        let c3 = montage.position("C3").unwrap();
        let c4 = montage.position("C4").unwrap();
        assert!(c3[0] < 0.0 && c4[0] > 0.0);
        assert!((c3[0] + c4[0]).abs() < 1e-12);

        let fpz = montage.position("FPZ").unwrap();
        assert!(fpz[1] > 0.0);
        let oz = montage.position("oz").unwrap();
        assert!(oz[1] < 0.0);
    }

    #[test]
    fn test_positions_on_sphere() {
        let montage = Montage::standard_1010();
        for name in ["FP1", "AF3", "F5", "FT7", "T8", "CP6", "P1", "PO7", "O2", "M1", "CB2"] {
            let position = montage.position(name).unwrap_or_else(|| panic!("missing {}", name));
            assert!((norm(position) - HEAD_RADIUS).abs() < 1e-9, "{} off sphere", name);
        }
    }

    #[test]
    fn test_c3_halfway_to_t7() {
        let montage = Montage::standard_1010();
        let c3 = montage.position("C3").unwrap();
        // C3 与头顶夹角 36°
        let polar = (c3[2] / HEAD_RADIUS).acos().to_degrees();
        assert!((polar - 36.0).abs() < 1e-9);
    }

    #[test]
    fn test_tsinghua_channels_are_covered() {
        let montage = Montage::standard_1010();
        for name in crate::tsinghua::SCALP_CHANNELS.iter().chain(["M1", "M2", "CB1", "CB2"].iter()) {
            assert!(montage.position(name).is_some(), "{} has no position", name);
        }
        assert!(montage.position("STI 014").is_none());
    }

    #[test]
    fn test_from_loc_str() {
        let text = "1\t-18\t0.4\tFp1\n2\t90\t0.4\tT8\n\n3\t0\t0\tCz\n";
        let montage = Montage::from_loc_str("test", text).unwrap();
        assert_eq!(montage.len(), 3);
        assert!(close(montage.position("cz").unwrap(), [0.0, 0.0, HEAD_RADIUS]));

        let t8 = montage.position("T8").unwrap();
        assert!(t8[0] > 0.0);
        let fp1 = montage.position("FP1").unwrap();
        assert!(fp1[0] < 0.0 && fp1[1] > 0.0);
        // EEGLAB 极坐标与内置布局一致
        let builtin = Montage::standard_1010().position("FP1").unwrap();
        assert!(close(fp1, builtin));
    }

    #[test]
    fn test_from_loc_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("64-channels.loc");
        fs::write(&path, "1\t0\t0.5\tFpz\n2\t180\t0.5\tOz.\n").unwrap();

        let montage = Montage::from_loc_file(&path).unwrap();
        assert_eq!(montage.name(), "64-channels");
        assert_eq!(montage.ch_names().collect::<Vec<_>>(), vec!["FPZ", "OZ"]);
        let oz = montage.position("Oz").unwrap();
        assert!(close(oz, [0.0, -HEAD_RADIUS, 0.0]));

        assert!(Montage::from_loc_file(dir.path().join("missing.loc")).is_err());
    }

    #[test]
    fn test_from_loc_str_bad_line() {
        assert!(Montage::from_loc_str("bad", "1 20 0.4\n").is_err());
        assert!(Montage::from_loc_str("bad", "1 x 0.4 Fz\n").is_err());
    }
}
