//! JPEG quality estimation from quantization tables, using the IJG scaling of
//! the Annex K reference tables.

use crate::probe::jpeg::QuantTable;

const STD_LUMINANCE: [u16; 64] = [
    16, 11, 10, 16, 24, 40, 51, 61, //
    12, 12, 14, 19, 26, 58, 60, 55, //
    14, 13, 16, 24, 40, 57, 69, 56, //
    14, 17, 22, 29, 51, 87, 80, 62, //
    18, 22, 37, 56, 68, 109, 103, 77, //
    24, 35, 55, 64, 81, 104, 113, 92, //
    49, 64, 78, 87, 103, 121, 120, 101, //
    72, 92, 95, 98, 112, 100, 103, 99,
];

const STD_CHROMINANCE: [u16; 64] = [
    17, 18, 24, 47, 99, 99, 99, 99, //
    18, 21, 26, 66, 99, 99, 99, 99, //
    24, 26, 56, 99, 99, 99, 99, 99, //
    47, 66, 99, 99, 99, 99, 99, 99, //
    99, 99, 99, 99, 99, 99, 99, 99, //
    99, 99, 99, 99, 99, 99, 99, 99, //
    99, 99, 99, 99, 99, 99, 99, 99, //
    99, 99, 99, 99, 99, 99, 99, 99,
];

/// How far around the estimate to search for an exact standard match.
const MATCH_WINDOW: i32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityEstimate {
    pub quality: u8,
    /// Tables are the reference tables scaled to `quality`.
    pub standard: bool,
}

/// Reference table scaled to `quality` the way libjpeg does (baseline clamp).
pub fn scaled_table(reference: &[u16; 64], quality: u8) -> [u16; 64] {
    let q = quality.clamp(1, 100) as u32;
    let scale = if q < 50 { 5000 / q } else { 200 - q * 2 };
    let mut out = [0u16; 64];
    for (dst, src) in out.iter_mut().zip(reference.iter()) {
        *dst = ((*src as u32 * scale + 50) / 100).clamp(1, 255) as u16;
    }
    out
}

pub fn estimate_quality(tables: &[QuantTable]) -> Option<QualityEstimate> {
    let luma = tables.iter().find(|t| t.id == 0).or_else(|| tables.first())?;
    let chroma = tables.iter().find(|t| t.id == 1);

    let sum: u32 = luma.values.iter().map(|v| *v as u32).sum();
    let reference: u32 = STD_LUMINANCE.iter().map(|v| *v as u32).sum();
    if sum == 0 {
        return None;
    }
    let s = sum as f64 * 100.0 / reference as f64;
    let raw = if s <= 100.0 { (200.0 - s) / 2.0 } else { 5000.0 / s };
    let estimate = raw.round().clamp(1.0, 100.0) as i32;

    for candidate in (estimate - MATCH_WINDOW)..=(estimate + MATCH_WINDOW) {
        if !(1..=100).contains(&candidate) {
            continue;
        }
        let q = candidate as u8;
        let luma_ok = luma.values[..] == scaled_table(&STD_LUMINANCE, q)[..];
        let chroma_ok = chroma
            .map(|t| t.values[..] == scaled_table(&STD_CHROMINANCE, q)[..])
            .unwrap_or(true);
        if luma_ok && chroma_ok {
            return Some(QualityEstimate {
                quality: q,
                standard: true,
            });
        }
    }

    Some(QualityEstimate {
        quality: estimate as u8,
        standard: false,
    })
}
