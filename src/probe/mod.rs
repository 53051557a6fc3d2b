//! # Probe Module
//!
//! One structural pass over the subject during Loading. The resulting
//! [`ContainerProbe`] is shared read-only by applicability rules and evaluators.

pub mod jpeg;
pub mod png;
pub mod tiff;

use serde::Serialize;

use jpeg::JpegLayout;
use png::PngLayout;
use tiff::ExifData;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    Jpeg,
    Png,
    Gif,
    Bmp,
    Webp,
    Tiff,
    Unknown,
}

impl ContainerFormat {
    pub fn sniff(bytes: &[u8]) -> Self {
        if jpeg::is_jpeg(bytes) {
            ContainerFormat::Jpeg
        } else if bytes.starts_with(&png::PNG_SIGNATURE) {
            ContainerFormat::Png
        } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
            ContainerFormat::Gif
        } else if bytes.starts_with(b"BM") && bytes.len() >= 26 {
            ContainerFormat::Bmp
        } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
            ContainerFormat::Webp
        } else if bytes.starts_with(b"II*\0") || bytes.starts_with(b"MM\0*") {
            ContainerFormat::Tiff
        } else {
            ContainerFormat::Unknown
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ContainerFormat::Jpeg => "JPEG",
            ContainerFormat::Png => "PNG",
            ContainerFormat::Gif => "GIF",
            ContainerFormat::Bmp => "BMP",
            ContainerFormat::Webp => "WEBP",
            ContainerFormat::Tiff => "TIFF",
            ContainerFormat::Unknown => "unknown",
        }
    }

    pub fn mime_type(&self) -> Option<&'static str> {
        match self {
            ContainerFormat::Jpeg => Some("image/jpeg"),
            ContainerFormat::Png => Some("image/png"),
            ContainerFormat::Gif => Some("image/gif"),
            ContainerFormat::Bmp => Some("image/bmp"),
            ContainerFormat::Webp => Some("image/webp"),
            ContainerFormat::Tiff => Some("image/tiff"),
            ContainerFormat::Unknown => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ContainerProbe {
    pub format: ContainerFormat,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub bit_depth: Option<u8>,
    pub has_alpha: bool,
    pub jpeg: Option<JpegLayout>,
    pub png: Option<PngLayout>,
    /// Top-level EXIF for bare TIFF containers.
    pub tiff: Option<ExifData>,
}

impl ContainerProbe {
    pub fn inspect(bytes: &[u8]) -> Self {
        let format = ContainerFormat::sniff(bytes);
        let mut probe = ContainerProbe {
            format,
            width: None,
            height: None,
            bit_depth: None,
            has_alpha: false,
            jpeg: None,
            png: None,
            tiff: None,
        };

        match format {
            ContainerFormat::Jpeg => {
                if let Some(layout) = jpeg::parse_jpeg(bytes, 0) {
                    probe.width = layout.width;
                    probe.height = layout.height;
                    probe.bit_depth = layout.precision;
                    probe.jpeg = Some(layout);
                }
            }
            ContainerFormat::Png => {
                if let Some(layout) = png::parse_png(bytes) {
                    probe.width = layout.width;
                    probe.height = layout.height;
                    probe.bit_depth = layout.bit_depth;
                    probe.has_alpha = layout.has_alpha();
                    probe.png = Some(layout);
                }
            }
            ContainerFormat::Gif => {
                probe.width = bytes.get(6..8).map(|b| u16::from_le_bytes([b[0], b[1]]) as u32);
                probe.height = bytes.get(8..10).map(|b| u16::from_le_bytes([b[0], b[1]]) as u32);
                probe.bit_depth = Some(8);
            }
            ContainerFormat::Bmp => {
                let width = i32::from_le_bytes([bytes[18], bytes[19], bytes[20], bytes[21]]);
                let height = i32::from_le_bytes([bytes[22], bytes[23], bytes[24], bytes[25]]);
                probe.width = Some(width.unsigned_abs());
                probe.height = Some(height.unsigned_abs());
                probe.bit_depth = bytes.get(28..30).map(|b| u16::from_le_bytes([b[0], b[1]]) as u8);
                probe.has_alpha = probe.bit_depth == Some(32);
            }
            ContainerFormat::Webp => read_webp(bytes, &mut probe),
            ContainerFormat::Tiff => {
                if let Some(exif) = tiff::parse_exif(bytes) {
                    probe.width = exif.get(tiff::TAG_IMAGE_WIDTH).and_then(|v| v.as_u32());
                    probe.height = exif.get(tiff::TAG_IMAGE_HEIGHT).and_then(|v| v.as_u32());
                    probe.bit_depth = exif
                        .get(tiff::TAG_BITS_PER_SAMPLE)
                        .and_then(|v| v.as_u32())
                        .map(|v| v as u8);
                    probe.tiff = Some(exif);
                }
            }
            ContainerFormat::Unknown => {}
        }

        probe
    }

    /// EXIF from whichever container carried it.
    pub fn exif(&self) -> Option<&ExifData> {
        self.jpeg
            .as_ref()
            .and_then(|j| j.exif.as_ref())
            .or_else(|| self.png.as_ref().and_then(|p| p.exif.as_ref()))
            .or(self.tiff.as_ref())
    }

    pub fn xmp(&self) -> Option<&str> {
        self.jpeg
            .as_ref()
            .and_then(|j| j.xmp.as_deref())
            .or_else(|| self.png.as_ref().and_then(|p| p.xmp.as_deref()))
    }

    pub fn has_icc_profile(&self) -> bool {
        self.jpeg.as_ref().is_some_and(|j| j.icc_profile)
            || self.png.as_ref().is_some_and(|p| p.icc_profile)
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match (self.width, self.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Some((w, h)),
            _ => None,
        }
    }

    pub fn camera_make(&self) -> Option<&str> {
        self.exif().and_then(|e| e.text(tiff::TAG_MAKE))
    }
}

fn read_webp(bytes: &[u8], probe: &mut ContainerProbe) {
    probe.bit_depth = Some(8);
    let Some(kind) = bytes.get(12..16) else {
        return;
    };
    match kind {
        b"VP8X" => {
            if let Some(b) = bytes.get(20..30) {
                probe.has_alpha = b[0] & 0x10 != 0;
                probe.width = Some(1 + u32::from_le_bytes([b[4], b[5], b[6], 0]));
                probe.height = Some(1 + u32::from_le_bytes([b[7], b[8], b[9], 0]));
            }
        }
        b"VP8L" => {
            if let Some(b) = bytes.get(21..25) {
                let bits = u32::from_le_bytes([b[0], b[1], b[2], b[3]]);
                probe.width = Some((bits & 0x3FFF) + 1);
                probe.height = Some(((bits >> 14) & 0x3FFF) + 1);
                probe.has_alpha = (bits >> 28) & 1 == 1;
            }
        }
        b"VP8 " => {
            if let Some(b) = bytes.get(26..30) {
                probe.width = Some((u16::from_le_bytes([b[0], b[1]]) & 0x3FFF) as u32);
                probe.height = Some((u16::from_le_bytes([b[2], b[3]]) & 0x3FFF) as u32);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_common_containers() {
        assert_eq!(ContainerFormat::sniff(&[0xFF, 0xD8, 0xFF, 0xE0]), ContainerFormat::Jpeg);
        assert_eq!(ContainerFormat::sniff(b"GIF89a\x10\x00\x20\x00"), ContainerFormat::Gif);
        assert_eq!(ContainerFormat::sniff(b"RIFF\0\0\0\0WEBPVP8X"), ContainerFormat::Webp);
        assert_eq!(ContainerFormat::sniff(b"hello"), ContainerFormat::Unknown);
    }

    #[test]
    fn inspects_gif_dimensions() {
        let probe = ContainerProbe::inspect(b"GIF89a\x10\x00\x20\x00\x00\x00\x00");
        assert_eq!(probe.dimensions(), Some((16, 32)));
    }

    #[test]
    fn inspects_png_fixture() {
        let data = png::fixture::png(4000, 3000, 2, &[]);
        let probe = ContainerProbe::inspect(&data);
        assert_eq!(probe.format, ContainerFormat::Png);
        assert_eq!(probe.dimensions(), Some((4000, 3000)));
        assert!(!probe.has_alpha);
        assert!(probe.exif().is_none());
    }

    #[test]
    fn inspects_vp8x_webp() {
        let mut data = b"RIFF\0\0\0\0WEBPVP8X".to_vec();
        data.extend_from_slice(&[10, 0, 0, 0]);
        data.extend_from_slice(&[0x10, 0, 0, 0]);
        data.extend_from_slice(&[0x7F, 0x07, 0x00]);
        data.extend_from_slice(&[0x37, 0x04, 0x00]);
        let probe = ContainerProbe::inspect(&data);
        assert_eq!(probe.dimensions(), Some((1920, 1080)));
        assert!(probe.has_alpha);
    }
}
