use serde::Serialize;

use super::tiff::{self, ExifData};

pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

#[derive(Debug, Clone, Default, Serialize)]
pub struct PngLayout {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub bit_depth: Option<u8>,
    pub color_type: Option<u8>,
    pub transparency: bool,
    pub icc_profile: bool,
    pub exif: Option<ExifData>,
    pub xmp: Option<String>,
    pub software: Option<String>,
    pub chunks: Vec<String>,
    pub iend: bool,
    pub errors: Vec<String>,
}

impl PngLayout {
    pub fn has_alpha(&self) -> bool {
        matches!(self.color_type, Some(4 | 6)) || self.transparency
    }
}

pub fn parse_png(bytes: &[u8]) -> Option<PngLayout> {
    if !bytes.starts_with(&PNG_SIGNATURE) {
        return None;
    }
    let mut layout = PngLayout::default();
    let mut pos = PNG_SIGNATURE.len();

    loop {
        let Some(header) = bytes.get(pos..pos + 8) else {
            layout.errors.push("eof before IEND".to_string());
            break;
        };
        let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let chunk_type = String::from_utf8_lossy(&header[4..8]).to_string();
        let Some(body) = bytes.get(pos + 8..pos + 8 + len) else {
            layout.errors.push(format!("chunk {chunk_type} truncated"));
            break;
        };

        match chunk_type.as_str() {
            "IHDR" if body.len() >= 13 => {
                layout.width = Some(u32::from_be_bytes([body[0], body[1], body[2], body[3]]));
                layout.height = Some(u32::from_be_bytes([body[4], body[5], body[6], body[7]]));
                layout.bit_depth = Some(body[8]);
                layout.color_type = Some(body[9]);
            }
            "tRNS" => layout.transparency = true,
            "iCCP" => layout.icc_profile = true,
            "eXIf" => layout.exif = tiff::parse_exif(body),
            "tEXt" | "iTXt" => read_text_chunk(&mut layout, body),
            _ => {}
        }
        layout.chunks.push(chunk_type.clone());
        // length + type + body + CRC
        pos += 12 + len;

        if chunk_type == "IEND" {
            layout.iend = true;
            break;
        }
    }

    Some(layout)
}

fn read_text_chunk(layout: &mut PngLayout, body: &[u8]) {
    let Some(nul) = body.iter().position(|b| *b == 0) else {
        return;
    };
    let keyword = String::from_utf8_lossy(&body[..nul]);
    let text = String::from_utf8_lossy(&body[nul + 1..])
        .trim_matches('\0')
        .to_string();
    match keyword.as_ref() {
        "Software" => layout.software = Some(text),
        "XML:com.adobe.xmp" => layout.xmp = Some(text),
        _ => {}
    }
}
