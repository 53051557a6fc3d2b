//! JPEG marker walk. Collects frame, table and APPn segment structure; the
//! entropy-coded data itself is skipped.

use serde::Serialize;

use super::tiff::{self, ExifData, TiffReader};

const EXIF_ID: &[u8] = b"Exif\0\0";
const XMP_ID: &[u8] = b"http://ns.adobe.com/xap/1.0/\0";
const ICC_ID: &[u8] = b"ICC_PROFILE\0";
const MPF_ID: &[u8] = b"MPF\0";
const FPXR_ID: &[u8] = b"FPXR";
const PHOTOSHOP_ID: &[u8] = b"Photoshop 3.0\0";

const TAG_MP_ENTRY: u16 = 0xB002;

/// Natural-order index for each zig-zag position.
pub const ZIGZAG: [usize; 64] = [
    0, 1, 8, 16, 9, 2, 3, 10, 17, 24, 32, 25, 18, 11, 4, 5, 12, 19, 26, 33, 40, 48, 41, 34, 27,
    20, 13, 6, 7, 14, 21, 28, 35, 42, 49, 56, 57, 50, 43, 36, 29, 22, 15, 23, 30, 37, 44, 51, 58,
    59, 52, 45, 38, 31, 39, 46, 53, 60, 61, 54, 47, 55, 62, 63,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ComponentSampling {
    pub id: u8,
    pub horizontal: u8,
    pub vertical: u8,
}

/// Quantization table in natural (row-major) order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuantTable {
    pub id: u8,
    pub values: Vec<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppSegment {
    pub marker: u8,
    pub identifier: String,
    pub offset: usize,
    pub length: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MpEntry {
    pub attribute: u32,
    pub size: u32,
    pub offset: u32,
}

/// Multi-Picture Format index. Entry offsets are relative to `tiff_base`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MpfIndex {
    pub tiff_base: usize,
    pub entries: Vec<MpEntry>,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct JpegLayout {
    pub sof_marker: Option<u8>,
    pub precision: Option<u8>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub components: Vec<ComponentSampling>,
    pub quant_tables: Vec<QuantTable>,
    pub huffman_tables: usize,
    pub scans: usize,
    pub app_segments: Vec<AppSegment>,
    pub exif: Option<ExifData>,
    /// Absolute offset of the EXIF TIFF header.
    pub exif_base: Option<usize>,
    pub exif_malformed: bool,
    pub xmp: Option<String>,
    pub icc_profile: bool,
    pub mpf: Option<MpfIndex>,
    pub flashpix: bool,
    pub photoshop_irb: bool,
    pub comments: Vec<String>,
    pub eoi_offset: Option<usize>,
    pub errors: Vec<String>,
}

impl JpegLayout {
    pub fn progressive(&self) -> bool {
        matches!(self.sof_marker, Some(0xC2 | 0xC6 | 0xCA | 0xCE))
    }

    /// Chroma subsampling as `J:a:b`, derived from the luma/chroma sampling factors.
    pub fn subsampling(&self) -> Option<String> {
        if self.components.len() == 1 {
            return Some("grayscale".to_string());
        }
        let luma = self.components.first()?;
        let chroma = self.components.get(1)?;
        if chroma.horizontal == 0 || chroma.vertical == 0 {
            return None;
        }
        let h = luma.horizontal / chroma.horizontal;
        let v = luma.vertical / chroma.vertical;
        let ratio = match (h, v) {
            (1, 1) => "4:4:4",
            (2, 1) => "4:2:2",
            (2, 2) => "4:2:0",
            (1, 2) => "4:4:0",
            (4, 1) => "4:1:1",
            _ => return Some(format!("{}x{}", h, v)),
        };
        Some(ratio.to_string())
    }

    pub fn has_app(&self, marker: u8, identifier: &str) -> bool {
        self.app_segments
            .iter()
            .any(|s| s.marker == marker && s.identifier == identifier)
    }
}

pub fn is_jpeg(bytes: &[u8]) -> bool {
    bytes.len() >= 3 && bytes[0] == 0xFF && bytes[1] == 0xD8 && bytes[2] == 0xFF
}

/// Walk markers starting after SOI at `start`. Works on embedded images too.
pub fn parse_jpeg(bytes: &[u8], start: usize) -> Option<JpegLayout> {
    let data = bytes.get(start..)?;
    if !is_jpeg(data) {
        return None;
    }
    let mut layout = JpegLayout::default();
    let mut pos = 2usize;

    loop {
        while pos < data.len() && data[pos] == 0xFF && data.get(pos + 1) == Some(&0xFF) {
            pos += 1;
        }
        if pos + 1 >= data.len() {
            layout.errors.push("eof before EOI".to_string());
            break;
        }
        if data[pos] != 0xFF {
            layout.errors.push(format!("expected marker at {}", start + pos));
            break;
        }
        let marker = data[pos + 1];
        pos += 2;

        match marker {
            0xD9 => {
                layout.eoi_offset = Some(start + pos);
                break;
            }
            0x01 | 0xD0..=0xD8 => continue,
            _ => {}
        }

        let Some(len_bytes) = data.get(pos..pos + 2) else {
            layout.errors.push("eof in segment length".to_string());
            break;
        };
        let seg_len = u16::from_be_bytes([len_bytes[0], len_bytes[1]]) as usize;
        if seg_len < 2 || pos + seg_len > data.len() {
            layout
                .errors
                .push(format!("segment 0x{marker:02X} at {} truncated", start + pos - 2));
            break;
        }
        let seg = &data[pos + 2..pos + seg_len];
        let seg_offset = start + pos + 2;

        match marker {
            0xC0..=0xCF if !matches!(marker, 0xC4 | 0xC8 | 0xCC) => {
                read_frame(&mut layout, marker, seg)
            }
            0xC4 => layout.huffman_tables += count_huffman_tables(seg),
            0xDB => read_quant_tables(&mut layout, seg),
            0xE0..=0xEF => read_app(&mut layout, marker, seg, seg_offset),
            0xFE => layout
                .comments
                .push(String::from_utf8_lossy(seg).trim_end_matches('\0').to_string()),
            _ => {}
        }
        pos += seg_len;

        if marker == 0xDA {
            layout.scans += 1;
            pos = skip_entropy_data(data, pos);
        }
    }

    Some(layout)
}

fn skip_entropy_data(data: &[u8], mut pos: usize) -> usize {
    while let Some(rel) = memchr::memchr(0xFF, &data[pos.min(data.len())..]) {
        let at = pos + rel;
        match data.get(at + 1) {
            Some(0x00) | Some(0xD0..=0xD7) | Some(0xFF) => pos = at + 1,
            Some(_) => return at,
            None => return data.len(),
        }
    }
    data.len()
}

fn read_frame(layout: &mut JpegLayout, marker: u8, seg: &[u8]) {
    if layout.sof_marker.is_some() || seg.len() < 6 {
        return;
    }
    layout.sof_marker = Some(marker);
    layout.precision = Some(seg[0]);
    layout.height = Some(u16::from_be_bytes([seg[1], seg[2]]) as u32);
    layout.width = Some(u16::from_be_bytes([seg[3], seg[4]]) as u32);
    let count = seg[5] as usize;
    for i in 0..count {
        let Some(c) = seg.get(6 + i * 3..9 + i * 3) else {
            layout.errors.push("frame header truncated".to_string());
            break;
        };
        layout.components.push(ComponentSampling {
            id: c[0],
            horizontal: c[1] >> 4,
            vertical: c[1] & 0x0F,
        });
    }
}

fn read_quant_tables(layout: &mut JpegLayout, seg: &[u8]) {
    let mut i = 0usize;
    while i < seg.len() {
        let pq = seg[i] >> 4;
        let id = seg[i] & 0x0F;
        let width = if pq == 0 { 1 } else { 2 };
        let Some(raw) = seg.get(i + 1..i + 1 + 64 * width) else {
            layout.errors.push("quantization table truncated".to_string());
            return;
        };
        let mut values = vec![0u16; 64];
        for (k, natural) in ZIGZAG.iter().enumerate() {
            values[*natural] = if width == 1 {
                raw[k] as u16
            } else {
                u16::from_be_bytes([raw[k * 2], raw[k * 2 + 1]])
            };
        }
        layout.quant_tables.retain(|t| t.id != id);
        layout.quant_tables.push(QuantTable { id, values });
        i += 1 + 64 * width;
    }
}

fn count_huffman_tables(seg: &[u8]) -> usize {
    let mut i = 0usize;
    let mut tables = 0usize;
    while i + 17 <= seg.len() {
        let symbols: usize = seg[i + 1..i + 17].iter().map(|c| *c as usize).sum();
        i += 17 + symbols;
        tables += 1;
    }
    tables
}

fn read_app(layout: &mut JpegLayout, marker: u8, seg: &[u8], seg_offset: usize) {
    let id_end = seg.iter().take(32).position(|b| *b == 0).unwrap_or(seg.len().min(32));
    let identifier = String::from_utf8_lossy(&seg[..id_end]).to_string();
    layout.app_segments.push(AppSegment {
        marker,
        identifier,
        offset: seg_offset,
        length: seg.len(),
    });

    match marker {
        0xE1 if seg.starts_with(EXIF_ID) && layout.exif.is_none() => {
            let tiff_data = &seg[EXIF_ID.len()..];
            match tiff::parse_exif(tiff_data) {
                Some(exif) => {
                    layout.exif = Some(exif);
                    layout.exif_base = Some(seg_offset + EXIF_ID.len());
                }
                None => layout.exif_malformed = true,
            }
        }
        0xE1 if seg.starts_with(XMP_ID) => {
            layout.xmp = Some(String::from_utf8_lossy(&seg[XMP_ID.len()..]).to_string());
        }
        0xE2 if seg.starts_with(ICC_ID) => layout.icc_profile = true,
        0xE2 if seg.starts_with(MPF_ID) && layout.mpf.is_none() => {
            let base = seg_offset + MPF_ID.len();
            layout.mpf = Some(read_mpf(&seg[MPF_ID.len()..], base));
        }
        0xE2 if seg.starts_with(FPXR_ID) => layout.flashpix = true,
        0xED if seg.starts_with(PHOTOSHOP_ID) => layout.photoshop_irb = true,
        _ => {}
    }
}

fn read_mpf(data: &[u8], tiff_base: usize) -> MpfIndex {
    let mut index = MpfIndex {
        tiff_base,
        entries: Vec::new(),
        errors: Vec::new(),
    };
    let Some(reader) = TiffReader::new(data) else {
        index.errors.push("mpf tiff header invalid".to_string());
        return index;
    };
    let Some(first) = reader.first_ifd() else {
        index.errors.push("mpf index ifd missing".to_string());
        return index;
    };
    let entries = match reader.read_ifd(first) {
        Ok((entries, _)) => entries,
        Err(msg) => {
            index.errors.push(msg);
            return index;
        }
    };
    let Some(mp_entry) = entries.iter().find(|e| e.tag == TAG_MP_ENTRY) else {
        index.errors.push("mpf entry table missing".to_string());
        return index;
    };
    let Some(table) = reader.value_data(mp_entry) else {
        index.errors.push("mpf entry table out of bounds".to_string());
        return index;
    };
    let table_offset = reader.offset_of(mp_entry);
    for i in 0..table.len() / 16 {
        let at = table_offset + i * 16;
        let (Some(attribute), Some(size), Some(offset)) =
            (reader.u32_at(at), reader.u32_at(at + 4), reader.u32_at(at + 8))
        else {
            break;
        };
        index.entries.push(MpEntry {
            attribute,
            size,
            offset,
        });
    }
    index
}

#[cfg(test)]
pub(crate) mod fixture {
    /// Baseline 4:2:0 JPEG skeleton with optional extra APP segments, no pixel data.
    pub fn jpeg(width: u16, height: u16, apps: &[(u8, Vec<u8>)]) -> Vec<u8> {
        let mut out = vec![0xFF, 0xD8];
        for (marker, payload) in apps {
            segment(&mut out, *marker, payload);
        }
        let mut dqt = vec![0x00];
        dqt.extend(std::iter::repeat(1u8).take(64));
        segment(&mut out, 0xDB, &dqt);
        let mut sof = vec![8];
        sof.extend_from_slice(&height.to_be_bytes());
        sof.extend_from_slice(&width.to_be_bytes());
        sof.extend_from_slice(&[3, 1, 0x22, 0, 2, 0x11, 1, 3, 0x11, 1]);
        segment(&mut out, 0xC0, &sof);
        let mut dht = vec![0x00];
        dht.extend_from_slice(&[0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        dht.push(0);
        segment(&mut out, 0xC4, &dht);
        segment(&mut out, 0xDA, &[1, 1, 0, 0, 0x3F, 0]);
        out.extend_from_slice(&[0x12, 0xFF, 0x00, 0x34, 0xFF, 0xD0, 0x56]);
        out.extend_from_slice(&[0xFF, 0xD9]);
        out
    }

    pub fn segment(out: &mut Vec<u8>, marker: u8, payload: &[u8]) {
        out.extend_from_slice(&[0xFF, marker]);
        out.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
        out.extend_from_slice(payload);
    }

    pub fn exif_app1(tiff: &[u8]) -> (u8, Vec<u8>) {
        let mut payload = b"Exif\0\0".to_vec();
        payload.extend_from_slice(tiff);
        (0xE1, payload)
    }
}
