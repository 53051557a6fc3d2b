//! TIFF structure reader shared by EXIF (APP1 / PNG eXIf / bare TIFF) and the
//! MPF index in APP2. Offsets are relative to the TIFF header.

use std::collections::{BTreeMap, HashSet, VecDeque};

use serde::Serialize;

pub const TIFF_HEADER_LEN: usize = 8;
const MAX_IFD_ENTRIES: u16 = 4096;
const MAX_IFDS: usize = 16;

pub const TAG_IMAGE_WIDTH: u16 = 256;
pub const TAG_IMAGE_HEIGHT: u16 = 257;
pub const TAG_BITS_PER_SAMPLE: u16 = 258;
pub const TAG_MAKE: u16 = 271;
pub const TAG_MODEL: u16 = 272;
pub const TAG_ORIENTATION: u16 = 274;
pub const TAG_SOFTWARE: u16 = 305;
pub const TAG_DATE_TIME: u16 = 306;
pub const TAG_THUMBNAIL_OFFSET: u16 = 513;
pub const TAG_THUMBNAIL_LENGTH: u16 = 514;
pub const TAG_COPYRIGHT: u16 = 33432;
pub const TAG_EXPOSURE_TIME: u16 = 33434;
pub const TAG_F_NUMBER: u16 = 33437;
pub const TAG_EXIF_IFD: u16 = 34665;
pub const TAG_ISO: u16 = 34855;
pub const TAG_GPS_IFD: u16 = 34853;
pub const TAG_DATE_TIME_ORIGINAL: u16 = 36867;
pub const TAG_FLASH: u16 = 37385;
pub const TAG_FOCAL_LENGTH: u16 = 37386;
pub const TAG_MAKER_NOTE: u16 = 37500;
pub const TAG_COLOR_SPACE: u16 = 40961;
pub const TAG_PIXEL_X_DIMENSION: u16 = 40962;
pub const TAG_PIXEL_Y_DIMENSION: u16 = 40963;
pub const TAG_WHITE_BALANCE: u16 = 41987;
pub const TAG_LENS_MODEL: u16 = 42036;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Endian {
    Little,
    Big,
}

#[derive(Debug, Clone, Copy)]
pub struct IfdEntry {
    pub tag: u16,
    pub typ: u16,
    pub count: u32,
    pub value_bytes: [u8; 4],
}

#[derive(Debug, Clone, Copy)]
pub struct TiffReader<'a> {
    data: &'a [u8],
    endian: Endian,
}

impl<'a> TiffReader<'a> {
    pub fn new(data: &'a [u8]) -> Option<Self> {
        let endian = match data.get(0..4)? {
            [0x49, 0x49, 0x2A, 0x00] => Endian::Little,
            [0x4D, 0x4D, 0x00, 0x2A] => Endian::Big,
            _ => return None,
        };
        Some(Self { data, endian })
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn first_ifd(&self) -> Option<usize> {
        self.u32_at(4).map(|v| v as usize)
    }

    pub fn u16_at(&self, offset: usize) -> Option<u16> {
        let b = self.data.get(offset..offset.checked_add(2)?)?;
        Some(read_u16(b, self.endian))
    }

    pub fn u32_at(&self, offset: usize) -> Option<u32> {
        let b = self.data.get(offset..offset.checked_add(4)?)?;
        Some(read_u32(b, self.endian))
    }

    /// Entries of the IFD at `offset` and the offset of the next IFD (0 = none).
    pub fn read_ifd(&self, offset: usize) -> Result<(Vec<IfdEntry>, usize), String> {
        let count = self
            .u16_at(offset)
            .ok_or_else(|| format!("ifd at {offset} out of bounds"))?;
        if count > MAX_IFD_ENTRIES {
            return Err("tiff IFD entry count too large".to_string());
        }
        let entries_len = count as usize * 12;
        let total_len = 2 + entries_len + 4;
        let buf = self
            .data
            .get(offset..offset.saturating_add(total_len))
            .ok_or_else(|| format!("ifd at {offset} truncated"))?;

        let mut entries = Vec::with_capacity(count as usize);
        for i in 0..count as usize {
            let entry = &buf[2 + i * 12..2 + i * 12 + 12];
            entries.push(IfdEntry {
                tag: read_u16(&entry[0..2], self.endian),
                typ: read_u16(&entry[2..4], self.endian),
                count: read_u32(&entry[4..8], self.endian),
                value_bytes: [entry[8], entry[9], entry[10], entry[11]],
            });
        }
        let next = read_u32(&buf[2 + entries_len..total_len], self.endian) as usize;
        Ok((entries, next))
    }

    /// Raw bytes of an entry's value, inline or out-of-line.
    pub fn value_data(&self, entry: &IfdEntry) -> Option<&'a [u8]> {
        let size = tiff_type_size(entry.typ)?;
        let len = (entry.count as usize).checked_mul(size)?;
        if len <= 4 {
            return None;
        }
        let offset = read_u32(&entry.value_bytes, self.endian) as usize;
        self.data.get(offset..offset.checked_add(len)?)
    }

    pub fn decode(&self, entry: &IfdEntry) -> Option<TagValue> {
        let size = tiff_type_size(entry.typ)?;
        if entry.count == 0 {
            return None;
        }
        let len = (entry.count as usize).checked_mul(size)?;
        let bytes: &[u8] = if len <= 4 {
            &entry.value_bytes[..len]
        } else {
            self.value_data(entry)?
        };
        match entry.typ {
            2 => {
                let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
                let text = String::from_utf8_lossy(&bytes[..end]).trim().to_string();
                Some(TagValue::Ascii(text))
            }
            3 => Some(TagValue::Short(read_u16(&bytes[0..2], self.endian))),
            4 => Some(TagValue::Long(read_u32(&bytes[0..4], self.endian))),
            5 => Some(TagValue::Rational(
                read_u32(&bytes[0..4], self.endian),
                read_u32(&bytes[4..8], self.endian),
            )),
            10 => Some(TagValue::SRational(
                read_u32(&bytes[0..4], self.endian) as i32,
                read_u32(&bytes[4..8], self.endian) as i32,
            )),
            1 | 6 | 7 => Some(TagValue::Bytes(bytes.len())),
            _ => None,
        }
    }

    pub fn offset_of(&self, entry: &IfdEntry) -> usize {
        read_u32(&entry.value_bytes, self.endian) as usize
    }
}

/// First value of a decoded tag. Arrays keep only their leading element.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TagValue {
    Ascii(String),
    Short(u16),
    Long(u32),
    Rational(u32, u32),
    SRational(i32, i32),
    Bytes(usize),
}

impl TagValue {
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            TagValue::Short(v) => Some(*v as u32),
            TagValue::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TagValue::Short(v) => Some(*v as f64),
            TagValue::Long(v) => Some(*v as f64),
            TagValue::Rational(n, d) if *d != 0 => Some(*n as f64 / *d as f64),
            TagValue::SRational(n, d) if *d != 0 => Some(*n as f64 / *d as f64),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            TagValue::Ascii(s) if !s.is_empty() => Some(s),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ThumbnailRef {
    pub offset: usize,
    pub length: usize,
}

/// Decoded EXIF / TIFF metadata. IFD0 and the Exif sub-IFD share one tag map.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExifData {
    pub fields: BTreeMap<u16, TagValue>,
    pub has_gps: bool,
    pub thumbnail: Option<ThumbnailRef>,
    pub maker_note_len: Option<usize>,
    pub ifd_count: usize,
    pub errors: Vec<String>,
}

impl ExifData {
    pub fn get(&self, tag: u16) -> Option<&TagValue> {
        self.fields.get(&tag)
    }

    pub fn text(&self, tag: u16) -> Option<&str> {
        self.get(tag).and_then(TagValue::as_text)
    }
}

/// Walk IFD0, the Exif and GPS sub-IFDs and IFD1 of a TIFF structure.
pub fn parse_exif(data: &[u8]) -> Option<ExifData> {
    let reader = TiffReader::new(data)?;
    let mut exif = ExifData::default();

    let first = reader.first_ifd()?;
    let mut queue = VecDeque::new();
    if first >= TIFF_HEADER_LEN {
        queue.push_back((first, IfdKind::Primary));
    }

    let mut seen = HashSet::new();
    while let Some((offset, kind)) = queue.pop_front() {
        if offset == 0 || !seen.insert(offset) || exif.ifd_count >= MAX_IFDS {
            continue;
        }
        let (entries, next) = match reader.read_ifd(offset) {
            Ok(v) => v,
            Err(msg) => {
                exif.errors.push(msg);
                continue;
            }
        };
        exif.ifd_count += 1;

        let mut thumb_offset = None;
        let mut thumb_length = None;
        for entry in &entries {
            match (kind, entry.tag) {
                (IfdKind::Thumbnail, TAG_THUMBNAIL_OFFSET) => {
                    thumb_offset = reader.decode(entry).and_then(|v| v.as_u32());
                }
                (IfdKind::Thumbnail, TAG_THUMBNAIL_LENGTH) => {
                    thumb_length = reader.decode(entry).and_then(|v| v.as_u32());
                }
                (IfdKind::Thumbnail, _) | (IfdKind::Gps, _) => {}
                (_, TAG_EXIF_IFD) => queue.push_back((reader.offset_of(entry), IfdKind::Exif)),
                (_, TAG_GPS_IFD) => {
                    exif.has_gps = true;
                    queue.push_back((reader.offset_of(entry), IfdKind::Gps));
                }
                (_, TAG_MAKER_NOTE) => exif.maker_note_len = Some(entry.count as usize),
                _ => {
                    if let Some(value) = reader.decode(entry) {
                        exif.fields.entry(entry.tag).or_insert(value);
                    }
                }
            }
        }

        if let (Some(offset), Some(length)) = (thumb_offset, thumb_length) {
            exif.thumbnail = Some(ThumbnailRef {
                offset: offset as usize,
                length: length as usize,
            });
        }
        if kind == IfdKind::Primary && next >= TIFF_HEADER_LEN {
            queue.push_back((next, IfdKind::Thumbnail));
        }
    }

    Some(exif)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IfdKind {
    Primary,
    Exif,
    Gps,
    Thumbnail,
}

fn read_u16(bytes: &[u8], endian: Endian) -> u16 {
    match endian {
        Endian::Little => u16::from_le_bytes([bytes[0], bytes[1]]),
        Endian::Big => u16::from_be_bytes([bytes[0], bytes[1]]),
    }
}

fn read_u32(bytes: &[u8], endian: Endian) -> u32 {
    match endian {
        Endian::Little => u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        Endian::Big => u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
    }
}

fn tiff_type_size(typ: u16) -> Option<usize> {
    match typ {
        1 | 2 | 6 | 7 => Some(1),
        3 | 8 => Some(2),
        4 | 9 | 11 => Some(4),
        5 | 10 | 12 => Some(8),
        _ => None,
    }
}

/// Little-endian TIFF builder for tests across the crate.
#[cfg(test)]
pub(crate) mod fixture {
    pub enum Val<'a> {
        Ascii(&'a str),
        Short(u16),
        Long(u32),
        Rational(u32, u32),
        Undefined(&'a [u8]),
    }

    /// Build `II*\0` + IFD0 (+ optional Exif IFD and IFD1).
    pub fn tiff(ifd0: &[(u16, Val)], exif: &[(u16, Val)], ifd1: &[(u16, Val)]) -> Vec<u8> {
        let mut out = vec![0x49, 0x49, 0x2A, 0x00, 8, 0, 0, 0];
        let mut ifd0: Vec<(u16, Val)> = ifd0
            .iter()
            .map(|(t, v)| (*t, clone_val(v)))
            .collect();
        if !exif.is_empty() {
            ifd0.push((super::TAG_EXIF_IFD, Val::Long(0)));
        }
        let ifd0_pos = write_ifd(&mut out, &ifd0);
        if !exif.is_empty() {
            let exif_pos = out.len() as u32;
            patch_long_value(&mut out, ifd0_pos, super::TAG_EXIF_IFD, exif_pos);
            let exif: Vec<(u16, Val)> = exif.iter().map(|(t, v)| (*t, clone_val(v))).collect();
            write_ifd(&mut out, &exif);
        }
        if !ifd1.is_empty() {
            let ifd1_pos = out.len() as u32;
            let count = u16::from_le_bytes([out[ifd0_pos], out[ifd0_pos + 1]]) as usize;
            let next_at = ifd0_pos + 2 + count * 12;
            out[next_at..next_at + 4].copy_from_slice(&ifd1_pos.to_le_bytes());
            let ifd1: Vec<(u16, Val)> = ifd1.iter().map(|(t, v)| (*t, clone_val(v))).collect();
            write_ifd(&mut out, &ifd1);
        }
        out
    }

    fn clone_val<'a>(v: &Val<'a>) -> Val<'a> {
        match v {
            Val::Ascii(s) => Val::Ascii(*s),
            Val::Short(x) => Val::Short(*x),
            Val::Long(x) => Val::Long(*x),
            Val::Rational(n, d) => Val::Rational(*n, *d),
            Val::Undefined(b) => Val::Undefined(*b),
        }
    }

    fn write_ifd(out: &mut Vec<u8>, entries: &[(u16, Val)]) -> usize {
        let pos = out.len();
        let table_len = 2 + entries.len() * 12 + 4;
        let mut data_pos = pos + table_len;
        let mut data = Vec::new();
        out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
        for (tag, val) in entries {
            let (typ, count, payload): (u16, u32, Vec<u8>) = match val {
                Val::Ascii(s) => {
                    let mut b = s.as_bytes().to_vec();
                    b.push(0);
                    (2, b.len() as u32, b)
                }
                Val::Short(x) => (3, 1, x.to_le_bytes().to_vec()),
                Val::Long(x) => (4, 1, x.to_le_bytes().to_vec()),
                Val::Rational(n, d) => {
                    let mut b = n.to_le_bytes().to_vec();
                    b.extend_from_slice(&d.to_le_bytes());
                    (5, 1, b)
                }
                Val::Undefined(b) => (7, b.len() as u32, b.to_vec()),
            };
            out.extend_from_slice(&tag.to_le_bytes());
            out.extend_from_slice(&typ.to_le_bytes());
            out.extend_from_slice(&count.to_le_bytes());
            if payload.len() <= 4 {
                let mut inline = [0u8; 4];
                inline[..payload.len()].copy_from_slice(&payload);
                out.extend_from_slice(&inline);
            } else {
                out.extend_from_slice(&(data_pos as u32).to_le_bytes());
                data_pos += payload.len();
                data.extend_from_slice(&payload);
            }
        }
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&data);
        pos
    }

    fn patch_long_value(out: &mut [u8], ifd_pos: usize, tag: u16, value: u32) {
        let count = u16::from_le_bytes([out[ifd_pos], out[ifd_pos + 1]]) as usize;
        for i in 0..count {
            let at = ifd_pos + 2 + i * 12;
            if u16::from_le_bytes([out[at], out[at + 1]]) == tag {
                out[at + 8..at + 12].copy_from_slice(&value.to_le_bytes());
            }
        }
    }
}
