//! Common test utilities for originscope integration tests.
//!
//! Provides synthetic image builders, a fast controller configuration and
//! scripted evaluators for driving the lifecycle deterministically.

#![allow(dead_code)]

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use originscope::config::Config;
use originscope::evaluate::{
    EvaluationContext, Evaluator, EvaluatorFailure, EvaluatorRegistry, Measurement, Status,
    Verdict, from_fn,
};
use originscope::probe::tiff::{
    TAG_DATE_TIME, TAG_DATE_TIME_ORIGINAL, TAG_EXIF_IFD, TAG_MAKE, TAG_MAKER_NOTE, TAG_MODEL,
    TAG_PIXEL_X_DIMENSION, TAG_PIXEL_Y_DIMENSION, TAG_SOFTWARE,
};
use originscope::registry::{CategoryDescriptor, CategoryId, MetricDescriptor, MetricRegistry};
use originscope::subject::Submission;

// ============================================================================
// Configuration
// ============================================================================

/// Small budgets and a tight poll so lifecycle tests finish quickly.
pub fn fast_config() -> Config {
    Config {
        workers: 2,
        evaluator_timeout_ms: 2_000,
        analysis_timeout_ms: 10_000,
        poll_interval_ms: 5,
        ..Config::default()
    }
}

pub const WAIT: Duration = Duration::from_secs(20);

pub fn reference_registry() -> Arc<MetricRegistry> {
    Arc::new(MetricRegistry::reference().clone())
}

pub const CHECK_A: &str = "professional.check_a";
pub const CHECK_B: &str = "professional.check_b";
pub const CHECK_C: &str = "professional.check_c";
pub const NOTE: &str = "exif.note";

/// Three always-applicable checks plus one informational reading.
pub fn small_registry() -> Arc<MetricRegistry> {
    let registry = MetricRegistry::new(
        vec![
            CategoryDescriptor {
                id: CategoryId::Professional,
                label: "Professional",
                description: "Checks",
            },
            CategoryDescriptor {
                id: CategoryId::Exif,
                label: "EXIF",
                description: "Readings",
            },
        ],
        vec![
            MetricDescriptor::status(CHECK_A, CategoryId::Professional, "Check A", ""),
            MetricDescriptor::status(CHECK_B, CategoryId::Professional, "Check B", ""),
            MetricDescriptor::status(CHECK_C, CategoryId::Professional, "Check C", ""),
            MetricDescriptor::reading(NOTE, CategoryId::Exif, "Note", ""),
        ],
    )
    .expect("small registry");
    Arc::new(registry)
}

/// Passing checks and a reading that echoes the file name; callers override
/// individual metrics with `insert`.
pub fn small_evaluators() -> EvaluatorRegistry {
    EvaluatorRegistry::new()
        .with(CHECK_A, Scripted::pass())
        .with(CHECK_B, Scripted::pass())
        .with(CHECK_C, Scripted::pass())
        .with(
            NOTE,
            from_fn(|ctx| {
                Ok(Verdict::reading(
                    "file",
                    Measurement::text(ctx.attributes.file_name.clone()),
                ))
            }),
        )
}

// ============================================================================
// Image Builders
// ============================================================================

pub enum Tag<'a> {
    Ascii(&'a str),
    Long(u32),
    Undefined(&'a [u8]),
}

/// Little-endian TIFF block with IFD0 and, when given, an Exif sub-IFD.
pub fn tiff_block(ifd0: &[(u16, Tag)], exif: &[(u16, Tag)]) -> Vec<u8> {
    let mut out = vec![0x49, 0x49, 0x2A, 0x00, 8, 0, 0, 0];
    let ifd0_len = 2 + (ifd0.len() + usize::from(!exif.is_empty())) * 12 + 4;
    let ifd0_data = ifd_data_len(ifd0);
    let exif_pos = (8 + ifd0_len + ifd0_data) as u32;

    let mut entries: Vec<(u16, u16, u32, Vec<u8>)> = ifd0.iter().map(encode).collect();
    if !exif.is_empty() {
        entries.push((TAG_EXIF_IFD, 4, 1, exif_pos.to_le_bytes().to_vec()));
    }
    entries.sort_by_key(|e| e.0);
    write_ifd(&mut out, &entries);

    if !exif.is_empty() {
        let entries: Vec<_> = exif.iter().map(encode).collect();
        write_ifd(&mut out, &entries);
    }
    out
}

fn encode((tag, value): &(u16, Tag)) -> (u16, u16, u32, Vec<u8>) {
    match value {
        Tag::Ascii(s) => {
            let mut b = s.as_bytes().to_vec();
            b.push(0);
            (*tag, 2, b.len() as u32, b)
        }
        Tag::Long(v) => (*tag, 4, 1, v.to_le_bytes().to_vec()),
        Tag::Undefined(b) => (*tag, 7, b.len() as u32, b.to_vec()),
    }
}

fn ifd_data_len(entries: &[(u16, Tag)]) -> usize {
    entries
        .iter()
        .map(|e| encode(e).3.len())
        .filter(|len| *len > 4)
        .sum()
}

fn write_ifd(out: &mut Vec<u8>, entries: &[(u16, u16, u32, Vec<u8>)]) {
    let start = out.len();
    let mut data_pos = start + 2 + entries.len() * 12 + 4;
    let mut data = Vec::new();
    out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    for (tag, typ, count, payload) in entries {
        out.extend_from_slice(&tag.to_le_bytes());
        out.extend_from_slice(&typ.to_le_bytes());
        out.extend_from_slice(&count.to_le_bytes());
        if payload.len() <= 4 {
            let mut inline = [0u8; 4];
            inline[..payload.len()].copy_from_slice(payload);
            out.extend_from_slice(&inline);
        } else {
            out.extend_from_slice(&(data_pos as u32).to_le_bytes());
            data_pos += payload.len();
            data.extend_from_slice(payload);
        }
    }
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&data);
}

fn segment(out: &mut Vec<u8>, marker: u8, payload: &[u8]) {
    out.extend_from_slice(&[0xFF, marker]);
    out.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
    out.extend_from_slice(payload);
}

/// Baseline JPEG skeleton (headers and a token scan, no real pixels).
pub fn jpeg(width: u16, height: u16, apps: &[(u8, Vec<u8>)]) -> Vec<u8> {
    let mut out = vec![0xFF, 0xD8];
    for (marker, payload) in apps {
        segment(&mut out, *marker, payload);
    }
    let mut dqt = vec![0x00];
    dqt.extend(std::iter::repeat_n(1u8, 64));
    segment(&mut out, 0xDB, &dqt);
    let mut sof = vec![8];
    sof.extend_from_slice(&height.to_be_bytes());
    sof.extend_from_slice(&width.to_be_bytes());
    sof.extend_from_slice(&[3, 1, 0x22, 0, 2, 0x11, 0, 3, 0x11, 0]);
    segment(&mut out, 0xC0, &sof);
    let mut dht = vec![0x00, 0, 1];
    dht.extend_from_slice(&[0; 14]);
    dht.push(0);
    segment(&mut out, 0xC4, &dht);
    segment(&mut out, 0xDA, &[1, 1, 0, 0, 0x3F, 0]);
    out.extend_from_slice(&[0x12, 0x34, 0x56, 0x78]);
    out.extend_from_slice(&[0xFF, 0xD9]);
    out
}

pub fn exif_segment(tiff: &[u8]) -> (u8, Vec<u8>) {
    let mut payload = b"Exif\0\0".to_vec();
    payload.extend_from_slice(tiff);
    (0xE1, payload)
}

const MAKER_NOTE: &[u8] = b"Canon\0\x01\x02\x03\x04\x05\x06\x07\x08\x09\x0a";

/// 4000x3000 camera JPEG: make, model, matching timestamps and dimensions,
/// and a maker note.
pub fn camera_jpeg() -> Vec<u8> {
    let tiff = tiff_block(
        &[
            (TAG_MAKE, Tag::Ascii("Canon")),
            (TAG_MODEL, Tag::Ascii("Canon EOS R5")),
            (TAG_DATE_TIME, Tag::Ascii("2024:05:01 10:00:00")),
        ],
        &[
            (TAG_DATE_TIME_ORIGINAL, Tag::Ascii("2024:05:01 10:00:00")),
            (TAG_MAKER_NOTE, Tag::Undefined(MAKER_NOTE)),
            (TAG_PIXEL_X_DIMENSION, Tag::Long(4000)),
            (TAG_PIXEL_Y_DIMENSION, Tag::Long(3000)),
        ],
    );
    jpeg(4000, 3000, &[exif_segment(&tiff)])
}

/// Re-saved by an editor: software tag, later modification time and pixel
/// dimensions that no longer match the recorded ones.
pub fn edited_jpeg() -> Vec<u8> {
    let tiff = tiff_block(
        &[
            (TAG_MAKE, Tag::Ascii("Canon")),
            (TAG_MODEL, Tag::Ascii("Canon EOS R5")),
            (TAG_SOFTWARE, Tag::Ascii("Adobe Photoshop 25.0 (Windows)")),
            (TAG_DATE_TIME, Tag::Ascii("2024:06:11 18:30:00")),
        ],
        &[
            (TAG_DATE_TIME_ORIGINAL, Tag::Ascii("2024:05:01 10:00:00")),
            (TAG_PIXEL_X_DIMENSION, Tag::Long(4000)),
            (TAG_PIXEL_Y_DIMENSION, Tag::Long(3000)),
        ],
    );
    jpeg(
        1600,
        1200,
        &[exif_segment(&tiff), (0xED, b"Photoshop 3.0\0".to_vec())],
    )
}

/// Truecolor PNG with no metadata chunks.
pub fn plain_png(width: u32, height: u32) -> Vec<u8> {
    let mut out = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    let mut ihdr = Vec::new();
    ihdr.extend_from_slice(&width.to_be_bytes());
    ihdr.extend_from_slice(&height.to_be_bytes());
    ihdr.extend_from_slice(&[8, 2, 0, 0, 0]);
    png_chunk(&mut out, b"IHDR", &ihdr);
    png_chunk(&mut out, b"IDAT", &[0x78, 0x9C, 0x03, 0x00]);
    png_chunk(&mut out, b"IEND", &[]);
    out
}

fn png_chunk(out: &mut Vec<u8>, name: &[u8; 4], body: &[u8]) {
    out.extend_from_slice(&(body.len() as u32).to_be_bytes());
    out.extend_from_slice(name);
    out.extend_from_slice(body);
    out.extend_from_slice(&[0, 0, 0, 0]);
}

pub fn jpeg_submission(bytes: Vec<u8>, name: &str) -> Submission {
    Submission::new(bytes, name, "image/jpeg")
}

// ============================================================================
// Scripted Evaluators
// ============================================================================

/// Returns a fixed status after an optional delay, giving up early on cancel.
pub struct Scripted {
    pub status: Status,
    pub delay: Duration,
}

impl Scripted {
    pub fn pass() -> Self {
        Self::new(Status::Pass)
    }

    pub fn new(status: Status) -> Self {
        Self {
            status,
            delay: Duration::ZERO,
        }
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl Evaluator for Scripted {
    fn evaluate(&self, ctx: &EvaluationContext<'_>) -> Result<Verdict, EvaluatorFailure> {
        let until = Instant::now() + self.delay;
        while Instant::now() < until {
            ctx.check_cancelled()?;
            thread::sleep(Duration::from_millis(5));
        }
        Ok(Verdict::with_status(
            self.status,
            format!("scripted for {}", ctx.attributes.file_name),
        ))
    }
}

/// Ignores cancellation and blocks for `duration`.
pub struct Hangs {
    pub duration: Duration,
}

impl Evaluator for Hangs {
    fn evaluate(&self, _ctx: &EvaluationContext<'_>) -> Result<Verdict, EvaluatorFailure> {
        thread::sleep(self.duration);
        Ok(Verdict::pass("finally"))
    }
}

pub struct Panics;

impl Evaluator for Panics {
    fn evaluate(&self, _ctx: &EvaluationContext<'_>) -> Result<Verdict, EvaluatorFailure> {
        panic!("decoder blew up")
    }
}
