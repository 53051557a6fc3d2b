//! Status-bearing structural checks of the professional category.

use chrono::NaiveDateTime;
use memchr::memmem;

use super::builtin::EvalFn;
use super::{EvaluationContext, EvaluatorFailure, Measurement, Status, Verdict};
use crate::probe::ContainerFormat;
use crate::probe::jpeg;
use crate::probe::tiff::{
    TAG_DATE_TIME, TAG_DATE_TIME_ORIGINAL, TAG_PIXEL_X_DIMENSION, TAG_PIXEL_Y_DIMENSION,
    TAG_SOFTWARE,
};

pub(super) const EVALUATORS: &[(&str, EvalFn)] = &[
    ("professional.exif_format_validation", exif_format_validation),
    ("professional.exif_internal_consistency", exif_internal_consistency),
    ("professional.exif_external_consistency", exif_external_consistency),
    ("professional.third_party_software_data", third_party_software),
    ("professional.manufacturer_note_integrity", maker_note),
    ("professional.embedded_thumbnail_consistency", embedded_thumbnail),
    ("professional.mpf_data_integrity", mpf_integrity),
    ("professional.magic_exif_legacy_data", magic_exif_legacy),
    ("professional.aspect_ratio_integrity", aspect_ratio),
    ("professional.image_size_integrity", image_size),
];

/// Lower-cased fragments of editor names found in Software / CreatorTool.
pub(super) const KNOWN_EDITORS: &[&str] = &[
    "photoshop",
    "lightroom",
    "gimp",
    "snapseed",
    "picsart",
    "meitu",
    "affinity",
    "pixelmator",
    "capture one",
    "paint.net",
    "facetune",
    "vsco",
    "canva",
    "luminar",
    "darktable",
    "rawtherapee",
    "acdsee",
    "polarr",
    "fotor",
];

const COMMON_RATIOS: &[(&str, f64)] = &[
    ("1:1", 1.0),
    ("4:3", 4.0 / 3.0),
    ("3:2", 1.5),
    ("16:9", 16.0 / 9.0),
];
const RATIO_TOLERANCE: f64 = 0.02;
const THUMBNAIL_RATIO_TOLERANCE: f64 = 0.05;

const MIN_SIDE_FAIL: u32 = 256;
const MIN_SIDE_WARN: u32 = 1024;

const EXIF_DATE_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

pub(super) fn find_editor(text: &str) -> Option<&'static str> {
    let lower = text.to_ascii_lowercase();
    KNOWN_EDITORS.iter().copied().find(|e| lower.contains(e))
}

fn exif_format_validation(ctx: &EvaluationContext<'_>) -> Result<Verdict, EvaluatorFailure> {
    let probe = ctx.probe;
    let verdict = match (probe.format, probe.jpeg.as_ref()) {
        (ContainerFormat::Unknown, _) => Verdict::fail("unrecognized container"),
        (ContainerFormat::Jpeg, Some(layout)) if layout.exif_malformed => {
            Verdict::fail("EXIF segment is malformed")
        }
        (ContainerFormat::Jpeg, Some(layout)) => match layout.exif.as_ref() {
            Some(exif) if !exif.errors.is_empty() => {
                Verdict::fail(format!("EXIF structure damaged: {}", exif.errors[0]))
            }
            Some(_) => Verdict::pass("standard EXIF JPEG"),
            None => Verdict::warning("JPEG without EXIF"),
        },
        (ContainerFormat::Jpeg, None) => Verdict::fail("JPEG structure unreadable"),
        (format, _) => Verdict::warning(format!("{} container, not an EXIF JPEG", format.name())),
    };
    Ok(verdict.measured(Measurement::text(probe.format.name())))
}

fn exif_internal_consistency(ctx: &EvaluationContext<'_>) -> Result<Verdict, EvaluatorFailure> {
    let exif = ctx
        .probe
        .exif()
        .ok_or_else(|| EvaluatorFailure::malformed("EXIF disappeared after applicability"))?;
    let (Some(modified), Some(original)) =
        (exif.text(TAG_DATE_TIME), exif.text(TAG_DATE_TIME_ORIGINAL))
    else {
        return Ok(Verdict::with_status(
            Status::NotApplicable,
            "capture and modification timestamps not both recorded",
        ));
    };
    let parse = |s: &str| NaiveDateTime::parse_from_str(s, EXIF_DATE_FORMAT).ok();
    let (Some(modified), Some(original)) = (parse(modified), parse(original)) else {
        return Ok(Verdict::fail("timestamp is not in EXIF format"));
    };
    let delta = (modified - original).num_seconds();
    let verdict = match delta {
        0 => Verdict::pass("timestamps agree"),
        d if d < 0 => Verdict::fail("modification time precedes capture time"),
        _ => Verdict::warning("modified after capture"),
    };
    Ok(verdict.measured(Measurement::Integer(delta)))
}

fn exif_external_consistency(ctx: &EvaluationContext<'_>) -> Result<Verdict, EvaluatorFailure> {
    let exif = ctx
        .probe
        .exif()
        .ok_or_else(|| EvaluatorFailure::malformed("EXIF disappeared after applicability"))?;
    let declared = (
        exif.get(TAG_PIXEL_X_DIMENSION).and_then(|v| v.as_u32()),
        exif.get(TAG_PIXEL_Y_DIMENSION).and_then(|v| v.as_u32()),
    );
    let (Some(ew), Some(eh)) = declared else {
        return Ok(Verdict::with_status(
            Status::NotApplicable,
            "EXIF pixel dimensions not recorded",
        ));
    };
    let Some((w, h)) = ctx.probe.dimensions() else {
        return Err(EvaluatorFailure::malformed("image dimensions unreadable"));
    };
    let measurement = Measurement::record([
        ("exif", Measurement::text(format!("{ew}x{eh}"))),
        ("actual", Measurement::text(format!("{w}x{h}"))),
    ]);
    let verdict = if (ew, eh) == (w, h) || (eh, ew) == (w, h) {
        Verdict::pass("EXIF dimensions match the image")
    } else {
        Verdict::fail(format!("EXIF says {ew}x{eh}, image is {w}x{h}"))
    };
    Ok(verdict.measured(measurement))
}

fn third_party_software(ctx: &EvaluationContext<'_>) -> Result<Verdict, EvaluatorFailure> {
    let probe = ctx.probe;
    let software = probe
        .exif()
        .and_then(|e| e.text(TAG_SOFTWARE))
        .or_else(|| probe.png.as_ref().and_then(|p| p.software.as_deref()));

    if let Some(editor) = software.and_then(find_editor) {
        return Ok(Verdict::fail(format!("written by editing software ({editor})"))
            .measured(Measurement::text(software.unwrap_or_default())));
    }
    if let Some(editor) = probe.xmp().and_then(find_editor) {
        return Ok(Verdict::fail(format!("XMP names editing software ({editor})"))
            .measured(Measurement::text(editor)));
    }
    if probe.jpeg.as_ref().is_some_and(|j| j.photoshop_irb) {
        return Ok(Verdict::fail("Photoshop resource block present"));
    }
    if probe.xmp().is_some() {
        return Ok(Verdict::warning("XMP packet present"));
    }
    Ok(Verdict::pass("no third-party software data"))
}

fn maker_note(ctx: &EvaluationContext<'_>) -> Result<Verdict, EvaluatorFailure> {
    let len = ctx.probe.exif().and_then(|e| e.maker_note_len).unwrap_or(0);
    let verdict = if len > 0 {
        Verdict::pass(format!("maker note present ({len} bytes)"))
    } else {
        Verdict::warning("no maker note")
    };
    Ok(verdict.measured(Measurement::Integer(len as i64)))
}

fn embedded_thumbnail(ctx: &EvaluationContext<'_>) -> Result<Verdict, EvaluatorFailure> {
    let probe = ctx.probe;
    let Some(thumb) = probe.exif().and_then(|e| e.thumbnail) else {
        return Ok(Verdict::warning("no embedded thumbnail"));
    };
    let base = match probe.format {
        ContainerFormat::Jpeg => probe.jpeg.as_ref().and_then(|j| j.exif_base),
        ContainerFormat::Tiff => Some(0),
        _ => None,
    };
    let Some(base) = base else {
        return Ok(Verdict::with_status(
            Status::NotApplicable,
            "thumbnail location cannot be resolved in this container",
        ));
    };
    let start = base + thumb.offset;
    let Some(data) = ctx.bytes.get(start..start.saturating_add(thumb.length)) else {
        return Ok(Verdict::fail("thumbnail pointer out of bounds"));
    };
    let Some((tw, th)) = jpeg::parse_jpeg(data, 0).and_then(|l| match (l.width, l.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => Some((w, h)),
        _ => None,
    }) else {
        return Ok(Verdict::fail("thumbnail is not a decodable JPEG"));
    };
    let measurement = Measurement::text(format!("{tw}x{th}"));

    let Some((w, h)) = probe.dimensions() else {
        return Ok(Verdict::pass("thumbnail decodes").measured(measurement));
    };
    let main = ratio(w, h);
    let matches = [ratio(tw, th), ratio(th, tw)]
        .iter()
        .any(|r| (r - main).abs() / main <= THUMBNAIL_RATIO_TOLERANCE);
    let verdict = if matches {
        Verdict::pass("thumbnail agrees with the image")
    } else {
        Verdict::fail("thumbnail aspect ratio differs from the image")
    };
    Ok(verdict.measured(measurement))
}

fn mpf_integrity(ctx: &EvaluationContext<'_>) -> Result<Verdict, EvaluatorFailure> {
    let Some(mpf) = ctx.probe.jpeg.as_ref().and_then(|j| j.mpf.as_ref()) else {
        return Err(EvaluatorFailure::malformed("MPF index disappeared after applicability"));
    };
    if let Some(err) = mpf.errors.first() {
        return Ok(Verdict::fail(format!("MPF index unreadable: {err}")));
    }
    if mpf.entries.is_empty() {
        return Ok(Verdict::fail("MPF index lists no images"));
    }
    // the first entry is the primary image and carries offset 0
    for (i, entry) in mpf.entries.iter().enumerate().skip(1) {
        let at = mpf.tiff_base + entry.offset as usize;
        if ctx.bytes.get(at..at + 2) != Some(&[0xFF, 0xD8][..]) {
            return Ok(Verdict::fail(format!("MPF entry {i} does not point at an image"))
                .measured(Measurement::Integer(mpf.entries.len() as i64)));
        }
    }
    Ok(
        Verdict::pass(format!("{} linked images resolve", mpf.entries.len()))
            .measured(Measurement::Integer(mpf.entries.len() as i64)),
    )
}

fn magic_exif_legacy(ctx: &EvaluationContext<'_>) -> Result<Verdict, EvaluatorFailure> {
    let found = memmem::find(ctx.bytes, b"MagicEXIF").is_some();
    let verdict = if found {
        Verdict::fail("MagicEXIF editor traces found")
    } else {
        Verdict::pass("no MagicEXIF traces")
    };
    Ok(verdict.measured(Measurement::Bool(found)))
}

fn aspect_ratio(ctx: &EvaluationContext<'_>) -> Result<Verdict, EvaluatorFailure> {
    let Some((w, h)) = ctx.probe.dimensions() else {
        return Ok(Verdict::with_status(Status::NotApplicable, "dimensions unknown"));
    };
    let r = ratio(w.max(h), w.min(h));
    let measurement = Measurement::Number((r * 1000.0).round() / 1000.0);
    let verdict = match COMMON_RATIOS
        .iter()
        .find(|(_, common)| (r - common).abs() / common <= RATIO_TOLERANCE)
    {
        Some((name, _)) => Verdict::pass(format!("common {name} ratio")),
        None => Verdict::warning(format!("non-standard ratio {r:.2}")),
    };
    Ok(verdict.measured(measurement))
}

fn image_size(ctx: &EvaluationContext<'_>) -> Result<Verdict, EvaluatorFailure> {
    let Some((w, h)) = ctx.probe.dimensions() else {
        return Ok(Verdict::with_status(Status::NotApplicable, "dimensions unknown"));
    };
    let side = w.min(h);
    let label = format!("{w}x{h}");
    let verdict = if side < MIN_SIDE_FAIL {
        Verdict::fail(format!("{label} is too small for a camera original"))
    } else if side < MIN_SIDE_WARN {
        Verdict::warning(format!("{label} is smaller than typical camera output"))
    } else {
        Verdict::pass(label.clone())
    };
    Ok(verdict.measured(Measurement::text(label)))
}

fn ratio(a: u32, b: u32) -> f64 {
    a as f64 / b as f64
}
