//! Informational readings for the EXIF, quality, compression, editing and
//! file categories.

use memchr::memmem;

use super::builtin::EvalFn;
use super::quant::estimate_quality;
use super::{EvaluationContext, EvaluatorFailure, Measurement, Verdict};
use crate::probe::ContainerFormat;
use crate::probe::tiff::{self, ExifData, TagValue};

pub(super) const EVALUATORS: &[(&str, EvalFn)] = &[
    ("exif.has_exif", has_exif),
    ("exif.camera_model", camera_model),
    ("exif.lens", lens),
    ("exif.date_time", date_time),
    ("exif.gps_location", gps_location),
    ("exif.software", software),
    ("exif.color_space", color_space),
    ("exif.white_balance", white_balance),
    ("exif.exposure_time", exposure_time),
    ("exif.f_number", f_number),
    ("exif.iso", iso),
    ("exif.focal_length", focal_length),
    ("exif.flash", flash),
    ("exif.orientation", orientation),
    ("exif.copyright", copyright),
    ("quality.resolution", resolution),
    ("quality.bit_depth", bit_depth),
    ("quality.compression", compression_level),
    ("compression.jpeg_quality", jpeg_quality),
    ("compression.compression_ratio", compression_ratio),
    ("compression.quantization_tables", quantization_tables),
    ("compression.huffman_tables", huffman_tables),
    ("compression.progressive_encoding", progressive_encoding),
    ("compression.subsampling_ratio", subsampling_ratio),
    ("editing.resized", resized),
    ("editing.cropped", cropped),
    ("editing.ai_generated", ai_generated),
    ("file.format", file_format),
    ("file.last_modified", last_modified),
    ("file.has_metadata", has_metadata),
    ("file.has_color_profile", has_color_profile),
    ("file.has_thumbnail", has_thumbnail),
    ("file.has_layers", has_layers),
    ("file.has_alpha_channel", has_alpha_channel),
];

const NOT_RECORDED: &str = "not recorded";

/// Photoshop layer data stored in a TIFF tag.
const TAG_IMAGE_SOURCE_DATA: u16 = 37724;

const AI_SOURCE_TYPES: &[&[u8]] = &[
    b"trainedAlgorithmicMedia",
    b"compositeWithTrainedAlgorithmicMedia",
];

type Reading = Result<Verdict, EvaluatorFailure>;

fn absent() -> Reading {
    Ok(Verdict::reading(NOT_RECORDED, Measurement::None))
}

fn flag(value: bool, yes: &str, no: &str) -> Reading {
    Ok(Verdict::reading(if value { yes } else { no }, Measurement::Bool(value)))
}

fn exif_tag<'a>(ctx: &'a EvaluationContext<'_>, tag: u16) -> Option<&'a TagValue> {
    ctx.probe.exif().and_then(|e| e.get(tag))
}

fn exif_text(ctx: &EvaluationContext<'_>, tag: u16) -> Reading {
    match ctx.probe.exif().and_then(|e| e.text(tag)) {
        Some(text) => Ok(Verdict::reading(text, Measurement::text(text))),
        None => absent(),
    }
}

fn has_exif(ctx: &EvaluationContext<'_>) -> Reading {
    flag(ctx.probe.exif().is_some(), "present", "absent")
}

fn camera_model(ctx: &EvaluationContext<'_>) -> Reading {
    let Some(exif) = ctx.probe.exif() else {
        return absent();
    };
    let make = exif.text(tiff::TAG_MAKE);
    let model = exif.text(tiff::TAG_MODEL);
    let label = match (make, model) {
        (Some(make), Some(model)) if model.starts_with(make) => model.to_string(),
        (Some(make), Some(model)) => format!("{make} {model}"),
        (Some(only), None) | (None, Some(only)) => only.to_string(),
        (None, None) => return absent(),
    };
    Ok(Verdict::reading(label.clone(), Measurement::text(label)))
}

fn lens(ctx: &EvaluationContext<'_>) -> Reading {
    exif_text(ctx, tiff::TAG_LENS_MODEL)
}

fn date_time(ctx: &EvaluationContext<'_>) -> Reading {
    let Some(exif) = ctx.probe.exif() else {
        return absent();
    };
    match exif
        .text(tiff::TAG_DATE_TIME_ORIGINAL)
        .or_else(|| exif.text(tiff::TAG_DATE_TIME))
    {
        Some(text) => Ok(Verdict::reading(text, Measurement::text(text))),
        None => absent(),
    }
}

fn gps_location(ctx: &EvaluationContext<'_>) -> Reading {
    flag(
        ctx.probe.exif().is_some_and(|e| e.has_gps),
        "recorded",
        NOT_RECORDED,
    )
}

fn software(ctx: &EvaluationContext<'_>) -> Reading {
    exif_text(ctx, tiff::TAG_SOFTWARE)
}

fn coded(ctx: &EvaluationContext<'_>, tag: u16, name: fn(u32) -> Option<&'static str>) -> Reading {
    let Some(code) = exif_tag(ctx, tag).and_then(TagValue::as_u32) else {
        return absent();
    };
    let label = name(code)
        .map(str::to_string)
        .unwrap_or_else(|| format!("code {code}"));
    Ok(Verdict::reading(label, Measurement::Integer(code as i64)))
}

fn color_space(ctx: &EvaluationContext<'_>) -> Reading {
    coded(ctx, tiff::TAG_COLOR_SPACE, |code| match code {
        1 => Some("sRGB"),
        2 => Some("Adobe RGB"),
        0xFFFF => Some("Uncalibrated"),
        _ => None,
    })
}

fn white_balance(ctx: &EvaluationContext<'_>) -> Reading {
    coded(ctx, tiff::TAG_WHITE_BALANCE, |code| match code {
        0 => Some("Auto"),
        1 => Some("Manual"),
        _ => None,
    })
}

fn exposure_time(ctx: &EvaluationContext<'_>) -> Reading {
    let Some(seconds) = exif_tag(ctx, tiff::TAG_EXPOSURE_TIME).and_then(TagValue::as_f64) else {
        return absent();
    };
    if seconds <= 0.0 {
        return Err(EvaluatorFailure::malformed("non-positive exposure time"));
    }
    let label = if seconds < 1.0 {
        format!("1/{}", (1.0 / seconds).round() as u64)
    } else {
        format!("{}s", trim_float(seconds))
    };
    Ok(Verdict::reading(label, Measurement::Number(seconds)))
}

fn f_number(ctx: &EvaluationContext<'_>) -> Reading {
    match exif_tag(ctx, tiff::TAG_F_NUMBER).and_then(TagValue::as_f64) {
        Some(f) => Ok(Verdict::reading(format!("f/{f:.1}"), Measurement::Number(f))),
        None => absent(),
    }
}

fn iso(ctx: &EvaluationContext<'_>) -> Reading {
    match exif_tag(ctx, tiff::TAG_ISO).and_then(TagValue::as_u32) {
        Some(v) => Ok(Verdict::reading(format!("ISO {v}"), Measurement::Integer(v as i64))),
        None => absent(),
    }
}

fn focal_length(ctx: &EvaluationContext<'_>) -> Reading {
    match exif_tag(ctx, tiff::TAG_FOCAL_LENGTH).and_then(TagValue::as_f64) {
        Some(mm) => Ok(Verdict::reading(
            format!("{}mm", trim_float(mm)),
            Measurement::Number(mm),
        )),
        None => absent(),
    }
}

fn flash(ctx: &EvaluationContext<'_>) -> Reading {
    coded(ctx, tiff::TAG_FLASH, |code| {
        Some(if code & 1 == 1 { "Fired" } else { "Did not fire" })
    })
}

fn orientation(ctx: &EvaluationContext<'_>) -> Reading {
    coded(ctx, tiff::TAG_ORIENTATION, |code| match code {
        1 => Some("Normal"),
        2 => Some("Mirrored horizontally"),
        3 => Some("Rotated 180"),
        4 => Some("Mirrored vertically"),
        5 => Some("Mirrored, rotated 90 CCW"),
        6 => Some("Rotated 90 CW"),
        7 => Some("Mirrored, rotated 90 CW"),
        8 => Some("Rotated 90 CCW"),
        _ => None,
    })
}

fn copyright(ctx: &EvaluationContext<'_>) -> Reading {
    exif_text(ctx, tiff::TAG_COPYRIGHT)
}

fn resolution(ctx: &EvaluationContext<'_>) -> Reading {
    let Some((w, h)) = ctx.probe.dimensions() else {
        return Err(EvaluatorFailure::malformed("image dimensions unreadable"));
    };
    let megapixels = (w as f64 * h as f64 / 1_000_000.0 * 10.0).round() / 10.0;
    Ok(Verdict::reading(
        format!("{w}x{h}"),
        Measurement::record([
            ("width", Measurement::Integer(w as i64)),
            ("height", Measurement::Integer(h as i64)),
            ("megapixels", Measurement::Number(megapixels)),
        ]),
    ))
}

fn bit_depth(ctx: &EvaluationContext<'_>) -> Reading {
    match ctx.probe.bit_depth {
        Some(bits) => Ok(Verdict::reading(
            format!("{bits}-bit"),
            Measurement::Integer(bits as i64),
        )),
        None => Err(EvaluatorFailure::unavailable("bit depth not recorded in container")),
    }
}

fn compression_level(ctx: &EvaluationContext<'_>) -> Reading {
    match ctx.probe.format {
        ContainerFormat::Jpeg => {
            let estimate = ctx
                .probe
                .jpeg
                .as_ref()
                .and_then(|j| estimate_quality(&j.quant_tables))
                .ok_or_else(|| EvaluatorFailure::malformed("no quantization tables"))?;
            let level = match estimate.quality {
                90.. => "high",
                75..=89 => "medium",
                _ => "low",
            };
            Ok(Verdict::reading(
                format!("{level} (q={})", estimate.quality),
                Measurement::Integer(estimate.quality as i64),
            ))
        }
        ContainerFormat::Png | ContainerFormat::Bmp | ContainerFormat::Gif | ContainerFormat::Tiff => {
            Ok(Verdict::reading("lossless", Measurement::text("lossless")))
        }
        _ => Err(EvaluatorFailure::unavailable(
            "compression level unknown for this container",
        )),
    }
}

fn jpeg_layout<'a>(
    ctx: &'a EvaluationContext<'_>,
) -> Result<&'a crate::probe::jpeg::JpegLayout, EvaluatorFailure> {
    ctx.probe
        .jpeg
        .as_ref()
        .ok_or_else(|| EvaluatorFailure::malformed("JPEG structure unreadable"))
}

fn jpeg_quality(ctx: &EvaluationContext<'_>) -> Reading {
    let estimate = estimate_quality(&jpeg_layout(ctx)?.quant_tables)
        .ok_or_else(|| EvaluatorFailure::malformed("no quantization tables"))?;
    Ok(Verdict::reading(
        estimate.quality.to_string(),
        Measurement::Integer(estimate.quality as i64),
    ))
}

fn compression_ratio(ctx: &EvaluationContext<'_>) -> Reading {
    let Some((w, h)) = ctx.probe.dimensions() else {
        return Err(EvaluatorFailure::malformed("image dimensions unreadable"));
    };
    if ctx.bytes.is_empty() {
        return Err(EvaluatorFailure::malformed("empty file"));
    }
    let channels = channel_count(ctx) as f64;
    let bytes_per_sample = ctx.probe.bit_depth.map_or(1.0, |b| (b as f64 / 8.0).max(1.0));
    let raw = w as f64 * h as f64 * channels * bytes_per_sample;
    let ratio = (raw / ctx.bytes.len() as f64 * 100.0).round() / 100.0;
    Ok(Verdict::reading(
        format!("{ratio:.1}:1"),
        Measurement::Number(ratio),
    ))
}

fn channel_count(ctx: &EvaluationContext<'_>) -> usize {
    if let Some(jpeg) = ctx.probe.jpeg.as_ref().filter(|j| !j.components.is_empty()) {
        return jpeg.components.len();
    }
    match ctx.probe.png.as_ref().and_then(|p| p.color_type) {
        Some(0) | Some(3) => 1,
        Some(4) => 2,
        Some(6) => 4,
        _ if ctx.probe.has_alpha => 4,
        _ => 3,
    }
}

fn quantization_tables(ctx: &EvaluationContext<'_>) -> Reading {
    let layout = jpeg_layout(ctx)?;
    let estimate = estimate_quality(&layout.quant_tables)
        .ok_or_else(|| EvaluatorFailure::malformed("no quantization tables"))?;
    let label = if estimate.standard {
        format!("Standard (q={})", estimate.quality)
    } else {
        "Custom".to_string()
    };
    Ok(Verdict::reading(
        label,
        Measurement::record([
            ("standard", Measurement::Bool(estimate.standard)),
            ("tables", Measurement::Integer(layout.quant_tables.len() as i64)),
        ]),
    ))
}

fn huffman_tables(ctx: &EvaluationContext<'_>) -> Reading {
    let count = jpeg_layout(ctx)?.huffman_tables;
    Ok(Verdict::reading(
        format!("{count} tables"),
        Measurement::Integer(count as i64),
    ))
}

fn progressive_encoding(ctx: &EvaluationContext<'_>) -> Reading {
    flag(jpeg_layout(ctx)?.progressive(), "progressive", "baseline")
}

fn subsampling_ratio(ctx: &EvaluationContext<'_>) -> Reading {
    match jpeg_layout(ctx)?.subsampling() {
        Some(ratio) => Ok(Verdict::reading(ratio.clone(), Measurement::Text(ratio))),
        None => Err(EvaluatorFailure::malformed("component sampling unreadable")),
    }
}

/// EXIF pixel dimensions against the decoded frame.
fn declared_vs_actual(ctx: &EvaluationContext<'_>) -> Option<((u32, u32), (u32, u32))> {
    let exif: &ExifData = ctx.probe.exif()?;
    let ew = exif.get(tiff::TAG_PIXEL_X_DIMENSION)?.as_u32()?;
    let eh = exif.get(tiff::TAG_PIXEL_Y_DIMENSION)?.as_u32()?;
    let actual = ctx.probe.dimensions()?;
    if ew == 0 || eh == 0 {
        return None;
    }
    // orientation swaps are not edits
    if (eh, ew) == actual {
        return Some(((eh, ew), actual));
    }
    Some(((ew, eh), actual))
}

fn same_aspect(a: (u32, u32), b: (u32, u32)) -> bool {
    let ra = a.0 as f64 / a.1 as f64;
    let rb = b.0 as f64 / b.1 as f64;
    (ra - rb).abs() / ra <= 0.01
}

fn resized(ctx: &EvaluationContext<'_>) -> Reading {
    let Some((declared, actual)) = declared_vs_actual(ctx) else {
        return Ok(Verdict::reading("undetermined", Measurement::None));
    };
    flag(
        declared != actual && same_aspect(declared, actual),
        "dimensions scaled from recorded size",
        "recorded size kept",
    )
}

fn cropped(ctx: &EvaluationContext<'_>) -> Reading {
    let Some((declared, actual)) = declared_vs_actual(ctx) else {
        return Ok(Verdict::reading("undetermined", Measurement::None));
    };
    flag(
        declared != actual && !same_aspect(declared, actual),
        "framing differs from recorded size",
        "recorded framing kept",
    )
}

fn ai_generated(ctx: &EvaluationContext<'_>) -> Reading {
    let declared = ctx.probe.xmp().is_some_and(|xmp| {
        AI_SOURCE_TYPES
            .iter()
            .any(|needle| memmem::find(xmp.as_bytes(), needle).is_some())
    });
    flag(declared, "declared as generated media", "no generative declaration")
}

fn file_format(ctx: &EvaluationContext<'_>) -> Reading {
    let detected = ctx.probe.format;
    let declared = ctx.attributes.mime_type.to_ascii_lowercase();
    let matches = detected.mime_type().is_some_and(|m| m == declared);
    let label = if matches || detected == ContainerFormat::Unknown {
        format!("{} ({declared})", detected.name())
    } else {
        format!("{} (declared {declared})", detected.name())
    };
    Ok(Verdict::reading(
        label,
        Measurement::record([
            ("detected", Measurement::text(detected.name())),
            ("declared", Measurement::Text(declared)),
            ("matches", Measurement::Bool(matches)),
        ]),
    ))
}

fn last_modified(ctx: &EvaluationContext<'_>) -> Reading {
    match ctx.attributes.last_modified {
        Some(ts) => {
            let text = ts.to_rfc3339();
            Ok(Verdict::reading(text.clone(), Measurement::Text(text)))
        }
        None => Ok(Verdict::reading("unknown", Measurement::None)),
    }
}

fn has_metadata(ctx: &EvaluationContext<'_>) -> Reading {
    flag(
        ctx.probe.exif().is_some() || ctx.probe.xmp().is_some(),
        "yes",
        "no",
    )
}

fn has_color_profile(ctx: &EvaluationContext<'_>) -> Reading {
    flag(ctx.probe.has_icc_profile(), "ICC profile embedded", "no")
}

fn has_thumbnail(ctx: &EvaluationContext<'_>) -> Reading {
    let exif_thumb = ctx.probe.exif().is_some_and(|e| e.thumbnail.is_some());
    let mpf_preview = ctx
        .probe
        .jpeg
        .as_ref()
        .and_then(|j| j.mpf.as_ref())
        .is_some_and(|m| m.entries.len() > 1);
    flag(exif_thumb || mpf_preview, "yes", "no")
}

fn has_layers(ctx: &EvaluationContext<'_>) -> Reading {
    let layered = ctx
        .probe
        .tiff
        .as_ref()
        .is_some_and(|t| t.get(TAG_IMAGE_SOURCE_DATA).is_some());
    flag(layered, "layer data present", "no")
}

fn has_alpha_channel(ctx: &EvaluationContext<'_>) -> Reading {
    flag(ctx.probe.has_alpha, "yes", "no")
}

fn trim_float(v: f64) -> String {
    let s = format!("{v:.1}");
    s.strip_suffix(".0").map(str::to_string).unwrap_or(s)
}
