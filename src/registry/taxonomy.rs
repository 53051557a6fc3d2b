use super::Applicability::{AppleDevice, ExifPresent, FlashPixPresent, Jpeg, MpfPresent};
use super::CategoryId::{Advanced, Compression, Editing, Exif, File, Professional, Quality};
use super::{CategoryDescriptor, MetricDescriptor as M};

pub(super) fn categories() -> Vec<CategoryDescriptor> {
    vec![
        CategoryDescriptor {
            id: Professional,
            label: "Professional forensics",
            description: "Structural originality checks against camera-produced files",
        },
        CategoryDescriptor {
            id: Exif,
            label: "EXIF fields",
            description: "Capture parameters recorded by the device",
        },
        CategoryDescriptor {
            id: Quality,
            label: "Image quality",
            description: "Resolution and tonal measurements",
        },
        CategoryDescriptor {
            id: Compression,
            label: "Compression analysis",
            description: "JPEG encoder parameters and compression artefacts",
        },
        CategoryDescriptor {
            id: Editing,
            label: "Editing traces",
            description: "Flags for common post-processing operations",
        },
        CategoryDescriptor {
            id: Advanced,
            label: "Advanced analysis",
            description: "Pixel-level manipulation heuristics",
        },
        CategoryDescriptor {
            id: File,
            label: "File properties",
            description: "Container-level properties of the submitted file",
        },
    ]
}

pub(super) fn metrics() -> Vec<M> {
    let mut out = Vec::with_capacity(74);
    out.extend(professional());
    out.extend(exif());
    out.extend(quality());
    out.extend(compression());
    out.extend(editing());
    out.extend(advanced());
    out.extend(file());
    out
}

fn professional() -> [M; 14] {
    [
        M::status(
            "professional.exif_format_validation",
            Professional,
            "EXIF format validation",
            "Whether the file is a standard EXIF JPEG",
        ),
        M::status(
            "professional.exif_internal_consistency",
            Professional,
            "EXIF internal consistency",
            "Whether EXIF fields contradict each other",
        )
        .when(ExifPresent),
        M::status(
            "professional.exif_external_consistency",
            Professional,
            "EXIF external consistency",
            "Whether the parameters EXIF describes match the image itself",
        )
        .when(ExifPresent),
        M::status(
            "professional.third_party_software_data",
            Professional,
            "Third-party software data",
            "Whether editing software inserted data into the file",
        ),
        M::status(
            "professional.manufacturer_note_integrity",
            Professional,
            "Manufacturer note integrity",
            "Whether a maker note is present and intact",
        )
        .when(ExifPresent),
        M::status(
            "professional.embedded_thumbnail_consistency",
            Professional,
            "Embedded thumbnail consistency",
            "Whether every readable embedded preview agrees with the primary image",
        )
        .when(ExifPresent),
        M::status(
            "professional.compression_fingerprint",
            Professional,
            "Compression fingerprint",
            "Whether the JPEG compression fingerprint matches a manufacturer encoder",
        )
        .when(Jpeg),
        M::status(
            "professional.mpf_data_integrity",
            Professional,
            "MPF data integrity",
            "Whether Multi-Picture Format pointers resolve to embedded images",
        )
        .when(MpfPresent),
        M::status(
            "professional.flashpix_ready_data",
            Professional,
            "FlashPix-ready data",
            "Validity of FPXR extension data written by some manufacturers",
        )
        .when(FlashPixPresent),
        M::status(
            "professional.apple_arot_data",
            Professional,
            "Apple AROT data",
            "Agreement between the AROT record and the image on Apple devices",
        )
        .when(AppleDevice),
        M::status(
            "professional.magic_exif_legacy_data",
            Professional,
            "MagicEXIF legacy data",
            "Leftovers of legacy MagicEXIF metadata editors",
        ),
        M::status(
            "professional.histogram_integrity",
            Professional,
            "Histogram integrity",
            "Whether the histogram shows obvious manual adjustment",
        ),
        M::status(
            "professional.aspect_ratio_integrity",
            Professional,
            "Aspect ratio integrity",
            "Whether the aspect ratio matches a common sensor format",
        ),
        M::status(
            "professional.image_size_integrity",
            Professional,
            "Image size integrity",
            "Whether the image dimensions are implausibly small",
        ),
    ]
}

fn exif() -> [M; 15] {
    [
        M::reading("exif.has_exif", Exif, "EXIF present", "EXIF block found"),
        M::reading("exif.camera_model", Exif, "Camera model", "Make and model"),
        M::reading("exif.lens", Exif, "Lens", "Lens model"),
        M::reading("exif.date_time", Exif, "Date/time", "Capture timestamp"),
        M::reading("exif.gps_location", Exif, "GPS location", "GPS sub-IFD present"),
        M::reading("exif.software", Exif, "Software", "Processing software tag"),
        M::reading("exif.color_space", Exif, "Color space", "Declared color space"),
        M::reading("exif.white_balance", Exif, "White balance", "White balance mode"),
        M::reading("exif.exposure_time", Exif, "Exposure time", "Shutter speed"),
        M::reading("exif.f_number", Exif, "F-number", "Aperture"),
        M::reading("exif.iso", Exif, "ISO", "Sensor sensitivity"),
        M::reading("exif.focal_length", Exif, "Focal length", "Lens focal length"),
        M::reading("exif.flash", Exif, "Flash", "Flash state"),
        M::reading("exif.orientation", Exif, "Orientation", "Stored orientation"),
        M::reading("exif.copyright", Exif, "Copyright", "Copyright notice"),
    ]
}

fn quality() -> [M; 10] {
    [
        M::reading("quality.resolution", Quality, "Resolution", "Pixel dimensions"),
        M::reading("quality.bit_depth", Quality, "Bit depth", "Bits per sample"),
        M::reading(
            "quality.compression",
            Quality,
            "Compression level",
            "Estimated encoder quality",
        ),
        M::reading("quality.noise_level", Quality, "Noise level", "Sensor noise estimate"),
        M::reading("quality.sharpness", Quality, "Sharpness", "Edge acutance"),
        M::reading("quality.contrast", Quality, "Contrast", "Global contrast"),
        M::reading("quality.saturation", Quality, "Saturation", "Mean saturation"),
        M::reading("quality.brightness", Quality, "Brightness", "Mean luminance"),
        M::reading(
            "quality.dynamic_range",
            Quality,
            "Dynamic range",
            "Usable tonal range in stops",
        ),
        M::reading(
            "quality.color_accuracy",
            Quality,
            "Color accuracy",
            "Deviation from reference colors",
        ),
    ]
}

fn compression() -> [M; 8] {
    [
        M::reading(
            "compression.jpeg_quality",
            Compression,
            "JPEG quality",
            "Quality factor estimated from the luminance table",
        )
        .when(Jpeg),
        M::reading(
            "compression.compression_ratio",
            Compression,
            "Compression ratio",
            "Uncompressed size over file size",
        ),
        M::reading(
            "compression.block_artifacts",
            Compression,
            "Block artifacts",
            "Visible 8x8 block boundaries",
        )
        .adverse(),
        M::reading(
            "compression.quantization_tables",
            Compression,
            "Quantization tables",
            "Standard scaled tables or custom tables",
        )
        .when(Jpeg),
        M::reading(
            "compression.huffman_tables",
            Compression,
            "Huffman tables",
            "Standard or optimized Huffman coding",
        )
        .when(Jpeg),
        M::reading(
            "compression.progressive_encoding",
            Compression,
            "Progressive encoding",
            "Progressive scan structure",
        )
        .when(Jpeg),
        M::reading(
            "compression.subsampling_ratio",
            Compression,
            "Chroma subsampling",
            "Luma/chroma sampling ratio",
        )
        .when(Jpeg),
        M::reading(
            "compression.dct_coefficients",
            Compression,
            "DCT coefficients",
            "Whether DCT coefficient statistics look re-encoded",
        )
        .when(Jpeg),
    ]
}

fn editing() -> [M; 10] {
    [
        M::reading("editing.resized", Editing, "Resized", "Image was rescaled").adverse(),
        M::reading("editing.cropped", Editing, "Cropped", "Image was cropped").adverse(),
        M::reading("editing.rotated", Editing, "Rotated", "Pixels were rotated").adverse(),
        M::reading("editing.filtered", Editing, "Filtered", "Filter applied").adverse(),
        M::reading(
            "editing.color_adjusted",
            Editing,
            "Color adjusted",
            "Color or tone curves changed",
        )
        .adverse(),
        M::reading("editing.sharpened", Editing, "Sharpened", "Sharpening applied").adverse(),
        M::reading("editing.blurred", Editing, "Blurred", "Blur applied").adverse(),
        M::reading("editing.watermarked", Editing, "Watermarked", "Watermark added").adverse(),
        M::reading("editing.cloned", Editing, "Cloned", "Clone-stamp regions").adverse(),
        M::reading(
            "editing.ai_generated",
            Editing,
            "AI generated",
            "Declared or detected generative origin",
        )
        .adverse(),
    ]
}

fn advanced() -> [M; 10] {
    [
        M::reading(
            "advanced.error_level_analysis",
            Advanced,
            "Error level analysis",
            "Recompression error level",
        ),
        M::reading(
            "advanced.duplicate_regions",
            Advanced,
            "Duplicate regions",
            "Copy-move regions",
        )
        .adverse(),
        M::reading(
            "advanced.inconsistent_lighting",
            Advanced,
            "Inconsistent lighting",
            "Light direction disagreement",
        )
        .adverse(),
        M::reading(
            "advanced.shadow_anomaly",
            Advanced,
            "Shadow anomaly",
            "Shadow geometry disagreement",
        )
        .adverse(),
        M::reading(
            "advanced.perspective_issues",
            Advanced,
            "Perspective issues",
            "Vanishing point disagreement",
        )
        .adverse(),
        M::reading(
            "advanced.edge_inconsistency",
            Advanced,
            "Edge inconsistency",
            "Splicing boundaries",
        )
        .adverse(),
        M::reading(
            "advanced.color_histogram_anomaly",
            Advanced,
            "Color histogram anomaly",
            "Comb or gap patterns in channel histograms",
        )
        .adverse(),
        M::reading(
            "advanced.frequency_analysis",
            Advanced,
            "Frequency analysis",
            "Spectral periodicity",
        ),
        M::reading(
            "advanced.statistical_outliers",
            Advanced,
            "Statistical outliers",
            "Local noise statistics outliers",
        )
        .adverse(),
        M::reading(
            "advanced.deepfake_detection",
            Advanced,
            "Deepfake detection",
            "Synthetic face likelihood",
        )
        .adverse(),
    ]
}

fn file() -> [M; 7] {
    [
        M::reading("file.format", File, "Format", "Declared and detected container"),
        M::reading("file.last_modified", File, "Last modified", "File modification time"),
        M::reading("file.has_metadata", File, "Has metadata", "EXIF or XMP present"),
        M::reading(
            "file.has_color_profile",
            File,
            "Has color profile",
            "Embedded ICC profile",
        ),
        M::reading("file.has_thumbnail", File, "Has thumbnail", "Embedded preview image"),
        M::reading("file.has_layers", File, "Has layers", "Layered document data"),
        M::reading(
            "file.has_alpha_channel",
            File,
            "Has alpha channel",
            "Transparency channel present",
        ),
    ]
}
