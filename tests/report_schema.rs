//! JSON persistence of published reports.

mod common;

use std::fs;

use common::*;
use originscope::pipeline::AnalysisController;
use originscope::report::{AnalysisReport, REPORT_SCHEMA_VERSION, ReportError};
use serde_json::Value;

fn published_report() -> AnalysisReport {
    let controller = AnalysisController::with_builtins(fast_config()).expect("controller");
    let report = controller
        .analyze(jpeg_submission(camera_jpeg(), "camera.jpg"), WAIT)
        .expect("report");
    (*report).clone()
}

#[test]
fn report_survives_a_trip_through_disk() {
    let report = published_report();
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("report.json");
    fs::write(&path, report.to_json_pretty().expect("json")).expect("write");

    let text = fs::read_to_string(&path).expect("read");
    let restored = AnalysisReport::from_json(&text).expect("parse");
    assert_eq!(restored, report);
}

#[test]
fn document_layout() {
    let report = published_report();
    let value: Value = serde_json::from_str(&report.to_json().expect("json")).expect("value");

    assert_eq!(value["schema_version"], REPORT_SCHEMA_VERSION);
    assert_eq!(value["subject"]["file_name"], "camera.jpg");
    assert_eq!(value["tier"], "likely_original");
    assert!(value["overall_score"].as_u64().is_some());
    let categories = value["categories"].as_array().expect("categories");
    assert_eq!(categories.len(), 7);
    assert_eq!(categories[0]["id"], "professional");

    let format = categories[0]["metrics"]
        .as_array()
        .expect("metrics")
        .iter()
        .find(|m| m["metric_id"] == "professional.exif_format_validation")
        .expect("format entry");
    assert_eq!(format["status"], "pass");

    let diagnostics = value["diagnostics"].as_array().expect("diagnostics");
    assert!(
        diagnostics
            .iter()
            .all(|d| d["failure"]["kind"].as_str().is_some())
    );
}

#[test]
fn other_schema_versions_are_refused() {
    let report = published_report();
    let mut value: Value = serde_json::from_str(&report.to_json().expect("json")).expect("value");
    value["schema_version"] = Value::from(REPORT_SCHEMA_VERSION + 1);

    let err = AnalysisReport::from_json(&value.to_string()).expect_err("refused");
    assert!(matches!(
        err,
        ReportError::IncompatibleSchema { found, expected }
            if found == u64::from(REPORT_SCHEMA_VERSION + 1) && expected == REPORT_SCHEMA_VERSION
    ));

    let object = value.as_object_mut().expect("object");
    object.remove("schema_version");
    let err = AnalysisReport::from_json(&value.to_string()).expect_err("refused");
    assert!(matches!(err, ReportError::MissingSchemaVersion));
}

#[test]
fn garbage_is_a_json_error() {
    let err = AnalysisReport::from_json("{not json").expect_err("refused");
    assert!(matches!(err, ReportError::Json(_)));
}
