//! Client-side CSV export of completed analyses.
//!
//! Distinct from the backend's `/api/export/{format}` download: this
//! builder works purely from results already held on the client and is
//! deterministic, so the same input always yields the same bytes.

use crate::format::format_percentage;
use crate::job::AnalysisJob;
use crate::result::Score;

/// Header row of the CSV export.
pub const CSV_HEADER: &str = "Filename,File Type,Prediction,Confidence,Facial Inconsistencies,Temporal Artifacts,Compression Anomalies,Processing Time,Timestamp";

/// Wrap a filename in double quotes, doubling any embedded quote.
fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

/// A signal the backend did not report becomes an empty cell.
fn score_cell(score: Option<Score>) -> String {
    score.map_or_else(String::new, |s| format_percentage(s.value(), 1))
}

/// Render one CSV row, or `None` if the job carries no result.
pub fn csv_row(job: &AnalysisJob) -> Option<String> {
    let result = job.result()?;
    let evidence = &result.evidence;
    Some(format!(
        "{},{},{},{},{},{},{},{:.2}s,{}",
        quote(&job.filename),
        job.file_type,
        result.prediction,
        format_percentage(result.confidence.value(), 1),
        score_cell(evidence.facial_inconsistencies),
        score_cell(evidence.temporal_artifacts),
        score_cell(evidence.compression_anomalies),
        result.processing_time,
        job.created_at.to_rfc3339(),
    ))
}

/// Build a CSV document: header plus one row per job that has a result,
/// in the order given. Every line ends with `\n`.
pub fn build_csv<'a>(jobs: impl IntoIterator<Item = &'a AnalysisJob>) -> String {
    let mut out = String::with_capacity(CSV_HEADER.len() + 1);
    out.push_str(CSV_HEADER);
    out.push('\n');
    for row in jobs.into_iter().filter_map(csv_row) {
        out.push_str(&row);
        out.push('\n');
    }
    out
}

/// Short plain-text summary suitable for sharing a single result.
pub fn share_text(job: &AnalysisJob) -> String {
    let (prediction, confidence) = match job.result() {
        Some(r) => (r.prediction.as_str(), format_percentage(r.confidence.value(), 1)),
        None => ("unknown", "0%".to_string()),
    };
    format!(
        "DeepFake Analysis Result:\n\nFile: {}\nPrediction: {prediction}\nConfidence: {confidence}\nAnalyzed: {}",
        job.filename,
        job.created_at.to_rfc3339(),
    )
}
