//! Analysis outcome attached to a completed job.
//!
//! Scores are range-checked on construction and on deserialization, and
//! `is_authentic` is derived from the prediction rather than stored, so a
//! result can never disagree with itself.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A normalized score in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Score(f64);

impl Score {
    pub fn new(value: f64) -> Result<Self, CoreError> {
        if !(0.0..=1.0).contains(&value) {
            return Err(CoreError::InvalidPayload(format!(
                "Score must be within [0, 1], got {value}"
            )));
        }
        Ok(Self(value))
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for Score {
    type Error = CoreError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Score> for f64 {
    fn from(score: Score) -> Self {
        score.0
    }
}

/// Overall verdict of the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Prediction {
    Authentic,
    Deepfake,
}

impl Prediction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Authentic => "authentic",
            Self::Deepfake => "deepfake",
        }
    }
}

impl std::fmt::Display for Prediction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sub-signals contributing to the overall confidence.
///
/// Which signals are reported depends on the media type: video carries
/// `temporal_artifacts`, images `facial_inconsistencies`, and audio none
/// of the three. Signals without a named field are kept in `other`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facial_inconsistencies: Option<Score>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporal_artifacts: Option<Score>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression_anomalies: Option<Score>,
    #[serde(flatten)]
    pub other: BTreeMap<String, Score>,
}

impl Evidence {
    pub fn is_empty(&self) -> bool {
        self.facial_inconsistencies.is_none()
            && self.temporal_artifacts.is_none()
            && self.compression_anomalies.is_none()
            && self.other.is_empty()
    }
}

/// Presentation tier for a confidence value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceBand {
    /// `>= 0.9`
    High,
    /// `>= 0.7`
    Medium,
    Low,
}

impl ConfidenceBand {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl std::fmt::Display for ConfidenceBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one analysis. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireResult", into = "WireResult")]
pub struct AnalysisResult {
    pub prediction: Prediction,
    pub confidence: Score,
    pub models_used: Vec<String>,
    /// Backend processing time in seconds.
    pub processing_time: f64,
    pub evidence: Evidence,
}

impl AnalysisResult {
    pub fn is_authentic(&self) -> bool {
        self.prediction == Prediction::Authentic
    }

    pub fn confidence_band(&self) -> ConfidenceBand {
        let c = self.confidence.value();
        if c >= 0.9 {
            ConfidenceBand::High
        } else if c >= 0.7 {
            ConfidenceBand::Medium
        } else {
            ConfidenceBand::Low
        }
    }
}

/// Flat shape exchanged with the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireResult {
    prediction: Prediction,
    confidence: Score,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    is_authentic: Option<bool>,
    #[serde(default)]
    models_used: Vec<String>,
    #[serde(default)]
    processing_time: f64,
    #[serde(default)]
    evidence: Evidence,
}

impl TryFrom<WireResult> for AnalysisResult {
    type Error = CoreError;

    fn try_from(wire: WireResult) -> Result<Self, Self::Error> {
        let derived = wire.prediction == Prediction::Authentic;
        if let Some(reported) = wire.is_authentic {
            if reported != derived {
                return Err(CoreError::InvalidPayload(format!(
                    "is_authentic={reported} contradicts prediction '{}'",
                    wire.prediction
                )));
            }
        }
        if !wire.processing_time.is_finite() || wire.processing_time < 0.0 {
            return Err(CoreError::InvalidPayload(format!(
                "processing_time must be a non-negative number, got {}",
                wire.processing_time
            )));
        }
        Ok(Self {
            prediction: wire.prediction,
            confidence: wire.confidence,
            models_used: wire.models_used,
            processing_time: wire.processing_time,
            evidence: wire.evidence,
        })
    }
}

impl From<AnalysisResult> for WireResult {
    fn from(result: AnalysisResult) -> Self {
        Self {
            is_authentic: Some(result.is_authentic()),
            prediction: result.prediction,
            confidence: result.confidence,
            models_used: result.models_used,
            processing_time: result.processing_time,
            evidence: result.evidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    fn payload(prediction: &str, confidence: f64, is_authentic: bool) -> serde_json::Value {
        json!({
            "prediction": prediction,
            "confidence": confidence,
            "is_authentic": is_authentic,
            "models_used": ["efficientnet", "xception"],
            "processing_time": 2.31,
            "evidence": {
                "facial_inconsistencies": 0.8,
                "temporal_artifacts": 0.4,
                "compression_anomalies": 0.1
            }
        })
    }

    #[test]
    fn score_bounds() {
        assert!(Score::new(0.0).is_ok());
        assert!(Score::new(1.0).is_ok());
        assert!(Score::new(1.0001).is_err());
        assert!(Score::new(-0.1).is_err());
        assert!(Score::new(f64::NAN).is_err());
    }

    #[test]
    fn parses_deepfake_result() {
        let result: AnalysisResult =
            serde_json::from_value(payload("deepfake", 0.91, false)).unwrap();
        assert_eq!(result.prediction, Prediction::Deepfake);
        assert!(!result.is_authentic());
        assert_eq!(result.confidence.value(), 0.91);
        assert_eq!(result.models_used.len(), 2);
        assert_eq!(result.confidence_band(), ConfidenceBand::High);
    }

    #[test]
    fn contradictory_is_authentic_rejected() {
        let err = serde_json::from_value::<AnalysisResult>(payload("authentic", 0.7, false));
        assert!(err.is_err());
    }

    #[test]
    fn out_of_range_evidence_rejected() {
        let mut value = payload("authentic", 0.7, true);
        value["evidence"]["temporal_artifacts"] = json!(1.5);
        assert!(serde_json::from_value::<AnalysisResult>(value).is_err());
    }

    #[test]
    fn serialized_form_carries_derived_flag() {
        let result: AnalysisResult =
            serde_json::from_value(payload("authentic", 0.75, true)).unwrap();
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["is_authentic"], true);
        assert_eq!(value["prediction"], "authentic");
    }

    #[test]
    fn negative_processing_time_rejected() {
        let mut value = payload("deepfake", 0.5, false);
        value["processing_time"] = json!(-1.0);
        assert_matches!(
            serde_json::from_value::<AnalysisResult>(value),
            Err(e) if e.to_string().contains("processing_time")
        );
    }

    #[test]
    fn video_evidence_keeps_extra_signals() {
        let mut value = payload("deepfake", 0.8, false);
        value["evidence"] = json!({
            "temporal_artifacts": 0.6,
            "frame_consistency": 0.3,
            "compression_anomalies": 0.2
        });
        let result: AnalysisResult = serde_json::from_value(value).unwrap();
        let evidence = &result.evidence;
        assert!(evidence.facial_inconsistencies.is_none());
        assert_eq!(evidence.temporal_artifacts.map(Score::value), Some(0.6));
        assert_eq!(evidence.other["frame_consistency"].value(), 0.3);
    }

    #[test]
    fn image_evidence_without_temporal_signal() {
        let mut value = payload("authentic", 0.75, true);
        value["evidence"] = json!({
            "facial_inconsistencies": 0.1,
            "texture_artifacts": 0.2,
            "compression_anomalies": 0.05
        });
        let result: AnalysisResult = serde_json::from_value(value).unwrap();
        assert!(result.evidence.temporal_artifacts.is_none());
        assert_eq!(result.evidence.other["texture_artifacts"].value(), 0.2);
    }

    #[test]
    fn audio_and_empty_evidence() {
        let mut value = payload("authentic", 0.7, true);
        value["evidence"] = json!({
            "spectral_anomalies": 0.1,
            "voice_consistency": 0.9,
            "synthesis_artifacts": 0.2
        });
        let result: AnalysisResult = serde_json::from_value(value).unwrap();
        assert!(result.evidence.compression_anomalies.is_none());
        assert_eq!(result.evidence.other.len(), 3);

        let mut value = payload("authentic", 0.7, true);
        value["evidence"] = json!({});
        let result: AnalysisResult = serde_json::from_value(value).unwrap();
        assert!(result.evidence.is_empty());

        let mut value = payload("authentic", 0.7, true);
        value.as_object_mut().unwrap().remove("evidence");
        let result: AnalysisResult = serde_json::from_value(value).unwrap();
        assert!(result.evidence.is_empty());
    }

    #[test]
    fn out_of_range_extra_signal_rejected() {
        let mut value = payload("deepfake", 0.8, false);
        value["evidence"]["frame_consistency"] = json!(2.0);
        assert!(serde_json::from_value::<AnalysisResult>(value).is_err());
    }

    #[test]
    fn confidence_bands() {
        let mut result: AnalysisResult =
            serde_json::from_value(payload("deepfake", 0.7, false)).unwrap();
        assert_eq!(result.confidence_band(), ConfidenceBand::Medium);
        result.confidence = Score::new(0.69).unwrap();
        assert_eq!(result.confidence_band(), ConfidenceBand::Low);
    }
}
