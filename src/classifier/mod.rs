//! Outbound client for the external diabetic retinopathy classifier.
//!
//! The classifier is a black box reached over HTTP. This module owns the
//! request, the timeout retry, and the reshaping of whatever JSON the model
//! returns into a `Prediction`.

pub mod http;
pub mod response;
pub mod suggestion;

pub use http::HttpClassifier;
pub use response::{normalize_confidence, parse_response};
pub use suggestion::suggestion_for;

use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("Classifier endpoint is not configured")]
    NotConfigured,

    #[error("Cannot reach classifier at {0}")]
    Connection(String),

    #[error("Classifier timed out after {attempts} attempt(s)")]
    Timeout { attempts: u32 },

    #[error("Classifier returned error (status {status}): {body}")]
    Upstream { status: u16, body: String },

    #[error("Failed to parse classifier response: {0}")]
    ResponseParsing(String),

    #[error("HTTP client error: {0}")]
    HttpClient(String),
}

/// An image ready to forward.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub content_type: String,
}

/// Reshaped classifier answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub prediction: String,
    pub confidence: f64,
    pub suggestion: String,
}

/// Anything that can grade a fundus image. Blocking; callers run it on
/// `spawn_blocking`.
pub trait RetinaClassifier: Send + Sync {
    fn classify(&self, image: &ImageUpload) -> Result<Prediction, ClassifierError>;

    fn is_configured(&self) -> bool {
        true
    }
}

/// Stand-in used when no endpoint URL is configured.
pub struct UnconfiguredClassifier;

impl RetinaClassifier for UnconfiguredClassifier {
    fn classify(&self, _image: &ImageUpload) -> Result<Prediction, ClassifierError> {
        Err(ClassifierError::NotConfigured)
    }

    fn is_configured(&self) -> bool {
        false
    }
}

/// Mock classifier for testing: returns a fixed label and confidence,
/// or a fixed error.
#[cfg(test)]
pub struct MockClassifier {
    outcome: Result<(String, f64), fn() -> ClassifierError>,
}

#[cfg(test)]
impl MockClassifier {
    pub fn new(label: &str, confidence: f64) -> Self {
        Self {
            outcome: Ok((label.to_string(), confidence)),
        }
    }

    pub fn failing(make_error: fn() -> ClassifierError) -> Self {
        Self {
            outcome: Err(make_error),
        }
    }
}

#[cfg(test)]
impl RetinaClassifier for MockClassifier {
    fn classify(&self, _image: &ImageUpload) -> Result<Prediction, ClassifierError> {
        match &self.outcome {
            Ok((label, confidence)) => Ok(Prediction {
                prediction: label.clone(),
                confidence: *confidence,
                suggestion: suggestion_for(label).to_string(),
            }),
            Err(make_error) => Err(make_error()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload() -> ImageUpload {
        ImageUpload {
            bytes: vec![0xFF, 0xD8, 0xFF, 0xE0],
            file_name: "eye.jpg".into(),
            content_type: "image/jpeg".into(),
        }
    }

    #[test]
    fn unconfigured_always_fails() {
        let c = UnconfiguredClassifier;
        assert!(!c.is_configured());
        assert!(matches!(c.classify(&upload()), Err(ClassifierError::NotConfigured)));
    }

    #[test]
    fn mock_attaches_suggestion() {
        let c = MockClassifier::new("Moderate", 0.87);
        let p = c.classify(&upload()).unwrap();
        assert_eq!(p.prediction, "Moderate");
        assert_eq!(p.confidence, 0.87);
        assert_eq!(p.suggestion, suggestion_for("Moderate"));
    }

    #[test]
    fn mock_failure() {
        let c = MockClassifier::failing(|| ClassifierError::Timeout { attempts: 3 });
        assert!(matches!(
            c.classify(&upload()),
            Err(ClassifierError::Timeout { attempts: 3 })
        ));
    }
}
