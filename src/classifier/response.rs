use serde_json::Value;

use super::{suggestion_for, ClassifierError, Prediction};
use crate::models::enums::DrGrade;

const LABEL_KEYS: &[&str] = &["prediction", "label", "class", "result"];
const CONFIDENCE_KEYS: &[&str] = &["confidence", "probability", "score"];

/// Map a raw confidence onto [0, 1]. Values in (1, 100] are percentages.
/// Negative, non-finite or >100 values are rejected.
pub fn normalize_confidence(raw: f64) -> Option<f64> {
    if !raw.is_finite() || raw < 0.0 {
        return None;
    }
    if raw <= 1.0 {
        Some(raw)
    } else if raw <= 100.0 {
        Some(raw / 100.0)
    } else {
        None
    }
}

/// Reshape a classifier JSON body into a `Prediction`.
///
/// Known grades are canonicalised to their display label; anything else is
/// kept verbatim. A missing confidence reads as 0.
pub fn parse_response(body: &str) -> Result<Prediction, ClassifierError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| ClassifierError::ResponseParsing(e.to_string()))?;
    let object = value
        .as_object()
        .ok_or_else(|| ClassifierError::ResponseParsing("expected a JSON object".into()))?;

    let raw_label = LABEL_KEYS
        .iter()
        .filter_map(|key| object.get(*key))
        .find_map(label_text)
        .ok_or_else(|| ClassifierError::ResponseParsing("response has no label".into()))?;

    let prediction = match DrGrade::from_label(&raw_label) {
        Some(grade) => grade.label().to_string(),
        None => raw_label,
    };

    let confidence = CONFIDENCE_KEYS
        .iter()
        .filter_map(|key| object.get(*key))
        .find_map(number)
        .map(|raw| normalize_confidence(raw).unwrap_or_else(|| raw.clamp(0.0, 1.0)))
        .unwrap_or(0.0);

    let suggestion = suggestion_for(&prediction).to_string();
    Ok(Prediction {
        prediction,
        confidence,
        suggestion,
    })
}

fn label_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_normalisation() {
        assert_eq!(normalize_confidence(0.0), Some(0.0));
        assert_eq!(normalize_confidence(0.42), Some(0.42));
        assert_eq!(normalize_confidence(1.0), Some(1.0));
        assert_eq!(normalize_confidence(87.0), Some(0.87));
        assert_eq!(normalize_confidence(100.0), Some(1.0));
        assert_eq!(normalize_confidence(100.5), None);
        assert_eq!(normalize_confidence(-0.1), None);
        assert_eq!(normalize_confidence(f64::NAN), None);
    }

    #[test]
    fn reads_prediction_and_confidence() {
        let p = parse_response(r#"{"prediction": "Moderate", "confidence": 0.91}"#).unwrap();
        assert_eq!(p.prediction, "Moderate");
        assert_eq!(p.confidence, 0.91);
        assert_eq!(p.suggestion, suggestion_for("Moderate"));
    }

    #[test]
    fn falls_back_through_alias_keys() {
        let p = parse_response(r#"{"class": "Proliferate_DR", "probability": 73}"#).unwrap();
        assert_eq!(p.prediction, "Proliferative DR");
        assert!((p.confidence - 0.73).abs() < 1e-9);

        let p = parse_response(r#"{"result": "mild", "score": "64.5%"}"#).unwrap();
        assert_eq!(p.prediction, "Mild");
        assert!((p.confidence - 0.645).abs() < 1e-9);
    }

    #[test]
    fn first_present_label_key_wins() {
        let p = parse_response(r#"{"label": "Severe", "class": "Mild"}"#).unwrap();
        assert_eq!(p.prediction, "Severe");
    }

    #[test]
    fn numeric_grade_label() {
        let p = parse_response(r#"{"prediction": 0, "confidence": 0.99}"#).unwrap();
        assert_eq!(p.prediction, "No DR");
    }

    #[test]
    fn unknown_label_is_kept_verbatim() {
        let p = parse_response(r#"{"prediction": "Cataract", "confidence": 0.5}"#).unwrap();
        assert_eq!(p.prediction, "Cataract");
        assert_eq!(p.suggestion, super::super::suggestion::GENERIC_SUGGESTION);
    }

    #[test]
    fn missing_confidence_is_zero() {
        let p = parse_response(r#"{"label": "Mild"}"#).unwrap();
        assert_eq!(p.confidence, 0.0);
    }

    #[test]
    fn missing_label_is_an_error() {
        let err = parse_response(r#"{"confidence": 0.9}"#).unwrap_err();
        assert!(matches!(err, ClassifierError::ResponseParsing(_)));
        let err = parse_response(r#"{"prediction": "  "}"#).unwrap_err();
        assert!(matches!(err, ClassifierError::ResponseParsing(_)));
    }

    #[test]
    fn non_json_is_an_error() {
        assert!(matches!(
            parse_response("<html>oops</html>"),
            Err(ClassifierError::ResponseParsing(_))
        ));
        assert!(matches!(
            parse_response("[1, 2]"),
            Err(ClassifierError::ResponseParsing(_))
        ));
    }
}
