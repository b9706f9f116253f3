use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub image_url: String,
    #[serde(skip_serializing)]
    pub image_path: String,
    pub prediction: String,
    pub confidence: f64,
    pub suggestion: String,
    pub manual_suggestion: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: String,
    pub updated_at: String,
}

impl ScanResult {
    /// Manual override wins over the generated text.
    pub fn effective_suggestion(&self) -> &str {
        self.manual_suggestion
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(&self.suggestion)
    }
}

/// Scan row joined with the owning patient's name, for admin listings.
#[derive(Debug, Clone, Serialize)]
pub struct ScanWithPatient {
    #[serde(flatten)]
    pub scan: ScanResult,
    pub patient_name: String,
}
