use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }

            pub fn all() -> &'static [Self] {
                &[$(Self::$variant),+]
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(Role {
    Admin => "admin",
    Patient => "patient",
});

str_enum!(ApprovalStatus {
    Pending => "pending",
    Approved => "approved",
    Rejected => "rejected",
    Suspended => "suspended",
});

impl ApprovalStatus {
    /// Whether an account in this state may open a session at all.
    pub fn can_sign_in(&self) -> bool {
        matches!(self, Self::Pending | Self::Approved)
    }
}

/// Diabetic retinopathy grades returned by the classifier.
///
/// Stored labels are the human-readable strings (`"No DR"`, `"Proliferative DR"`),
/// not the snake_case identifiers, because they are shown verbatim in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DrGrade {
    NoDr,
    Mild,
    Moderate,
    Severe,
    Proliferative,
}

impl DrGrade {
    pub fn label(&self) -> &'static str {
        match self {
            Self::NoDr => "No DR",
            Self::Mild => "Mild",
            Self::Moderate => "Moderate",
            Self::Severe => "Severe",
            Self::Proliferative => "Proliferative DR",
        }
    }

    pub fn all() -> &'static [Self] {
        &[
            Self::NoDr,
            Self::Mild,
            Self::Moderate,
            Self::Severe,
            Self::Proliferative,
        ]
    }

    /// Recognise a classifier label. Accepts the display labels, common
    /// underscore/hyphen spellings and the numeric grades 0-4.
    pub fn from_label(raw: &str) -> Option<Self> {
        let norm: String = raw
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c == '_' || c == '-' { ' ' } else { c })
            .collect();
        let norm = norm.split_whitespace().collect::<Vec<_>>().join(" ");

        match norm.as_str() {
            "0" | "no dr" | "no" | "normal" | "no diabetic retinopathy" => Some(Self::NoDr),
            "1" | "mild" | "mild dr" | "mild npdr" => Some(Self::Mild),
            "2" | "moderate" | "moderate dr" | "moderate npdr" => Some(Self::Moderate),
            "3" | "severe" | "severe dr" | "severe npdr" => Some(Self::Severe),
            "4" | "proliferative" | "proliferative dr" | "proliferate dr" | "pdr" => {
                Some(Self::Proliferative)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn role_round_trips_through_str() {
        assert_eq!(Role::from_str("admin").unwrap(), Role::Admin);
        assert_eq!(Role::Patient.as_str(), "patient");
        assert!(Role::from_str("doctor").is_err());
    }

    #[test]
    fn approval_status_sign_in_rules() {
        assert!(ApprovalStatus::Approved.can_sign_in());
        assert!(ApprovalStatus::Pending.can_sign_in());
        assert!(!ApprovalStatus::Rejected.can_sign_in());
        assert!(!ApprovalStatus::Suspended.can_sign_in());
    }

    #[test]
    fn invalid_status_reports_field() {
        let err = ApprovalStatus::from_str("archived").unwrap_err();
        assert!(err.to_string().contains("ApprovalStatus"));
    }

    #[test]
    fn grade_recognises_spellings() {
        assert_eq!(DrGrade::from_label("No_DR"), Some(DrGrade::NoDr));
        assert_eq!(DrGrade::from_label("  moderate "), Some(DrGrade::Moderate));
        assert_eq!(DrGrade::from_label("Proliferate_DR"), Some(DrGrade::Proliferative));
        assert_eq!(DrGrade::from_label("4"), Some(DrGrade::Proliferative));
        assert_eq!(DrGrade::from_label("glaucoma"), None);
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&ApprovalStatus::Suspended).unwrap();
        assert_eq!(json, "\"suspended\"");
    }
}
