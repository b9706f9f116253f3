use crate::models::enums::DrGrade;

/// Guidance shown for labels the classifier returns outside the five grades.
pub const GENERIC_SUGGESTION: &str =
    "Result could not be matched to a known grade. Please consult an ophthalmologist \
     to review this scan.";

/// Follow-up guidance for a prediction label.
pub fn suggestion_for(label: &str) -> &'static str {
    match DrGrade::from_label(label) {
        Some(grade) => grade_suggestion(grade),
        None => GENERIC_SUGGESTION,
    }
}

pub fn grade_suggestion(grade: DrGrade) -> &'static str {
    match grade {
        DrGrade::NoDr => {
            "No signs of diabetic retinopathy detected. Maintain blood sugar control \
             and continue annual eye examinations."
        }
        DrGrade::Mild => {
            "Mild non-proliferative changes detected. Tighten glucose and blood pressure \
             control and schedule a follow-up eye exam within 6 to 12 months."
        }
        DrGrade::Moderate => {
            "Moderate non-proliferative retinopathy detected. Refer to an ophthalmologist \
             and repeat the examination within 3 to 6 months."
        }
        DrGrade::Severe => {
            "Severe non-proliferative retinopathy detected. Urgent referral to a retina \
             specialist is recommended within weeks."
        }
        DrGrade::Proliferative => {
            "Proliferative retinopathy detected. Immediate referral to a retina specialist \
             is required; treatment such as laser or anti-VEGF therapy may be needed."
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_grade_has_distinct_text() {
        let texts: Vec<&str> = DrGrade::all().iter().map(|g| grade_suggestion(*g)).collect();
        for (i, a) in texts.iter().enumerate() {
            assert!(!a.is_empty());
            for b in &texts[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn label_spellings_share_suggestion() {
        assert_eq!(suggestion_for("Proliferative DR"), suggestion_for("proliferate_dr"));
        assert_eq!(suggestion_for("No DR"), grade_suggestion(DrGrade::NoDr));
    }

    #[test]
    fn unknown_label_gets_generic_text() {
        assert_eq!(suggestion_for("cataract"), GENERIC_SUGGESTION);
    }
}
