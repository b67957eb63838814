//! Field rules shared by the request DTOs

use validator::ValidationError;

pub const MAX_SKILL_LEN: usize = 50;
pub const MAX_CANCELLATION_REASON_LEN: usize = 200;

/// Names are 2-50 characters of letters and spaces
pub fn validate_person_name(name: &str) -> Result<(), ValidationError> {
    let trimmed = name.trim();
    let len = trimmed.chars().count();
    if !(2..=50).contains(&len) {
        return Err(ValidationError::new("name_length"));
    }
    if !trimmed.chars().all(|c| c.is_alphabetic() || c == ' ') {
        return Err(ValidationError::new("name_characters"));
    }
    Ok(())
}

/// Every skill name must be 1-50 characters once trimmed
pub fn validate_skill_names(skills: &[String]) -> Result<(), ValidationError> {
    if skills.iter().all(|s| is_valid_skill(s)) {
        Ok(())
    } else {
        Err(ValidationError::new("skill_length"))
    }
}

/// Password needs an uppercase, a lowercase and a digit
pub fn validate_password_strength(password: &str) -> Result<(), ValidationError> {
    let has_upper = password.chars().any(|c| c.is_uppercase());
    let has_lower = password.chars().any(|c| c.is_lowercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    if has_upper && has_lower && has_digit {
        Ok(())
    } else {
        Err(ValidationError::new("password_strength"))
    }
}

pub fn is_valid_skill(skill: &str) -> bool {
    let len = skill.trim().chars().count();
    (1..=MAX_SKILL_LEN).contains(&len)
}

/// Trim, drop empties and de-duplicate a skill list keeping first occurrence
pub fn normalize_skills(skills: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(skills.len());
    for skill in skills {
        let trimmed = skill.trim();
        if !trimmed.is_empty() && !out.iter().any(|s| s == trimmed) {
            out.push(trimmed.to_string());
        }
    }
    out
}

/// Lowercased, trimmed email
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn person_name_rules() {
        assert!(validate_person_name("Ada Lovelace").is_ok());
        assert!(validate_person_name("A").is_err());
        assert!(validate_person_name("R2D2").is_err());
    }

    #[test]
    fn password_strength_rules() {
        assert!(validate_password_strength("Secret1").is_ok());
        assert!(validate_password_strength("secret1").is_err());
        assert!(validate_password_strength("SECRET1").is_err());
        assert!(validate_password_strength("Secrets").is_err());
    }

    #[test]
    fn skills_are_trimmed_and_deduplicated() {
        let skills = normalize_skills(vec![
            " Guitar ".to_string(),
            "Guitar".to_string(),
            "  ".to_string(),
            "Python".to_string(),
        ]);
        assert_eq!(skills, vec!["Guitar".to_string(), "Python".to_string()]);
        assert!(validate_skill_names(&["x".repeat(51)]).is_err());
    }

    #[test]
    fn request_bodies_enforce_length_limits() {
        use crate::models::{CreateSwapRequest, RateSwapRequest, UpdatePasswordRequest};
        use validator::Validate;

        let swap = |message: usize| CreateSwapRequest {
            recipient_id: uuid::Uuid::new_v4(),
            requested_skill: "Guitar".to_string(),
            offered_skill: "Python".to_string(),
            message: Some("m".repeat(message)),
            scheduled_date: None,
        };
        assert!(swap(500).validate().is_ok());
        assert!(swap(501).validate().is_err());

        let rating = |comment: usize| RateSwapRequest {
            rating: 5,
            comment: Some("c".repeat(comment)),
        };
        assert!(rating(300).validate().is_ok());
        assert!(rating(301).validate().is_err());

        let password = |new: &str| UpdatePasswordRequest {
            current_password: "Old1pass".to_string(),
            new_password: new.to_string(),
        };
        assert!(password("Abcde1").validate().is_ok());
        assert!(password("Abc1").validate().is_err());
    }
}
