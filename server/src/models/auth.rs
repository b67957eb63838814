//! Authentication DTOs and token claims

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{validation, Availability, User};

/// JWT claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub iat: usize,
    pub exp: usize,
}

/// Registration request
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[validate(custom = "validation::validate_person_name")]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(
        length(min = 6),
        custom = "validation::validate_password_strength"
    )]
    pub password: String,
    #[validate(must_match = "password")]
    pub confirm_password: String,
    #[validate(length(max = 100))]
    pub location: Option<String>,
    #[validate(length(min = 1), custom = "validation::validate_skill_names")]
    pub skills_offered: Vec<String>,
    #[validate(length(min = 1), custom = "validation::validate_skill_names")]
    pub skills_wanted: Vec<String>,
    #[serde(default)]
    pub availability: Availability,
}

/// Login request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

/// Password change for the signed-in user
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePasswordRequest {
    #[validate(length(min = 1))]
    pub current_password: String,
    #[validate(
        length(min = 6),
        custom = "validation::validate_password_strength"
    )]
    pub new_password: String,
}

/// Token plus the signed-in user
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}
