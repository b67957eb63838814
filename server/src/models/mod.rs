//! Data models for the SkillSwap backend

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod auth;
pub mod notification;
pub mod swap;
pub mod validation;

pub use auth::*;
pub use notification::*;
pub use swap::*;

/// Weekly availability flags advertised on a profile
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Availability {
    pub weekdays: bool,
    pub weekends: bool,
    pub mornings: bool,
    pub evenings: bool,
}

impl Availability {
    /// True when at least one flag is set
    pub fn any(&self) -> bool {
        self.weekdays || self.weekends || self.mornings || self.evenings
    }

    /// True when `self` shares at least one set flag with `wanted`
    pub fn overlaps(&self, wanted: &Availability) -> bool {
        (wanted.weekdays && self.weekdays)
            || (wanted.weekends && self.weekends)
            || (wanted.mornings && self.mornings)
            || (wanted.evenings && self.evenings)
    }
}

/// Aggregate of the ratings a user has received
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RatingSummary {
    pub average: f64,
    pub count: i32,
}

impl RatingSummary {
    /// Fold one more rating into the running average
    pub fn with_rating(self, rating: u8) -> Self {
        let total = self.average * f64::from(self.count) + f64::from(rating);
        let count = self.count + 1;
        Self {
            average: total / f64::from(count),
            count,
        }
    }
}

/// User model
///
/// Serializing a `User` never emits the password hash; use
/// [`PublicProfile`] when the viewer is not the user themselves.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub location: Option<String>,
    pub profile_photo: Option<String>,
    pub skills_offered: Vec<String>,
    pub skills_wanted: Vec<String>,
    pub availability: Availability,
    pub rating: RatingSummary,
    pub completed_swaps: i32,
    pub pending_swaps: i32,
    pub is_public: bool,
    pub is_admin: bool,
    pub is_verified: bool,
    pub is_banned: bool,
    pub ban_reason: Option<String>,
    pub last_active: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Whether other users may discover this profile
    pub fn is_discoverable(&self) -> bool {
        self.is_public && !self.is_banned
    }
}

/// Profile as exposed to other users: no credentials, no moderation state
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub location: Option<String>,
    pub profile_photo: Option<String>,
    pub skills_offered: Vec<String>,
    pub skills_wanted: Vec<String>,
    pub availability: Availability,
    pub rating: RatingSummary,
    pub completed_swaps: i32,
    pub pending_swaps: i32,
    pub is_public: bool,
    pub is_verified: bool,
    pub last_active: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for PublicProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            location: user.location,
            profile_photo: user.profile_photo,
            skills_offered: user.skills_offered,
            skills_wanted: user.skills_wanted,
            availability: user.availability,
            rating: user.rating,
            completed_swaps: user.completed_swaps,
            pending_swaps: user.pending_swaps,
            is_public: user.is_public,
            is_verified: user.is_verified,
            last_active: user.last_active,
            created_at: user.created_at,
        }
    }
}

/// Fields needed to insert a user
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub location: Option<String>,
    pub skills_offered: Vec<String>,
    pub skills_wanted: Vec<String>,
    pub availability: Availability,
    pub is_admin: bool,
}

/// Partial profile update; `None` leaves the field untouched
#[derive(Debug, Clone, Default, Deserialize, validator::Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[validate(custom = "validation::validate_person_name")]
    pub name: Option<String>,
    #[validate(length(max = 100))]
    pub location: Option<String>,
    #[validate(length(max = 500))]
    pub profile_photo: Option<String>,
    #[validate(custom = "validation::validate_skill_names")]
    pub skills_offered: Option<Vec<String>>,
    #[validate(custom = "validation::validate_skill_names")]
    pub skills_wanted: Option<Vec<String>>,
    pub availability: Option<Availability>,
    pub is_public: Option<bool>,
}

/// Sort orders accepted by the skill search
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserSort {
    #[default]
    Newest,
    Oldest,
    Rating,
    Name,
    CompletedSwaps,
}

/// Skill match query against the user directory
#[derive(Debug, Clone, Default)]
pub struct SkillQuery {
    /// Case-insensitive text matched against name, skills and location
    pub text: Option<String>,
    pub skills: Vec<String>,
    pub location: Option<String>,
    pub availability: Availability,
    pub sort: UserSort,
    pub page: Page,
}

/// A user whose stored counters disagree with their swap records
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterDrift {
    pub user_id: Uuid,
    pub pending_swaps: i64,
    pub completed_swaps: i64,
    pub expected_pending: i64,
    pub expected_completed: i64,
}

/// API response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Pagination parameters
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PaginationParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Resolved limit/offset window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Page {
    pub const DEFAULT_LIMIT: i64 = 50;
    pub const MAX_LIMIT: i64 = 100;
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: Self::DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

impl From<PaginationParams> for Page {
    fn from(params: PaginationParams) -> Self {
        Self {
            limit: params
                .limit
                .unwrap_or(Self::DEFAULT_LIMIT)
                .clamp(1, Self::MAX_LIMIT),
            offset: params.offset.unwrap_or(0).max(0),
        }
    }
}
