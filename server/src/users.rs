//! User directory service

use std::sync::Arc;

use uuid::Uuid;
use validator::Validate;

use crate::models::validation::normalize_skills;
use crate::models::{
    Availability, CounterDrift, Page, ProfileUpdate, PublicProfile, SkillQuery, User, UserSort,
};
use crate::notifications::NotificationService;
use crate::store::{RepositoryError, UserRepository};

const MAX_BAN_REASON_LEN: usize = 500;

#[derive(Debug, thiserror::Error)]
pub enum UserError {
    #[error("User not found")]
    NotFound,
    #[error("Rating must be between 1 and 5, got {0}")]
    OutOfRange(i64),
    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),
    #[error(transparent)]
    Repository(RepositoryError),
}

impl From<RepositoryError> for UserError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => Self::NotFound,
            other => Self::Repository(other),
        }
    }
}

/// Raw search parameters as accepted over HTTP
#[derive(Debug, Clone, Default, serde::Deserialize, Validate)]
pub struct SearchParams {
    /// Free text matched against name, skills and location
    #[validate(length(min = 1, max = 100))]
    pub query: Option<String>,
    /// Comma separated skill names
    pub skills: Option<String>,
    pub location: Option<String>,
    /// Comma separated availability flags
    pub availability: Option<String>,
    #[serde(default)]
    pub sort: UserSort,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl From<SearchParams> for SkillQuery {
    fn from(params: SearchParams) -> Self {
        let list = |value: Option<String>| -> Vec<String> {
            value
                .unwrap_or_default()
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        };

        let mut availability = Availability::default();
        for flag in list(params.availability) {
            match flag.to_ascii_lowercase().as_str() {
                "weekdays" => availability.weekdays = true,
                "weekends" => availability.weekends = true,
                "mornings" => availability.mornings = true,
                "evenings" => availability.evenings = true,
                _ => {}
            }
        }

        Self {
            text: params
                .query
                .map(|q| q.trim().to_string())
                .filter(|q| !q.is_empty()),
            skills: normalize_skills(list(params.skills)),
            location: params
                .location
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty()),
            availability,
            sort: params.sort,
            page: Page::from(crate::models::PaginationParams {
                limit: params.limit,
                offset: params.offset,
            }),
        }
    }
}

pub struct UserService {
    users: Arc<dyn UserRepository>,
    notifications: Arc<NotificationService>,
}

impl UserService {
    pub fn new(users: Arc<dyn UserRepository>, notifications: Arc<NotificationService>) -> Self {
        Self {
            users,
            notifications,
        }
    }

    pub async fn get(&self, user_id: Uuid) -> Result<User, UserError> {
        self.users.find_user(user_id).await?.ok_or(UserError::NotFound)
    }

    /// Public, non-banned users whose offered or wanted skills intersect the
    /// query. An empty skill list browses every discoverable user.
    pub async fn find_matches_for_skills(
        &self,
        query: SkillQuery,
    ) -> Result<Vec<PublicProfile>, UserError> {
        let users = self.users.search_users(&query).await?;
        Ok(users.into_iter().map(PublicProfile::from).collect())
    }

    /// Validate raw HTTP parameters, then run [`Self::find_matches_for_skills`]
    pub async fn search(&self, params: SearchParams) -> Result<Vec<PublicProfile>, UserError> {
        params.validate()?;
        self.find_matches_for_skills(params.into()).await
    }

    /// A profile as seen by `viewer`.
    ///
    /// Banned and private users are only visible to themselves and admins;
    /// everyone else gets `NotFound`.
    pub async fn public_profile(
        &self,
        user_id: Uuid,
        viewer: Option<&User>,
    ) -> Result<PublicProfile, UserError> {
        let user = self.get(user_id).await?;
        let privileged = viewer.is_some_and(|v| v.id == user.id || v.is_admin);
        if !user.is_discoverable() && !privileged {
            return Err(UserError::NotFound);
        }
        Ok(user.into())
    }

    pub async fn update_profile(
        &self,
        user_id: Uuid,
        mut update: ProfileUpdate,
    ) -> Result<User, UserError> {
        update.validate()?;
        update.name = update.name.map(|n| n.trim().to_string());
        update.location = update.location.map(|l| l.trim().to_string());
        update.profile_photo = update.profile_photo.map(|p| p.trim().to_string());
        update.skills_offered = update.skills_offered.map(normalize_skills);
        update.skills_wanted = update.skills_wanted.map(normalize_skills);
        Ok(self.users.update_profile(user_id, update).await?)
    }

    /// Fold a 1-5 rating into the user's average
    pub async fn apply_rating(&self, user_id: Uuid, rating: i64) -> Result<User, UserError> {
        let rating = checked_rating(rating)?;
        Ok(self.users.apply_rating(user_id, rating).await?)
    }

    pub async fn list_users(&self, page: Page) -> Result<Vec<User>, UserError> {
        Ok(self.users.list_users(page).await?)
    }

    pub async fn set_banned(
        &self,
        user_id: Uuid,
        banned: bool,
        reason: Option<String>,
    ) -> Result<User, UserError> {
        let reason = reason.map(|r| r.trim().to_string()).filter(|r| !r.is_empty());
        if reason.as_ref().is_some_and(|r| r.chars().count() > MAX_BAN_REASON_LEN) {
            let mut errors = validator::ValidationErrors::new();
            errors.add("reason", validator::ValidationError::new("length"));
            return Err(UserError::Validation(errors));
        }
        let user = self.users.set_banned(user_id, banned, reason).await?;
        tracing::info!(%user_id, banned, "User ban status changed");
        if banned {
            self.notifications.emit_account_banned(&user).await;
        }
        Ok(user)
    }

    pub async fn verify(&self, user_id: Uuid) -> Result<User, UserError> {
        let user = self.users.set_verified(user_id, true).await?;
        tracing::info!(%user_id, "User verified");
        self.notifications.emit_account_verified(&user).await;
        Ok(user)
    }

    /// Users whose counters disagree with their swap records
    pub async fn counter_audit(&self) -> Result<Vec<CounterDrift>, UserError> {
        let drift = self.users.audit_counters().await?;
        for d in &drift {
            tracing::error!(
                user_id = %d.user_id,
                pending = d.pending_swaps,
                expected_pending = d.expected_pending,
                completed = d.completed_swaps,
                expected_completed = d.expected_completed,
                "Swap counter drift detected"
            );
        }
        Ok(drift)
    }
}

/// Narrow a raw rating to 1..=5
pub fn checked_rating(rating: i64) -> Result<u8, UserError> {
    match u8::try_from(rating) {
        Ok(r @ 1..=5) => Ok(r),
        _ => Err(UserError::OutOfRange(rating)),
    }
}
