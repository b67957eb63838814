//! Persistence ports and their adapters
//!
//! The services only see the three repository traits below. Operations that
//! touch a swap *and* the counters of its participants are single trait calls
//! so each adapter can make them one atomic write: a transaction with a
//! compare-and-swap on `status` for PostgreSQL, one write-lock section for the
//! in-memory store.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::lifecycle::CounterDelta;
use crate::models::{
    CounterDrift, NewNotification, NewSwap, NewUser, Notification, NotificationType, Page,
    Participant, ProfileUpdate, SkillQuery, Swap, SwapRating, SwapStatus, User,
};

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Repository error
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Record not found")]
    NotFound,
    #[error("Email already registered")]
    DuplicateEmail,
    #[error("Swap status no longer matches the expected status")]
    Conflict,
    #[error("Rating already recorded for this side")]
    AlreadyRated,
    #[error("Swap is not completed")]
    NotCompleted,
    #[error("Counter update touched {touched} of 2 participants")]
    CounterDrift { touched: u64 },
}

/// A compare-and-swap status change plus the counter delta that goes with it
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub swap_id: Uuid,
    pub expected: SwapStatus,
    pub target: SwapStatus,
    pub delta: CounterDelta,
    pub scheduled_date: Option<DateTime<Utc>>,
    pub completed_date: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
}

/// Resolved notification listing filter
#[derive(Debug, Clone, Copy)]
pub struct NotificationFilter {
    pub unread_only: bool,
    pub kind: Option<NotificationType>,
    pub limit: i64,
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn insert_user(&self, user: NewUser) -> Result<User, RepositoryError>;

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, RepositoryError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError>;

    async fn update_profile(&self, id: Uuid, update: ProfileUpdate)
        -> Result<User, RepositoryError>;

    async fn update_password(&self, id: Uuid, password_hash: String)
        -> Result<(), RepositoryError>;

    async fn touch_last_active(&self, id: Uuid) -> Result<(), RepositoryError>;

    async fn set_banned(
        &self,
        id: Uuid,
        banned: bool,
        reason: Option<String>,
    ) -> Result<User, RepositoryError>;

    async fn set_verified(&self, id: Uuid, verified: bool) -> Result<User, RepositoryError>;

    /// Fold `rating` into the user's running average
    async fn apply_rating(&self, id: Uuid, rating: u8) -> Result<User, RepositoryError>;

    /// Public, non-banned users matching the query
    async fn search_users(&self, query: &SkillQuery) -> Result<Vec<User>, RepositoryError>;

    /// Every user, newest first
    async fn list_users(&self, page: Page) -> Result<Vec<User>, RepositoryError>;

    /// Users whose counters disagree with the swap records
    async fn audit_counters(&self) -> Result<Vec<CounterDrift>, RepositoryError>;
}

#[async_trait]
pub trait SwapRepository: Send + Sync {
    /// Insert a pending swap and add one to both participants' pending counters.
    ///
    /// Fails with [`RepositoryError::NotFound`] when either user is missing.
    async fn create_swap(&self, swap: NewSwap) -> Result<Swap, RepositoryError>;

    async fn find_swap(&self, id: Uuid) -> Result<Option<Swap>, RepositoryError>;

    /// Apply `change` only if the stored status still equals `change.expected`.
    ///
    /// Fails with [`RepositoryError::Conflict`] when it does not.
    async fn apply_status_change(&self, change: StatusChange) -> Result<Swap, RepositoryError>;

    /// Set one side's rating of a completed swap and fold it into the
    /// counterpart's average. Returns the swap and the rated user.
    async fn record_rating(
        &self,
        swap_id: Uuid,
        side: Participant,
        rating: SwapRating,
    ) -> Result<(Swap, User), RepositoryError>;

    async fn mark_swap_read(&self, swap_id: Uuid, side: Participant)
        -> Result<Swap, RepositoryError>;

    /// Swaps involving `user_id`, newest first
    async fn list_swaps_for_user(
        &self,
        user_id: Uuid,
        status: Option<SwapStatus>,
        page: Page,
    ) -> Result<Vec<Swap>, RepositoryError>;
}

#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn insert_notifications(
        &self,
        notifications: Vec<NewNotification>,
    ) -> Result<Vec<Notification>, RepositoryError>;

    async fn list_notifications(
        &self,
        recipient_id: Uuid,
        filter: NotificationFilter,
    ) -> Result<Vec<Notification>, RepositoryError>;

    /// Mark the given notifications (all when `ids` is `None`) read
    async fn mark_notifications_read(
        &self,
        recipient_id: Uuid,
        ids: Option<Vec<Uuid>>,
    ) -> Result<u64, RepositoryError>;

    async fn unread_count(&self, recipient_id: Uuid) -> Result<i64, RepositoryError>;
}

/// The three repositories, backed by one store
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub swaps: Arc<dyn SwapRepository>,
    pub notifications: Arc<dyn NotificationRepository>,
}

impl Repositories {
    pub fn in_memory() -> Self {
        let store = Arc::new(MemoryStore::default());
        Self {
            users: store.clone(),
            swaps: store.clone(),
            notifications: store,
        }
    }

    pub fn postgres(store: PgStore) -> Self {
        let store = Arc::new(store);
        Self {
            users: store.clone(),
            swaps: store.clone(),
            notifications: store,
        }
    }
}
