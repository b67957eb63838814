//! Swap lifecycle manager
//!
//! Applies the transitions planned by [`crate::lifecycle`] through the
//! repository's atomic writes, then emits notifications and socket events.
//! Anything after the commit is best-effort and never undoes it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::Validate;

use crate::lifecycle::plan_transition;
use crate::models::validation::{is_valid_skill, MAX_CANCELLATION_REASON_LEN};
use crate::models::{
    CreateSwapRequest, ListSwapsQuery, NewSwap, Page, PaginationParams, RateSwapRequest, Swap,
    SwapRating, SwapStatus, SwapView,
};
use crate::notifications::NotificationService;
use crate::store::{RepositoryError, StatusChange, SwapRepository, UserRepository};
use crate::users::checked_rating;
use crate::websocket::{events, WsState};

#[derive(Debug, thiserror::Error)]
pub enum SwapError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("Cannot move a swap from {from} to {to}")]
    InvalidTransition { from: SwapStatus, to: SwapStatus },
    #[error("A swap needs two different participants")]
    InvalidParticipants,
    #[error("Rating must be between 1 and 5, got {0}")]
    OutOfRange(i64),
    #[error("Only completed swaps can be rated")]
    InvalidState,
    #[error("You have already rated this swap")]
    AlreadyRated,
    #[error("Swap was modified concurrently, reload and retry")]
    Conflict,
    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),
    #[error(transparent)]
    Repository(RepositoryError),
}

impl From<RepositoryError> for SwapError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => Self::NotFound("Swap"),
            RepositoryError::Conflict => Self::Conflict,
            RepositoryError::AlreadyRated => Self::AlreadyRated,
            RepositoryError::NotCompleted => Self::InvalidState,
            other => Self::Repository(other),
        }
    }
}

/// Optional data carried by a transition
#[derive(Debug, Clone, Default)]
pub struct TransitionExtras {
    pub scheduled_date: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
}

pub struct SwapService {
    users: Arc<dyn UserRepository>,
    swaps: Arc<dyn SwapRepository>,
    notifications: Arc<NotificationService>,
    ws_state: WsState,
}

impl SwapService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        swaps: Arc<dyn SwapRepository>,
        notifications: Arc<NotificationService>,
        ws_state: WsState,
    ) -> Self {
        Self {
            users,
            swaps,
            notifications,
            ws_state,
        }
    }

    /// Open a pending swap from `requester_id` to the request's recipient
    pub async fn request_swap(
        &self,
        requester_id: Uuid,
        req: CreateSwapRequest,
    ) -> Result<Swap, SwapError> {
        req.validate()?;
        let requested_skill = req.requested_skill.trim().to_string();
        let offered_skill = req.offered_skill.trim().to_string();
        if !is_valid_skill(&requested_skill) || !is_valid_skill(&offered_skill) {
            let mut errors = validator::ValidationErrors::new();
            errors.add("skill", validator::ValidationError::new("length"));
            return Err(SwapError::Validation(errors));
        }
        if requester_id == req.recipient_id {
            return Err(SwapError::InvalidParticipants);
        }

        let requester = self
            .users
            .find_user(requester_id)
            .await?
            .ok_or(SwapError::NotFound("Requester"))?;
        let recipient = self
            .users
            .find_user(req.recipient_id)
            .await?
            .ok_or(SwapError::NotFound("Recipient"))?;
        if requester.is_banned {
            return Err(SwapError::Forbidden("Banned users cannot request swaps"));
        }
        if !recipient.is_discoverable() {
            return Err(SwapError::Forbidden("Recipient is not accepting swap requests"));
        }

        let swap = self
            .swaps
            .create_swap(NewSwap {
                requester_id,
                recipient_id: recipient.id,
                requested_skill,
                offered_skill,
                message: req
                    .message
                    .map(|m| m.trim().to_string())
                    .filter(|m| !m.is_empty()),
                scheduled_date: req.scheduled_date,
            })
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound => SwapError::NotFound("User"),
                other => self.counter_failure(other),
            })?;
        tracing::info!(swap_id = %swap.id, %requester_id, recipient_id = %recipient.id, "Swap requested");

        self.notifications.emit_swap_requested(&swap, &requester).await;
        self.push(swap.recipient_id, events::NEW_SWAP_REQUEST, &swap).await;
        Ok(swap)
    }

    /// Move a swap to `target` on behalf of `actor_id`
    pub async fn transition(
        &self,
        swap_id: Uuid,
        actor_id: Uuid,
        target: SwapStatus,
        extras: TransitionExtras,
    ) -> Result<Swap, SwapError> {
        let swap = self.find(swap_id).await?;
        let side = swap
            .participant(actor_id)
            .ok_or(SwapError::Forbidden("Only participants can change a swap"))?;
        let delta = plan_transition(swap.status, target, side).ok_or(
            SwapError::InvalidTransition {
                from: swap.status,
                to: target,
            },
        )?;

        let change = StatusChange {
            swap_id,
            expected: swap.status,
            target,
            delta,
            scheduled_date: extras
                .scheduled_date
                .filter(|_| target == SwapStatus::Accepted),
            completed_date: (target == SwapStatus::Completed).then(Utc::now),
            cancellation_reason: extras
                .cancellation_reason
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty() && target == SwapStatus::Cancelled),
        };
        let updated = self
            .swaps
            .apply_status_change(change)
            .await
            .map_err(|e| self.counter_failure(e))?;
        tracing::info!(
            %swap_id,
            %actor_id,
            from = %swap.status,
            to = %updated.status,
            "Swap status changed"
        );

        self.notifications.emit_status_changed(&updated, actor_id).await;
        for user_id in updated.participants() {
            self.push(user_id, events::SWAP_STATUS_CHANGED, &updated).await;
        }
        Ok(updated)
    }

    pub async fn accept(
        &self,
        swap_id: Uuid,
        actor_id: Uuid,
        scheduled_date: Option<DateTime<Utc>>,
    ) -> Result<Swap, SwapError> {
        let extras = TransitionExtras {
            scheduled_date,
            ..Default::default()
        };
        self.transition(swap_id, actor_id, SwapStatus::Accepted, extras)
            .await
    }

    pub async fn reject(&self, swap_id: Uuid, actor_id: Uuid) -> Result<Swap, SwapError> {
        self.transition(swap_id, actor_id, SwapStatus::Rejected, TransitionExtras::default())
            .await
    }

    pub async fn complete(&self, swap_id: Uuid, actor_id: Uuid) -> Result<Swap, SwapError> {
        self.transition(swap_id, actor_id, SwapStatus::Completed, TransitionExtras::default())
            .await
    }

    pub async fn cancel(
        &self,
        swap_id: Uuid,
        actor_id: Uuid,
        reason: Option<String>,
    ) -> Result<Swap, SwapError> {
        if reason
            .as_ref()
            .is_some_and(|r| r.trim().chars().count() > MAX_CANCELLATION_REASON_LEN)
        {
            let mut errors = validator::ValidationErrors::new();
            errors.add("reason", validator::ValidationError::new("length"));
            return Err(SwapError::Validation(errors));
        }
        let extras = TransitionExtras {
            cancellation_reason: reason,
            ..Default::default()
        };
        self.transition(swap_id, actor_id, SwapStatus::Cancelled, extras)
            .await
    }

    /// Record the actor's rating of a completed swap
    pub async fn rate(
        &self,
        swap_id: Uuid,
        actor_id: Uuid,
        req: RateSwapRequest,
    ) -> Result<Swap, SwapError> {
        let rating = checked_rating(req.rating).map_err(|_| SwapError::OutOfRange(req.rating))?;
        req.validate()?;

        let swap = self.find(swap_id).await?;
        let side = swap
            .participant(actor_id)
            .ok_or(SwapError::Forbidden("Only participants can rate a swap"))?;
        if swap.status != SwapStatus::Completed {
            return Err(SwapError::InvalidState);
        }
        if swap.rating_from(side).is_some() {
            return Err(SwapError::AlreadyRated);
        }

        let (swap, rated) = self
            .swaps
            .record_rating(
                swap_id,
                side,
                SwapRating {
                    rating,
                    comment: req
                        .comment
                        .map(|c| c.trim().to_string())
                        .filter(|c| !c.is_empty()),
                    date: Utc::now(),
                },
            )
            .await?;
        tracing::info!(%swap_id, rater = %actor_id, rated = %rated.id, rating, "Swap rated");

        self.notifications
            .emit_rating_received(&swap, actor_id, rated.id, rating)
            .await;
        Ok(swap)
    }

    /// Flip the caller's read flag; repeating it is a no-op
    pub async fn mark_read(&self, swap_id: Uuid, actor_id: Uuid) -> Result<Swap, SwapError> {
        let swap = self.find(swap_id).await?;
        let side = swap
            .participant(actor_id)
            .ok_or(SwapError::Forbidden("Only participants can read a swap"))?;
        Ok(self.swaps.mark_swap_read(swap_id, side).await?)
    }

    /// Swaps the user takes part in, newest first
    pub async fn list_for_user(
        &self,
        user_id: Uuid,
        query: ListSwapsQuery,
    ) -> Result<Vec<SwapView>, SwapError> {
        let page = Page::from(PaginationParams {
            limit: query.limit,
            offset: query.offset,
        });
        let now = Utc::now();
        Ok(self
            .swaps
            .list_swaps_for_user(user_id, query.status, page)
            .await?
            .into_iter()
            .map(|swap| SwapView::new(swap, now))
            .collect())
    }

    pub async fn get(
        &self,
        swap_id: Uuid,
        viewer_id: Uuid,
        viewer_is_admin: bool,
    ) -> Result<SwapView, SwapError> {
        let swap = self.find(swap_id).await?;
        if swap.participant(viewer_id).is_none() && !viewer_is_admin {
            return Err(SwapError::Forbidden("Only participants can view a swap"));
        }
        Ok(SwapView::new(swap, Utc::now()))
    }

    async fn find(&self, swap_id: Uuid) -> Result<Swap, SwapError> {
        self.swaps
            .find_swap(swap_id)
            .await?
            .ok_or(SwapError::NotFound("Swap"))
    }

    /// Counter drift aborts the write; it must never pass silently
    fn counter_failure(&self, err: RepositoryError) -> SwapError {
        if let RepositoryError::CounterDrift { touched } = err {
            tracing::error!(touched, "Swap counter update did not touch both participants");
        }
        err.into()
    }

    async fn push(&self, user_id: Uuid, event: &str, swap: &Swap) {
        match serde_json::to_value(SwapView::new(swap.clone(), Utc::now())) {
            Ok(data) => self.ws_state.publish(user_id, event, data).await,
            Err(e) => tracing::warn!(swap_id = %swap.id, "Failed to encode swap event: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Availability, NewUser, NotificationQuery, NotificationType, User};
    use crate::store::MemoryStore;

    struct Fixture {
        service: Arc<SwapService>,
        notifications: Arc<NotificationService>,
        users: Arc<dyn UserRepository>,
        ws: WsState,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::default());
        let ws = WsState::new();
        let notifications = Arc::new(NotificationService::new(
            store.clone(),
            store.clone(),
            ws.clone(),
        ));
        let service = Arc::new(SwapService::new(
            store.clone(),
            store.clone(),
            notifications.clone(),
            ws.clone(),
        ));
        Fixture {
            service,
            notifications,
            users: store,
            ws,
        }
    }

    impl Fixture {
        async fn user(&self, email: &str) -> User {
            self.users
                .insert_user(NewUser {
                    name: "Test User".to_string(),
                    email: email.to_string(),
                    password_hash: "hash".to_string(),
                    location: None,
                    skills_offered: vec!["Python".to_string()],
                    skills_wanted: vec!["Guitar".to_string()],
                    availability: Availability::default(),
                    is_admin: false,
                })
                .await
                .expect("insert user")
        }

        async fn reload(&self, user: &User) -> User {
            self.users
                .find_user(user.id)
                .await
                .expect("find")
                .expect("user exists")
        }

        async fn counters(&self, user: &User) -> (i32, i32) {
            let user = self.reload(user).await;
            (user.pending_swaps, user.completed_swaps)
        }

        async fn request(&self, from: &User, to: &User) -> Swap {
            self.service
                .request_swap(from.id, request_to(to.id))
                .await
                .expect("request swap")
        }
    }

    fn request_to(recipient_id: Uuid) -> CreateSwapRequest {
        CreateSwapRequest {
            recipient_id,
            requested_skill: "Guitar".to_string(),
            offered_skill: "Python".to_string(),
            message: None,
            scheduled_date: None,
        }
    }

    fn rate(rating: i64, comment: Option<&str>) -> RateSwapRequest {
        RateSwapRequest {
            rating,
            comment: comment.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn full_lifecycle_keeps_counters_and_rejects_second_rating() {
        let f = fixture();
        let u1 = f.user("u1@example.com").await;
        let u2 = f.user("u2@example.com").await;

        let swap = f.request(&u1, &u2).await;
        assert_eq!(swap.status, SwapStatus::Pending);
        assert_eq!(f.counters(&u1).await, (1, 0));
        assert_eq!(f.counters(&u2).await, (1, 0));

        let swap = f.service.accept(swap.id, u2.id, None).await.expect("accept");
        assert_eq!(swap.status, SwapStatus::Accepted);
        assert_eq!(f.counters(&u1).await, (1, 0));
        assert_eq!(f.counters(&u2).await, (1, 0));

        let swap = f.service.complete(swap.id, u1.id).await.expect("complete");
        assert_eq!(swap.status, SwapStatus::Completed);
        assert!(swap.completed_date.is_some());
        assert_eq!(f.counters(&u1).await, (0, 1));
        assert_eq!(f.counters(&u2).await, (0, 1));

        f.service
            .rate(swap.id, u1.id, rate(5, Some("Great!")))
            .await
            .expect("rate");
        let rated = f.reload(&u2).await;
        assert_eq!(rated.rating.count, 1);
        assert!((rated.rating.average - 5.0).abs() < 1e-9);

        let err = f.service.rate(swap.id, u1.id, rate(5, None)).await.unwrap_err();
        assert!(matches!(err, SwapError::AlreadyRated));
        assert_eq!(f.reload(&u2).await.rating.count, 1);
    }

    #[tokio::test]
    async fn self_swap_and_hidden_recipient_are_refused() {
        let f = fixture();
        let u1 = f.user("u1@example.com").await;
        let u2 = f.user("u2@example.com").await;

        let err = f
            .service
            .request_swap(u1.id, request_to(u1.id))
            .await
            .unwrap_err();
        assert!(matches!(err, SwapError::InvalidParticipants));

        let err = f
            .service
            .request_swap(u1.id, request_to(Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, SwapError::NotFound(_)));

        f.users.set_banned(u2.id, true, None).await.expect("ban");
        let err = f
            .service
            .request_swap(u1.id, request_to(u2.id))
            .await
            .unwrap_err();
        assert!(matches!(err, SwapError::Forbidden(_)));
        assert_eq!(f.counters(&u1).await, (0, 0));
    }

    #[tokio::test]
    async fn only_the_recipient_accepts_or_rejects() {
        let f = fixture();
        let u1 = f.user("u1@example.com").await;
        let u2 = f.user("u2@example.com").await;
        let outsider = f.user("u3@example.com").await;
        let swap = f.request(&u1, &u2).await;

        let err = f.service.accept(swap.id, u1.id, None).await.unwrap_err();
        assert!(matches!(err, SwapError::InvalidTransition { .. }));
        let err = f.service.reject(swap.id, outsider.id).await.unwrap_err();
        assert!(matches!(err, SwapError::Forbidden(_)));

        f.service.reject(swap.id, u2.id).await.expect("reject");
        assert_eq!(f.counters(&u1).await, (0, 0));
        assert_eq!(f.counters(&u2).await, (0, 0));
    }

    #[tokio::test]
    async fn terminal_swaps_cannot_move() {
        let f = fixture();
        let u1 = f.user("u1@example.com").await;
        let u2 = f.user("u2@example.com").await;
        let swap = f.request(&u1, &u2).await;
        f.service
            .cancel(swap.id, u1.id, Some("Schedule clash".to_string()))
            .await
            .expect("cancel");

        for target in [
            SwapStatus::Accepted,
            SwapStatus::Rejected,
            SwapStatus::Completed,
            SwapStatus::Cancelled,
        ] {
            for actor in [u1.id, u2.id] {
                let err = f
                    .service
                    .transition(swap.id, actor, target, TransitionExtras::default())
                    .await
                    .unwrap_err();
                assert!(matches!(err, SwapError::InvalidTransition { .. }));
            }
        }
        assert_eq!(f.counters(&u1).await, (0, 0));
    }

    #[tokio::test]
    async fn rating_requires_completion_and_range() {
        let f = fixture();
        let u1 = f.user("u1@example.com").await;
        let u2 = f.user("u2@example.com").await;
        let swap = f.request(&u1, &u2).await;

        let err = f.service.rate(swap.id, u1.id, rate(4, None)).await.unwrap_err();
        assert!(matches!(err, SwapError::InvalidState));
        let err = f.service.rate(swap.id, u1.id, rate(6, None)).await.unwrap_err();
        assert!(matches!(err, SwapError::OutOfRange(6)));
    }

    #[tokio::test]
    async fn outsiders_cannot_learn_swap_state_by_rating() {
        let f = fixture();
        let u1 = f.user("u1@example.com").await;
        let u2 = f.user("u2@example.com").await;
        let outsider = f.user("u3@example.com").await;
        let swap = f.request(&u1, &u2).await;

        let err = f
            .service
            .rate(swap.id, outsider.id, rate(4, None))
            .await
            .unwrap_err();
        assert!(matches!(err, SwapError::Forbidden(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn racing_transitions_apply_once() {
        for _ in 0..20 {
            let f = fixture();
            let u1 = f.user("u1@example.com").await;
            let u2 = f.user("u2@example.com").await;
            let swap = f.request(&u1, &u2).await;

            let (swap_id, u1_id, u2_id) = (swap.id, u1.id, u2.id);
            let cancel = {
                let service = f.service.clone();
                tokio::spawn(async move { service.cancel(swap_id, u1_id, None).await })
            };
            let reject = {
                let service = f.service.clone();
                tokio::spawn(async move { service.reject(swap_id, u2_id).await })
            };
            let results = [
                cancel.await.expect("join cancel"),
                reject.await.expect("join reject"),
            ];

            assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
            assert!(results.iter().any(|r| matches!(
                r,
                Err(SwapError::Conflict) | Err(SwapError::InvalidTransition { .. })
            )));
            assert_eq!(f.counters(&u1).await, (0, 0));
            assert_eq!(f.counters(&u2).await, (0, 0));
            assert!(f.users.audit_counters().await.expect("audit").is_empty());
        }
    }

    #[tokio::test]
    async fn notifications_follow_the_lifecycle() {
        let f = fixture();
        let u1 = f.user("u1@example.com").await;
        let u2 = f.user("u2@example.com").await;
        let (_, mut live) = f.ws.register(u1.id).await;

        let swap = f.request(&u1, &u2).await;
        let inbox = f
            .notifications
            .list(u2.id, NotificationQuery::default())
            .await
            .expect("list");
        assert_eq!(inbox[0].kind, NotificationType::SwapRequest);
        assert_eq!(inbox[0].related_user_id, Some(u1.id));

        f.service.accept(swap.id, u2.id, None).await.expect("accept");
        let inbox = f
            .notifications
            .list(u1.id, NotificationQuery::default())
            .await
            .expect("list");
        assert_eq!(inbox[0].kind, NotificationType::SwapAccepted);
        assert_eq!(inbox[0].related_swap_id, Some(swap.id));

        f.service.complete(swap.id, u2.id).await.expect("complete");
        let inbox = f
            .notifications
            .list(u1.id, NotificationQuery::default())
            .await
            .expect("list");
        assert_eq!(inbox[0].kind, NotificationType::SwapCompleted);

        let mut seen = Vec::new();
        while let Ok(frame) = live.try_recv() {
            let frame: serde_json::Value = serde_json::from_str(&frame).expect("json");
            seen.push(frame["event"].as_str().unwrap_or_default().to_string());
        }
        assert!(seen.iter().any(|e| e == "swap_status_changed"));
        assert!(seen.iter().any(|e| e == "notification_received"));
    }

    #[tokio::test]
    async fn mark_read_is_idempotent_and_listing_is_newest_first() {
        let f = fixture();
        let u1 = f.user("u1@example.com").await;
        let u2 = f.user("u2@example.com").await;
        let first = f.request(&u1, &u2).await;
        let second = f.request(&u2, &u1).await;

        for _ in 0..2 {
            let swap = f.service.mark_read(first.id, u2.id).await.expect("mark read");
            assert!(swap.is_read.recipient);
            assert!(!swap.is_read.requester);
        }

        let listed = f
            .service
            .list_for_user(u1.id, ListSwapsQuery::default())
            .await
            .expect("list");
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].swap.id, second.id);
        assert_eq!(listed[1].swap.id, first.id);

        let err = f
            .service
            .get(first.id, Uuid::new_v4(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, SwapError::Forbidden(_)));
    }
}
