//! Notification emitter
//!
//! Persists notifications and pushes each one to the recipient's live
//! sockets. Lifecycle and moderation code call the `emit_*` helpers after
//! their own write has committed; those helpers log failures instead of
//! returning them.

use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::models::{
    BroadcastRequest, NewNotification, Notification, NotificationQuery, NotificationType, Page,
    Swap, SwapStatus, User,
};
use crate::store::{NotificationFilter, NotificationRepository, RepositoryError, UserRepository};
use crate::websocket::{events, WsState};

const MAX_TITLE_LEN: usize = 100;
pub const MAX_MESSAGE_LEN: usize = 500;
const MAX_ACTION_URL_LEN: usize = 200;
const BANNED_PREFIX: &str = "Your account has been banned";

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("{0} notifications require a related swap")]
    MissingRelatedSwap(&'static str),
    #[error("{0} notifications require a related user")]
    MissingRelatedUser(&'static str),
    #[error("Invalid notification: {0}")]
    Invalid(String),
    #[error("Unknown recipients: {0:?}")]
    UnknownRecipients(Vec<Uuid>),
    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Enforce the write-time relation and length rules
fn check(notification: &NewNotification) -> Result<(), NotificationError> {
    let kind = notification.kind;
    if kind.requires_related_swap() && notification.related_swap_id.is_none() {
        return Err(NotificationError::MissingRelatedSwap(kind.as_str()));
    }
    if kind.requires_related_user() && notification.related_user_id.is_none() {
        return Err(NotificationError::MissingRelatedUser(kind.as_str()));
    }
    let title_len = notification.title.chars().count();
    if title_len == 0 || title_len > MAX_TITLE_LEN {
        return Err(NotificationError::Invalid(format!(
            "title must be 1-{MAX_TITLE_LEN} characters"
        )));
    }
    let message_len = notification.message.chars().count();
    if message_len == 0 || message_len > MAX_MESSAGE_LEN {
        return Err(NotificationError::Invalid(format!(
            "message must be 1-{MAX_MESSAGE_LEN} characters"
        )));
    }
    if notification
        .action_url
        .as_ref()
        .is_some_and(|url| url.chars().count() > MAX_ACTION_URL_LEN)
    {
        return Err(NotificationError::Invalid(format!(
            "action url must be at most {MAX_ACTION_URL_LEN} characters"
        )));
    }
    Ok(())
}

/// Ban notice for `reason`, cut so the message stays within the stored limit
pub fn ban_message(reason: Option<&str>) -> String {
    match reason {
        Some(reason) => {
            let room = MAX_MESSAGE_LEN - BANNED_PREFIX.len() - 2;
            let reason: String = reason.chars().take(room).collect();
            format!("{BANNED_PREFIX}: {reason}")
        }
        None => BANNED_PREFIX.to_string(),
    }
}

pub struct NotificationService {
    users: Arc<dyn UserRepository>,
    notifications: Arc<dyn NotificationRepository>,
    ws_state: WsState,
}

impl NotificationService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        notifications: Arc<dyn NotificationRepository>,
        ws_state: WsState,
    ) -> Self {
        Self {
            users,
            notifications,
            ws_state,
        }
    }

    /// Validate, persist and push a batch of notifications
    pub async fn create_many(
        &self,
        batch: Vec<NewNotification>,
    ) -> Result<Vec<Notification>, NotificationError> {
        for notification in &batch {
            check(notification)?;
        }
        let created = self.notifications.insert_notifications(batch).await?;
        for notification in &created {
            match serde_json::to_value(notification) {
                Ok(data) => {
                    self.ws_state
                        .publish(notification.recipient_id, events::NOTIFICATION_RECEIVED, data)
                        .await
                }
                Err(e) => tracing::warn!("Failed to encode notification {}: {}", notification.id, e),
            }
        }
        Ok(created)
    }

    pub async fn create(&self, notification: NewNotification) -> Result<Notification, NotificationError> {
        self.create_many(vec![notification])
            .await?
            .pop()
            .ok_or(NotificationError::Repository(RepositoryError::NotFound))
    }

    /// Create without surfacing errors to the caller
    async fn emit(&self, notification: NewNotification) {
        let recipient = notification.recipient_id;
        let kind = notification.kind;
        if let Err(e) = self.create(notification).await {
            tracing::warn!(%recipient, kind = kind.as_str(), "Failed to emit notification: {}", e);
        }
    }

    pub async fn emit_swap_requested(&self, swap: &Swap, requester: &User) {
        self.emit(
            NewNotification::new(
                swap.recipient_id,
                NotificationType::SwapRequest,
                "New swap request",
                format!(
                    "{} wants to learn {} and offers {}",
                    requester.name, swap.requested_skill, swap.offered_skill
                ),
            )
            .with_swap(swap.id)
            .with_user(requester.id)
            .with_action_url(format!("/swaps/{}", swap.id)),
        )
        .await;
    }

    /// Notify the party that did not perform the status change
    pub async fn emit_status_changed(&self, swap: &Swap, actor: Uuid) {
        let (kind, title) = match swap.status {
            SwapStatus::Accepted => (NotificationType::SwapAccepted, "Swap request accepted"),
            SwapStatus::Rejected => (NotificationType::SwapRejected, "Swap request declined"),
            SwapStatus::Completed => (NotificationType::SwapCompleted, "Swap completed"),
            SwapStatus::Cancelled => (NotificationType::SwapCancelled, "Swap cancelled"),
            SwapStatus::Pending => return,
        };
        let recipient = if actor == swap.requester_id {
            swap.recipient_id
        } else {
            swap.requester_id
        };
        let mut message = format!(
            "Your swap of {} for {} is now {}",
            swap.offered_skill, swap.requested_skill, swap.status
        );
        if let Some(reason) = swap
            .cancellation_reason
            .as_deref()
            .filter(|_| swap.status == SwapStatus::Cancelled)
        {
            message.push_str(&format!(": {reason}"));
        }
        self.emit(
            NewNotification::new(recipient, kind, title, message)
                .with_swap(swap.id)
                .with_user(actor)
                .with_action_url(format!("/swaps/{}", swap.id)),
        )
        .await;
    }

    pub async fn emit_rating_received(&self, swap: &Swap, rater: Uuid, rated: Uuid, rating: u8) {
        self.emit(
            NewNotification::new(
                rated,
                NotificationType::RatingReceived,
                "New rating received",
                format!("You received a {rating}-star rating"),
            )
            .with_swap(swap.id)
            .with_user(rater)
            .with_metadata(json!({ "rating": rating })),
        )
        .await;
    }

    pub async fn emit_account_banned(&self, user: &User) {
        self.emit(
            NewNotification::new(
                user.id,
                NotificationType::AccountBanned,
                "Account banned",
                ban_message(user.ban_reason.as_deref()),
            )
            .system(),
        )
        .await;
    }

    pub async fn emit_account_verified(&self, user: &User) {
        self.emit(
            NewNotification::new(
                user.id,
                NotificationType::AccountVerified,
                "Account verified",
                "Your account has been verified",
            )
            .system(),
        )
        .await;
    }

    /// Newest first
    pub async fn list(
        &self,
        user_id: Uuid,
        query: NotificationQuery,
    ) -> Result<Vec<Notification>, NotificationError> {
        let filter = NotificationFilter {
            unread_only: query.unread_only,
            kind: query.kind,
            limit: query
                .limit
                .unwrap_or(Page::DEFAULT_LIMIT)
                .clamp(1, Page::MAX_LIMIT),
        };
        Ok(self.notifications.list_notifications(user_id, filter).await?)
    }

    pub async fn mark_read(
        &self,
        user_id: Uuid,
        ids: Option<Vec<Uuid>>,
    ) -> Result<u64, NotificationError> {
        Ok(self.notifications.mark_notifications_read(user_id, ids).await?)
    }

    pub async fn unread_count(&self, user_id: Uuid) -> Result<i64, NotificationError> {
        Ok(self.notifications.unread_count(user_id).await?)
    }

    /// Platform message from an admin to each listed recipient
    pub async fn broadcast_system(
        &self,
        req: BroadcastRequest,
    ) -> Result<Vec<Notification>, NotificationError> {
        req.validate()?;
        let mut recipients = req.recipient_ids.clone();
        recipients.sort_unstable();
        recipients.dedup();
        let mut unknown = Vec::new();
        for id in &recipients {
            if self.users.find_user(*id).await?.is_none() {
                unknown.push(*id);
            }
        }
        if !unknown.is_empty() {
            return Err(NotificationError::UnknownRecipients(unknown));
        }

        let batch = req
            .recipient_ids
            .iter()
            .map(|recipient| {
                NewNotification::new(
                    *recipient,
                    NotificationType::PlatformMessage,
                    req.title.trim(),
                    req.message.trim(),
                )
                .system()
            })
            .collect();
        let created = self.create_many(batch).await?;
        tracing::info!(recipients = created.len(), "Broadcast platform message");
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Availability, NewUser};
    use crate::store::MemoryStore;

    fn service() -> (NotificationService, Arc<MemoryStore>, WsState) {
        let ws = WsState::new();
        let store = Arc::new(MemoryStore::default());
        (
            NotificationService::new(store.clone(), store.clone(), ws.clone()),
            store,
            ws,
        )
    }

    async fn user(store: &MemoryStore, email: &str) -> Uuid {
        store
            .insert_user(NewUser {
                name: "Test User".to_string(),
                email: email.to_string(),
                password_hash: "hash".to_string(),
                location: None,
                skills_offered: vec![],
                skills_wanted: vec![],
                availability: Availability::default(),
                is_admin: false,
            })
            .await
            .expect("insert user")
            .id
    }

    #[tokio::test]
    async fn swap_notifications_need_a_related_swap() {
        let (service, _, _) = service();
        let err = service
            .create(NewNotification::new(
                Uuid::new_v4(),
                NotificationType::SwapAccepted,
                "Accepted",
                "Your swap was accepted",
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, NotificationError::MissingRelatedSwap("swap_accepted")));

        let err = service
            .create(
                NewNotification::new(
                    Uuid::new_v4(),
                    NotificationType::RatingReceived,
                    "Rated",
                    "You were rated",
                )
                .with_swap(Uuid::new_v4()),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, NotificationError::MissingRelatedUser(_)));
    }

    #[tokio::test]
    async fn created_notifications_are_pushed_live() {
        let (service, store, ws) = service();
        let user = user(&store, "live@example.com").await;
        let (_, mut rx) = ws.register(user).await;

        service
            .create(NewNotification::new(
                user,
                NotificationType::PlatformMessage,
                "Hello",
                "Welcome aboard",
            ))
            .await
            .expect("create");

        let frame: serde_json::Value =
            serde_json::from_str(&rx.recv().await.expect("frame")).expect("json");
        assert_eq!(frame["event"], "notification_received");
        assert_eq!(frame["data"]["type"], "platform_message");
    }

    #[tokio::test]
    async fn mark_read_and_unread_count() {
        let (service, store, _) = service();
        let user = user(&store, "inbox@example.com").await;
        let created = service
            .broadcast_system(BroadcastRequest {
                recipient_ids: vec![user, user],
                title: "Maintenance".to_string(),
                message: "Back soon".to_string(),
            })
            .await
            .expect("broadcast");
        assert!(created.iter().all(|n| n.is_system));
        assert_eq!(service.unread_count(user).await.expect("count"), 2);

        service
            .mark_read(user, Some(vec![created[0].id]))
            .await
            .expect("mark one");
        assert_eq!(service.unread_count(user).await.expect("count"), 1);

        let unread = service
            .list(
                user,
                NotificationQuery {
                    unread_only: true,
                    ..Default::default()
                },
            )
            .await
            .expect("list");
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].id, created[1].id);

        service.mark_read(user, None).await.expect("mark all");
        assert_eq!(service.unread_count(user).await.expect("count"), 0);
    }

    #[tokio::test]
    async fn broadcast_requires_recipients() {
        let (service, _, _) = service();
        let err = service
            .broadcast_system(BroadcastRequest {
                recipient_ids: vec![],
                title: "Hi".to_string(),
                message: "There".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, NotificationError::Validation(_)));
    }

    #[tokio::test]
    async fn broadcast_to_unknown_user_writes_nothing() {
        let (service, store, _) = service();
        let known = user(&store, "known@example.com").await;
        let stranger = Uuid::new_v4();

        let err = service
            .broadcast_system(BroadcastRequest {
                recipient_ids: vec![known, stranger],
                title: "Hi".to_string(),
                message: "There".to_string(),
            })
            .await
            .unwrap_err();
        match err {
            NotificationError::UnknownRecipients(ids) => assert_eq!(ids, vec![stranger]),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(service.unread_count(known).await.expect("count"), 0);
    }

    #[tokio::test]
    async fn insert_for_missing_recipient_is_refused() {
        let (service, _, _) = service();
        let err = service
            .create(NewNotification::new(
                Uuid::new_v4(),
                NotificationType::PlatformMessage,
                "Hello",
                "Nobody home",
            ))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            NotificationError::Repository(RepositoryError::NotFound)
        ));
    }

    #[test]
    fn long_ban_reason_fits_the_message_limit() {
        let message = ban_message(Some(&"x".repeat(500)));
        assert_eq!(message.chars().count(), MAX_MESSAGE_LEN);
        assert!(message.starts_with("Your account has been banned: x"));
        assert_eq!(ban_message(None), "Your account has been banned");
    }
}
