//! Notification models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Notification type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "notification_type", rename_all = "snake_case")]
pub enum NotificationType {
    SwapRequest,
    SwapAccepted,
    SwapRejected,
    SwapCompleted,
    SwapCancelled,
    RatingReceived,
    PlatformMessage,
    AccountVerified,
    AccountBanned,
}

impl NotificationType {
    /// Swap-typed notifications must point at a swap
    pub fn requires_related_swap(self) -> bool {
        matches!(
            self,
            Self::SwapRequest
                | Self::SwapAccepted
                | Self::SwapRejected
                | Self::SwapCompleted
                | Self::SwapCancelled
        )
    }

    pub fn requires_related_user(self) -> bool {
        matches!(self, Self::RatingReceived)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SwapRequest => "swap_request",
            Self::SwapAccepted => "swap_accepted",
            Self::SwapRejected => "swap_rejected",
            Self::SwapCompleted => "swap_completed",
            Self::SwapCancelled => "swap_cancelled",
            Self::RatingReceived => "rating_received",
            Self::PlatformMessage => "platform_message",
            Self::AccountVerified => "account_verified",
            Self::AccountBanned => "account_banned",
        }
    }
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notification model
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    pub related_swap_id: Option<Uuid>,
    pub related_user_id: Option<Uuid>,
    pub is_read: bool,
    pub is_system: bool,
    pub action_url: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Fields needed to insert a notification
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub recipient_id: Uuid,
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    pub related_swap_id: Option<Uuid>,
    pub related_user_id: Option<Uuid>,
    pub is_system: bool,
    pub action_url: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl NewNotification {
    pub fn new(
        recipient_id: Uuid,
        kind: NotificationType,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            recipient_id,
            kind,
            title: title.into(),
            message: message.into(),
            related_swap_id: None,
            related_user_id: None,
            is_system: false,
            action_url: None,
            metadata: None,
        }
    }

    pub fn with_swap(mut self, swap_id: Uuid) -> Self {
        self.related_swap_id = Some(swap_id);
        self
    }

    pub fn with_user(mut self, user_id: Uuid) -> Self {
        self.related_user_id = Some(user_id);
        self
    }

    pub fn with_action_url(mut self, url: impl Into<String>) -> Self {
        self.action_url = Some(url.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn system(mut self) -> Self {
        self.is_system = true;
        self
    }
}

/// Filter for listing a user's notifications
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread_only: bool,
    #[serde(rename = "type")]
    pub kind: Option<NotificationType>,
    pub limit: Option<i64>,
}

/// Body of the mark-read endpoint; no ids marks everything read
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkNotificationsRequest {
    pub notification_ids: Option<Vec<Uuid>>,
}

/// Admin broadcast of a platform message
#[derive(Debug, Deserialize, validator::Validate)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastRequest {
    #[validate(length(min = 1))]
    pub recipient_ids: Vec<Uuid>,
    #[validate(length(min = 1, max = 100))]
    pub title: String,
    #[validate(length(min = 1, max = 500))]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_wire_name() {
        let kinds = [
            NotificationType::SwapRequest,
            NotificationType::SwapAccepted,
            NotificationType::SwapRejected,
            NotificationType::SwapCompleted,
            NotificationType::SwapCancelled,
            NotificationType::RatingReceived,
            NotificationType::PlatformMessage,
            NotificationType::AccountVerified,
            NotificationType::AccountBanned,
        ];
        for kind in kinds {
            let wire = serde_json::to_value(kind).expect("serialize");
            assert_eq!(wire, serde_json::Value::String(kind.to_string()));
        }
    }
}
