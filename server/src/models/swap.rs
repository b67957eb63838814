//! Swap request models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Swap status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "swap_status", rename_all = "lowercase")]
pub enum SwapStatus {
    Pending,
    Accepted,
    Rejected,
    Completed,
    Cancelled,
}

impl SwapStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::Completed | Self::Cancelled)
    }

    /// Statuses counted by a user's `pending_swaps`
    pub fn is_open(self) -> bool {
        matches!(self, Self::Pending | Self::Accepted)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for SwapStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side of a swap a user is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Participant {
    Requester,
    Recipient,
}

/// One side's rating of a completed swap
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapRating {
    pub rating: u8,
    pub comment: Option<String>,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapRatings {
    pub from_requester: Option<SwapRating>,
    pub from_recipient: Option<SwapRating>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadFlags {
    pub requester: bool,
    pub recipient: bool,
}

/// Swap model
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Swap {
    pub id: Uuid,
    pub requester_id: Uuid,
    pub recipient_id: Uuid,
    pub requested_skill: String,
    pub offered_skill: String,
    pub status: SwapStatus,
    pub message: Option<String>,
    pub scheduled_date: Option<DateTime<Utc>>,
    pub completed_date: Option<DateTime<Utc>>,
    pub rating: SwapRatings,
    pub cancellation_reason: Option<String>,
    pub is_read: ReadFlags,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Swap {
    /// The side `user_id` is on, if any
    pub fn participant(&self, user_id: Uuid) -> Option<Participant> {
        if user_id == self.requester_id {
            Some(Participant::Requester)
        } else if user_id == self.recipient_id {
            Some(Participant::Recipient)
        } else {
            None
        }
    }

    pub fn participants(&self) -> [Uuid; 2] {
        [self.requester_id, self.recipient_id]
    }

    /// The user on the other side from `side`
    pub fn counterpart(&self, side: Participant) -> Uuid {
        match side {
            Participant::Requester => self.recipient_id,
            Participant::Recipient => self.requester_id,
        }
    }

    pub fn rating_from(&self, side: Participant) -> Option<&SwapRating> {
        match side {
            Participant::Requester => self.rating.from_requester.as_ref(),
            Participant::Recipient => self.rating.from_recipient.as_ref(),
        }
    }

    /// Accepted with a scheduled date already behind us
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == SwapStatus::Accepted && self.scheduled_date.is_some_and(|d| now > d)
    }

    pub fn is_fully_rated(&self) -> bool {
        self.rating.from_requester.is_some() && self.rating.from_recipient.is_some()
    }
}

/// Fields needed to insert a swap
#[derive(Debug, Clone)]
pub struct NewSwap {
    pub requester_id: Uuid,
    pub recipient_id: Uuid,
    pub requested_skill: String,
    pub offered_skill: String,
    pub message: Option<String>,
    pub scheduled_date: Option<DateTime<Utc>>,
}

/// Swap as returned over HTTP, with derived flags
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapView {
    #[serde(flatten)]
    pub swap: Swap,
    pub is_overdue: bool,
    pub is_fully_rated: bool,
}

impl SwapView {
    pub fn new(swap: Swap, now: DateTime<Utc>) -> Self {
        Self {
            is_overdue: swap.is_overdue(now),
            is_fully_rated: swap.is_fully_rated(),
            swap,
        }
    }
}

/// Request DTO for creating a swap
#[derive(Debug, Deserialize, validator::Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateSwapRequest {
    pub recipient_id: Uuid,
    #[validate(length(min = 1, max = 50))]
    pub requested_skill: String,
    #[validate(length(min = 1, max = 50))]
    pub offered_skill: String,
    #[validate(length(max = 500))]
    pub message: Option<String>,
    pub scheduled_date: Option<DateTime<Utc>>,
}

/// Body accepted by the accept endpoint
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptSwapRequest {
    pub scheduled_date: Option<DateTime<Utc>>,
}

/// Body accepted by the cancel endpoint
#[derive(Debug, Default, Deserialize, validator::Validate)]
#[serde(rename_all = "camelCase")]
pub struct CancelSwapRequest {
    #[validate(length(max = 200))]
    pub reason: Option<String>,
}

/// Request DTO for rating a swap
#[derive(Debug, Deserialize, validator::Validate)]
pub struct RateSwapRequest {
    pub rating: i64,
    #[validate(length(max = 300))]
    pub comment: Option<String>,
}

/// Query parameters for listing swaps
#[derive(Debug, Default, Deserialize)]
pub struct ListSwapsQuery {
    pub status: Option<SwapStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn swap(status: SwapStatus) -> Swap {
        let now = Utc::now();
        Swap {
            id: Uuid::new_v4(),
            requester_id: Uuid::new_v4(),
            recipient_id: Uuid::new_v4(),
            requested_skill: "Guitar".to_string(),
            offered_skill: "Python".to_string(),
            status,
            message: None,
            scheduled_date: Some(now - Duration::days(1)),
            completed_date: None,
            rating: SwapRatings::default(),
            cancellation_reason: None,
            is_read: ReadFlags::default(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn overdue_only_when_accepted() {
        let now = Utc::now();
        assert!(swap(SwapStatus::Accepted).is_overdue(now));
        assert!(!swap(SwapStatus::Pending).is_overdue(now));
    }

    #[test]
    fn participant_lookup() {
        let s = swap(SwapStatus::Pending);
        assert_eq!(s.participant(s.requester_id), Some(Participant::Requester));
        assert_eq!(s.participant(s.recipient_id), Some(Participant::Recipient));
        assert_eq!(s.participant(Uuid::new_v4()), None);
        assert_eq!(s.counterpart(Participant::Requester), s.recipient_id);
    }

    #[test]
    fn view_serializes_flat() {
        let value = serde_json::to_value(SwapView::new(swap(SwapStatus::Pending), Utc::now()))
            .expect("serialize view");
        assert_eq!(value["status"], "pending");
        assert_eq!(value["requestedSkill"], "Guitar");
        assert_eq!(value["isFullyRated"], false);
    }
}
