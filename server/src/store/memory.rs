//! In-memory store used by tests and by database-less development runs

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    NotificationFilter, NotificationRepository, RepositoryError, StatusChange, SwapRepository,
    UserRepository,
};
use crate::lifecycle::CounterDelta;
use crate::models::{
    CounterDrift, NewNotification, NewSwap, NewUser, Notification, Page, Participant,
    ProfileUpdate, RatingSummary, ReadFlags, SkillQuery, Swap, SwapRating, SwapRatings,
    SwapStatus, User, UserSort,
};

/// Every collection lives behind one lock, so multi-record writes are atomic.
/// Vectors keep insertion order, which doubles as creation order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    users: Vec<User>,
    swaps: Vec<Swap>,
    notifications: Vec<Notification>,
}

impl MemoryState {
    fn user_mut(&mut self, id: Uuid) -> Result<&mut User, RepositoryError> {
        self.users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or(RepositoryError::NotFound)
    }

    fn swap_mut(&mut self, id: Uuid) -> Result<&mut Swap, RepositoryError> {
        self.swaps
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(RepositoryError::NotFound)
    }

    /// Apply `delta` to both users, or to neither if one is missing
    fn apply_counters(&mut self, ids: [Uuid; 2], delta: CounterDelta) -> Result<(), RepositoryError> {
        let touched = self.users.iter().filter(|u| ids.contains(&u.id)).count() as u64;
        if touched != 2 {
            return Err(RepositoryError::CounterDrift { touched });
        }
        let now = Utc::now();
        for user in self.users.iter_mut().filter(|u| ids.contains(&u.id)) {
            user.pending_swaps += delta.pending;
            user.completed_swaps += delta.completed;
            user.updated_at = now;
        }
        Ok(())
    }
}

fn paginate<T>(items: impl Iterator<Item = T>, page: Page) -> Vec<T> {
    items
        .skip(page.offset as usize)
        .take(page.limit as usize)
        .collect()
}

fn matches_query(user: &User, query: &SkillQuery) -> bool {
    if !user.is_discoverable() {
        return false;
    }
    if !query.skills.is_empty() {
        let hit = user
            .skills_offered
            .iter()
            .chain(user.skills_wanted.iter())
            .any(|s| query.skills.contains(s));
        if !hit {
            return false;
        }
    }
    if let Some(text) = query.text.as_deref() {
        let needle = text.to_lowercase();
        let contains = |value: &str| value.to_lowercase().contains(&needle);
        let found = contains(user.name.as_str())
            || user.location.as_deref().is_some_and(contains)
            || user
                .skills_offered
                .iter()
                .chain(user.skills_wanted.iter())
                .any(|s| contains(s.as_str()));
        if !found {
            return false;
        }
    }
    if let Some(location) = query.location.as_deref() {
        let needle = location.to_lowercase();
        let found = user
            .location
            .as_deref()
            .is_some_and(|l| l.to_lowercase().contains(&needle));
        if !found {
            return false;
        }
    }
    !query.availability.any() || user.availability.overlaps(&query.availability)
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn insert_user(&self, user: NewUser) -> Result<User, RepositoryError> {
        let mut state = self.state.write().await;
        if state.users.iter().any(|u| u.email == user.email) {
            return Err(RepositoryError::DuplicateEmail);
        }
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            location: user.location,
            profile_photo: None,
            skills_offered: user.skills_offered,
            skills_wanted: user.skills_wanted,
            availability: user.availability,
            rating: RatingSummary::default(),
            completed_swaps: 0,
            pending_swaps: 0,
            is_public: true,
            is_admin: user.is_admin,
            is_verified: false,
            is_banned: false,
            ban_reason: None,
            last_active: now,
            created_at: now,
            updated_at: now,
        };
        state.users.push(user.clone());
        Ok(user)
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.users.iter().find(|u| u.email == email).cloned())
    }

    async fn update_profile(
        &self,
        id: Uuid,
        update: ProfileUpdate,
    ) -> Result<User, RepositoryError> {
        let mut state = self.state.write().await;
        let user = state.user_mut(id)?;
        if let Some(name) = update.name {
            user.name = name;
        }
        if let Some(location) = update.location {
            user.location = Some(location);
        }
        if let Some(photo) = update.profile_photo {
            user.profile_photo = Some(photo).filter(|p| !p.is_empty());
        }
        if let Some(skills) = update.skills_offered {
            user.skills_offered = skills;
        }
        if let Some(skills) = update.skills_wanted {
            user.skills_wanted = skills;
        }
        if let Some(availability) = update.availability {
            user.availability = availability;
        }
        if let Some(is_public) = update.is_public {
            user.is_public = is_public;
        }
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn update_password(
        &self,
        id: Uuid,
        password_hash: String,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        let user = state.user_mut(id)?;
        user.password_hash = password_hash;
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn touch_last_active(&self, id: Uuid) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        state.user_mut(id)?.last_active = Utc::now();
        Ok(())
    }

    async fn set_banned(
        &self,
        id: Uuid,
        banned: bool,
        reason: Option<String>,
    ) -> Result<User, RepositoryError> {
        let mut state = self.state.write().await;
        let user = state.user_mut(id)?;
        user.is_banned = banned;
        user.ban_reason = if banned { reason } else { None };
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn set_verified(&self, id: Uuid, verified: bool) -> Result<User, RepositoryError> {
        let mut state = self.state.write().await;
        let user = state.user_mut(id)?;
        user.is_verified = verified;
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn apply_rating(&self, id: Uuid, rating: u8) -> Result<User, RepositoryError> {
        let mut state = self.state.write().await;
        let user = state.user_mut(id)?;
        user.rating = user.rating.with_rating(rating);
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn search_users(&self, query: &SkillQuery) -> Result<Vec<User>, RepositoryError> {
        let state = self.state.read().await;
        let mut users: Vec<&User> = state
            .users
            .iter()
            .rev()
            .filter(|u| matches_query(u, query))
            .collect();
        match query.sort {
            UserSort::Newest => {}
            UserSort::Oldest => users.reverse(),
            UserSort::Rating => users.sort_by(|a, b| b.rating.average.total_cmp(&a.rating.average)),
            UserSort::Name => users.sort_by(|a, b| a.name.cmp(&b.name)),
            UserSort::CompletedSwaps => users.sort_by(|a, b| b.completed_swaps.cmp(&a.completed_swaps)),
        }
        Ok(paginate(users.into_iter().cloned(), query.page))
    }

    async fn list_users(&self, page: Page) -> Result<Vec<User>, RepositoryError> {
        let state = self.state.read().await;
        Ok(paginate(state.users.iter().rev().cloned(), page))
    }

    async fn audit_counters(&self) -> Result<Vec<CounterDrift>, RepositoryError> {
        let state = self.state.read().await;
        let mut expected: HashMap<Uuid, (i64, i64)> = HashMap::new();
        for swap in &state.swaps {
            for id in swap.participants() {
                let entry = expected.entry(id).or_default();
                if swap.status.is_open() {
                    entry.0 += 1;
                } else if swap.status == SwapStatus::Completed {
                    entry.1 += 1;
                }
            }
        }
        Ok(state
            .users
            .iter()
            .filter_map(|user| {
                let (pending, completed) = expected.get(&user.id).copied().unwrap_or_default();
                let drifted = i64::from(user.pending_swaps) != pending
                    || i64::from(user.completed_swaps) != completed;
                drifted.then(|| CounterDrift {
                    user_id: user.id,
                    pending_swaps: i64::from(user.pending_swaps),
                    completed_swaps: i64::from(user.completed_swaps),
                    expected_pending: pending,
                    expected_completed: completed,
                })
            })
            .collect())
    }
}

#[async_trait]
impl SwapRepository for MemoryStore {
    async fn create_swap(&self, swap: NewSwap) -> Result<Swap, RepositoryError> {
        let mut state = self.state.write().await;
        let participants = [swap.requester_id, swap.recipient_id];
        state
            .apply_counters(participants, CounterDelta::CREATED)
            .map_err(|_| RepositoryError::NotFound)?;
        let now = Utc::now();
        let swap = Swap {
            id: Uuid::new_v4(),
            requester_id: swap.requester_id,
            recipient_id: swap.recipient_id,
            requested_skill: swap.requested_skill,
            offered_skill: swap.offered_skill,
            status: SwapStatus::Pending,
            message: swap.message,
            scheduled_date: swap.scheduled_date,
            completed_date: None,
            rating: SwapRatings::default(),
            cancellation_reason: None,
            is_read: ReadFlags::default(),
            created_at: now,
            updated_at: now,
        };
        state.swaps.push(swap.clone());
        Ok(swap)
    }

    async fn find_swap(&self, id: Uuid) -> Result<Option<Swap>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.swaps.iter().find(|s| s.id == id).cloned())
    }

    async fn apply_status_change(&self, change: StatusChange) -> Result<Swap, RepositoryError> {
        let mut state = self.state.write().await;
        let swap = state.swap_mut(change.swap_id)?;
        if swap.status != change.expected {
            return Err(RepositoryError::Conflict);
        }
        let participants = swap.participants();
        if !change.delta.is_zero() {
            state.apply_counters(participants, change.delta)?;
        }

        let swap = state.swap_mut(change.swap_id)?;
        swap.status = change.target;
        if change.scheduled_date.is_some() {
            swap.scheduled_date = change.scheduled_date;
        }
        if change.completed_date.is_some() {
            swap.completed_date = change.completed_date;
        }
        if change.cancellation_reason.is_some() {
            swap.cancellation_reason = change.cancellation_reason;
        }
        swap.updated_at = Utc::now();
        Ok(swap.clone())
    }

    async fn record_rating(
        &self,
        swap_id: Uuid,
        side: Participant,
        rating: SwapRating,
    ) -> Result<(Swap, User), RepositoryError> {
        let mut state = self.state.write().await;
        let swap = state.swap_mut(swap_id)?;
        if swap.status != SwapStatus::Completed {
            return Err(RepositoryError::NotCompleted);
        }
        if swap.rating_from(side).is_some() {
            return Err(RepositoryError::AlreadyRated);
        }
        let rated_id = swap.counterpart(side);
        let value = rating.rating;

        // Update the user first so a missing user leaves the swap untouched.
        let user = state.user_mut(rated_id)?;
        user.rating = user.rating.with_rating(value);
        user.updated_at = Utc::now();
        let user = user.clone();

        let swap = state.swap_mut(swap_id)?;
        match side {
            Participant::Requester => swap.rating.from_requester = Some(rating),
            Participant::Recipient => swap.rating.from_recipient = Some(rating),
        }
        swap.updated_at = Utc::now();
        Ok((swap.clone(), user))
    }

    async fn mark_swap_read(
        &self,
        swap_id: Uuid,
        side: Participant,
    ) -> Result<Swap, RepositoryError> {
        let mut state = self.state.write().await;
        let swap = state.swap_mut(swap_id)?;
        match side {
            Participant::Requester => swap.is_read.requester = true,
            Participant::Recipient => swap.is_read.recipient = true,
        }
        Ok(swap.clone())
    }

    async fn list_swaps_for_user(
        &self,
        user_id: Uuid,
        status: Option<SwapStatus>,
        page: Page,
    ) -> Result<Vec<Swap>, RepositoryError> {
        let state = self.state.read().await;
        let swaps = state
            .swaps
            .iter()
            .rev()
            .filter(|s| s.participant(user_id).is_some())
            .filter(|s| status.map_or(true, |wanted| s.status == wanted))
            .cloned();
        Ok(paginate(swaps, page))
    }
}

#[async_trait]
impl NotificationRepository for MemoryStore {
    async fn insert_notifications(
        &self,
        notifications: Vec<NewNotification>,
    ) -> Result<Vec<Notification>, RepositoryError> {
        let mut state = self.state.write().await;
        let recipients_exist = notifications
            .iter()
            .all(|n| state.users.iter().any(|u| u.id == n.recipient_id));
        if !recipients_exist {
            return Err(RepositoryError::NotFound);
        }
        let now = Utc::now();
        let created: Vec<Notification> = notifications
            .into_iter()
            .map(|n| Notification {
                id: Uuid::new_v4(),
                recipient_id: n.recipient_id,
                kind: n.kind,
                title: n.title,
                message: n.message,
                related_swap_id: n.related_swap_id,
                related_user_id: n.related_user_id,
                is_read: false,
                is_system: n.is_system,
                action_url: n.action_url,
                metadata: n.metadata,
                created_at: now,
            })
            .collect();
        state.notifications.extend(created.iter().cloned());
        Ok(created)
    }

    async fn list_notifications(
        &self,
        recipient_id: Uuid,
        filter: NotificationFilter,
    ) -> Result<Vec<Notification>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .notifications
            .iter()
            .rev()
            .filter(|n| n.recipient_id == recipient_id)
            .filter(|n| !filter.unread_only || !n.is_read)
            .filter(|n| filter.kind.map_or(true, |k| n.kind == k))
            .take(filter.limit as usize)
            .cloned()
            .collect())
    }

    async fn mark_notifications_read(
        &self,
        recipient_id: Uuid,
        ids: Option<Vec<Uuid>>,
    ) -> Result<u64, RepositoryError> {
        let mut state = self.state.write().await;
        let mut updated = 0;
        for notification in state
            .notifications
            .iter_mut()
            .filter(|n| n.recipient_id == recipient_id)
            .filter(|n| ids.as_ref().map_or(true, |ids| ids.contains(&n.id)))
        {
            notification.is_read = true;
            updated += 1;
        }
        Ok(updated)
    }

    async fn unread_count(&self, recipient_id: Uuid) -> Result<i64, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .notifications
            .iter()
            .filter(|n| n.recipient_id == recipient_id && !n.is_read)
            .count() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Availability;

    fn new_user(email: &str, skills: &[&str]) -> NewUser {
        NewUser {
            name: "Test User".to_string(),
            email: email.to_string(),
            password_hash: "hash".to_string(),
            location: Some("Berlin".to_string()),
            skills_offered: skills.iter().map(|s| s.to_string()).collect(),
            skills_wanted: vec![],
            availability: Availability {
                weekends: true,
                ..Default::default()
            },
            is_admin: false,
        }
    }

    fn new_swap(requester: Uuid, recipient: Uuid) -> NewSwap {
        NewSwap {
            requester_id: requester,
            recipient_id: recipient,
            requested_skill: "Guitar".to_string(),
            offered_skill: "Python".to_string(),
            message: None,
            scheduled_date: None,
        }
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let store = MemoryStore::default();
        store.insert_user(new_user("a@example.com", &[])).await.unwrap();
        let err = store.insert_user(new_user("a@example.com", &[])).await.unwrap_err();
        assert!(matches!(err, RepositoryError::DuplicateEmail));
    }

    #[tokio::test]
    async fn create_swap_with_missing_user_changes_nothing() {
        let store = MemoryStore::default();
        let a = store.insert_user(new_user("a@example.com", &[])).await.unwrap();
        let err = store
            .create_swap(new_swap(a.id, Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound));
        let a = store.find_user(a.id).await.unwrap().unwrap();
        assert_eq!(a.pending_swaps, 0);
    }

    #[tokio::test]
    async fn stale_status_change_conflicts() {
        let store = MemoryStore::default();
        let a = store.insert_user(new_user("a@example.com", &[])).await.unwrap();
        let b = store.insert_user(new_user("b@example.com", &[])).await.unwrap();
        let swap = store.create_swap(new_swap(a.id, b.id)).await.unwrap();

        let cancel = StatusChange {
            swap_id: swap.id,
            expected: SwapStatus::Pending,
            target: SwapStatus::Cancelled,
            delta: CounterDelta {
                pending: -1,
                completed: 0,
            },
            scheduled_date: None,
            completed_date: None,
            cancellation_reason: None,
        };
        store.apply_status_change(cancel.clone()).await.unwrap();
        let err = store.apply_status_change(cancel).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict));

        let a = store.find_user(a.id).await.unwrap().unwrap();
        assert_eq!(a.pending_swaps, 0);
        assert!(store.audit_counters().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn search_filters_hidden_users() {
        let store = MemoryStore::default();
        let visible = store
            .insert_user(new_user("a@example.com", &["Guitar"]))
            .await
            .unwrap();
        let banned = store
            .insert_user(new_user("b@example.com", &["Guitar"]))
            .await
            .unwrap();
        store.set_banned(banned.id, true, None).await.unwrap();

        let query = SkillQuery {
            skills: vec!["Guitar".to_string()],
            location: Some("berl".to_string()),
            ..Default::default()
        };
        let found = store.search_users(&query).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, visible.id);
    }
}
