//! PostgreSQL store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use super::{
    NotificationFilter, NotificationRepository, RepositoryError, StatusChange, SwapRepository,
    UserRepository,
};
use crate::lifecycle::CounterDelta;
use crate::models::{
    Availability, CounterDrift, NewNotification, NewSwap, NewUser, Notification,
    NotificationType, Page, Participant, ProfileUpdate, RatingSummary, ReadFlags, SkillQuery,
    Swap, SwapRating, SwapRatings, SwapStatus, User, UserSort,
};

const SCHEMA: &[&str] = &[
    r#"
    DO $$ BEGIN
        CREATE TYPE swap_status AS ENUM ('pending', 'accepted', 'rejected', 'completed', 'cancelled');
    EXCEPTION WHEN duplicate_object THEN NULL;
    END $$
    "#,
    r#"
    DO $$ BEGIN
        CREATE TYPE notification_type AS ENUM (
            'swap_request', 'swap_accepted', 'swap_rejected', 'swap_completed',
            'swap_cancelled', 'rating_received', 'platform_message',
            'account_verified', 'account_banned'
        );
    EXCEPTION WHEN duplicate_object THEN NULL;
    END $$
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        location TEXT,
        profile_photo TEXT,
        skills_offered TEXT[] NOT NULL DEFAULT '{}',
        skills_wanted TEXT[] NOT NULL DEFAULT '{}',
        avail_weekdays BOOLEAN NOT NULL DEFAULT FALSE,
        avail_weekends BOOLEAN NOT NULL DEFAULT FALSE,
        avail_mornings BOOLEAN NOT NULL DEFAULT FALSE,
        avail_evenings BOOLEAN NOT NULL DEFAULT FALSE,
        rating_average DOUBLE PRECISION NOT NULL DEFAULT 0,
        rating_count INTEGER NOT NULL DEFAULT 0,
        completed_swaps INTEGER NOT NULL DEFAULT 0,
        pending_swaps INTEGER NOT NULL DEFAULT 0,
        is_public BOOLEAN NOT NULL DEFAULT TRUE,
        is_admin BOOLEAN NOT NULL DEFAULT FALSE,
        is_verified BOOLEAN NOT NULL DEFAULT FALSE,
        is_banned BOOLEAN NOT NULL DEFAULT FALSE,
        ban_reason TEXT,
        last_active TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS swaps (
        id UUID PRIMARY KEY,
        requester_id UUID NOT NULL REFERENCES users(id),
        recipient_id UUID NOT NULL REFERENCES users(id),
        requested_skill TEXT NOT NULL,
        offered_skill TEXT NOT NULL,
        status swap_status NOT NULL DEFAULT 'pending',
        message TEXT,
        scheduled_date TIMESTAMPTZ,
        completed_date TIMESTAMPTZ,
        requester_rating SMALLINT CHECK (requester_rating BETWEEN 1 AND 5),
        requester_comment TEXT,
        requester_rated_at TIMESTAMPTZ,
        recipient_rating SMALLINT CHECK (recipient_rating BETWEEN 1 AND 5),
        recipient_comment TEXT,
        recipient_rated_at TIMESTAMPTZ,
        cancellation_reason TEXT,
        requester_read BOOLEAN NOT NULL DEFAULT FALSE,
        recipient_read BOOLEAN NOT NULL DEFAULT FALSE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        CHECK (requester_id <> recipient_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS swaps_requester_status_idx ON swaps (requester_id, status)",
    "CREATE INDEX IF NOT EXISTS swaps_recipient_status_idx ON swaps (recipient_id, status)",
    "CREATE INDEX IF NOT EXISTS swaps_status_created_idx ON swaps (status, created_at DESC)",
    r#"
    CREATE TABLE IF NOT EXISTS notifications (
        id UUID PRIMARY KEY,
        recipient_id UUID NOT NULL REFERENCES users(id),
        kind notification_type NOT NULL,
        title TEXT NOT NULL,
        message TEXT NOT NULL,
        related_swap_id UUID REFERENCES swaps(id),
        related_user_id UUID REFERENCES users(id),
        is_read BOOLEAN NOT NULL DEFAULT FALSE,
        is_system BOOLEAN NOT NULL DEFAULT FALSE,
        action_url TEXT,
        metadata JSONB,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS notifications_recipient_read_idx ON notifications (recipient_id, is_read)",
    "CREATE INDEX IF NOT EXISTS notifications_recipient_created_idx ON notifications (recipient_id, created_at DESC)",
];

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    name: String,
    email: String,
    password_hash: String,
    location: Option<String>,
    profile_photo: Option<String>,
    skills_offered: Vec<String>,
    skills_wanted: Vec<String>,
    avail_weekdays: bool,
    avail_weekends: bool,
    avail_mornings: bool,
    avail_evenings: bool,
    rating_average: f64,
    rating_count: i32,
    completed_swaps: i32,
    pending_swaps: i32,
    is_public: bool,
    is_admin: bool,
    is_verified: bool,
    is_banned: bool,
    ban_reason: Option<String>,
    last_active: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            email: row.email,
            password_hash: row.password_hash,
            location: row.location,
            profile_photo: row.profile_photo,
            skills_offered: row.skills_offered,
            skills_wanted: row.skills_wanted,
            availability: Availability {
                weekdays: row.avail_weekdays,
                weekends: row.avail_weekends,
                mornings: row.avail_mornings,
                evenings: row.avail_evenings,
            },
            rating: RatingSummary {
                average: row.rating_average,
                count: row.rating_count,
            },
            completed_swaps: row.completed_swaps,
            pending_swaps: row.pending_swaps,
            is_public: row.is_public,
            is_admin: row.is_admin,
            is_verified: row.is_verified,
            is_banned: row.is_banned,
            ban_reason: row.ban_reason,
            last_active: row.last_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SwapRow {
    id: Uuid,
    requester_id: Uuid,
    recipient_id: Uuid,
    requested_skill: String,
    offered_skill: String,
    status: SwapStatus,
    message: Option<String>,
    scheduled_date: Option<DateTime<Utc>>,
    completed_date: Option<DateTime<Utc>>,
    requester_rating: Option<i16>,
    requester_comment: Option<String>,
    requester_rated_at: Option<DateTime<Utc>>,
    recipient_rating: Option<i16>,
    recipient_comment: Option<String>,
    recipient_rated_at: Option<DateTime<Utc>>,
    cancellation_reason: Option<String>,
    requester_read: bool,
    recipient_read: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn rating_side(
    rating: Option<i16>,
    comment: Option<String>,
    date: Option<DateTime<Utc>>,
    fallback: DateTime<Utc>,
) -> Option<SwapRating> {
    let rating = u8::try_from(rating?).ok()?;
    Some(SwapRating {
        rating,
        comment,
        date: date.unwrap_or(fallback),
    })
}

impl From<SwapRow> for Swap {
    fn from(row: SwapRow) -> Self {
        Self {
            id: row.id,
            requester_id: row.requester_id,
            recipient_id: row.recipient_id,
            requested_skill: row.requested_skill,
            offered_skill: row.offered_skill,
            status: row.status,
            message: row.message,
            scheduled_date: row.scheduled_date,
            completed_date: row.completed_date,
            rating: SwapRatings {
                from_requester: rating_side(
                    row.requester_rating,
                    row.requester_comment,
                    row.requester_rated_at,
                    row.updated_at,
                ),
                from_recipient: rating_side(
                    row.recipient_rating,
                    row.recipient_comment,
                    row.recipient_rated_at,
                    row.updated_at,
                ),
            },
            cancellation_reason: row.cancellation_reason,
            is_read: ReadFlags {
                requester: row.requester_read,
                recipient: row.recipient_read,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct NotificationRow {
    id: Uuid,
    recipient_id: Uuid,
    kind: NotificationType,
    title: String,
    message: String,
    related_swap_id: Option<Uuid>,
    related_user_id: Option<Uuid>,
    is_read: bool,
    is_system: bool,
    action_url: Option<String>,
    metadata: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
}

impl From<NotificationRow> for Notification {
    fn from(row: NotificationRow) -> Self {
        Self {
            id: row.id,
            recipient_id: row.recipient_id,
            kind: row.kind,
            title: row.title,
            message: row.message,
            related_swap_id: row.related_swap_id,
            related_user_id: row.related_user_id,
            is_read: row.is_read,
            is_system: row.is_system,
            action_url: row.action_url,
            metadata: row.metadata,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct DriftRow {
    user_id: Uuid,
    pending_swaps: i64,
    completed_swaps: i64,
    expected_pending: i64,
    expected_completed: i64,
}

fn sort_clause(sort: UserSort) -> &'static str {
    match sort {
        UserSort::Newest => "created_at DESC, id",
        UserSort::Oldest => "created_at ASC, id",
        UserSort::Rating => "rating_average DESC, created_at DESC",
        UserSort::Name => "name ASC, created_at DESC",
        UserSort::CompletedSwaps => "completed_swaps DESC, created_at DESC",
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23503"))
}

/// PostgreSQL-backed repositories
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect and make sure the schema exists
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, RepositoryError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        let store = Self { pool };
        store.initialize_schema().await?;
        tracing::debug!(statements = SCHEMA.len(), "Schema initialized");
        Ok(store)
    }

    async fn initialize_schema(&self) -> Result<(), RepositoryError> {
        for statement in SCHEMA {
            sqlx::query(*statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl UserRepository for PgStore {
    async fn insert_user(&self, user: NewUser) -> Result<User, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (
                id, name, email, password_hash, location, skills_offered, skills_wanted,
                avail_weekdays, avail_weekends, avail_mornings, avail_evenings, is_admin
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.location)
        .bind(&user.skills_offered)
        .bind(&user.skills_wanted)
        .bind(user.availability.weekdays)
        .bind(user.availability.weekends)
        .bind(user.availability.mornings)
        .bind(user.availability.evenings)
        .bind(user.is_admin)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                RepositoryError::DuplicateEmail
            } else {
                RepositoryError::Database(e)
            }
        })?;
        Ok(row.into())
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }

    async fn update_profile(
        &self,
        id: Uuid,
        update: ProfileUpdate,
    ) -> Result<User, RepositoryError> {
        let availability = update.availability;
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            UPDATE users SET
                name = COALESCE($2, name),
                location = COALESCE($3, location),
                skills_offered = COALESCE($4, skills_offered),
                skills_wanted = COALESCE($5, skills_wanted),
                avail_weekdays = COALESCE($6, avail_weekdays),
                avail_weekends = COALESCE($7, avail_weekends),
                avail_mornings = COALESCE($8, avail_mornings),
                avail_evenings = COALESCE($9, avail_evenings),
                is_public = COALESCE($10, is_public),
                profile_photo = CASE WHEN $11::TEXT IS NULL THEN profile_photo
                                     ELSE NULLIF($11, '') END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(update.name)
        .bind(update.location)
        .bind(update.skills_offered)
        .bind(update.skills_wanted)
        .bind(availability.map(|a| a.weekdays))
        .bind(availability.map(|a| a.weekends))
        .bind(availability.map(|a| a.mornings))
        .bind(availability.map(|a| a.evenings))
        .bind(update.is_public)
        .bind(update.profile_photo)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;
        Ok(row.into())
    }

    async fn update_password(
        &self,
        id: Uuid,
        password_hash: String,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(password_hash)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn touch_last_active(&self, id: Uuid) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE users SET last_active = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_banned(
        &self,
        id: Uuid,
        banned: bool,
        reason: Option<String>,
    ) -> Result<User, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            UPDATE users
            SET is_banned = $2, ban_reason = CASE WHEN $2 THEN $3 ELSE NULL END, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(banned)
        .bind(reason)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;
        Ok(row.into())
    }

    async fn set_verified(&self, id: Uuid, verified: bool) -> Result<User, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(
            "UPDATE users SET is_verified = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(verified)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;
        Ok(row.into())
    }

    async fn apply_rating(&self, id: Uuid, rating: u8) -> Result<User, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            UPDATE users SET
                rating_average = (rating_average * rating_count + $2) / (rating_count + 1),
                rating_count = rating_count + 1,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(f64::from(rating))
        .fetch_optional(&self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;
        Ok(row.into())
    }

    async fn search_users(&self, query: &SkillQuery) -> Result<Vec<User>, RepositoryError> {
        let sql = format!(
            r#"
            SELECT * FROM users
            WHERE is_public AND NOT is_banned
              AND (cardinality($1::TEXT[]) = 0 OR skills_offered && $1 OR skills_wanted && $1)
              AND ($2::TEXT IS NULL OR strpos(lower(location), lower($2)) > 0)
              AND (NOT ($3 OR $4 OR $5 OR $6)
                   OR ($3 AND avail_weekdays) OR ($4 AND avail_weekends)
                   OR ($5 AND avail_mornings) OR ($6 AND avail_evenings))
              AND ($9::TEXT IS NULL
                   OR strpos(lower(name), lower($9)) > 0
                   OR strpos(lower(COALESCE(location, '')), lower($9)) > 0
                   OR EXISTS (
                       SELECT 1 FROM unnest(skills_offered || skills_wanted) AS skill
                       WHERE strpos(lower(skill), lower($9)) > 0
                   ))
            ORDER BY {}
            LIMIT $7 OFFSET $8
            "#,
            sort_clause(query.sort)
        );
        let rows = sqlx::query_as::<_, UserRow>(&sql)
            .bind(&query.skills)
            .bind(&query.location)
            .bind(query.availability.weekdays)
            .bind(query.availability.weekends)
            .bind(query.availability.mornings)
            .bind(query.availability.evenings)
            .bind(query.page.limit)
            .bind(query.page.offset)
            .bind(&query.text)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(User::from).collect())
    }

    async fn list_users(&self, page: Page) -> Result<Vec<User>, RepositoryError> {
        let rows = sqlx::query_as::<_, UserRow>(
            "SELECT * FROM users ORDER BY created_at DESC, id LIMIT $1 OFFSET $2",
        )
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(User::from).collect())
    }

    async fn audit_counters(&self) -> Result<Vec<CounterDrift>, RepositoryError> {
        let rows = sqlx::query_as::<_, DriftRow>(
            r#"
            WITH participation AS (
                SELECT requester_id AS user_id, status FROM swaps
                UNION ALL
                SELECT recipient_id AS user_id, status FROM swaps
            ), expected AS (
                SELECT user_id,
                       COUNT(*) FILTER (WHERE status IN ('pending', 'accepted')) AS pending,
                       COUNT(*) FILTER (WHERE status = 'completed') AS completed
                FROM participation
                GROUP BY user_id
            )
            SELECT u.id AS user_id,
                   u.pending_swaps::BIGINT AS pending_swaps,
                   u.completed_swaps::BIGINT AS completed_swaps,
                   COALESCE(e.pending, 0) AS expected_pending,
                   COALESCE(e.completed, 0) AS expected_completed
            FROM users u
            LEFT JOIN expected e ON e.user_id = u.id
            WHERE u.pending_swaps <> COALESCE(e.pending, 0)
               OR u.completed_swaps <> COALESCE(e.completed, 0)
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| CounterDrift {
                user_id: r.user_id,
                pending_swaps: r.pending_swaps,
                completed_swaps: r.completed_swaps,
                expected_pending: r.expected_pending,
                expected_completed: r.expected_completed,
            })
            .collect())
    }
}

#[async_trait]
impl SwapRepository for PgStore {
    async fn create_swap(&self, swap: NewSwap) -> Result<Swap, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let touched = sqlx::query(
            r#"
            UPDATE users
            SET pending_swaps = pending_swaps + $2, updated_at = NOW()
            WHERE id = ANY($1)
            "#,
        )
        .bind(vec![swap.requester_id, swap.recipient_id])
        .bind(CounterDelta::CREATED.pending)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if touched != 2 {
            tx.rollback().await?;
            return Err(RepositoryError::NotFound);
        }

        let row = sqlx::query_as::<_, SwapRow>(
            r#"
            INSERT INTO swaps (
                id, requester_id, recipient_id, requested_skill, offered_skill,
                status, message, scheduled_date
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(swap.requester_id)
        .bind(swap.recipient_id)
        .bind(&swap.requested_skill)
        .bind(&swap.offered_skill)
        .bind(SwapStatus::Pending)
        .bind(&swap.message)
        .bind(swap.scheduled_date)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(row.into())
    }

    async fn find_swap(&self, id: Uuid) -> Result<Option<Swap>, RepositoryError> {
        let row = sqlx::query_as::<_, SwapRow>("SELECT * FROM swaps WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Swap::from))
    }

    async fn apply_status_change(&self, change: StatusChange) -> Result<Swap, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, SwapRow>(
            r#"
            UPDATE swaps SET
                status = $3,
                scheduled_date = COALESCE($4, scheduled_date),
                completed_date = COALESCE($5, completed_date),
                cancellation_reason = COALESCE($6, cancellation_reason),
                updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING *
            "#,
        )
        .bind(change.swap_id)
        .bind(change.expected)
        .bind(change.target)
        .bind(change.scheduled_date)
        .bind(change.completed_date)
        .bind(&change.cancellation_reason)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            let exists = self.find_swap(change.swap_id).await?.is_some();
            return Err(if exists {
                RepositoryError::Conflict
            } else {
                RepositoryError::NotFound
            });
        };

        if !change.delta.is_zero() {
            let touched = sqlx::query(
                r#"
                UPDATE users SET
                    pending_swaps = pending_swaps + $2,
                    completed_swaps = completed_swaps + $3,
                    updated_at = NOW()
                WHERE id = ANY($1)
                "#,
            )
            .bind(vec![row.requester_id, row.recipient_id])
            .bind(change.delta.pending)
            .bind(change.delta.completed)
            .execute(&mut *tx)
            .await?
            .rows_affected();
            if touched != 2 {
                tx.rollback().await?;
                return Err(RepositoryError::CounterDrift { touched });
            }
        }

        tx.commit().await?;
        Ok(row.into())
    }

    async fn record_rating(
        &self,
        swap_id: Uuid,
        side: Participant,
        rating: SwapRating,
    ) -> Result<(Swap, User), RepositoryError> {
        let (set_clause, rated_column) = match side {
            Participant::Requester => (
                "requester_rating = $2, requester_comment = $3, requester_rated_at = $4",
                "requester_rating",
            ),
            Participant::Recipient => (
                "recipient_rating = $2, recipient_comment = $3, recipient_rated_at = $4",
                "recipient_rating",
            ),
        };
        let sql = format!(
            r#"
            UPDATE swaps SET {set_clause}, updated_at = NOW()
            WHERE id = $1 AND status = 'completed' AND {rated_column} IS NULL
            RETURNING *
            "#
        );

        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, SwapRow>(&sql)
            .bind(swap_id)
            .bind(i16::from(rating.rating))
            .bind(&rating.comment)
            .bind(rating.date)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            let current = self
                .find_swap(swap_id)
                .await?
                .ok_or(RepositoryError::NotFound)?;
            return Err(if current.status != SwapStatus::Completed {
                RepositoryError::NotCompleted
            } else {
                RepositoryError::AlreadyRated
            });
        };

        let swap = Swap::from(row);
        let rated_id = swap.counterpart(side);
        let user = sqlx::query_as::<_, UserRow>(
            r#"
            UPDATE users SET
                rating_average = (rating_average * rating_count + $2) / (rating_count + 1),
                rating_count = rating_count + 1,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(rated_id)
        .bind(f64::from(rating.rating))
        .fetch_optional(&mut *tx)
        .await?;

        let Some(user) = user else {
            tx.rollback().await?;
            return Err(RepositoryError::NotFound);
        };

        tx.commit().await?;
        Ok((swap, user.into()))
    }

    async fn mark_swap_read(
        &self,
        swap_id: Uuid,
        side: Participant,
    ) -> Result<Swap, RepositoryError> {
        let sql = match side {
            Participant::Requester => {
                "UPDATE swaps SET requester_read = TRUE WHERE id = $1 RETURNING *"
            }
            Participant::Recipient => {
                "UPDATE swaps SET recipient_read = TRUE WHERE id = $1 RETURNING *"
            }
        };
        let row = sqlx::query_as::<_, SwapRow>(sql)
            .bind(swap_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)?;
        Ok(row.into())
    }

    async fn list_swaps_for_user(
        &self,
        user_id: Uuid,
        status: Option<SwapStatus>,
        page: Page,
    ) -> Result<Vec<Swap>, RepositoryError> {
        let rows = sqlx::query_as::<_, SwapRow>(
            r#"
            SELECT * FROM swaps
            WHERE (requester_id = $1 OR recipient_id = $1)
              AND ($2::swap_status IS NULL OR status = $2)
            ORDER BY created_at DESC, id
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(user_id)
        .bind(status)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Swap::from).collect())
    }
}

#[async_trait]
impl NotificationRepository for PgStore {
    async fn insert_notifications(
        &self,
        notifications: Vec<NewNotification>,
    ) -> Result<Vec<Notification>, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let mut created = Vec::with_capacity(notifications.len());
        for n in notifications {
            let row = sqlx::query_as::<_, NotificationRow>(
                r#"
                INSERT INTO notifications (
                    id, recipient_id, kind, title, message, related_swap_id,
                    related_user_id, is_system, action_url, metadata
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                RETURNING *
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(n.recipient_id)
            .bind(n.kind)
            .bind(&n.title)
            .bind(&n.message)
            .bind(n.related_swap_id)
            .bind(n.related_user_id)
            .bind(n.is_system)
            .bind(&n.action_url)
            .bind(&n.metadata)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    RepositoryError::NotFound
                } else {
                    RepositoryError::Database(e)
                }
            })?;
            created.push(row.into());
        }
        tx.commit().await?;
        Ok(created)
    }

    async fn list_notifications(
        &self,
        recipient_id: Uuid,
        filter: NotificationFilter,
    ) -> Result<Vec<Notification>, RepositoryError> {
        let rows = sqlx::query_as::<_, NotificationRow>(
            r#"
            SELECT * FROM notifications
            WHERE recipient_id = $1
              AND (NOT $2 OR NOT is_read)
              AND ($3::notification_type IS NULL OR kind = $3)
            ORDER BY created_at DESC, id
            LIMIT $4
            "#,
        )
        .bind(recipient_id)
        .bind(filter.unread_only)
        .bind(filter.kind)
        .bind(filter.limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Notification::from).collect())
    }

    async fn mark_notifications_read(
        &self,
        recipient_id: Uuid,
        ids: Option<Vec<Uuid>>,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE notifications SET is_read = TRUE
            WHERE recipient_id = $1 AND ($2::UUID[] IS NULL OR id = ANY($2))
            "#,
        )
        .bind(recipient_id)
        .bind(ids)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn unread_count(&self, recipient_id: Uuid) -> Result<i64, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE recipient_id = $1 AND NOT is_read",
        )
        .bind(recipient_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}
