//! PostgreSQL storage backend
//!
//! Production single point of truth. Appends to one thread serialize on a
//! transaction-scoped advisory lock derived from the thread key; appends to
//! different threads take different locks and proceed in parallel. The
//! projects, routing_entries, and bids tables are written by the external
//! project/routing/bidding workflow and only read here.

use axum::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::{ContextV7, Timestamp, Uuid};

use crate::domain::{
    BidStatus, Message, NewMessage, NewNotification, Notification, NotificationKind, Project,
    ProjectStatus, ThreadKey, ThreadScope,
};
use crate::store::{NotificationStore, RoutingGate, StoreError, ThreadStore};

pub struct PgStore {
    pool: PgPool,
    uuid_ctx: std::sync::Mutex<ContextV7>,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            uuid_ctx: std::sync::Mutex::new(ContextV7::new()),
        }
    }

    fn next_message_id(&self) -> Uuid {
        Uuid::new_v7(Timestamp::now(&self.uuid_ctx))
    }
}

#[derive(Debug, sqlx::FromRow)]
struct MessageRow {
    id: Uuid,
    project_id: Uuid,
    sender_id: Uuid,
    vendor_id: Uuid,
    text: String,
    image_url: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Self {
            id: row.id,
            project_id: row.project_id,
            sender_id: row.sender_id,
            vendor_id: row.vendor_id,
            text: row.text,
            image_url: row.image_url,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct NotificationRow {
    id: Uuid,
    user_id: Uuid,
    kind: String,
    title: String,
    message: Option<String>,
    data: serde_json::Value,
    is_read: bool,
    read_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<NotificationRow> for Notification {
    fn from(row: NotificationRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            kind: NotificationKind::from_db(&row.kind),
            title: row.title,
            message: row.message,
            data: row.data,
            is_read: row.is_read,
            read_at: row.read_at,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ProjectRow {
    id: Uuid,
    owner_id: Uuid,
    name: String,
    status: String,
    selected_vendor_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProjectRow> for Project {
    fn from(row: ProjectRow) -> Self {
        Self {
            id: row.id,
            owner_id: row.owner_id,
            name: row.name,
            status: match row.status.as_str() {
                "open" => ProjectStatus::Open,
                "in_progress" => ProjectStatus::InProgress,
                "completed" => ProjectStatus::Completed,
                "cancelled" => ProjectStatus::Cancelled,
                _ => ProjectStatus::Draft,
            },
            selected_vendor_id: row.selected_vendor_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl ThreadStore for PgStore {
    async fn append(&self, key: ThreadKey, new: NewMessage) -> Result<Message, StoreError> {
        if !key.is_well_formed() {
            return Err(StoreError::MalformedThreadKey);
        }

        let mut tx = self.pool.begin().await?;

        // Serialize concurrent appends to this thread only.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(format!("{}:{}", key.project_id, key.vendor_id))
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query_as::<_, MessageRow>(
            r#"
            INSERT INTO messages (id, project_id, sender_id, vendor_id, text, image_url, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, project_id, sender_id, vendor_id, text, image_url, created_at
            "#,
        )
        .bind(self.next_message_id())
        .bind(key.project_id)
        .bind(new.sender_id)
        .bind(key.vendor_id)
        .bind(&new.text)
        .bind(&new.image_url)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(row.into())
    }

    async fn list(
        &self,
        project_id: Uuid,
        scope: ThreadScope,
        cursor: Option<Uuid>,
    ) -> Result<Vec<Message>, StoreError> {
        if project_id.is_nil() {
            return Err(StoreError::MalformedThreadKey);
        }
        let vendor_id = match scope {
            ThreadScope::Vendor(v) if v.is_nil() => return Err(StoreError::MalformedThreadKey),
            ThreadScope::Vendor(v) => Some(v),
            ThreadScope::Project => None,
        };

        // Resolve the cursor to its sort key; an unknown cursor is an error,
        // never a silent full replay.
        let after: Option<(DateTime<Utc>, Uuid)> = match cursor {
            Some(cursor_id) => {
                let row: Option<(DateTime<Utc>, Uuid)> = sqlx::query_as(
                    r#"
                    SELECT created_at, id FROM messages
                    WHERE id = $1 AND project_id = $2
                    AND ($3::uuid IS NULL OR vendor_id = $3)
                    "#,
                )
                .bind(cursor_id)
                .bind(project_id)
                .bind(vendor_id)
                .fetch_optional(&self.pool)
                .await?;
                Some(row.ok_or_else(|| {
                    StoreError::NotFound("cursor message not in thread".to_string())
                })?)
            }
            None => None,
        };

        let rows = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT id, project_id, sender_id, vendor_id, text, image_url, created_at
            FROM messages
            WHERE project_id = $1
            AND ($2::uuid IS NULL OR vendor_id = $2)
            AND ($3::timestamptz IS NULL OR (created_at, id) > ($3, $4))
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(project_id)
        .bind(vendor_id)
        .bind(after.map(|(t, _)| t))
        .bind(after.map(|(_, i)| i))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[async_trait]
impl NotificationStore for PgStore {
    async fn insert(&self, new: NewNotification) -> Result<Notification, StoreError> {
        let row = sqlx::query_as::<_, NotificationRow>(
            r#"
            INSERT INTO notifications (id, user_id, kind, title, message, data)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, user_id, kind, title, message, data, is_read, read_at, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.user_id)
        .bind(new.kind.as_str())
        .bind(&new.title)
        .bind(&new.message)
        .bind(&new.data)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        unread_only: bool,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Notification>, i64), StoreError> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM notifications
            WHERE user_id = $1 AND ($2::bool = false OR is_read = false)
            "#,
        )
        .bind(user_id)
        .bind(unread_only)
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query_as::<_, NotificationRow>(
            r#"
            SELECT id, user_id, kind, title, message, data, is_read, read_at, created_at
            FROM notifications
            WHERE user_id = $1 AND ($2::bool = false OR is_read = false)
            ORDER BY created_at DESC, id DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(user_id)
        .bind(unread_only)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok((rows.into_iter().map(Into::into).collect(), total))
    }

    async fn list_since(
        &self,
        user_id: Uuid,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Notification>, StoreError> {
        let rows = sqlx::query_as::<_, NotificationRow>(
            r#"
            SELECT id, user_id, kind, title, message, data, is_read, read_at, created_at
            FROM notifications
            WHERE user_id = $1 AND ($2::timestamptz IS NULL OR created_at >= $2)
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(user_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn unread_count(&self, user_id: Uuid) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND is_read = false",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn mark_read(&self, user_id: Uuid, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET is_read = true, read_at = NOW()
            WHERE id = $1 AND user_id = $2 AND is_read = false
            "#,
        )
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        // Distinguish "already read" from "not yours / missing".
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM notifications WHERE id = $1 AND user_id = $2)",
        )
        .bind(id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn mark_all_read(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET is_read = true, read_at = NOW()
            WHERE user_id = $1 AND is_read = false
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl RoutingGate for PgStore {
    async fn project(&self, project_id: Uuid) -> Result<Option<Project>, StoreError> {
        let row = sqlx::query_as::<_, ProjectRow>(
            r#"
            SELECT id, owner_id, name, status, selected_vendor_id, created_at, updated_at
            FROM projects
            WHERE id = $1
            "#,
        )
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn is_routed(&self, project_id: Uuid, vendor_id: Uuid) -> Result<bool, StoreError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM routing_entries WHERE project_id = $1 AND vendor_id = $2)",
        )
        .bind(project_id)
        .bind(vendor_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn bid_status(
        &self,
        project_id: Uuid,
        vendor_id: Uuid,
    ) -> Result<BidStatus, StoreError> {
        let status: Option<String> = sqlx::query_scalar(
            "SELECT status FROM bids WHERE project_id = $1 AND vendor_id = $2",
        )
        .bind(project_id)
        .bind(vendor_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(status.as_deref().map(BidStatus::from_db).unwrap_or_default())
    }

    async fn eligible_vendors(&self, project_id: Uuid) -> Result<Vec<Uuid>, StoreError> {
        let vendors: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT vendor_id FROM (
                SELECT vendor_id, MIN(ordered_at) AS ordered_at FROM (
                    SELECT vendor_id, routed_at AS ordered_at
                    FROM routing_entries WHERE project_id = $1
                    UNION ALL
                    SELECT vendor_id, created_at AS ordered_at
                    FROM bids WHERE project_id = $1 AND status <> 'no_bid'
                ) u
                GROUP BY vendor_id
            ) v
            ORDER BY ordered_at ASC
            "#,
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(vendors)
    }
}
