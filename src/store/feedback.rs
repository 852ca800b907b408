use std::sync::Arc;

use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::info;
use uuid::Uuid;

use crate::clock::Clock;
use crate::database::DbHandle;
use crate::error::{EntityKind, MarketError, Result};
use crate::model::{Feedback, Page};

/// Immutable reviews left on bids
#[derive(Clone)]
pub struct FeedbackStore {
    db: DbHandle,
    clock: Arc<dyn Clock>,
}

fn feedback_from_row(row: &SqliteRow) -> Result<Feedback> {
    Ok(Feedback {
        id: row.try_get("id")?,
        bid_id: row.try_get("bid_id")?,
        content: row.try_get("content")?,
        author_id: row.try_get("author_id")?,
        receiver_id: row.try_get("receiver_id")?,
        created_at: row.try_get("created_at")?,
    })
}

impl FeedbackStore {
    pub fn new(db: DbHandle, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    pub async fn submit(
        &self,
        bid_id: &str,
        content: &str,
        author_id: &str,
        receiver_id: &str,
    ) -> Result<Feedback> {
        let feedback = Feedback {
            id: Uuid::new_v4().to_string(),
            bid_id: bid_id.to_string(),
            content: content.to_string(),
            author_id: author_id.to_string(),
            receiver_id: receiver_id.to_string(),
            created_at: self.clock.now(),
        };

        let mut conn = self.db.acquire().await?;
        sqlx::query(
            "INSERT INTO feedback (id, bid_id, content, author_id, receiver_id, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&feedback.id)
        .bind(&feedback.bid_id)
        .bind(&feedback.content)
        .bind(&feedback.author_id)
        .bind(&feedback.receiver_id)
        .bind(feedback.created_at)
        .execute(&mut *conn)
        .await
        .map_err(|err| MarketError::from_insert(err, EntityKind::Bid))?;

        info!(feedback_id = %feedback.id, bid_id = %bid_id, "Feedback submitted");
        Ok(feedback)
    }

    /// Feedback received by a user or by any organization the user is
    /// responsible for, oldest first
    pub async fn reviews_for(&self, user_id: &str, page: Page) -> Result<Vec<Feedback>> {
        let mut conn = self.db.acquire().await?;
        let rows = sqlx::query(
            "SELECT id, bid_id, content, author_id, receiver_id, created_at FROM feedback \
             WHERE receiver_id = ? \
                OR receiver_id IN (SELECT organization_id FROM organization_responsible WHERE user_id = ?) \
             ORDER BY created_at ASC, id ASC LIMIT ? OFFSET ?",
        )
        .bind(user_id)
        .bind(user_id)
        .bind(page.sql_limit())
        .bind(page.offset())
        .fetch_all(&mut *conn)
        .await?;
        rows.iter().map(feedback_from_row).collect()
    }
}
