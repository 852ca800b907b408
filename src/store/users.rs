use std::sync::Arc;

use sqlx::Row;
use tracing::info;
use uuid::Uuid;

use crate::cache::LookupCache;
use crate::clock::Clock;
use crate::database::DbHandle;
use crate::error::{unique_or_storage, EntityKind, MarketError, Result};

/// Employees, keyed by username
#[derive(Clone)]
pub struct UserStore {
    db: DbHandle,
    usernames: LookupCache,
    clock: Arc<dyn Clock>,
}

impl UserStore {
    pub fn new(db: DbHandle, usernames: LookupCache, clock: Arc<dyn Clock>) -> Self {
        Self {
            db,
            usernames,
            clock,
        }
    }

    /// Register an employee; the username becomes resolvable once committed
    pub async fn create(&self, username: &str, first_name: &str, last_name: &str) -> Result<String> {
        let id = Uuid::new_v4().to_string();

        {
            let mut conn = self.db.acquire().await?;
            sqlx::query(
                "INSERT INTO employee (id, username, first_name, last_name, created_at) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&id)
            .bind(username)
            .bind(first_name)
            .bind(last_name)
            .bind(self.clock.now())
            .execute(&mut *conn)
            .await
            .map_err(|err| unique_or_storage(err, EntityKind::User, username))?;
        }

        let usernames = self.usernames.clone();
        let (key, value) = (username.to_string(), id.clone());
        self.db.after_commit(move || usernames.add(key, value));

        info!(username = %username, user_id = %id, "Created user");
        Ok(id)
    }

    /// Resolve a username through the cache
    pub fn id_of(&self, username: &str) -> Result<String> {
        self.usernames
            .get(username)
            .ok_or_else(|| MarketError::not_found(EntityKind::User, username))
    }

    pub async fn exists(&self, user_id: &str) -> Result<bool> {
        let mut conn = self.db.acquire().await?;
        let found: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM employee WHERE id = ?)")
            .bind(user_id)
            .fetch_one(&mut *conn)
            .await?;
        Ok(found)
    }

    /// Every (username, id) pair, for cache warm-up
    pub async fn load_usernames(&self) -> Result<Vec<(String, String)>> {
        let mut conn = self.db.acquire().await?;
        let rows = sqlx::query("SELECT username, id FROM employee")
            .fetch_all(&mut *conn)
            .await?;
        rows.iter()
            .map(|row| -> Result<(String, String)> { Ok((row.try_get("username")?, row.try_get("id")?)) })
            .collect()
    }
}
