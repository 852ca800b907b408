use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::cache::LookupCache;
use crate::clock::Clock;
use crate::database::DbHandle;
use crate::error::{unique_or_storage, EntityKind, MarketError, Result};
use crate::model::OrganizationType;

#[derive(Clone)]
pub struct OrganizationStore {
    db: DbHandle,
    usernames: LookupCache,
    clock: Arc<dyn Clock>,
}

impl OrganizationStore {
    pub fn new(db: DbHandle, usernames: LookupCache, clock: Arc<dyn Clock>) -> Self {
        Self {
            db,
            usernames,
            clock,
        }
    }

    pub async fn create(
        &self,
        name: &str,
        description: &str,
        organization_type: OrganizationType,
    ) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let mut conn = self.db.acquire().await?;
        sqlx::query(
            "INSERT INTO organization (id, name, description, type, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(name)
        .bind(description)
        .bind(organization_type.as_str())
        .bind(self.clock.now())
        .execute(&mut *conn)
        .await?;

        info!(organization_id = %id, name = %name, "Created organization");
        Ok(id)
    }

    /// Make a user responsible for an organization
    pub async fn make_responsible(&self, organization_id: &str, username: &str) -> Result<()> {
        let user_id = self
            .usernames
            .get(username)
            .ok_or_else(|| MarketError::not_found(EntityKind::User, username))?;

        let mut conn = self.db.acquire().await?;
        sqlx::query(
            "INSERT INTO organization_responsible (id, organization_id, user_id) VALUES (?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(organization_id)
        .bind(&user_id)
        .execute(&mut *conn)
        .await
        .map_err(|err| {
            if err
                .as_database_error()
                .is_some_and(|db_err| db_err.is_foreign_key_violation())
            {
                MarketError::ReferentialIntegrity {
                    kind: EntityKind::Organization,
                }
            } else {
                unique_or_storage(err, EntityKind::Organization, organization_id)
            }
        })?;

        info!(organization_id = %organization_id, username = %username, "Added responsible user");
        Ok(())
    }

    pub async fn exists(&self, organization_id: &str) -> Result<bool> {
        let mut conn = self.db.acquire().await?;
        let found: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM organization WHERE id = ?)")
            .bind(organization_id)
            .fetch_one(&mut *conn)
            .await?;
        Ok(found)
    }
}
