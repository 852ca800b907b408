//! Append-only content history with a mutable status and version pointer.
//!
//! Each entity kind keeps a row in its own table (`status`, `version`) and a
//! dense run of content rows `1..=version` in its content table. Content rows
//! are written on create, edit and rollback and never touched again.

pub mod bid;
pub mod feedback;
pub mod organizations;
pub mod tender;
pub mod users;

use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use std::sync::Arc;

use sqlx::query_builder::Separated;
use sqlx::sqlite::SqliteRow;
use sqlx::{Connection, QueryBuilder, Row, Sqlite};
use tracing::{debug, info};
use uuid::Uuid;

use crate::cache::{Caches, ExistenceCache, LookupCache};
use crate::clock::Clock;
use crate::database::DbHandle;
use crate::error::{EntityKind, MarketError, Result};
use crate::model::{ContentVersion, Page, ParseValueError};

pub use bid::{BidFilter, BidStore};
pub use feedback::FeedbackStore;
pub use organizations::OrganizationStore;
pub use tender::{NewTender, TenderFilter, TenderStore};
pub use users::UserStore;

/// An entity kind stored with versioned content.
pub trait Versioned: Sized + Send + Sync + Unpin + 'static {
    type Status: Copy + Send + Sync + fmt::Display + FromStr<Err = ParseValueError> + 'static;
    type Content: Clone + Send + Sync + 'static;
    /// Relational fields fixed at creation
    type New: Send + Sync;
    type Filter: Send + Sync;

    const KIND: EntityKind;
    const TABLE: &'static str;
    const CONTENT_TABLE: &'static str;
    /// Column in the content table pointing at the entity row
    const OWNER_COLUMN: &'static str;
    const CONTENT_COLUMNS: &'static [&'static str];
    /// Entity joined with its current content, aliased `e` and `c`
    const SELECT: &'static str;
    /// The entity a failed foreign key on insert points at
    const REFERENCED: EntityKind;
    const INITIAL: Self::Status;
    /// The status conditional transitions start from
    const OPEN: Self::Status;

    fn ids(caches: &Caches) -> &ExistenceCache;

    fn bind_insert<'args>(
        builder: &mut QueryBuilder<'args, Sqlite>,
        id: &str,
        new: &Self::New,
        created_at: chrono::DateTime<chrono::Utc>,
    );

    fn bind_content<'qb, 'args>(
        values: &mut Separated<'qb, 'args, Sqlite, &'static str>,
        content: &Self::Content,
    );

    /// Append a condition (without leading `WHERE`) selecting the listing
    fn push_filter<'args>(builder: &mut QueryBuilder<'args, Sqlite>, filter: &Self::Filter);

    fn content_from_row(row: &SqliteRow) -> Result<Self::Content>;

    fn from_row(row: &SqliteRow) -> Result<Self>;
}

/// Decode a text column into one of the marketplace enums
pub(crate) fn decode_text<T>(row: &SqliteRow, column: &str) -> Result<T>
where
    T: FromStr<Err = ParseValueError>,
{
    let raw: String = row.try_get(column)?;
    raw.parse()
        .map_err(|err: ParseValueError| MarketError::StorageUnavailable(sqlx::Error::Decode(Box::new(err))))
}

/// Store for one versioned entity kind, bound to the pool or to a transaction
pub struct VersionedStore<E: Versioned> {
    pub(crate) db: DbHandle,
    pub(crate) ids: ExistenceCache,
    pub(crate) users: LookupCache,
    clock: Arc<dyn Clock>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Versioned> Clone for VersionedStore<E> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            ids: self.ids.clone(),
            users: self.users.clone(),
            clock: self.clock.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E: Versioned> fmt::Debug for VersionedStore<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersionedStore")
            .field("table", &E::TABLE)
            .field("transactional", &self.db.is_transactional())
            .finish()
    }
}

impl<E: Versioned> VersionedStore<E> {
    pub fn new(db: DbHandle, caches: &Caches, clock: Arc<dyn Clock>) -> Self {
        Self {
            db,
            ids: E::ids(caches).clone(),
            users: caches.user_ids.clone(),
            clock,
            _entity: PhantomData,
        }
    }

    /// Cache-only existence check
    pub fn exists(&self, id: &str) -> bool {
        self.ids.exists(id)
    }

    pub(crate) fn ensure_exists(&self, id: &str) -> Result<()> {
        if self.ids.exists(id) {
            Ok(())
        } else {
            Err(MarketError::not_found(E::KIND, id))
        }
    }

    /// Every id in the table, for cache warm-up
    pub async fn load_ids(&self) -> Result<Vec<String>> {
        let mut conn = self.db.acquire().await?;
        let ids: Vec<String> = sqlx::query_scalar(&format!("SELECT id FROM {}", E::TABLE))
            .fetch_all(&mut *conn)
            .await?;
        Ok(ids)
    }

    /// Insert the entity row and content version 1 atomically, then register
    /// the id once the write is durable.
    pub(crate) async fn insert(&self, new: &E::New, content: &E::Content) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let created_at = self.clock.now();

        {
            let mut conn = self.db.acquire().await?;
            let mut tx = conn.begin().await?;

            let mut entity = QueryBuilder::<Sqlite>::new("");
            E::bind_insert(&mut entity, &id, new, created_at);
            entity
                .build()
                .execute(&mut *tx)
                .await
                .map_err(|err| MarketError::from_insert(err, E::REFERENCED))?;

            Self::content_insert(&id, 1, content)
                .build()
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
        }

        let ids = self.ids.clone();
        let registered = id.clone();
        self.db.after_commit(move || ids.add(registered));

        info!(kind = %E::KIND, id = %id, "Created entity");
        Ok(id)
    }

    fn content_insert<'args>(id: &str, version: i64, content: &E::Content) -> QueryBuilder<'args, Sqlite> {
        let mut builder = QueryBuilder::new(format!(
            "INSERT INTO {} ({}, version, {}) VALUES (",
            E::CONTENT_TABLE,
            E::OWNER_COLUMN,
            E::CONTENT_COLUMNS.join(", ")
        ));
        {
            let mut values = builder.separated(", ");
            values.push_bind(id.to_string());
            values.push_bind(version);
            E::bind_content(&mut values, content);
        }
        builder.push(")");
        builder
    }

    /// Entity with its current content. A cache miss is answered without
    /// touching storage.
    pub async fn get_by_id(&self, id: &str) -> Result<E> {
        self.ensure_exists(id)?;

        let mut conn = self.db.acquire().await?;
        let row = sqlx::query(&format!("{} WHERE e.id = ?", E::SELECT))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        match row {
            Some(row) => E::from_row(&row),
            None => Err(MarketError::not_found(E::KIND, id)),
        }
    }

    /// Ordered by content name, ties broken by id
    pub async fn list_paged(&self, filter: &E::Filter, page: Page) -> Result<Vec<E>> {
        let mut builder = QueryBuilder::<Sqlite>::new(E::SELECT);
        builder.push(" WHERE ");
        E::push_filter(&mut builder, filter);
        builder.push(" ORDER BY c.name ASC, e.id ASC LIMIT ");
        builder.push_bind(page.sql_limit());
        builder.push(" OFFSET ");
        builder.push_bind(page.offset());

        let mut conn = self.db.acquire().await?;
        let rows = builder.build().fetch_all(&mut *conn).await?;
        rows.iter().map(E::from_row).collect()
    }

    pub async fn status(&self, id: &str) -> Result<E::Status> {
        self.ensure_exists(id)?;

        let mut conn = self.db.acquire().await?;
        let row = sqlx::query(&format!("SELECT status FROM {} WHERE id = ?", E::TABLE))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        match row {
            Some(row) => decode_text(&row, "status"),
            None => Err(MarketError::not_found(E::KIND, id)),
        }
    }

    /// Unconditional status write; content and version are untouched
    pub async fn set_status(&self, id: &str, status: E::Status) -> Result<E> {
        self.ensure_exists(id)?;

        {
            let mut conn = self.db.acquire().await?;
            sqlx::query(&format!("UPDATE {} SET status = ? WHERE id = ?", E::TABLE))
                .bind(status.to_string())
                .bind(id)
                .execute(&mut *conn)
                .await?;
        }

        debug!(kind = %E::KIND, id = %id, status = %status, "Status set");
        self.get_by_id(id).await
    }

    /// Compare-and-swap: move to `to` only if the current status is one of
    /// `from`. Reports whether the row changed.
    pub async fn set_status_from(&self, id: &str, from: &[E::Status], to: E::Status) -> Result<bool> {
        self.ensure_exists(id)?;
        if from.is_empty() {
            return Ok(false);
        }

        let mut builder = QueryBuilder::<Sqlite>::new(format!("UPDATE {} SET status = ", E::TABLE));
        builder.push_bind(to.to_string());
        builder.push(" WHERE id = ");
        builder.push_bind(id.to_string());
        builder.push(" AND status IN (");
        {
            let mut statuses = builder.separated(", ");
            for status in from {
                statuses.push_bind(status.to_string());
            }
        }
        builder.push(")");

        let mut conn = self.db.acquire().await?;
        let result = builder.build().execute(&mut *conn).await?;
        let changed = result.rows_affected() == 1;

        debug!(kind = %E::KIND, id = %id, to = %to, changed, "Conditional status update");
        Ok(changed)
    }

    /// Compare-and-swap from the open (`Published`) status
    pub async fn set_status_if_open(&self, id: &str, to: E::Status) -> Result<bool> {
        self.set_status_from(id, &[E::OPEN], to).await
    }

    /// Append content as version `current + 1` and advance the pointer
    pub async fn edit(&self, id: &str, content: &E::Content) -> Result<E> {
        self.ensure_exists(id)?;

        {
            let mut conn = self.db.acquire().await?;
            let mut tx = conn.begin().await?;

            // Write first so SQLite takes the write lock before anything is read.
            let mut builder = QueryBuilder::<Sqlite>::new(format!(
                "INSERT INTO {} ({}, version, {}) SELECT ",
                E::CONTENT_TABLE,
                E::OWNER_COLUMN,
                E::CONTENT_COLUMNS.join(", ")
            ));
            {
                let mut values = builder.separated(", ");
                values.push_bind(id.to_string());
                values.push("MAX(version) + 1");
                E::bind_content(&mut values, content);
            }
            builder.push(format!(" FROM {} WHERE {} = ", E::CONTENT_TABLE, E::OWNER_COLUMN));
            builder.push_bind(id.to_string());
            builder.build().execute(&mut *tx).await?;

            self.advance_pointer(&mut tx, id).await?;
            tx.commit().await?;
        }

        let entity = self.get_by_id(id).await?;
        info!(kind = %E::KIND, id = %id, "Content edited");
        Ok(entity)
    }

    /// Copy version `target` into version `current + 1`. History is kept;
    /// the status is not touched.
    pub async fn rollback(&self, id: &str, target: i64) -> Result<E> {
        self.ensure_exists(id)?;

        {
            let mut conn = self.db.acquire().await?;
            let mut tx = conn.begin().await?;

            let columns = E::CONTENT_COLUMNS.join(", ");
            let copied = sqlx::query(&format!(
                "INSERT INTO {table} ({owner}, version, {columns}) \
                 SELECT {owner}, (SELECT MAX(version) FROM {table} WHERE {owner} = ?) + 1, {columns} \
                 FROM {table} WHERE {owner} = ? AND version = ?",
                table = E::CONTENT_TABLE,
                owner = E::OWNER_COLUMN,
                columns = columns,
            ))
            .bind(id)
            .bind(id)
            .bind(target)
            .execute(&mut *tx)
            .await?;

            if copied.rows_affected() == 0 {
                tx.rollback().await?;
                return Err(MarketError::InvalidVersion {
                    kind: E::KIND,
                    id: id.to_string(),
                    version: target,
                });
            }

            self.advance_pointer(&mut tx, id).await?;
            tx.commit().await?;
        }

        let entity = self.get_by_id(id).await?;
        info!(kind = %E::KIND, id = %id, target, "Content rolled back");
        Ok(entity)
    }

    async fn advance_pointer(&self, conn: &mut sqlx::SqliteConnection, id: &str) -> Result<()> {
        sqlx::query(&format!(
            "UPDATE {table} SET version = (SELECT MAX(version) FROM {content} WHERE {owner} = ?) WHERE id = ?",
            table = E::TABLE,
            content = E::CONTENT_TABLE,
            owner = E::OWNER_COLUMN,
        ))
        .bind(id)
        .bind(id)
        .execute(conn)
        .await?;
        Ok(())
    }

    /// One historical content version
    pub async fn content_version(&self, id: &str, version: i64) -> Result<ContentVersion<E::Content>> {
        self.ensure_exists(id)?;

        let mut conn = self.db.acquire().await?;
        let row = sqlx::query(&format!(
            "SELECT version, {} FROM {} WHERE {} = ? AND version = ?",
            E::CONTENT_COLUMNS.join(", "),
            E::CONTENT_TABLE,
            E::OWNER_COLUMN
        ))
        .bind(id)
        .bind(version)
        .fetch_optional(&mut *conn)
        .await?;

        match row {
            Some(row) => Ok(ContentVersion {
                entity_id: id.to_string(),
                version: row.try_get("version")?,
                content: E::content_from_row(&row)?,
            }),
            None => Err(MarketError::InvalidVersion {
                kind: E::KIND,
                id: id.to_string(),
                version,
            }),
        }
    }

    /// Full history, oldest first
    pub async fn versions(&self, id: &str) -> Result<Vec<ContentVersion<E::Content>>> {
        self.ensure_exists(id)?;

        let mut conn = self.db.acquire().await?;
        let rows = sqlx::query(&format!(
            "SELECT version, {} FROM {} WHERE {} = ? ORDER BY version ASC",
            E::CONTENT_COLUMNS.join(", "),
            E::CONTENT_TABLE,
            E::OWNER_COLUMN
        ))
        .bind(id)
        .fetch_all(&mut *conn)
        .await?;

        rows.iter()
            .map(|row| -> Result<ContentVersion<E::Content>> {
                Ok(ContentVersion {
                    entity_id: id.to_string(),
                    version: row.try_get("version")?,
                    content: E::content_from_row(row)?,
                })
            })
            .collect()
    }

    pub(crate) fn resolve_username(&self, username: &str) -> Result<String> {
        self.users
            .get(username)
            .ok_or_else(|| MarketError::not_found(EntityKind::User, username))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::config::DatabaseConfig;
    use crate::database::Database;
    use crate::model::{OrganizationType, ServiceType, TenderContent, TenderStatus};
    use chrono::{TimeZone, Utc};

    async fn tender_store() -> (TenderStore, String) {
        let db = Database::connect(&DatabaseConfig::in_memory()).await.unwrap();
        let caches = Caches::new();
        let mut clock = MockClock::new();
        clock
            .expect_now()
            .returning(|| Utc.with_ymd_and_hms(2024, 9, 1, 8, 30, 0).unwrap());
        let clock: Arc<dyn Clock> = Arc::new(clock);

        UserStore::new(db.handle(), caches.user_ids.clone(), clock.clone())
            .create("alice", "Alice", "Smith")
            .await
            .unwrap();
        let org = OrganizationStore::new(db.handle(), caches.user_ids.clone(), clock.clone())
            .create("Acme", "", OrganizationType::JSC)
            .await
            .unwrap();

        let store = TenderStore::new(db.handle(), &caches, clock);
        let id = store
            .create(
                &org,
                "alice",
                &TenderContent {
                    name: "Bridge".to_string(),
                    description: "Steel".to_string(),
                    service_type: ServiceType::Construction,
                },
            )
            .await
            .unwrap();
        (store, id)
    }

    #[tokio::test]
    async fn test_created_at_comes_from_the_clock() {
        let (store, id) = tender_store().await;
        let tender = store.get_by_id(&id).await.unwrap();
        assert_eq!(
            tender.created_at,
            Utc.with_ymd_and_hms(2024, 9, 1, 8, 30, 0).unwrap()
        );
        assert_eq!(tender.status, TenderStatus::Created);
    }

    #[tokio::test]
    async fn test_conditional_update_requires_open_status() {
        let (store, id) = tender_store().await;

        assert!(!store.set_status_if_open(&id, TenderStatus::Closed).await.unwrap());
        store.set_status(&id, TenderStatus::Published).await.unwrap();
        assert!(store.set_status_if_open(&id, TenderStatus::Closed).await.unwrap());
        assert!(!store.set_status_if_open(&id, TenderStatus::Closed).await.unwrap());
        assert_eq!(store.status(&id).await.unwrap(), TenderStatus::Closed);
    }

    #[tokio::test]
    async fn test_empty_from_set_never_matches() {
        let (store, id) = tender_store().await;
        assert!(!store.set_status_from(&id, &[], TenderStatus::Closed).await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_creator_is_not_found() {
        let (store, _) = tender_store().await;
        let err = store
            .create(
                "any-org",
                "nobody",
                &TenderContent {
                    name: "Ghost".to_string(),
                    description: String::new(),
                    service_type: ServiceType::Delivery,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::NotFound { kind: EntityKind::User, .. }));
    }
}
