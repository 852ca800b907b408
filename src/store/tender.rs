use chrono::{DateTime, Utc};
use sqlx::query_builder::Separated;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};

use super::{decode_text, Versioned, VersionedStore};
use crate::cache::{Caches, ExistenceCache};
use crate::error::{EntityKind, Result};
use crate::model::{Page, ServiceType, Tender, TenderContent, TenderStatus};

pub type TenderStore = VersionedStore<Tender>;

/// Relational fields of a new tender, after username resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTender {
    pub organization_id: String,
    pub creator_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TenderFilter {
    /// Published tenders; an empty list matches every service type
    Published { service_types: Vec<ServiceType> },
    /// Every tender created by the given user id
    Creator { user_id: String },
}

impl Versioned for Tender {
    type Status = TenderStatus;
    type Content = TenderContent;
    type New = NewTender;
    type Filter = TenderFilter;

    const KIND: EntityKind = EntityKind::Tender;
    const TABLE: &'static str = "tender";
    const CONTENT_TABLE: &'static str = "tender_content";
    const OWNER_COLUMN: &'static str = "tender_id";
    const CONTENT_COLUMNS: &'static [&'static str] = &["name", "description", "service_type"];
    const SELECT: &'static str = "SELECT e.id, e.status, e.organization_id, e.user_id, e.version, e.created_at, \
         c.name, c.description, c.service_type \
         FROM tender e JOIN tender_content c ON c.tender_id = e.id AND c.version = e.version";
    const REFERENCED: EntityKind = EntityKind::Organization;
    const INITIAL: TenderStatus = TenderStatus::Created;
    const OPEN: TenderStatus = TenderStatus::Published;

    fn ids(caches: &Caches) -> &ExistenceCache {
        &caches.tender_ids
    }

    fn bind_insert<'args>(
        builder: &mut QueryBuilder<'args, Sqlite>,
        id: &str,
        new: &NewTender,
        created_at: DateTime<Utc>,
    ) {
        builder.push(
            "INSERT INTO tender (id, status, organization_id, user_id, version, created_at) VALUES (",
        );
        let mut values = builder.separated(", ");
        values.push_bind(id.to_string());
        values.push_bind(Self::INITIAL.as_str());
        values.push_bind(new.organization_id.clone());
        values.push_bind(new.creator_id.clone());
        values.push_bind(1_i64);
        values.push_bind(created_at);
        values.push_unseparated(")");
    }

    fn bind_content<'qb, 'args>(
        values: &mut Separated<'qb, 'args, Sqlite, &'static str>,
        content: &TenderContent,
    ) {
        values.push_bind(content.name.clone());
        values.push_bind(content.description.clone());
        values.push_bind(content.service_type.as_str());
    }

    fn push_filter<'args>(builder: &mut QueryBuilder<'args, Sqlite>, filter: &TenderFilter) {
        match filter {
            TenderFilter::Published { service_types } => {
                builder.push("e.status = ");
                builder.push_bind(TenderStatus::Published.as_str());
                if !service_types.is_empty() {
                    builder.push(" AND c.service_type IN (");
                    let mut types = builder.separated(", ");
                    for service_type in service_types {
                        types.push_bind(service_type.as_str());
                    }
                    types.push_unseparated(")");
                }
            }
            TenderFilter::Creator { user_id } => {
                builder.push("e.user_id = ");
                builder.push_bind(user_id.clone());
            }
        }
    }

    fn content_from_row(row: &SqliteRow) -> Result<TenderContent> {
        Ok(TenderContent {
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            service_type: decode_text(row, "service_type")?,
        })
    }

    fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Tender {
            id: row.try_get("id")?,
            status: decode_text(row, "status")?,
            organization_id: row.try_get("organization_id")?,
            creator_id: row.try_get("user_id")?,
            version: row.try_get("version")?,
            created_at: row.try_get("created_at")?,
            content: Self::content_from_row(row)?,
        })
    }
}

impl TenderStore {
    /// Create a tender in `Created` status. The creator is resolved through
    /// the username cache; the organization is checked by the foreign key.
    pub async fn create(
        &self,
        organization_id: &str,
        creator_username: &str,
        content: &TenderContent,
    ) -> Result<String> {
        let creator_id = self.resolve_username(creator_username)?;
        let new = NewTender {
            organization_id: organization_id.to_string(),
            creator_id,
        };
        self.insert(&new, content).await
    }

    pub async fn list_published(&self, service_types: &[ServiceType], page: Page) -> Result<Vec<Tender>> {
        let filter = TenderFilter::Published {
            service_types: service_types.to_vec(),
        };
        self.list_paged(&filter, page).await
    }

    pub async fn list_by_creator(&self, username: &str, page: Page) -> Result<Vec<Tender>> {
        let user_id = self.resolve_username(username)?;
        self.list_paged(&TenderFilter::Creator { user_id }, page).await
    }
}
