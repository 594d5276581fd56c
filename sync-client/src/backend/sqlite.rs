//! SQLite backend: the relational store the controller syncs against.
//!
//! Scalar fields the store filters or sorts on are real columns; nested
//! records (categories, bids, contacts, contract terms, integration settings)
//! are JSON bodies.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

use sync_types::{
    Aggregate, AggregateId, AggregateRecord, AggregateStatus, Amendment, Bid, CategoryId,
    ContactEntity, ContractTerms, Dataset, DetailPatch, FinancialSummary, IntegrationSettings,
    LineCategory, Mutation, PermissionMetadata, Role, Session, StatusConfig,
};

use super::DataBackend;
use crate::error::StoreError;

/// SQLite-backed store.
///
/// Visibility follows ownership: a session sees the aggregates it owns or
/// that are shared with its email.
#[derive(Clone)]
pub struct SqliteBackend {
    pool: SqlitePool,
    user_email: Option<String>,
}

#[derive(sqlx::FromRow)]
struct AggregateRow {
    id: String,
    name: String,
    location: String,
    status: String,
    owner_email: Option<String>,
    integration: String,
}

#[derive(sqlx::FromRow)]
struct AmendmentRow {
    id: String,
    label: String,
    price: f64,
}

#[derive(sqlx::FromRow)]
struct StatusRow {
    id: String,
    label: String,
    color: String,
}

impl SqliteBackend {
    /// Open (creating if missing) the database at `path`, acting as `user_email`.
    pub async fn open(path: &Path, user_email: Option<String>) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await?;

        let backend = Self { pool, user_email };
        backend.run_migrations().await?;
        Ok(backend)
    }

    /// Create an in-memory database (for testing).
    pub async fn in_memory(user_email: Option<String>) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(":memory:")?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let backend = Self { pool, user_email };
        backend.run_migrations().await?;
        Ok(backend)
    }

    /// Email the backend acts as.
    pub fn user_email(&self) -> Option<&str> {
        self.user_email.as_deref()
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        const SCHEMA: &[&str] = &[
            r#"
            CREATE TABLE IF NOT EXISTS aggregates (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                location TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL DEFAULT 'realization',
                owner_email TEXT,
                integration TEXT NOT NULL DEFAULT '{}',
                created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS aggregate_shares (
                aggregate_id TEXT NOT NULL,
                email TEXT NOT NULL,
                PRIMARY KEY (aggregate_id, email)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS categories (
                id TEXT PRIMARY KEY,
                aggregate_id TEXT NOT NULL,
                body TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS bids (
                id TEXT PRIMARY KEY,
                category_id TEXT NOT NULL,
                body TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS contract_terms (
                aggregate_id TEXT PRIMARY KEY,
                body TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS financial_summaries (
                aggregate_id TEXT PRIMARY KEY,
                contract_price REAL NOT NULL DEFAULT 0
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS amendments (
                id TEXT PRIMARY KEY,
                aggregate_id TEXT NOT NULL,
                label TEXT NOT NULL,
                price REAL NOT NULL DEFAULT 0
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS contacts (
                id TEXT PRIMARY KEY,
                body TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS statuses (
                id TEXT PRIMARY KEY,
                label TEXT NOT NULL,
                color TEXT NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_categories_aggregate ON categories(aggregate_id)",
            "CREATE INDEX IF NOT EXISTS idx_bids_category ON bids(category_id)",
            "CREATE INDEX IF NOT EXISTS idx_amendments_aggregate ON amendments(aggregate_id)",
        ];

        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Load a whole dataset in one transaction (initialisation, demo import).
    ///
    /// Aggregates are owned by the backend's user.
    pub async fn import(&self, data: &Dataset) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        // Aggregates are listed newest first; insert oldest first.
        for aggregate in data.aggregates.iter().rev() {
            let integration = data
                .detail(&aggregate.id)
                .map(|d| d.integration.clone())
                .unwrap_or_default();
            insert_aggregate(&mut tx, aggregate, self.user_email.as_deref(), &integration)
                .await?;
            for email in &aggregate.shared_with {
                sqlx::query("INSERT OR IGNORE INTO aggregate_shares (aggregate_id, email) VALUES (?1, ?2)")
                    .bind(aggregate.id.as_str())
                    .bind(email)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        for detail in data.details_by_id.values() {
            for category in &detail.categories {
                insert_category(&mut tx, &detail.id, category).await?;
            }
            for bid in detail.bids.values().flatten() {
                upsert_bid(&mut tx, bid).await?;
            }
            let patch = DetailPatch {
                contract: detail.contract.clone(),
                financials: detail.financials.clone(),
                ..Default::default()
            };
            apply_patch(&mut tx, &detail.id, &patch).await?;
        }

        for contact in &data.contacts {
            upsert_contact(&mut tx, contact).await?;
        }
        replace_statuses(&mut tx, &data.statuses).await?;

        tx.commit().await?;
        debug!(aggregates = data.aggregates.len(), "Imported dataset");
        Ok(())
    }

    /// Share an aggregate with another email.
    pub async fn share(&self, id: &AggregateId, email: &str) -> Result<(), StoreError> {
        sqlx::query("INSERT OR IGNORE INTO aggregate_shares (aggregate_id, email) VALUES (?1, ?2)")
            .bind(id.as_str())
            .bind(email)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn apply_write(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        mutation: &Mutation,
    ) -> Result<(), StoreError> {
        match mutation {
            Mutation::AddAggregate { aggregate } => {
                insert_aggregate(
                    tx,
                    aggregate,
                    self.user_email.as_deref(),
                    &IntegrationSettings::default(),
                )
                .await?;
            }
            Mutation::DeleteAggregate { aggregate_id } => {
                let id = aggregate_id.as_str();
                sqlx::query(
                    "DELETE FROM bids WHERE category_id IN (SELECT id FROM categories WHERE aggregate_id = ?1)",
                )
                .bind(id)
                .execute(&mut **tx)
                .await?;
                for table in [
                    "categories",
                    "contract_terms",
                    "financial_summaries",
                    "amendments",
                    "aggregate_shares",
                ] {
                    sqlx::query(&format!("DELETE FROM {table} WHERE aggregate_id = ?1"))
                        .bind(id)
                        .execute(&mut **tx)
                        .await?;
                }
                let deleted = sqlx::query("DELETE FROM aggregates WHERE id = ?1")
                    .bind(id)
                    .execute(&mut **tx)
                    .await?;
                expect_rows(deleted.rows_affected(), || format!("aggregate {id}"))?;
            }
            Mutation::SetAggregateStatus {
                aggregate_id,
                status,
            } => {
                let updated = sqlx::query("UPDATE aggregates SET status = ?1 WHERE id = ?2")
                    .bind(status.as_str())
                    .bind(aggregate_id.as_str())
                    .execute(&mut **tx)
                    .await?;
                expect_rows(updated.rows_affected(), || format!("aggregate {aggregate_id}"))?;
            }
            Mutation::UpdateDetail {
                aggregate_id,
                patch,
            } => {
                apply_patch(tx, aggregate_id, patch).await?;
            }
            Mutation::AddCategory {
                aggregate_id,
                category,
            } => {
                insert_category(tx, aggregate_id, category).await?;
            }
            Mutation::EditCategory {
                aggregate_id,
                category,
            } => {
                let updated =
                    sqlx::query("UPDATE categories SET body = ?1 WHERE id = ?2 AND aggregate_id = ?3")
                        .bind(serde_json::to_string(category)?)
                        .bind(category.id.as_str())
                        .bind(aggregate_id.as_str())
                        .execute(&mut **tx)
                        .await?;
                expect_rows(updated.rows_affected(), || format!("category {}", category.id))?;
            }
            Mutation::DeleteCategory {
                aggregate_id,
                category_id,
            } => {
                sqlx::query("DELETE FROM bids WHERE category_id = ?1")
                    .bind(category_id.as_str())
                    .execute(&mut **tx)
                    .await?;
                let deleted =
                    sqlx::query("DELETE FROM categories WHERE id = ?1 AND aggregate_id = ?2")
                        .bind(category_id.as_str())
                        .bind(aggregate_id.as_str())
                        .execute(&mut **tx)
                        .await?;
                expect_rows(deleted.rows_affected(), || format!("category {category_id}"))?;
            }
            Mutation::UpsertBid { aggregate_id, bid } => {
                require_category(tx, aggregate_id, &bid.category_id).await?;
                upsert_bid(tx, bid).await?;
            }
            Mutation::AddContact { contact } | Mutation::UpdateContact { contact } => {
                if matches!(mutation, Mutation::UpdateContact { .. }) {
                    let exists: i64 =
                        sqlx::query_scalar("SELECT COUNT(*) FROM contacts WHERE id = ?1")
                            .bind(contact.id.as_str())
                            .fetch_one(&mut **tx)
                            .await?;
                    expect_rows(exists as u64, || format!("contact {}", contact.id))?;
                }
                upsert_contact(tx, contact).await?;
            }
            Mutation::DeleteContacts { ids } => {
                for id in ids {
                    sqlx::query("DELETE FROM contacts WHERE id = ?1")
                        .bind(id.as_str())
                        .execute(&mut **tx)
                        .await?;
                }
            }
            Mutation::UpsertContacts { contacts } => {
                for contact in contacts {
                    upsert_contact(tx, contact).await?;
                }
            }
            Mutation::SetStatuses { statuses } => {
                replace_statuses(tx, statuses).await?;
            }
        }
        Ok(())
    }
}

fn expect_rows(affected: u64, what: impl FnOnce() -> String) -> Result<(), StoreError> {
    if affected == 0 {
        Err(StoreError::NotFound(what()))
    } else {
        Ok(())
    }
}

fn invalid_row(message: impl Into<String>) -> StoreError {
    StoreError::Transport {
        message: message.into(),
        code: Some("invalid_row".to_string()),
        details: None,
    }
}

async fn insert_aggregate(
    tx: &mut Transaction<'_, Sqlite>,
    aggregate: &Aggregate,
    owner: Option<&str>,
    integration: &IntegrationSettings,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO aggregates (id, name, location, status, owner_email, integration)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(aggregate.id.as_str())
    .bind(&aggregate.name)
    .bind(&aggregate.location)
    .bind(aggregate.status.as_str())
    .bind(owner)
    .bind(serde_json::to_string(integration)?)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn insert_category(
    tx: &mut Transaction<'_, Sqlite>,
    aggregate_id: &AggregateId,
    category: &LineCategory,
) -> Result<(), StoreError> {
    sqlx::query("INSERT INTO categories (id, aggregate_id, body) VALUES (?1, ?2, ?3)")
        .bind(category.id.as_str())
        .bind(aggregate_id.as_str())
        .bind(serde_json::to_string(category)?)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

async fn require_category(
    tx: &mut Transaction<'_, Sqlite>,
    aggregate_id: &AggregateId,
    category_id: &CategoryId,
) -> Result<(), StoreError> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM categories WHERE id = ?1 AND aggregate_id = ?2")
            .bind(category_id.as_str())
            .bind(aggregate_id.as_str())
            .fetch_one(&mut **tx)
            .await?;
    expect_rows(count as u64, || format!("category {category_id}"))
}

async fn upsert_bid(tx: &mut Transaction<'_, Sqlite>, bid: &Bid) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO bids (id, category_id, body) VALUES (?1, ?2, ?3)
        ON CONFLICT(id) DO UPDATE SET category_id = excluded.category_id, body = excluded.body
        "#,
    )
    .bind(bid.id.as_str())
    .bind(bid.category_id.as_str())
    .bind(serde_json::to_string(bid)?)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn upsert_contact(
    tx: &mut Transaction<'_, Sqlite>,
    contact: &ContactEntity,
) -> Result<(), StoreError> {
    let contact = sync_core::normalize_contact(contact.clone());
    sqlx::query(
        r#"
        INSERT INTO contacts (id, body) VALUES (?1, ?2)
        ON CONFLICT(id) DO UPDATE SET body = excluded.body
        "#,
    )
    .bind(contact.id.as_str())
    .bind(serde_json::to_string(&contact)?)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn replace_statuses(
    tx: &mut Transaction<'_, Sqlite>,
    statuses: &[StatusConfig],
) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM statuses").execute(&mut **tx).await?;
    for status in statuses {
        sqlx::query("INSERT INTO statuses (id, label, color) VALUES (?1, ?2, ?3)")
            .bind(&status.id)
            .bind(&status.label)
            .bind(&status.color)
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

async fn apply_patch(
    tx: &mut Transaction<'_, Sqlite>,
    aggregate_id: &AggregateId,
    patch: &DetailPatch,
) -> Result<(), StoreError> {
    let id = aggregate_id.as_str();
    let exists: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM aggregates WHERE id = ?1")
        .bind(id)
        .fetch_one(&mut **tx)
        .await?;
    expect_rows(exists as u64, || format!("aggregate {id}"))?;

    if let Some(title) = &patch.title {
        sqlx::query("UPDATE aggregates SET name = ?1 WHERE id = ?2")
            .bind(title)
            .bind(id)
            .execute(&mut **tx)
            .await?;
    }
    if let Some(location) = &patch.location {
        sqlx::query("UPDATE aggregates SET location = ?1 WHERE id = ?2")
            .bind(location)
            .bind(id)
            .execute(&mut **tx)
            .await?;
    }
    if let Some(integration) = &patch.integration {
        sqlx::query("UPDATE aggregates SET integration = ?1 WHERE id = ?2")
            .bind(serde_json::to_string(integration)?)
            .bind(id)
            .execute(&mut **tx)
            .await?;
    }
    if let Some(contract) = &patch.contract {
        sqlx::query(
            r#"
            INSERT INTO contract_terms (aggregate_id, body) VALUES (?1, ?2)
            ON CONFLICT(aggregate_id) DO UPDATE SET body = excluded.body
            "#,
        )
        .bind(id)
        .bind(serde_json::to_string(contract)?)
        .execute(&mut **tx)
        .await?;
    }
    if let Some(financials) = &patch.financials {
        sqlx::query(
            r#"
            INSERT INTO financial_summaries (aggregate_id, contract_price) VALUES (?1, ?2)
            ON CONFLICT(aggregate_id) DO UPDATE SET contract_price = excluded.contract_price
            "#,
        )
        .bind(id)
        .bind(financials.contract_price)
        .execute(&mut **tx)
        .await?;
        sqlx::query("DELETE FROM amendments WHERE aggregate_id = ?1")
            .bind(id)
            .execute(&mut **tx)
            .await?;
        for amendment in &financials.amendments {
            sqlx::query("INSERT INTO amendments (id, aggregate_id, label, price) VALUES (?1, ?2, ?3, ?4)")
                .bind(&amendment.id)
                .bind(id)
                .bind(&amendment.label)
                .bind(amendment.price)
                .execute(&mut **tx)
                .await?;
        }
    }
    Ok(())
}

#[async_trait]
impl DataBackend for SqliteBackend {
    async fn current_session(&self) -> Result<Option<Session>, StoreError> {
        Ok(self.user_email.as_ref().map(|email| Session {
            user_id: email.clone(),
            email: email.clone(),
            role: Role::User,
        }))
    }

    async fn list_aggregates(&self) -> Result<Vec<AggregateRecord>, StoreError> {
        let rows = sqlx::query_as::<_, AggregateRow>(
            r#"
            SELECT id, name, location, status, owner_email, integration
            FROM aggregates
            WHERE owner_email IS NULL
               OR owner_email = ?1
               OR id IN (SELECT aggregate_id FROM aggregate_shares WHERE email = ?1)
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(self.user_email.as_deref())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let status = AggregateStatus::from_str(&row.status)
                    .map_err(|e| invalid_row(e.to_string()))?;
                Ok(AggregateRecord {
                    aggregate: Aggregate {
                        id: AggregateId::new(row.id),
                        name: row.name,
                        location: row.location,
                        status,
                        owner: row.owner_email,
                        shared_with: Vec::new(),
                    },
                    integration: serde_json::from_str(&row.integration)?,
                })
            })
            .collect()
    }

    async fn list_permissions(&self) -> Result<Vec<PermissionMetadata>, StoreError> {
        let owners: Vec<(String, Option<String>)> =
            sqlx::query_as("SELECT id, owner_email FROM aggregates ORDER BY rowid")
                .fetch_all(&self.pool)
                .await?;
        let shares: Vec<(String, String)> = sqlx::query_as(
            "SELECT aggregate_id, email FROM aggregate_shares ORDER BY aggregate_id, email",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(owners
            .into_iter()
            .filter_map(|(id, owner)| {
                let owner = owner?;
                let shared_with = shares
                    .iter()
                    .filter(|(aggregate_id, _)| aggregate_id == &id)
                    .map(|(_, email)| email.clone())
                    .collect();
                Some(PermissionMetadata {
                    aggregate_id: AggregateId::new(id),
                    owner,
                    shared_with,
                })
            })
            .collect())
    }

    async fn list_categories(&self, id: &AggregateId) -> Result<Vec<LineCategory>, StoreError> {
        let bodies: Vec<String> =
            sqlx::query_scalar("SELECT body FROM categories WHERE aggregate_id = ?1 ORDER BY rowid")
                .bind(id.as_str())
                .fetch_all(&self.pool)
                .await?;
        bodies
            .iter()
            .map(|body| serde_json::from_str(body).map_err(StoreError::from))
            .collect()
    }

    async fn get_contract(&self, id: &AggregateId) -> Result<Option<ContractTerms>, StoreError> {
        let body: Option<String> =
            sqlx::query_scalar("SELECT body FROM contract_terms WHERE aggregate_id = ?1")
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await?;
        body.map(|body| serde_json::from_str(&body).map_err(StoreError::from))
            .transpose()
    }

    async fn get_financials(
        &self,
        id: &AggregateId,
    ) -> Result<Option<FinancialSummary>, StoreError> {
        let price: Option<f64> = sqlx::query_scalar(
            "SELECT contract_price FROM financial_summaries WHERE aggregate_id = ?1",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(price.map(|contract_price| FinancialSummary {
            contract_price,
            amendments: Vec::new(),
        }))
    }

    async fn list_amendments(&self, id: &AggregateId) -> Result<Vec<Amendment>, StoreError> {
        let rows = sqlx::query_as::<_, AmendmentRow>(
            "SELECT id, label, price FROM amendments WHERE aggregate_id = ?1 ORDER BY rowid",
        )
        .bind(id.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|row| Amendment {
                id: row.id,
                label: row.label,
                price: row.price,
            })
            .collect())
    }

    async fn list_bids(&self) -> Result<Vec<Bid>, StoreError> {
        let bodies: Vec<String> = sqlx::query_scalar("SELECT body FROM bids ORDER BY rowid")
            .fetch_all(&self.pool)
            .await?;
        bodies
            .iter()
            .map(|body| serde_json::from_str(body).map_err(StoreError::from))
            .collect()
    }

    async fn list_contacts(&self) -> Result<Vec<ContactEntity>, StoreError> {
        let bodies: Vec<String> = sqlx::query_scalar("SELECT body FROM contacts ORDER BY rowid")
            .fetch_all(&self.pool)
            .await?;
        bodies
            .iter()
            .map(|body| serde_json::from_str(body).map_err(StoreError::from))
            .collect()
    }

    async fn list_statuses(&self) -> Result<Vec<StatusConfig>, StoreError> {
        let rows =
            sqlx::query_as::<_, StatusRow>("SELECT id, label, color FROM statuses ORDER BY rowid")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows
            .into_iter()
            .map(|row| StatusConfig {
                id: row.id,
                label: row.label,
                color: row.color,
            })
            .collect())
    }

    async fn write(&self, mutation: &Mutation) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        self.apply_write(&mut tx, mutation).await?;
        tx.commit().await?;
        debug!(action = mutation.label(), "Write committed");
        Ok(())
    }
}
