//! Configuration and store selection for the bidsync CLI.

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

use sync_client::{
    ClientConfig, DataBackend, LocalBlobBackend, LoggingIntegration, SqliteBackend, StoreError,
    SyncController,
};
use sync_types::{
    AggregateId, AggregateRecord, Amendment, Bid, ContactEntity, ContractTerms, Dataset,
    FinancialSummary, LineCategory, Mutation, PermissionMetadata, Session, StatusConfig,
};

/// File name of the SQLite store inside the data directory.
pub const DB_FILE: &str = "bidsync.db";
/// File name of the local blob inside the data directory.
pub const BLOB_FILE: &str = "local.json";
/// File name of the client configuration inside the data directory.
pub const CONFIG_FILE: &str = "bidsync.toml";

/// Controller type used by every command.
pub type Controller = SyncController<StoreBackend, LoggingIntegration>;

/// Global options shared by every command.
#[derive(Debug, Clone)]
pub struct Context {
    /// Directory holding the store and configuration.
    pub data_dir: PathBuf,
    /// Explicit configuration file.
    pub config_path: Option<PathBuf>,
    /// Use the local blob instead of SQLite.
    pub local: bool,
    /// Session email for the SQLite store.
    pub user: String,
}

impl Context {
    /// Path of the SQLite store.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILE)
    }

    /// Path of the local blob.
    pub fn blob_path(&self) -> PathBuf {
        self.data_dir.join(BLOB_FILE)
    }

    /// Path of whichever store this context selects.
    pub fn store_path(&self) -> PathBuf {
        if self.local {
            self.blob_path()
        } else {
            self.db_path()
        }
    }

    /// Whether the selected store exists.
    pub fn is_initialized(&self) -> bool {
        self.store_path().exists()
    }

    /// Client configuration: the explicit file, else `bidsync.toml` in the
    /// data directory if present, else defaults.
    pub fn client_config(&self) -> Result<ClientConfig> {
        let path = match &self.config_path {
            Some(path) => path.clone(),
            None => {
                let path = self.data_dir.join(CONFIG_FILE);
                if !path.exists() {
                    return Ok(ClientConfig::default());
                }
                path
            }
        };
        Ok(ClientConfig::from_file(&path)?)
    }

    /// Open the selected store; it must have been initialized.
    pub async fn open_backend(&self) -> Result<StoreBackend> {
        if !self.is_initialized() {
            anyhow::bail!(
                "Store not initialized at {}. Run 'bidsync init' first.",
                self.store_path().display()
            );
        }
        self.connect().await
    }

    /// Open (creating if missing) the selected store.
    pub async fn connect(&self) -> Result<StoreBackend> {
        if self.local {
            let backend =
                LocalBlobBackend::open(&self.blob_path()).context("Failed to open local blob")?;
            Ok(StoreBackend::Local(backend))
        } else {
            let backend = SqliteBackend::open(&self.db_path(), Some(self.user.clone()))
                .await
                .context("Failed to open SQLite store")?;
            Ok(StoreBackend::Sqlite(backend))
        }
    }

    /// Build a controller over the selected store.
    pub async fn controller(&self) -> Result<Controller> {
        let backend = self.open_backend().await?;
        Ok(SyncController::new(
            backend,
            LoggingIntegration,
            self.client_config()?,
        ))
    }
}

/// The store selected on the command line.
pub enum StoreBackend {
    /// Relational store.
    Sqlite(SqliteBackend),
    /// Offline / demo blob.
    Local(LocalBlobBackend),
}

impl StoreBackend {
    /// Short name for status output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Sqlite(_) => "sqlite",
            Self::Local(_) => "local blob",
        }
    }

    /// Load a whole dataset into a freshly created store.
    pub async fn seed(&self, data: &Dataset, path: &Path) -> Result<()> {
        match self {
            Self::Sqlite(backend) => backend.import(data).await?,
            Self::Local(_) => {
                LocalBlobBackend::create(path, data.clone())?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DataBackend for StoreBackend {
    async fn current_session(&self) -> Result<Option<Session>, StoreError> {
        match self {
            Self::Sqlite(b) => b.current_session().await,
            Self::Local(b) => b.current_session().await,
        }
    }

    async fn list_aggregates(&self) -> Result<Vec<AggregateRecord>, StoreError> {
        match self {
            Self::Sqlite(b) => b.list_aggregates().await,
            Self::Local(b) => b.list_aggregates().await,
        }
    }

    async fn list_permissions(&self) -> Result<Vec<PermissionMetadata>, StoreError> {
        match self {
            Self::Sqlite(b) => b.list_permissions().await,
            Self::Local(b) => b.list_permissions().await,
        }
    }

    async fn list_categories(&self, id: &AggregateId) -> Result<Vec<LineCategory>, StoreError> {
        match self {
            Self::Sqlite(b) => b.list_categories(id).await,
            Self::Local(b) => b.list_categories(id).await,
        }
    }

    async fn get_contract(&self, id: &AggregateId) -> Result<Option<ContractTerms>, StoreError> {
        match self {
            Self::Sqlite(b) => b.get_contract(id).await,
            Self::Local(b) => b.get_contract(id).await,
        }
    }

    async fn get_financials(
        &self,
        id: &AggregateId,
    ) -> Result<Option<FinancialSummary>, StoreError> {
        match self {
            Self::Sqlite(b) => b.get_financials(id).await,
            Self::Local(b) => b.get_financials(id).await,
        }
    }

    async fn list_amendments(&self, id: &AggregateId) -> Result<Vec<Amendment>, StoreError> {
        match self {
            Self::Sqlite(b) => b.list_amendments(id).await,
            Self::Local(b) => b.list_amendments(id).await,
        }
    }

    async fn list_bids(&self) -> Result<Vec<Bid>, StoreError> {
        match self {
            Self::Sqlite(b) => b.list_bids().await,
            Self::Local(b) => b.list_bids().await,
        }
    }

    async fn list_contacts(&self) -> Result<Vec<ContactEntity>, StoreError> {
        match self {
            Self::Sqlite(b) => b.list_contacts().await,
            Self::Local(b) => b.list_contacts().await,
        }
    }

    async fn list_statuses(&self) -> Result<Vec<StatusConfig>, StoreError> {
        match self {
            Self::Sqlite(b) => b.list_statuses().await,
            Self::Local(b) => b.list_statuses().await,
        }
    }

    async fn write(&self, mutation: &Mutation) -> Result<(), StoreError> {
        match self {
            Self::Sqlite(b) => b.write(mutation).await,
            Self::Local(b) => b.write(mutation).await,
        }
    }

    fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn context(dir: &Path, local: bool) -> Context {
        Context {
            data_dir: dir.to_path_buf(),
            config_path: None,
            local,
            user: "owner@example.com".to_string(),
        }
    }

    #[test]
    fn missing_config_file_means_defaults() {
        let dir = tempdir().unwrap();
        let config = context(dir.path(), true).client_config().unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn config_file_in_data_dir_is_picked_up() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "[external_sync]\ncooldown_secs = 5\n",
        )
        .unwrap();
        let config = context(dir.path(), true).client_config().unwrap();
        assert_eq!(config.external_sync.cooldown_secs, 5);
    }

    #[test]
    fn explicit_missing_config_is_an_error() {
        let dir = tempdir().unwrap();
        let mut ctx = context(dir.path(), true);
        ctx.config_path = Some(dir.path().join("nope.toml"));
        assert!(ctx.client_config().is_err());
    }

    #[tokio::test]
    async fn uninitialized_store_is_refused() {
        let dir = tempdir().unwrap();
        assert!(context(dir.path(), true).open_backend().await.is_err());
        assert!(context(dir.path(), false).open_backend().await.is_err());
    }

    #[tokio::test]
    async fn store_kind_follows_flag() {
        let dir = tempdir().unwrap();
        let local = context(dir.path(), true).connect().await.unwrap();
        assert!(local.is_local());
        assert_eq!(local.kind(), "local blob");

        let sqlite = context(dir.path(), false).connect().await.unwrap();
        assert!(!sqlite.is_local());
        assert!(dir.path().join(DB_FILE).exists());
    }
}
