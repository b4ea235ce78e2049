//! Persistence collaborators: a tabular row store for submissions and a blob
//! store for uploaded slips. Both are traits so the handler can run against
//! memory-backed doubles in tests and local development.

use async_trait::async_trait;
use thiserror::Error;

pub mod fs;
pub mod memory;
pub mod postgres;

pub type Row = Vec<String>;

/// A named table whose first row is a fixed header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sheet {
    pub name: String,
    pub header: Row,
}

impl Sheet {
    pub fn new(name: &str, header: &[&str]) -> Self {
        Sheet {
            name: name.to_owned(),
            header: header.iter().map(|column| column.to_string()).collect(),
        }
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("connection failed with: {error}")]
    ConnectionError { error: sqlx::Error },
    #[error("{command} query failed with: {error}")]
    QueryError { command: String, error: sqlx::Error },
    #[error("failed to apply migrations: {error}")]
    MigrationError { error: sqlx::migrate::MigrateError },
    #[error("sheet {0} does not exist")]
    UnknownSheet(String),
    #[error("row {index} is out of range for sheet {sheet}")]
    RowOutOfRange { sheet: String, index: usize },
    #[error("row store unavailable: {0}")]
    Unavailable(String),
}

/// Tabular storage addressed by sheet name. Row indexes are zero-based and
/// exclude the header.
#[async_trait]
pub trait RowStore {
    /// Returns the named sheet, creating it with `header` when missing. An
    /// existing sheet keeps the header it was created with.
    async fn get_or_create_sheet(&self, name: &str, header: &[&str]) -> Result<Sheet, StoreError>;

    async fn append_row(&self, sheet: &Sheet, row: Row) -> Result<(), StoreError>;

    /// All data rows, oldest first.
    async fn read_rows(&self, sheet: &Sheet) -> Result<Vec<Row>, StoreError>;

    async fn overwrite_row(&self, sheet: &Sheet, index: usize, row: Row) -> Result<(), StoreError>;
}

#[derive(Error, Debug)]
pub enum BlobError {
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("invalid blob name {0:?}")]
    InvalidName(String),
    #[error("blob store unavailable: {0}")]
    Unavailable(String),
}

/// Opaque file storage. Returns a publicly fetchable URL for each stored blob.
#[async_trait]
pub trait BlobStore {
    async fn store(&self, bytes: Vec<u8>, mime_type: &str, name: &str) -> Result<String, BlobError>;
}
