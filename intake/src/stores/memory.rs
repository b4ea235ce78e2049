use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::stores::{BlobError, BlobStore, Row, RowStore, Sheet, StoreError};

/// Row store kept in process memory, used when no database is configured and
/// throughout the tests.
#[derive(Clone, Default)]
pub struct MemoryRowStore {
    sheets: Arc<Mutex<HashMap<String, (Row, Vec<Row>)>>>,
}

impl MemoryRowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the data rows of a sheet, empty if it does not exist.
    pub async fn rows(&self, name: &str) -> Vec<Row> {
        let sheets = self.sheets.lock().await;
        sheets
            .get(name)
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default()
    }

    pub async fn header(&self, name: &str) -> Option<Row> {
        let sheets = self.sheets.lock().await;
        sheets.get(name).map(|(header, _)| header.clone())
    }
}

#[async_trait]
impl RowStore for MemoryRowStore {
    async fn get_or_create_sheet(&self, name: &str, header: &[&str]) -> Result<Sheet, StoreError> {
        let mut sheets = self.sheets.lock().await;
        let (stored_header, _) = sheets
            .entry(name.to_owned())
            .or_insert_with(|| (Sheet::new(name, header).header, Vec::new()));

        Ok(Sheet {
            name: name.to_owned(),
            header: stored_header.clone(),
        })
    }

    async fn append_row(&self, sheet: &Sheet, row: Row) -> Result<(), StoreError> {
        let mut sheets = self.sheets.lock().await;
        let (_, rows) = sheets
            .get_mut(&sheet.name)
            .ok_or_else(|| StoreError::UnknownSheet(sheet.name.clone()))?;
        rows.push(row);
        Ok(())
    }

    async fn read_rows(&self, sheet: &Sheet) -> Result<Vec<Row>, StoreError> {
        let sheets = self.sheets.lock().await;
        let (_, rows) = sheets
            .get(&sheet.name)
            .ok_or_else(|| StoreError::UnknownSheet(sheet.name.clone()))?;
        Ok(rows.clone())
    }

    async fn overwrite_row(&self, sheet: &Sheet, index: usize, row: Row) -> Result<(), StoreError> {
        let mut sheets = self.sheets.lock().await;
        let (_, rows) = sheets
            .get_mut(&sheet.name)
            .ok_or_else(|| StoreError::UnknownSheet(sheet.name.clone()))?;
        let slot = rows.get_mut(index).ok_or_else(|| StoreError::RowOutOfRange {
            sheet: sheet.name.clone(),
            index,
        })?;
        *slot = row;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Blob store kept in process memory. URLs are `<base_url>/<name>`.
#[derive(Clone)]
pub struct MemoryBlobStore {
    base_url: String,
    blobs: Arc<Mutex<HashMap<String, StoredBlob>>>,
}

impl MemoryBlobStore {
    pub fn new(base_url: &str) -> Self {
        MemoryBlobStore {
            base_url: base_url.trim_end_matches('/').to_owned(),
            blobs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn get(&self, name: &str) -> Option<StoredBlob> {
        self.blobs.lock().await.get(name).cloned()
    }

    pub async fn len(&self) -> usize {
        self.blobs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.lock().await.is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn store(&self, bytes: Vec<u8>, mime_type: &str, name: &str) -> Result<String, BlobError> {
        if name.is_empty() || name.contains('/') {
            return Err(BlobError::InvalidName(name.to_owned()));
        }

        self.blobs.lock().await.insert(
            name.to_owned(),
            StoredBlob {
                mime_type: mime_type.to_owned(),
                bytes,
            },
        );
        Ok(format!("{}/{}", self.base_url, name))
    }
}
