use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;

use crate::stores::{Row, RowStore, Sheet, StoreError};

/// Row store backed by two Postgres tables: `sheets` holds the header of each
/// sheet and `sheet_rows` holds the data rows, ordered by insertion id.
#[derive(Clone)]
pub struct PgRowStore {
    pool: PgPool,
}

impl PgRowStore {
    /// Connects lazily, so the service boots even while the database is down.
    pub fn new(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect_lazy(url)
            .map_err(|error| StoreError::ConnectionError { error })?;

        Ok(Self { pool })
    }

    pub fn new_from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("../migrations")
            .run(&self.pool)
            .await
            .map_err(|error| StoreError::MigrationError { error })
    }
}

#[async_trait]
impl RowStore for PgRowStore {
    async fn get_or_create_sheet(&self, name: &str, header: &[&str]) -> Result<Sheet, StoreError> {
        let header: Row = header.iter().map(|column| column.to_string()).collect();

        sqlx::query(
            r#"
INSERT INTO sheets (name, header)
VALUES ($1, $2)
ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(name)
        .bind(Json(&header))
        .execute(&self.pool)
        .await
        .map_err(|error| StoreError::QueryError {
            command: "INSERT".to_owned(),
            error,
        })?;

        let Json(header) =
            sqlx::query_scalar::<_, Json<Row>>("SELECT header FROM sheets WHERE name = $1")
                .bind(name)
                .fetch_one(&self.pool)
                .await
                .map_err(|error| StoreError::QueryError {
                    command: "SELECT".to_owned(),
                    error,
                })?;

        Ok(Sheet {
            name: name.to_owned(),
            header,
        })
    }

    async fn append_row(&self, sheet: &Sheet, row: Row) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO sheet_rows (sheet, cells) VALUES ($1, $2)")
            .bind(&sheet.name)
            .bind(Json(row))
            .execute(&self.pool)
            .await
            .map_err(|error| match error {
                sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => {
                    StoreError::UnknownSheet(sheet.name.clone())
                }
                error => StoreError::QueryError {
                    command: "INSERT".to_owned(),
                    error,
                },
            })?;

        Ok(())
    }

    async fn read_rows(&self, sheet: &Sheet) -> Result<Vec<Row>, StoreError> {
        let rows = sqlx::query_scalar::<_, Json<Row>>(
            "SELECT cells FROM sheet_rows WHERE sheet = $1 ORDER BY id",
        )
        .bind(&sheet.name)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| StoreError::QueryError {
            command: "SELECT".to_owned(),
            error,
        })?;

        Ok(rows.into_iter().map(|Json(row)| row).collect())
    }

    async fn overwrite_row(&self, sheet: &Sheet, index: usize, row: Row) -> Result<(), StoreError> {
        let offset = i64::try_from(index).map_err(|_| StoreError::RowOutOfRange {
            sheet: sheet.name.clone(),
            index,
        })?;

        let result = sqlx::query(
            r#"
UPDATE sheet_rows
SET cells = $3, updated_at = NOW()
WHERE id = (
    SELECT id FROM sheet_rows
    WHERE sheet = $1
    ORDER BY id
    OFFSET $2
    LIMIT 1
)
            "#,
        )
        .bind(&sheet.name)
        .bind(offset)
        .bind(Json(row))
        .execute(&self.pool)
        .await
        .map_err(|error| StoreError::QueryError {
            command: "UPDATE".to_owned(),
            error,
        })?;

        if result.rows_affected() == 0 {
            return Err(StoreError::RowOutOfRange {
                sheet: sheet.name.clone(),
                index,
            });
        }
        Ok(())
    }
}
