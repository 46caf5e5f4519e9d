use crate::config::DatabaseConfig;
use crate::error::PersistenceError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use std::time::Duration;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Stored location record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct LocationRecord {
    /// Identifier assigned by the store on creation
    pub object_id: String,
    /// Human-readable label, also the QR payload
    pub name: String,
    /// Free-form category tag
    pub service: String,
    /// Path of the uploaded QR code image
    pub qr_code: String,
    /// Caller-supplied identifying code
    pub code: String,
    /// Number of boxes at the location
    pub inventory: i32,
    /// When the record was created
    pub created_at: DateTime<Utc>,
}

/// Fields of a location record before the store assigns an id
#[derive(Debug, Clone, PartialEq)]
pub struct NewLocation {
    pub name: String,
    pub service: String,
    pub qr_code: String,
    pub code: String,
    pub inventory: i32,
}

/// Structured-data store holding location records
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a location and return it with its assigned object id
    async fn save_location(&self, location: &NewLocation) -> Result<LocationRecord, PersistenceError>;

    /// Fetch a location by object id
    async fn get_location(&self, object_id: &str) -> Result<Option<LocationRecord>, PersistenceError>;

    /// Check connectivity
    async fn ping(&self) -> Result<(), PersistenceError>;
}

/// PostgreSQL-backed record store
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    /// Create a new record store with connection pool
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Some(Duration::from_secs(config.idle_timeout_secs)))
            .connect(&config.url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        info!("Connected to PostgreSQL database");

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;

        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    #[instrument(skip(self, location), fields(code = %location.code))]
    async fn save_location(&self, location: &NewLocation) -> Result<LocationRecord, PersistenceError> {
        let record = sqlx::query_as::<_, LocationRecord>(
            r#"
            INSERT INTO locations (name, service, qr_code, code, inventory)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING object_id::text AS object_id, name, service, qr_code,
                      code, inventory, created_at
            "#,
        )
        .bind(&location.name)
        .bind(&location.service)
        .bind(&location.qr_code)
        .bind(&location.code)
        .bind(location.inventory)
        .fetch_one(&self.pool)
        .await?;

        debug!(object_id = %record.object_id, "Location record saved");

        Ok(record)
    }

    async fn get_location(&self, object_id: &str) -> Result<Option<LocationRecord>, PersistenceError> {
        // Ids this store hands out are always UUIDs
        let Ok(id) = Uuid::parse_str(object_id) else {
            return Ok(None);
        };

        let record = sqlx::query_as::<_, LocationRecord>(
            r#"
            SELECT object_id::text AS object_id, name, service, qr_code,
                   code, inventory, created_at
            FROM locations
            WHERE object_id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn ping(&self) -> Result<(), PersistenceError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
