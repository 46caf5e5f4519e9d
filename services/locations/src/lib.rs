//! GreenToGo Location Service
//!
//! Registers pickup/drop-off locations for reusable boxes. Each location gets
//! a QR code encoding its name; the image is uploaded to object storage and a
//! location record referencing it is written to PostgreSQL.
//!
//! ## Flow
//!
//! ```text
//!  POST /api/v1/locations
//!         │
//!         ▼
//! ┌──────────────┐   PNG    ┌──────────────┐  path   ┌──────────────┐
//! │ QR Generator │─────────▶│ File Store   │────────▶│ Record Store │
//! │ (qrcode)     │          │ Locations/   │         │ locations    │
//! └──────────────┘          │ {uuid}.png   │         └──────────────┘
//!                           └──────────────┘                │
//!                                                           ▼
//!                                                 { objectId, path }
//! ```
//!
//! The three steps run strictly in order. There is no compensation: if the
//! record write fails, the uploaded image stays in the file store.

pub mod api;
pub mod config;
pub mod error;
pub mod file_store;
pub mod location_service;
pub mod qr_generator;
pub mod record_store;

pub use api::{create_router, start_api_server, AppState};
pub use config::Config;
pub use error::{LocationError, PersistenceError, QrCodeError, UploadError};
pub use file_store::{FileStore, S3FileStore};
pub use location_service::{GenerateLocationRequest, LocationCreated, LocationService};
pub use qr_generator::generate_qr_code;
pub use record_store::{LocationRecord, NewLocation, PgRecordStore, RecordStore};
