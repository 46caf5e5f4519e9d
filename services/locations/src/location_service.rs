use crate::error::{LocationError, PersistenceError, QrCodeUrlError};
use crate::file_store::FileStore;
use crate::qr_generator::{generate_qr_code, LOCATION_QR_SIZE};
use crate::record_store::{LocationRecord, NewLocation, RecordStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Folder in the file store holding location QR codes
pub const LOCATIONS_FOLDER: &str = "Locations";

/// Fields supplied when registering a location
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateLocationRequest {
    pub name: String,
    pub service: String,
    pub code: String,
    /// Initial box inventory
    pub boxes: i32,
}

/// Identifiers of a newly registered location
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationCreated {
    pub object_id: String,
    pub path: String,
}

/// Registers locations: renders the QR code, uploads it, then records it
pub struct LocationService {
    files: Arc<dyn FileStore>,
    records: Arc<dyn RecordStore>,
}

impl LocationService {
    pub fn new(files: Arc<dyn FileStore>, records: Arc<dyn RecordStore>) -> Self {
        Self { files, records }
    }

    /// Register a location.
    ///
    /// The upload happens before the record is written, so a failed record
    /// save leaves the uploaded image in the file store with nothing
    /// referencing it.
    #[instrument(skip(self, request), fields(code = %request.code))]
    pub async fn generate_location(
        &self,
        request: &GenerateLocationRequest,
    ) -> Result<LocationCreated, LocationError> {
        let png = generate_qr_code(&request.name, LOCATION_QR_SIZE, LOCATION_QR_SIZE)?;

        let filename = format!("{}.png", Uuid::new_v4());
        let path = self
            .files
            .save(LOCATIONS_FOLDER, &filename, png)
            .await
            .map_err(|e| {
                metrics::counter!("locations.upload_failures").increment(1);
                e
            })?;

        let location = NewLocation {
            name: request.name.clone(),
            service: request.service.clone(),
            qr_code: path.clone(),
            code: request.code.clone(),
            inventory: request.boxes,
        };

        let record = self.records.save_location(&location).await.map_err(|e| {
            metrics::counter!("locations.persistence_failures").increment(1);
            warn!(path = %path, error = %e, "Location record not saved, uploaded QR code is orphaned");
            e
        })?;

        metrics::counter!("locations.created").increment(1);

        info!(
            object_id = %record.object_id,
            path = %path,
            "Location registered"
        );

        Ok(LocationCreated {
            object_id: record.object_id,
            path,
        })
    }

    /// Look up a location by object id
    pub async fn get_location(&self, object_id: &str) -> Result<Option<LocationRecord>, PersistenceError> {
        self.records.get_location(object_id).await
    }

    /// Presigned URL for a location's QR code image, `None` if the location is unknown
    pub async fn qr_code_url(
        &self,
        object_id: &str,
        expires_in: Duration,
    ) -> Result<Option<(String, DateTime<Utc>)>, QrCodeUrlError> {
        let Some(record) = self.records.get_location(object_id).await? else {
            return Ok(None);
        };

        let presign_error = |message: String| QrCodeUrlError::Presign {
            path: record.qr_code.clone(),
            message,
        };

        let url = self
            .files
            .presigned_url(&record.qr_code, expires_in)
            .await
            .map_err(|e| presign_error(format!("{e:#}")))?;
        let expires_in =
            chrono::Duration::from_std(expires_in).map_err(|e| presign_error(e.to_string()))?;

        Ok(Some((url, Utc::now() + expires_in)))
    }

    /// Check the record store is reachable
    pub async fn ping(&self) -> Result<(), PersistenceError> {
        self.records.ping().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{QrCodeError, UploadError};
    use crate::file_store::MockFileStore;
    use crate::record_store::MockRecordStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_test::{assert_err, assert_ok};

    fn request(name: &str) -> GenerateLocationRequest {
        GenerateLocationRequest {
            name: name.to_string(),
            service: "cold-storage".to_string(),
            code: "WH-A-01".to_string(),
            boxes: 50,
        }
    }

    fn accepting_file_store() -> MockFileStore {
        let mut files = MockFileStore::new();
        files
            .expect_save()
            .returning(|folder, filename, _| Ok(format!("{folder}/{filename}")));
        files
    }

    fn accepting_record_store() -> MockRecordStore {
        let counter = AtomicUsize::new(0);
        let mut records = MockRecordStore::new();
        records.expect_save_location().returning(move |location| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            Ok(LocationRecord {
                object_id: format!("object-{n}"),
                name: location.name.clone(),
                service: location.service.clone(),
                qr_code: location.qr_code.clone(),
                code: location.code.clone(),
                inventory: location.inventory,
                created_at: Utc::now(),
            })
        });
        records
    }

    fn is_location_path(path: &str) -> bool {
        let Some(file) = path.strip_prefix("Locations/") else {
            return false;
        };
        let Some(stem) = file.strip_suffix(".png") else {
            return false;
        };
        stem.len() == 36 && Uuid::parse_str(stem).is_ok()
    }

    #[tokio::test]
    async fn test_generate_location_stores_image_then_record() {
        let mut files = MockFileStore::new();
        files
            .expect_save()
            .withf(|folder, filename, data| {
                folder == "Locations" && filename.ends_with(".png") && data.starts_with(b"\x89PNG")
            })
            .times(1)
            .returning(|folder, filename, _| Ok(format!("{folder}/{filename}")));

        let mut records = MockRecordStore::new();
        records
            .expect_save_location()
            .withf(|location| {
                location.name == "Warehouse A"
                    && location.service == "cold-storage"
                    && location.code == "WH-A-01"
                    && location.inventory == 50
                    && location.qr_code.starts_with("Locations/")
            })
            .times(1)
            .returning(|location| {
                Ok(LocationRecord {
                    object_id: "8d3c3a3e-6f7b-4c43-9b1a-2f0e5b7d9c11".to_string(),
                    name: location.name.clone(),
                    service: location.service.clone(),
                    qr_code: location.qr_code.clone(),
                    code: location.code.clone(),
                    inventory: location.inventory,
                    created_at: Utc::now(),
                })
            });

        let service = LocationService::new(Arc::new(files), Arc::new(records));
        let created = assert_ok!(service.generate_location(&request("Warehouse A")).await);

        assert_eq!(created.object_id, "8d3c3a3e-6f7b-4c43-9b1a-2f0e5b7d9c11");
        assert!(is_location_path(&created.path), "unexpected path {}", created.path);
    }

    #[tokio::test]
    async fn test_record_and_result_use_path_from_file_store() {
        const STORED_PATH: &str = "Locations/5f1d7c2a-93b4-4e0e-8a61-0c2f4b9d7e33.png";

        let mut files = MockFileStore::new();
        files
            .expect_save()
            .times(1)
            .returning(|_, _, _| Ok(STORED_PATH.to_string()));

        let mut records = MockRecordStore::new();
        records
            .expect_save_location()
            .withf(|location| location.qr_code == STORED_PATH)
            .times(1)
            .returning(|location| {
                Ok(LocationRecord {
                    object_id: "object-1".to_string(),
                    name: location.name.clone(),
                    service: location.service.clone(),
                    qr_code: location.qr_code.clone(),
                    code: location.code.clone(),
                    inventory: location.inventory,
                    created_at: Utc::now(),
                })
            });

        let service = LocationService::new(Arc::new(files), Arc::new(records));
        let created = assert_ok!(service.generate_location(&request("Warehouse A")).await);

        assert_eq!(created.path, STORED_PATH);
        assert_eq!(created.object_id, "object-1");
    }

    #[tokio::test]
    async fn test_repeated_calls_create_distinct_locations() {
        let service = LocationService::new(
            Arc::new(accepting_file_store()),
            Arc::new(accepting_record_store()),
        );

        let first = service.generate_location(&request("Warehouse A")).await.unwrap();
        let second = service.generate_location(&request("Warehouse A")).await.unwrap();

        assert_ne!(first.path, second.path);
        assert_ne!(first.object_id, second.object_id);
    }

    #[tokio::test]
    async fn test_upload_failure_skips_record_save() {
        let mut files = MockFileStore::new();
        files
            .expect_save()
            .times(1)
            .returning(|folder, filename, _| {
                Err(UploadError::new(format!("{folder}/{filename}"), "connection refused"))
            });

        let mut records = MockRecordStore::new();
        records.expect_save_location().times(0);

        let service = LocationService::new(Arc::new(files), Arc::new(records));
        let err = assert_err!(service.generate_location(&request("Warehouse A")).await);

        assert!(matches!(err, LocationError::Upload(_)));
    }

    #[tokio::test]
    async fn test_record_failure_after_upload_is_persistence_error() {
        let mut files = MockFileStore::new();
        files
            .expect_save()
            .times(1)
            .returning(|folder, filename, _| Ok(format!("{folder}/{filename}")));

        let mut records = MockRecordStore::new();
        records
            .expect_save_location()
            .times(1)
            .returning(|_| Err(PersistenceError::Database(sqlx::Error::PoolTimedOut)));

        let service = LocationService::new(Arc::new(files), Arc::new(records));
        let err = assert_err!(service.generate_location(&request("Warehouse A")).await);

        assert!(matches!(err, LocationError::Persistence(_)));
    }

    #[tokio::test]
    async fn test_unencodable_name_touches_no_store() {
        let mut files = MockFileStore::new();
        files.expect_save().times(0);
        let mut records = MockRecordStore::new();
        records.expect_save_location().times(0);

        let service = LocationService::new(Arc::new(files), Arc::new(records));
        let err = assert_err!(service.generate_location(&request(&"x".repeat(3000))).await);

        assert!(matches!(err, LocationError::QrCode(QrCodeError::Encoding(_))));
    }

    #[tokio::test]
    async fn test_qr_code_url_lookup_failure_is_persistence_error() {
        let mut records = MockRecordStore::new();
        records
            .expect_get_location()
            .returning(|_| Err(PersistenceError::Database(sqlx::Error::PoolTimedOut)));
        let mut files = MockFileStore::new();
        files.expect_presigned_url().times(0);

        let service = LocationService::new(Arc::new(files), Arc::new(records));
        let err = assert_err!(service.qr_code_url("object-1", Duration::from_secs(60)).await);

        assert!(matches!(err, QrCodeUrlError::Persistence(_)));
    }

    #[tokio::test]
    async fn test_qr_code_url_presign_failure_names_path() {
        let mut records = MockRecordStore::new();
        records.expect_get_location().returning(|id| {
            Ok(Some(LocationRecord {
                object_id: id.to_string(),
                name: "Warehouse A".to_string(),
                service: "cold-storage".to_string(),
                qr_code: "Locations/abc.png".to_string(),
                code: "WH-A-01".to_string(),
                inventory: 50,
                created_at: Utc::now(),
            }))
        });
        let mut files = MockFileStore::new();
        files
            .expect_presigned_url()
            .returning(|_, _| Err(anyhow::anyhow!("credentials expired")));

        let service = LocationService::new(Arc::new(files), Arc::new(records));
        let err = assert_err!(service.qr_code_url("object-1", Duration::from_secs(60)).await);

        match err {
            QrCodeUrlError::Presign { path, message } => {
                assert_eq!(path, "Locations/abc.png");
                assert!(message.contains("credentials expired"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_qr_code_url_for_unknown_location() {
        let mut records = MockRecordStore::new();
        records.expect_get_location().returning(|_| Ok(None));
        let mut files = MockFileStore::new();
        files.expect_presigned_url().times(0);

        let service = LocationService::new(Arc::new(files), Arc::new(records));
        let url = service
            .qr_code_url("missing", Duration::from_secs(60))
            .await
            .unwrap();

        assert!(url.is_none());
    }

    #[tokio::test]
    async fn test_qr_code_url_presigns_stored_path() {
        let mut records = MockRecordStore::new();
        records.expect_get_location().returning(|id| {
            Ok(Some(LocationRecord {
                object_id: id.to_string(),
                name: "Warehouse A".to_string(),
                service: "cold-storage".to_string(),
                qr_code: "Locations/abc.png".to_string(),
                code: "WH-A-01".to_string(),
                inventory: 50,
                created_at: Utc::now(),
            }))
        });
        let mut files = MockFileStore::new();
        files
            .expect_presigned_url()
            .withf(|path, expires_in| path == "Locations/abc.png" && *expires_in == Duration::from_secs(60))
            .returning(|path, _| Ok(format!("https://s3.example/{path}?sig=1")));

        let service = LocationService::new(Arc::new(files), Arc::new(records));
        let (url, expires_at) = service
            .qr_code_url("object-1", Duration::from_secs(60))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(url, "https://s3.example/Locations/abc.png?sig=1");
        assert!(expires_at > Utc::now());
    }
}
