//! Schema-less backup round trip between two stores.
//!
//! Records are copied as opaque maps: no type inference, no DDL, no
//! transforms. The destination is cleared first, so running the round trip
//! twice leaves the same contents as running it once.

use serde::Serialize;
use tracing::info;

use crate::core::{BackupDestination, BackupSource, Notifier, NotifyLevel, Progress};
use crate::error::Result;

/// Records copied per entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackupReport {
    pub entities: Vec<(String, usize)>,
}

impl BackupReport {
    pub fn total_records(&self) -> usize {
        self.entities.iter().map(|(_, n)| n).sum()
    }
}

/// Copy every entity of `source` into `dest`, then flush.
///
/// Any read, write or flush failure aborts immediately.
pub async fn round_trip<S: BackupSource + ?Sized>(
    source: &S,
    dest: &dyn BackupDestination,
    notifier: &dyn Notifier,
    progress: &dyn Progress,
) -> Result<BackupReport> {
    let entities = match source.list_entities().await {
        Ok(entities) => entities,
        Err(e) => {
            notifier.notify(NotifyLevel::Error, &format!("Error getting record list: {}", e));
            return Err(e);
        }
    };
    notifier.notify(
        NotifyLevel::Info,
        &format!("Record list: {}", entities.join(", ")),
    );

    if let Err(e) = dest.clear().await {
        notifier.notify(NotifyLevel::Error, &format!("Error clearing: {}", e));
        return Err(e);
    }

    let mut report = BackupReport::default();
    for entity in &entities {
        let records = match source.get_records(entity).await {
            Ok(records) => records,
            Err(e) => {
                notifier.notify(
                    NotifyLevel::Error,
                    &format!("Error getting records of {}: {}", entity, e),
                );
                return Err(e);
            }
        };

        let bar = progress.start_bar(entity, records.len() as u64);
        let count = records.len();
        for record in records {
            bar.increment();
            if let Err(e) = dest.write_record(entity, record).await {
                bar.finish();
                notifier.notify(
                    NotifyLevel::Error,
                    &format!("Error backing up record of {}: {}", entity, e),
                );
                return Err(e);
            }
        }
        bar.finish();

        info!("Backed up {} records of {}", count, entity);
        report.entities.push((entity.clone(), count));
    }

    if let Err(e) = dest.flush().await {
        notifier.notify(NotifyLevel::Error, &format!("Error syncing: {}", e));
        return Err(e);
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Record, Source};
    use crate::drivers::JsonFileStore;
    use crate::error::MigrateError;
    use crate::notify::{NoProgress, RecordingNotifier};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    async fn store(dir: &TempDir, name: &str, data: Value) -> JsonFileStore {
        let path = dir.path().join(name);
        std::fs::write(&path, data.to_string()).unwrap();
        JsonFileStore::connect(&path, vec![]).await.unwrap()
    }

    fn read(path: &std::path::Path) -> Value {
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_round_trip_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let data = json!({
            "bots": [{"botID": "1", "tags": "a,b"}, {"botID": "2"}],
            "users": [{"userID": "9"}]
        });
        let source = store(&dir, "live.json", data.clone()).await;
        let dest = store(&dir, "dump.json", json!({"stale": []})).await;
        let notifier = RecordingNotifier::default();

        let report = round_trip(&source, &dest, &notifier, &NoProgress).await.unwrap();
        assert_eq!(report.total_records(), 3);
        let once = read(dest.path());
        assert_eq!(once, data);

        round_trip(&source, &dest, &notifier, &NoProgress).await.unwrap();
        assert_eq!(read(dest.path()), once);
    }

    struct BrokenSource;

    #[async_trait]
    impl Source for BrokenSource {
        async fn list_entities(&self) -> crate::error::Result<Vec<String>> {
            Ok(vec!["bots".into()])
        }
        async fn get_records(&self, _: &str) -> crate::error::Result<Vec<Record>> {
            Err(MigrateError::Source("connection reset".into()))
        }
        async fn get_count(&self, _: &str) -> crate::error::Result<usize> {
            Ok(0)
        }
        fn source_type(&self) -> &str {
            "broken"
        }
    }

    #[tokio::test]
    async fn test_read_failure_aborts_before_flush() {
        let dir = TempDir::new().unwrap();
        let dest = store(&dir, "dump.json", json!({"keep": [{"a": 1}]})).await;
        let notifier = RecordingNotifier::default();

        let err = round_trip(&BrokenSource, &dest, &notifier, &NoProgress)
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), 5);
        assert!(notifier.contains(NotifyLevel::Error, "connection reset"));
        // Cleared in memory but never flushed.
        assert_eq!(read(dest.path()), json!({"keep": [{"a": 1}]}));
    }
}
