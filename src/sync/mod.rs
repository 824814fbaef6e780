//! Enrichment pipeline: resolve a stored title against an external catalog,
//! fetch its detail payload (plus any auxiliary sub-resources), map it into
//! the record store's typed block and mark the source synced.
//!
//! The two concrete clients live in [`rawg`] and [`igdb`]; the batch drivers
//! here are generic over [`CatalogClient`] so they can be exercised without
//! network access.

pub mod igdb;
pub mod rawg;

use crate::store::{Enrichment, Source, Store};
use crate::tasks::TaskLog;
use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

/// One candidate from a free-text catalog search, as shown in the UI.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub remote_id: i64,
    pub name: String,
    pub released: Option<String>,
}

/// A metadata catalog the library can be enriched from.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    fn source(&self) -> Source;

    /// Free-text candidate search (no tie-break applied).
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>>;

    /// Resolve a title to the best remote id, or None when the catalog has
    /// no match at all.
    async fn resolve_title(&self, title: &str) -> Result<Option<i64>>;

    /// Fetch detail + auxiliary sub-resources for a remote id and flatten
    /// them into the store's field block.
    async fn enrich(&self, remote_id: i64, log: &TaskLog) -> Result<Enrichment>;

    /// Fixed pause between items in a batch run (rate-limit compliance).
    fn request_delay(&self) -> Duration {
        Duration::from_millis(1000)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub synced: u32,
    pub failed: u32,
    pub total: u32,
}

/// Resolve one title and enrich its record. Logs and returns false at the
/// first unsuccessful step; never propagates per-item errors.
pub async fn sync_one(
    client: &dyn CatalogClient,
    store: &Store,
    id: i64,
    title: &str,
    log: &TaskLog,
) -> bool {
    let source = client.source().display_name();
    log.push(format!("--- syncing '{title}' with {source} ---"));
    let remote_id = match client.resolve_title(title).await {
        Ok(Some(remote_id)) => {
            log.push(format!("[found] {source} id {remote_id}"));
            remote_id
        }
        Ok(None) => {
            log.push(format!("[skip] no {source} match for '{title}'"));
            return false;
        }
        Err(err) => {
            log.push(format!("[error] {source} search failed for '{title}': {err:#}"));
            return false;
        }
    };
    sync_from_remote(client, store, id, remote_id, log).await
}

/// Enrich a record from a caller-chosen remote id (UI search attach and
/// per-record re-sync flows skip title resolution).
pub async fn sync_from_remote(
    client: &dyn CatalogClient,
    store: &Store,
    id: i64,
    remote_id: i64,
    log: &TaskLog,
) -> bool {
    let source = client.source().display_name();
    let enrichment = match client.enrich(remote_id, log).await {
        Ok(enrichment) => enrichment,
        Err(err) => {
            log.push(format!("[error] {source} fetch failed for id {remote_id}: {err:#}"));
            return false;
        }
    };
    match store.update_enrichment(id, &enrichment) {
        Ok(true) => {
            log.push("[db] enrichment saved".to_string());
            true
        }
        Ok(false) => {
            log.push(format!("[error] no library record with id {id}"));
            false
        }
        Err(err) => {
            log.push(format!("[error] db write failed: {err:#}"));
            false
        }
    }
}

/// Batch sync: unsynced records only, or every record when `force_resync`.
/// Continues past individual failures, pausing `request_delay()` between
/// items.
pub async fn sync_library(
    client: &dyn CatalogClient,
    store: &Store,
    force_resync: bool,
    log: &TaskLog,
) -> Result<SyncSummary> {
    let source = client.source().display_name();
    let stubs = if force_resync {
        let all = store.all_stubs()?;
        log.push(format!("force re-syncing all {} games with {source}", all.len()));
        all
    } else {
        let pending = store.unsynced(client.source())?;
        log.push(format!("{} games to sync with {source}", pending.len()));
        pending
    };

    let mut summary = SyncSummary {
        total: stubs.len() as u32,
        ..Default::default()
    };
    if stubs.is_empty() {
        log.push("nothing to sync".to_string());
        return Ok(summary);
    }

    for stub in &stubs {
        if sync_one(client, store, stub.id, &stub.title, log).await {
            summary.synced += 1;
        } else {
            summary.failed += 1;
        }
        tokio::time::sleep(client.request_delay()).await;
    }

    log.push(format!(
        "sync complete: {} synced, {} failed",
        summary.synced, summary.failed
    ));
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{RawgFields, Store};
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct StubCatalog {
        /// Titles the fake catalog has no entry for.
        missing: Vec<String>,
        resolve_calls: AtomicU32,
    }

    impl StubCatalog {
        fn new(missing: &[&str]) -> Self {
            Self {
                missing: missing.iter().map(|s| s.to_string()).collect(),
                resolve_calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl CatalogClient for StubCatalog {
        fn source(&self) -> Source {
            Source::Rawg
        }

        async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
            Ok(vec![SearchHit {
                remote_id: 1,
                name: query.to_string(),
                released: None,
            }])
        }

        async fn resolve_title(&self, title: &str) -> Result<Option<i64>> {
            self.resolve_calls.fetch_add(1, Ordering::SeqCst);
            if self.missing.iter().any(|m| m == title) {
                return Ok(None);
            }
            Ok(Some(title.len() as i64))
        }

        async fn enrich(&self, remote_id: i64, _log: &TaskLog) -> Result<Enrichment> {
            if remote_id < 0 {
                return Err(anyhow!("detail fetch failed"));
            }
            Ok(Enrichment::Rawg(RawgFields {
                id: Some(remote_id),
                name: Some("stub".into()),
                ..Default::default()
            }))
        }

        fn request_delay(&self) -> Duration {
            Duration::ZERO
        }
    }

    fn temp_store() -> (Store, std::path::PathBuf) {
        let path = std::env::temp_dir().join(format!(
            "game-shelf-sync-test-{}.db",
            uuid::Uuid::new_v4()
        ));
        (Store::open(&path).unwrap(), path)
    }

    #[tokio::test]
    async fn batch_continues_past_missing_titles() {
        let (store, path) = temp_store();
        store.add_game("Alpha", None).unwrap();
        store.add_game("Bravo", None).unwrap();
        store.add_game("Charlie", None).unwrap();

        let client = StubCatalog::new(&["Bravo"]);
        let log = TaskLog::default();
        let summary = sync_library(&client, &store, false, &log).await.unwrap();

        assert_eq!(
            summary,
            SyncSummary {
                synced: 2,
                failed: 1,
                total: 3
            }
        );
        // Both successes are fully enriched; the miss is still pending.
        let pending = store.unsynced(Source::Rawg).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].title, "Bravo");
        for record in store.get_all().unwrap() {
            if record.title != "Bravo" {
                assert!(record.rawg.synced);
                assert!(record.rawg.fields.id.is_some());
            }
        }
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn force_resync_revisits_synced_records() {
        let (store, path) = temp_store();
        store.add_game("Alpha", None).unwrap();
        store.add_game("Bravo", None).unwrap();

        let client = StubCatalog::new(&[]);
        let log = TaskLog::default();
        sync_library(&client, &store, false, &log).await.unwrap();
        assert_eq!(client.resolve_calls.load(Ordering::SeqCst), 2);

        // Nothing pending, so a normal run is a no-op.
        let summary = sync_library(&client, &store, false, &log).await.unwrap();
        assert_eq!(summary.total, 0);
        assert_eq!(client.resolve_calls.load(Ordering::SeqCst), 2);

        // Forced run walks every record again.
        let summary = sync_library(&client, &store, true, &log).await.unwrap();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.synced, 2);
        assert_eq!(client.resolve_calls.load(Ordering::SeqCst), 4);
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn sync_one_reports_failure_for_unknown_record() {
        let (store, path) = temp_store();
        let client = StubCatalog::new(&[]);
        let log = TaskLog::default();
        // Valid title resolution, but no such row in the store.
        assert!(!sync_one(&client, &store, 424242, "Alpha", &log).await);
        let _ = std::fs::remove_file(path);
    }
}
