use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc, RwLock,
};

use chrono::Utc;

use crate::model::{Repository, Toggle};

/// Storage for the current [`Repository`], shared between the synchronizer (writer) and
/// evaluating threads (readers).
pub trait DataRepository: Send + Sync {
    /// Replace the stored repository.
    fn refresh(&self, repository: Repository);

    /// Toggle definition by key. `None` if not initialized or unknown.
    fn get_toggle(&self, key: &str) -> Option<Toggle> {
        self.snapshot()?.toggles.get(key).cloned()
    }

    /// The current repository. Holding on to the returned snapshot is safe: refreshes replace the
    /// stored `Arc` instead of mutating it.
    fn snapshot(&self) -> Option<Arc<Repository>>;

    /// `true` once the first repository has been stored.
    fn initialized(&self) -> bool;

    /// Time of the last refresh, in milliseconds since the Unix epoch. 0 if never refreshed.
    fn updated_timestamp(&self) -> u64;

    /// Drop the stored repository.
    fn close(&self);
}

/// In-memory [`DataRepository`] that allows concurrent access for readers and writers.
#[derive(Default)]
pub struct MemoryDataRepository {
    repository: RwLock<Option<Arc<Repository>>>,
    initialized: AtomicBool,
    updated_timestamp: AtomicU64,
}

impl MemoryDataRepository {
    #[allow(missing_docs)]
    pub fn new() -> MemoryDataRepository {
        MemoryDataRepository::default()
    }
}

impl DataRepository for MemoryDataRepository {
    fn refresh(&self, repository: Repository) {
        // Constructing new value before requesting the lock to minimize lock span.
        let new_value = Some(Arc::new(repository));

        // Only fails if a writer panicked while holding the lock.
        let Ok(mut slot) = self.repository.write() else {
            log::error!(target: "featureprobe", "repository lock is poisoned, refresh skipped");
            return;
        };
        *slot = new_value;
        drop(slot);

        self.initialized.store(true, Ordering::Release);
        self.updated_timestamp
            .store(Utc::now().timestamp_millis() as u64, Ordering::Release);
    }

    fn snapshot(&self) -> Option<Arc<Repository>> {
        let repository = self.repository.read().ok()?;
        repository.clone()
    }

    fn initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    fn updated_timestamp(&self) -> u64 {
        self.updated_timestamp.load(Ordering::Acquire)
    }

    fn close(&self) {
        if let Ok(mut slot) = self.repository.write() {
            *slot = None;
        }
        self.initialized.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, sync::Arc};

    use super::{DataRepository, MemoryDataRepository};
    use crate::model::{Repository, Serve, Toggle};

    fn toggle(key: &str) -> Toggle {
        Toggle {
            key: key.to_owned(),
            enabled: true,
            version: 1,
            disabled_serve: Serve::default(),
            default_serve: Serve::default(),
            rules: vec![],
            variations: vec![],
            prerequisites: vec![],
            for_client: false,
            track_access_events: false,
            last_modified: None,
        }
    }

    #[test]
    fn uninitialized() {
        let repo = MemoryDataRepository::new();
        assert!(!repo.initialized());
        assert!(repo.snapshot().is_none());
        assert!(repo.get_toggle("any").is_none());
        assert_eq!(repo.updated_timestamp(), 0);
    }

    #[test]
    fn can_refresh_from_another_thread() {
        let repo = Arc::new(MemoryDataRepository::new());

        {
            let repo = repo.clone();
            let _ = std::thread::spawn(move || {
                let toggles = HashMap::from([("t".to_owned(), toggle("t"))]);
                repo.refresh(Repository::new(toggles, HashMap::new()));
            })
            .join();
        }

        assert!(repo.initialized());
        assert!(repo.updated_timestamp() > 0);
        assert_eq!(repo.get_toggle("t").map(|t| t.key), Some("t".to_owned()));
        assert!(repo.get_toggle("other").is_none());
    }

    #[test]
    fn snapshot_survives_refresh() {
        let repo = MemoryDataRepository::new();
        repo.refresh(Repository::new(
            HashMap::from([("old".to_owned(), toggle("old"))]),
            HashMap::new(),
        ));
        let snapshot = repo.snapshot().unwrap();

        repo.refresh(Repository::default());

        assert!(snapshot.toggles.contains_key("old"));
        assert!(repo.get_toggle("old").is_none());
    }

    #[test]
    fn close_drops_repository() {
        let repo = MemoryDataRepository::new();
        repo.refresh(Repository::default());
        repo.close();
        assert!(!repo.initialized());
        assert!(repo.snapshot().is_none());
    }
}
