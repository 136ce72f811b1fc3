//! Insertion-ordered in-memory torrent table.
//!
//! The table is the single shared mutable structure in the daemon. All
//! mutation goes through [`Registry::add`] and [`Registry::remove`] under a
//! write lock; reads clone `Arc` handles and never observe a
//! half-constructed entry.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use crate::error::RegistryError;
use crate::model::{InfoHash, ResolvedSpec};
use riptide_events::{ResolvedFile, TorrentId, TorrentState};

/// Mutable descriptive fields of a tracked torrent.
///
/// Live transfer statistics are not here: the registry holds identity and
/// lifecycle only, the stats aggregator owns its own snapshot table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentMeta {
    /// Display name, resolved from the spec or the transport's metadata
    /// fetch.
    pub name: Option<String>,
    /// Directory the transport writes this torrent's payload into.
    pub output_dir: PathBuf,
    /// File listing in metainfo order, once metadata is known.
    pub files: Option<Vec<ResolvedFile>>,
    /// Total payload size in bytes, once metadata is known.
    pub total_bytes: Option<u64>,
    /// Current lifecycle state.
    pub state: TorrentState,
}

/// A tracked torrent: immutable identity plus lock-guarded mutable state.
#[derive(Debug)]
pub struct TorrentEntry {
    /// Session-scoped identifier.
    pub id: TorrentId,
    /// Stable content identity.
    pub info_hash: InfoHash,
    /// When the torrent was admitted.
    pub added_at: DateTime<Utc>,
    meta: Mutex<TorrentMeta>,
    op_lock: tokio::sync::Mutex<()>,
    removed: AtomicBool,
}

impl TorrentEntry {
    fn new(id: TorrentId, spec: &ResolvedSpec, name: Option<String>, output_dir: PathBuf) -> Self {
        Self {
            id,
            info_hash: spec.info_hash,
            added_at: Utc::now(),
            meta: Mutex::new(TorrentMeta {
                name: name.or_else(|| spec.name.clone()),
                output_dir,
                files: spec.files.clone(),
                total_bytes: spec.total_bytes,
                state: TorrentState::Initializing,
            }),
            op_lock: tokio::sync::Mutex::new(()),
            removed: AtomicBool::new(false),
        }
    }

    /// Snapshot of the mutable fields.
    #[must_use]
    pub fn meta(&self) -> TorrentMeta {
        self.lock_meta().clone()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> TorrentState {
        self.lock_meta().state.clone()
    }

    /// Replace the lifecycle state.
    pub fn set_state(&self, state: TorrentState) {
        self.lock_meta().state = state;
    }

    /// Apply an update to the mutable fields under the meta lock.
    pub fn update_meta(&self, update: impl FnOnce(&mut TorrentMeta)) {
        update(&mut self.lock_meta());
    }

    /// Whether the entry has been removed from its registry. Held `Arc`s
    /// may outlive the table entry; operations re-check this after
    /// acquiring the operation lock.
    #[must_use]
    pub fn is_removed(&self) -> bool {
        self.removed.load(Ordering::Acquire)
    }

    /// Serialize lifecycle transitions on this torrent.
    pub(crate) async fn lock_ops(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.op_lock.lock().await
    }

    fn lock_meta(&self) -> MutexGuard<'_, TorrentMeta> {
        self.meta.lock().unwrap_or_else(|err| {
            panic!("torrent meta mutex poisoned: {err}");
        })
    }
}

struct RegistryInner {
    entries: BTreeMap<TorrentId, Arc<TorrentEntry>>,
    by_hash: HashMap<InfoHash, TorrentId>,
    next_id: u64,
}

/// Durable-for-the-session table of known torrents.
pub struct Registry {
    inner: RwLock<RegistryInner>,
    allow_duplicates: bool,
}

impl Registry {
    /// Construct an empty registry with the given duplicate policy.
    #[must_use]
    pub fn new(allow_duplicates: bool) -> Self {
        Self {
            inner: RwLock::new(RegistryInner {
                entries: BTreeMap::new(),
                by_hash: HashMap::new(),
                next_id: 1,
            }),
            allow_duplicates,
        }
    }

    /// Admit a resolved spec, assigning the next session id.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateTorrent`] when the info-hash is
    /// already tracked and the policy forbids duplicates.
    pub fn add(
        &self,
        spec: &ResolvedSpec,
        name_hint: Option<String>,
        output_dir: PathBuf,
    ) -> Result<Arc<TorrentEntry>, RegistryError> {
        let mut inner = self.write_guard();
        if !self.allow_duplicates
            && let Some(existing) = inner.by_hash.get(&spec.info_hash)
        {
            return Err(RegistryError::DuplicateTorrent {
                info_hash: spec.info_hash,
                existing: *existing,
            });
        }

        let id = TorrentId::new(inner.next_id);
        inner.next_id += 1;
        let entry = Arc::new(TorrentEntry::new(id, spec, name_hint, output_dir));
        inner.entries.insert(id, Arc::clone(&entry));
        inner.by_hash.insert(spec.info_hash, id);
        Ok(entry)
    }

    /// Look up a torrent by id.
    #[must_use]
    pub fn get(&self, id: TorrentId) -> Option<Arc<TorrentEntry>> {
        self.read_guard().entries.get(&id).cloned()
    }

    /// All tracked torrents in insertion order.
    #[must_use]
    pub fn list(&self) -> Vec<Arc<TorrentEntry>> {
        self.read_guard().entries.values().cloned().collect()
    }

    /// Remove a torrent from the table.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for an unknown id.
    pub fn remove(&self, id: TorrentId) -> Result<Arc<TorrentEntry>, RegistryError> {
        let mut inner = self.write_guard();
        let entry = inner
            .entries
            .remove(&id)
            .ok_or(RegistryError::NotFound { torrent_id: id })?;
        if inner.by_hash.get(&entry.info_hash) == Some(&id) {
            inner.by_hash.remove(&entry.info_hash);
        }
        entry.removed.store(true, Ordering::Release);
        Ok(entry)
    }

    /// Number of tracked torrents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read_guard().entries.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_guard(&self) -> RwLockReadGuard<'_, RegistryInner> {
        self.inner.read().unwrap_or_else(|err| {
            panic!("registry lock poisoned: {err}");
        })
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, RegistryInner> {
        self.inner.write().unwrap_or_else(|err| {
            panic!("registry lock poisoned: {err}");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TorrentSpec;
    use anyhow::Result;

    fn spec(seed: u8) -> ResolvedSpec {
        ResolvedSpec {
            info_hash: InfoHash::from_bytes([seed; 20]),
            name: Some(format!("torrent-{seed}")),
            files: None,
            total_bytes: Some(1_000),
        }
    }

    fn registry() -> Registry {
        Registry::new(false)
    }

    #[test]
    fn add_assigns_sequential_ids_and_preserves_order() -> Result<()> {
        let registry = registry();
        for seed in 1..=3 {
            registry.add(&spec(seed), None, PathBuf::from("/downloads"))?;
        }
        let listed = registry.list();
        assert_eq!(listed.len(), 3);
        let ids: Vec<u64> = listed.iter().map(|entry| entry.id.value()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        Ok(())
    }

    #[test]
    fn added_torrents_start_initializing_with_spec_identity() -> Result<()> {
        let registry = registry();
        let resolved = TorrentSpec::magnet(
            "magnet:?xt=urn:btih:0123456789abcdef0123456789abcdef01234567&dn=demo",
        )
        .resolve()?;
        let entry = registry.add(&resolved, None, PathBuf::from("/downloads"))?;

        let fetched = registry.get(entry.id).expect("entry tracked");
        assert_eq!(fetched.info_hash, resolved.info_hash);
        assert_eq!(fetched.state(), TorrentState::Initializing);
        assert_eq!(fetched.meta().name.as_deref(), Some("demo"));
        Ok(())
    }

    #[test]
    fn duplicate_hashes_are_rejected_by_default() -> Result<()> {
        let registry = registry();
        let first = registry.add(&spec(7), None, PathBuf::from("/downloads"))?;
        let error = registry
            .add(&spec(7), None, PathBuf::from("/downloads"))
            .expect_err("duplicate must be rejected");
        match error {
            RegistryError::DuplicateTorrent { existing, .. } => assert_eq!(existing, first.id),
            other => panic!("unexpected error {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn duplicate_hashes_are_admitted_under_permissive_policy() -> Result<()> {
        let registry = Registry::new(true);
        registry.add(&spec(7), None, PathBuf::from("/downloads"))?;
        registry.add(&spec(7), None, PathBuf::from("/downloads"))?;
        assert_eq!(registry.len(), 2);
        Ok(())
    }

    #[test]
    fn remove_shrinks_the_table_by_exactly_one() -> Result<()> {
        let registry = registry();
        let first = registry.add(&spec(1), None, PathBuf::from("/downloads"))?;
        registry.add(&spec(2), None, PathBuf::from("/downloads"))?;

        let removed = registry.remove(first.id)?;
        assert!(removed.is_removed());
        assert_eq!(registry.len(), 1);
        assert!(registry.get(first.id).is_none());

        let error = registry.remove(first.id).expect_err("already removed");
        assert!(matches!(error, RegistryError::NotFound { torrent_id } if torrent_id == first.id));
        Ok(())
    }

    #[test]
    fn removing_one_duplicate_keeps_the_other_tracked() -> Result<()> {
        let registry = Registry::new(true);
        let first = registry.add(&spec(7), None, PathBuf::from("/downloads"))?;
        let second = registry.add(&spec(7), None, PathBuf::from("/downloads"))?;

        registry.remove(second.id)?;
        assert!(registry.get(first.id).is_some());
        Ok(())
    }

    #[test]
    fn ids_are_not_reused_within_a_session() -> Result<()> {
        let registry = registry();
        let first = registry.add(&spec(1), None, PathBuf::from("/downloads"))?;
        registry.remove(first.id)?;
        let second = registry.add(&spec(2), None, PathBuf::from("/downloads"))?;
        assert!(second.id > first.id);
        Ok(())
    }

    #[test]
    fn concurrent_adds_never_collide() {
        let registry = Arc::new(registry());
        let handles: Vec<_> = (0..8_u8)
            .map(|seed| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    registry
                        .add(&spec(seed), None, PathBuf::from("/downloads"))
                        .expect("distinct hashes admit")
                        .id
                })
            })
            .collect();

        let mut ids: Vec<TorrentId> = handles
            .into_iter()
            .map(|handle| handle.join().expect("thread panicked"))
            .collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 8);
        assert_eq!(registry.len(), 8);
    }
}
