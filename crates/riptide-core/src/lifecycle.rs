//! Lifecycle controller: validated, linearizable torrent transitions.
//!
//! Per-torrent transitions serialize on the entry's operation lock;
//! operations on different ids proceed in parallel. Every mutating
//! operation either fully succeeds (registry reflects the new state) or
//! fully fails (registry unchanged) — an admission that the transport
//! rejects is rolled back before the error is surfaced.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::engine::TransferEngine;
use crate::error::{ControlError, EngineError};
use crate::model::TorrentSpec;
use crate::registry::{Registry, TorrentEntry};
use riptide_events::{Event, EventBus, TorrentId, TorrentState};

/// Policy knobs applied by the controller.
#[derive(Debug, Clone, Copy, Default)]
pub struct LifecyclePolicy {
    /// Report `start` on an already-running torrent as a conflict instead
    /// of an idempotent no-op.
    pub strict_start: bool,
}

/// Request payload for admitting a torrent.
#[derive(Debug, Clone)]
pub struct AddTorrent {
    /// How the torrent is described (magnet, metainfo, bare hash).
    pub spec: TorrentSpec,
    /// Optional knobs applied alongside admission.
    pub options: AddTorrentOptions,
}

/// Optional knobs that accompany an admission request.
#[derive(Debug, Clone, Default)]
pub struct AddTorrentOptions {
    /// Friendly name to display before metadata is fetched.
    pub name_hint: Option<String>,
    /// Override for the configured output directory.
    pub output_dir: Option<PathBuf>,
    /// Admit the torrent paused instead of starting it.
    pub start_paused: bool,
}

/// Batch lifecycle operations applied over a caller-supplied id set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchOp {
    /// Start every torrent in the set.
    Start,
    /// Pause every torrent in the set.
    Pause,
    /// Delete every torrent in the set (data erased).
    Delete,
    /// Forget every torrent in the set (data kept).
    Forget,
}

impl BatchOp {
    /// Route-segment spelling of the operation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Pause => "pause",
            Self::Delete => "delete",
            Self::Forget => "forget",
        }
    }
}

/// One failed id within a batch application.
#[derive(Debug, Clone, Serialize)]
pub struct BatchFailure {
    /// The id the operation failed for.
    pub torrent_id: TorrentId,
    /// Stable error discriminator (see [`ControlError::kind`]).
    pub kind: &'static str,
    /// Human-readable failure description.
    pub message: String,
}

/// Outcome of a batch application: per-id results, never abort-on-first.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchOutcome {
    /// Ids the operation succeeded for, in request order.
    pub applied: Vec<TorrentId>,
    /// Ids the operation failed for, with structured reasons.
    pub failed: Vec<BatchFailure>,
}

/// Applies start/pause/delete/forget/add with correctness under concurrent
/// requests.
pub struct LifecycleController {
    registry: Arc<Registry>,
    engine: Arc<dyn TransferEngine>,
    events: EventBus,
    policy: LifecyclePolicy,
    ack_timeout: Duration,
    default_output_dir: PathBuf,
}

impl LifecycleController {
    /// Wire a controller over its collaborators.
    #[must_use]
    pub fn new(
        registry: Arc<Registry>,
        engine: Arc<dyn TransferEngine>,
        events: EventBus,
        policy: LifecyclePolicy,
        ack_timeout: Duration,
        default_output_dir: PathBuf,
    ) -> Self {
        Self {
            registry,
            engine,
            events,
            policy,
            ack_timeout,
            default_output_dir,
        }
    }

    /// Validate a spec, register it, and admit it into the transport.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSpec` for unparseable input, `Duplicate` when the
    /// info-hash is already tracked under the default policy, and
    /// `Internal` when the transport rejects the admission (the registry
    /// entry is rolled back).
    pub async fn add(&self, request: AddTorrent) -> Result<TorrentId, ControlError> {
        let resolved = request.spec.resolve()?;
        let output_dir = request
            .options
            .output_dir
            .unwrap_or_else(|| self.default_output_dir.clone());
        let entry = self
            .registry
            .add(&resolved, request.options.name_hint, output_dir)?;

        let admitted = self
            .signal(
                "admit",
                entry.id,
                self.engine
                    .admit(entry.id, &resolved, request.options.start_paused),
            )
            .await;
        if let Err(error) = admitted {
            let _ = self.registry.remove(entry.id);
            warn!(torrent_id = %entry.id, error = %error, "admission rolled back");
            return Err(error);
        }

        info!(
            torrent_id = %entry.id,
            info_hash = %entry.info_hash,
            "torrent admitted"
        );
        let _ = self.events.publish(Event::TorrentAdded {
            torrent_id: entry.id,
            info_hash: entry.info_hash.to_string(),
            name: entry.meta().name,
        });
        Ok(entry.id)
    }

    /// Transition a torrent towards `Running`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown ids, `Conflict` for failed torrents
    /// (and, under `strict_start`, already-running ones), and `Internal`
    /// on transport failure.
    pub async fn start(&self, id: TorrentId) -> Result<(), ControlError> {
        let entry = self.lookup(id)?;
        let _guard = entry.lock_ops().await;
        self.ensure_tracked(&entry)?;

        match entry.state() {
            TorrentState::Running => {
                if self.policy.strict_start {
                    Err(ControlError::Conflict {
                        torrent_id: id,
                        reason: "already started",
                    })
                } else {
                    Ok(())
                }
            }
            TorrentState::Failed { .. } => Err(ControlError::Conflict {
                torrent_id: id,
                reason: "torrent is in a failed state",
            }),
            TorrentState::Initializing | TorrentState::Paused | TorrentState::Completed => {
                self.signal("resume", id, self.engine.resume(id)).await?;
                self.transition(&entry, TorrentState::Running);
                Ok(())
            }
        }
    }

    /// Transition a torrent to `Paused`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown ids, `Conflict` for failed torrents,
    /// and `Internal` on transport failure.
    pub async fn pause(&self, id: TorrentId) -> Result<(), ControlError> {
        let entry = self.lookup(id)?;
        let _guard = entry.lock_ops().await;
        self.ensure_tracked(&entry)?;

        match entry.state() {
            TorrentState::Paused => Ok(()),
            TorrentState::Failed { .. } => Err(ControlError::Conflict {
                torrent_id: id,
                reason: "torrent is in a failed state",
            }),
            TorrentState::Initializing | TorrentState::Running | TorrentState::Completed => {
                self.signal("pause", id, self.engine.pause(id)).await?;
                self.transition(&entry, TorrentState::Paused);
                Ok(())
            }
        }
    }

    /// Remove a torrent and erase its on-disk data. Irreversible.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown ids and `Internal` when the
    /// transport fails to acknowledge the removal (the entry stays
    /// tracked).
    pub async fn delete(&self, id: TorrentId) -> Result<(), ControlError> {
        self.remove_entry(id, true).await
    }

    /// Remove a torrent, leaving its on-disk data untouched. Irreversible.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown ids and `Internal` when the
    /// transport fails to acknowledge the removal (the entry stays
    /// tracked).
    pub async fn forget(&self, id: TorrentId) -> Result<(), ControlError> {
        self.remove_entry(id, false).await
    }

    /// Apply a batch operation independently per id.
    pub async fn apply_batch(&self, op: BatchOp, ids: &[TorrentId]) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for id in ids {
            let result = match op {
                BatchOp::Start => self.start(*id).await,
                BatchOp::Pause => self.pause(*id).await,
                BatchOp::Delete => self.delete(*id).await,
                BatchOp::Forget => self.forget(*id).await,
            };
            match result {
                Ok(()) => outcome.applied.push(*id),
                Err(error) => outcome.failed.push(BatchFailure {
                    torrent_id: *id,
                    kind: error.kind(),
                    message: error.to_string(),
                }),
            }
        }
        outcome
    }

    async fn remove_entry(&self, id: TorrentId, delete_data: bool) -> Result<(), ControlError> {
        let entry = self.lookup(id)?;
        let _guard = entry.lock_ops().await;
        self.ensure_tracked(&entry)?;

        self.signal("remove", id, self.engine.remove(id, delete_data))
            .await?;
        let _ = self.registry.remove(id);
        info!(torrent_id = %id, delete_data, "torrent removed");
        let _ = self.events.publish(Event::TorrentRemoved {
            torrent_id: id,
            deleted_data: delete_data,
        });
        Ok(())
    }

    fn lookup(&self, id: TorrentId) -> Result<Arc<TorrentEntry>, ControlError> {
        self.registry
            .get(id)
            .ok_or(ControlError::NotFound { torrent_id: id })
    }

    /// An `Arc` acquired before the operation lock may point at an entry
    /// removed in the meantime.
    fn ensure_tracked(&self, entry: &TorrentEntry) -> Result<(), ControlError> {
        if entry.is_removed() {
            return Err(ControlError::NotFound {
                torrent_id: entry.id,
            });
        }
        Ok(())
    }

    fn transition(&self, entry: &TorrentEntry, state: TorrentState) {
        entry.set_state(state.clone());
        let _ = self.events.publish(Event::StateChanged {
            torrent_id: entry.id,
            state,
        });
    }

    async fn signal(
        &self,
        operation: &'static str,
        id: TorrentId,
        request: impl Future<Output = Result<(), EngineError>> + Send,
    ) -> Result<(), ControlError> {
        match tokio::time::timeout(self.ack_timeout, request).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => Err(ControlError::Internal { operation, source }),
            Err(_elapsed) => {
                warn!(torrent_id = %id, operation, "transport acknowledgment timed out");
                Err(ControlError::Internal {
                    operation,
                    source: EngineError::Timeout { operation },
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{DhtNodeInfo, DhtStats};
    use crate::model::{InfoHash, ResolvedSpec, TransferTotals};
    use anyhow::Result;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Recording engine that acknowledges everything immediately.
    #[derive(Default)]
    struct RecordingEngine {
        removals: Mutex<Vec<(TorrentId, bool)>>,
        fail_admit: AtomicBool,
        fail_remove: AtomicBool,
    }

    #[async_trait]
    impl TransferEngine for RecordingEngine {
        async fn admit(
            &self,
            id: TorrentId,
            _spec: &ResolvedSpec,
            _start_paused: bool,
        ) -> Result<(), EngineError> {
            if self.fail_admit.load(Ordering::Relaxed) {
                return Err(EngineError::Operation {
                    operation: "admit",
                    torrent_id: Some(id),
                    source: "session rejected the torrent".into(),
                });
            }
            Ok(())
        }

        async fn resume(&self, _id: TorrentId) -> Result<(), EngineError> {
            Ok(())
        }

        async fn pause(&self, _id: TorrentId) -> Result<(), EngineError> {
            Ok(())
        }

        async fn remove(&self, id: TorrentId, delete_data: bool) -> Result<(), EngineError> {
            if self.fail_remove.load(Ordering::Relaxed) {
                return Err(EngineError::Unavailable);
            }
            self.removals
                .lock()
                .expect("removals mutex poisoned")
                .push((id, delete_data));
            Ok(())
        }

        async fn transfer_totals(
            &self,
        ) -> Result<HashMap<TorrentId, TransferTotals>, EngineError> {
            Ok(HashMap::new())
        }

        async fn dht_stats(&self) -> Result<DhtStats, EngineError> {
            Ok(DhtStats::default())
        }

        async fn dht_table(&self) -> Result<Vec<DhtNodeInfo>, EngineError> {
            Ok(Vec::new())
        }
    }

    struct Fixture {
        registry: Arc<Registry>,
        engine: Arc<RecordingEngine>,
        controller: LifecycleController,
    }

    fn fixture(policy: LifecyclePolicy) -> Fixture {
        let registry = Arc::new(Registry::new(false));
        let engine = Arc::new(RecordingEngine::default());
        let controller = LifecycleController::new(
            Arc::clone(&registry),
            Arc::clone(&engine) as Arc<dyn TransferEngine>,
            EventBus::with_capacity(64),
            policy,
            Duration::from_millis(200),
            PathBuf::from("/downloads"),
        );
        Fixture {
            registry,
            engine,
            controller,
        }
    }

    fn magnet(seed: u8) -> AddTorrent {
        let hash = InfoHash::from_bytes([seed; 20]);
        AddTorrent {
            spec: TorrentSpec::magnet(format!("magnet:?xt=urn:btih:{hash}&dn=demo-{seed}")),
            options: AddTorrentOptions::default(),
        }
    }

    #[tokio::test]
    async fn add_then_get_is_initializing_with_spec_hash() -> Result<()> {
        let fixture = fixture(LifecyclePolicy::default());
        let id = fixture.controller.add(magnet(9)).await?;

        let entry = fixture.registry.get(id).expect("tracked");
        assert_eq!(entry.state(), TorrentState::Initializing);
        assert_eq!(entry.info_hash, InfoHash::from_bytes([9; 20]));
        Ok(())
    }

    #[tokio::test]
    async fn invalid_specs_are_rejected_without_registration() {
        let fixture = fixture(LifecyclePolicy::default());
        let request = AddTorrent {
            spec: TorrentSpec::magnet("magnet:?dn=no-digest"),
            options: AddTorrentOptions::default(),
        };
        let error = fixture
            .controller
            .add(request)
            .await
            .expect_err("invalid spec");
        assert_eq!(error.kind(), "invalid_spec");
        assert!(fixture.registry.is_empty());
    }

    #[tokio::test]
    async fn failed_admission_rolls_the_registry_back() {
        let fixture = fixture(LifecyclePolicy::default());
        fixture.engine.fail_admit.store(true, Ordering::Relaxed);

        let error = fixture
            .controller
            .add(magnet(3))
            .await
            .expect_err("admission fails");
        assert_eq!(error.kind(), "internal");
        assert!(fixture.registry.is_empty(), "no partial application");
    }

    #[tokio::test]
    async fn pause_then_start_round_trips_to_running() -> Result<()> {
        let fixture = fixture(LifecyclePolicy::default());
        let id = fixture.controller.add(magnet(1)).await?;

        fixture.controller.pause(id).await?;
        assert_eq!(
            fixture.registry.get(id).expect("tracked").state(),
            TorrentState::Paused
        );

        fixture.controller.start(id).await?;
        assert_eq!(
            fixture.registry.get(id).expect("tracked").state(),
            TorrentState::Running
        );
        Ok(())
    }

    #[tokio::test]
    async fn start_is_idempotent_by_default() -> Result<()> {
        let fixture = fixture(LifecyclePolicy::default());
        let id = fixture.controller.add(magnet(1)).await?;
        fixture.controller.start(id).await?;
        fixture.controller.start(id).await?;
        assert_eq!(
            fixture.registry.get(id).expect("tracked").state(),
            TorrentState::Running
        );
        Ok(())
    }

    #[tokio::test]
    async fn strict_policy_reports_already_started() -> Result<()> {
        let fixture = fixture(LifecyclePolicy { strict_start: true });
        let id = fixture.controller.add(magnet(1)).await?;
        fixture.controller.start(id).await?;

        let error = fixture.controller.start(id).await.expect_err("conflict");
        assert_eq!(error.kind(), "conflict");
        assert_eq!(
            fixture.registry.get(id).expect("tracked").state(),
            TorrentState::Running,
            "a reported conflict must not change state"
        );
        Ok(())
    }

    #[tokio::test]
    async fn delete_forwards_erasure_and_shrinks_the_registry() -> Result<()> {
        let fixture = fixture(LifecyclePolicy::default());
        let id = fixture.controller.add(magnet(1)).await?;
        fixture.controller.add(magnet(2)).await?;

        fixture.controller.delete(id).await?;
        assert_eq!(fixture.registry.len(), 1);
        assert!(fixture.registry.get(id).is_none());

        let removals = fixture.engine.removals.lock().expect("lock");
        assert_eq!(removals.as_slice(), &[(id, true)]);
        Ok(())
    }

    #[tokio::test]
    async fn forget_keeps_data_and_delete_after_forget_is_not_found() -> Result<()> {
        let fixture = fixture(LifecyclePolicy::default());
        let id = fixture.controller.add(magnet(1)).await?;

        fixture.controller.forget(id).await?;
        {
            let removals = fixture.engine.removals.lock().expect("lock");
            assert_eq!(removals.as_slice(), &[(id, false)]);
        }

        let error = fixture.controller.delete(id).await.expect_err("gone");
        assert_eq!(error.kind(), "not_found");
        Ok(())
    }

    #[tokio::test]
    async fn failed_removal_keeps_the_entry_tracked() -> Result<()> {
        let fixture = fixture(LifecyclePolicy::default());
        let id = fixture.controller.add(magnet(1)).await?;
        fixture.engine.fail_remove.store(true, Ordering::Relaxed);

        let error = fixture.controller.delete(id).await.expect_err("fails");
        assert_eq!(error.kind(), "internal");
        assert!(fixture.registry.get(id).is_some(), "no partial application");
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_add_is_rejected_with_the_existing_id() -> Result<()> {
        let fixture = fixture(LifecyclePolicy::default());
        let first = fixture.controller.add(magnet(5)).await?;

        let error = fixture
            .controller
            .add(magnet(5))
            .await
            .expect_err("duplicate");
        match error {
            ControlError::Duplicate { existing, .. } => assert_eq!(existing, first),
            other => panic!("unexpected error {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn batch_applies_independently_and_reports_failures() -> Result<()> {
        let fixture = fixture(LifecyclePolicy::default());
        let id = fixture.controller.add(magnet(1)).await?;
        let ghost = TorrentId::new(999);

        let outcome = fixture
            .controller
            .apply_batch(BatchOp::Pause, &[id, ghost])
            .await;
        assert_eq!(outcome.applied, vec![id]);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].torrent_id, ghost);
        assert_eq!(outcome.failed[0].kind, "not_found");
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_start_and_pause_settle_on_one_state() -> Result<()> {
        let fixture = fixture(LifecyclePolicy::default());
        let controller = Arc::new(fixture.controller);
        let id = controller.add(magnet(1)).await?;

        let starter = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.start(id).await })
        };
        let pauser = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.pause(id).await })
        };
        starter.await.expect("join")?;
        pauser.await.expect("join")?;

        let state = fixture.registry.get(id).expect("tracked").state();
        assert!(
            matches!(state, TorrentState::Running | TorrentState::Paused),
            "unexpected state {state:?}"
        );
        Ok(())
    }
}
