#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Transport adapter: implements the core's `TransferEngine` seam over a
//! command channel to a background worker that owns the session.

mod command;
/// Session abstraction and the in-process stub implementation.
pub mod session;
mod worker;

pub use session::{SessionEvent, StubSession, TransportSession};

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use command::EngineCommand;
use riptide_core::engine::{DhtNodeInfo, DhtStats, TransferEngine};
use riptide_core::error::EngineError;
use riptide_core::model::{ResolvedSpec, TransferTotals};
use riptide_events::{EventBus, TorrentId};

const COMMAND_BUFFER: usize = 128;

/// Engine facade: enqueues commands for the worker and awaits the
/// session's acknowledgment.
#[derive(Clone)]
pub struct TransportEngine {
    commands: mpsc::Sender<EngineCommand>,
}

impl TransportEngine {
    /// Construct an engine over the in-process stub session, publishing
    /// its events on the shared bus.
    #[must_use]
    pub fn new(events: EventBus) -> Self {
        Self::with_session(events, Box::new(StubSession::default()))
    }

    /// Construct an engine over a custom session backend.
    #[must_use]
    pub fn with_session(events: EventBus, session: Box<dyn TransportSession>) -> Self {
        let (commands, receiver) = mpsc::channel(COMMAND_BUFFER);
        worker::spawn(events, receiver, session);
        Self { commands }
    }

    async fn acknowledge(
        &self,
        operation: &'static str,
        torrent_id: Option<TorrentId>,
        command: EngineCommand,
        receiver: oneshot::Receiver<anyhow::Result<()>>,
    ) -> Result<(), EngineError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| EngineError::Unavailable)?;
        match receiver.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => Err(EngineError::Operation {
                operation,
                torrent_id,
                source: source.into(),
            }),
            Err(_closed) => Err(EngineError::Unavailable),
        }
    }

    async fn query<T>(
        &self,
        operation: &'static str,
        command: EngineCommand,
        receiver: oneshot::Receiver<anyhow::Result<T>>,
    ) -> Result<T, EngineError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| EngineError::Unavailable)?;
        match receiver.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(source)) => Err(EngineError::Operation {
                operation,
                torrent_id: None,
                source: source.into(),
            }),
            Err(_closed) => Err(EngineError::Unavailable),
        }
    }
}

#[async_trait]
impl TransferEngine for TransportEngine {
    async fn admit(
        &self,
        id: TorrentId,
        spec: &ResolvedSpec,
        start_paused: bool,
    ) -> Result<(), EngineError> {
        let (respond_to, receiver) = oneshot::channel();
        self.acknowledge(
            "admit",
            Some(id),
            EngineCommand::Admit {
                id,
                spec: Box::new(spec.clone()),
                start_paused,
                respond_to,
            },
            receiver,
        )
        .await
    }

    async fn resume(&self, id: TorrentId) -> Result<(), EngineError> {
        let (respond_to, receiver) = oneshot::channel();
        self.acknowledge(
            "resume",
            Some(id),
            EngineCommand::Resume { id, respond_to },
            receiver,
        )
        .await
    }

    async fn pause(&self, id: TorrentId) -> Result<(), EngineError> {
        let (respond_to, receiver) = oneshot::channel();
        self.acknowledge(
            "pause",
            Some(id),
            EngineCommand::Pause { id, respond_to },
            receiver,
        )
        .await
    }

    async fn remove(&self, id: TorrentId, delete_data: bool) -> Result<(), EngineError> {
        let (respond_to, receiver) = oneshot::channel();
        self.acknowledge(
            "remove",
            Some(id),
            EngineCommand::Remove {
                id,
                delete_data,
                respond_to,
            },
            receiver,
        )
        .await
    }

    async fn transfer_totals(&self) -> Result<HashMap<TorrentId, TransferTotals>, EngineError> {
        let (respond_to, receiver) = oneshot::channel();
        self.query(
            "transfer_totals",
            EngineCommand::QueryTotals { respond_to },
            receiver,
        )
        .await
    }

    async fn dht_stats(&self) -> Result<DhtStats, EngineError> {
        let (respond_to, receiver) = oneshot::channel();
        self.query(
            "dht_stats",
            EngineCommand::QueryDhtStats { respond_to },
            receiver,
        )
        .await
    }

    async fn dht_table(&self) -> Result<Vec<DhtNodeInfo>, EngineError> {
        let (respond_to, receiver) = oneshot::channel();
        self.query(
            "dht_table",
            EngineCommand::QueryDhtTable { respond_to },
            receiver,
        )
        .await
    }
}
