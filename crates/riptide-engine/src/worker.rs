//! Background worker that drives the transport session.
//!
//! The worker owns the session exclusively: commands arrive over a bounded
//! channel and a poll interval drains session events onto the shared bus,
//! so slow API calls never contend with the session itself.

use std::time::Duration;

use tracing::warn;

use crate::command::EngineCommand;
use crate::session::{SessionEvent, TransportSession};
use riptide_events::{Event, EventBus};
use tokio::sync::mpsc;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

pub(crate) fn spawn(
    events: EventBus,
    mut commands: mpsc::Receiver<EngineCommand>,
    session: Box<dyn TransportSession>,
) {
    tokio::spawn(async move {
        let mut worker = Worker { events, session };
        let mut poll = tokio::time::interval(POLL_INTERVAL);
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => worker.handle(command).await,
                    None => break,
                },
                _ = poll.tick() => worker.flush_session_events().await,
            }
        }
        worker.flush_session_events().await;
    });
}

struct Worker {
    events: EventBus,
    session: Box<dyn TransportSession>,
}

impl Worker {
    async fn handle(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::Admit {
                id,
                spec,
                start_paused,
                respond_to,
            } => {
                let result = self.session.admit(id, &spec, start_paused).await;
                let _ = respond_to.send(result);
            }
            EngineCommand::Resume { id, respond_to } => {
                let _ = respond_to.send(self.session.resume(id).await);
            }
            EngineCommand::Pause { id, respond_to } => {
                let _ = respond_to.send(self.session.pause(id).await);
            }
            EngineCommand::Remove {
                id,
                delete_data,
                respond_to,
            } => {
                let _ = respond_to.send(self.session.remove(id, delete_data).await);
            }
            EngineCommand::QueryTotals { respond_to } => {
                let _ = respond_to.send(self.session.transfer_totals().await);
            }
            EngineCommand::QueryDhtStats { respond_to } => {
                let _ = respond_to.send(self.session.dht_stats().await);
            }
            EngineCommand::QueryDhtTable { respond_to } => {
                let _ = respond_to.send(self.session.dht_table().await);
            }
        }
        self.flush_session_events().await;
    }

    async fn flush_session_events(&mut self) {
        match self.session.poll_events().await {
            Ok(session_events) => {
                for event in session_events {
                    let _ = self.events.publish(translate(event));
                }
            }
            Err(error) => {
                warn!(error = %error, "session event polling failed");
                let _ = self.events.publish(Event::EngineFault {
                    torrent_id: None,
                    message: error.to_string(),
                });
            }
        }
    }
}

fn translate(event: SessionEvent) -> Event {
    match event {
        SessionEvent::MetadataResolved {
            id,
            name,
            total_bytes,
            files,
        } => Event::MetadataResolved {
            torrent_id: id,
            name,
            total_bytes,
            files,
        },
        SessionEvent::StateChanged { id, state } => Event::StateChanged {
            torrent_id: id,
            state,
        },
        SessionEvent::Progress {
            id,
            bytes_completed,
            bytes_total,
        } => Event::Progress {
            torrent_id: id,
            bytes_completed,
            bytes_total,
        },
        SessionEvent::Completed { id } => Event::Completed { torrent_id: id },
        SessionEvent::Fault { id, message } => Event::EngineFault {
            torrent_id: id,
            message,
        },
    }
}
