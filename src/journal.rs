use std::io;
use std::path::Path;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot};

use crate::model::Event;
use crate::observability::{JOURNAL_FLUSH_BATCH_SIZE, JOURNAL_FLUSH_DURATION_SECONDS};
use crate::wal::Wal;

const CHANNEL_CAPACITY: usize = 4096;

enum JournalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type Pending = (Event, oneshot::Sender<io::Result<()>>);

/// Handle to the background task that owns the WAL.
///
/// Appends from concurrent callers are group-committed: the writer drains
/// every append already queued and fsyncs once for the whole batch.
#[derive(Clone)]
pub struct Journal {
    tx: mpsc::Sender<JournalCommand>,
}

impl Journal {
    /// Replay the log at `path` and start the writer. Must run inside a tokio runtime.
    pub fn open(path: &Path) -> io::Result<(Self, Vec<Event>)> {
        let events = Wal::replay(path)?;
        let wal = Wal::open(path)?;
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        tokio::spawn(writer_loop(wal, rx));
        Ok((Self { tx }, events))
    }

    /// Durably append one event. Returns once it is fsynced.
    pub async fn append(&self, event: &Event) -> Result<(), String> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(JournalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| "journal writer shut down".to_string())?;
        rx.await
            .map_err(|_| "journal writer dropped response".to_string())?
            .map_err(|e| e.to_string())
    }

    /// Replace the log with `events`, a snapshot of the current state.
    pub async fn compact(&self, events: Vec<Event>) -> Result<(), String> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(JournalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| "journal writer shut down".to_string())?;
        rx.await
            .map_err(|_| "journal writer dropped response".to_string())?
            .map_err(|e| e.to_string())
    }

    pub async fn appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .tx
            .send(JournalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

async fn writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<JournalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (event, response) = match cmd {
            JournalCommand::Append { event, response } => (event, response),
            other => {
                handle_other(&mut wal, other);
                continue;
            }
        };

        let mut batch = vec![(event, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(JournalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }

        commit_batch(&mut wal, &mut batch);
        if let Some(other) = deferred {
            handle_other(&mut wal, other);
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<Pending>) {
    metrics::histogram!(JOURNAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = Instant::now();

    let failure = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event))
        .and_then(|()| wal.flush_sync())
        .err();
    metrics::histogram!(JOURNAL_FLUSH_DURATION_SECONDS).record(started.elapsed().as_secs_f64());

    if let Some(e) = &failure {
        tracing::error!("journal flush failed for {} events: {e}", batch.len());
        // Callers are told the batch failed; its bytes must not land later.
        if let Err(e) = wal.discard_unflushed() {
            tracing::error!("journal could not drop the failed batch: {e}");
        }
    }
    for (_, tx) in batch.drain(..) {
        let result = match &failure {
            None => Ok(()),
            Some(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(result);
    }
}

fn handle_other(wal: &mut Wal, cmd: JournalCommand) {
    match cmd {
        JournalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        JournalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        JournalCommand::Append { event, response } => {
            commit_batch(wal, &mut vec![(event, response)]);
        }
    }
}
