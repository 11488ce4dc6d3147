//! Scheduling of pack tasks.

use std::sync::{
    mpsc::{self, Receiver, Sender},
    Arc,
};

use tokio_util::{sync::CancellationToken, task::LocalPoolHandle};

use crate::{
    error::WorkerError,
    io::{
        pipeline::process_tile,
        source_client::{StaticTileSource, TileSource},
        PackMessage, PackRequest, PackResponse, ScheduleError, TileRequestID,
    },
    pack::PackOptions,
    style::Style,
};

/// Everything a worker needs to pack one tile.
#[derive(Clone, Debug)]
pub struct PackTask {
    pub request_id: TileRequestID,
    pub request: PackRequest,
    pub style: Arc<Style>,
    pub options: Arc<PackOptions>,
    pub token: CancellationToken,
}

impl PackTask {
    fn message(&self, result: Result<PackResponse, WorkerError>) -> PackMessage {
        PackMessage {
            request_id: self.request_id,
            coords: self.request.tile_info.coords(),
            result,
        }
    }
}

/// Runs pack tasks away from the render thread. Results are collected with the non-blocking
/// [`PackScheduler::receive`].
pub trait PackScheduler: 'static {
    fn schedule(&self, task: PackTask) -> Result<(), ScheduleError>;

    /// Returns a finished task if there is one, never waits.
    fn receive(&mut self) -> Option<PackMessage>;

    /// Stops accepting tasks. Tasks which are running are finished but never received.
    fn shutdown(&mut self);
}

/// Fetches and packs tiles on a pool of worker threads.
pub struct TokioPackScheduler<S: TileSource> {
    channel: (Sender<PackMessage>, Receiver<PackMessage>),
    pool: Option<LocalPoolHandle>,
    source: Arc<S>,
}

impl<S: TileSource> TokioPackScheduler<S> {
    pub fn new(source: S, workers: usize) -> Self {
        Self {
            channel: mpsc::channel(),
            pool: Some(LocalPoolHandle::new(workers.max(1))),
            source: Arc::new(source),
        }
    }
}

impl<S: TileSource> PackScheduler for TokioPackScheduler<S> {
    fn schedule(&self, task: PackTask) -> Result<(), ScheduleError> {
        let pool = self.pool.as_ref().ok_or(ScheduleError::ShutDown)?;
        let sender = self.channel.0.clone();
        let source = self.source.clone();

        pool.spawn_pinned(move || async move {
            let request_id = task.request_id;
            let Some(message) = run_task(task, source).await else {
                log::debug!("request {request_id} cancelled while packing");
                return;
            };
            if sender.send(message).is_err() {
                log::debug!("request {request_id} finished after the scheduler was dropped");
            }
        });
        Ok(())
    }

    fn receive(&mut self) -> Option<PackMessage> {
        self.channel.1.try_recv().ok()
    }

    fn shutdown(&mut self) {
        self.pool = None;
    }
}

/// `None` when the task was cancelled before it finished.
async fn run_task<S: TileSource>(task: PackTask, source: Arc<S>) -> Option<PackMessage> {
    let coords = task.request.tile_info.coords();

    let fetched = tokio::select! {
        _ = task.token.cancelled() => return None,
        fetched = source.fetch(&coords) => fetched,
    };
    let raw = match fetched {
        Ok(raw) => raw,
        Err(e) => return Some(task.message(Err(e.into()))),
    };
    if task.token.is_cancelled() {
        return None;
    }

    let job = task.clone();
    let result = tokio::task::spawn_blocking(move || {
        process_tile(&job.request, raw, &job.style, &job.options)
    })
    .await
    .map_err(|e| WorkerError::Task(e.to_string()))
    .and_then(|result| result);

    if task.token.is_cancelled() {
        return None;
    }
    Some(task.message(result))
}

/// Packs tasks synchronously while scheduling them, from tiles held in memory.
pub struct ImmediatePackScheduler {
    channel: (Sender<PackMessage>, Receiver<PackMessage>),
    source: StaticTileSource,
    shut_down: bool,
}

impl ImmediatePackScheduler {
    pub fn new(source: StaticTileSource) -> Self {
        Self {
            channel: mpsc::channel(),
            source,
            shut_down: false,
        }
    }
}

impl PackScheduler for ImmediatePackScheduler {
    fn schedule(&self, task: PackTask) -> Result<(), ScheduleError> {
        if self.shut_down {
            return Err(ScheduleError::ShutDown);
        }
        if task.token.is_cancelled() {
            return Ok(());
        }

        let result = self
            .source
            .sync_fetch(&task.request.tile_info.coords())
            .map_err(WorkerError::from)
            .and_then(|raw| process_tile(&task.request, raw, &task.style, &task.options));
        // The receiver lives in `self`, sending cannot fail.
        let _ = self.channel.0.send(task.message(result));
        Ok(())
    }

    fn receive(&mut self) -> Option<PackMessage> {
        self.channel.1.try_recv().ok()
    }

    fn shutdown(&mut self) {
        self.shut_down = true;
    }
}
