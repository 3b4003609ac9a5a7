//! Burst controller
//!
//! Single consumer of the control channel. Owns the [`BurstGate`], fans each
//! accepted image out to its own persistence task, joins those tasks in
//! acceptance order once the burst fills, and reports the outcome on the
//! event channel. Reports belonging to a session that has since been
//! restarted or abandoned are dropped.

use std::path::PathBuf;
use std::sync::Arc;

use flume::{Receiver, Sender};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Duration, Instant};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::capture::frame::{RawFrame, SessionId};
use crate::capture::gate::{Admission, BurstCompletion, BurstGate};
use crate::error::{BurstError, Result};
use crate::pipeline::persist::ImageSink;
use crate::{utils, Config, StorageConfig};

/// What to do when some images of a filled burst could not be stored
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistFailurePolicy {
    /// Complete with the images that were stored
    #[default]
    Shrink,
    /// Report the burst as failed
    Abort,
}

/// Messages from the hosting collaborator
#[derive(Debug)]
pub enum ControlMessage {
    /// Begin a fresh burst. `payload` is handed back untouched on completion.
    Start { payload: Option<String> },
    Frame(RawFrame),
    /// Host torn down: drop the running burst without completing it
    Abandon,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BurstResult {
    pub session: SessionId,
    /// Stored image references in acceptance order
    pub images: Vec<PathBuf>,
    /// Number of accepted images that could not be stored
    pub failed: usize,
    pub payload: Option<String>,
}

#[derive(Debug)]
pub enum BurstEvent {
    Completed(BurstResult),
    Failed {
        session: SessionId,
        error: BurstError,
    },
}

struct PersistReport {
    session: SessionId,
    results: Vec<Result<PathBuf>>,
}

pub struct BurstController {
    gate: BurstGate,
    sink: Arc<dyn ImageSink>,
    storage: StorageConfig,
    events: Sender<BurstEvent>,
    reports_tx: Sender<PersistReport>,
    reports_rx: Receiver<PersistReport>,
    /// Persistence tasks of the running session, in acceptance order
    pending: Vec<JoinHandle<Result<PathBuf>>>,
    /// Session whose outcome may still be reported
    live: Option<SessionId>,
    payload: Option<String>,
}

impl BurstController {
    pub fn new(config: &Config, sink: Arc<dyn ImageSink>, events: Sender<BurstEvent>) -> Result<Self> {
        config.validate()?;
        let gate = BurstGate::new(config.burst.clone())?;
        let (reports_tx, reports_rx) = flume::unbounded();

        Ok(Self {
            gate,
            sink,
            storage: config.storage.clone(),
            events,
            reports_tx,
            reports_rx,
            pending: Vec::with_capacity(config.burst.frame_count),
            live: None,
            payload: None,
        })
    }

    /// Run until `input` closes. A burst whose persistence is already being
    /// joined at that point is still reported.
    #[instrument(skip_all)]
    pub async fn run(mut self, input: Receiver<ControlMessage>) -> Result<()> {
        info!("Burst controller running");
        let reports = self.reports_rx.clone();

        loop {
            tokio::select! {
                msg = input.recv_async() => match msg {
                    Ok(msg) => self.handle(msg).await,
                    Err(_) => break,
                },
                Ok(report) = reports.recv_async() => self.on_report(report).await,
            }
        }

        // A filled burst leaves `live` set until its report arrives
        let joining = self.live.filter(|_| !self.gate.is_active());
        if let Some(session) = joining {
            debug!(session = session.0, "Input closed, waiting for persistence");
            while let Ok(report) = reports.recv_async().await {
                let done = report.session == session;
                self.on_report(report).await;
                if done {
                    break;
                }
            }
        }

        info!("Burst controller stopped");
        Ok(())
    }

    async fn handle(&mut self, msg: ControlMessage) {
        match msg {
            ControlMessage::Start { payload } => self.start(payload).await,
            ControlMessage::Frame(frame) => self.offer(frame),
            ControlMessage::Abandon => {
                self.gate.abandon();
                self.drop_session();
            }
        }
    }

    async fn start(&mut self, payload: Option<String>) {
        self.drop_session();

        if self.storage.clear_on_start {
            let dir = self.storage.output_dir.clone();
            let cleared = tokio::task::spawn_blocking(move || utils::clear_directory(&dir)).await;
            match cleared {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!(
                    "Failed to clear {}: {}",
                    self.storage.output_dir.display(),
                    e
                ),
                Err(e) => warn!("Directory clearing task failed: {}", e),
            }
        }

        let session = self.gate.start();
        self.live = Some(session);
        self.payload = payload;
    }

    /// Forget the running session. Its persistence tasks keep running but
    /// nothing they produce will be reported.
    fn drop_session(&mut self) {
        if !self.pending.is_empty() {
            debug!(tasks = self.pending.len(), "Detaching in-flight persistence");
        }
        self.pending.clear();
        self.live = None;
        self.payload = None;
    }

    fn offer(&mut self, frame: RawFrame) {
        let accepted = match self.gate.offer(frame) {
            Admission::Accepted(accepted) => accepted,
            Admission::Rejected(reason) => {
                trace!(?reason, "Frame rejected");
                return;
            }
        };

        let sink = Arc::clone(&self.sink);
        let id = accepted.id;
        let image = accepted.image;
        self.pending
            .push(tokio::task::spawn_blocking(move || sink.persist(id, &image)));

        if let Some(completion) = accepted.completion {
            self.join_persistence(completion);
        }
    }

    /// Counting barrier: await every persistence task of the filled burst and
    /// send the results back to the controller loop.
    fn join_persistence(&mut self, completion: BurstCompletion) {
        let handles = std::mem::take(&mut self.pending);
        debug_assert_eq!(handles.len(), completion.frames.len());

        let session = completion.session;
        let deadline = self
            .storage
            .persist_timeout_ms
            .map(|ms| (ms, Instant::now() + Duration::from_millis(ms)));
        let reports = self.reports_tx.clone();

        tokio::spawn(async move {
            let mut results = Vec::with_capacity(handles.len());
            for handle in handles {
                let joined = match deadline {
                    Some((ms, at)) => match timeout_at(at, handle).await {
                        Ok(joined) => joined,
                        Err(_) => {
                            results.push(Err(BurstError::PersistTimeout(ms)));
                            continue;
                        }
                    },
                    None => handle.await,
                };
                results.push(joined.unwrap_or_else(|e| Err(BurstError::PersistTask(e.to_string()))));
            }

            if reports.send_async(PersistReport { session, results }).await.is_err() {
                warn!(session = session.0, "Controller gone before persistence finished");
            }
        });
    }

    async fn on_report(&mut self, report: PersistReport) {
        let session = report.session;
        if self.live != Some(session) {
            debug!(session = session.0, "Dropping stale persistence report");
            return;
        }
        self.live = None;
        let payload = self.payload.take();

        let mut images = Vec::with_capacity(report.results.len());
        let mut failures = Vec::new();
        for result in report.results {
            match result {
                Ok(path) => images.push(path),
                Err(e) => {
                    warn!(session = session.0, "Image not stored: {}", e);
                    failures.push(e);
                }
            }
        }
        metrics::counter!("burst_images_persisted").increment(images.len() as u64);
        metrics::counter!("burst_images_failed").increment(failures.len() as u64);

        let event = match (self.storage.on_persist_failure, failures.is_empty()) {
            (PersistFailurePolicy::Abort, false) => {
                let error = failures.swap_remove(0);
                error!(session = session.0, "Burst failed: {}", error);
                BurstEvent::Failed { session, error }
            }
            _ => {
                info!(
                    session = session.0,
                    images = images.len(),
                    failed = failures.len(),
                    "Burst stored"
                );
                BurstEvent::Completed(BurstResult {
                    session,
                    images,
                    failed: failures.len(),
                    payload,
                })
            }
        };

        if self.events.send_async(event).await.is_err() {
            warn!(session = session.0, "No listener for burst outcome");
        }
    }
}

/// Collaborator-side handle to a spawned controller
pub struct BurstHandle {
    input: Sender<ControlMessage>,
    events: Receiver<BurstEvent>,
    task: JoinHandle<Result<()>>,
}

impl BurstHandle {
    /// Spawn a controller on the current runtime. The frame queue holds
    /// `capture.queue_depth` messages.
    pub fn spawn(config: &Config, sink: Arc<dyn ImageSink>) -> Result<Self> {
        let (input, input_rx) = flume::bounded(config.capture.queue_depth);
        let (events_tx, events) = flume::unbounded();
        let controller = BurstController::new(config, sink, events_tx)?;
        let task = tokio::spawn(controller.run(input_rx));

        Ok(Self {
            input,
            events,
            task,
        })
    }

    pub async fn start(&self, payload: Option<String>) -> Result<()> {
        self.send(ControlMessage::Start { payload }).await
    }

    pub async fn abandon(&self) -> Result<()> {
        self.send(ControlMessage::Abandon).await
    }

    /// Queue a frame, waiting for room
    pub async fn submit_frame(&self, frame: RawFrame) -> Result<()> {
        self.send(ControlMessage::Frame(frame)).await
    }

    /// Queue a frame without waiting. Returns `false` if the queue was full
    /// and the frame was dropped.
    pub fn try_submit_frame(&self, frame: RawFrame) -> Result<bool> {
        match self.input.try_send(ControlMessage::Frame(frame)) {
            Ok(()) => Ok(true),
            Err(flume::TrySendError::Full(_)) => {
                metrics::counter!("burst_frames_dropped").increment(1);
                Ok(false)
            }
            Err(flume::TrySendError::Disconnected(_)) => Err(BurstError::ChannelClosed),
        }
    }

    pub async fn next_event(&self) -> Result<BurstEvent> {
        self.events
            .recv_async()
            .await
            .map_err(|_| BurstError::ChannelClosed)
    }

    pub fn events(&self) -> &Receiver<BurstEvent> {
        &self.events
    }

    /// Close the input and wait for the controller to finish
    pub async fn shutdown(self) -> Result<()> {
        drop(self.input);
        self.task
            .await
            .map_err(|e| BurstError::PersistTask(e.to_string()))?
    }

    async fn send(&self, msg: ControlMessage) -> Result<()> {
        self.input
            .send_async(msg)
            .await
            .map_err(|_| BurstError::ChannelClosed)
    }
}
