//! Burst admission gate
//!
//! Admits a fixed number of frames from an arbitrarily fast stream, spaced at
//! least `min_interval_ms` apart by arrival timestamp. The first frame after
//! [`BurstGate::start`] is always admitted. Completion is reported exactly
//! once, on the frame that fills the burst.

use std::time::Instant;

use tracing::{debug, info, warn};

use crate::capture::convert::convert_frame;
use crate::capture::frame::{FrameId, RawFrame, RgbImage, SessionId};
use crate::error::{ConvertError, Result};
use crate::BurstConfig;

/// Why a frame was not admitted. None of these are errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// No burst running (never started, completed, or abandoned)
    Inactive,
    /// Less than the minimum interval since the last admitted frame
    TooSoon,
    /// Burst already holds its full frame count
    AlreadyFull,
    /// The frame could not be converted; it does not count toward the burst
    ConversionFailed(ConvertError),
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::Inactive => "inactive",
            RejectReason::TooSoon => "too_soon",
            RejectReason::AlreadyFull => "already_full",
            RejectReason::ConversionFailed(_) => "conversion_failed",
        }
    }
}

/// Ordered result of a filled burst
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BurstCompletion {
    pub session: SessionId,
    pub frames: Vec<FrameId>,
}

#[derive(Debug)]
pub struct AcceptedFrame {
    pub id: FrameId,
    pub image: RgbImage,
    /// Present only on the frame that completed the burst
    pub completion: Option<BurstCompletion>,
}

#[derive(Debug)]
pub enum Admission {
    Accepted(AcceptedFrame),
    Rejected(RejectReason),
}

/// Mutable state of one burst
#[derive(Debug, Clone, Default)]
pub struct BurstSession {
    pub id: SessionId,
    pub accepted_count: usize,
    pub last_accepted_at_ms: Option<u64>,
    pub is_active: bool,
    pub results: Vec<FrameId>,
}

impl BurstSession {
    fn fresh(id: SessionId, capacity: usize) -> Self {
        Self {
            id,
            accepted_count: 0,
            last_accepted_at_ms: None,
            is_active: true,
            results: Vec::with_capacity(capacity),
        }
    }
}

pub struct BurstGate {
    config: BurstConfig,
    session: BurstSession,
    next_session: u64,
}

impl BurstGate {
    pub fn new(config: BurstConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            session: BurstSession::default(),
            next_session: 1,
        })
    }

    /// Begin a fresh burst, discarding whatever the previous one admitted
    pub fn start(&mut self) -> SessionId {
        if self.session.is_active {
            warn!(
                session = self.session.id.0,
                accepted = self.session.accepted_count,
                "Restarting burst before previous session completed"
            );
        }

        let id = SessionId(self.next_session);
        self.next_session += 1;
        self.session = BurstSession::fresh(id, self.config.frame_count);

        info!(
            session = id.0,
            frames = self.config.frame_count,
            interval_ms = self.config.min_interval_ms,
            "Burst started"
        );
        id
    }

    /// Stop admitting frames without completing the burst
    pub fn abandon(&mut self) {
        if self.session.is_active {
            info!(
                session = self.session.id.0,
                accepted = self.session.accepted_count,
                "Burst abandoned"
            );
        }
        self.session.is_active = false;
    }

    /// Decide whether `frame` joins the burst, converting it if so
    pub fn offer(&mut self, frame: RawFrame) -> Admission {
        let t = frame.timestamp_ms;

        if let Some(reason) = self.admission_check(t) {
            metrics::counter!("burst_frames_rejected", "reason" => reason.as_str()).increment(1);
            return Admission::Rejected(reason);
        }

        let started = Instant::now();
        let image = match convert_frame(&frame, self.config.chroma_order) {
            Ok(image) => image,
            Err(e) => {
                warn!(session = self.session.id.0, timestamp_ms = t, "Dropping frame: {}", e);
                let reason = RejectReason::ConversionFailed(e);
                metrics::counter!("burst_frames_rejected", "reason" => reason.as_str())
                    .increment(1);
                return Admission::Rejected(reason);
            }
        };
        metrics::histogram!("convert_time_us").record(started.elapsed().as_micros() as f64);

        let session = &mut self.session;
        session.last_accepted_at_ms = Some(t);
        session.accepted_count += 1;

        let id = FrameId {
            session: session.id,
            index: session.accepted_count - 1,
        };
        session.results.push(id);
        metrics::counter!("burst_frames_accepted").increment(1);
        debug!(session = id.session.0, index = id.index, timestamp_ms = t, "Frame accepted");

        let completion = if session.accepted_count == self.config.frame_count {
            session.is_active = false;
            info!(session = id.session.0, frames = session.results.len(), "Burst complete");
            Some(BurstCompletion {
                session: session.id,
                frames: session.results.clone(),
            })
        } else {
            None
        };

        Admission::Accepted(AcceptedFrame {
            id,
            image,
            completion,
        })
    }

    fn admission_check(&self, t: u64) -> Option<RejectReason> {
        let session = &self.session;
        if !session.is_active {
            return Some(RejectReason::Inactive);
        }
        if session.accepted_count >= self.config.frame_count {
            return Some(RejectReason::AlreadyFull);
        }
        match session.last_accepted_at_ms {
            None => None,
            Some(last) => match t.checked_sub(last) {
                Some(elapsed) if elapsed >= self.config.min_interval_ms => None,
                _ => Some(RejectReason::TooSoon),
            },
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session.id
    }

    pub fn session(&self) -> &BurstSession {
        &self.session
    }

    pub fn accepted_count(&self) -> usize {
        self.session.accepted_count
    }

    pub fn is_active(&self) -> bool {
        self.session.is_active
    }

    pub fn results(&self) -> &[FrameId] {
        &self.session.results
    }
}
