//! State shared by the capture thread, the tick thread and API callers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

use physio_core::{Error, Result, SessionId, Skeleton, UserMetrics};
use physio_pose::{SdkFrame, SnapshotBuilder};

use crate::calibration::{CalibrationFailure, SkeletonFeed};
use crate::run::{ExerciseEvent, ExerciseRun, TickReport};

/// Everything the session publishes to its UI and audio collaborators
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    SessionStarted {
        session_id: SessionId,
    },
    SessionStopped,
    CalibrationStarted,
    CalibrationProgress {
        remaining_secs: f64,
        joints_detected: Option<usize>,
    },
    CalibrationSucceeded {
        metrics: UserMetrics,
    },
    CalibrationFailed {
        failure: CalibrationFailure,
    },
    ExerciseSelected {
        name: String,
        steps: usize,
    },
    ExerciseStarted {
        name: String,
    },
    ExerciseStopped,
    Progress(TickReport),
    Exercise(ExerciseEvent),
    DeviceFailed {
        message: String,
    },
}

#[derive(Debug, Default)]
struct Snapshot {
    builder: SnapshotBuilder,
    frame_seq: u64,
}

/// Shared session state.
///
/// Skeletons and metrics sit behind read-write locks so readers never see
/// a half-written snapshot; mode flags are atomics checked every loop
/// iteration.
#[derive(Debug)]
pub struct SessionContext {
    id: SessionId,
    snapshot: RwLock<Snapshot>,
    metrics: RwLock<Option<UserMetrics>>,
    run: Mutex<Option<ExerciseRun>>,
    running: AtomicBool,
    calibrating: AtomicBool,
    calibration_started: Mutex<Option<Instant>>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionContext {
    pub fn new(event_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            id: SessionId::new(),
            snapshot: RwLock::new(Snapshot::default()),
            metrics: RwLock::new(None),
            run: Mutex::new(None),
            running: AtomicBool::new(false),
            calibrating: AtomicBool::new(false),
            calibration_started: Mutex::new(None),
            events,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Send an event to every subscriber; dropped when nobody listens
    pub fn publish(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            trace!("No subscribers for session event");
        }
    }

    /// Fold a new SDK frame into the current/previous skeleton pair.
    ///
    /// Returns whether a user is tracked in this frame.
    pub fn ingest(&self, frame: &SdkFrame) -> bool {
        let mut snapshot = self.snapshot.write();
        snapshot.frame_seq += 1;
        snapshot.builder.ingest(frame).is_some()
    }

    /// Number of frames ingested so far
    pub fn frame_seq(&self) -> u64 {
        self.snapshot.read().frame_seq
    }

    pub fn current_skeleton(&self) -> Option<Skeleton> {
        self.snapshot.read().builder.current().cloned()
    }

    /// Current and previous skeleton, read under one lock
    pub fn skeletons(&self) -> (Option<Skeleton>, Option<Skeleton>) {
        let snapshot = self.snapshot.read();
        (
            snapshot.builder.current().cloned(),
            snapshot.builder.previous().cloned(),
        )
    }

    pub fn clear_skeletons(&self) {
        self.snapshot.write().builder.reset();
    }

    pub fn metrics(&self) -> Option<UserMetrics> {
        *self.metrics.read()
    }

    pub fn set_metrics(&self, metrics: Option<UserMetrics>) {
        *self.metrics.write() = metrics;
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub(crate) fn set_running(&self, running: bool) -> bool {
        self.running.swap(running, Ordering::SeqCst)
    }

    pub fn is_calibrating(&self) -> bool {
        self.calibrating.load(Ordering::SeqCst)
    }

    /// Enter calibration mode.
    ///
    /// Holds the exercise slot while flipping the flag, so it can't race
    /// an exercise starting; see [`Session::start_exercise`](crate::Session::start_exercise).
    pub(crate) fn begin_calibration(&self) -> Result<()> {
        let run = self.run.lock();
        if run.as_ref().is_some_and(ExerciseRun::is_active) {
            return Err(Error::Calibration("an exercise is in progress".into()));
        }
        if self.calibrating.swap(true, Ordering::SeqCst) {
            return Err(Error::Calibration("calibration already in progress".into()));
        }
        *self.calibration_started.lock() = Some(Instant::now());
        Ok(())
    }

    pub(crate) fn end_calibration(&self) {
        self.calibrating.store(false, Ordering::SeqCst);
        *self.calibration_started.lock() = None;
    }

    /// Time spent in the current calibration window
    pub fn calibration_elapsed(&self) -> Option<Duration> {
        self.calibration_started.lock().map(|start| start.elapsed())
    }

    /// Run `f` with exclusive access to the exercise slot
    pub fn with_run<R>(&self, f: impl FnOnce(&mut Option<ExerciseRun>) -> R) -> R {
        f(&mut self.run.lock())
    }

    pub fn exercise_active(&self) -> bool {
        self.with_run(|run| run.as_ref().is_some_and(ExerciseRun::is_active))
    }

    /// Skeleton feed for the calibration loop
    pub fn feed(&self) -> ContextFeed<'_> {
        ContextFeed {
            context: self,
            last_seq: None,
        }
    }
}

/// Reads skeletons produced by the capture thread.
///
/// Yields each ingested frame at most once, so a slow capture thread
/// doesn't produce duplicate calibration samples.
pub struct ContextFeed<'a> {
    context: &'a SessionContext,
    last_seq: Option<u64>,
}

impl SkeletonFeed for ContextFeed<'_> {
    fn next_skeleton(&mut self) -> Result<Option<Skeleton>> {
        let snapshot = self.context.snapshot.read();
        if self.last_seq == Some(snapshot.frame_seq) {
            return Ok(None);
        }
        self.last_seq = Some(snapshot.frame_seq);
        Ok(snapshot.builder.current().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use physio_core::testing::standing_skeleton;

    #[test]
    fn test_ingest_tracks_current_and_previous() {
        let context = SessionContext::new(8);
        let frame = SdkFrame::from_skeleton(&standing_skeleton());

        assert!(context.ingest(&frame));
        assert_eq!(context.frame_seq(), 1);
        let (current, previous) = context.skeletons();
        assert!(current.is_some());
        assert!(previous.is_none());

        assert!(!context.ingest(&SdkFrame::empty()));
        assert_eq!(context.frame_seq(), 2);
    }

    #[test]
    fn test_feed_skips_repeated_frames() {
        let context = SessionContext::new(8);
        context.ingest(&SdkFrame::from_skeleton(&standing_skeleton()));

        let mut feed = context.feed();
        assert!(feed.next_skeleton().unwrap().is_some());
        assert!(feed.next_skeleton().unwrap().is_none());

        context.ingest(&SdkFrame::from_skeleton(&standing_skeleton()));
        assert!(feed.next_skeleton().unwrap().is_some());
    }

    #[test]
    fn test_calibration_flag() {
        let context = SessionContext::new(8);
        assert!(context.calibration_elapsed().is_none());
        context.begin_calibration().unwrap();
        assert!(matches!(context.begin_calibration(), Err(Error::Calibration(_))));
        assert!(context.is_calibrating());
        assert!(context.calibration_elapsed().is_some());

        context.end_calibration();
        assert!(!context.is_calibrating());
        assert!(context.calibration_elapsed().is_none());
    }

    #[test]
    fn test_publish_reaches_subscribers() {
        let context = SessionContext::new(8);
        context.publish(SessionEvent::SessionStopped);

        let mut rx = context.subscribe();
        context.publish(SessionEvent::ExerciseStopped);
        assert_eq!(rx.try_recv().unwrap(), SessionEvent::ExerciseStopped);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_event_json_shape() {
        let event = SessionEvent::CalibrationFailed {
            failure: CalibrationFailure::OffCenter { x: 450.0 },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "calibration_failed");
        assert_eq!(json["failure"]["kind"], "off-center");
    }
}
