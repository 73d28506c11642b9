//! Session orchestrator: owns the shared context and its worker threads.
//!
//! The capture thread pulls frames from a [`FrameSource`] into the context.
//! The tick thread runs at the configured interval and either publishes
//! calibration progress or advances the active exercise run. Calibration
//! itself runs synchronously on the caller's thread.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use physio_core::{Error, Result, SessionId, Timestamp, UserMetrics};

use crate::calibration::{CalibrationEngine, CalibrationOutcome, SkeletonFeed};
use crate::context::{SessionContext, SessionEvent};
use crate::exercise::ExerciseDefinition;
use crate::run::{ExerciseRun, TickInput};
use crate::settings::SessionConfig;
use crate::source::FrameSource;

/// Point-in-time view of a session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStatus {
    pub session_id: SessionId,
    pub running: bool,
    pub calibrating: bool,
    pub metrics: Option<UserMetrics>,
    pub exercise: Option<String>,
    pub exercise_active: bool,
    pub step_index: Option<usize>,
    pub frames: u64,
}

pub struct Session {
    config: SessionConfig,
    context: Arc<SessionContext>,
    workers: Vec<JoinHandle<()>>,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        let context = Arc::new(SessionContext::new(config.event_capacity));
        Self {
            config,
            context,
            workers: Vec::new(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.context.id()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn context(&self) -> &Arc<SessionContext> {
        &self.context
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.context.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.context.is_running()
    }

    /// Start capturing from `source` and ticking
    pub fn start(&mut self, source: Box<dyn FrameSource>) -> Result<()> {
        if self.context.is_running() {
            return Err(Error::SessionAlreadyRunning);
        }
        // Threads left behind by a device failure
        self.join_workers();
        self.context.clear_skeletons();
        self.context.set_running(true);

        if let Err(e) = self.spawn_workers(source) {
            error!("Failed to spawn session threads: {}", e);
            self.context.set_running(false);
            self.join_workers();
            return Err(e);
        }

        info!("Session {} started", self.context.id().0);
        self.context.publish(SessionEvent::SessionStarted {
            session_id: self.context.id(),
        });
        Ok(())
    }

    fn spawn_workers(&mut self, source: Box<dyn FrameSource>) -> Result<()> {
        let context = Arc::clone(&self.context);
        self.workers.push(
            thread::Builder::new()
                .name("physio-capture".into())
                .spawn(move || capture_loop(&context, source))?,
        );

        let context = Arc::clone(&self.context);
        let interval = self.config.tick_interval();
        let window = self.config.calibration.window();
        self.workers.push(
            thread::Builder::new()
                .name("physio-tick".into())
                .spawn(move || tick_loop(&context, interval, window))?,
        );
        Ok(())
    }

    /// Stop both threads and reset calibration and exercise state
    pub fn stop(&mut self) -> Result<()> {
        let was_running = self.context.set_running(false);
        if !was_running && self.workers.is_empty() {
            return Err(Error::SessionNotRunning);
        }

        self.context.end_calibration();
        self.context.with_run(|run| {
            if let Some(run) = run.as_mut() {
                run.stop();
            }
        });
        self.join_workers();

        info!("Session {} stopped", self.context.id().0);
        self.context.publish(SessionEvent::SessionStopped);
        Ok(())
    }

    fn join_workers(&mut self) {
        for worker in self.workers.drain(..) {
            let name = worker.thread().name().unwrap_or("worker").to_string();
            if worker.join().is_err() {
                error!("Session thread {} panicked", name);
            }
        }
    }

    /// Calibrate from the frames the capture thread is producing.
    ///
    /// Blocks for the calibration window. Returns `Ok(Err(_))` when the
    /// samples were unusable; the caller decides whether to retry.
    pub fn calibrate(&self) -> Result<CalibrationOutcome> {
        if !self.context.is_running() {
            return Err(Error::SessionNotRunning);
        }
        let mut feed = self.context.feed();
        self.calibrate_from(&mut feed, true)
    }

    /// Calibrate from an arbitrary skeleton feed
    pub fn calibrate_with(&self, feed: &mut dyn SkeletonFeed) -> Result<CalibrationOutcome> {
        self.calibrate_from(feed, false)
    }

    fn calibrate_from(
        &self,
        feed: &mut dyn SkeletonFeed,
        needs_capture: bool,
    ) -> Result<CalibrationOutcome> {
        self.context.begin_calibration()?;
        self.context.publish(SessionEvent::CalibrationStarted);

        let context = &self.context;
        let is_active =
            || context.is_calibrating() && (!needs_capture || context.is_running());
        let engine = CalibrationEngine::new(self.config.calibration.clone());
        let result = engine.run(feed, &is_active);
        self.context.end_calibration();

        match &result {
            Ok(Ok(metrics)) => {
                self.context.set_metrics(Some(*metrics));
                self.context
                    .publish(SessionEvent::CalibrationSucceeded { metrics: *metrics });
            }
            Ok(Err(failure)) => {
                warn!("Calibration failed: {} ({})", failure, failure.advice());
                self.context.publish(SessionEvent::CalibrationFailed {
                    failure: failure.clone(),
                });
            }
            Err(e) => error!("Calibration aborted: {}", e),
        }
        result
    }

    /// End a calibration in progress; its samples so far are still evaluated
    pub fn cancel_calibration(&self) {
        self.context.end_calibration();
    }

    pub fn metrics(&self) -> Option<UserMetrics> {
        self.context.metrics()
    }

    /// Make `definition` the session's exercise, replacing any previous one
    pub fn select_exercise(&self, definition: ExerciseDefinition) -> Result<()> {
        definition.validate()?;
        let name = definition.exercise_name.clone();
        let steps = definition.len();

        self.context.with_run(|run| {
            if let Some(previous) = run.as_mut() {
                previous.stop();
            }
            *run = Some(ExerciseRun::new(definition, &self.config.scoring));
        });

        info!("Exercise selected: {} ({} steps)", name, steps);
        self.context
            .publish(SessionEvent::ExerciseSelected { name, steps });
        Ok(())
    }

    /// Begin the selected exercise at its first step
    pub fn start_exercise(&self) -> Result<()> {
        if !self.context.is_running() {
            return Err(Error::SessionNotRunning);
        }
        if self.context.metrics().is_none() {
            return Err(Error::NotCalibrated);
        }
        // Checked under the run lock, which calibration also holds to start
        let (name, event) = self.context.with_run(|run| {
            if self.context.is_calibrating() {
                return Err(Error::Calibration("calibration in progress".into()));
            }
            let run = run.as_mut().ok_or(Error::NoExerciseSelected)?;
            let event = run.start(Timestamp::now());
            Ok::<_, Error>((run.definition().exercise_name.clone(), event))
        })?;

        self.context.publish(SessionEvent::ExerciseStarted { name });
        self.context.publish(SessionEvent::Exercise(event));
        Ok(())
    }

    /// Abandon the running exercise; the selection is kept
    pub fn stop_exercise(&self) -> Result<()> {
        let stopped = self.context.with_run(|run| match run.as_mut() {
            Some(run) if run.is_active() => {
                run.stop();
                true
            }
            _ => false,
        });
        if stopped {
            self.context.publish(SessionEvent::ExerciseStopped);
        }
        Ok(())
    }

    pub fn status(&self) -> SessionStatus {
        let (exercise, exercise_active, step_index) = self.context.with_run(|run| match run {
            Some(run) => (
                Some(run.definition().exercise_name.clone()),
                run.is_active(),
                run.is_active().then(|| run.state().current_step_index),
            ),
            None => (None, false, None),
        });

        SessionStatus {
            session_id: self.context.id(),
            running: self.context.is_running(),
            calibrating: self.context.is_calibrating(),
            metrics: self.context.metrics(),
            exercise,
            exercise_active,
            step_index,
            frames: self.context.frame_seq(),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.context.is_running() || !self.workers.is_empty() {
            if let Err(e) = self.stop() {
                warn!("Failed to stop session {} on drop: {}", self.context.id().0, e);
            }
        }
    }
}

fn capture_loop(context: &SessionContext, mut source: Box<dyn FrameSource>) {
    info!("Capture thread started");
    while context.is_running() {
        match source.next_frame() {
            Ok(frame) => {
                context.ingest(&frame);
            }
            Err(Error::Device(message)) => {
                error!("Depth device failed: {}", message);
                context.set_running(false);
                context.end_calibration();
                context.publish(SessionEvent::DeviceFailed { message });
                break;
            }
            Err(e) => warn!("Dropped frame: {}", e),
        }
    }
    info!("Capture thread stopped");
}

fn tick_loop(context: &SessionContext, interval: Duration, window: Duration) {
    while context.is_running() {
        if context.is_calibrating() {
            publish_calibration_progress(context, window);
        } else {
            tick_exercise(context);
        }
        thread::sleep(interval);
    }
}

fn publish_calibration_progress(context: &SessionContext, window: Duration) {
    let Some(elapsed) = context.calibration_elapsed() else {
        return;
    };
    context.publish(SessionEvent::CalibrationProgress {
        remaining_secs: window.saturating_sub(elapsed).as_secs_f64(),
        joints_detected: context.current_skeleton().map(|s| s.len()),
    });
}

fn tick_exercise(context: &SessionContext) {
    let (current, previous) = context.skeletons();
    let metrics = context.metrics();
    let input = TickInput {
        skeleton: current.as_ref(),
        previous: previous.as_ref(),
        metrics: metrics.as_ref(),
    };

    let Some(report) = context.with_run(|run| run.as_mut()?.tick(input, Timestamp::now())) else {
        return;
    };
    let events = report.events.clone();
    context.publish(SessionEvent::Progress(report));
    for event in events {
        context.publish(SessionEvent::Exercise(event));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    use physio_core::testing::{standard_metrics, standing_skeleton};
    use physio_pose::{SdkFrame, StepRequirements};
    use tokio::sync::broadcast::error::TryRecvError;

    use crate::exercise::Step;
    use crate::run::ExerciseEvent;
    use crate::source::ScriptedSource;

    /// Endless stream of the standing pose
    struct StandingSource(SdkFrame);

    impl FrameSource for StandingSource {
        fn next_frame(&mut self) -> Result<SdkFrame> {
            thread::sleep(Duration::from_millis(2));
            Ok(self.0.clone())
        }
    }

    fn standing_source() -> Box<dyn FrameSource> {
        Box::new(StandingSource(SdkFrame::from_skeleton(&standing_skeleton())))
    }

    fn fast_config() -> SessionConfig {
        let mut config = SessionConfig {
            tick_interval_ms: 10,
            ..SessionConfig::default()
        };
        config.calibration.window_secs = 0.3;
        config.calibration.sample_interval_ms = 10;
        config
    }

    fn short_exercise() -> ExerciseDefinition {
        let step = |name: &str| Step {
            name: name.into(),
            instructions: String::new(),
            duration_seconds: 0.1,
            requirements: StepRequirements::default()
                .with_pose("arms_down", true)
                .with_pose("legs_together", true),
            requires_jump: false,
        };
        ExerciseDefinition {
            exercise_name: "Quick Stand".into(),
            steps: vec![step("First"), step("Second")],
        }
    }

    fn wait_for(
        rx: &mut broadcast::Receiver<SessionEvent>,
        matches: impl Fn(&SessionEvent) -> bool,
    ) -> Option<SessionEvent> {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            match rx.try_recv() {
                Ok(event) if matches(&event) => return Some(event),
                Ok(_) | Err(TryRecvError::Lagged(_)) => {}
                Err(TryRecvError::Empty) => thread::sleep(Duration::from_millis(5)),
                Err(TryRecvError::Closed) => return None,
            }
        }
        None
    }

    #[test]
    fn test_start_and_stop_guards() {
        let mut session = Session::new(fast_config());
        assert!(matches!(session.stop(), Err(Error::SessionNotRunning)));

        session.start(standing_source()).unwrap();
        assert!(session.is_running());
        assert!(matches!(
            session.start(standing_source()),
            Err(Error::SessionAlreadyRunning)
        ));

        session.stop().unwrap();
        assert!(!session.is_running());
        assert!(matches!(session.stop(), Err(Error::SessionNotRunning)));
    }

    #[test]
    fn test_exercise_requires_running_calibrated_session() {
        let mut session = Session::new(fast_config());
        session.select_exercise(short_exercise()).unwrap();
        assert!(matches!(session.start_exercise(), Err(Error::SessionNotRunning)));
        assert!(matches!(session.calibrate(), Err(Error::SessionNotRunning)));

        session.start(standing_source()).unwrap();
        assert!(matches!(session.start_exercise(), Err(Error::NotCalibrated)));
    }

    #[test]
    fn test_start_without_selection() {
        let mut session = Session::new(fast_config());
        session.start(standing_source()).unwrap();
        session.context().set_metrics(Some(standard_metrics()));
        assert!(matches!(session.start_exercise(), Err(Error::NoExerciseSelected)));
    }

    #[test]
    fn test_calibrate_then_complete_exercise() {
        let mut session = Session::new(fast_config());
        let mut rx = session.subscribe();
        session.start(standing_source()).unwrap();

        let metrics = session.calibrate().unwrap().unwrap();
        assert!((metrics.height - 1600.0).abs() < 1e-6);
        assert_eq!(session.metrics(), Some(metrics));
        assert!(wait_for(&mut rx, |e| matches!(e, SessionEvent::CalibrationSucceeded { .. })).is_some());

        session.select_exercise(short_exercise()).unwrap();
        session.start_exercise().unwrap();
        assert!(session.status().exercise_active);

        let completed = wait_for(&mut rx, |e| {
            matches!(e, SessionEvent::Exercise(ExerciseEvent::ExerciseCompleted { .. }))
        });
        assert!(completed.is_some());

        let status = session.status();
        assert!(!status.exercise_active);
        assert_eq!(status.exercise.as_deref(), Some("Quick Stand"));
        assert!(status.frames > 0);
    }

    #[test]
    fn test_calibration_publishes_progress() {
        let mut session = Session::new(fast_config());
        let mut rx = session.subscribe();
        session.start(standing_source()).unwrap();
        session.calibrate().unwrap().unwrap();

        let progress = wait_for(&mut rx, |e| matches!(e, SessionEvent::CalibrationProgress { .. }));
        match progress {
            Some(SessionEvent::CalibrationProgress { remaining_secs, .. }) => {
                assert!(remaining_secs <= 0.3);
            }
            other => panic!("expected calibration progress, got {:?}", other),
        }
    }

    #[test]
    fn test_calibrate_with_external_feed() {
        struct Fixed;
        impl SkeletonFeed for Fixed {
            fn next_skeleton(&mut self) -> Result<Option<physio_core::Skeleton>> {
                Ok(Some(standing_skeleton()))
            }
        }

        let session = Session::new(fast_config());
        let outcome = session.calibrate_with(&mut Fixed).unwrap();
        assert_eq!(outcome, Ok(standard_metrics()));
        assert_eq!(session.metrics(), Some(standard_metrics()));
    }

    #[test]
    fn test_exercise_rejected_while_calibrating() {
        let mut session = Session::new(fast_config());
        session.start(standing_source()).unwrap();
        session.context().set_metrics(Some(standard_metrics()));
        session.select_exercise(short_exercise()).unwrap();

        session.context().begin_calibration().unwrap();
        assert!(matches!(session.start_exercise(), Err(Error::Calibration(_))));
        assert!(!session.status().exercise_active);

        session.cancel_calibration();
        session.start_exercise().unwrap();
        assert!(session.status().exercise_active);
    }

    #[test]
    fn test_calibration_rejected_during_exercise() {
        let mut session = Session::new(fast_config());
        session.start(standing_source()).unwrap();
        session.context().set_metrics(Some(standard_metrics()));

        let mut long = short_exercise();
        long.steps[0].duration_seconds = 60.0;
        session.select_exercise(long).unwrap();
        session.start_exercise().unwrap();

        assert!(matches!(session.calibrate(), Err(Error::Calibration(_))));
        struct Never;
        impl SkeletonFeed for Never {
            fn next_skeleton(&mut self) -> Result<Option<physio_core::Skeleton>> {
                Ok(None)
            }
        }
        assert!(matches!(session.calibrate_with(&mut Never), Err(Error::Calibration(_))));
        assert!(!session.status().calibrating);
        assert!(session.status().exercise_active);
    }

    #[test]
    fn test_stop_resets_exercise() {
        let mut session = Session::new(fast_config());
        session.start(standing_source()).unwrap();
        session.context().set_metrics(Some(standard_metrics()));

        let mut long = short_exercise();
        long.steps[0].duration_seconds = 60.0;
        session.select_exercise(long).unwrap();
        session.start_exercise().unwrap();
        assert_eq!(session.status().step_index, Some(0));

        session.stop().unwrap();
        let status = session.status();
        assert!(!status.running);
        assert!(!status.exercise_active);
        assert!(!status.calibrating);
        assert_eq!(status.step_index, None);
    }

    #[test]
    fn test_device_failure_stops_session() {
        let mut session = Session::new(fast_config());
        let mut rx = session.subscribe();
        let source = ScriptedSource::new(Vec::new())
            .with_interval(Duration::ZERO)
            .fail_when_exhausted();
        session.start(Box::new(source)).unwrap();

        let failed = wait_for(&mut rx, |e| matches!(e, SessionEvent::DeviceFailed { .. }));
        assert!(failed.is_some());
        assert!(!session.is_running());

        // Leftover threads are joined, and the session can start again
        session.stop().unwrap();
        session.start(standing_source()).unwrap();
        assert!(session.is_running());
    }
}
