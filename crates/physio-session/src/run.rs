//! Step scoring and hold state machine.
//!
//! Each tick scores the current skeleton against the active step. A tick
//! passes when accuracy reaches the minimum, every check is ok and the
//! motion gate is open; passing ticks accumulate a continuous hold, any
//! failing tick resets it. A step completes once the hold reaches the
//! step's duration, and the exercise completes after its last step.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use physio_core::{Skeleton, Timestamp, UserMetrics};
use physio_pose::{CheckFeedback, MotionGate, PoseEvaluator};

use crate::exercise::{ExerciseDefinition, Step};
use crate::settings::ScoringConfig;

/// Progress through an exercise
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExerciseRunState {
    pub current_step_index: usize,
    pub step_start_time: Option<Timestamp>,
    pub hold_start_time: Option<Timestamp>,
    /// Continuous hold so far (seconds)
    pub accumulated_hold: f64,
    pub exercise_active: bool,
}

impl ExerciseRunState {
    fn reset_hold(&mut self) {
        self.hold_start_time = None;
        self.accumulated_hold = 0.0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    AwaitingHold,
    Holding,
    StepComplete,
    ExerciseComplete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccuracyBand {
    Excellent,
    Passing,
    Failing,
}

impl AccuracyBand {
    pub fn classify(accuracy: f64, scoring: &ScoringConfig) -> Self {
        if accuracy >= scoring.excellent_accuracy {
            Self::Excellent
        } else if accuracy >= scoring.min_accuracy {
            Self::Passing
        } else {
            Self::Failing
        }
    }
}

/// Transitions reported to the UI and audio collaborators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExerciseEvent {
    StepStarted {
        index: usize,
        name: String,
        instructions: String,
    },
    StepCompleted {
        index: usize,
        name: String,
    },
    ExerciseCompleted {
        exercise_name: String,
    },
}

/// Per-tick state published to the UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    pub step_index: usize,
    pub step_count: usize,
    pub step_name: String,
    pub instructions: String,
    pub accuracy: f64,
    pub band: AccuracyBand,
    pub checks: Vec<CheckFeedback>,
    pub all_ok: bool,
    pub motion_detected: bool,
    pub hold_seconds: f64,
    pub remaining_seconds: f64,
    pub elapsed_seconds: f64,
    pub phase: RunPhase,
    pub events: Vec<ExerciseEvent>,
}

/// Inputs of one tick
#[derive(Debug, Clone, Copy, Default)]
pub struct TickInput<'a> {
    pub skeleton: Option<&'a Skeleton>,
    pub previous: Option<&'a Skeleton>,
    pub metrics: Option<&'a UserMetrics>,
}

/// One exercise being performed
#[derive(Debug)]
pub struct ExerciseRun {
    definition: ExerciseDefinition,
    evaluator: PoseEvaluator,
    motion: MotionGate,
    scoring: ScoringConfig,
    state: ExerciseRunState,
}

impl ExerciseRun {
    pub fn new(definition: ExerciseDefinition, scoring: &ScoringConfig) -> Self {
        Self {
            definition,
            evaluator: PoseEvaluator::standard().with_missing_joint_policy(scoring.missing_joints),
            motion: MotionGate::new(scoring.motion_threshold_mm),
            scoring: scoring.clone(),
            state: ExerciseRunState::default(),
        }
    }

    /// Replace the pose evaluator, e.g. one with extra registered predicates
    pub fn with_evaluator(mut self, evaluator: PoseEvaluator) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn definition(&self) -> &ExerciseDefinition {
        &self.definition
    }

    pub fn state(&self) -> &ExerciseRunState {
        &self.state
    }

    pub fn is_active(&self) -> bool {
        self.state.exercise_active
    }

    pub fn current_step(&self) -> Option<&Step> {
        self.definition.step(self.state.current_step_index)
    }

    /// Begin at the first step
    pub fn start(&mut self, now: Timestamp) -> ExerciseEvent {
        self.state = ExerciseRunState {
            exercise_active: true,
            step_start_time: Some(now),
            ..ExerciseRunState::default()
        };
        info!(
            "Exercise {} started ({} steps)",
            self.definition.exercise_name,
            self.definition.len()
        );
        self.step_started_event()
    }

    /// Abandon the exercise and return to the initial state
    pub fn stop(&mut self) {
        if self.state.exercise_active {
            info!("Exercise {} stopped", self.definition.exercise_name);
        }
        self.state = ExerciseRunState::default();
    }

    /// Advance the state machine by one tick.
    ///
    /// Returns `None` without touching the state when the exercise is not
    /// active or the skeleton or metrics are missing.
    pub fn tick(&mut self, input: TickInput<'_>, now: Timestamp) -> Option<TickReport> {
        if !self.state.exercise_active {
            return None;
        }
        let (Some(skeleton), Some(metrics)) = (input.skeleton, input.metrics) else {
            debug!("No skeleton or metrics available");
            return None;
        };

        let index = self.state.current_step_index;
        let step = self.definition.step(index)?;
        let duration = step.duration_seconds;

        let evaluation = self.evaluator.evaluate(skeleton, &step.requirements, metrics);
        let motion_required = self.definition.step_requires_motion(step);
        let motion_detected = self.motion.detect(motion_required, skeleton, input.previous);

        let passing =
            evaluation.accuracy >= self.scoring.min_accuracy && evaluation.all_ok && motion_detected;

        let (mut phase, remaining_seconds) = if passing {
            let start = *self.state.hold_start_time.get_or_insert(now);
            self.state.accumulated_hold = now.secs_since(start);
            (
                RunPhase::Holding,
                (duration - self.state.accumulated_hold).max(0.0),
            )
        } else {
            self.state.reset_hold();
            (RunPhase::AwaitingHold, duration)
        };
        let hold_seconds = self.state.accumulated_hold;
        let elapsed_seconds = self
            .state
            .step_start_time
            .map_or(0.0, |start| now.secs_since(start));

        debug!(
            "Step {}: accuracy={:.1}, all_ok={}, motion={}, hold={:.2}s/{}s",
            index + 1,
            evaluation.accuracy,
            evaluation.all_ok,
            motion_detected,
            hold_seconds,
            duration
        );

        let mut report = TickReport {
            step_index: index,
            step_count: self.definition.len(),
            step_name: step.name.clone(),
            instructions: step.instructions.clone(),
            accuracy: evaluation.accuracy,
            band: AccuracyBand::classify(evaluation.accuracy, &self.scoring),
            checks: evaluation.checks,
            all_ok: evaluation.all_ok,
            motion_detected,
            hold_seconds,
            remaining_seconds,
            elapsed_seconds,
            phase,
            events: Vec::new(),
        };

        if hold_seconds >= duration {
            report.events = self.complete_step(now);
            phase = if self.state.exercise_active {
                RunPhase::StepComplete
            } else {
                RunPhase::ExerciseComplete
            };
            report.phase = phase;
        }

        Some(report)
    }

    fn complete_step(&mut self, now: Timestamp) -> Vec<ExerciseEvent> {
        let index = self.state.current_step_index;
        let name = self
            .definition
            .step(index)
            .map(|s| s.name.clone())
            .unwrap_or_default();
        info!("Step {}/{} complete: {}", index + 1, self.definition.len(), name);

        let mut events = vec![ExerciseEvent::StepCompleted { index, name }];
        self.state.reset_hold();
        self.state.current_step_index += 1;

        if self.state.current_step_index >= self.definition.len() {
            info!("Exercise {} complete", self.definition.exercise_name);
            self.state = ExerciseRunState::default();
            events.push(ExerciseEvent::ExerciseCompleted {
                exercise_name: self.definition.exercise_name.clone(),
            });
        } else {
            self.state.step_start_time = Some(now);
            events.push(self.step_started_event());
        }
        events
    }

    fn step_started_event(&self) -> ExerciseEvent {
        let index = self.state.current_step_index;
        let (name, instructions) = self
            .definition
            .step(index)
            .map(|s| (s.name.clone(), s.instructions.clone()))
            .unwrap_or_default();
        ExerciseEvent::StepStarted {
            index,
            name,
            instructions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exercise::ExerciseLibrary;
    use physio_core::testing::{shifted, standard_metrics, standing_skeleton};
    use physio_core::JointName;
    use physio_pose::StepRequirements;

    const TICK_MS: i64 = 100;

    fn chin_tucks() -> ExerciseRun {
        let library = ExerciseLibrary::builtin().unwrap();
        let definition = library.get("Chin Tucks").unwrap().clone();
        ExerciseRun::new(definition, &ScoringConfig::default())
    }

    fn single_step(duration_seconds: f64) -> ExerciseRun {
        let definition = ExerciseDefinition {
            exercise_name: "Hold".into(),
            steps: vec![Step {
                name: "Stand".into(),
                instructions: String::new(),
                duration_seconds,
                requirements: StepRequirements::default()
                    .with_pose("arms_down", true)
                    .with_pose("legs_together", true),
                requires_jump: false,
            }],
        };
        ExerciseRun::new(definition, &ScoringConfig::default())
    }

    fn tucked() -> Skeleton {
        shifted(&standing_skeleton(), JointName::Head, 0.0, 0.0, 50.0)
    }

    /// Skeleton that satisfies the current Chin Tucks step
    fn pose_for(run: &ExerciseRun) -> Skeleton {
        let step = run.current_step().unwrap();
        if step.requirements.required_poses.get("head_retracted") == Some(&true) {
            tucked()
        } else {
            standing_skeleton()
        }
    }

    fn input<'a>(skeleton: &'a Skeleton, metrics: &'a UserMetrics) -> TickInput<'a> {
        TickInput {
            skeleton: Some(skeleton),
            previous: Some(skeleton),
            metrics: Some(metrics),
        }
    }

    #[test]
    fn test_chin_tucks_run_to_completion() {
        let metrics = standard_metrics();
        let mut run = chin_tucks();
        let mut now = Timestamp::from_millis(0);
        let mut events = vec![run.start(now)];

        for _ in 0..1000 {
            if !run.is_active() {
                break;
            }
            now = now.add_secs(TICK_MS as f64 / 1000.0);
            let skeleton = pose_for(&run);
            let report = run.tick(input(&skeleton, &metrics), now).unwrap();
            assert!(report.all_ok, "step {} failed: {:?}", report.step_index, report.checks);
            events.extend(report.events);
        }

        let completions: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, ExerciseEvent::ExerciseCompleted { .. }))
            .collect();
        assert_eq!(completions.len(), 1);
        assert_eq!(
            events[events.len() - 2],
            ExerciseEvent::StepCompleted {
                index: 6,
                name: "Position 7 - Neutral stance".into()
            }
        );
        let steps_completed = events
            .iter()
            .filter(|e| matches!(e, ExerciseEvent::StepCompleted { .. }))
            .count();
        assert_eq!(steps_completed, 7);

        assert!(!run.is_active());
        assert_eq!(run.state().current_step_index, 0);
        assert_eq!(*run.state(), ExerciseRunState::default());
    }

    #[test]
    fn test_step_completes_after_exact_duration() {
        let metrics = standard_metrics();
        let skeleton = standing_skeleton();
        let mut run = single_step(2.0);
        run.start(Timestamp::from_millis(0));

        // Hold starts on the first passing tick
        let first = run.tick(input(&skeleton, &metrics), Timestamp::from_millis(100)).unwrap();
        assert_eq!(first.phase, RunPhase::Holding);
        assert_eq!(first.hold_seconds, 0.0);
        assert_eq!(first.remaining_seconds, 2.0);

        let almost = run.tick(input(&skeleton, &metrics), Timestamp::from_millis(2000)).unwrap();
        assert!((almost.hold_seconds - 1.9).abs() < 1e-9);
        assert!(almost.events.is_empty());

        let done = run.tick(input(&skeleton, &metrics), Timestamp::from_millis(2100)).unwrap();
        assert_eq!(done.phase, RunPhase::ExerciseComplete);
        assert_eq!(done.remaining_seconds, 0.0);
        assert_eq!(done.events.len(), 2);
    }

    #[test]
    fn test_failing_tick_resets_hold() {
        let metrics = standard_metrics();
        let good = standing_skeleton();
        let bad = shifted(&good, JointName::RightWrist, 0.0, 700.0, 0.0);
        let mut run = single_step(5.0);
        run.start(Timestamp::from_millis(0));

        run.tick(input(&good, &metrics), Timestamp::from_millis(0));
        let held = run.tick(input(&good, &metrics), Timestamp::from_millis(3000)).unwrap();
        assert!((held.hold_seconds - 3.0).abs() < 1e-9);

        let dropped = run.tick(input(&bad, &metrics), Timestamp::from_millis(3100)).unwrap();
        assert_eq!(dropped.phase, RunPhase::AwaitingHold);
        assert_eq!(dropped.hold_seconds, 0.0);
        assert_eq!(dropped.remaining_seconds, 5.0);
        assert!(dropped.accuracy < 80.0);
        assert_eq!(dropped.band, AccuracyBand::Failing);

        let resumed = run.tick(input(&good, &metrics), Timestamp::from_millis(3200)).unwrap();
        assert_eq!(resumed.hold_seconds, 0.0);
        let later = run.tick(input(&good, &metrics), Timestamp::from_millis(4200)).unwrap();
        assert!((later.hold_seconds - 1.0).abs() < 1e-9);
        assert_eq!(run.state().current_step_index, 0);
    }

    #[test]
    fn test_missing_inputs_are_a_no_op() {
        let metrics = standard_metrics();
        let skeleton = standing_skeleton();
        let mut run = single_step(5.0);

        // Not started
        assert!(run.tick(input(&skeleton, &metrics), Timestamp::from_millis(0)).is_none());

        run.start(Timestamp::from_millis(0));
        run.tick(input(&skeleton, &metrics), Timestamp::from_millis(100));
        let before = run.state().clone();

        let no_skeleton = TickInput {
            metrics: Some(&metrics),
            ..TickInput::default()
        };
        assert!(run.tick(no_skeleton, Timestamp::from_millis(200)).is_none());
        let no_metrics = TickInput {
            skeleton: Some(&skeleton),
            ..TickInput::default()
        };
        assert!(run.tick(no_metrics, Timestamp::from_millis(300)).is_none());
        assert_eq!(*run.state(), before);
    }

    #[test]
    fn test_motion_gate_blocks_still_jumps() {
        let metrics = standard_metrics();
        let mut definition = single_step(1.0).definition().clone();
        definition.steps[0].requires_jump = true;
        let mut run = ExerciseRun::new(definition, &ScoringConfig::default());
        run.start(Timestamp::from_millis(0));

        let still = standing_skeleton();
        let report = run.tick(input(&still, &metrics), Timestamp::from_millis(100)).unwrap();
        assert!(!report.motion_detected);
        assert_eq!(report.phase, RunPhase::AwaitingHold);

        let landed = shifted(&still, JointName::RightAnkle, 0.0, 60.0, 0.0);
        let moving = TickInput {
            skeleton: Some(&landed),
            previous: Some(&still),
            metrics: Some(&metrics),
        };
        let report = run.tick(moving, Timestamp::from_millis(200)).unwrap();
        assert!(report.motion_detected);
        assert_eq!(report.phase, RunPhase::Holding);
    }

    #[test]
    fn test_stop_resets_state() {
        let metrics = standard_metrics();
        let skeleton = standing_skeleton();
        let mut run = chin_tucks();
        run.start(Timestamp::from_millis(0));
        run.tick(input(&skeleton, &metrics), Timestamp::from_millis(100));
        run.tick(input(&skeleton, &metrics), Timestamp::from_millis(2200));
        assert_eq!(run.state().current_step_index, 1);

        run.stop();
        assert_eq!(*run.state(), ExerciseRunState::default());
    }

    #[test]
    fn test_accuracy_bands() {
        let scoring = ScoringConfig::default();
        assert_eq!(AccuracyBand::classify(95.0, &scoring), AccuracyBand::Excellent);
        assert_eq!(AccuracyBand::classify(90.0, &scoring), AccuracyBand::Excellent);
        assert_eq!(AccuracyBand::classify(80.0, &scoring), AccuracyBand::Passing);
        assert_eq!(AccuracyBand::classify(79.9, &scoring), AccuracyBand::Failing);
    }
}
