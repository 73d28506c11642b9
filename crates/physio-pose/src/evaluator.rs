//! Step evaluation: runs a step's pose and angle checks over one skeleton
//! and aggregates them into an accuracy score.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use physio_core::{Skeleton, UserMetrics};

use crate::angles::evaluate_angle;
use crate::normalize::normalize;
use crate::predicates::{PoseContext, PoseName, PoseOutcome, PoseRegistry};
use crate::tolerance::{StepTolerance, Tolerances};

/// How pose predicates treat joints that are not tracked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MissingJointPolicy {
    /// Missing coordinates read as 0
    #[default]
    ZeroDefault,
    /// A predicate fails when a joint it reads is missing
    FailCheck,
}

/// Pose and angle targets of one exercise step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepRequirements {
    /// Pose name to the value the step requires
    #[serde(default)]
    pub required_poses: BTreeMap<String, bool>,
    /// Angle name to target degrees
    #[serde(default)]
    pub target_angles: BTreeMap<String, f64>,
    #[serde(default)]
    pub tolerance: StepTolerance,
}

impl StepRequirements {
    pub fn with_pose(mut self, name: impl Into<String>, required: bool) -> Self {
        self.required_poses.insert(name.into(), required);
        self
    }

    pub fn with_angle(mut self, name: impl Into<String>, target: f64) -> Self {
        self.target_angles.insert(name.into(), target);
        self
    }

    pub fn with_tolerance(mut self, tolerance: StepTolerance) -> Self {
        self.tolerance = tolerance;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    Pose,
    Angle,
}

/// One scored check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckFeedback {
    pub name: String,
    pub kind: CheckKind,
    pub ok: bool,
    pub score: f64,
    pub message: String,
}

/// Aggregate result for one skeleton against one step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoseEvaluation {
    /// Mean check score, 0 when there are no checks
    pub accuracy: f64,
    pub all_ok: bool,
    pub checks: Vec<CheckFeedback>,
}

impl PoseEvaluation {
    /// `name: message` lines, one per check
    pub fn detailed_feedback(&self) -> String {
        self.checks
            .iter()
            .map(|c| format!("{}: {}", c.name, c.message))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn check(&self, name: &str) -> Option<&CheckFeedback> {
        self.checks.iter().find(|c| c.name == name)
    }

    fn from_checks(checks: Vec<CheckFeedback>) -> Self {
        let accuracy = if checks.is_empty() {
            0.0
        } else {
            checks.iter().map(|c| c.score).sum::<f64>() / checks.len() as f64
        };
        let all_ok = checks.iter().all(|c| c.ok);
        Self {
            accuracy,
            all_ok,
            checks,
        }
    }
}

/// Scores skeletons against step requirements
#[derive(Debug, Default)]
pub struct PoseEvaluator {
    registry: PoseRegistry,
    missing_joints: MissingJointPolicy,
}

impl PoseEvaluator {
    pub fn new(registry: PoseRegistry) -> Self {
        Self {
            registry,
            missing_joints: MissingJointPolicy::default(),
        }
    }

    /// Evaluator over the built-in predicates
    pub fn standard() -> Self {
        Self::new(PoseRegistry::standard())
    }

    pub fn with_missing_joint_policy(mut self, policy: MissingJointPolicy) -> Self {
        self.missing_joints = policy;
        self
    }

    pub fn registry(&self) -> &PoseRegistry {
        &self.registry
    }

    pub fn missing_joint_policy(&self) -> MissingJointPolicy {
        self.missing_joints
    }

    /// Run every pose and angle check of `step` over `skeleton`.
    ///
    /// Poses come first (unknown names are skipped, `arms_down` and
    /// `arms_forward` are skipped when declared false), then angles.
    pub fn evaluate(
        &self,
        skeleton: &Skeleton,
        step: &StepRequirements,
        metrics: &UserMetrics,
    ) -> PoseEvaluation {
        let normalized = normalize(skeleton);
        let tolerances = Tolerances::for_step(&step.tolerance, metrics);
        let mut checks = Vec::with_capacity(step.required_poses.len() + step.target_angles.len());

        for (name, &required) in &step.required_poses {
            let skippable = matches!(
                PoseName::parse(name),
                Some(PoseName::ArmsDown | PoseName::ArmsForward)
            );
            if skippable && !required {
                continue;
            }

            let Some(check) = self.registry.get(name) else {
                debug!("No predicate registered for pose {}", name);
                continue;
            };

            let outcome = match self.missing_joints {
                MissingJointPolicy::FailCheck
                    if check.joints().iter().any(|&j| !normalized.contains(j)) =>
                {
                    debug!("{}: required joints missing", name);
                    PoseOutcome {
                        ok: false,
                        message: format!("✗ {name}: not detected"),
                    }
                }
                _ => check.check(&PoseContext {
                    skeleton: &normalized,
                    required,
                    tolerances: &tolerances,
                    metrics,
                }),
            };

            checks.push(CheckFeedback {
                name: name.clone(),
                kind: CheckKind::Pose,
                ok: outcome.ok,
                score: if outcome.ok { 100.0 } else { 0.0 },
                message: outcome.message,
            });
        }

        for (name, &target) in &step.target_angles {
            let angle = evaluate_angle(name, target, skeleton, &normalized, &step.tolerance);
            checks.push(CheckFeedback {
                name: name.clone(),
                kind: CheckKind::Angle,
                ok: angle.ok,
                score: angle.score,
                message: angle.message,
            });
        }

        let evaluation = PoseEvaluation::from_checks(checks);
        debug!(
            "Evaluation: accuracy={:.1}, all_ok={}, checks={}",
            evaluation.accuracy,
            evaluation.all_ok,
            evaluation.checks.len()
        );
        evaluation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use physio_core::testing::{shifted, standard_metrics, standing_skeleton, without};
    use physio_core::JointName;

    fn scenario_step() -> StepRequirements {
        StepRequirements::default()
            .with_pose("arms_down", true)
            .with_angle("right_elbow_angle", 160.0)
            .with_tolerance(StepTolerance {
                angle_tolerance: 20.0,
                distance_tolerance: 0.15,
            })
    }

    #[test]
    fn test_arms_down_with_elbow_target() {
        let evaluation = PoseEvaluator::standard().evaluate(
            &standing_skeleton(),
            &scenario_step(),
            &standard_metrics(),
        );
        assert_eq!(evaluation.checks.len(), 2);
        assert!((evaluation.accuracy - 100.0).abs() < 1e-9);
        assert!(evaluation.all_ok);
    }

    #[test]
    fn test_missing_right_wrist() {
        // arms_down reads the missing wrist at y=0: 0 < 300 - (420 - 90) is false.
        // The elbow angle lacks its wrist and fails without measuring.
        let skeleton = without(&standing_skeleton(), &[JointName::RightWrist]);
        let evaluation =
            PoseEvaluator::standard().evaluate(&skeleton, &scenario_step(), &standard_metrics());

        assert_eq!(evaluation.checks.len(), 2);
        assert!(!evaluation.check("arms_down").unwrap().ok);
        assert_eq!(
            evaluation.check("right_elbow_angle").unwrap().message,
            "✗ no skeleton data"
        );
        assert_eq!(evaluation.accuracy, 0.0);
        assert!(!evaluation.all_ok);
    }

    #[test]
    fn test_false_arms_down_and_forward_are_skipped() {
        let step = StepRequirements::default()
            .with_pose("arms_down", false)
            .with_pose("arms_forward", false)
            .with_pose("legs_together", true);
        let evaluation =
            PoseEvaluator::standard().evaluate(&standing_skeleton(), &step, &standard_metrics());
        assert_eq!(evaluation.checks.len(), 1);
        assert_eq!(evaluation.checks[0].name, "legs_together");
    }

    #[test]
    fn test_unknown_pose_skipped_unknown_angle_counted() {
        let step = StepRequirements::default()
            .with_pose("arms_akimbo", true)
            .with_angle("neck_angle", 30.0);
        let evaluation =
            PoseEvaluator::standard().evaluate(&standing_skeleton(), &step, &standard_metrics());
        assert_eq!(evaluation.checks.len(), 1);
        assert_eq!(evaluation.checks[0].kind, CheckKind::Angle);
        assert!(!evaluation.all_ok);
    }

    #[test]
    fn test_no_checks() {
        let evaluation = PoseEvaluator::standard().evaluate(
            &standing_skeleton(),
            &StepRequirements::default(),
            &standard_metrics(),
        );
        assert_eq!(evaluation.accuracy, 0.0);
        assert!(evaluation.checks.is_empty());
    }

    #[test]
    fn test_mixed_scores_average() {
        let step = StepRequirements::default()
            .with_pose("legs_together", true)
            .with_pose("arms_raised", true)
            .with_angle("left_arm_angle", 30.0);
        let evaluation =
            PoseEvaluator::standard().evaluate(&standing_skeleton(), &step, &standard_metrics());
        // 100 + 0 + 25
        assert!((evaluation.accuracy - 125.0 / 3.0).abs() < 1e-6);
        assert!(!evaluation.all_ok);
        assert_eq!(
            evaluation.detailed_feedback().lines().next(),
            Some("arms_raised: ✗ Raise your arms to shoulder level or higher")
        );
    }

    #[test]
    fn test_fail_check_policy() {
        let step = StepRequirements::default().with_pose("head_tilted_left", false);
        let headless = without(&standing_skeleton(), &[JointName::Head, JointName::Neck]);

        // Zero default: head and neck both read x=0, which looks untilted
        let lenient = PoseEvaluator::standard().evaluate(&headless, &step, &standard_metrics());
        assert!(lenient.all_ok);

        let strict = PoseEvaluator::standard()
            .with_missing_joint_policy(MissingJointPolicy::FailCheck)
            .evaluate(&headless, &step, &standard_metrics());
        assert!(!strict.all_ok);
        assert_eq!(strict.checks[0].message, "✗ head_tilted_left: not detected");

        // Tracked joints are evaluated normally under the strict policy
        let tilted = shifted(&standing_skeleton(), JointName::Head, 100.0, 0.0, 0.0);
        let strict = PoseEvaluator::standard()
            .with_missing_joint_policy(MissingJointPolicy::FailCheck)
            .evaluate(&tilted, &step, &standard_metrics());
        assert!(!strict.all_ok);
        assert!(strict.checks[0].message.contains("return to neutral"));
    }

    #[test]
    fn test_requirements_deserialize_with_defaults() {
        let step: StepRequirements =
            serde_json::from_str(r#"{"required_poses":{"head_retracted":true}}"#).unwrap();
        assert!(step.target_angles.is_empty());
        assert_eq!(step.tolerance, StepTolerance::default());

        let policy: MissingJointPolicy = serde_json::from_str("\"fail-check\"").unwrap();
        assert_eq!(policy, MissingJointPolicy::FailCheck);
    }
}
