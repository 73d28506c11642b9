//! Pose predicate library.
//!
//! Every predicate is an independent geometric test over a torso-normalized
//! skeleton. Predicates are looked up by name in a [`PoseRegistry`]; new pose
//! types are added by registering another [`PoseCheck`].
//!
//! Coordinates of missing joints read as 0 (see [`NormalizedSkeleton`]),
//! which can let a check pass on absent data.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use physio_core::{JointName, NormalizedSkeleton, UserMetrics};

use crate::tolerance::Tolerances;

const PASS: &str = "✓";

/// How a predicate uses the boolean a step declares for it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expectation {
    /// The pose must hold; the declared value is not consulted
    Fixed,
    /// The measured pose must equal the declared value
    Required,
}

/// Inputs shared by every predicate
#[derive(Debug, Clone, Copy)]
pub struct PoseContext<'a> {
    pub skeleton: &'a NormalizedSkeleton,
    /// Value the step declares for this pose
    pub required: bool,
    pub tolerances: &'a Tolerances,
    pub metrics: &'a UserMetrics,
}

/// Result of one predicate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseOutcome {
    pub ok: bool,
    pub message: String,
}

impl PoseOutcome {
    fn fixed(ok: bool, hint: &str) -> Self {
        Self {
            ok,
            message: if ok { PASS.to_string() } else { format!("✗ {hint}") },
        }
    }

    fn required(measured: bool, required: bool, when_required: &str, when_forbidden: &str) -> Self {
        let ok = measured == required;
        let hint = if required { when_required } else { when_forbidden };
        Self::fixed(ok, hint)
    }
}

/// A named pose check
pub trait PoseCheck: Send + Sync {
    fn name(&self) -> &str;

    fn expectation(&self) -> Expectation {
        Expectation::Fixed
    }

    /// Joints read with the zero default when absent
    fn joints(&self) -> &[JointName] {
        &[]
    }

    fn check(&self, ctx: &PoseContext<'_>) -> PoseOutcome;
}

/// Built-in pose names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoseName {
    ArmsDown,
    ArmsBentWaist,
    ArmsRaised,
    ArmsBack,
    ArmsForward,
    ArmsWShape,
    ArmsYShape,
    LegsTogether,
    LegsApart,
    LungePose,
    KneesBent,
    ShouldersRetracted,
    PelvisAnterior,
    PelvisPosterior,
    HeadRetracted,
    HeadTiltedLeft,
    HeadTiltedRight,
    SpineExtended,
}

impl PoseName {
    pub const ALL: [PoseName; 18] = [
        Self::ArmsDown,
        Self::ArmsBentWaist,
        Self::ArmsRaised,
        Self::ArmsBack,
        Self::ArmsForward,
        Self::ArmsWShape,
        Self::ArmsYShape,
        Self::LegsTogether,
        Self::LegsApart,
        Self::LungePose,
        Self::KneesBent,
        Self::ShouldersRetracted,
        Self::PelvisAnterior,
        Self::PelvisPosterior,
        Self::HeadRetracted,
        Self::HeadTiltedLeft,
        Self::HeadTiltedRight,
        Self::SpineExtended,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ArmsDown => "arms_down",
            Self::ArmsBentWaist => "arms_bent_waist",
            Self::ArmsRaised => "arms_raised",
            Self::ArmsBack => "arms_back",
            Self::ArmsForward => "arms_forward",
            Self::ArmsWShape => "arms_w_shape",
            Self::ArmsYShape => "arms_y_shape",
            Self::LegsTogether => "legs_together",
            Self::LegsApart => "legs_apart",
            Self::LungePose => "lunge_pose",
            Self::KneesBent => "knees_bent",
            Self::ShouldersRetracted => "shoulders_retracted",
            Self::PelvisAnterior => "pelvis_anterior",
            Self::PelvisPosterior => "pelvis_posterior",
            Self::HeadRetracted => "head_retracted",
            Self::HeadTiltedLeft => "head_tilted_left",
            Self::HeadTiltedRight => "head_tilted_right",
            Self::SpineExtended => "spine_extended",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|p| p.as_str() == name)
    }
}

impl fmt::Display for PoseName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type PredicateFn = fn(&PoseContext<'_>) -> PoseOutcome;

/// Function-pointer predicate used for the built-in library
struct Predicate {
    name: PoseName,
    expectation: Expectation,
    joints: &'static [JointName],
    func: PredicateFn,
}

impl PoseCheck for Predicate {
    fn name(&self) -> &str {
        self.name.as_str()
    }

    fn expectation(&self) -> Expectation {
        self.expectation
    }

    fn joints(&self) -> &[JointName] {
        self.joints
    }

    fn check(&self, ctx: &PoseContext<'_>) -> PoseOutcome {
        (self.func)(ctx)
    }
}

/// Pose-name to predicate dispatch table
pub struct PoseRegistry {
    checks: HashMap<String, Box<dyn PoseCheck>>,
}

impl PoseRegistry {
    pub fn empty() -> Self {
        Self {
            checks: HashMap::new(),
        }
    }

    /// Registry holding the 18 built-in predicates
    pub fn standard() -> Self {
        use Expectation::{Fixed, Required};
        use JointName::*;

        let builtins: [(PoseName, Expectation, &'static [JointName], PredicateFn); 18] = [
            (
                PoseName::ArmsDown,
                Fixed,
                &[RightWrist, LeftWrist, RightShoulder, LeftShoulder],
                arms_down,
            ),
            (
                PoseName::ArmsBentWaist,
                Required,
                &[RightWrist, LeftWrist, RightElbow, LeftElbow, RightHip, LeftHip],
                arms_bent_waist,
            ),
            (PoseName::ArmsRaised, Fixed, &[RightWrist, LeftWrist, Head], arms_raised),
            (PoseName::ArmsBack, Fixed, &[], arms_back),
            (PoseName::ArmsForward, Fixed, &[], arms_forward),
            (
                PoseName::ArmsWShape,
                Fixed,
                &[RightWrist, LeftWrist, RightShoulder, LeftShoulder],
                arms_w_shape,
            ),
            (PoseName::ArmsYShape, Fixed, &[RightWrist, LeftWrist, Head], arms_y_shape),
            (PoseName::LegsTogether, Fixed, &[], legs_together),
            (PoseName::LegsApart, Fixed, &[], legs_apart),
            (PoseName::LungePose, Fixed, &[], lunge_pose),
            (PoseName::KneesBent, Fixed, &[], knees_bent),
            (
                PoseName::ShouldersRetracted,
                Required,
                &[RightShoulder, LeftShoulder, LeftCollar],
                shoulders_retracted,
            ),
            (PoseName::PelvisAnterior, Fixed, &[RightHip, LeftHip, Torso], pelvis_anterior),
            (PoseName::PelvisPosterior, Fixed, &[RightHip, LeftHip, Torso], pelvis_posterior),
            (PoseName::HeadRetracted, Required, &[Head, LeftCollar], head_retracted),
            (PoseName::HeadTiltedLeft, Required, &[Head, Neck], head_tilted_left),
            (PoseName::HeadTiltedRight, Required, &[Head, Neck], head_tilted_right),
            (
                PoseName::SpineExtended,
                Required,
                &[LeftCollar, RightCollar, Torso],
                spine_extended,
            ),
        ];

        let mut registry = Self::empty();
        for (name, expectation, joints, func) in builtins {
            registry.register(Box::new(Predicate {
                name,
                expectation,
                joints,
                func,
            }));
        }
        registry
    }

    /// Add or replace a check, returning the one it displaced
    pub fn register(&mut self, check: Box<dyn PoseCheck>) -> Option<Box<dyn PoseCheck>> {
        self.checks.insert(check.name().to_string(), check)
    }

    pub fn get(&self, name: &str) -> Option<&dyn PoseCheck> {
        self.checks.get(name).map(|c| c.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.checks.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.checks.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }
}

impl Default for PoseRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl fmt::Debug for PoseRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("PoseRegistry").field("checks", &names).finish()
    }
}

// --- Arms ---

fn arms_down(ctx: &PoseContext<'_>) -> PoseOutcome {
    use JointName::*;
    let s = ctx.skeleton;
    let drop = 0.7 * ctx.metrics.arm_length - ctx.tolerances.arm_tol;

    let is_right_down = s.y(RightWrist) < s.y(RightShoulder) - drop;
    let is_left_down = s.y(LeftWrist) < s.y(LeftShoulder) - drop;
    let is_down = is_right_down && is_left_down;

    debug!("arms_down: right={}, left={}", is_right_down, is_left_down);
    PoseOutcome::fixed(is_down, "Lower your arms fully to your sides")
}

fn arms_bent_waist(ctx: &PoseContext<'_>) -> PoseOutcome {
    use JointName::*;
    let s = ctx.skeleton;
    let tol = ctx.tolerances.arm_tol;

    // Wrist sits closer to the elbow's height than to the hip's
    let bent = |wrist, elbow, hip| {
        (s.y(wrist) - s.y(elbow)).abs() < (s.y(wrist) - s.y(hip)).abs() + tol
    };
    let right_bent = bent(RightWrist, RightElbow, RightHip);
    let left_bent = bent(LeftWrist, LeftElbow, LeftHip);

    let outcome = PoseOutcome::required(
        right_bent && left_bent,
        ctx.required,
        "Place your hands on your waist",
        "Take your hands off your waist and straighten your arms",
    );
    debug!(
        "arms_bent_waist: right_bent={}, left_bent={}, required={}, ok={}",
        right_bent, left_bent, ctx.required, outcome.ok
    );
    outcome
}

fn arms_raised(ctx: &PoseContext<'_>) -> PoseOutcome {
    use JointName::*;
    let s = ctx.skeleton;
    let threshold = s.y(Head) + ctx.tolerances.arm_tol;

    let is_right_raised = s.y(RightWrist) > threshold;
    let is_left_raised = s.y(LeftWrist) > threshold;

    debug!("arms_raised: right={}, left={}", is_right_raised, is_left_raised);
    PoseOutcome::fixed(
        is_right_raised && is_left_raised,
        "Raise your arms to shoulder level or higher",
    )
}

fn arms_back(ctx: &PoseContext<'_>) -> PoseOutcome {
    use JointName::*;
    let s = ctx.skeleton;
    let tol = ctx.tolerances.arm_tol * 1.5;

    // Wrist further from the camera than the shoulder
    let side_back = |wrist, shoulder| match (s.position(wrist), s.position(shoulder)) {
        (Some(w), Some(sh)) => Some(w.z > sh.z + tol),
        _ => None,
    };
    let right = side_back(RightWrist, RightShoulder);
    let left = side_back(LeftWrist, LeftShoulder);

    // One arm back is enough
    let is_back = right.unwrap_or(false) || left.unwrap_or(false);

    debug!("arms_back: right={:?}, left={:?}", right, left);
    PoseOutcome::fixed(is_back, "Stretch your arms back to open the chest")
}

fn arms_forward(ctx: &PoseContext<'_>) -> PoseOutcome {
    use JointName::*;
    let s = ctx.skeleton;
    let tol_z = ctx.tolerances.arm_tol * 1.5;
    let tol_x = ctx.metrics.shoulder_width * 0.6;

    let side_forward = |wrist, shoulder| match (s.position(wrist), s.position(shoulder)) {
        (Some(w), Some(sh)) => Some(w.z < sh.z - tol_z && (w.x - sh.x).abs() < tol_x),
        _ => None,
    };
    let right = side_forward(RightWrist, RightShoulder);
    let left = side_forward(LeftWrist, LeftShoulder);

    // Both arms must point at the camera
    let is_forward = right.unwrap_or(false) && left.unwrap_or(false);

    debug!("arms_forward: right={:?}, left={:?}", right, left);
    PoseOutcome::fixed(
        is_forward,
        "Extend both arms forward, close together, pointing at the camera",
    )
}

fn arms_w_shape(ctx: &PoseContext<'_>) -> PoseOutcome {
    use JointName::*;
    let s = ctx.skeleton;
    let tol = ctx.tolerances.arm_tol * 0.5;

    let is_w_shape = (s.y(RightWrist) - s.y(RightShoulder)).abs() < tol
        && (s.y(LeftWrist) - s.y(LeftShoulder)).abs() < tol;

    PoseOutcome::fixed(is_w_shape, "Bring your wrists close to your shoulders (W shape)")
}

fn arms_y_shape(ctx: &PoseContext<'_>) -> PoseOutcome {
    use JointName::*;
    let s = ctx.skeleton;
    let threshold = s.y(Head) + ctx.tolerances.arm_tol * 0.1;

    let is_y_shape = s.y(RightWrist) > threshold && s.y(LeftWrist) > threshold;

    PoseOutcome::fixed(is_y_shape, "Stretch your arms up overhead (Y shape)")
}

// --- Legs ---

/// Horizontal distance between the feet, using knees when ankles are missing
fn feet_spread(s: &NormalizedSkeleton) -> (f64, f64) {
    use JointName::*;
    let right_x = s.first_present(&[RightAnkle, RightKnee]).map_or(0.0, |p| p.x);
    let left_x = s.first_present(&[LeftAnkle, LeftKnee]).map_or(0.0, |p| p.x);
    (right_x, left_x)
}

fn legs_together(ctx: &PoseContext<'_>) -> PoseOutcome {
    let (right_x, left_x) = feet_spread(ctx.skeleton);
    let is_together =
        (right_x - left_x).abs() < ctx.metrics.hip_width + ctx.tolerances.hip_tol;

    debug!(
        "legs_together: {}, right_x={:.0}, left_x={:.0}",
        is_together, right_x, left_x
    );
    PoseOutcome::fixed(is_together, "Bring your feet together")
}

fn legs_apart(ctx: &PoseContext<'_>) -> PoseOutcome {
    let (right_x, left_x) = feet_spread(ctx.skeleton);
    let is_apart = (right_x - left_x).abs() > ctx.metrics.hip_width + ctx.tolerances.hip_tol;

    debug!(
        "legs_apart: {}, right_x={:.0}, left_x={:.0}",
        is_apart, right_x, left_x
    );
    PoseOutcome::fixed(is_apart, "Spread your feet to shoulder width")
}

fn lunge_pose(ctx: &PoseContext<'_>) -> PoseOutcome {
    use JointName::*;
    let s = ctx.skeleton;
    let tol_dist = ctx.tolerances.height_tol * 0.3;
    let tol_bend = ctx.tolerances.leg_tol * 2.5;

    let has_right_knee = s.contains(RightKnee) && s.contains(RightHip);
    let has_left_knee = s.contains(LeftKnee) && s.contains(LeftHip);

    // Front/back stagger along the depth axis
    let z_diff = if has_right_knee && has_left_knee {
        (s.z(RightKnee) - s.z(LeftKnee)).abs()
    } else if s.contains(RightAnkle) && s.contains(LeftAnkle) {
        debug!("Fallback to ankles for lunge stagger check");
        (s.z(RightAnkle) - s.z(LeftAnkle)).abs()
    } else {
        0.0
    };
    let is_staggered = z_diff > tol_dist;

    // A bent knee shortens the vertical hip-to-knee extent
    let bend_limit = ctx.metrics.leg_length - tol_bend;
    let is_right_bent = has_right_knee && s.y(RightHip) - s.y(RightKnee) < bend_limit;
    let is_left_bent = has_left_knee && s.y(LeftHip) - s.y(LeftKnee) < bend_limit;

    // Without any hip/knee pair, a dropped head stands in for the bend
    let fallback = !(has_right_knee || has_left_knee)
        && s.contains(Head)
        && s.y(Head) < ctx.metrics.standing_head_y * 0.8;

    let is_bent = (is_right_bent != is_left_bent) || (fallback && !(is_right_bent && is_left_bent));
    let is_lunge = is_staggered && is_bent;

    debug!(
        "lunge_pose: staggered={} (z_diff={:.0}, tol_dist={:.0}), bent={} (right={}, left={}, fallback={})",
        is_staggered, z_diff, tol_dist, is_bent, is_right_bent, is_left_bent, fallback
    );
    PoseOutcome::fixed(
        is_lunge,
        "Step forward and bend only one knee (stay fully visible)",
    )
}

fn knees_bent(ctx: &PoseContext<'_>) -> PoseOutcome {
    use JointName::*;
    let s = ctx.skeleton;
    let tol = ctx.tolerances.height_tol * 0.15;

    // Thigh close to horizontal: hip dropped to knee height
    let side_bent = |hip, knee| match (s.position(hip), s.position(knee)) {
        (Some(h), Some(k)) => Some((h.y - k.y).abs() < tol),
        _ => None,
    };
    let right = side_bent(RightHip, RightKnee);
    let left = side_bent(LeftHip, LeftKnee);

    // Either side is enough when tracking is partial
    let is_bent = right.unwrap_or(false) || left.unwrap_or(false);

    debug!("knees_bent: right={:?}, left={:?}", right, left);
    PoseOutcome::fixed(
        is_bent,
        "Bend your knees more (lower your hips towards knee level)",
    )
}

// --- Shoulders, pelvis and spine ---

fn shoulders_retracted(ctx: &PoseContext<'_>) -> PoseOutcome {
    use JointName::*;
    let s = ctx.skeleton;
    let right_z = s.z(RightShoulder);
    let left_z = s.z(LeftShoulder);
    let collar_z = s.z(LeftCollar);
    let tol = ctx.tolerances.arm_tol * 0.1;

    let is_right_retracted = right_z > collar_z + tol;
    let is_left_retracted = left_z > collar_z + tol;
    let retracted = is_right_retracted && is_left_retracted;

    let rotated = (right_z - left_z).abs() > ctx.tolerances.arm_tol;
    let outcome = if rotated {
        PoseOutcome::required(
            retracted,
            ctx.required,
            "Squeeze your shoulder blades evenly, avoid rotating the torso",
            "Release your shoulder blades (return to neutral, avoid rotating)",
        )
    } else {
        PoseOutcome::required(
            retracted,
            ctx.required,
            "Squeeze your shoulder blades by pulling the shoulders back and slightly down",
            "Release your shoulder blades (return the shoulders to neutral)",
        )
    };

    debug!(
        "shoulders_retracted: right={} (z={:.0}), left={} (z={:.0}), collar_z={:.0}, required={}, ok={}",
        is_right_retracted, right_z, is_left_retracted, left_z, collar_z, ctx.required, outcome.ok
    );
    outcome
}

fn mean_hip_z(s: &NormalizedSkeleton) -> f64 {
    (s.z(JointName::RightHip) + s.z(JointName::LeftHip)) / 2.0
}

fn pelvis_anterior(ctx: &PoseContext<'_>) -> PoseOutcome {
    let s = ctx.skeleton;
    let tol = ctx.tolerances.height_tol * 0.15;
    let is_anterior = mean_hip_z(s) > s.z(JointName::Torso) + tol;
    PoseOutcome::fixed(is_anterior, "Push your hips back")
}

fn pelvis_posterior(ctx: &PoseContext<'_>) -> PoseOutcome {
    let s = ctx.skeleton;
    let tol = ctx.tolerances.height_tol * 0.05;
    let is_posterior = mean_hip_z(s) < s.z(JointName::Torso) + tol;
    PoseOutcome::fixed(is_posterior, "Tuck your hips forward")
}

fn spine_extended(ctx: &PoseContext<'_>) -> PoseOutcome {
    use JointName::*;
    let s = ctx.skeleton;
    let collar_z = (s.z(LeftCollar) + s.z(RightCollar)) / 2.0;
    let torso_z = s.z(Torso);

    // Collar behind the torso means the upper back is leaning back
    let is_extended = collar_z > torso_z;
    let outcome = PoseOutcome::required(
        is_extended,
        ctx.required,
        "Extend your spine (lean back from the hips)",
        "Return to neutral (do not overextend the spine)",
    );

    debug!(
        "spine_extended: is_extended={}, collar_z={:.0}, torso_z={:.0}, required={}, ok={}",
        is_extended, collar_z, torso_z, ctx.required, outcome.ok
    );
    outcome
}

// --- Head ---

fn head_retracted(ctx: &PoseContext<'_>) -> PoseOutcome {
    use JointName::*;
    let s = ctx.skeleton;
    let head_z = s.z(Head);
    let collar_z = s.z(LeftCollar);
    let tol = ctx.tolerances.height_tol * 0.01;

    let is_retracted = head_z > collar_z + tol;
    let outcome = PoseOutcome::required(
        is_retracted,
        ctx.required,
        "Tuck your chin back",
        "Return your head to neutral (do not tuck the chin)",
    );

    debug!(
        "head_retracted: is_retracted={} (z={:.0}), collar_z={:.0}, required={}, ok={}",
        is_retracted, head_z, collar_z, ctx.required, outcome.ok
    );
    outcome
}

/// Sideways head offset relative to the neck
fn head_offset(s: &NormalizedSkeleton) -> f64 {
    s.x(JointName::Head) - s.x(JointName::Neck)
}

fn head_tilted_left(ctx: &PoseContext<'_>) -> PoseOutcome {
    let tol = ctx.tolerances.height_tol * 0.05;
    let offset = head_offset(ctx.skeleton);

    // The camera image is mirrored: the user's left is +X
    let is_tilted = offset > tol;
    let outcome = PoseOutcome::required(
        is_tilted,
        ctx.required,
        "Tilt your head to the left",
        "Do not tilt your head to the left (return to neutral)",
    );

    debug!(
        "head_tilted_left: {}, offset={:.0}, required={}, ok={}",
        is_tilted, offset, ctx.required, outcome.ok
    );
    outcome
}

fn head_tilted_right(ctx: &PoseContext<'_>) -> PoseOutcome {
    let tol = ctx.tolerances.height_tol * 0.05;
    let offset = head_offset(ctx.skeleton);

    let is_tilted = offset < -tol;
    let outcome = PoseOutcome::required(
        is_tilted,
        ctx.required,
        "Tilt your head to the right",
        "Do not tilt your head to the right (return to neutral)",
    );

    debug!(
        "head_tilted_right: {}, offset={:.0}, required={}, ok={}",
        is_tilted, offset, ctx.required, outcome.ok
    );
    outcome
}
