//! Rocket animators.
//!
//! Server messages only move the *target* (through [`Animator::update_target`]
//! and friends); [`Animator::tick`] alone integrates the current position.
//! [`SmoothAnimator`] chases the target with frame-rate independent
//! exponential smoothing. [`NullAnimator`] honours the same contract without
//! moving anything and is used when no drawable surface is available.

use crate::scheduler::FrameClock;
use crate::trajectory::{target_pose, wrap_angle, Bounds, Vec2};
use skyrocket_types::BASE_MULTIPLIER;
use std::time::Instant;
use tracing::debug;

/// Distance under which the rocket snaps onto its target.
pub const SNAP_DISTANCE: f64 = 0.5;

/// Seconds over which the crash fall reaches full depth.
pub const CRASH_FALL_SECS: f64 = 5.0;

/// How far below the canvas the fall ends.
pub const CRASH_FALL_OVERSHOOT: f64 = 100.0;

/// Horizontal sway amplitude while falling.
pub const CRASH_SWAY: f64 = 15.0;

/// Spin rate while falling, in radians per second.
pub const CRASH_SPIN: f64 = 1.2;

/// Lowest opacity reached while falling.
pub const CRASH_MIN_ALPHA: f64 = 0.3;

const ROTATION_SNAP: f64 = 1e-3;

/// Smoothing constants for the chase loop.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MotionTuning {
    /// Desired velocity per unit of distance to the target (1/s).
    pub stiffness: f64,
    /// How quickly velocity converges on the desired velocity (1/s).
    pub response: f64,
    pub rotation_stiffness: f64,
    pub rotation_response: f64,
}

impl Default for MotionTuning {
    fn default() -> Self {
        Self {
            stiffness: 4.0,
            response: 10.0,
            rotation_stiffness: 6.0,
            rotation_response: 12.0,
        }
    }
}

/// Which animator to construct.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Backend {
    #[default]
    Smooth,
    Null,
}

/// Snapshot of what should be drawn.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnimatorState {
    pub position: Vec2,
    pub rotation: f64,
    pub alpha: f64,
    pub velocity: Vec2,
    pub multiplier: f64,
    /// Chasing a multiplier target.
    pub active: bool,
    pub crashing: bool,
    pub visible: bool,
    pub using_fallback: bool,
}

pub trait Animator: Send {
    /// Begin a round from the launch position.
    fn start(&mut self, now: Instant);
    /// Begin mid-round: jump straight to `multiplier` without a sweep.
    fn start_from(&mut self, multiplier: f64, now: Instant);
    fn update_target(&mut self, multiplier: f64);
    /// Switch to the crash fall from the current position.
    fn crash(&mut self, now: Instant);
    fn stop(&mut self);
    /// Park the rocket on the launch position.
    fn reset(&mut self);
    fn resize(&mut self, bounds: Bounds);
    fn set_visible(&mut self, visible: bool, now: Instant);
    fn tick(&mut self, now: Instant);
    fn state(&self) -> AnimatorState;
}

/// Construct the animator for `backend`. Called once per session.
pub fn select(backend: Backend, bounds: Bounds) -> Box<dyn Animator> {
    debug!(?backend, width = bounds.width, height = bounds.height, "selecting animator");
    match backend {
        Backend::Smooth => Box::new(SmoothAnimator::new(bounds, MotionTuning::default())),
        Backend::Null => Box::new(NullAnimator::new(bounds)),
    }
}

#[derive(Clone, Copy, Debug)]
struct CrashFall {
    origin: Vec2,
    rotation: f64,
    elapsed: f64,
}

#[derive(Debug)]
pub struct SmoothAnimator {
    bounds: Bounds,
    tuning: MotionTuning,
    clock: FrameClock,
    current: Vec2,
    target: Vec2,
    velocity: Vec2,
    rotation: f64,
    target_rotation: f64,
    rotation_velocity: f64,
    alpha: f64,
    multiplier: f64,
    active: bool,
    crash: Option<CrashFall>,
    visible: bool,
}

impl SmoothAnimator {
    pub fn new(bounds: Bounds, tuning: MotionTuning) -> Self {
        let mut animator = Self {
            bounds,
            tuning,
            clock: FrameClock::default(),
            current: Vec2::ZERO,
            target: Vec2::ZERO,
            velocity: Vec2::ZERO,
            rotation: 0.0,
            target_rotation: 0.0,
            rotation_velocity: 0.0,
            alpha: 1.0,
            multiplier: BASE_MULTIPLIER,
            active: false,
            crash: None,
            visible: true,
        };
        animator.park();
        animator
    }

    fn park(&mut self) {
        let launch = self.bounds.launch_point();
        self.current = launch;
        self.target = launch;
        self.velocity = Vec2::ZERO;
        self.rotation = target_pose(BASE_MULTIPLIER, &self.bounds).rotation;
        self.target_rotation = self.rotation;
        self.rotation_velocity = 0.0;
        self.alpha = 1.0;
        self.multiplier = BASE_MULTIPLIER;
    }

    fn jump_to_target(&mut self) {
        let pose = target_pose(self.multiplier, &self.bounds);
        self.current = pose.position;
        self.target = pose.position;
        self.velocity = Vec2::ZERO;
        self.rotation = pose.rotation;
        self.target_rotation = pose.rotation;
        self.rotation_velocity = 0.0;
    }

    fn chase(&mut self, dt: f64) {
        let delta = self.target - self.current;
        if delta.length() < SNAP_DISTANCE {
            self.current = self.target;
            self.velocity = Vec2::ZERO;
        } else {
            let blend = 1.0 - (-self.tuning.response * dt).exp();
            let desired = delta * self.tuning.stiffness;
            self.velocity += (desired - self.velocity) * blend;
            self.current += self.velocity * dt;
        }

        let diff = wrap_angle(self.target_rotation - self.rotation);
        if diff.abs() < ROTATION_SNAP {
            self.rotation = self.target_rotation;
            self.rotation_velocity = 0.0;
        } else {
            let blend = 1.0 - (-self.tuning.rotation_response * dt).exp();
            let desired = diff * self.tuning.rotation_stiffness;
            self.rotation_velocity += (desired - self.rotation_velocity) * blend;
            self.rotation = wrap_angle(self.rotation + self.rotation_velocity * dt);
        }

        let clamped = self.bounds.clamp(self.current);
        if clamped.x != self.current.x {
            self.velocity.x = 0.0;
        }
        if clamped.y != self.current.y {
            self.velocity.y = 0.0;
        }
        self.current = clamped;
    }

    fn fall(&mut self, dt: f64) {
        let Some(fall) = self.crash.as_mut() else {
            return;
        };
        fall.elapsed += dt;
        let t = fall.elapsed;
        let p = (t / CRASH_FALL_SECS).min(1.0);
        let depth = self.bounds.height - fall.origin.y + CRASH_FALL_OVERSHOOT;
        self.current = Vec2::new(
            fall.origin.x + (2.0 * t).sin() * CRASH_SWAY,
            fall.origin.y + p * p * depth,
        );
        self.rotation = fall.rotation + CRASH_SPIN * t;
        self.alpha = (1.0 - 0.7 * p).max(CRASH_MIN_ALPHA);
    }
}

impl Animator for SmoothAnimator {
    fn start(&mut self, now: Instant) {
        self.park();
        self.crash = None;
        self.active = true;
        let pose = target_pose(BASE_MULTIPLIER, &self.bounds);
        self.target = pose.position;
        self.target_rotation = pose.rotation;
        self.clock.rebase(now);
    }

    fn start_from(&mut self, multiplier: f64, now: Instant) {
        self.crash = None;
        self.active = true;
        self.alpha = 1.0;
        self.multiplier = multiplier.max(BASE_MULTIPLIER);
        self.jump_to_target();
        self.clock.rebase(now);
    }

    fn update_target(&mut self, multiplier: f64) {
        if self.crash.is_some() {
            return;
        }
        self.multiplier = multiplier.max(BASE_MULTIPLIER);
        let pose = target_pose(self.multiplier, &self.bounds);
        self.target = pose.position;
        self.target_rotation = pose.rotation;
    }

    fn crash(&mut self, now: Instant) {
        self.active = false;
        self.velocity = Vec2::ZERO;
        self.rotation_velocity = 0.0;
        self.crash = Some(CrashFall {
            origin: self.current,
            rotation: self.rotation,
            elapsed: 0.0,
        });
        self.clock.rebase(now);
    }

    fn stop(&mut self) {
        self.active = false;
        self.crash = None;
        self.velocity = Vec2::ZERO;
        self.rotation_velocity = 0.0;
    }

    fn reset(&mut self) {
        self.stop();
        self.park();
    }

    fn resize(&mut self, bounds: Bounds) {
        self.bounds = bounds;
        if self.crash.is_some() {
            return;
        }
        if self.active {
            self.jump_to_target();
        } else {
            self.park();
        }
    }

    fn set_visible(&mut self, visible: bool, now: Instant) {
        self.visible = visible;
        if visible {
            self.clock.rebase(now);
        }
    }

    fn tick(&mut self, now: Instant) {
        if !self.visible {
            return;
        }
        let dt = self.clock.advance(now);
        if self.crash.is_some() {
            self.fall(dt);
        } else if self.active {
            self.chase(dt);
        }
    }

    fn state(&self) -> AnimatorState {
        AnimatorState {
            position: self.current,
            rotation: self.rotation,
            alpha: self.alpha,
            velocity: self.velocity,
            multiplier: self.multiplier,
            active: self.active,
            crashing: self.crash.is_some(),
            visible: self.visible,
            using_fallback: false,
        }
    }
}

/// Stand-in that tracks the round flags but never moves the rocket.
#[derive(Debug)]
pub struct NullAnimator {
    bounds: Bounds,
    multiplier: f64,
    active: bool,
    crashing: bool,
    visible: bool,
}

impl NullAnimator {
    pub fn new(bounds: Bounds) -> Self {
        Self {
            bounds,
            multiplier: BASE_MULTIPLIER,
            active: false,
            crashing: false,
            visible: true,
        }
    }
}

impl Animator for NullAnimator {
    fn start(&mut self, _now: Instant) {
        self.multiplier = BASE_MULTIPLIER;
        self.active = true;
        self.crashing = false;
    }

    fn start_from(&mut self, multiplier: f64, _now: Instant) {
        self.multiplier = multiplier.max(BASE_MULTIPLIER);
        self.active = true;
        self.crashing = false;
    }

    fn update_target(&mut self, multiplier: f64) {
        if !self.crashing {
            self.multiplier = multiplier.max(BASE_MULTIPLIER);
        }
    }

    fn crash(&mut self, _now: Instant) {
        self.active = false;
        self.crashing = true;
    }

    fn stop(&mut self) {
        self.active = false;
        self.crashing = false;
    }

    fn reset(&mut self) {
        self.stop();
        self.multiplier = BASE_MULTIPLIER;
    }

    fn resize(&mut self, bounds: Bounds) {
        self.bounds = bounds;
    }

    fn set_visible(&mut self, visible: bool, _now: Instant) {
        self.visible = visible;
    }

    fn tick(&mut self, _now: Instant) {}

    fn state(&self) -> AnimatorState {
        AnimatorState {
            position: self.bounds.launch_point(),
            rotation: 0.0,
            alpha: 1.0,
            velocity: Vec2::ZERO,
            multiplier: self.multiplier,
            active: self.active,
            crashing: self.crashing,
            visible: self.visible,
            using_fallback: true,
        }
    }
}
