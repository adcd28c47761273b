// ==============================================================================
// control.rs — KEYBOARD STATE -> DRIVE / STEER / BRAKE (PER TICK)
// ------------------------------------------------------------------------------
// Two laws, one per vehicle model:
//
// HingeControl (motorized hinges):
//   forward_velocity  ±0.1/tick within ±10, coasts to 0 at 0.05/tick,
//                     brake pulls it to 0 at 0.3/tick
//   right_velocity    ±0.05/tick within ±0.5, recenters at 0.05/tick
//   -> rear hinge motor target speed, hinge axis lateral skew
//
// RaycastControl (raycast vehicle, speed telemetry in km/h):
//   acceleration      +590 forward / -196.67 backward while speed is inside
//                     [-50, 325], engine braking of 50 against motion when idle
//   steering_angle    ±0.05/tick within ±0.5 rad, recenters at 0.05/tick
//   brake_force       17 while braking and moving, else exactly 0
//   -> engine force + brake on rear wheels (2, 3), steering on front (0, 1)
//
// Conflicts: left+right (and, for hinges, forward+backward) are applied in
// sequence and cancel. Raycast throttle uses brake > backward > forward.
// All steps clamp to their bounds; decays never cross zero.
// ==============================================================================

use serde::{Deserialize, Serialize};

use crate::input::DriverInput;

/// Moves `value` toward `target` by at most `step`, landing exactly on
/// `target` instead of crossing it.
#[inline]
pub fn approach(value: f32, target: f32, step: f32) -> f32 {
    if value > target {
        (value - step).max(target)
    } else if value < target {
        (value + step).min(target)
    } else {
        value
    }
}

// ============================================
// ----- hinge-motor law ----------------------
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HingeControlTuning {
    pub drive_step: f32,    // per tick
    pub max_velocity: f32,  // motor target bound (both directions)
    pub coast_decay: f32,   // per tick, no drive key
    pub brake_decay: f32,   // per tick, brake key
    pub steer_step: f32,    // per tick
    pub max_steer: f32,     // axis skew bound
    pub steer_relax: f32,   // per tick, no steer key
}

impl Default for HingeControlTuning {
    fn default() -> Self {
        Self {
            drive_step: 0.1,
            max_velocity: 10.0,
            coast_decay: 0.05,
            brake_decay: 0.3,
            steer_step: 0.05,
            max_steer: 0.5,
            steer_relax: 0.05,
        }
    }
}

/// What the hinge vehicle receives each tick.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HingeCommand {
    pub motor_speed: f32,
    pub axis_skew: f32,
}

#[derive(Debug, Clone, Default)]
pub struct HingeControl {
    pub tuning: HingeControlTuning,
    pub forward_velocity: f32,
    pub right_velocity: f32,
}

impl HingeControl {
    pub fn new(tuning: HingeControlTuning) -> Self {
        Self {
            tuning,
            forward_velocity: 0.0,
            right_velocity: 0.0,
        }
    }

    pub fn update(&mut self, input: &DriverInput) -> HingeCommand {
        let t = &self.tuning;

        if input.forward {
            self.forward_velocity = (self.forward_velocity + t.drive_step).min(t.max_velocity);
        }
        if input.backward {
            self.forward_velocity = (self.forward_velocity - t.drive_step).max(-t.max_velocity);
        }
        if input.left {
            self.right_velocity = (self.right_velocity - t.steer_step).max(-t.max_steer);
        }
        if input.right {
            self.right_velocity = (self.right_velocity + t.steer_step).min(t.max_steer);
        }
        if input.brake {
            self.forward_velocity = approach(self.forward_velocity, 0.0, t.brake_decay);
        }

        if !input.driving() {
            self.forward_velocity = approach(self.forward_velocity, 0.0, t.coast_decay);
        }
        if !input.steering() {
            self.right_velocity = approach(self.right_velocity, 0.0, t.steer_relax);
        }

        self.command()
    }

    pub fn command(&self) -> HingeCommand {
        HingeCommand {
            motor_speed: self.forward_velocity,
            axis_skew: self.right_velocity,
        }
    }
}

// ============================================
// ----- raycast-vehicle law ------------------
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RaycastControlTuning {
    pub forward_force: f32,     // engine force, forward
    pub backward_force: f32,    // engine force, reverse (negative)
    pub max_fw_velocity: f32,   // km/h
    pub max_bw_velocity: f32,   // km/h (negative)
    pub engine_brake: f32,      // engine force magnitude when coasting
    pub coast_threshold: f32,   // km/h below which coasting applies nothing
    pub brake_force: f32,       // per braked wheel
    pub steer_step: f32,        // rad per tick
    pub max_steer: f32,         // rad
    pub steer_relax: f32,       // rad per tick
}

impl Default for RaycastControlTuning {
    fn default() -> Self {
        Self {
            forward_force: 590.0,
            backward_force: -196.67,
            max_fw_velocity: 325.0,
            max_bw_velocity: -50.0,
            engine_brake: 50.0,
            coast_threshold: 0.05,
            brake_force: 17.0,
            steer_step: 0.05,
            max_steer: 0.5,
            steer_relax: 0.05,
        }
    }
}

/// Resolved throttle intent for the raycast law.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Throttle {
    Brake,
    Backward,
    Forward,
    Coast,
}

impl Throttle {
    /// brake > backward > forward
    pub fn resolve(input: &DriverInput) -> Self {
        if input.brake {
            Throttle::Brake
        } else if input.backward {
            Throttle::Backward
        } else if input.forward {
            Throttle::Forward
        } else {
            Throttle::Coast
        }
    }
}

/// What the raycast vehicle receives each tick.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RaycastCommand {
    pub engine_force: f32,
    pub steering: f32,
    pub brake: f32,
}

impl RaycastCommand {
    pub const DRIVEN_WHEELS: [usize; 2] = [2, 3];
    pub const STEERED_WHEELS: [usize; 2] = [0, 1];
    pub const BRAKED_WHEELS: [usize; 2] = [2, 3];
}

#[derive(Debug, Clone, Default)]
pub struct RaycastControl {
    pub tuning: RaycastControlTuning,
    pub acceleration: f32,
    pub steering_angle: f32,
    pub brake_force: f32,
}

impl RaycastControl {
    pub fn new(tuning: RaycastControlTuning) -> Self {
        Self {
            tuning,
            acceleration: 0.0,
            steering_angle: 0.0,
            brake_force: 0.0,
        }
    }

    /// `speed_kmh` is signed: negative while rolling backwards.
    pub fn update(&mut self, input: &DriverInput, speed_kmh: f32) -> RaycastCommand {
        let t = &self.tuning;

        self.acceleration = match Throttle::resolve(input) {
            Throttle::Brake => {
                if input.driving() {
                    0.0
                } else {
                    engine_braking(t, speed_kmh)
                }
            }
            Throttle::Backward => {
                if speed_kmh > t.max_bw_velocity { t.backward_force } else { 0.0 }
            }
            Throttle::Forward => {
                if speed_kmh < t.max_fw_velocity { t.forward_force } else { 0.0 }
            }
            Throttle::Coast => engine_braking(t, speed_kmh),
        };

        self.brake_force = if input.brake && speed_kmh != 0.0 { t.brake_force } else { 0.0 };

        if input.left {
            self.steering_angle = (self.steering_angle + t.steer_step).min(t.max_steer);
        }
        if input.right {
            self.steering_angle = (self.steering_angle - t.steer_step).max(-t.max_steer);
        }
        if !input.steering() {
            self.steering_angle = approach(self.steering_angle, 0.0, t.steer_relax);
        }

        self.command()
    }

    pub fn command(&self) -> RaycastCommand {
        RaycastCommand {
            engine_force: self.acceleration,
            steering: self.steering_angle,
            brake: self.brake_force,
        }
    }
}

fn engine_braking(t: &RaycastControlTuning, speed_kmh: f32) -> f32 {
    if speed_kmh.abs() > t.coast_threshold {
        -t.engine_brake * speed_kmh.signum()
    } else {
        0.0
    }
}

/// Per-variant control state owned by the simulation context.
#[derive(Debug, Clone)]
pub enum ControlLaw {
    Hinge(HingeControl),
    Raycast(RaycastControl),
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn held(f: impl FnOnce(&mut DriverInput)) -> DriverInput {
        let mut input = DriverInput::default();
        f(&mut input);
        input
    }

    #[test]
    fn test_approach_never_crosses() {
        assert_eq!(approach(0.02, 0.0, 0.05), 0.0);
        assert_eq!(approach(-0.02, 0.0, 0.05), 0.0);
        assert_relative_eq!(approach(1.0, 0.0, 0.3), 0.7);
        assert_eq!(approach(0.0, 0.0, 0.3), 0.0);
    }

    #[test]
    fn test_hinge_forward_accumulates_and_clamps() {
        let mut law = HingeControl::new(HingeControlTuning::default());
        let fwd = held(|i| i.forward = true);
        for _ in 0..30 {
            law.update(&fwd);
        }
        assert_relative_eq!(law.forward_velocity, 3.0, epsilon = 1e-4);
        for _ in 0..200 {
            law.update(&fwd);
        }
        assert_eq!(law.forward_velocity, 10.0);
    }

    #[test]
    fn test_hinge_forward_and_backward_cancel() {
        let mut law = HingeControl::new(HingeControlTuning::default());
        let both = held(|i| {
            i.forward = true;
            i.backward = true;
        });
        law.update(&both);
        assert_eq!(law.forward_velocity, 0.0);
    }

    #[test]
    fn test_hinge_brake_and_coast_stack() {
        let mut law = HingeControl::new(HingeControlTuning::default());
        law.forward_velocity = 5.0;
        let cmd = law.update(&held(|i| i.brake = true));
        assert_relative_eq!(cmd.motor_speed, 5.0 - 0.3 - 0.05, epsilon = 1e-5);

        law.forward_velocity = -0.2;
        law.update(&held(|i| i.brake = true));
        assert_eq!(law.forward_velocity, 0.0);
    }

    #[test]
    fn test_hinge_steer_recenters_exactly() {
        let mut law = HingeControl::new(HingeControlTuning::default());
        let left = held(|i| i.left = true);
        for _ in 0..20 {
            law.update(&left);
        }
        assert_eq!(law.right_velocity, -0.5);
        for _ in 0..20 {
            law.update(&DriverInput::default());
        }
        assert_eq!(law.right_velocity, 0.0);
    }

    #[test]
    fn test_throttle_priority() {
        let all = held(|i| {
            i.forward = true;
            i.backward = true;
            i.brake = true;
        });
        assert_eq!(Throttle::resolve(&all), Throttle::Brake);
        let fb = held(|i| {
            i.forward = true;
            i.backward = true;
        });
        assert_eq!(Throttle::resolve(&fb), Throttle::Backward);
        assert_eq!(Throttle::resolve(&held(|i| i.forward = true)), Throttle::Forward);
        assert_eq!(Throttle::resolve(&DriverInput::default()), Throttle::Coast);
    }

    #[test]
    fn test_raycast_forward_respects_speed_window() {
        let mut law = RaycastControl::new(RaycastControlTuning::default());
        let fwd = held(|i| i.forward = true);
        assert_eq!(law.update(&fwd, 0.0).engine_force, 590.0);
        assert_eq!(law.update(&fwd, 324.9).engine_force, 590.0);
        assert_eq!(law.update(&fwd, 325.0).engine_force, 0.0);

        let back = held(|i| i.backward = true);
        assert_relative_eq!(law.update(&back, 10.0).engine_force, -196.67);
        assert_eq!(law.update(&back, -50.0).engine_force, 0.0);
    }

    #[test]
    fn test_raycast_engine_braking_opposes_motion() {
        let mut law = RaycastControl::new(RaycastControlTuning::default());
        let idle = DriverInput::default();
        assert_eq!(law.update(&idle, 40.0).engine_force, -50.0);
        assert_eq!(law.update(&idle, -3.0).engine_force, 50.0);
        assert_eq!(law.update(&idle, 0.04).engine_force, 0.0);
    }

    #[test]
    fn test_raycast_brake_cuts_drive() {
        let mut law = RaycastControl::new(RaycastControlTuning::default());
        let cmd = law.update(
            &held(|i| {
                i.forward = true;
                i.brake = true;
            }),
            20.0,
        );
        assert_eq!(cmd.engine_force, 0.0);
        assert_eq!(cmd.brake, 17.0);

        // standing still: nothing to brake
        let cmd = law.update(&held(|i| i.brake = true), 0.0);
        assert_eq!(cmd.brake, 0.0);

        // released: exactly zero whatever came before
        law.brake_force = 123.0;
        let cmd = law.update(&DriverInput::default(), 20.0);
        assert_eq!(cmd.brake, 0.0);
    }

    #[test]
    fn test_raycast_steering_clamps_and_snaps() {
        let mut law = RaycastControl::new(RaycastControlTuning::default());
        let right = held(|i| i.right = true);
        for _ in 0..40 {
            law.update(&right, 0.0);
        }
        assert_eq!(law.steering_angle, -0.5);

        law.steering_angle = 0.04;
        law.update(&DriverInput::default(), 0.0);
        assert_eq!(law.steering_angle, 0.0);
    }
}
