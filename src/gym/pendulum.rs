use rand::{rngs::StdRng, Rng, SeedableRng};
use std::f32::consts::PI;

use crate::env::{ContinuousActionSpace, Environment};

const MAX_SPEED: f32 = 8.0;
const MAX_TORQUE: f32 = 2.0;
const DT: f32 = 0.05;
const G: f32 = 10.0;
const M: f32 = 1.0;
const L: f32 = 1.0;

/// Classic Pendulum environment with continuous action space
///
/// The goal is to keep the pendulum upright by applying torque.
/// The state is represented as `[cos(θ), sin(θ), θ̇]` to avoid
/// discontinuity issues with angle wrapping. The action is a single torque,
/// clamped to `[-2, 2]`.
///
/// # Physics
/// - Mass: 1.0 kg
/// - Length: 1.0 m
/// - Gravity: 10.0 m/s²
/// - Time step: 0.05 s
/// - Max angular velocity: 8.0 rad/s
/// - Max torque: 2.0 N⋅m
///
/// # Reward
/// r = -θ² - 0.1⋅θ̇² - 0.001⋅u²
///
/// Where θ is the angle from vertical (0 = upright), θ̇ is angular velocity,
/// and u is the applied torque.
#[derive(Debug, Clone)]
pub struct Pendulum {
    theta: f32,
    theta_dot: f32,
    steps: usize,
    max_steps: usize,
    rng: StdRng,
}

impl Pendulum {
    /// Create a new Pendulum environment
    ///
    /// # Arguments
    /// * `max_steps` - Maximum number of steps per episode (typically 200)
    pub fn new(max_steps: usize) -> Self {
        Self {
            theta: 0.0,
            theta_dot: 0.0,
            steps: 0,
            max_steps,
            rng: StdRng::seed_from_u64(0),
        }
    }

    fn get_state(&self) -> Vec<f32> {
        vec![self.theta.cos(), self.theta.sin(), self.theta_dot]
    }

    fn angle_normalize(x: f32) -> f32 {
        (x + PI).rem_euclid(2.0 * PI) - PI
    }
}

impl Environment for Pendulum {
    type State = Vec<f32>;
    type Action = Vec<f32>;

    fn step(&mut self, action: Self::Action) -> (Option<Self::State>, f32) {
        let torque = action
            .first()
            .copied()
            .unwrap_or(0.0)
            .clamp(-MAX_TORQUE, MAX_TORQUE);

        // Reward is computed on the pre-step state
        let reward = -(Self::angle_normalize(self.theta).powi(2)
            + 0.1 * self.theta_dot.powi(2)
            + 0.001 * torque.powi(2));

        // Physics: θ̈ = (3g/2L)sin(θ) + (3/mL²)u
        let theta_acc = (3.0 * G / (2.0 * L)) * self.theta.sin() + (3.0 / (M * L * L)) * torque;

        self.theta_dot = (self.theta_dot + theta_acc * DT).clamp(-MAX_SPEED, MAX_SPEED);
        self.theta = Self::angle_normalize(self.theta + self.theta_dot * DT);

        self.steps += 1;

        let next_state = if self.steps >= self.max_steps {
            None
        } else {
            Some(self.get_state())
        };

        (next_state, reward)
    }

    fn reset(&mut self) -> Self::State {
        self.theta = self.rng.gen_range(-PI..PI);
        self.theta_dot = self.rng.gen_range(-1.0..1.0);
        self.steps = 0;
        self.get_state()
    }

    fn current_state(&self) -> Self::State {
        self.get_state()
    }

    fn is_active(&self) -> bool {
        self.steps < self.max_steps
    }

    fn seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }
}

impl ContinuousActionSpace for Pendulum {
    fn action_dim(&self) -> usize {
        1
    }

    fn observation_dim(&self) -> usize {
        3
    }

    fn action_bounds(&self) -> Option<(Vec<f32>, Vec<f32>)> {
        Some((vec![-MAX_TORQUE], vec![MAX_TORQUE]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pendulum_physics() {
        let mut env = Pendulum::new(200);

        let state = env.reset();
        assert_eq!(state.len(), 3);
        assert!(state[0].abs() <= 1.0, "cos(θ) should be in [-1, 1]");
        assert!(state[1].abs() <= 1.0, "sin(θ) should be in [-1, 1]");
        assert!(state[2].abs() <= MAX_SPEED, "Angular velocity should be bounded");

        let (next_state, _) = env.step(vec![0.0]);
        assert!(next_state.is_some(), "Should not be terminal after one step");

        // Out-of-range torques are clamped
        let (_, reward_high) = env.step(vec![100.0]);
        let (_, reward_low) = env.step(vec![-100.0]);
        assert!(reward_high.is_finite());
        assert!(reward_low.is_finite());
    }

    #[test]
    fn pendulum_reward() {
        let mut env = Pendulum::new(200);
        env.theta = 0.0;
        env.theta_dot = 0.0;

        let (_, reward) = env.step(vec![0.0]);
        assert!(reward > -1.0, "Reward should be close to 0 when upright and stationary");

        env.theta = PI;
        env.theta_dot = 0.0;
        let (_, reward_down) = env.step(vec![0.0]);
        assert!(reward_down < reward, "Reward should be lower when pendulum is down");
    }

    #[test]
    fn pendulum_seed_is_reproducible() {
        let mut a = Pendulum::new(200);
        let mut b = Pendulum::new(200);
        a.seed(501);
        b.seed(501);
        assert_eq!(a.reset(), b.reset());
        assert_eq!(a.step(vec![0.5]), b.step(vec![0.5]));
    }

    #[test]
    fn pendulum_episode_length() {
        let mut env = Pendulum::new(5);
        env.reset();

        for i in 0..5 {
            let (next_state, _) = env.step(vec![0.0]);
            if i < 4 {
                assert!(next_state.is_some(), "Should not be terminal yet");
            } else {
                assert!(next_state.is_none(), "Should be terminal at max_steps");
            }
        }
        assert!(!env.is_active());
    }
}
