use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::env::{ContinuousActionSpace, Environment};

const DT: f32 = 0.1;
const CONTROL_COST: f32 = 0.1;
const RICCATI_ITERATIONS: usize = 500;

/// Discrete-time double integrator with quadratic cost
///
/// State `x = [position, velocity]`, scalar control `u`:
///
/// ```text
/// x' = A x + B u      A = [[1, dt], [0, 1]]   B = [0, dt]ᵀ
/// r  = -(xᵀQx + uᵀRu) Q = I                  R = 0.1
/// ```
///
/// Dynamics are deterministic; only the initial state is drawn from the
/// seeded generator. The optimal policy is linear, `u = -K x`, with `K`
/// given by [`LinearQuadratic::optimal_gain`].
#[derive(Debug, Clone)]
pub struct LinearQuadratic {
    state: [f32; 2],
    steps: usize,
    horizon: usize,
    rng: StdRng,
}

impl LinearQuadratic {
    pub fn new(horizon: usize) -> Self {
        Self {
            state: [0.0; 2],
            steps: 0,
            horizon,
            rng: StdRng::seed_from_u64(0),
        }
    }

    /// Apply the dynamics without touching the episode counter
    fn transition(state: [f32; 2], u: f32) -> [f32; 2] {
        [state[0] + DT * state[1], state[1] + DT * u]
    }

    fn cost(state: [f32; 2], u: f32) -> f32 {
        state[0] * state[0] + state[1] * state[1] + CONTROL_COST * u * u
    }

    /// Infinite-horizon LQR gain `K` (so that `u = -K x`)
    ///
    /// Obtained by iterating the discrete algebraic Riccati equation
    /// `P ← Q + AᵀPA − AᵀPB (R + BᵀPB)⁻¹ BᵀPA` to its fixed point.
    pub fn optimal_gain() -> [f32; 2] {
        let a = [[1.0_f64, DT as f64], [0.0, 1.0]];
        let b = [0.0_f64, DT as f64];
        let r = CONTROL_COST as f64;
        let mut p = [[1.0_f64, 0.0], [0.0, 1.0]];

        let mut gain = [0.0_f64; 2];
        for _ in 0..RICCATI_ITERATIONS {
            // PA and PB
            let mut pa = [[0.0_f64; 2]; 2];
            for i in 0..2 {
                for j in 0..2 {
                    pa[i][j] = p[i][0] * a[0][j] + p[i][1] * a[1][j];
                }
            }
            let pb = [p[0][0] * b[0] + p[0][1] * b[1], p[1][0] * b[0] + p[1][1] * b[1]];

            let btpb = b[0] * pb[0] + b[1] * pb[1];
            // BᵀPA (row vector)
            let btpa = [b[0] * pa[0][0] + b[1] * pa[1][0], b[0] * pa[0][1] + b[1] * pa[1][1]];
            let denom = r + btpb;
            gain = [btpa[0] / denom, btpa[1] / denom];

            let mut next = [[0.0_f64; 2]; 2];
            for i in 0..2 {
                for j in 0..2 {
                    let atpa = a[0][i] * pa[0][j] + a[1][i] * pa[1][j];
                    let q = if i == j { 1.0 } else { 0.0 };
                    next[i][j] = q + atpa - btpa[i] * btpa[j] / denom;
                }
            }
            p = next;
        }

        [gain[0] as f32, gain[1] as f32]
    }

    /// Total reward of the linear feedback `u = -K x` from a given start
    pub fn rollout_linear_policy(&self, start: [f32; 2], gain: [f32; 2]) -> f32 {
        let mut state = start;
        let mut total = 0.0;
        for _ in 0..self.horizon {
            let u = -(gain[0] * state[0] + gain[1] * state[1]);
            total -= Self::cost(state, u);
            state = Self::transition(state, u);
        }
        total
    }
}

impl Environment for LinearQuadratic {
    type State = Vec<f32>;
    type Action = Vec<f32>;

    fn step(&mut self, action: Self::Action) -> (Option<Self::State>, f32) {
        let u = action.first().copied().unwrap_or(0.0);
        let reward = -Self::cost(self.state, u);
        self.state = Self::transition(self.state, u);
        self.steps += 1;

        if self.steps >= self.horizon {
            (None, reward)
        } else {
            (Some(self.state.to_vec()), reward)
        }
    }

    fn reset(&mut self) -> Self::State {
        self.state = [self.rng.gen_range(-1.0..1.0), self.rng.gen_range(-1.0..1.0)];
        self.steps = 0;
        self.state.to_vec()
    }

    fn current_state(&self) -> Self::State {
        self.state.to_vec()
    }

    fn is_active(&self) -> bool {
        self.steps < self.horizon
    }

    fn seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }
}

impl ContinuousActionSpace for LinearQuadratic {
    fn action_dim(&self) -> usize {
        1
    }

    fn observation_dim(&self) -> usize {
        2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dynamics_are_deterministic() {
        let mut env = LinearQuadratic::new(10);
        env.state = [1.0, 0.0];
        let (next, reward) = env.step(vec![1.0]);
        assert_eq!(next, Some(vec![1.0, DT]));
        assert!((reward + 1.0 + CONTROL_COST).abs() < 1e-6);
    }

    #[test]
    fn episode_ends_at_horizon() {
        let mut env = LinearQuadratic::new(3);
        env.reset();
        assert!(env.step(vec![0.0]).0.is_some());
        assert!(env.step(vec![0.0]).0.is_some());
        assert!(env.step(vec![0.0]).0.is_none());
        assert!(!env.is_active());
    }

    #[test]
    fn optimal_gain_beats_passive_and_perturbed_controls() {
        let env = LinearQuadratic::new(200);
        let gain = LinearQuadratic::optimal_gain();
        assert!(gain[0] > 0.0 && gain[1] > 0.0, "gain should push back toward the origin: {gain:?}");

        let start = [1.0, -0.5];
        let optimal = env.rollout_linear_policy(start, gain);
        let passive = env.rollout_linear_policy(start, [0.0, 0.0]);
        let perturbed = env.rollout_linear_policy(start, [gain[0] * 1.3, gain[1] * 0.7]);

        assert!(optimal > passive, "optimal {optimal} vs passive {passive}");
        assert!(optimal >= perturbed, "optimal {optimal} vs perturbed {perturbed}");
    }
}
