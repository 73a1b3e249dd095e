//! Generalized Advantage Estimation (GAE)
//!
//! ```text
//! δ_t = r_t + γ·V(s_{t+1})·m_t − V(s_t)
//! A_t = δ_t + γ·λ·m_t·A_{t+1}
//! R_t = A_t + V(s_t)
//! ```
//!
//! `m_t = 0` on the last step of an episode, which cuts both the bootstrap
//! and the accumulated trace so nothing leaks across episode boundaries.

use super::vector::mean_std;

/// Per-step advantages and return targets, aligned with the trajectory
#[derive(Clone, Debug, PartialEq)]
pub struct AdvantageTable {
    pub advantages: Vec<f32>,
    pub returns: Vec<f32>,
}

impl AdvantageTable {
    pub fn len(&self) -> usize {
        self.advantages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.advantages.is_empty()
    }
}

/// Reverse-pass GAE over one batch
///
/// `values[t]` is `V(s_t)`. The value after the last step is taken as zero,
/// which is exact when the batch ends on an episode boundary.
pub fn compute_gae(rewards: &[f32], masks: &[f32], values: &[f32], gamma: f32, lambda: f32) -> AdvantageTable {
    let n = rewards.len();
    assert_eq!(masks.len(), n, "masks must align with rewards");
    assert_eq!(values.len(), n, "values must align with rewards");

    let mut advantages = vec![0.0; n];
    let mut returns = vec![0.0; n];
    let mut running = 0.0_f32;
    let mut next_value = 0.0_f32;

    for t in (0..n).rev() {
        let delta = rewards[t] + gamma * next_value * masks[t] - values[t];
        running = delta + gamma * lambda * masks[t] * running;
        advantages[t] = running;
        returns[t] = running + values[t];
        next_value = values[t];
    }

    AdvantageTable { advantages, returns }
}

/// Shift to zero mean and scale to unit (population) standard deviation
///
/// `eps` guards the division, so constant or single-element inputs map to
/// zeros instead of NaN.
pub fn normalize_advantages(advantages: &mut [f32], eps: f32) {
    if advantages.is_empty() {
        return;
    }
    let (mean, std) = mean_std(advantages);
    for a in advantages.iter_mut() {
        *a = (*a - mean) / (std + eps);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_reward_gives_geometric_series() {
        let (gamma, lambda, r) = (0.99_f32, 0.98_f32, 1.5_f32);
        let n = 6;
        let table = compute_gae(&vec![r; n], &vec![1.0; n], &vec![0.0; n], gamma, lambda);

        let decay = (gamma * lambda) as f64;
        for t in 0..n {
            let k = (n - t) as i32;
            // r · (1 − (γλ)^k) / (1 − γλ)
            let expected = r as f64 * (1.0 - decay.powi(k)) / (1.0 - decay);
            assert!((table.advantages[t] as f64 - expected).abs() < 1e-5);
            assert_eq!(table.returns[t], table.advantages[t]);
        }
    }

    #[test]
    fn terminal_mask_stops_the_recursion() {
        let masks = [1.0, 0.0, 1.0, 0.0];
        let values = [0.5, 0.25, -1.0, 2.0];
        let a = compute_gae(&[1.0, 1.0, 3.0, 4.0], &masks, &values, 0.9, 0.95);
        let b = compute_gae(&[1.0, 1.0, -30.0, 400.0], &masks, &values, 0.9, 0.95);

        // The first episode never sees the second one's rewards or values
        assert_eq!(a.advantages[..2], b.advantages[..2]);
        assert_eq!(a.advantages[1], 1.0 - 0.25);
        assert!((a.advantages[0] - ((1.0 + 0.9 * 0.25 - 0.5) + 0.9 * 0.95 * 0.75)).abs() < 1e-6);
    }

    #[test]
    fn returns_are_advantages_plus_values() {
        let values = [0.3, -0.2, 0.1];
        let table = compute_gae(&[1.0, 0.0, 2.0], &[1.0, 1.0, 0.0], &values, 0.99, 0.9);
        for t in 0..3 {
            assert!((table.returns[t] - (table.advantages[t] + values[t])).abs() < 1e-6);
        }
    }

    #[test]
    fn empty_input_is_empty_output() {
        let table = compute_gae(&[], &[], &[], 0.99, 0.98);
        assert!(table.is_empty());
        let mut empty: Vec<f32> = vec![];
        normalize_advantages(&mut empty, 1e-8);
    }

    #[test]
    fn normalization_is_guarded() {
        let mut constant = vec![2.0; 4];
        normalize_advantages(&mut constant, 1e-8);
        assert!(constant.iter().all(|a| *a == 0.0));

        let mut single = vec![7.0];
        normalize_advantages(&mut single, 1e-8);
        assert_eq!(single, vec![0.0]);

        let mut spread = vec![1.0, 2.0, 3.0, 4.0];
        normalize_advantages(&mut spread, 1e-8);
        let (mean, std) = mean_std(&spread);
        assert!(mean.abs() < 1e-6);
        assert!((std - 1.0).abs() < 1e-5);
    }
}
