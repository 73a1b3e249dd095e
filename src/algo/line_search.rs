//! Backtracking line search under a KL trust region

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Acceptance rules and backtracking schedule
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineSearchConfig {
    /// Trust-region radius δ on the mean KL
    pub max_kl: f32,
    /// Relative tolerance on δ: accept `KL ≤ δ·(1 + kl_slack)`
    pub kl_slack: f32,
    /// Maximum number of fractions tried
    pub max_steps: usize,
    /// Factor applied to the fraction after each failed attempt
    pub backtrack_ratio: f32,
    /// Minimum ratio of actual to predicted improvement, `0` to disable
    pub accept_ratio: f32,
}

impl Default for LineSearchConfig {
    fn default() -> Self {
        Self {
            max_kl: 0.01,
            kl_slack: 0.0,
            max_steps: 10,
            backtrack_ratio: 0.5,
            accept_ratio: 0.5,
        }
    }
}

/// One evaluated fraction of the full step
#[derive(Clone, Debug, PartialEq)]
pub struct LineSearchAttempt {
    pub fraction: f32,
    /// Actual surrogate improvement `ΔL`
    pub improvement: f32,
    /// Mean KL between the old policy and the candidate
    pub kl: f32,
    /// Improvement predicted by the linear model, `g·full_step·fraction`
    pub expected_improvement: f32,
}

#[derive(Clone, Debug, Default)]
pub struct LineSearchResult {
    pub attempts: Vec<LineSearchAttempt>,
    /// Index into `attempts` of the accepted fraction
    pub accepted: Option<usize>,
}

impl LineSearchResult {
    pub fn accepted_attempt(&self) -> Option<&LineSearchAttempt> {
        self.accepted.map(|i| &self.attempts[i])
    }

    /// Accepted fraction, `0.0` when exhausted
    pub fn fraction(&self) -> f32 {
        self.accepted_attempt().map_or(0.0, |a| a.fraction)
    }
}

impl LineSearchConfig {
    fn accepts(&self, attempt: &LineSearchAttempt) -> bool {
        if !attempt.improvement.is_finite() || !attempt.kl.is_finite() {
            return false;
        }
        if attempt.improvement <= 0.0 || attempt.kl > self.max_kl * (1.0 + self.kl_slack) {
            return false;
        }
        if self.accept_ratio > 0.0 {
            let ratio = attempt.improvement / attempt.expected_improvement;
            if ratio.is_nan() || ratio < self.accept_ratio {
                return false;
            }
        }
        true
    }
}

/// Try fractions `1, r, r², …` of the full step until one is accepted
///
/// `evaluate(fraction)` returns `(ΔL, KL)` for `θ_old + fraction·full_step`
/// and must not commit anything; committing is up to the caller.
/// `expected_improvement` is the predicted `ΔL` of the full step.
pub fn backtracking_line_search<F>(mut evaluate: F, expected_improvement: f32, config: &LineSearchConfig) -> LineSearchResult
where
    F: FnMut(f32) -> (f32, f32),
{
    let mut result = LineSearchResult::default();
    let mut fraction = 1.0_f32;

    for step in 0..config.max_steps {
        let (improvement, kl) = evaluate(fraction);
        let attempt = LineSearchAttempt {
            fraction,
            improvement,
            kl,
            expected_improvement: expected_improvement * fraction,
        };
        let accepted = config.accepts(&attempt);
        debug!(step, fraction, improvement, kl, accepted, "line search attempt");
        result.attempts.push(attempt);

        if accepted {
            result.accepted = Some(step);
            break;
        }
        fraction *= config.backtrack_ratio;
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    /// ΔL = f − f², KL = 0.02·f² (so the full step violates δ = 0.01)
    fn quadratic_model(fraction: f32) -> (f32, f32) {
        (fraction - fraction * fraction, 0.02 * fraction * fraction)
    }

    #[test]
    fn accepts_first_fraction_within_the_trust_region() {
        let config = LineSearchConfig {
            accept_ratio: 0.0,
            ..Default::default()
        };
        let result = backtracking_line_search(quadratic_model, 1.0, &config);

        // f = 1 gives ΔL = 0, f = 0.5 gives KL = 0.005 and ΔL = 0.25
        assert_eq!(result.attempts.len(), 2);
        assert_eq!(result.fraction(), 0.5);
        assert!(result.accepted_attempt().is_some_and(|a| a.kl <= 0.01));
    }

    #[test]
    fn improvement_ratio_is_enforced() {
        // Predicted improvement of 1.0 per unit fraction; actual ΔL/expected
        // is 1 − f, which reaches 0.5 at f = 0.5
        let config = LineSearchConfig {
            max_kl: 1.0,
            ..Default::default()
        };
        let result = backtracking_line_search(quadratic_model, 1.0, &config);
        assert_eq!(result.fraction(), 0.5);
    }

    #[test]
    fn negative_improvement_is_never_accepted() {
        let mut calls = 0;
        let result = backtracking_line_search(
            |f| {
                calls += 1;
                (-f, 0.0)
            },
            1.0,
            &LineSearchConfig::default(),
        );
        assert_eq!(calls, 10);
        assert!(result.accepted.is_none());
        assert_eq!(result.fraction(), 0.0);
        let fractions: Vec<f32> = result.attempts.iter().map(|a| a.fraction).collect();
        assert_eq!(fractions[..3], [1.0, 0.5, 0.25]);
    }

    #[test]
    fn kl_violation_and_non_finite_values_reject() {
        let config = LineSearchConfig {
            max_steps: 3,
            accept_ratio: 0.0,
            ..Default::default()
        };
        let too_far = backtracking_line_search(|_| (1.0, 0.5), 1.0, &config);
        assert!(too_far.accepted.is_none());

        let nan = backtracking_line_search(|_| (f32::NAN, 0.0), 1.0, &config);
        assert!(nan.accepted.is_none());
        let inf_kl = backtracking_line_search(|_| (1.0, f32::INFINITY), 1.0, &config);
        assert!(inf_kl.accepted.is_none());
    }

    #[test]
    fn slack_widens_the_kl_bound() {
        let config = LineSearchConfig {
            kl_slack: 0.5,
            accept_ratio: 0.0,
            ..Default::default()
        };
        let result = backtracking_line_search(|_| (1.0, 0.014), 1.0, &config);
        assert_eq!(result.fraction(), 1.0);
    }
}
