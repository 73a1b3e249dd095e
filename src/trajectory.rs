//! On-policy experience storage
//!
//! A [`Trajectory`] is the batch gathered for one training iteration: steps
//! in temporal order, several episodes back to back. Every episode's last
//! step carries `mask = 0`, so the batch always ends on an episode boundary.

use burn::prelude::*;

use crate::{error::TrpoError, traits::ToTensor};

/// One environment transition
#[derive(Clone, Debug, PartialEq)]
pub struct Step {
    /// Normalized observation the action was taken in
    pub state: Vec<f32>,
    /// Raw (unclipped) sampled action
    pub action: Vec<f32>,
    pub reward: f32,
    /// `0.0` on the last step of an episode, `1.0` otherwise
    pub mask: f32,
}

impl Step {
    pub fn is_terminal(&self) -> bool {
        self.mask == 0.0
    }
}

/// Steps of one or more consecutive episodes
#[derive(Clone, Debug, Default)]
pub struct Trajectory {
    steps: Vec<Step>,
    episode_scores: Vec<f32>,
}

impl Trajectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, step: Step) {
        self.steps.push(step);
    }

    /// Record the undiscounted return of the episode that just ended
    pub fn finish_episode(&mut self, score: f32) {
        self.episode_scores.push(score);
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn episode_scores(&self) -> &[f32] {
        &self.episode_scores
    }

    pub fn episodes(&self) -> usize {
        self.episode_scores.len()
    }

    /// Mean undiscounted episode return, `0.0` without finished episodes
    pub fn mean_score(&self) -> f32 {
        if self.episode_scores.is_empty() {
            0.0
        } else {
            self.episode_scores.iter().sum::<f32>() / self.episode_scores.len() as f32
        }
    }

    pub fn rewards(&self) -> Vec<f32> {
        self.steps.iter().map(|s| s.reward).collect()
    }

    pub fn masks(&self) -> Vec<f32> {
        self.steps.iter().map(|s| s.mask).collect()
    }

    pub fn states(&self) -> Vec<Vec<f32>> {
        self.steps.iter().map(|s| s.state.clone()).collect()
    }

    pub fn actions(&self) -> Vec<Vec<f32>> {
        self.steps.iter().map(|s| s.action.clone()).collect()
    }

    /// `(states [N, S], actions [N, A])`
    pub fn to_tensors<B: Backend>(&self, device: &B::Device) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let states = self.states();
        let actions = self.actions();
        (states.as_slice().to_tensor(device), actions.as_slice().to_tensor(device))
    }

    /// Reject batches an update cannot learn from
    ///
    /// - empty batches
    /// - batches where every step is terminal (only one-step episodes, which
    ///   includes a single step terminating at step 0)
    /// - inconsistent state or action dimensions
    /// - non-finite rewards, states or actions
    pub fn validate(&self) -> Result<(), TrpoError> {
        let first = self
            .steps
            .first()
            .ok_or_else(|| TrpoError::MalformedTrajectory("trajectory is empty".into()))?;

        if self.steps.iter().all(Step::is_terminal) {
            return Err(TrpoError::MalformedTrajectory(format!(
                "all {} steps are terminal",
                self.steps.len()
            )));
        }

        let state_dim = first.state.len();
        let action_dim = first.action.len();
        if state_dim == 0 || action_dim == 0 {
            return Err(TrpoError::MalformedTrajectory("empty state or action vector".into()));
        }

        for (i, step) in self.steps.iter().enumerate() {
            if step.state.len() != state_dim || step.action.len() != action_dim {
                return Err(TrpoError::MalformedTrajectory(format!(
                    "step {i} has state/action dims {}/{}, expected {state_dim}/{action_dim}",
                    step.state.len(),
                    step.action.len()
                )));
            }
            let finite = step.reward.is_finite()
                && step.state.iter().all(|v| v.is_finite())
                && step.action.iter().all(|v| v.is_finite());
            if !finite {
                return Err(TrpoError::MalformedTrajectory(format!("step {i} holds a non-finite value")));
            }
            if step.mask != 0.0 && step.mask != 1.0 {
                return Err(TrpoError::MalformedTrajectory(format!("step {i} has mask {}", step.mask)));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(reward: f32, mask: f32) -> Step {
        Step {
            state: vec![0.0, 1.0],
            action: vec![0.5],
            reward,
            mask,
        }
    }

    #[test]
    fn empty_trajectory_is_malformed() {
        assert!(matches!(Trajectory::new().validate(), Err(TrpoError::MalformedTrajectory(_))));
    }

    #[test]
    fn single_terminal_step_is_malformed() {
        let mut trajectory = Trajectory::new();
        trajectory.push(step(1.0, 0.0));
        assert!(trajectory.validate().is_err());
    }

    #[test]
    fn all_terminal_steps_are_malformed() {
        let mut trajectory = Trajectory::new();
        for _ in 0..4 {
            trajectory.push(step(1.0, 0.0));
        }
        assert!(trajectory.validate().is_err());
    }

    #[test]
    fn ragged_or_non_finite_steps_are_malformed() {
        let mut ragged = Trajectory::new();
        ragged.push(step(1.0, 1.0));
        ragged.push(Step {
            state: vec![0.0],
            ..step(1.0, 0.0)
        });
        assert!(ragged.validate().is_err());

        let mut nan = Trajectory::new();
        nan.push(step(f32::NAN, 1.0));
        nan.push(step(1.0, 0.0));
        assert!(nan.validate().is_err());
    }

    #[test]
    fn well_formed_trajectory_passes() {
        let mut trajectory = Trajectory::new();
        trajectory.push(step(1.0, 1.0));
        trajectory.push(step(2.0, 0.0));
        trajectory.finish_episode(3.0);

        assert!(trajectory.validate().is_ok());
        assert_eq!(trajectory.rewards(), vec![1.0, 2.0]);
        assert_eq!(trajectory.masks(), vec![1.0, 0.0]);
        assert_eq!(trajectory.mean_score(), 3.0);
    }
}
