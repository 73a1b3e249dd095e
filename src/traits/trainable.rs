//! Trainable agent trait for fine-grained training control
//!
//! On-policy agents alternate two phases that must not overlap: collecting a
//! batch of experience with the current policy, then learning from the whole
//! batch. This trait exposes those phases separately so callers can run
//! custom training loops, evaluate between updates, and inspect metrics.

use crate::{env::Environment, trajectory::Trajectory};

/// Trait for trainable on-policy RL agents
///
/// # Example
///
/// ```ignore
/// let trajectory = agent.collect(&mut env);
/// let report = agent.learn(&trajectory);
/// println!("accepted: {}", report.outcome.is_accepted());
///
/// agent.eval();
/// let evaluation = agent.collect(&mut env);
/// println!("mean score: {}", evaluation.mean_score());
/// agent.train();
/// ```
pub trait TrainableAgent<E: Environment> {
    /// Metrics returned by one learning update
    type Metrics;

    /// Run whole episodes with the current policy until enough steps were gathered
    ///
    /// In evaluation mode actions are deterministic and observation
    /// statistics are not updated.
    fn collect(&mut self, env: &mut E) -> Trajectory;

    /// Update the agent from a complete batch of experience
    fn learn(&mut self, trajectory: &Trajectory) -> Self::Metrics;

    /// Get total number of environment steps taken
    fn total_steps(&self) -> usize;

    /// Make agent in evaluation mode
    fn eval(&mut self);

    /// Make agent in training mode
    fn train(&mut self);
}
