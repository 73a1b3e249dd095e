//! Environment traits

/// A reinforcement learning environment
///
/// `step` returns `None` as the next state when the episode terminated.
pub trait Environment {
    type State: Clone;
    type Action: Clone;

    /// Apply an action and return `(next_state, reward)`
    fn step(&mut self, action: Self::Action) -> (Option<Self::State>, f32);

    /// Start a new episode and return its first state
    fn reset(&mut self) -> Self::State;

    /// The state the environment is currently in
    fn current_state(&self) -> Self::State;

    /// Whether the current episode can still be stepped
    fn is_active(&self) -> bool {
        true
    }

    /// Re-seed the environment's random source
    fn seed(&mut self, _seed: u64) {}
}

/// An environment with a continuous, real-valued action space
pub trait ContinuousActionSpace {
    /// Number of action components
    fn action_dim(&self) -> usize;

    /// Number of observation components
    fn observation_dim(&self) -> usize;

    /// Optional `(low, high)` bounds per action component
    fn action_bounds(&self) -> Option<(Vec<f32>, Vec<f32>)> {
        None
    }
}
