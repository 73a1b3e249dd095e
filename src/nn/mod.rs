//! Neural network building blocks for the policy and value function

pub mod flat;
pub mod gaussian;
pub mod mlp;

pub use flat::FlatParams;
pub use gaussian::{gaussian_kl, gaussian_log_prob, GaussianActor, GaussianActorConfig};
pub use mlp::{MLPConfig, MLP};
