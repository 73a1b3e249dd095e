//! Trust-region policy optimization and its numerical building blocks

/// Conjugate gradient over an implicit linear operator
pub mod cg;

/// Fisher-vector products of the Gaussian policy at a frozen snapshot
pub mod fisher;

/// Generalized Advantage Estimation
pub mod gae;

/// Backtracking line search under a KL trust region
pub mod line_search;

/// Trust Region Policy Optimization agent
pub mod trpo;

/// Value function regression
pub mod value_fit;

pub mod vector;

pub use cg::{conjugate_gradient, CgSolution, DenseOperator, LinearOperator};
pub use fisher::{FisherVectorProduct, PolicySnapshot};
pub use gae::{compute_gae, normalize_advantages, AdvantageTable};
pub use line_search::{backtracking_line_search, LineSearchAttempt, LineSearchConfig, LineSearchResult};
pub use trpo::{
    RejectReason, TRPOActorModel, TRPOAgent, TRPOAgentConfig, TRPOCriticModel, UpdateOutcome,
    UpdateReport,
};
pub use value_fit::{fit_value_function, ValueFitConfig, ValueFitReport};
