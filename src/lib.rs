//! Trust-region policy optimization (TRPO) for continuous control
//!
//! The crate is organised the same way as a small RL library:
//!
//! - [`algo`]: advantage estimation, conjugate gradient, Fisher-vector
//!   products, the trust-region line search, value fitting and the
//!   [`TRPOAgent`](algo::trpo::TRPOAgent) that sequences them
//! - [`nn`]: burn building blocks (MLP, diagonal Gaussian actor, flat
//!   parameter views)
//! - [`env`] / [`gym`]: environment traits and concrete environments
//! - [`session`]: independent training sessions with diagnostics and
//!   checkpoints

pub mod algo;
pub mod checkpoint;
pub mod config;
pub mod diagnostics;
pub mod env;
pub mod error;
pub mod gym;
pub mod nn;
pub mod normalize;
pub mod session;
pub mod traits;
pub mod trajectory;

pub use error::{Result, TrpoError};
