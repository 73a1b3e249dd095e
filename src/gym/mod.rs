//! Concrete continuous-control environments

pub mod linear_quadratic;
pub mod pendulum;

pub use linear_quadratic::LinearQuadratic;
pub use pendulum::Pendulum;
