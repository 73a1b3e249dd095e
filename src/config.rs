//! Run configuration loaded from JSON

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    algo::TRPOAgentConfig,
    error::{Result, TrpoError},
};

/// Complete configuration for a training run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrpoConfig {
    pub agent: TRPOAgentConfig,
    pub network: NetworkConfig,
    pub run: RunConfig,
}

/// Actor and critic architecture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Hidden layer widths shared by actor and critic (default: [64, 64]).
    pub hidden_layers: Vec<usize>,
    /// ReLU hidden activations instead of tanh (default: false).
    pub use_relu: bool,
    /// Initial policy log standard deviation (default: 0.0).
    pub initial_log_std: f32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            hidden_layers: vec![64, 64],
            use_relu: false,
            initial_log_std: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvKind {
    Pendulum,
    Lqr,
}

impl EnvKind {
    pub fn name(&self) -> &'static str {
        match self {
            EnvKind::Pendulum => "pendulum",
            EnvKind::Lqr => "lqr",
        }
    }
}

/// Sessions, iteration counts and output cadence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub env: EnvKind,
    /// Episode length of the environment (default: 200).
    pub env_horizon: usize,
    /// Independent training sessions (default: 10).
    pub sessions: usize,
    /// Iterations per session (default: 500).
    pub iterations: usize,
    /// Session `s` is seeded with `seed_base + s` (default: 500).
    pub seed_base: u64,
    /// Record diagnostics every N iterations (default: 1).
    pub plot_freq: usize,
    /// Checkpoint every N iterations, 0 disables (default: 100).
    pub checkpoint_every: usize,
    /// Episodes run by `evaluate` (default: 10).
    pub eval_episodes: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            env: EnvKind::Pendulum,
            env_horizon: 200,
            sessions: 10,
            iterations: 500,
            seed_base: 500,
            plot_freq: 1,
            checkpoint_every: 100,
            eval_episodes: 10,
        }
    }
}

fn check(ok: bool, message: &str) -> Result<()> {
    if ok {
        Ok(())
    } else {
        Err(TrpoError::Config(message.to_string()))
    }
}

impl TrpoConfig {
    /// Read a JSON file; missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let a = &self.agent;
        check((0.0..=1.0).contains(&a.gamma), "gamma must be in [0, 1]")?;
        check((0.0..=1.0).contains(&a.gae_lambda), "gae_lambda must be in [0, 1]")?;
        check(a.max_kl > 0.0 && a.max_kl.is_finite(), "max_kl must be positive")?;
        check(a.damping >= 0.0 && a.damping.is_finite(), "damping must be non-negative")?;
        check(a.cg_iterations > 0, "cg_iterations must be positive")?;
        check(a.cg_residual_tol >= 0.0, "cg_residual_tol must be non-negative")?;
        check(a.line_search_steps > 0, "line_search_steps must be positive")?;
        check(
            a.backtrack_ratio > 0.0 && a.backtrack_ratio < 1.0,
            "backtrack_ratio must be in (0, 1)",
        )?;
        check(a.accept_ratio >= 0.0, "accept_ratio must be non-negative")?;
        check(a.kl_slack >= 0.0, "kl_slack must be non-negative")?;
        check(a.advantage_eps > 0.0, "advantage_eps must be positive")?;
        check(a.min_steps_per_iteration > 0, "min_steps_per_iteration must be positive")?;
        check(a.max_episode_steps > 0, "max_episode_steps must be positive")?;
        check(a.obs_clip.map_or(true, |c| c > 0.0), "obs_clip must be positive")?;

        let v = &a.value_fit;
        check(v.lr > 0.0, "value_fit.lr must be positive")?;
        check(v.l2_rate >= 0.0, "value_fit.l2_rate must be non-negative")?;
        check(v.batch_size > 0, "value_fit.batch_size must be positive")?;

        check(
            self.network.hidden_layers.iter().all(|&w| w > 0),
            "hidden layer widths must be positive",
        )?;

        let r = &self.run;
        check(r.env_horizon > 0, "env_horizon must be positive")?;
        check(r.sessions > 0, "sessions must be positive")?;
        check(r.plot_freq > 0, "plot_freq must be positive")?;
        Ok(())
    }
}
