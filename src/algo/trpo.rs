//! Trust Region Policy Optimization (TRPO) implementation
//!
//! TRPO is an on-policy actor-critic algorithm that takes the largest policy
//! step it can while keeping the mean KL divergence between the old and new
//! policy inside a trust region of radius δ.
//!
//! # Key Features
//!
//! - **Natural gradient**: the policy gradient is preconditioned by the
//!   inverse Fisher information, solved with conjugate gradient
//! - **Matrix-free curvature**: the Fisher matrix is only ever applied to
//!   vectors, never formed
//! - **Backtracking line search**: the step is shrunk until it improves the
//!   surrogate and satisfies the KL bound
//! - **Generalized Advantage Estimation (GAE)** for the policy gradient
//!
//! # Algorithm Overview
//!
//! 1. Collect whole episodes with the current policy until at least
//!    `min_steps_per_iteration` steps were gathered
//! 2. Compute advantages and return targets with GAE
//! 3. Snapshot the policy and compute the surrogate gradient `g`
//! 4. Solve `F x = g` with conjugate gradient
//! 5. Scale `x` so that the predicted KL equals δ and line-search along it
//! 6. Fit the critic to the return targets
//!
//! # Usage Example
//!
//! ```ignore
//! use trpo::algo::trpo::{TRPOAgent, TRPOAgentConfig};
//!
//! let config = TRPOAgentConfig {
//!     max_kl: 0.01,
//!     min_steps_per_iteration: 2048,
//!     ..Default::default()
//! };
//!
//! let mut agent = TRPOAgent::new(actor, critic, config, observation_dim, seed, device);
//! let trajectory = agent.collect(&mut env);
//! let report = agent.update(&trajectory);
//! ```
//!
//! # Hyperparameters
//!
//! - `max_kl`: trust-region radius δ (typically 0.01)
//! - `damping`: added to the Fisher operator to keep it positive definite (0.1)
//! - `cg_iterations`: conjugate gradient budget (10)
//! - `line_search_steps` / `backtrack_ratio`: line search schedule (10 / 0.5)
//! - `accept_ratio`: minimum actual/expected improvement (0.5)
//!
//! Reference: "Trust Region Policy Optimization" (Schulman et al., 2015)

use std::{fmt, marker::PhantomData};

use burn::{
    module::AutodiffModule,
    optim::{adaptor::OptimizerAdaptor, AdamW, AdamWConfig},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{
    cg::{conjugate_gradient, CgSolution, LinearOperator},
    fisher::PolicySnapshot,
    gae::{compute_gae, normalize_advantages},
    line_search::{backtracking_line_search, LineSearchConfig},
    value_fit::{fit_value_function, ValueFitConfig},
    vector::{all_finite, dot, norm, scaled},
};
use crate::{
    env::Environment,
    error::{Result, TrpoError},
    nn::{flat::tensor_values, FlatParams, GaussianActor, MLP},
    normalize::{RunningStat, ZFilter},
    traits::{ToTensor, TrainableAgent},
    trajectory::{Step, Trajectory},
};

/// TRPO actor model trait for continuous actions
/// Outputs the parameters of a diagonal Gaussian
pub trait TRPOActorModel<B: AutodiffBackend>: AutodiffModule<B> + FlatParams<B> {
    /// Forward pass: `states [N, S]` → `(mean [N, A], log_std [N, A])`
    fn forward(&self, states: Tensor<B, 2>) -> (Tensor<B, 2>, Tensor<B, 2>);

    /// Directional derivative of [`Self::forward`] along a flat parameter
    /// direction, detached from the graph
    fn forward_tangent(&self, states: Tensor<B, 2>, direction: &[f32]) -> (Tensor<B, 2>, Tensor<B, 2>);
}

/// TRPO critic model trait
/// Outputs state values V(s)
pub trait TRPOCriticModel<B: AutodiffBackend>: AutodiffModule<B> + FlatParams<B> {
    /// Forward pass: `states [N, S]` → `[N, 1]`
    fn forward(&self, states: Tensor<B, 2>) -> Tensor<B, 2>;
}

/// Configuration for TRPO agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TRPOAgentConfig {
    /// Discount factor γ (default: 0.99)
    pub gamma: f32,
    /// GAE lambda λ for advantage estimation (default: 0.98)
    pub gae_lambda: f32,
    /// Trust-region radius δ on the mean KL (default: 0.01)
    pub max_kl: f32,
    /// Damping added to the Fisher operator (default: 0.1)
    pub damping: f32,
    /// Conjugate gradient iterations (default: 10)
    pub cg_iterations: usize,
    /// Early-stop threshold on `r·r` (default: 1e-10)
    pub cg_residual_tol: f32,
    /// Line search attempts (default: 10)
    pub line_search_steps: usize,
    /// Fraction multiplier per failed attempt (default: 0.5)
    pub backtrack_ratio: f32,
    /// Minimum actual/expected improvement ratio, 0 disables (default: 0.5)
    pub accept_ratio: f32,
    /// Relative slack on the KL bound (default: 0.0)
    pub kl_slack: f32,
    /// Guard in advantage normalization (default: 1e-8)
    pub advantage_eps: f32,
    /// Critic regression settings
    pub value_fit: ValueFitConfig,
    /// Steps to collect before each update (default: 2048)
    pub min_steps_per_iteration: usize,
    /// Episode length cap (default: 10000)
    pub max_episode_steps: usize,
    /// Observation filter clip, `None` for no clipping (default: Some(5.0))
    pub obs_clip: Option<f32>,
}

impl Default for TRPOAgentConfig {
    fn default() -> Self {
        Self {
            gamma: 0.99,
            gae_lambda: 0.98,
            max_kl: 0.01,
            damping: 0.1,
            cg_iterations: 10,
            cg_residual_tol: 1e-10,
            line_search_steps: 10,
            backtrack_ratio: 0.5,
            accept_ratio: 0.5,
            kl_slack: 0.0,
            advantage_eps: 1e-8,
            value_fit: ValueFitConfig::default(),
            min_steps_per_iteration: 2048,
            max_episode_steps: 10_000,
            obs_clip: Some(5.0),
        }
    }
}

impl TRPOAgentConfig {
    pub fn line_search(&self) -> LineSearchConfig {
        LineSearchConfig {
            max_kl: self.max_kl,
            kl_slack: self.kl_slack,
            max_steps: self.line_search_steps,
            backtrack_ratio: self.backtrack_ratio,
            accept_ratio: self.accept_ratio,
        }
    }
}

/// Why a policy step was not taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    MalformedTrajectory,
    NonFiniteGradient,
    ZeroGradient,
    NonFiniteDirection,
    NonPositiveCurvature,
    LineSearchExhausted,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            RejectReason::MalformedTrajectory => "malformed trajectory",
            RejectReason::NonFiniteGradient => "non-finite policy gradient",
            RejectReason::ZeroGradient => "zero policy gradient",
            RejectReason::NonFiniteDirection => "no finite search direction",
            RejectReason::NonPositiveCurvature => "non-positive curvature along the search direction",
            RejectReason::LineSearchExhausted => "line search exhausted",
        };
        f.write_str(reason)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateOutcome {
    Accepted,
    Rejected(RejectReason),
}

impl UpdateOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, UpdateOutcome::Accepted)
    }
}

/// Everything one update measured
#[derive(Debug, Clone)]
pub struct UpdateReport {
    pub outcome: UpdateOutcome,
    /// Accepted fraction of the full step, `0` on rejection
    pub step_fraction: f32,
    /// `sqrt(2δ / x·Fx)`, the scale that makes the predicted KL equal δ
    pub kl_coefficient: f32,
    /// `step_fraction · kl_coefficient`
    pub effective_lr: f32,
    /// `½·(fraction·coefficient)²·x·Fx` for the accepted fraction
    pub predicted_kl: f32,
    /// Measured mean KL of the accepted (or last attempted) candidate
    pub kl: f32,
    /// Surrogate improvement `ΔL` of the accepted (or last attempted) candidate
    pub improvement: f32,
    /// Linear-model prediction `g·full_step·fraction`
    pub expected_improvement: f32,
    pub surrogate_before: f32,
    pub line_search_attempts: usize,
    pub cg_iterations: usize,
    pub cg_residual: f32,
    pub value_loss_before: f32,
    pub value_loss_after: f32,
    /// The value fit made the loss worse and was discarded
    pub value_fit_reverted: bool,
    /// Conjugate-gradient solution `x`
    pub search_direction: Vec<f32>,
    /// `kl_coefficient · x`
    pub full_step: Vec<f32>,
}

impl UpdateReport {
    fn new(outcome: UpdateOutcome) -> Self {
        Self {
            outcome,
            step_fraction: 0.0,
            kl_coefficient: 0.0,
            effective_lr: 0.0,
            predicted_kl: 0.0,
            kl: 0.0,
            improvement: 0.0,
            expected_improvement: 0.0,
            surrogate_before: 0.0,
            line_search_attempts: 0,
            cg_iterations: 0,
            cg_residual: 0.0,
            value_loss_before: 0.0,
            value_loss_after: 0.0,
            value_fit_reverted: false,
            search_direction: Vec::new(),
            full_step: Vec::new(),
        }
    }

    fn rejected(reason: RejectReason) -> Self {
        Self::new(UpdateOutcome::Rejected(reason))
    }
}

/// TRPO Agent for continuous action spaces
///
/// This agent is generic over:
/// - `B`: Autodiff backend (e.g., `Autodiff<NdArray>`)
/// - `Actor`: Gaussian policy implementing [`TRPOActorModel`]
/// - `Critic`: Value network implementing [`TRPOCriticModel`]
/// - `E`: Environment with real-valued observations and actions
pub struct TRPOAgent<B, Actor, Critic, E>
where
    B: AutodiffBackend,
    Actor: AutodiffModule<B>,
    Critic: AutodiffModule<B>,
{
    actor: Actor,
    critic: Critic,

    device: B::Device,
    config: TRPOAgentConfig,

    // Observation normalization and sampling noise
    filter: ZFilter,
    rng: StdRng,

    // Training state
    total_steps: usize,
    learn_mode: bool,

    optimizer_critic: OptimizerAdaptor<AdamW, Critic, B>,

    _env: PhantomData<E>,
}

impl<B, Actor, Critic, E> TRPOAgent<B, Actor, Critic, E>
where
    B: AutodiffBackend,
    Actor: TRPOActorModel<B>,
    Critic: TRPOCriticModel<B>,
    E: Environment<State = Vec<f32>, Action = Vec<f32>>,
{
    /// Create a new TRPO agent
    ///
    /// `seed` drives action noise and mini-batch shuffling.
    pub fn new(
        actor: Actor,
        critic: Critic,
        config: TRPOAgentConfig,
        observation_dim: usize,
        seed: u64,
        device: B::Device,
    ) -> Self {
        let optimizer_critic = AdamWConfig::new()
            .with_weight_decay(config.value_fit.l2_rate)
            .init();

        Self {
            actor,
            critic,
            device,
            filter: ZFilter::new(observation_dim, config.obs_clip),
            config,
            rng: StdRng::seed_from_u64(seed),
            total_steps: 0,
            learn_mode: true,
            optimizer_critic,
            _env: PhantomData,
        }
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    pub fn critic(&self) -> &Critic {
        &self.critic
    }

    pub fn filter(&self) -> &ZFilter {
        &self.filter
    }

    pub fn config(&self) -> &TRPOAgentConfig {
        &self.config
    }

    /// Get total number of environment steps taken
    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    pub fn is_training(&self) -> bool {
        self.learn_mode
    }

    /// Deterministic actions, frozen observation statistics
    pub fn eval(&mut self) {
        self.learn_mode = false;
    }

    pub fn train(&mut self) {
        self.learn_mode = true;
    }

    /// Replace parameters and observation statistics with stored ones
    ///
    /// Fails without touching the agent if any length disagrees.
    pub fn load_state(&mut self, actor_params: &[f32], critic_params: &[f32], filter: RunningStat) -> Result<()> {
        let expected_actor = self.actor.num_flat_params();
        let expected_critic = self.critic.num_flat_params();
        if actor_params.len() != expected_actor {
            return Err(TrpoError::Checkpoint(format!(
                "actor has {expected_actor} parameters, checkpoint holds {}",
                actor_params.len()
            )));
        }
        if critic_params.len() != expected_critic {
            return Err(TrpoError::Checkpoint(format!(
                "critic has {expected_critic} parameters, checkpoint holds {}",
                critic_params.len()
            )));
        }
        if filter.dim() != self.filter.stat().dim() {
            return Err(TrpoError::Checkpoint(format!(
                "observation filter has dimension {}, checkpoint holds {}",
                self.filter.stat().dim(),
                filter.dim()
            )));
        }

        self.actor = self.actor.clone().with_flat_params(actor_params);
        self.critic = self.critic.clone().with_flat_params(critic_params);
        self.filter = ZFilter::from_stat(filter, self.config.obs_clip);
        Ok(())
    }

    /// Select an action for an already normalized observation
    ///
    /// Samples `mean + σ·ε`, `ε ~ N(0, I)`, in training mode and returns the
    /// mean in evaluation mode.
    pub fn act(&mut self, state: &[f32]) -> Vec<f32> {
        let state_tensor: Tensor<B, 2> = [state.to_vec()].as_slice().to_tensor(&self.device);
        let (mean, log_std) = self.actor.forward(state_tensor);
        let mean = tensor_values(mean.detach());

        if !self.learn_mode {
            return mean;
        }

        let log_std = tensor_values(log_std.detach());
        mean.iter()
            .zip(&log_std)
            .map(|(m, s)| {
                let noise: f32 = self.rng.sample(StandardNormal);
                m + s.exp() * noise
            })
            .collect()
    }

    /// Run one episode, appending its steps to `trajectory`
    fn run_episode(&mut self, env: &mut E, trajectory: &mut Trajectory) {
        let update_filter = self.learn_mode;
        let raw = env.reset();
        let mut state = self.filter.apply(&raw, update_filter);
        let mut score = 0.0;

        for t in 0..self.config.max_episode_steps {
            let action = self.act(&state);
            let (next_state, reward) = env.step(action.clone());
            score += reward;
            self.total_steps += 1;

            let done = next_state.is_none() || t + 1 == self.config.max_episode_steps;
            trajectory.push(Step {
                state,
                action,
                reward,
                mask: if done { 0.0 } else { 1.0 },
            });

            match next_state {
                Some(next) if !done => state = self.filter.apply(&next, update_filter),
                _ => break,
            }
        }

        trajectory.finish_episode(score);
    }

    /// Collect whole episodes until at least `min_steps_per_iteration` steps
    pub fn collect_trajectory(&mut self, env: &mut E) -> Trajectory {
        let mut trajectory = Trajectory::new();
        while trajectory.len() < self.config.min_steps_per_iteration {
            let before = trajectory.len();
            self.run_episode(env, &mut trajectory);
            if trajectory.len() == before {
                // max_episode_steps == 0
                break;
            }
        }
        trajectory
    }

    /// Undiscounted returns of `episodes` deterministic episodes
    ///
    /// Leaves the agent in the mode it was in.
    pub fn evaluate(&mut self, env: &mut E, episodes: usize) -> Vec<f32> {
        let was_training = self.learn_mode;
        self.learn_mode = false;

        let mut trajectory = Trajectory::new();
        for _ in 0..episodes {
            self.run_episode(env, &mut trajectory);
        }

        self.learn_mode = was_training;
        trajectory.episode_scores().to_vec()
    }

    /// One TRPO iteration on a complete batch
    ///
    /// Advantage estimation, natural-gradient policy step, then value fit.
    /// A rejected policy step leaves the actor exactly as it was; a
    /// malformed batch leaves the whole agent untouched.
    pub fn update(&mut self, trajectory: &Trajectory) -> UpdateReport {
        if let Err(err) = trajectory.validate() {
            warn!(%err, "skipping update");
            return UpdateReport::rejected(RejectReason::MalformedTrajectory);
        }

        let (states, actions) = trajectory.to_tensors::<B>(&self.device);

        // Advantages and return targets
        let values = tensor_values(self.critic.forward(states.clone()).detach());
        let table = compute_gae(
            &trajectory.rewards(),
            &trajectory.masks(),
            &values,
            self.config.gamma,
            self.config.gae_lambda,
        );
        let mut advantages = table.advantages;
        normalize_advantages(&mut advantages, self.config.advantage_eps);
        let advantages: Tensor<B, 1> = advantages.to_tensor(&self.device);
        let returns: Tensor<B, 1> = table.returns.to_tensor(&self.device);

        // Policy step against a frozen snapshot
        let snapshot = PolicySnapshot::capture(&self.actor, states.clone(), actions, advantages);
        let (mut report, accepted_step) = self.policy_step(&snapshot);
        if let Some(step) = accepted_step {
            self.actor = snapshot.candidate(&step);
        }

        // Value fit
        let (critic, fit) = fit_value_function(
            self.critic.clone(),
            &mut self.optimizer_critic,
            states,
            returns,
            &self.config.value_fit,
            &mut self.rng,
        );
        self.critic = critic;
        report.value_loss_before = fit.loss_before;
        report.value_loss_after = fit.loss_after;
        report.value_fit_reverted = fit.reverted;

        match report.outcome {
            UpdateOutcome::Accepted => info!(
                fraction = report.step_fraction,
                kl = report.kl,
                improvement = report.improvement,
                value_loss = report.value_loss_after,
                "policy update accepted"
            ),
            UpdateOutcome::Rejected(reason) => warn!(
                %reason,
                value_loss = report.value_loss_after,
                "policy update rejected"
            ),
        }

        report
    }

    /// Compute the natural-gradient step; `Some(delta)` when it is accepted
    fn policy_step(&self, snapshot: &PolicySnapshot<B, Actor>) -> (UpdateReport, Option<Vec<f32>>) {
        let (surrogate_before, gradient) = snapshot.surrogate_gradient();

        let reject = |reason| {
            let mut report = UpdateReport::rejected(reason);
            report.surrogate_before = surrogate_before;
            (report, None)
        };

        if !surrogate_before.is_finite() || !all_finite(&gradient) {
            return reject(RejectReason::NonFiniteGradient);
        }
        if norm(&gradient) == 0.0 {
            return reject(RejectReason::ZeroGradient);
        }

        let mut fisher = snapshot.fisher(self.config.damping);
        let (solution, failure) = solve_direction(&mut fisher, &gradient, &self.config);
        let direction = solution.x.clone();
        if let Some(reason) = failure {
            let (mut report, _) = reject(reason);
            report.cg_iterations = solution.iterations;
            report.cg_residual = solution.final_residual();
            return (report, None);
        }

        // x·Fx, so that ½·step_size²·x·Fx = δ
        let curvature = dot(&direction, &fisher.apply(&direction));
        if !curvature.is_finite() || curvature <= 0.0 {
            let (mut report, _) = reject(RejectReason::NonPositiveCurvature);
            report.cg_iterations = solution.iterations;
            report.cg_residual = solution.final_residual();
            report.search_direction = direction;
            return (report, None);
        }

        let kl_coefficient = (2.0 * self.config.max_kl / curvature).sqrt();
        let full_step = scaled(kl_coefficient, &direction);
        let expected_improvement = dot(&gradient, &full_step);
        debug!(curvature, kl_coefficient, expected_improvement, "search direction");

        let search = backtracking_line_search(
            |fraction| {
                let candidate = snapshot.candidate(&scaled(fraction, &full_step));
                let improvement = snapshot.surrogate(&candidate) - surrogate_before;
                (improvement, snapshot.mean_kl(&candidate))
            },
            expected_improvement,
            &self.config.line_search(),
        );

        let mut report = UpdateReport::new(match search.accepted {
            Some(_) => UpdateOutcome::Accepted,
            None => UpdateOutcome::Rejected(RejectReason::LineSearchExhausted),
        });
        report.surrogate_before = surrogate_before;
        report.kl_coefficient = kl_coefficient;
        report.cg_iterations = solution.iterations;
        report.cg_residual = solution.final_residual();
        report.line_search_attempts = search.attempts.len();

        let last = search.accepted_attempt().or(search.attempts.last());
        if let Some(attempt) = last {
            report.kl = attempt.kl;
            report.improvement = attempt.improvement;
            report.expected_improvement = attempt.expected_improvement;
        }

        let accepted_step = search.accepted_attempt().map(|attempt| {
            let fraction = attempt.fraction;
            report.step_fraction = fraction;
            report.effective_lr = fraction * kl_coefficient;
            report.predicted_kl = 0.5 * (fraction * kl_coefficient).powi(2) * curvature;
            scaled(fraction, &full_step)
        });

        report.search_direction = direction;
        report.full_step = full_step;
        (report, accepted_step)
    }
}

/// Solve `F x = g`; a solve that broke down on a NaN or infinity, or left
/// no usable iterate, is a [`RejectReason::NonFiniteDirection`]
fn solve_direction<Op: LinearOperator + ?Sized>(
    fisher: &mut Op,
    gradient: &[f32],
    config: &TRPOAgentConfig,
) -> (CgSolution, Option<RejectReason>) {
    let solution = conjugate_gradient(fisher, gradient, config.cg_iterations, config.cg_residual_tol);
    if solution.is_usable() {
        (solution, None)
    } else {
        if solution.non_finite {
            warn!(iterations = solution.iterations, "conjugate gradient hit a non-finite value");
        }
        (solution, Some(RejectReason::NonFiniteDirection))
    }
}

/// Implementation of TrainableAgent trait for TRPO
impl<B, Actor, Critic, E> TrainableAgent<E> for TRPOAgent<B, Actor, Critic, E>
where
    B: AutodiffBackend,
    Actor: TRPOActorModel<B>,
    Critic: TRPOCriticModel<B>,
    E: Environment<State = Vec<f32>, Action = Vec<f32>>,
{
    type Metrics = UpdateReport;

    fn collect(&mut self, env: &mut E) -> Trajectory {
        self.collect_trajectory(env)
    }

    fn learn(&mut self, trajectory: &Trajectory) -> UpdateReport {
        self.update(trajectory)
    }

    fn total_steps(&self) -> usize {
        self.total_steps
    }

    fn eval(&mut self) {
        self.learn_mode = false;
    }

    fn train(&mut self) {
        self.learn_mode = true;
    }
}

// ============================================================================
// Network implementations for TRPO
// ============================================================================

impl<B: AutodiffBackend> TRPOActorModel<B> for GaussianActor<B> {
    fn forward(&self, states: Tensor<B, 2>) -> (Tensor<B, 2>, Tensor<B, 2>) {
        GaussianActor::forward(self, states)
    }

    fn forward_tangent(&self, states: Tensor<B, 2>, direction: &[f32]) -> (Tensor<B, 2>, Tensor<B, 2>) {
        GaussianActor::forward_tangent(self, states, direction)
    }
}

/// `[batch, features]` → `[batch, 1]`
impl<B: AutodiffBackend> TRPOCriticModel<B> for MLP<B> {
    fn forward(&self, states: Tensor<B, 2>) -> Tensor<B, 2> {
        MLP::forward(self, states)
    }
}
