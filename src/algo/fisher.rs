//! Fisher-vector products at a frozen policy snapshot
//!
//! For a diagonal Gaussian the Hessian of the mean KL with respect to the
//! distribution parameters `(μ, log σ)` at zero separation is
//! `diag(1/σ², 2)` per sample and action component. The Fisher-vector
//! product is therefore the Gauss-Newton product
//!
//! ```text
//! F·v = (1/N)·J_μᵀ (J_μ v / σ²) + (1/N)·J_logσᵀ (2·J_logσ v)
//! ```
//!
//! `J v` is an exact forward-mode tangent through the actor and `Jᵀ w` is a
//! single reverse pass, so `F` is never formed and only first-order autodiff
//! is needed.

use burn::{prelude::*, tensor::backend::AutodiffBackend};

use super::{cg::LinearOperator, trpo::TRPOActorModel, vector::axpy};
use crate::nn::{gaussian_kl, gaussian_log_prob};

/// The policy as it was when an update started
///
/// Holds its own clone of the actor; mutating or replacing the live actor
/// afterwards leaves the snapshot untouched.
pub struct PolicySnapshot<B: AutodiffBackend, A> {
    actor: A,
    params: Vec<f32>,
    states: Tensor<B, 2>,
    actions: Tensor<B, 2>,
    advantages: Tensor<B, 1>,
    old_mean: Tensor<B, 2>,
    old_log_std: Tensor<B, 2>,
    old_log_probs: Tensor<B, 1>,
}

impl<B, A> PolicySnapshot<B, A>
where
    B: AutodiffBackend,
    A: TRPOActorModel<B>,
{
    pub fn capture(actor: &A, states: Tensor<B, 2>, actions: Tensor<B, 2>, advantages: Tensor<B, 1>) -> Self {
        let actor = actor.clone();
        let params = actor.flat_params();

        let (mean, log_std) = actor.forward(states.clone());
        let old_mean = mean.detach();
        let old_log_std = log_std.detach();
        let old_log_probs = gaussian_log_prob(old_mean.clone(), old_log_std.clone(), actions.clone()).detach();

        Self {
            actor,
            params,
            states,
            actions,
            advantages: advantages.detach(),
            old_mean,
            old_log_std,
            old_log_probs,
        }
    }

    /// Flat parameters `θ_old`
    pub fn params(&self) -> &[f32] {
        &self.params
    }

    /// A fresh actor carrying `θ_old + delta`
    pub fn candidate(&self, delta: &[f32]) -> A {
        let params: Vec<f32> = self.params.iter().zip(delta).map(|(p, d)| p + d).collect();
        self.actor.clone().with_flat_params(&params)
    }

    /// A fresh actor carrying exactly `θ_old`
    pub fn restore(&self) -> A {
        self.actor.clone()
    }

    pub fn batch_size(&self) -> usize {
        self.states.dims()[0]
    }

    /// Importance-weighted surrogate `mean(exp(log π − log π_old) · A)`
    fn surrogate_tensor(&self, actor: &A) -> Tensor<B, 1> {
        let (mean, log_std) = actor.forward(self.states.clone());
        let log_probs = gaussian_log_prob(mean, log_std, self.actions.clone());
        let ratio = (log_probs - self.old_log_probs.clone()).exp();
        (ratio * self.advantages.clone()).mean()
    }

    pub fn surrogate(&self, actor: &A) -> f32 {
        self.surrogate_tensor(actor).into_scalar().elem::<f32>()
    }

    /// Surrogate value and its gradient at `θ_old`
    pub fn surrogate_gradient(&self) -> (f32, Vec<f32>) {
        let loss = self.surrogate_tensor(&self.actor);
        let value = loss.clone().into_scalar().elem::<f32>();
        let grads = loss.backward();
        (value, self.actor.flat_grads(&grads))
    }

    fn kl_tensor(&self, actor: &A) -> Tensor<B, 1> {
        let (mean, log_std) = actor.forward(self.states.clone());
        gaussian_kl(self.old_mean.clone(), self.old_log_std.clone(), mean, log_std)
    }

    /// `mean KL(π_old ‖ π_candidate)` over the batch
    pub fn mean_kl(&self, actor: &A) -> f32 {
        self.kl_tensor(actor).into_scalar().elem::<f32>()
    }

    /// Gradient of [`Self::mean_kl`] with respect to the candidate's parameters
    pub fn kl_gradient(&self, actor: &A) -> Vec<f32> {
        let grads = self.kl_tensor(actor).backward();
        actor.flat_grads(&grads)
    }

    /// The damped curvature operator `v ↦ F·v + damping·v`
    pub fn fisher(&self, damping: f32) -> FisherVectorProduct<'_, B, A> {
        let inv_var = self.old_log_std.clone().mul_scalar(-2.0).exp();
        FisherVectorProduct {
            snapshot: self,
            damping,
            inv_var,
        }
    }
}

/// `v ↦ F·v + damping·v` evaluated at a [`PolicySnapshot`]
///
/// Linear in `v` and deterministic for a given snapshot.
pub struct FisherVectorProduct<'a, B: AutodiffBackend, A> {
    snapshot: &'a PolicySnapshot<B, A>,
    damping: f32,
    inv_var: Tensor<B, 2>,
}

impl<B, A> FisherVectorProduct<'_, B, A>
where
    B: AutodiffBackend,
    A: TRPOActorModel<B>,
{
    /// `F·v` without damping
    pub fn curvature_product(&self, v: &[f32]) -> Vec<f32> {
        let snapshot = self.snapshot;
        let scale = 1.0 / snapshot.batch_size() as f32;

        let (d_mean, d_log_std) = snapshot.actor.forward_tangent(snapshot.states.clone(), v);
        let w_mean = (d_mean * self.inv_var.clone()).mul_scalar(scale).detach();
        let w_log_std = d_log_std.mul_scalar(2.0 * scale).detach();

        // Jᵀw as the gradient of ⟨J(θ), w⟩
        let (mean, log_std) = snapshot.actor.forward(snapshot.states.clone());
        let inner = (mean * w_mean).sum() + (log_std * w_log_std).sum();
        let grads = inner.backward();
        snapshot.actor.flat_grads(&grads)
    }
}

impl<B, A> LinearOperator for FisherVectorProduct<'_, B, A>
where
    B: AutodiffBackend,
    A: TRPOActorModel<B>,
{
    fn apply(&mut self, v: &[f32]) -> Vec<f32> {
        let mut out = self.curvature_product(v);
        axpy(self.damping, v, &mut out);
        out
    }
}
