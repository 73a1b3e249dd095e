//! Supervised regression of the value function onto GAE return targets

use burn::{
    nn::loss::{MseLoss, Reduction},
    optim::{GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use rand::{rngs::StdRng, seq::SliceRandom};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::trpo::TRPOCriticModel;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValueFitConfig {
    /// Critic learning rate (default: 3e-4)
    pub lr: f64,
    /// L2 penalty, applied as AdamW weight decay (default: 1e-3)
    pub l2_rate: f32,
    /// Passes over the batch per update (default: 5)
    pub epochs: usize,
    /// Mini-batch size (default: 64)
    pub batch_size: usize,
}

impl Default for ValueFitConfig {
    fn default() -> Self {
        Self {
            lr: 3e-4,
            l2_rate: 1e-3,
            epochs: 5,
            batch_size: 64,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ValueFitReport {
    /// Full-batch MSE before fitting
    pub loss_before: f32,
    /// Full-batch MSE of the critic that was kept
    pub loss_after: f32,
    /// Optimizer steps taken
    pub updates: usize,
    /// The fit raised the full-batch loss and was discarded
    pub reverted: bool,
}

fn full_batch_loss<B: AutodiffBackend, C: TRPOCriticModel<B>>(
    critic: &C,
    states: Tensor<B, 2>,
    returns: Tensor<B, 1>,
) -> f32 {
    let predicted = critic.forward(states).squeeze_dims::<1>(&[1]);
    MseLoss::new()
        .forward(predicted, returns, Reduction::Mean)
        .into_scalar()
        .elem::<f32>()
}

/// Minimize `mean((V(s) − R)²)` over shuffled mini-batches
///
/// The full-batch loss never goes up: if the passes end above where they
/// started, the critic's parameters are put back.
pub fn fit_value_function<B, C, O>(
    mut critic: C,
    optimizer: &mut O,
    states: Tensor<B, 2>,
    returns: Tensor<B, 1>,
    config: &ValueFitConfig,
    rng: &mut StdRng,
) -> (C, ValueFitReport)
where
    B: AutodiffBackend,
    C: TRPOCriticModel<B>,
    O: Optimizer<C, B>,
{
    let device = states.device();
    let n_samples = states.dims()[0];
    let loss_before = full_batch_loss(&critic, states.clone(), returns.clone());
    let params_before = critic.flat_params();

    let mut indices: Vec<usize> = (0..n_samples).collect();
    let mut updates = 0;

    for _epoch in 0..config.epochs {
        indices.shuffle(rng);

        for batch in indices.chunks(config.batch_size.max(1)) {
            let batch_indices: Vec<i32> = batch.iter().map(|&i| i as i32).collect();
            let batch_indices = Tensor::<B, 1, Int>::from_data(
                TensorData::from(batch_indices.as_slice()).convert::<B::IntElem>(),
                &device,
            );
            let batch_states = states.clone().select(0, batch_indices.clone());
            let batch_returns = returns.clone().select(0, batch_indices);

            let predicted = critic.forward(batch_states).squeeze_dims::<1>(&[1]);
            let loss = MseLoss::new().forward(predicted, batch_returns, Reduction::Mean);

            let grads = GradientsParams::from_grads(loss.backward(), &critic);
            critic = optimizer.step(config.lr, critic, grads);
            updates += 1;
        }
    }

    let mut loss_after = full_batch_loss(&critic, states, returns);
    let reverted = loss_after.is_nan() || loss_after > loss_before;
    if reverted {
        critic = critic.with_flat_params(&params_before);
        loss_after = loss_before;
    }

    debug!(loss_before, loss_after, updates, reverted, "value function fit");
    (
        critic,
        ValueFitReport {
            loss_before,
            loss_after,
            updates,
            reverted,
        },
    )
}
