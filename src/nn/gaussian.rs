//! Diagonal Gaussian policy
//!
//! The mean comes from an [`MLP`]; the log standard deviation is a learnable,
//! state-independent vector shared by every state in the batch.

use std::f32::consts::PI;

use burn::{
    module::{Module, Param},
    prelude::*,
    tensor::backend::{AutodiffBackend, Backend},
};

use super::{
    flat::{param_len, param_with_values, push_param_grad, push_param_values, tensor_from_slice, FlatParams},
    mlp::{MLPConfig, MLP},
};

/// Configuration for [`GaussianActor`]
#[derive(Config, Debug)]
pub struct GaussianActorConfig {
    /// Observation dimension
    pub state_dim: usize,
    /// Action dimension
    pub action_dim: usize,
    /// Hidden layers of the mean network
    #[config(default = "vec![64, 64]")]
    pub hidden_layers: Vec<usize>,
    /// ReLU hidden activations instead of tanh
    #[config(default = "false")]
    pub use_relu: bool,
    /// Initial value of every log-std component
    #[config(default = 0.0)]
    pub initial_log_std: f32,
}

/// Diagonal Gaussian policy `π(a|s) = N(μ(s), diag(σ²))`
#[derive(Module, Debug)]
pub struct GaussianActor<B: Backend> {
    mean_net: MLP<B>,
    log_std: Param<Tensor<B, 1>>,
}

impl GaussianActorConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> GaussianActor<B> {
        let mean_net = MLPConfig::new(self.state_dim, self.hidden_layers.clone(), self.action_dim)
            .with_use_relu(self.use_relu)
            .init(device);
        let log_std = Tensor::<B, 1>::full([self.action_dim], self.initial_log_std, device);

        GaussianActor {
            mean_net,
            log_std: Param::from_tensor(log_std),
        }
    }
}

impl<B: Backend> GaussianActor<B> {
    /// `states [N, S]` → `(mean [N, A], log_std [N, A])`
    pub fn forward(&self, states: Tensor<B, 2>) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let mean = self.mean_net.forward(states);
        let log_std = mean.zeros_like() + self.log_std.val().unsqueeze();
        (mean, log_std)
    }

    /// Directional derivatives `(J_mean·v, J_log_std·v)` along a flat direction
    ///
    /// Exact and linear in `direction`; both outputs are detached.
    pub fn forward_tangent(&self, states: Tensor<B, 2>, direction: &[f32]) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let mean_len = self.mean_net.flat_len();
        let (mean, d_mean) = self.mean_net.forward_tangent(states, &direction[..mean_len]);

        let [action_dim] = self.log_std.val().dims();
        let d_log_std = tensor_from_slice::<B, 1>(
            &direction[mean_len..mean_len + action_dim],
            [action_dim],
            &mean.device(),
        );
        let d_log_std = mean.zeros_like() + d_log_std.unsqueeze();

        (d_mean, d_log_std)
    }

    pub fn action_dim(&self) -> usize {
        param_len(&self.log_std)
    }

    fn flat_len(&self) -> usize {
        self.mean_net.flat_len() + param_len(&self.log_std)
    }
}

impl<B: AutodiffBackend> FlatParams<B> for GaussianActor<B> {
    fn num_flat_params(&self) -> usize {
        self.flat_len()
    }

    fn flat_params(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.flat_len());
        self.mean_net.flat_params_into(&mut out);
        push_param_values(&mut out, &self.log_std);
        out
    }

    fn with_flat_params(mut self, params: &[f32]) -> Self {
        assert_eq!(params.len(), self.flat_len(), "flat parameter length mismatch");
        let (mean_net, used) = self.mean_net.with_params_prefix(params);
        self.mean_net = mean_net;
        self.log_std = param_with_values(self.log_std, &params[used..]);
        self
    }

    fn flat_grads(&self, grads: &B::Gradients) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.flat_len());
        self.mean_net.flat_grads_into(&mut out, grads);
        push_param_grad(&mut out, &self.log_std, grads);
        out
    }
}

/// Log density of `actions` under `N(mean, exp(log_std)²)`, summed over the
/// action dimensions: `[N, A]` → `[N]`
pub fn gaussian_log_prob<B: Backend>(
    mean: Tensor<B, 2>,
    log_std: Tensor<B, 2>,
    actions: Tensor<B, 2>,
) -> Tensor<B, 1> {
    let std = log_std.clone().exp();
    let z = (actions - mean) / std;
    (z.clone() * z)
        .mul_scalar(-0.5)
        .sub(log_std)
        .sub_scalar(0.5 * (2.0 * PI).ln())
        .sum_dim(1)
        .squeeze_dims(&[1])
}

/// Mean over the batch of `KL(old ‖ new)` between diagonal Gaussians
///
/// ```text
/// KL = Σ_a [ log σ − log σ_old + (σ_old² + (μ_old − μ)²) / (2σ²) − ½ ]
/// ```
///
/// Returns a one-element tensor.
pub fn gaussian_kl<B: Backend>(
    old_mean: Tensor<B, 2>,
    old_log_std: Tensor<B, 2>,
    mean: Tensor<B, 2>,
    log_std: Tensor<B, 2>,
) -> Tensor<B, 1> {
    let old_var = old_log_std.clone().mul_scalar(2.0).exp();
    let var = log_std.clone().mul_scalar(2.0).exp();
    let diff = old_mean - mean;

    let kl = log_std - old_log_std + (old_var + diff.clone() * diff) / var.mul_scalar(2.0);
    kl.sub_scalar(0.5).sum_dim(1).mean()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{ndarray::NdArrayDevice, Autodiff, NdArray};

    type TestBackend = Autodiff<NdArray>;

    fn values<const D: usize>(tensor: Tensor<TestBackend, D>) -> Vec<f32> {
        tensor.into_data().iter::<f32>().collect()
    }

    #[test]
    fn forward_shapes_and_shared_log_std() {
        let device = NdArrayDevice::default();
        let actor = GaussianActorConfig::new(3, 2)
            .with_initial_log_std(-0.5)
            .init::<TestBackend>(&device);

        let states = Tensor::<TestBackend, 2>::zeros([4, 3], &device);
        let (mean, log_std) = actor.forward(states);
        assert_eq!(mean.dims(), [4, 2]);
        assert_eq!(log_std.dims(), [4, 2]);
        assert!(values(log_std).iter().all(|v| (*v + 0.5).abs() < 1e-6));
    }

    #[test]
    fn flat_params_put_log_std_last() {
        let device = NdArrayDevice::default();
        let actor = GaussianActorConfig::new(2, 1)
            .with_hidden_layers(vec![])
            .init::<TestBackend>(&device);
        assert_eq!(actor.num_flat_params(), 2 + 1 + 1);

        let actor = actor.with_flat_params(&[0.1, 0.2, 0.3, -1.0]);
        assert_eq!(actor.flat_params(), vec![0.1, 0.2, 0.3, -1.0]);

        let states = Tensor::<TestBackend, 2>::zeros([1, 2], &device);
        let (_, log_std) = actor.forward(states);
        assert_eq!(values(log_std), vec![-1.0]);
    }

    #[test]
    fn log_prob_matches_closed_form() {
        let device = NdArrayDevice::default();
        let mean = Tensor::<TestBackend, 2>::from_floats([[0.0, 1.0]], &device);
        let log_std = Tensor::<TestBackend, 2>::from_floats([[0.0, 2.0_f32.ln()]], &device);
        let actions = Tensor::<TestBackend, 2>::from_floats([[1.0, 1.0]], &device);

        let log_prob = values(gaussian_log_prob(mean, log_std, actions));
        let half_log_two_pi = 0.5 * (2.0 * PI).ln();
        let expected = (-0.5 - half_log_two_pi) + (-(2.0_f32.ln()) - half_log_two_pi);
        assert!((log_prob[0] - expected).abs() < 1e-5);
    }

    #[test]
    fn kl_of_identical_distributions_is_zero() {
        let device = NdArrayDevice::default();
        let mean = Tensor::<TestBackend, 2>::from_floats([[0.3, -1.0], [2.0, 0.5]], &device);
        let log_std = Tensor::<TestBackend, 2>::from_floats([[0.1, -0.4], [0.1, -0.4]], &device);

        let kl = values(gaussian_kl(mean.clone(), log_std.clone(), mean, log_std));
        assert!(kl[0].abs() < 1e-6);
    }

    #[test]
    fn kl_matches_closed_form_for_shifted_mean() {
        let device = NdArrayDevice::default();
        let old_mean = Tensor::<TestBackend, 2>::from_floats([[0.0]], &device);
        let mean = Tensor::<TestBackend, 2>::from_floats([[1.0]], &device);
        let log_std = Tensor::<TestBackend, 2>::from_floats([[0.0]], &device);

        // Equal unit variances: KL = (μ_old − μ)² / 2
        let kl = values(gaussian_kl(old_mean, log_std.clone(), mean, log_std));
        assert!((kl[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn tangent_of_log_std_is_broadcast_direction() {
        let device = NdArrayDevice::default();
        let actor = GaussianActorConfig::new(2, 2)
            .with_hidden_layers(vec![4])
            .init::<TestBackend>(&device);
        let n = actor.num_flat_params();
        let mut direction = vec![0.0; n];
        direction[n - 2] = 1.5;
        direction[n - 1] = -2.0;

        let states = Tensor::<TestBackend, 2>::ones([3, 2], &device);
        let (d_mean, d_log_std) = actor.forward_tangent(states, &direction);
        assert!(values(d_mean).iter().all(|v| v.abs() < 1e-7));
        assert_eq!(values(d_log_std), vec![1.5, -2.0, 1.5, -2.0, 1.5, -2.0]);
    }
}
