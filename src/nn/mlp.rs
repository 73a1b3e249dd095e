//! Multi-Layer Perceptron (MLP) - Generic feedforward neural network
//!
//! This module provides the MLP used for the value function and for the mean
//! of the Gaussian policy.

use burn::{
    module::{Ignored, Module},
    nn::{Linear, LinearConfig},
    prelude::*,
    tensor::{activation::relu, backend::AutodiffBackend, backend::Backend},
};

use super::flat::{
    linear_len, linear_with_params, push_linear_grads, push_linear_params, tensor_from_slice,
    FlatParams,
};

/// Configuration for Multi-Layer Perceptron
#[derive(Config, Debug)]
pub struct MLPConfig {
    /// Input dimension
    pub input_dim: usize,
    /// Hidden layer dimensions (e.g., [64, 64] for two hidden layers of 64 units each)
    pub hidden_layers: Vec<usize>,
    /// Output dimension
    pub output_dim: usize,
    /// Use ReLU activation for hidden layers, tanh otherwise (default: true)
    #[config(default = "true")]
    pub use_relu: bool,
}

/// Multi-Layer Perceptron implementation
///
/// Hidden layers use ReLU or tanh, the output layer is linear.
#[derive(Module, Debug)]
pub struct MLP<B: Backend> {
    layers: Vec<Linear<B>>,
    use_relu: Ignored<bool>,
}

impl MLPConfig {
    /// Initialize the MLP with the given configuration
    pub fn init<B: Backend>(&self, device: &B::Device) -> MLP<B> {
        let mut dims = Vec::with_capacity(self.hidden_layers.len() + 2);
        dims.push(self.input_dim);
        dims.extend(self.hidden_layers.iter().copied());
        dims.push(self.output_dim);

        let layers = dims
            .windows(2)
            .map(|pair| LinearConfig::new(pair[0], pair[1]).init(device))
            .collect();

        MLP {
            layers,
            use_relu: Ignored(self.use_relu),
        }
    }
}

impl<B: Backend> MLP<B> {
    /// Generic forward pass - works with any tensor dimension
    ///
    /// The last dimension is always treated as the feature dimension.
    pub fn forward<const D: usize>(&self, input: Tensor<B, D>) -> Tensor<B, D> {
        let output = self.layers.len().saturating_sub(1);

        let mut x = input;
        for (i, layer) in self.layers.iter().enumerate() {
            x = layer.forward(x);
            if i < output {
                x = self.activate(x);
            }
        }
        x
    }

    /// Forward pass together with its directional derivative
    ///
    /// `direction` is a flat parameter-space vector laid out like
    /// [`FlatParams::flat_params`] (only the first `self.flat_len()`
    /// entries are read). Returns `(y, ẏ)` where `ẏ = J_θ y · direction`,
    /// propagated exactly through every layer:
    ///
    /// ```text
    /// z = xW + b      ż = ẋW + xẆ + ḃ
    /// a = σ(z)        ȧ = σ'(z) ⊙ ż
    /// ```
    ///
    /// Both outputs are detached from the autodiff graph.
    pub fn forward_tangent(&self, input: Tensor<B, 2>, direction: &[f32]) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let device = input.device();
        let n_layers = self.layers.len();

        let mut x = input.detach();
        let mut dx = x.zeros_like();
        let mut offset = 0;

        for (i, layer) in self.layers.iter().enumerate() {
            let weight = layer.weight.val().detach();
            let [d_input, d_output] = weight.dims();
            let d_weight = tensor_from_slice::<B, 2>(
                &direction[offset..offset + d_input * d_output],
                [d_input, d_output],
                &device,
            );
            offset += d_input * d_output;

            let mut z = x.clone().matmul(weight.clone());
            let mut dz = dx.matmul(weight) + x.matmul(d_weight);

            if let Some(bias) = &layer.bias {
                let bias = bias.val().detach();
                let d_bias = tensor_from_slice::<B, 1>(&direction[offset..offset + d_output], [d_output], &device);
                offset += d_output;
                z = z + bias.unsqueeze();
                dz = dz + d_bias.unsqueeze();
            }

            if i + 1 < n_layers {
                (x, dx) = self.activate_tangent(z, dz);
            } else {
                x = z;
                dx = dz;
            }
        }

        (x, dx)
    }

    /// Number of scalars in the flat parameter vector
    pub fn flat_len(&self) -> usize {
        self.layers.iter().map(linear_len).sum()
    }

    fn activate<const D: usize>(&self, x: Tensor<B, D>) -> Tensor<B, D> {
        if *self.use_relu {
            relu(x)
        } else {
            x.tanh()
        }
    }

    fn activate_tangent(&self, z: Tensor<B, 2>, dz: Tensor<B, 2>) -> (Tensor<B, 2>, Tensor<B, 2>) {
        if *self.use_relu {
            let inactive = z.clone().lower_equal_elem(0.0);
            (relu(z), dz.mask_fill(inactive, 0.0))
        } else {
            let a = z.tanh();
            let slope = (a.clone() * a.clone()).neg().add_scalar(1.0);
            (a, dz * slope)
        }
    }

    pub(crate) fn flat_params_into(&self, out: &mut Vec<f32>) {
        for layer in &self.layers {
            push_linear_params(out, layer);
        }
    }

    /// Replace parameters from the front of `values`, returning the number of
    /// scalars consumed
    pub(crate) fn with_params_prefix(mut self, values: &[f32]) -> (Self, usize) {
        let mut offset = 0;
        self.layers = self
            .layers
            .into_iter()
            .map(|layer| {
                let (layer, used) = linear_with_params(layer, &values[offset..]);
                offset += used;
                layer
            })
            .collect();
        (self, offset)
    }
}

impl<B: AutodiffBackend> MLP<B> {
    pub(crate) fn flat_grads_into(&self, out: &mut Vec<f32>, grads: &B::Gradients) {
        for layer in &self.layers {
            push_linear_grads(out, layer, grads);
        }
    }
}

impl<B: AutodiffBackend> FlatParams<B> for MLP<B> {
    fn num_flat_params(&self) -> usize {
        self.flat_len()
    }

    fn flat_params(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.flat_len());
        self.flat_params_into(&mut out);
        out
    }

    fn with_flat_params(self, params: &[f32]) -> Self {
        assert_eq!(params.len(), self.flat_len(), "flat parameter length mismatch");
        self.with_params_prefix(params).0
    }

    fn flat_grads(&self, grads: &B::Gradients) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.flat_len());
        self.flat_grads_into(&mut out, grads);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{ndarray::NdArrayDevice, Autodiff, NdArray};

    type TestBackend = Autodiff<NdArray>;

    #[test]
    fn test_mlp_forward_2d() {
        let device = NdArrayDevice::default();

        // Create a simple MLP: 4 → [64, 64] → 2
        let config = MLPConfig::new(4, vec![64, 64], 2);
        let mlp = config.init::<NdArray>(&device);

        let input = Tensor::<NdArray, 2>::random(
            [8, 4],
            burn::tensor::Distribution::Uniform(-1.0, 1.0),
            &device,
        );

        let output: Tensor<NdArray, 2> = mlp.forward(input);

        assert_eq!(output.shape().dims, [8, 2]);
    }

    #[test]
    fn test_mlp_no_hidden_layers() {
        let device = NdArrayDevice::default();

        // Direct connection: 4 → 2
        let config = MLPConfig::new(4, vec![], 2);
        let mlp = config.init::<NdArray>(&device);

        let input = Tensor::<NdArray, 2>::random([1, 4], burn::tensor::Distribution::Default, &device);
        let output = mlp.forward(input);

        assert_eq!(output.shape().dims, [1, 2]);
        assert_eq!(mlp.flat_len(), 4 * 2 + 2);
    }

    #[test]
    fn test_flat_params_roundtrip_preserves_layout() {
        let device = NdArrayDevice::default();
        let mlp = MLPConfig::new(3, vec![5], 2).init::<TestBackend>(&device);

        let n = mlp.num_flat_params();
        assert_eq!(n, 3 * 5 + 5 + 5 * 2 + 2);

        let replacement: Vec<f32> = (0..n).map(|i| i as f32 * 0.01).collect();
        let mlp = mlp.with_flat_params(&replacement);
        assert_eq!(mlp.flat_params(), replacement);
    }

    #[test]
    fn test_flat_grads_align_with_params() {
        let device = NdArrayDevice::default();
        let mlp = MLPConfig::new(2, vec![], 1).init::<TestBackend>(&device);
        // y = x·w + b with w = [1, 2], b = 0.5
        let mlp = mlp.with_flat_params(&[1.0, 2.0, 0.5]);

        let input = Tensor::<TestBackend, 2>::from_floats([[3.0, 4.0]], &device);
        let loss = mlp.forward(input).sum();
        let grads = loss.backward();

        // dy/dw = x, dy/db = 1
        assert_eq!(mlp.flat_grads(&grads), vec![3.0, 4.0, 1.0]);
    }

    #[test]
    fn test_forward_tangent_matches_finite_difference() {
        let device = NdArrayDevice::default();
        for use_relu in [true, false] {
            let mlp = MLPConfig::new(3, vec![8], 2)
                .with_use_relu(use_relu)
                .init::<TestBackend>(&device);
            let n = mlp.num_flat_params();
            let theta = mlp.flat_params();
            let direction: Vec<f32> = (0..n).map(|i| ((i * 7 % 11) as f32 - 5.0) * 0.1).collect();

            let input = Tensor::<TestBackend, 2>::from_floats([[0.3, -0.2, 0.8], [-0.5, 0.1, 0.4]], &device);
            let (y, dy) = mlp.forward_tangent(input.clone(), &direction);

            let plain = mlp.forward(input.clone());
            let y_values: Vec<f32> = y.into_data().iter::<f32>().collect();
            let plain_values: Vec<f32> = plain.into_data().iter::<f32>().collect();
            for (a, b) in y_values.iter().zip(&plain_values) {
                assert!((a - b).abs() < 1e-5);
            }

            let h = 1e-3;
            let shifted = |sign: f32| {
                let params: Vec<f32> = theta.iter().zip(&direction).map(|(t, d)| t + sign * h * d).collect();
                let out = mlp.clone().with_flat_params(&params).forward(input.clone());
                out.into_data().iter::<f32>().collect::<Vec<f32>>()
            };
            let plus = shifted(1.0);
            let minus = shifted(-1.0);
            let dy_values: Vec<f32> = dy.into_data().iter::<f32>().collect();
            for ((p, m), d) in plus.iter().zip(&minus).zip(&dy_values) {
                let fd = (p - m) / (2.0 * h);
                assert!((fd - d).abs() < 5e-3, "relu={use_relu} fd={fd} tangent={d}");
            }
        }
    }
}
