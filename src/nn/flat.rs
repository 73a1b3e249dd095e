//! Flat parameter-vector views of burn modules
//!
//! Trust-region updates treat the policy as a single vector `θ`: it is
//! snapshotted, combined linearly with search directions and written back.
//! The ordering used by [`FlatParams::flat_params`],
//! [`FlatParams::with_flat_params`] and [`FlatParams::flat_grads`] is always
//! the same: layers in order, each weight (row-major `[d_input, d_output]`)
//! followed by its bias, then any extra parameters of the module.

use burn::{
    module::Param,
    nn::Linear,
    prelude::*,
    tensor::backend::AutodiffBackend,
};

/// Flattened get / set / gradient access to a module's parameters
pub trait FlatParams<B: AutodiffBackend>: Sized {
    /// Number of scalars in the flat parameter vector
    fn num_flat_params(&self) -> usize;

    /// Snapshot of all parameters as one vector
    fn flat_params(&self) -> Vec<f32>;

    /// Return the module with its parameters replaced by `params`
    ///
    /// Parameter ids are preserved so optimizer state stays attached.
    ///
    /// # Panics
    /// If `params.len() != self.num_flat_params()`.
    fn with_flat_params(self, params: &[f32]) -> Self;

    /// Gradient of a backpropagated scalar, aligned with [`Self::flat_params`]
    ///
    /// Parameters that did not take part in the graph contribute zeros.
    fn flat_grads(&self, grads: &B::Gradients) -> Vec<f32>;
}

pub(crate) fn tensor_values<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Vec<f32> {
    tensor.into_data().iter::<f32>().collect()
}

pub(crate) fn tensor_from_slice<B: Backend, const D: usize>(
    values: &[f32],
    dims: [usize; D],
    device: &B::Device,
) -> Tensor<B, D> {
    Tensor::from_data(
        TensorData::new(values.to_vec(), dims).convert::<B::FloatElem>(),
        device,
    )
}

pub(crate) fn param_len<B: Backend, const D: usize>(param: &Param<Tensor<B, D>>) -> usize {
    param.val().shape().num_elements()
}

pub(crate) fn param_with_values<B: Backend, const D: usize>(
    param: Param<Tensor<B, D>>,
    values: &[f32],
) -> Param<Tensor<B, D>> {
    param.map(|tensor| {
        let dims = tensor.dims();
        let device = tensor.device();
        tensor_from_slice::<B, D>(values, dims, &device).require_grad()
    })
}

pub(crate) fn push_param_grad<B: AutodiffBackend, const D: usize>(
    out: &mut Vec<f32>,
    param: &Param<Tensor<B, D>>,
    grads: &B::Gradients,
) {
    match param.val().grad(grads) {
        Some(grad) => out.extend(grad.into_data().iter::<f32>()),
        None => out.extend(std::iter::repeat(0.0).take(param_len(param))),
    }
}

pub(crate) fn push_param_values<B: Backend, const D: usize>(
    out: &mut Vec<f32>,
    param: &Param<Tensor<B, D>>,
) {
    out.extend(tensor_values(param.val()));
}

pub(crate) fn linear_len<B: Backend>(layer: &Linear<B>) -> usize {
    param_len(&layer.weight) + layer.bias.as_ref().map_or(0, |bias| param_len(bias))
}

pub(crate) fn push_linear_params<B: Backend>(out: &mut Vec<f32>, layer: &Linear<B>) {
    push_param_values(out, &layer.weight);
    if let Some(bias) = &layer.bias {
        push_param_values(out, bias);
    }
}

/// Replace a layer's parameters from the front of `values`, returning the
/// number of scalars consumed
pub(crate) fn linear_with_params<B: Backend>(
    mut layer: Linear<B>,
    values: &[f32],
) -> (Linear<B>, usize) {
    let weight_len = param_len(&layer.weight);
    layer.weight = param_with_values(layer.weight, &values[..weight_len]);
    let mut used = weight_len;

    if let Some(bias) = layer.bias.take() {
        let bias_len = param_len(&bias);
        layer.bias = Some(param_with_values(bias, &values[used..used + bias_len]));
        used += bias_len;
    }

    (layer, used)
}

pub(crate) fn push_linear_grads<B: AutodiffBackend>(
    out: &mut Vec<f32>,
    layer: &Linear<B>,
    grads: &B::Gradients,
) {
    push_param_grad(out, &layer.weight, grads);
    if let Some(bias) = &layer.bias {
        push_param_grad(out, bias, grads);
    }
}
