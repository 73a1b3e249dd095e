use burn::{
    prelude::*,
    tensor::{backend::Backend, BasicOps, TensorData},
};

/// A trait for converting items to tensors
///
/// Commonly implemented for `Vec<T>` to convert batches of `T` to a tensor of dimension `D`
pub trait ToTensor<B: Backend, const D: usize, K: BasicOps<B>> {
    fn to_tensor(self, device: &B::Device) -> Tensor<B, D, K>;
}

// Implementations

impl<B: Backend> ToTensor<B, 1, Float> for Vec<f32> {
    #[inline]
    fn to_tensor(self, device: &B::Device) -> Tensor<B, 1> {
        let len = self.len();
        Tensor::from_data(TensorData::new(self, [len]).convert::<B::FloatElem>(), device)
    }
}

/// Rows of equal length → `[rows, cols]`, converted to the backend's float element
///
/// # Panics
/// If the rows do not all have the same length.
impl<B: Backend> ToTensor<B, 2, Float> for &[Vec<f32>] {
    fn to_tensor(self, device: &B::Device) -> Tensor<B, 2> {
        let rows = self.len();
        let cols = self.first().map_or(0, Vec::len);

        // Pre-allocate exact capacity to avoid reallocation
        let mut flat = Vec::with_capacity(rows * cols);
        for row in self {
            assert_eq!(row.len(), cols, "ragged batch");
            flat.extend_from_slice(row);
        }

        Tensor::from_data(
            TensorData::new(flat, [rows, cols]).convert::<B::FloatElem>(),
            device,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::{NdArray, NdArrayDevice};

    #[test]
    fn test_vec_f32_to_tensor_1d() {
        let device = NdArrayDevice::default();
        let data = vec![1.0_f32, 2.0, 3.0, 4.0];
        let tensor: Tensor<NdArray, 1> = data.to_tensor(&device);

        assert_eq!(tensor.shape().dims, [4]);
        let tensor_data = tensor.to_data();
        assert_eq!(tensor_data.as_slice::<f32>().unwrap(), &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_rows_to_tensor_2d() {
        let device = NdArrayDevice::default();

        let states = vec![
            vec![1.0_f32, 2.0, 3.0],
            vec![4.0, 5.0, 6.0],
        ];

        let tensor: Tensor<NdArray, 2> = states.as_slice().to_tensor(&device);

        assert_eq!(tensor.shape().dims, [2, 3]);
        let tensor_data = tensor.to_data();
        assert_eq!(
            tensor_data.as_slice::<f32>().unwrap(),
            &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]
        );
    }

    #[test]
    #[should_panic(expected = "ragged batch")]
    fn test_ragged_rows_are_rejected() {
        let device = NdArrayDevice::default();
        let states = vec![vec![1.0_f32, 2.0], vec![3.0]];
        let _: Tensor<NdArray, 2> = states.as_slice().to_tensor(&device);
    }
}
