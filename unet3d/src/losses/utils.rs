//! Tensor reshaping helpers shared by the loss family.

use burn::tensor::{backend::Backend, Int, Tensor};

/// Flattens a tensor such that the channel axis is first.
///
/// The shapes are transformed as follows:
/// `(N, C, D, H, W) -> (C, N * D * H * W)`
///
/// Element identity is preserved: column `j` of channel `c` holds the
/// same value as the original tensor at the `j`-th `(n, d, h, w)`
/// position in row-major order.
pub fn flatten<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Tensor<B, 2> {
    let channels = tensor.dims()[1];
    // (N, C, ...) -> (C, N, ...)
    let transposed = tensor.swap_dims(0, 1);
    transposed.reshape([channels as i32, -1])
}

/// Converts an `(N, D, H, W)` label volume to a one-hot `(N, C, D, H, W)`
/// volume, where each label is stored in a separate channel.
///
/// If `ignore_index` is given, positions equal to it are zeroed before
/// the scatter and restored to the sentinel value in every channel of
/// the output, so downstream consumers can mask them out.
pub fn expand_as_one_hot<B: Backend>(
    labels: Tensor<B, 4, Int>,
    num_classes: usize,
    ignore_index: Option<i64>,
) -> Tensor<B, 5> {
    let [n, d, h, w] = labels.dims();
    let device = labels.device();
    let out_shape = [n, num_classes, d, h, w];

    match ignore_index {
        None => {
            let src = labels.unsqueeze_dim::<5>(1);
            let values = Tensor::ones([n, 1, d, h, w], &device);
            Tensor::zeros(out_shape, &device).scatter(1, src, values)
        }
        Some(ignore) => {
            let ignored = labels.clone().equal_elem(ignore);
            let src = labels.mask_fill(ignored.clone(), 0).unsqueeze_dim::<5>(1);
            let values = Tensor::ones([n, 1, d, h, w], &device);
            let one_hot = Tensor::zeros(out_shape, &device).scatter(1, src, values);
            // bring back the ignore_index in the result
            let ignored = ignored.unsqueeze_dim::<5>(1).expand(out_shape);
            one_hot.mask_fill(ignored, ignore as f64)
        }
    }
}
