//! CUDA dispatch for the library's tensor kernels.

use std::sync::Arc;

use cudarc::driver::{CudaDevice, LaunchAsync};
use nabla_core::{DType, Storage};

use super::launch::{get_or_load_func, grid_1d};
use crate::descriptor::TensorLayout;
use crate::KernelError;

const TENSOR_OPS_CU: &str = include_str!("kernels/tensor_ops.cu");
const TENSOR_OPS_FUNCS: &[&str] = &["add_tensor_f32", "add_tensor_f64"];

const BLOCK_SIZE: usize = 256;

/// `c = alpha * a + beta * c` on the device. Contiguous layouts only.
#[allow(clippy::too_many_arguments)]
pub fn add_tensor(
    device: &Arc<CudaDevice>,
    device_idx: usize,
    alpha: f64,
    a_layout: &TensorLayout,
    a: &Storage,
    beta: f64,
    c_layout: &TensorLayout,
    c: &mut Storage,
) -> Result<(), KernelError> {
    if !a_layout.is_contiguous() || !c_layout.is_contiguous() {
        return Err(KernelError::BadParam(
            "CUDA add_tensor supports contiguous layouts only".into(),
        ));
    }
    let n = c_layout.numel();
    let n_u32 = u32::try_from(n)
        .map_err(|_| KernelError::BadParam(format!("{n} elements exceed one launch")))?;

    let func_name = match c_layout.dtype {
        DType::F32 => "add_tensor_f32",
        DType::F64 => "add_tensor_f64",
        other => return Err(KernelError::UnsupportedDType(other)),
    };
    let f = get_or_load_func(device, device_idx, "tensor_ops", func_name, TENSOR_OPS_CU, TENSOR_OPS_FUNCS)?;

    let a_buf = a
        .as_cuda_slice()
        .ok_or_else(|| KernelError::BadParam("input A is not on a CUDA device".into()))?;
    let c_buf = c
        .as_cuda_slice_mut()
        .ok_or_else(|| KernelError::BadParam("output C is not on a CUDA device".into()))?;

    let cfg = grid_1d(n, BLOCK_SIZE);
    let launched = match c_layout.dtype {
        DType::F32 => unsafe { f.launch(cfg, (a_buf, c_buf, alpha as f32, beta as f32, n_u32)) },
        _ => unsafe { f.launch(cfg, (a_buf, c_buf, alpha, beta, n_u32)) },
    };
    launched.map_err(|e| KernelError::LaunchError(e.to_string()))?;
    // Storages copy on their own streams; results must be visible to them.
    device
        .synchronize()
        .map_err(|e| KernelError::LaunchError(format!("synchronize: {e}")))
}
