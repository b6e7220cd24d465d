//! NVRTC compilation, module caching and launch geometry.

use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

use cudarc::driver::{CudaDevice, CudaFunction, LaunchConfig};
use parking_lot::Mutex;

use crate::KernelError;

/// Modules already loaded, keyed by (device_idx, module_name).
static LOADED: OnceLock<Mutex<HashSet<(usize, String)>>> = OnceLock::new();

fn loaded_set() -> &'static Mutex<HashSet<(usize, String)>> {
    LOADED.get_or_init(|| Mutex::new(HashSet::new()))
}

/// Compile and load `cu_source` as `module_name` on the device, once.
pub fn ensure_module(
    device: &Arc<CudaDevice>,
    device_idx: usize,
    module_name: &str,
    cu_source: &str,
    func_names: &[&'static str],
) -> Result<(), KernelError> {
    let key = (device_idx, module_name.to_string());
    let mut set = loaded_set().lock();
    if set.contains(&key) {
        return Ok(());
    }

    let ptx = cudarc::nvrtc::compile_ptx(cu_source).map_err(|e| KernelError::PtxCompile {
        module: module_name.to_string(),
        msg: e.to_string(),
    })?;
    device
        .load_ptx(ptx, module_name, func_names)
        .map_err(|e| KernelError::ModuleLoad {
            module: module_name.to_string(),
            msg: e.to_string(),
        })?;

    tracing::debug!("loaded CUDA module '{}' on device {}", module_name, device_idx);
    set.insert(key);
    Ok(())
}

/// Get a kernel function handle, loading its module if needed.
pub fn get_or_load_func(
    device: &Arc<CudaDevice>,
    device_idx: usize,
    module_name: &str,
    func_name: &str,
    cu_source: &str,
    func_names: &[&'static str],
) -> Result<CudaFunction, KernelError> {
    ensure_module(device, device_idx, module_name, cu_source, func_names)?;
    device
        .get_func(module_name, func_name)
        .ok_or_else(|| KernelError::FuncNotFound {
            module: module_name.to_string(),
            func: func_name.to_string(),
        })
}

/// 1D launch covering `n` threads.
pub fn grid_1d(n: usize, block_size: usize) -> LaunchConfig {
    let grid = n.div_ceil(block_size).max(1);
    LaunchConfig {
        grid_dim: (grid as u32, 1, 1),
        block_dim: (block_size as u32, 1, 1),
        shared_mem_bytes: 0,
    }
}
