//! CUDA device handle registry.
//!
//! Provides lazy-initialized singleton `CudaDevice` handles per GPU index.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use cudarc::driver::CudaDevice;
use parking_lot::Mutex;

use crate::KernelError;

static DEVICES: OnceLock<Mutex<HashMap<usize, Arc<CudaDevice>>>> = OnceLock::new();

fn devices() -> &'static Mutex<HashMap<usize, Arc<CudaDevice>>> {
    DEVICES.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Get or create a CUDA device handle for the given GPU index.
pub fn get_device(device_idx: usize) -> Result<Arc<CudaDevice>, KernelError> {
    let mut map = devices().lock();
    if let Some(dev) = map.get(&device_idx) {
        return Ok(Arc::clone(dev));
    }
    let dev = CudaDevice::new(device_idx)
        .map_err(|e| KernelError::DeviceInit(format!("device {}: {}", device_idx, e)))?;
    map.insert(device_idx, Arc::clone(&dev));
    Ok(dev)
}
