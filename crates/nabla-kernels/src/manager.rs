//! Process-wide kernel library handles, one per device index.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use crate::{KernelError, KernelLibrary};

static LIBRARIES: OnceLock<Mutex<HashMap<usize, Arc<KernelLibrary>>>> = OnceLock::new();

fn libraries() -> &'static Mutex<HashMap<usize, Arc<KernelLibrary>>> {
    LIBRARIES.get_or_init(|| Mutex::new(HashMap::new()))
}

#[cfg(feature = "cuda")]
fn init_library(device_idx: usize) -> Result<KernelLibrary, KernelError> {
    KernelLibrary::cuda(device_idx)
}

#[cfg(not(feature = "cuda"))]
fn init_library(device_idx: usize) -> Result<KernelLibrary, KernelError> {
    Ok(KernelLibrary::host(device_idx))
}

/// Get or create the kernel library for `device_idx`.
///
/// With the `cuda` feature the library drives that CUDA device; without it,
/// the host backend stands in.
pub fn get_library(device_idx: usize) -> Result<Arc<KernelLibrary>, KernelError> {
    let mut map = libraries().lock();
    if let Some(lib) = map.get(&device_idx) {
        return Ok(Arc::clone(lib));
    }
    let lib = Arc::new(init_library(device_idx)?);
    tracing::debug!(
        "kernel library for device {} initialized on {}",
        device_idx,
        lib.storage_device()
    );
    map.insert(device_idx, Arc::clone(&lib));
    Ok(lib)
}
