//! # nabla-kernels
//!
//! Descriptor-based accelerated kernel library for Nabla functions.
//!
//! Provides:
//! - `KernelLibrary` per device (host backend, or CUDA behind the `cuda` feature)
//! - Owned `TensorDescriptor` handles, released on drop, with live accounting
//! - `add_tensor` / `transform_tensor` kernels driven by descriptors
//! - `get_library` per-device singleton manager

pub mod descriptor;
pub mod error;
pub mod host;
pub mod library;
pub mod manager;

#[cfg(feature = "cuda")]
pub mod cuda;

pub use descriptor::{DescriptorStats, TensorDescriptor, TensorLayout, MAX_DIMS};
pub use error::KernelError;
pub use library::KernelLibrary;
pub use manager::get_library;
