//! # nabla-core
//!
//! Framework core for Nabla functions.
//!
//! Provides:
//! - `Context` (backend priority, array class, device id) with JSON/env loading
//! - `NdArray` shared, lazily allocated arrays and `Variable` (data + grad)
//! - `Storage` on the host or, with the `cuda` feature, on a CUDA device
//! - The `Function` trait, the `Operator` lifecycle wrapper and `FunctionDb`

pub mod context;
pub mod device;
pub mod dtype;
pub mod error;
pub mod function;
pub mod ndarray;
pub mod registry;
pub mod shape;
pub mod storage;
pub mod variable;
pub mod prelude;

pub use context::{parse_device_id, BackendSpec, Context};
pub use device::Device;
pub use dtype::{DType, Element};
pub use error::NablaError;
pub use function::{Function, Operator};
pub use ndarray::{ArrayState, NdArray};
pub use registry::{Creator, FunctionDb};
pub use shape::Shape;
pub use storage::{Storage, StorageData};
pub use variable::Variable;

pub type Result<T> = std::result::Result<T, NablaError>;
