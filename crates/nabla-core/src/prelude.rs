//! Convenience re-exports for common nabla-core types.
//!
//! ```rust
//! use nabla_core::prelude::*;
//! ```

pub use crate::Context;
pub use crate::DType;
pub use crate::Device;
pub use crate::Function;
pub use crate::NablaError;
pub use crate::Operator;
pub use crate::Result;
pub use crate::Shape;
pub use crate::Variable;
