use std::fmt;
use std::ops::{Add, Mul};

use serde::{Deserialize, Serialize};

/// Element types an array's storage can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    /// 32-bit IEEE 754 single-precision float ("float")
    F32,
    /// 64-bit IEEE 754 double-precision float ("double")
    F64,
    /// 32-bit signed integer
    I32,
}

impl DType {
    /// Size in bytes of a single element.
    pub fn element_size(&self) -> usize {
        match self {
            DType::F32 | DType::I32 => 4,
            DType::F64 => 8,
        }
    }

    /// Number of bytes needed to store `n` elements of this dtype.
    pub fn storage_bytes(&self, n: usize) -> usize {
        self.element_size() * n
    }

    /// Resolve a backend type config (`"float"`, `"double"`) to a dtype.
    pub fn from_type_config(config: &str) -> Option<DType> {
        match config {
            "float" => Some(DType::F32),
            "double" => Some(DType::F64),
            _ => None,
        }
    }

    /// Type config name used in backend strings, for float dtypes.
    pub fn type_config(&self) -> Option<&'static str> {
        match self {
            DType::F32 => Some("float"),
            DType::F64 => Some("double"),
            DType::I32 => None,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DType::F32 => write!(f, "f32"),
            DType::F64 => write!(f, "f64"),
            DType::I32 => write!(f, "i32"),
        }
    }
}

/// Host element type with a matching [`DType`].
///
/// `Element` is what functions are generic over: a function instantiated for
/// `f32` reads and writes `DType::F32` storage.
pub trait Element:
    bytemuck::Pod + Copy + Send + Sync + PartialEq + fmt::Debug + Add<Output = Self> + Mul<Output = Self>
{
    const DTYPE: DType;

    fn zero() -> Self;

    /// Lossy conversion used for kernel scaling factors.
    fn from_f64(v: f64) -> Self;
}

impl Element for f32 {
    const DTYPE: DType = DType::F32;

    fn zero() -> Self {
        0.0
    }

    fn from_f64(v: f64) -> Self {
        v as f32
    }
}

impl Element for f64 {
    const DTYPE: DType = DType::F64;

    fn zero() -> Self {
        0.0
    }

    fn from_f64(v: f64) -> Self {
        v
    }
}

impl Element for i32 {
    const DTYPE: DType = DType::I32;

    fn zero() -> Self {
        0
    }

    fn from_f64(v: f64) -> Self {
        v as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_sizes() {
        assert_eq!(DType::F32.element_size(), 4);
        assert_eq!(DType::F64.element_size(), 8);
        assert_eq!(DType::I32.element_size(), 4);
        assert_eq!(DType::F64.storage_bytes(3), 24);
    }

    #[test]
    fn test_type_config() {
        assert_eq!(DType::from_type_config("float"), Some(DType::F32));
        assert_eq!(DType::from_type_config("double"), Some(DType::F64));
        assert_eq!(DType::from_type_config("half"), None);
        assert_eq!(DType::F64.type_config(), Some("double"));
        assert_eq!(DType::I32.type_config(), None);
    }

    #[test]
    fn test_element_dtypes() {
        assert_eq!(<f32 as Element>::DTYPE, DType::F32);
        assert_eq!(<f64 as Element>::DTYPE, DType::F64);
        assert_eq!(f32::from_f64(0.5), 0.5f32);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", DType::F32), "f32");
        assert_eq!(format!("{}", DType::F64), "f64");
    }
}
