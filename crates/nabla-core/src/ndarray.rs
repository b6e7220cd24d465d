//! Shared, lazily-allocated arrays.
//!
//! An [`NdArray`] is a handle: cloning it shares the underlying storage, which
//! is how an output variable aliases an input in place. Storage is allocated
//! on first use, zero-filled, on whatever device the caller asks for.

use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::{DType, Device, Element, NablaError, Result, Shape, Storage};

/// State behind an [`NdArray`] handle.
#[derive(Debug)]
pub struct ArrayState {
    shape: Shape,
    storage: Option<Storage>,
}

impl ArrayState {
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn is_allocated(&self) -> bool {
        self.storage.is_some()
    }

    /// Storage as currently materialized.
    pub fn storage(&self) -> Result<&Storage> {
        self.storage
            .as_ref()
            .ok_or_else(|| NablaError::StorageError("array has no storage yet".into()))
    }

    /// Make sure storage exists as `dtype` on `device` and return it.
    ///
    /// Missing storage is allocated as zeros. Storage on another device or
    /// of another dtype is replaced by zeros when `write_only` is set, since
    /// its content is about to be overwritten. Otherwise it is moved across
    /// devices, and a different dtype is an error.
    pub fn cast(&mut self, dtype: DType, device: Device, write_only: bool) -> Result<&mut Storage> {
        let numel = self.shape.numel();
        let replace = match &self.storage {
            None => Some(Storage::zeros_on(dtype, numel, device)?),
            Some(s) if write_only && (s.dtype() != dtype || s.device() != device) => {
                tracing::trace!("discarding {} {} storage for {} on {}", s.dtype(), s.device(), dtype, device);
                Some(Storage::zeros_on(dtype, numel, device)?)
            }
            Some(s) if s.dtype() != dtype => {
                return Err(NablaError::DTypeMismatch {
                    expected: dtype,
                    got: s.dtype(),
                });
            }
            Some(s) if s.device() != device => {
                tracing::trace!("moving {} elements {} -> {}", numel, s.device(), device);
                Some(s.to_device(device)?)
            }
            Some(_) => None,
        };
        if let Some(s) = replace {
            self.storage = Some(s);
        }
        self.storage
            .as_mut()
            .ok_or_else(|| NablaError::StorageError("array storage vanished".into()))
    }
}

/// Reference-counted array handle.
#[derive(Debug, Clone)]
pub struct NdArray {
    inner: Arc<RwLock<ArrayState>>,
}

impl NdArray {
    /// Unallocated array of the given shape.
    pub fn new(shape: impl Into<Shape>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(ArrayState {
                shape: shape.into(),
                storage: None,
            })),
        }
    }

    /// Host array holding a copy of `data`.
    pub fn from_slice<T: Element>(data: &[T], shape: &[usize]) -> Result<Self> {
        let shape = Shape::new(shape);
        if shape.numel() != data.len() {
            return Err(NablaError::ShapeMismatch {
                expected: shape.dims().to_vec(),
                got: vec![data.len()],
            });
        }
        Ok(Self {
            inner: Arc::new(RwLock::new(ArrayState {
                shape,
                storage: Some(Storage::from_slice(data)),
            })),
        })
    }

    pub fn shape(&self) -> Shape {
        self.inner.read().shape.clone()
    }

    pub fn numel(&self) -> usize {
        self.inner.read().shape.numel()
    }

    pub fn is_allocated(&self) -> bool {
        self.inner.read().is_allocated()
    }

    /// Whether both handles refer to the same array.
    pub fn ptr_eq(&self, other: &NdArray) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn read(&self) -> RwLockReadGuard<'_, ArrayState> {
        self.inner.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, ArrayState> {
        self.inner.write()
    }

    /// Change the shape. Storage is dropped when the element count changes.
    pub fn reshape(&self, shape: &Shape) {
        let mut state = self.inner.write();
        if state.shape.numel() != shape.numel() {
            state.storage = None;
        }
        state.shape = shape.clone();
    }

    /// Release storage; the next access sees zeros.
    pub fn zero(&self) {
        self.inner.write().storage = None;
    }

    /// Overwrite every element with `value` (host storage).
    pub fn fill<T: Element>(&self, value: T) -> Result<()> {
        let mut state = self.inner.write();
        let storage = state.cast(T::DTYPE, Device::Cpu, true)?;
        storage.as_slice_mut::<T>()?.fill(value);
        Ok(())
    }

    /// Copy the elements out. Unallocated arrays read as zeros.
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        let state = self.inner.read();
        match &state.storage {
            Some(s) => s.to_vec::<T>(),
            None => Ok(vec![T::zero(); state.shape.numel()]),
        }
    }

    /// Replace the content with a copy of `data` on the host.
    pub fn copy_from_slice<T: Element>(&self, data: &[T]) -> Result<()> {
        let mut state = self.inner.write();
        if state.shape.numel() != data.len() {
            return Err(NablaError::ShapeMismatch {
                expected: state.shape.dims().to_vec(),
                got: vec![data.len()],
            });
        }
        state.storage = Some(Storage::from_slice(data));
        Ok(())
    }

    /// Device the storage currently lives on, if allocated.
    pub fn device(&self) -> Option<Device> {
        self.inner.read().storage.as_ref().map(Storage::device)
    }
}
