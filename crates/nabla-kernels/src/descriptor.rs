//! Tensor descriptors: library-owned layout handles.
//!
//! A [`TensorDescriptor`] is acquired from a [`KernelLibrary`](crate::KernelLibrary)
//! and released when dropped, so every acquisition is paired with exactly one
//! release no matter how the owner exits.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use nabla_core::DType;
use smallvec::SmallVec;

use crate::KernelError;

/// Maximum rank a descriptor can describe.
pub const MAX_DIMS: usize = 8;

static NEXT_DESCRIPTOR_ID: AtomicU64 = AtomicU64::new(0);

/// Descriptor accounting shared by a library and the descriptors it issued.
#[derive(Debug, Default)]
pub struct DescriptorStats {
    pub(crate) live: AtomicUsize,
    pub(crate) created: AtomicUsize,
    pub(crate) destroyed: AtomicUsize,
}

impl DescriptorStats {
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn destroyed(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }
}

/// Element type, extents and strides (in elements) of a tensor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorLayout {
    pub dtype: DType,
    pub dims: SmallVec<[usize; MAX_DIMS]>,
    pub strides: SmallVec<[usize; MAX_DIMS]>,
}

impl TensorLayout {
    pub fn numel(&self) -> usize {
        self.dims.iter().product()
    }

    /// Number of elements the layout reaches into its buffer.
    pub fn span(&self) -> usize {
        1 + self
            .dims
            .iter()
            .zip(&self.strides)
            .map(|(&d, &s)| (d - 1) * s)
            .sum::<usize>()
    }

    pub fn is_contiguous(&self) -> bool {
        let mut expected = 1;
        for (&d, &s) in self.dims.iter().zip(&self.strides).rev() {
            if d != 1 && s != expected {
                return false;
            }
            expected *= d;
        }
        true
    }

    /// Buffer offset of the element at row-major position `flat`.
    pub fn offset_of(&self, flat: usize) -> usize {
        let mut remaining = flat;
        let mut offset = 0;
        for (&d, &s) in self.dims.iter().zip(&self.strides).rev() {
            offset += (remaining % d) * s;
            remaining /= d;
        }
        offset
    }
}

/// Owned tensor descriptor.
#[derive(Debug)]
pub struct TensorDescriptor {
    id: u64,
    layout: Option<TensorLayout>,
    stats: Arc<DescriptorStats>,
}

impl TensorDescriptor {
    /// Only the library creates descriptors; it has already counted this one.
    pub(crate) fn acquire(stats: Arc<DescriptorStats>) -> Self {
        let id = NEXT_DESCRIPTOR_ID.fetch_add(1, Ordering::Relaxed);
        tracing::trace!("tensor descriptor {} created", id);
        Self {
            id,
            layout: None,
            stats,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_set(&self) -> bool {
        self.layout.is_some()
    }

    /// Current layout, or an error if never set.
    pub fn layout(&self) -> Result<&TensorLayout, KernelError> {
        self.layout.as_ref().ok_or(KernelError::DescriptorNotSet)
    }

    /// Describe a packed NCHW tensor.
    pub fn set_4d(&mut self, dtype: DType, n: usize, c: usize, h: usize, w: usize) -> Result<(), KernelError> {
        self.set_nd(dtype, &[n, c, h, w], &[c * h * w, h * w, w, 1])
    }

    /// Describe an arbitrary strided tensor.
    ///
    /// Rank must be in `1..=MAX_DIMS`; extents and strides must be positive.
    /// On error the previous layout is kept.
    pub fn set_nd(&mut self, dtype: DType, dims: &[usize], strides: &[usize]) -> Result<(), KernelError> {
        if dims.is_empty() || dims.len() > MAX_DIMS {
            return Err(KernelError::BadParam(format!(
                "descriptor rank {} outside 1..={}",
                dims.len(),
                MAX_DIMS
            )));
        }
        if dims.len() != strides.len() {
            return Err(KernelError::BadParam(format!(
                "{} dims but {} strides",
                dims.len(),
                strides.len()
            )));
        }
        if dims.iter().any(|&d| d == 0) || strides.iter().any(|&s| s == 0) {
            return Err(KernelError::BadParam(format!(
                "non-positive extent or stride in dims={dims:?} strides={strides:?}"
            )));
        }
        self.layout = Some(TensorLayout {
            dtype,
            dims: SmallVec::from_slice(dims),
            strides: SmallVec::from_slice(strides),
        });
        Ok(())
    }
}

impl Drop for TensorDescriptor {
    fn drop(&mut self) {
        self.stats.live.fetch_sub(1, Ordering::SeqCst);
        self.stats.destroyed.fetch_add(1, Ordering::SeqCst);
        tracing::trace!("tensor descriptor {} destroyed", self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> (TensorDescriptor, Arc<DescriptorStats>) {
        let stats = Arc::new(DescriptorStats::default());
        stats.live.fetch_add(1, Ordering::SeqCst);
        stats.created.fetch_add(1, Ordering::SeqCst);
        (TensorDescriptor::acquire(Arc::clone(&stats)), stats)
    }

    #[test]
    fn test_drop_releases_once() {
        let (d, stats) = descriptor();
        assert_eq!(stats.live(), 1);
        drop(d);
        assert_eq!(stats.live(), 0);
        assert_eq!(stats.destroyed(), 1);
    }

    #[test]
    fn test_set_4d() {
        let (mut d, _) = descriptor();
        assert!(!d.is_set());
        assert!(matches!(d.layout(), Err(KernelError::DescriptorNotSet)));

        d.set_4d(DType::F32, 2, 3, 4, 5).unwrap();
        let l = d.layout().unwrap();
        assert_eq!(l.dims.as_slice(), &[2, 3, 4, 5]);
        assert_eq!(l.strides.as_slice(), &[60, 20, 5, 1]);
        assert_eq!(l.numel(), 120);
        assert_eq!(l.span(), 120);
        assert!(l.is_contiguous());
    }

    #[test]
    fn test_set_nd_validation() {
        let (mut d, _) = descriptor();
        assert!(d.set_nd(DType::F32, &[], &[]).is_err());
        assert!(d.set_nd(DType::F32, &[2, 0], &[1, 1]).is_err());
        assert!(d.set_nd(DType::F32, &[2, 2], &[1]).is_err());
        assert!(d.set_nd(DType::F32, &[1; 9], &[1; 9]).is_err());
        assert!(!d.is_set());

        d.set_nd(DType::F64, &[2, 3], &[1, 2]).unwrap();
        let l = d.layout().unwrap();
        assert!(!l.is_contiguous());
        assert_eq!(l.span(), 6);
        // row-major position 1 is (0, 1) -> offset 2
        assert_eq!(l.offset_of(1), 2);
        assert_eq!(l.offset_of(3), 1);
    }
}
