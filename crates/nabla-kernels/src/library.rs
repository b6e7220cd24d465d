//! Kernel library handle: descriptor allocation and tensor kernels for one device.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use nabla_core::{DType, Device, Element, Storage};

#[cfg(feature = "cuda")]
use cudarc::driver::CudaDevice;

use crate::descriptor::{DescriptorStats, TensorDescriptor, TensorLayout};
use crate::{host, KernelError};

#[derive(Debug)]
enum Backend {
    Host,
    #[cfg(feature = "cuda")]
    Cuda(Arc<CudaDevice>),
}

/// Handle on the accelerated kernel library for one device.
///
/// Issues [`TensorDescriptor`]s and runs descriptor-driven kernels on
/// storages living on [`KernelLibrary::storage_device`].
#[derive(Debug)]
pub struct KernelLibrary {
    device_idx: usize,
    backend: Backend,
    stats: Arc<DescriptorStats>,
    descriptor_limit: Option<usize>,
}

impl KernelLibrary {
    /// Library computing on the host, bound to logical device `device_idx`.
    pub fn host(device_idx: usize) -> Self {
        Self {
            device_idx,
            backend: Backend::Host,
            stats: Arc::new(DescriptorStats::default()),
            descriptor_limit: None,
        }
    }

    /// Library computing on CUDA device `device_idx`.
    #[cfg(feature = "cuda")]
    pub fn cuda(device_idx: usize) -> Result<Self, KernelError> {
        let device = crate::cuda::context::get_device(device_idx)?;
        Ok(Self {
            device_idx,
            backend: Backend::Cuda(device),
            stats: Arc::new(DescriptorStats::default()),
            descriptor_limit: None,
        })
    }

    /// Cap the number of simultaneously live descriptors.
    pub fn with_descriptor_limit(mut self, limit: usize) -> Self {
        self.descriptor_limit = Some(limit);
        self
    }

    pub fn device_idx(&self) -> usize {
        self.device_idx
    }

    /// Device operand storages must live on.
    pub fn storage_device(&self) -> Device {
        match self.backend {
            Backend::Host => Device::Cpu,
            #[cfg(feature = "cuda")]
            Backend::Cuda(_) => Device::Cuda(self.device_idx),
        }
    }

    /// Array classes whose storage this library can compute on.
    pub fn array_classes(&self) -> Vec<String> {
        self.storage_device().array_classes()
    }

    /// Descriptor accounting for this library.
    pub fn stats(&self) -> &DescriptorStats {
        &self.stats
    }

    pub fn live_descriptors(&self) -> usize {
        self.stats.live()
    }

    /// Allocate a new, unset tensor descriptor.
    pub fn create_tensor_descriptor(&self) -> Result<TensorDescriptor, KernelError> {
        let live = &self.stats.live;
        match self.descriptor_limit {
            Some(limit) => live
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < limit).then_some(n + 1))
                .map_err(|_| KernelError::DescriptorLimit { limit })?,
            None => live.fetch_add(1, Ordering::SeqCst),
        };
        self.stats.created.fetch_add(1, Ordering::SeqCst);
        Ok(TensorDescriptor::acquire(Arc::clone(&self.stats)))
    }

    fn check_operand<'d>(
        &self,
        desc: &'d TensorDescriptor,
        storage: &Storage,
    ) -> Result<&'d TensorLayout, KernelError> {
        let layout = desc.layout()?;
        if layout.dtype != storage.dtype() {
            return Err(KernelError::Core(nabla_core::NablaError::DTypeMismatch {
                expected: layout.dtype,
                got: storage.dtype(),
            }));
        }
        if storage.device() != self.storage_device() {
            return Err(KernelError::DeviceMismatch {
                expected: self.storage_device(),
                got: storage.device(),
            });
        }
        if layout.span() > storage.numel() {
            return Err(KernelError::BadParam(format!(
                "descriptor spans {} elements, storage holds {}",
                layout.span(),
                storage.numel()
            )));
        }
        Ok(layout)
    }

    /// `C = alpha * A + beta * C`.
    ///
    /// Both descriptors must be set, agree in dtype and extents, and match
    /// their storages. `beta == 0` overwrites C without reading it.
    pub fn add_tensor(
        &self,
        alpha: f64,
        a_desc: &TensorDescriptor,
        a: &Storage,
        beta: f64,
        c_desc: &TensorDescriptor,
        c: &mut Storage,
    ) -> Result<(), KernelError> {
        let a_layout = self.check_operand(a_desc, a)?;
        let c_layout = self.check_operand(c_desc, c)?;
        if a_layout.dtype != c_layout.dtype {
            return Err(KernelError::BadParam(format!(
                "operand dtypes differ: {} vs {}",
                a_layout.dtype, c_layout.dtype
            )));
        }
        if a_layout.dims != c_layout.dims {
            return Err(KernelError::BadParam(format!(
                "operand extents differ: {:?} vs {:?}",
                a_layout.dims, c_layout.dims
            )));
        }

        match &self.backend {
            Backend::Host => match c_layout.dtype {
                DType::F32 => host_add::<f32>(alpha, a_layout, a, beta, c_layout, c),
                DType::F64 => host_add::<f64>(alpha, a_layout, a, beta, c_layout, c),
                other => Err(KernelError::UnsupportedDType(other)),
            },
            #[cfg(feature = "cuda")]
            Backend::Cuda(device) => {
                crate::cuda::ops::add_tensor(device, self.device_idx, alpha, a_layout, a, beta, c_layout, c)
            }
        }
    }

    /// `C = A` (layout-converting copy).
    pub fn transform_tensor(
        &self,
        a_desc: &TensorDescriptor,
        a: &Storage,
        c_desc: &TensorDescriptor,
        c: &mut Storage,
    ) -> Result<(), KernelError> {
        self.add_tensor(1.0, a_desc, a, 0.0, c_desc, c)
    }
}

fn host_add<T: Element>(
    alpha: f64,
    a_layout: &TensorLayout,
    a: &Storage,
    beta: f64,
    c_layout: &TensorLayout,
    c: &mut Storage,
) -> Result<(), KernelError> {
    let a = a.as_slice::<T>()?;
    let c = c.as_slice_mut::<T>()?;
    host::add_tensor(T::from_f64(alpha), a_layout, a, T::from_f64(beta), c_layout, c);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector_desc(lib: &KernelLibrary, dtype: DType, n: usize) -> TensorDescriptor {
        let mut d = lib.create_tensor_descriptor().unwrap();
        d.set_4d(dtype, 1, n, 1, 1).unwrap();
        d
    }

    #[test]
    fn test_descriptor_accounting() {
        let lib = KernelLibrary::host(0);
        let a = lib.create_tensor_descriptor().unwrap();
        let b = lib.create_tensor_descriptor().unwrap();
        assert_eq!(lib.live_descriptors(), 2);
        drop(a);
        assert_eq!(lib.live_descriptors(), 1);
        drop(b);
        assert_eq!(lib.live_descriptors(), 0);
        assert_eq!(lib.stats().created(), 2);
        assert_eq!(lib.stats().destroyed(), 2);
    }

    #[test]
    fn test_descriptor_limit() {
        let lib = KernelLibrary::host(0).with_descriptor_limit(1);
        let a = lib.create_tensor_descriptor().unwrap();
        assert!(matches!(
            lib.create_tensor_descriptor(),
            Err(KernelError::DescriptorLimit { limit: 1 })
        ));
        drop(a);
        assert!(lib.create_tensor_descriptor().is_ok());
        assert_eq!(lib.live_descriptors(), 0);
    }

    #[test]
    fn test_add_tensor() {
        let lib = KernelLibrary::host(0);
        let d = vector_desc(&lib, DType::F32, 3);
        let a = Storage::from_slice(&[1.0f32, -2.0, 0.25]);
        let mut c = Storage::from_slice(&[1.0f32, 1.0, 1.0]);
        lib.add_tensor(1.0, &d, &a, 1.0, &d, &mut c).unwrap();
        assert_eq!(c.as_slice::<f32>().unwrap(), &[2.0, -1.0, 1.25]);

        lib.transform_tensor(&d, &a, &d, &mut c).unwrap();
        assert_eq!(c.as_slice::<f32>().unwrap(), &[1.0, -2.0, 0.25]);
    }

    #[test]
    fn test_add_tensor_validation() {
        let lib = KernelLibrary::host(0);
        let d3 = vector_desc(&lib, DType::F32, 3);
        let d4 = vector_desc(&lib, DType::F32, 4);
        let unset = lib.create_tensor_descriptor().unwrap();
        let a = Storage::from_slice(&[1.0f32; 3]);
        let mut c = Storage::from_slice(&[0.0f32; 4]);

        assert!(matches!(
            lib.add_tensor(1.0, &d3, &a, 0.0, &d4, &mut c),
            Err(KernelError::BadParam(_))
        ));
        assert!(matches!(
            lib.add_tensor(1.0, &unset, &a, 0.0, &d4, &mut c),
            Err(KernelError::DescriptorNotSet)
        ));
        // d4 over a 3-element storage
        assert!(lib.add_tensor(1.0, &d4, &a, 0.0, &d4, &mut c).is_err());

        let mut c64 = Storage::from_slice(&[0.0f64; 3]);
        assert!(lib.add_tensor(1.0, &d3, &a, 0.0, &d3, &mut c64).is_err());
    }

    #[test]
    fn test_rejects_integer_dtype() {
        let lib = KernelLibrary::host(0);
        let d = vector_desc(&lib, DType::I32, 2);
        let a = Storage::from_slice(&[1i32, 2]);
        let mut c = Storage::from_slice(&[0i32, 0]);
        assert!(matches!(
            lib.add_tensor(1.0, &d, &a, 1.0, &d, &mut c),
            Err(KernelError::UnsupportedDType(DType::I32))
        ));
    }

    #[test]
    fn test_array_classes() {
        let lib = KernelLibrary::host(3);
        assert_eq!(lib.storage_device(), Device::Cpu);
        assert_eq!(lib.device_idx(), 3);
        assert_eq!(lib.array_classes(), vec!["CpuArray", "CpuCachedArray"]);
    }
}
