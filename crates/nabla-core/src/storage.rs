use crate::{DType, Device, Element, NablaError, Result};

#[cfg(feature = "cuda")]
use std::sync::Arc;

#[cfg(feature = "cuda")]
use cudarc::driver::{CudaDevice, CudaSlice};

/// Raw bytes of a [`Storage`].
#[derive(Debug)]
pub enum StorageData {
    /// Host memory. Backed by `u64` words so every element type is aligned.
    Cpu(Vec<u64>),
    /// CUDA device memory.
    #[cfg(feature = "cuda")]
    Cuda {
        device: Arc<CudaDevice>,
        buffer: CudaSlice<u8>,
        device_idx: usize,
    },
}

/// Typed, device-placed memory owned by one array.
#[derive(Debug)]
pub struct Storage {
    data: StorageData,
    dtype: DType,
    device: Device,
    /// Number of logical elements (not bytes).
    numel: usize,
}

fn host_words(nbytes: usize) -> Vec<u64> {
    vec![0u64; nbytes.div_ceil(8)]
}

impl Storage {
    /// Allocate zeroed host storage for `numel` elements.
    pub fn zeros(dtype: DType, numel: usize) -> Self {
        Self {
            data: StorageData::Cpu(host_words(dtype.storage_bytes(numel))),
            dtype,
            device: Device::Cpu,
            numel,
        }
    }

    /// Allocate zeroed storage on `device`.
    pub fn zeros_on(dtype: DType, numel: usize, device: Device) -> Result<Self> {
        match device {
            Device::Cpu => Ok(Self::zeros(dtype, numel)),
            Device::Cuda(idx) => Self::cuda_zeros(dtype, numel, idx),
        }
    }

    /// Host storage holding a copy of `data`.
    pub fn from_slice<T: Element>(data: &[T]) -> Self {
        let mut s = Self::zeros(T::DTYPE, data.len());
        if let StorageData::Cpu(words) = &mut s.data {
            let bytes: &[u8] = bytemuck::cast_slice(data);
            bytemuck::cast_slice_mut::<u64, u8>(words)[..bytes.len()].copy_from_slice(bytes);
        }
        s
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn device(&self) -> Device {
        self.device
    }

    /// Number of logical elements.
    pub fn numel(&self) -> usize {
        self.numel
    }

    /// Size in bytes.
    pub fn nbytes(&self) -> usize {
        self.dtype.storage_bytes(self.numel)
    }

    pub fn is_cpu(&self) -> bool {
        self.device.is_cpu()
    }

    pub fn is_cuda(&self) -> bool {
        self.device.is_cuda()
    }

    /// Raw data (for kernel dispatch).
    pub fn data(&self) -> &StorageData {
        &self.data
    }

    /// Host bytes. Fails for device-resident storage.
    pub fn as_bytes(&self) -> Result<&[u8]> {
        let nbytes = self.nbytes();
        match &self.data {
            StorageData::Cpu(words) => Ok(&bytemuck::cast_slice::<u64, u8>(words)[..nbytes]),
            #[cfg(feature = "cuda")]
            StorageData::Cuda { .. } => Err(NablaError::StorageError(format!(
                "cannot view {} storage as host bytes",
                self.device
            ))),
        }
    }

    /// Mutable host bytes. Fails for device-resident storage.
    pub fn as_bytes_mut(&mut self) -> Result<&mut [u8]> {
        let nbytes = self.nbytes();
        match &mut self.data {
            StorageData::Cpu(words) => {
                Ok(&mut bytemuck::cast_slice_mut::<u64, u8>(words)[..nbytes])
            }
            #[cfg(feature = "cuda")]
            StorageData::Cuda { .. } => Err(NablaError::StorageError(format!(
                "cannot view {} storage as host bytes",
                self.device
            ))),
        }
    }

    fn check_dtype<T: Element>(&self) -> Result<()> {
        if self.dtype != T::DTYPE {
            return Err(NablaError::DTypeMismatch {
                expected: T::DTYPE,
                got: self.dtype,
            });
        }
        Ok(())
    }

    /// Host elements as `&[T]`.
    pub fn as_slice<T: Element>(&self) -> Result<&[T]> {
        self.check_dtype::<T>()?;
        bytemuck::try_cast_slice(self.as_bytes()?)
            .map_err(|e| NablaError::StorageError(format!("cast to {}: {e}", T::DTYPE)))
    }

    /// Host elements as `&mut [T]`.
    pub fn as_slice_mut<T: Element>(&mut self) -> Result<&mut [T]> {
        self.check_dtype::<T>()?;
        bytemuck::try_cast_slice_mut(self.as_bytes_mut()?)
            .map_err(|e| NablaError::StorageError(format!("cast to {}: {e}", T::DTYPE)))
    }

    /// Copy the elements out to a host vector, whatever the device.
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        self.check_dtype::<T>()?;
        match self.device {
            Device::Cpu => Ok(self.as_slice::<T>()?.to_vec()),
            Device::Cuda(_) => {
                let host = self.to_device(Device::Cpu)?;
                Ok(host.as_slice::<T>()?.to_vec())
            }
        }
    }

    /// Copy this storage to `device`. Copies even when already there.
    pub fn to_device(&self, device: Device) -> Result<Self> {
        match (&self.data, device) {
            (StorageData::Cpu(words), Device::Cpu) => Ok(Self {
                data: StorageData::Cpu(words.clone()),
                dtype: self.dtype,
                device,
                numel: self.numel,
            }),
            (StorageData::Cpu(_), Device::Cuda(idx)) => self.to_cuda(idx),
            #[cfg(feature = "cuda")]
            (StorageData::Cuda { .. }, _) => self.from_cuda_to(device),
        }
    }

    /// Duplicate this storage on its own device.
    pub fn try_clone(&self) -> Result<Self> {
        self.to_device(self.device)
    }

    #[cfg(not(feature = "cuda"))]
    fn cuda_zeros(_dtype: DType, _numel: usize, device_idx: usize) -> Result<Self> {
        Err(NablaError::Device(format!(
            "cuda:{device_idx} requested but CUDA support is not compiled in"
        )))
    }

    #[cfg(not(feature = "cuda"))]
    fn to_cuda(&self, device_idx: usize) -> Result<Self> {
        Self::cuda_zeros(self.dtype, self.numel, device_idx)
    }

    /// Allocate zeroed device memory.
    #[cfg(feature = "cuda")]
    fn cuda_zeros(dtype: DType, numel: usize, device_idx: usize) -> Result<Self> {
        let device = CudaDevice::new(device_idx)
            .map_err(|e| NablaError::Device(format!("CUDA device init: {e}")))?;
        // cudarc rejects zero-length allocations
        let buffer = device
            .alloc_zeros::<u8>(dtype.storage_bytes(numel).max(1))
            .map_err(|e| NablaError::Resource(format!("CUDA alloc_zeros: {e}")))?;
        device
            .synchronize()
            .map_err(|e| NablaError::Device(format!("CUDA sync: {e}")))?;
        Ok(Self {
            data: StorageData::Cuda {
                device,
                buffer,
                device_idx,
            },
            dtype,
            device: Device::Cuda(device_idx),
            numel,
        })
    }

    /// Host to device copy.
    #[cfg(feature = "cuda")]
    fn to_cuda(&self, device_idx: usize) -> Result<Self> {
        let mut bytes = self.as_bytes()?.to_vec();
        if bytes.is_empty() {
            bytes.push(0);
        }
        let device = CudaDevice::new(device_idx)
            .map_err(|e| NablaError::Device(format!("CUDA device init: {e}")))?;
        let buffer = device
            .htod_copy(bytes)
            .map_err(|e| NablaError::Device(format!("H2D copy: {e}")))?;
        // Kernels run on the library's own stream; finish the copy first.
        device
            .synchronize()
            .map_err(|e| NablaError::Device(format!("CUDA sync: {e}")))?;
        Ok(Self {
            data: StorageData::Cuda {
                device,
                buffer,
                device_idx,
            },
            dtype: self.dtype,
            device: Device::Cuda(device_idx),
            numel: self.numel,
        })
    }

    /// Device to host (and, staged through the host, device to device) copy.
    #[cfg(feature = "cuda")]
    fn from_cuda_to(&self, target: Device) -> Result<Self> {
        let StorageData::Cuda { device, buffer, .. } = &self.data else {
            return self.to_device(target);
        };
        let bytes = device
            .dtoh_sync_copy(buffer)
            .map_err(|e| NablaError::Device(format!("D2H copy: {e}")))?;
        let mut host = Self::zeros(self.dtype, self.numel);
        let nbytes = host.nbytes();
        host.as_bytes_mut()?.copy_from_slice(&bytes[..nbytes]);
        match target {
            Device::Cpu => Ok(host),
            Device::Cuda(idx) => host.to_cuda(idx),
        }
    }

    /// Device buffer for kernel launches. `None` for host storage.
    #[cfg(feature = "cuda")]
    pub fn as_cuda_slice(&self) -> Option<&CudaSlice<u8>> {
        match &self.data {
            StorageData::Cuda { buffer, .. } => Some(buffer),
            _ => None,
        }
    }

    /// Mutable device buffer for kernel launches.
    #[cfg(feature = "cuda")]
    pub fn as_cuda_slice_mut(&mut self) -> Option<&mut CudaSlice<u8>> {
        match &mut self.data {
            StorageData::Cuda { buffer, .. } => Some(buffer),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeros() {
        let s = Storage::zeros(DType::F32, 10);
        assert_eq!(s.dtype(), DType::F32);
        assert_eq!(s.device(), Device::Cpu);
        assert_eq!(s.numel(), 10);
        assert_eq!(s.nbytes(), 40);
        assert!(s.as_bytes().unwrap().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_from_slice() {
        let s = Storage::from_slice(&[1.0f32, 2.0, 3.0]);
        assert_eq!(s.numel(), 3);
        assert_eq!(s.as_slice::<f32>().unwrap(), &[1.0, 2.0, 3.0]);

        let s = Storage::from_slice(&[1.5f64, -2.25]);
        assert_eq!(s.dtype(), DType::F64);
        assert_eq!(s.to_vec::<f64>().unwrap(), vec![1.5, -2.25]);
    }

    #[test]
    fn test_dtype_checked() {
        let s = Storage::from_slice(&[1.0f32]);
        assert!(matches!(
            s.as_slice::<f64>(),
            Err(NablaError::DTypeMismatch { .. })
        ));
    }

    #[test]
    fn test_try_clone_is_independent() {
        let s1 = Storage::from_slice(&[1.0f32, 2.0]);
        let mut s2 = s1.try_clone().unwrap();
        s2.as_slice_mut::<f32>().unwrap()[0] = 99.0;
        assert_eq!(s1.as_slice::<f32>().unwrap()[0], 1.0);
        assert_eq!(s2.as_slice::<f32>().unwrap()[0], 99.0);
    }

    #[test]
    fn test_empty_storage() {
        let s = Storage::zeros(DType::F64, 0);
        assert_eq!(s.nbytes(), 0);
        assert!(s.as_slice::<f64>().unwrap().is_empty());
    }

    #[cfg(not(feature = "cuda"))]
    #[test]
    fn test_cuda_unavailable() {
        assert!(Storage::zeros_on(DType::F32, 4, Device::Cuda(0)).is_err());
    }
}
