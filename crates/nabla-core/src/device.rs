use std::fmt;

use serde::{Deserialize, Serialize};

/// Where an array's storage lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Device {
    /// Host memory
    #[default]
    Cpu,
    /// CUDA GPU with device index
    Cuda(usize),
}

/// Array classes whose storage lives in host memory.
pub const CPU_ARRAY_CLASSES: &[&str] = &["CpuArray", "CpuCachedArray"];

/// Array classes whose storage lives on a CUDA device.
pub const CUDA_ARRAY_CLASSES: &[&str] = &["CudaArray", "CudaCachedArray"];

impl Device {
    /// Whether this is the host.
    pub fn is_cpu(&self) -> bool {
        matches!(self, Device::Cpu)
    }

    /// Whether this is a CUDA device.
    pub fn is_cuda(&self) -> bool {
        matches!(self, Device::Cuda(_))
    }

    /// Resolve the device an array class places storage on.
    ///
    /// Returns `None` for unknown array classes.
    pub fn for_array_class(array_class: &str, device_idx: usize) -> Option<Device> {
        if CPU_ARRAY_CLASSES.contains(&array_class) {
            Some(Device::Cpu)
        } else if CUDA_ARRAY_CLASSES.contains(&array_class) {
            Some(Device::Cuda(device_idx))
        } else {
            None
        }
    }

    /// Array classes that place storage on this kind of device.
    pub fn array_classes(&self) -> Vec<String> {
        let classes = match self {
            Device::Cpu => CPU_ARRAY_CLASSES,
            Device::Cuda(_) => CUDA_ARRAY_CLASSES,
        };
        classes.iter().map(|c| c.to_string()).collect()
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda(idx) => write!(f, "cuda:{idx}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_properties() {
        assert!(Device::Cpu.is_cpu());
        assert!(!Device::Cpu.is_cuda());
        assert!(Device::Cuda(0).is_cuda());
    }

    #[test]
    fn test_for_array_class() {
        assert_eq!(Device::for_array_class("CpuCachedArray", 3), Some(Device::Cpu));
        assert_eq!(Device::for_array_class("CudaArray", 2), Some(Device::Cuda(2)));
        assert_eq!(Device::for_array_class("OpenCLArray", 0), None);
    }

    #[test]
    fn test_array_classes() {
        assert_eq!(Device::Cpu.array_classes(), vec!["CpuArray", "CpuCachedArray"]);
        assert_eq!(Device::Cuda(0).array_classes(), vec!["CudaArray", "CudaCachedArray"]);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Device::Cpu), "cpu");
        assert_eq!(format!("{}", Device::Cuda(0)), "cuda:0");
    }
}
