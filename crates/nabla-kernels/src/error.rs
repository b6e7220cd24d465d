use nabla_core::{DType, Device, NablaError};

/// Kernel-library errors.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    #[error("Kernel library not available: {0}")]
    NotAvailable(String),

    #[error("Descriptor allocation failed: limit of {limit} live descriptors reached")]
    DescriptorLimit { limit: usize },

    #[error("Tensor descriptor used before being set")]
    DescriptorNotSet,

    #[error("Bad parameter: {0}")]
    BadParam(String),

    #[error("Unsupported dtype for kernel: {0}")]
    UnsupportedDType(DType),

    #[error("Storage on {got} but library runs on {expected}")]
    DeviceMismatch { expected: Device, got: Device },

    #[error("CUDA device init failed: {0}")]
    DeviceInit(String),

    #[error("PTX compilation failed for module '{module}': {msg}")]
    PtxCompile { module: String, msg: String },

    #[error("Failed to load module '{module}': {msg}")]
    ModuleLoad { module: String, msg: String },

    #[error("Function '{func}' not found in module '{module}'")]
    FuncNotFound { module: String, func: String },

    #[error("Kernel launch failed: {0}")]
    LaunchError(String),

    #[error("Device memory error: {0}")]
    MemoryError(String),

    #[error(transparent)]
    Core(#[from] NablaError),
}

impl From<KernelError> for NablaError {
    fn from(e: KernelError) -> Self {
        match e {
            KernelError::Core(inner) => inner,
            KernelError::UnsupportedDType(d) => NablaError::UnsupportedDType(d),
            KernelError::DescriptorLimit { .. } | KernelError::MemoryError(_) => {
                NablaError::Resource(e.to_string())
            }
            KernelError::DescriptorNotSet | KernelError::BadParam(_) => {
                NablaError::InvalidArgument(e.to_string())
            }
            KernelError::NotAvailable(_)
            | KernelError::DeviceMismatch { .. }
            | KernelError::DeviceInit(_)
            | KernelError::PtxCompile { .. }
            | KernelError::ModuleLoad { .. }
            | KernelError::FuncNotFound { .. }
            | KernelError::LaunchError(_) => NablaError::Device(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_taxonomy() {
        let e: NablaError = KernelError::DescriptorLimit { limit: 2 }.into();
        assert!(matches!(e, NablaError::Resource(_)));

        let e: NablaError = KernelError::LaunchError("boom".into()).into();
        assert!(matches!(e, NablaError::Device(_)));

        let e: NablaError = KernelError::Core(NablaError::InvalidArgument("x".into())).into();
        assert!(matches!(e, NablaError::InvalidArgument(_)));
    }
}
