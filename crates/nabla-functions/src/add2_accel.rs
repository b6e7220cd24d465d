//! Add2 on the accelerated kernel library.
//!
//! Owns two tensor descriptors for its whole lifetime: one describing the
//! inputs and input gradients, one describing the output and its gradient.
//! Both use a flattened `1 x size x 1 x 1` layout, since the operation is
//! elementwise and shapes are identical.

use std::marker::PhantomData;
use std::sync::Arc;

use nabla_core::{
    parse_device_id, Context, Element, Function, NablaError, NdArray, Result, Variable,
};
use nabla_kernels::{get_library, KernelLibrary, TensorDescriptor};

use crate::add2::{check_backward_flags, check_inputs, shape_output};

pub const NAME: &str = "Add2Accel";

pub struct Add2Accel<T: Element> {
    ctx: Context,
    inplace: bool,
    device: usize,
    library: Arc<KernelLibrary>,
    input_desc: TensorDescriptor,
    output_desc: TensorDescriptor,
    _dtype: PhantomData<fn() -> T>,
}

impl<T: Element> Add2Accel<T> {
    /// Bind to the library of the context's device and acquire both descriptors.
    pub fn new(ctx: &Context, inplace: bool) -> Result<Self> {
        let device = parse_device_id(&ctx.device_id)?;
        let library = get_library(device)?;
        Self::bind(ctx, inplace, device, library)
    }

    /// Like [`Add2Accel::new`], with an explicit library handle.
    ///
    /// The library must serve the context's device. If the second descriptor
    /// cannot be acquired, the first is released before returning.
    pub fn with_library(ctx: &Context, inplace: bool, library: Arc<KernelLibrary>) -> Result<Self> {
        let device = parse_device_id(&ctx.device_id)?;
        Self::bind(ctx, inplace, device, library)
    }

    fn bind(ctx: &Context, inplace: bool, device: usize, library: Arc<KernelLibrary>) -> Result<Self> {
        if library.device_idx() != device {
            return Err(NablaError::InvalidContext(format!(
                "context device {} but kernel library serves device {}",
                device,
                library.device_idx()
            )));
        }
        let input_desc = library.create_tensor_descriptor()?;
        let output_desc = library.create_tensor_descriptor()?;
        tracing::debug!(
            "{} created on device {} (descriptors {}, {}, inplace={})",
            NAME,
            device,
            input_desc.id(),
            output_desc.id(),
            inplace
        );
        Ok(Self {
            ctx: ctx.clone(),
            inplace,
            device,
            library,
            input_desc,
            output_desc,
            _dtype: PhantomData,
        })
    }

    pub fn device(&self) -> usize {
        self.device
    }

    pub fn inplace(&self) -> bool {
        self.inplace
    }

    pub fn library(&self) -> &Arc<KernelLibrary> {
        &self.library
    }

    pub fn input_descriptor(&self) -> &TensorDescriptor {
        &self.input_desc
    }

    pub fn output_descriptor(&self) -> &TensorDescriptor {
        &self.output_desc
    }

    /// `dst = alpha * src + beta * dst` through the library.
    ///
    /// `src` is brought onto the library's device first. With `beta == 0`
    /// the destination's previous content is discarded instead of moved.
    fn add_into(
        &self,
        alpha: f64,
        src_desc: &TensorDescriptor,
        src: &NdArray,
        beta: f64,
        dst_desc: &TensorDescriptor,
        dst: &NdArray,
    ) -> Result<()> {
        let device = self.library.storage_device();

        if src.ptr_eq(dst) {
            let mut state = dst.write();
            let snapshot = state.cast(T::DTYPE, device, false)?.try_clone()?;
            let c = state.cast(T::DTYPE, device, false)?;
            self.library.add_tensor(alpha, src_desc, &snapshot, beta, dst_desc, c)?;
            return Ok(());
        }

        src.write().cast(T::DTYPE, device, false)?;
        let src_state = src.read();
        let a = src_state.storage()?;
        let mut dst_state = dst.write();
        let c = dst_state.cast(T::DTYPE, device, beta == 0.0)?;
        self.library.add_tensor(alpha, src_desc, a, beta, dst_desc, c)?;
        Ok(())
    }
}

impl<T: Element> Drop for Add2Accel<T> {
    fn drop(&mut self) {
        // Descriptors return themselves to the library when dropped.
        tracing::debug!(
            "{} on device {} released descriptors {}, {}",
            NAME,
            self.device,
            self.input_desc.id(),
            self.output_desc.id()
        );
    }
}

impl<T: Element> Function for Add2Accel<T> {
    fn name(&self) -> &str {
        NAME
    }

    fn context(&self) -> &Context {
        &self.ctx
    }

    fn allowed_array_classes(&self) -> Vec<String> {
        self.library.array_classes()
    }

    fn num_inputs(&self) -> usize {
        2
    }

    fn num_outputs(&self) -> usize {
        1
    }

    fn setup_impl(&mut self, inputs: &[&Variable], outputs: &[&Variable]) -> Result<()> {
        let shape = check_inputs(NAME, inputs)?;
        let size = shape.numel();
        if shape.is_empty() {
            return Err(NablaError::InvalidArgument(format!(
                "{NAME}: empty input of shape {shape} cannot be described"
            )));
        }
        self.input_desc.set_4d(T::DTYPE, 1, size, 1, 1)?;
        self.output_desc.set_4d(T::DTYPE, 1, size, 1, 1)?;
        shape_output(&shape, inputs, outputs, self.inplace)?;
        tracing::trace!("{} setup: {} elements of {}", NAME, size, T::DTYPE);
        Ok(())
    }

    fn forward_impl(&mut self, inputs: &[&Variable], outputs: &[&Variable]) -> Result<()> {
        let (x0, x1, y) = (inputs[0].data(), inputs[1].data(), outputs[0].data());
        if !self.inplace {
            self.add_into(1.0, &self.input_desc, &x0, 0.0, &self.output_desc, &y)?;
        }
        self.add_into(1.0, &self.input_desc, &x1, 1.0, &self.output_desc, &y)
    }

    fn backward_impl(
        &mut self,
        inputs: &[&Variable],
        outputs: &[&Variable],
        propagate_down: &[bool],
        accum: &[bool],
    ) -> Result<()> {
        check_backward_flags(NAME, self.inplace, propagate_down, accum)?;
        let dy = outputs[0].grad();

        for (i, x) in inputs.iter().enumerate() {
            if !propagate_down[i] || (self.inplace && i == 0) {
                continue;
            }
            let dx = x.grad();
            // Overwriting the output gradient with itself is a no-op.
            if dx.ptr_eq(&dy) && !accum[i] {
                continue;
            }
            let beta = if accum[i] { 1.0 } else { 0.0 };
            self.add_into(1.0, &self.output_desc, &dy, beta, &self.input_desc, &dx)?;
        }
        Ok(())
    }
}

impl<T: Element> std::fmt::Debug for Add2Accel<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(NAME)
            .field("dtype", &T::DTYPE)
            .field("device", &self.library.storage_device())
            .field("inplace", &self.inplace)
            .field("input_desc", &self.input_desc.id())
            .field("output_desc", &self.output_desc.id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nabla_core::Operator;

    fn accel_ctx(device: &str) -> Context {
        Context::new(&["accel:float"], "CpuCachedArray", device)
    }

    #[test]
    fn test_descriptors_released_on_drop() {
        let lib = Arc::new(KernelLibrary::host(0));
        let f = Add2Accel::<f32>::with_library(&accel_ctx("0"), false, Arc::clone(&lib)).unwrap();
        assert_eq!(lib.live_descriptors(), 2);
        assert!(!f.input_descriptor().is_set());
        drop(f);
        assert_eq!(lib.live_descriptors(), 0);
        assert_eq!(lib.stats().destroyed(), 2);
    }

    #[cfg(not(feature = "cuda"))]
    #[test]
    fn test_new_binds_shared_library() {
        let f = Add2Accel::<f32>::new(&accel_ctx(" 4 "), false).unwrap();
        assert_eq!(f.device(), 4);
        assert_eq!(f.library().device_idx(), 4);
        assert!(Add2Accel::<f32>::new(&accel_ctx("four"), false).is_err());
    }

    #[test]
    fn test_library_device_must_match() {
        let lib = Arc::new(KernelLibrary::host(1));
        let err = Add2Accel::<f32>::with_library(&accel_ctx("0"), false, Arc::clone(&lib)).unwrap_err();
        assert!(matches!(err, NablaError::InvalidContext(_)));
        assert_eq!(lib.stats().created(), 0);
    }

    #[test]
    fn test_setup_sets_flat_layout() {
        let lib = Arc::new(KernelLibrary::host(0));
        let f = Add2Accel::<f64>::with_library(&accel_ctx("0"), false, lib).unwrap();
        let mut op = Operator::new(Box::new(f));
        let x0 = Variable::new(&[2, 3, 4]);
        let x1 = Variable::new(&[2, 3, 4]);
        let y = Variable::new(&[1]);
        op.setup(&[&x0, &x1], &[&y]).unwrap();
        assert_eq!(y.shape().dims(), &[2, 3, 4]);
    }

    #[test]
    fn test_empty_input_rejected() {
        let lib = Arc::new(KernelLibrary::host(0));
        let f = Add2Accel::<f32>::with_library(&accel_ctx("0"), false, lib).unwrap();
        let mut op = Operator::new(Box::new(f));
        let x0 = Variable::new(&[0, 3]);
        let x1 = Variable::new(&[0, 3]);
        let y = Variable::new(&[1]);
        let err = op.setup(&[&x0, &x1], &[&y]).unwrap_err();
        assert!(matches!(err, NablaError::InvalidArgument(_)));
    }
}
