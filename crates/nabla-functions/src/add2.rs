//! Add2: `y = x0 + x1` for two equally shaped inputs, on the host.

use std::marker::PhantomData;

use nabla_core::{Context, Device, Element, Function, NablaError, Result, Shape, Variable};

pub const NAME: &str = "Add2";

/// Input validation and output shaping shared by every Add2 implementation.
///
/// Inputs must have identical shapes. The output takes that shape; in place,
/// it also takes input 0's data and gradient arrays.
pub(crate) fn check_inputs(name: &str, inputs: &[&Variable]) -> Result<Shape> {
    let (s0, s1) = (inputs[0].shape(), inputs[1].shape());
    if s0 != s1 {
        tracing::debug!("{}: input shapes differ: {} vs {}", name, s0, s1);
        return Err(NablaError::ShapeMismatch {
            expected: s0.dims().to_vec(),
            got: s1.dims().to_vec(),
        });
    }
    Ok(s0)
}

pub(crate) fn shape_output(shape: &Shape, inputs: &[&Variable], outputs: &[&Variable], inplace: bool) -> Result<()> {
    let y = outputs[0];
    y.reshape(shape, true)?;
    if inplace {
        y.set_data(inputs[0].data())?;
        y.set_grad(inputs[0].grad())?;
    }
    Ok(())
}

/// In place, input 0's gradient is the output gradient; adding into it again
/// would double count.
pub(crate) fn check_backward_flags(name: &str, inplace: bool, propagate_down: &[bool], accum: &[bool]) -> Result<()> {
    if inplace && propagate_down[0] && accum[0] {
        return Err(NablaError::InvalidArgument(format!(
            "{name}: cannot accumulate into input 0's gradient, it is shared with the output in place"
        )));
    }
    Ok(())
}

/// Host reference implementation.
pub struct Add2<T: Element> {
    ctx: Context,
    inplace: bool,
    _dtype: PhantomData<fn() -> T>,
}

impl<T: Element> Add2<T> {
    pub fn new(ctx: &Context, inplace: bool) -> Self {
        Self {
            ctx: ctx.clone(),
            inplace,
            _dtype: PhantomData,
        }
    }

    pub fn inplace(&self) -> bool {
        self.inplace
    }
}

impl<T: Element> Function for Add2<T> {
    fn name(&self) -> &str {
        NAME
    }

    fn context(&self) -> &Context {
        &self.ctx
    }

    fn allowed_array_classes(&self) -> Vec<String> {
        Device::Cpu.array_classes()
    }

    fn num_inputs(&self) -> usize {
        2
    }

    fn num_outputs(&self) -> usize {
        1
    }

    fn setup_impl(&mut self, inputs: &[&Variable], outputs: &[&Variable]) -> Result<()> {
        let shape = check_inputs(NAME, inputs)?;
        shape_output(&shape, inputs, outputs, self.inplace)
    }

    fn forward_impl(&mut self, inputs: &[&Variable], outputs: &[&Variable]) -> Result<()> {
        // Read both inputs first: the output may alias either of them.
        let a = inputs[0].data().to_vec::<T>()?;
        let b = inputs[1].data().to_vec::<T>()?;

        let y = outputs[0].data();
        let mut state = y.write();
        let out = state.cast(T::DTYPE, Device::Cpu, true)?.as_slice_mut::<T>()?;
        for ((o, &x0), &x1) in out.iter_mut().zip(&a).zip(&b) {
            *o = x0 + x1;
        }
        Ok(())
    }

    fn backward_impl(
        &mut self,
        inputs: &[&Variable],
        outputs: &[&Variable],
        propagate_down: &[bool],
        accum: &[bool],
    ) -> Result<()> {
        check_backward_flags(NAME, self.inplace, propagate_down, accum)?;
        let dy_array = outputs[0].grad();
        let dy = dy_array.to_vec::<T>()?;

        for (i, x) in inputs.iter().enumerate() {
            if !propagate_down[i] {
                continue;
            }
            let dx_array = x.grad();
            if dx_array.ptr_eq(&dy_array) && !accum[i] {
                continue;
            }
            let mut state = dx_array.write();
            let dx = state.cast(T::DTYPE, Device::Cpu, !accum[i])?.as_slice_mut::<T>()?;
            if accum[i] {
                for (g, &d) in dx.iter_mut().zip(&dy) {
                    *g = *g + d;
                }
            } else {
                dx.copy_from_slice(&dy);
            }
        }
        Ok(())
    }
}
