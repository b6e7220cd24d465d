//! The function interface and its lifecycle wrapper.
//!
//! Concrete functions implement [`Function`]: identity queries plus the
//! `*_impl` hooks. Graph code never calls the hooks directly; it owns an
//! [`Operator`], which checks arity, array classes and setup state before
//! delegating.

use crate::{Context, NablaError, Result, Shape, Variable};

/// Hooks implemented by every concrete function.
pub trait Function: Send {
    /// Implementation name, e.g. `"Add2"`.
    fn name(&self) -> &str;

    /// Context the function was created with.
    fn context(&self) -> &Context;

    /// Array classes the function can compute on.
    fn allowed_array_classes(&self) -> Vec<String>;

    fn num_inputs(&self) -> usize;

    fn num_outputs(&self) -> usize;

    /// Validate inputs, shape outputs, prepare descriptors.
    fn setup_impl(&mut self, inputs: &[&Variable], outputs: &[&Variable]) -> Result<()>;

    /// Compute output data from input data.
    fn forward_impl(&mut self, inputs: &[&Variable], outputs: &[&Variable]) -> Result<()>;

    /// Propagate output gradients into input gradients.
    ///
    /// `accum[i]` asks to add into input `i`'s gradient instead of
    /// overwriting it. Inputs with `propagate_down[i] == false` must not be
    /// touched.
    fn backward_impl(
        &mut self,
        inputs: &[&Variable],
        outputs: &[&Variable],
        propagate_down: &[bool],
        accum: &[bool],
    ) -> Result<()>;
}

/// Shapes seen by the last successful setup.
#[derive(Debug, Clone)]
struct SetupRecord {
    in_shapes: Vec<Shape>,
    out_shapes: Vec<Shape>,
}

/// Owning handle on a function, enforcing setup-before-use.
pub struct Operator {
    function: Box<dyn Function>,
    setup: Option<SetupRecord>,
}

fn shapes(vars: &[&Variable]) -> Vec<Shape> {
    vars.iter().map(|v| v.shape()).collect()
}

impl Operator {
    pub fn new(function: Box<dyn Function>) -> Self {
        Self {
            function,
            setup: None,
        }
    }

    pub fn name(&self) -> &str {
        self.function.name()
    }

    pub fn context(&self) -> &Context {
        self.function.context()
    }

    pub fn allowed_array_classes(&self) -> Vec<String> {
        self.function.allowed_array_classes()
    }

    /// Whether setup has succeeded since construction (or the last failure).
    pub fn is_setup(&self) -> bool {
        self.setup.is_some()
    }

    /// Borrow the wrapped function.
    pub fn function(&self) -> &dyn Function {
        self.function.as_ref()
    }

    fn check_arity(&self, inputs: &[&Variable], outputs: &[&Variable]) -> Result<()> {
        let f = &self.function;
        if inputs.len() != f.num_inputs() {
            return Err(NablaError::ArityMismatch {
                function: f.name().to_string(),
                kind: "inputs",
                expected: f.num_inputs(),
                got: inputs.len(),
            });
        }
        if outputs.len() != f.num_outputs() {
            return Err(NablaError::ArityMismatch {
                function: f.name().to_string(),
                kind: "outputs",
                expected: f.num_outputs(),
                got: outputs.len(),
            });
        }
        Ok(())
    }

    fn check_setup(&self, inputs: &[&Variable], outputs: &[&Variable]) -> Result<()> {
        let record = self.setup.as_ref().ok_or_else(|| {
            NablaError::state(self.name(), "setup has not been called (or failed)")
        })?;
        if record.in_shapes != shapes(inputs) || record.out_shapes != shapes(outputs) {
            return Err(NablaError::state(
                self.name(),
                format!(
                    "variable shapes changed since setup (inputs were {:?}); call setup again",
                    record.in_shapes
                ),
            ));
        }
        Ok(())
    }

    /// Validate and prepare for the given variables.
    ///
    /// On failure the operator returns to the not-set-up state; a later call
    /// with corrected variables may still succeed.
    pub fn setup(&mut self, inputs: &[&Variable], outputs: &[&Variable]) -> Result<()> {
        self.setup = None;
        self.check_arity(inputs, outputs)?;

        let class = &self.function.context().array_class;
        let allowed = self.function.allowed_array_classes();
        if !allowed.iter().any(|c| c == class) {
            return Err(NablaError::ArrayClassNotAllowed {
                function: self.name().to_string(),
                class: class.clone(),
                allowed,
            });
        }

        let in_shapes = shapes(inputs);
        tracing::debug!("{}: setup with inputs {:?}", self.name(), in_shapes);
        self.function.setup_impl(inputs, outputs)?;
        self.setup = Some(SetupRecord {
            in_shapes,
            out_shapes: shapes(outputs),
        });
        Ok(())
    }

    /// Compute outputs. Requires a setup matching the current shapes.
    pub fn forward(&mut self, inputs: &[&Variable], outputs: &[&Variable]) -> Result<()> {
        self.check_arity(inputs, outputs)?;
        self.check_setup(inputs, outputs)?;
        tracing::trace!("{}: forward", self.name());
        self.function.forward_impl(inputs, outputs)
    }

    /// Propagate gradients. A no-op when no input propagates.
    pub fn backward(
        &mut self,
        inputs: &[&Variable],
        outputs: &[&Variable],
        propagate_down: &[bool],
        accum: &[bool],
    ) -> Result<()> {
        self.check_arity(inputs, outputs)?;
        if propagate_down.len() != inputs.len() || accum.len() != inputs.len() {
            return Err(NablaError::InvalidArgument(format!(
                "{}: propagate_down/accum need {} flags, got {}/{}",
                self.name(),
                inputs.len(),
                propagate_down.len(),
                accum.len()
            )));
        }
        self.check_setup(inputs, outputs)?;
        if !propagate_down.iter().any(|&p| p) {
            return Ok(());
        }
        tracing::trace!(
            "{}: backward propagate_down={:?} accum={:?}",
            self.name(),
            propagate_down,
            accum
        );
        self.function
            .backward_impl(inputs, outputs, propagate_down, accum)
    }
}

impl std::fmt::Debug for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operator")
            .field("name", &self.name())
            .field("context", self.context())
            .field("is_setup", &self.is_setup())
            .finish()
    }
}
