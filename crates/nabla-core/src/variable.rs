use parking_lot::RwLock;

use crate::{Element, NablaError, NdArray, Result, Shape};

/// A graph value: a shape plus a data array and a gradient array.
///
/// Both arrays are handles, so several variables may share them. Functions
/// receive variables as `&[&Variable]` and never own them.
#[derive(Debug)]
pub struct Variable {
    shape: RwLock<Shape>,
    data: RwLock<NdArray>,
    grad: RwLock<NdArray>,
}

impl Variable {
    /// Variable with unallocated data and gradient.
    pub fn new(shape: &[usize]) -> Self {
        let shape = Shape::new(shape);
        Self {
            data: RwLock::new(NdArray::new(shape.clone())),
            grad: RwLock::new(NdArray::new(shape.clone())),
            shape: RwLock::new(shape),
        }
    }

    /// Variable whose data holds a host copy of `data`.
    pub fn from_slice<T: Element>(data: &[T], shape: &[usize]) -> Result<Self> {
        let v = Self::new(shape);
        v.data().copy_from_slice(data)?;
        Ok(v)
    }

    pub fn shape(&self) -> Shape {
        self.shape.read().clone()
    }

    pub fn numel(&self) -> usize {
        self.shape.read().numel()
    }

    /// Handle on the data array.
    pub fn data(&self) -> NdArray {
        self.data.read().clone()
    }

    /// Handle on the gradient array.
    pub fn grad(&self) -> NdArray {
        self.grad.read().clone()
    }

    /// Replace the data array, e.g. to alias another variable's storage.
    pub fn set_data(&self, array: NdArray) -> Result<()> {
        self.check_size(&array)?;
        *self.data.write() = array;
        Ok(())
    }

    /// Replace the gradient array.
    pub fn set_grad(&self, array: NdArray) -> Result<()> {
        self.check_size(&array)?;
        *self.grad.write() = array;
        Ok(())
    }

    fn check_size(&self, array: &NdArray) -> Result<()> {
        let numel = self.numel();
        if array.numel() != numel {
            return Err(NablaError::ShapeMismatch {
                expected: self.shape().dims().to_vec(),
                got: array.shape().dims().to_vec(),
            });
        }
        Ok(())
    }

    /// Change the shape.
    ///
    /// With the same element count the arrays are relabelled in place.
    /// Otherwise `force` must be set, and the variable gets fresh, unallocated
    /// arrays (dropping any aliasing).
    pub fn reshape(&self, shape: &Shape, force: bool) -> Result<()> {
        let current = self.shape();
        if current == *shape {
            return Ok(());
        }
        if current.numel() == shape.numel() {
            self.data.read().reshape(shape);
            self.grad.read().reshape(shape);
        } else if force {
            *self.data.write() = NdArray::new(shape.clone());
            *self.grad.write() = NdArray::new(shape.clone());
        } else {
            return Err(NablaError::ShapeMismatch {
                expected: current.dims().to_vec(),
                got: shape.dims().to_vec(),
            });
        }
        *self.shape.write() = shape.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_variable() {
        let v = Variable::new(&[2, 3]);
        assert_eq!(v.shape().dims(), &[2, 3]);
        assert!(!v.data().is_allocated());
        assert!(!v.grad().is_allocated());
    }

    #[test]
    fn test_aliasing() {
        let a = Variable::from_slice(&[1.0f32, 2.0], &[2]).unwrap();
        let b = Variable::new(&[2]);
        b.set_data(a.data()).unwrap();
        assert!(b.data().ptr_eq(&a.data()));
        assert_eq!(b.data().to_vec::<f32>().unwrap(), vec![1.0, 2.0]);

        let c = Variable::new(&[3]);
        assert!(c.set_data(a.data()).is_err());
    }

    #[test]
    fn test_reshape() {
        let v = Variable::from_slice(&[1.0f32, 2.0, 3.0, 4.0], &[4]).unwrap();
        let data = v.data();
        v.reshape(&Shape::new(&[2, 2]), false).unwrap();
        assert!(v.data().ptr_eq(&data));
        assert_eq!(data.shape().dims(), &[2, 2]);

        assert!(v.reshape(&Shape::new(&[5]), false).is_err());
        v.reshape(&Shape::new(&[5]), true).unwrap();
        assert!(!v.data().ptr_eq(&data));
        assert_eq!(v.numel(), 5);
    }
}
