//! # nabla-functions
//!
//! Function implementations for Nabla.
//!
//! Add2 computes `y = x0 + x1` for two equally shaped inputs. Two
//! implementations are registered under the "Add2" function database:
//! - `cpu:float` / `cpu:double`: [`Add2`], the host reference
//! - `accel:float` / `accel:double`: [`Add2Accel`], driven by the kernel library
//!
//! [`create_add2`] resolves one through the context's backend priority list.

pub mod add2;
pub mod add2_accel;

use std::sync::OnceLock;

use nabla_core::{Context, Element, FunctionDb, Function, Operator, Result};

pub use add2::Add2;
pub use add2_accel::Add2Accel;

fn host_add2<T: Element>(ctx: &Context, inplace: bool) -> Result<Box<dyn Function>> {
    Ok(Box::new(Add2::<T>::new(ctx, inplace)))
}

fn accel_add2<T: Element>(ctx: &Context, inplace: bool) -> Result<Box<dyn Function>> {
    Ok(Box::new(Add2Accel::<T>::new(ctx, inplace)?))
}

/// Registry of Add2 implementations. The argument is the `inplace` flag.
pub fn add2_db() -> &'static FunctionDb<bool> {
    static DB: OnceLock<FunctionDb<bool>> = OnceLock::new();
    DB.get_or_init(|| {
        let db = FunctionDb::new(add2::NAME);
        db.add("cpu", "float", host_add2::<f32>);
        db.add("cpu", "double", host_add2::<f64>);
        db.add("accel", "float", accel_add2::<f32>);
        db.add("accel", "double", accel_add2::<f64>);
        db
    })
}

/// Create an Add2 operator for the first backend in `ctx` that has one.
pub fn create_add2(ctx: &Context, inplace: bool) -> Result<Operator> {
    add2_db().create(ctx, inplace)
}

pub mod prelude {
    pub use crate::{add2_db, create_add2, Add2, Add2Accel};
}
