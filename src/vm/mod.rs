//! 虚拟机模块

pub mod value;
pub mod object;
pub mod table;
pub mod gc;
#[allow(clippy::module_inception)]
pub mod vm;

pub use value::Value;
pub use object::{Native, NativeCtx, NativeFn, Obj, ObjKey};
pub use vm::{InterpretResult, RuntimeError, VM};
