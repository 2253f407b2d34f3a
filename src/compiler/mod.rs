//! 编译模块
//!
//! 单遍编译器：Token 流直接生成字节码

pub mod bytecode;
pub mod codegen;

pub use bytecode::{Chunk, OpCode};
pub use codegen::compile;
