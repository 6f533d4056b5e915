//! Tern 运行时
//!
//! - 字节码定义与 Code 对象
//! - `Value` 值模型
//! - trampoline 虚拟机（闭包、尾调用、效应与续体）
//! - 标准库与 prelude

pub mod bytecode;
pub mod error;
pub mod stdlib;
pub mod value;
pub mod vm;

pub use bytecode::{code::Code, OpCode};
pub use error::RuntimeError;
pub use value::Value;
pub use vm::{Vm, VmConfig};
