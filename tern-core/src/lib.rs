//! Tern Core - compiler backend and virtual machine (pure logic, no IO)
//!
//! Contains the interner, lexer, parser, effect desugarer, bytecode emitter
//! and the trampoline virtual machine with its standard library.
//! Only operates on in-memory data structures; the sole terminal output is
//! the `print` native.
//!
//! Configuration is passed explicitly via parameters, not via global state.

pub mod compiler;
pub mod interner;
pub mod runtime;

// Re-export common types
pub use compiler::{
    compile_program, compile_source, parse_source, CompileError, CompileErrors, ParseError, SourceError,
};
pub use interner::{Interner, Symbol};
pub use runtime::bytecode::{code::Code, OpCode};
pub use runtime::error::RuntimeError;
pub use runtime::value::Value;
pub use runtime::vm::{Vm, VmConfig};

// Re-export config types from tern-config
pub use tern_config::{CompilerConfig, LimitConfig, Phase};
