//! Tern API - Execution orchestration layer
//!
//! Provides unified execution interface, including:
//! - Execution flow orchestration
//! - Configuration abstraction (RunConfig)
//! - Unified error handling (TernError)
//!
//! For CLI convenience, this crate provides a global singleton API.
//! For library use, prefer the explicit `run(source, &config)` API.

use tern_config::targets;
use tracing::{debug, info};

// Re-export config
pub mod config;
pub use config::{config as get_config, init as init_config, is_initialized, RunConfig};

// Re-export config types from tern_config
pub use tern_config::{CompilerConfig, LimitConfig, Phase};

// Re-export error and types
pub mod error;
pub mod types;
pub use error::{ErrorReport, TernError};
pub use types::{CompileOutput, ExecuteOutput};

// Re-export core types
pub use tern_config;
pub use tern_core::{Code, OpCode, Value, Vm};

/// Execute with explicit configuration
///
/// This is the recommended API for library users.
pub fn run(source: &str, config: &RunConfig) -> Result<ExecuteOutput, TernError> {
    info!(target: targets::VM, "starting execution");

    let compiled = compile_with_config(source, config)?;
    if config.dump_bytecode {
        println!("{}", compiled.code.disassemble("main"));
    }

    let output = execute(compiled)?;
    info!(target: targets::VM, "execution completed");
    Ok(output)
}

/// Compile with explicit configuration
///
/// Builds the VM first (running the prelude if enabled) so that the
/// program's names are interned in the table it will execute against.
pub fn compile_with_config(source: &str, config: &RunConfig) -> Result<CompileOutput, TernError> {
    let mut vm = Vm::with_config(config.vm_config())?;
    let code = vm.compile(source, &config.compiler)?;
    debug!(
        target: targets::COMPILER,
        constants = code.consts.len(),
        code_bytes = code.instrs.len(),
        "compilation completed"
    );
    Ok(CompileOutput { code, vm })
}

/// Execute a compiled program on the VM it was compiled with
pub fn execute(compiled: CompileOutput) -> Result<ExecuteOutput, TernError> {
    let CompileOutput { code, mut vm } = compiled;
    let value = vm.interpret(code)?;
    Ok(ExecuteOutput { value })
}

// ==================== Global-config API ====================

/// Compile source code (uses global config)
pub fn compile(source: &str) -> Result<CompileOutput, TernError> {
    compile_with_config(source, get_config())
}

/// Compile and run (uses global config)
pub fn compile_and_run(source: &str) -> Result<ExecuteOutput, TernError> {
    run(source, get_config())
}

/// Quick run with the global config (defaults when uninitialized)
pub fn quick_run(source: &str) -> Result<ExecuteOutput, TernError> {
    compile_and_run(source)
}
