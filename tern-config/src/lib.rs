//! Tern Config - Pure configuration data structures
//!
//! This crate contains only data structures, no logic or global state.
//! It serves as the shared configuration vocabulary across all Tern crates.
//! Every struct deserializes from a partial JSON object; missing fields
//! fall back to their defaults.

use serde::Deserialize;

/// Configuration for compiler behavior
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Whether to record source lines for every emitted byte
    pub emit_debug_info: bool,
}

/// Configuration for execution limits
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LimitConfig {
    /// Maximum number of values on the operand stack
    pub max_stack_size: usize,
    /// Maximum number of live (non-tail) call frames
    pub max_recursion_depth: usize,
}

/// Log targets, usable as `target:` in `tracing` macros
pub mod targets {
    pub const LEXER: &str = "tern::lexer";
    pub const PARSER: &str = "tern::parser";
    pub const DESUGAR: &str = "tern::desugar";
    pub const COMPILER: &str = "tern::compiler";
    pub const VM: &str = "tern::vm";
    pub const STDLIB: &str = "tern::stdlib";
}

/// Execution phase enum for phase-specific configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Lexer,
    Parser,
    Desugar,
    Compiler,
    Vm,
    Stdlib,
}

impl Phase {
    /// All phases, in pipeline order
    pub const ALL: [Phase; 6] = [
        Phase::Lexer,
        Phase::Parser,
        Phase::Desugar,
        Phase::Compiler,
        Phase::Vm,
        Phase::Stdlib,
    ];

    /// Get the string name of the phase
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Lexer => "lexer",
            Phase::Parser => "parser",
            Phase::Desugar => "desugar",
            Phase::Compiler => "compiler",
            Phase::Vm => "vm",
            Phase::Stdlib => "stdlib",
        }
    }

    /// Get the log target name for this phase
    pub fn target(&self) -> &'static str {
        match self {
            Phase::Lexer => targets::LEXER,
            Phase::Parser => targets::PARSER,
            Phase::Desugar => targets::DESUGAR,
            Phase::Compiler => targets::COMPILER,
            Phase::Vm => targets::VM,
            Phase::Stdlib => targets::STDLIB,
        }
    }
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            emit_debug_info: true,
        }
    }
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            max_stack_size: 1 << 16,
            max_recursion_depth: 10_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_compiler_config() {
        let cfg = CompilerConfig::default();
        assert!(cfg.emit_debug_info);
    }

    #[test]
    fn test_default_limit_config() {
        let cfg = LimitConfig::default();
        assert_eq!(cfg.max_stack_size, 65536);
        assert_eq!(cfg.max_recursion_depth, 10_000);
    }

    #[test]
    fn test_phase_as_str() {
        assert_eq!(Phase::Lexer.as_str(), "lexer");
        assert_eq!(Phase::Vm.target(), "tern::vm");
        assert_eq!(Phase::ALL.len(), 6);
    }

    #[test]
    fn test_partial_limits_from_json() {
        let cfg: LimitConfig = serde_json::from_str(r#"{ "max_recursion_depth": 64 }"#).unwrap();
        assert_eq!(cfg.max_recursion_depth, 64);
        assert_eq!(cfg.max_stack_size, 65536);
    }

    #[test]
    fn test_phase_from_json() {
        let phase: Phase = serde_json::from_str(r#""desugar""#).unwrap();
        assert_eq!(phase, Phase::Desugar);
    }
}
