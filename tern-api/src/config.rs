//! API 层配置
//!
//! 包含执行配置 RunConfig 和全局单例（供 CLI 使用）

use once_cell::sync::OnceCell;
use tern_config::{CompilerConfig, LimitConfig};
use tern_core::VmConfig;

/// Execution configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// Whether to show execution steps
    pub show_steps: bool,
    /// Whether to dump bytecode after compilation
    pub dump_bytecode: bool,
    /// Whether to echo the source before running
    pub show_source: bool,
    /// Compile without executing
    pub compile_only: bool,
    /// Compiler configuration
    pub compiler: CompilerConfig,
    /// Execution limits
    pub limits: LimitConfig,
    /// Run the embedded prelude before the program
    pub load_prelude: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            show_steps: false,
            dump_bytecode: false,
            show_source: false,
            compile_only: false,
            compiler: CompilerConfig::default(),
            limits: LimitConfig::default(),
            load_prelude: true,
        }
    }
}

impl RunConfig {
    /// VM configuration derived from this run configuration
    pub fn vm_config(&self) -> VmConfig {
        VmConfig {
            limits: self.limits.clone(),
            load_prelude: self.load_prelude,
            ..VmConfig::default()
        }
    }
}

// Global config singleton for CLI convenience
static GLOBAL_CONFIG: OnceCell<RunConfig> = OnceCell::new();

/// Initialize global configuration
///
/// Returns the rejected config if one was already installed.
pub fn init(config: RunConfig) -> Result<(), RunConfig> {
    GLOBAL_CONFIG.set(config)
}

/// Get global config, falling back to the defaults when uninitialized
pub fn config() -> &'static RunConfig {
    GLOBAL_CONFIG.get_or_init(RunConfig::default)
}

/// Check if config is initialized
pub fn is_initialized() -> bool {
    GLOBAL_CONFIG.get().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_run_config() {
        let cfg = RunConfig::default();
        assert!(!cfg.show_steps);
        assert!(!cfg.dump_bytecode);
        assert!(!cfg.compile_only);
        assert!(cfg.load_prelude);
        assert!(cfg.compiler.emit_debug_info);
        assert_eq!(cfg.limits.max_stack_size, 1 << 16);
        assert_eq!(cfg.limits.max_recursion_depth, 10_000);
    }

    #[test]
    fn test_vm_config_carries_limits() {
        let cfg = RunConfig {
            limits: LimitConfig {
                max_stack_size: 64,
                max_recursion_depth: 8,
            },
            load_prelude: false,
            ..RunConfig::default()
        };
        let vm = cfg.vm_config();
        assert_eq!(vm.limits.max_recursion_depth, 8);
        assert!(!vm.load_prelude);
    }

    #[test]
    fn test_run_config_debug() {
        let debug_str = format!("{:?}", RunConfig::default());
        assert!(debug_str.contains("show_steps"));
        assert!(debug_str.contains("compiler"));
        assert!(debug_str.contains("limits"));
    }

    #[test]
    fn test_global_config() {
        // 全局状态：已初始化时 init 返回 Err，但 config() 总是可用
        let _ = init(RunConfig::default());
        assert!(is_initialized());
        assert!(init(RunConfig::default()).is_err());
        assert_eq!(config(), &RunConfig::default());
    }
}
