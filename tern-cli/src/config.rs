//! CLI 配置
//!
//! 包含 CLI 特有的配置：日志级别（全局 + 分阶段）

use std::collections::HashMap;
use tern_config::Phase;
use tracing::Level;

/// CLI 日志配置
#[derive(Debug, Clone, PartialEq)]
pub struct LogConfig {
    /// None 表示完全静默
    pub global: Option<Level>,
    pub phases: HashMap<Phase, Level>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            global: Some(Level::WARN),
            phases: HashMap::new(),
        }
    }
}

impl LogConfig {
    /// 从 project.json 里的级别字符串构建；无法识别的级别被忽略
    pub fn from_strings(global: Option<&str>, phases: &HashMap<Phase, String>) -> Self {
        let mut config = Self::default();
        if let Some(level) = global {
            if let Some(parsed) = parse_log_level(level) {
                config.global = parsed;
            }
        }
        for (phase, level) in phases {
            if let Some(Some(level)) = parse_log_level(level) {
                config.phases.insert(*phase, level);
            }
        }
        config
    }

    /// Get log level for a specific phase
    pub fn level_for(&self, phase: Phase) -> Option<Level> {
        self.phases.get(&phase).copied().or(self.global)
    }
}

/// Parse log level string; `Some(None)` means silent
pub fn parse_log_level(s: &str) -> Option<Option<Level>> {
    match s.to_lowercase().as_str() {
        "silent" | "off" => Some(None),
        "error" => Some(Some(Level::ERROR)),
        "warn" => Some(Some(Level::WARN)),
        "info" => Some(Some(Level::INFO)),
        "debug" => Some(Some(Level::DEBUG)),
        "trace" => Some(Some(Level::TRACE)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("DEBUG"), Some(Some(Level::DEBUG)));
        assert_eq!(parse_log_level("silent"), Some(None));
        assert_eq!(parse_log_level("loud"), None);
    }

    #[test]
    fn test_phase_override() {
        let mut phases = HashMap::new();
        phases.insert(Phase::Vm, "trace".to_string());
        let config = LogConfig::from_strings(Some("error"), &phases);
        assert_eq!(config.level_for(Phase::Vm), Some(Level::TRACE));
        assert_eq!(config.level_for(Phase::Parser), Some(Level::ERROR));
    }

    #[test]
    fn test_silent_global() {
        let config = LogConfig::from_strings(Some("silent"), &HashMap::new());
        assert_eq!(config.level_for(Phase::Compiler), None);
    }
}
