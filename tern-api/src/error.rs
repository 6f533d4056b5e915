//! API 错误类型
//!
//! 提供统一的错误类型和结构化错误报告。

use serde::Serialize;
use thiserror::Error;

pub use tern_core::{CompileErrors, ParseError, RuntimeError, SourceError};

/// Tern 错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TernError {
    /// 语法错误（可能有多个）
    #[error("{}", .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("\n"))]
    Syntax(Vec<ParseError>),

    /// 编译错误（可能有多个）
    #[error("Compiler error: {0}")]
    Compile(CompileErrors),

    /// 运行时错误（包括 prelude 启动失败）
    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),
}

impl From<SourceError> for TernError {
    fn from(e: SourceError) -> Self {
        match e {
            SourceError::Syntax(errors) => TernError::Syntax(errors),
            SourceError::Compile(errors) => TernError::Compile(errors),
        }
    }
}

impl TernError {
    /// 获取错误行号（如果有）
    pub fn line(&self) -> Option<usize> {
        match self {
            TernError::Syntax(errors) => errors.first().map(|e| e.line),
            TernError::Compile(errors) => errors.first_line(),
            TernError::Runtime(e) => e.line(),
        }
    }

    /// 获取错误列号（只有语法错误带列号）
    pub fn column(&self) -> Option<usize> {
        match self {
            TernError::Syntax(errors) => errors.first().map(|e| e.column),
            _ => None,
        }
    }

    /// 获取错误阶段名称
    pub fn phase(&self) -> &'static str {
        match self {
            TernError::Syntax(_) => "parser",
            TernError::Compile(_) => "compiler",
            TernError::Runtime(_) => "runtime",
        }
    }

    /// 转换为结构化错误报告
    ///
    /// CLI 可以直接打印，上层应用可以序列化为 JSON。
    pub fn to_report(&self) -> ErrorReport {
        let (error_kind, message, count) = match self {
            TernError::Syntax(errors) => (
                "SyntaxError".to_string(),
                errors.first().map(|e| e.message.clone()).unwrap_or_default(),
                errors.len(),
            ),
            TernError::Compile(errors) => (
                errors
                    .iter()
                    .next()
                    .map(|e| e.kind())
                    .unwrap_or("CompileError")
                    .to_string(),
                errors.to_string(),
                errors.len(),
            ),
            TernError::Runtime(e) => (e.kind().to_string(), e.root().to_string(), 1),
        };
        ErrorReport {
            phase: self.phase(),
            line: self.line(),
            column: self.column(),
            error_kind,
            message,
            count,
        }
    }
}

/// 结构化错误报告
///
/// 上层应用（CLI、Web、LSP）可以根据自己的需求格式化。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorReport {
    /// 错误阶段: parser, compiler, runtime
    pub phase: &'static str,
    /// 错误行号（1-based，如果有）
    pub line: Option<usize>,
    /// 错误列号（1-based，如果有）
    pub column: Option<usize>,
    /// 错误类型（可用于程序化处理）
    pub error_kind: String,
    /// 人类可读的错误消息
    pub message: String,
    /// 同一阶段收集到的错误个数
    pub count: usize,
}

impl std::fmt::Display for ErrorReport {
    /// 默认的 CLI 友好格式
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.line, self.column) {
            (Some(line), Some(col)) => {
                write!(f, "[{}:{}] {} error: {}", line, col, self.phase, self.message)
            }
            (Some(line), None) => write!(f, "[line {}] {} error: {}", line, self.phase, self.message),
            _ => write!(f, "[{}] {} error: {}", self.phase, self.error_kind, self.message),
        }
    }
}

impl ErrorReport {
    /// 转换为 JSON 格式（Web API 使用）
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"phase":"{}","message":"unserializable report: {}"}}"#, self.phase, e)
        })
    }

    /// 简洁格式（适合终端）
    pub fn to_short(&self) -> String {
        format!("{}: {}", self.phase, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tern_core::CompileError;

    #[test]
    fn test_syntax_error_line_column() {
        let err = TernError::Syntax(vec![ParseError::at("expected ';'", 3, 7)]);
        assert_eq!(err.line(), Some(3));
        assert_eq!(err.column(), Some(7));
        assert_eq!(err.phase(), "parser");
    }

    #[test]
    fn test_compile_error_report() {
        let err = TernError::Compile(CompileErrors(vec![
            CompileError::DuplicateParameter {
                name: "x".into(),
                line: 2,
            },
            CompileError::TooManyLocals { line: 5 },
        ]));
        let report = err.to_report();
        assert_eq!(report.phase, "compiler");
        assert_eq!(report.line, Some(2));
        assert_eq!(report.column, None);
        assert_eq!(report.error_kind, "DuplicateParameter");
        assert_eq!(report.count, 2);
        assert_eq!(report.to_string().lines().next(), Some("[line 2] compiler error: [line 2] Duplicate parameter 'x'"));
    }

    #[test]
    fn test_runtime_error_report() {
        let err = TernError::Runtime(RuntimeError::DivisionByZero.at_line(4));
        let report = err.to_report();
        assert_eq!(report.phase, "runtime");
        assert_eq!(report.line, Some(4));
        assert_eq!(report.error_kind, "DivisionByZero");
        assert_eq!(report.message, "DivisionByZero");
    }

    #[test]
    fn test_error_report_display_without_location() {
        let report = TernError::Runtime(RuntimeError::Panic("boom".into())).to_report();
        assert_eq!(report.to_string(), "[runtime] Panic error: Panic: boom");
        assert_eq!(report.to_short(), "runtime: Panic: boom");
    }

    #[test]
    fn test_error_report_to_json() {
        let err = TernError::Syntax(vec![ParseError::at("bad \"token\"", 1, 2)]);
        let json: serde_json::Value = serde_json::from_str(&err.to_report().to_json()).unwrap();
        assert_eq!(json["phase"], "parser");
        assert_eq!(json["line"], 1);
        assert_eq!(json["column"], 2);
        assert_eq!(json["message"], "bad \"token\"");
    }

    #[test]
    fn test_error_report_to_json_null_values() {
        let report = TernError::Runtime(RuntimeError::DivisionByZero).to_report();
        let json: serde_json::Value = serde_json::from_str(&report.to_json()).unwrap();
        assert!(json["line"].is_null());
        assert!(json["column"].is_null());
    }

    #[test]
    fn test_from_source_error() {
        let err: TernError = SourceError::Syntax(vec![ParseError::at("x", 1, 1)]).into();
        assert!(matches!(err, TernError::Syntax(_)));
    }
}
