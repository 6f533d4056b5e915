//! 编译期错误
//!
//! 语法错误与编译错误都先收集，最后一起报告。编译错误中的 fatal 类
//! （编译器自身契约被破坏）会立刻终止发射。

use crate::runtime::bytecode::code::EncodeError;
use std::fmt;
use thiserror::Error;

/// 语法错误，包含位置信息
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("[{line}:{column}] {message}")]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl ParseError {
    pub fn at(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            message: message.into(),
            line,
            column,
        }
    }
}

/// 编译错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("[line {line}] Variable '{name}' already exists in this scope")]
    VariableAlreadyExists { name: String, line: usize },
    #[error("[line {line}] Duplicate parameter '{name}'")]
    DuplicateParameter { name: String, line: usize },
    #[error("[line {line}] Too many local variables")]
    TooManyLocals { line: usize },
    #[error("[line {line}] Too many {what} ({count}, limit 255)")]
    TooManyOperands {
        what: &'static str,
        count: usize,
        line: usize,
    },
    #[error("[line {line}] Handler clause effect must be a dotted identifier path, found {found}")]
    InvalidEffectPath { found: String, line: usize },
    #[error("[line {line}] {error}")]
    Encode { error: EncodeError, line: usize },
    /// 同一效应出现两个无守卫子句
    #[error("[line {line}] Duplicate catch-all clause for effect '{effect}'")]
    DuplicateCatchAll { effect: String, line: usize },
    /// 发射器遇到不支持的节点
    #[error("[line {line}] Unsupported node kind '{kind}'")]
    UnsupportedNode { kind: &'static str, line: usize },
}

impl CompileError {
    /// 编译器内部契约被破坏，必须立即终止
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CompileError::DuplicateCatchAll { .. }
                | CompileError::UnsupportedNode { .. }
                | CompileError::Encode {
                    error: EncodeError::TooManyConstants,
                    ..
                }
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            CompileError::VariableAlreadyExists { .. } => "VariableAlreadyExists",
            CompileError::DuplicateParameter { .. } => "DuplicateParameter",
            CompileError::TooManyLocals { .. } => "TooManyLocals",
            CompileError::TooManyOperands { .. } => "TooManyOperands",
            CompileError::InvalidEffectPath { .. } => "InvalidEffectPath",
            CompileError::Encode { .. } => "Encode",
            CompileError::DuplicateCatchAll { .. } => "DuplicateCatchAll",
            CompileError::UnsupportedNode { .. } => "UnsupportedNode",
        }
    }

    pub fn line(&self) -> usize {
        match self {
            CompileError::VariableAlreadyExists { line, .. }
            | CompileError::DuplicateParameter { line, .. }
            | CompileError::TooManyLocals { line }
            | CompileError::TooManyOperands { line, .. }
            | CompileError::InvalidEffectPath { line, .. }
            | CompileError::Encode { line, .. }
            | CompileError::DuplicateCatchAll { line, .. }
            | CompileError::UnsupportedNode { line, .. } => *line,
        }
    }
}

/// 一次编译收集到的全部错误
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompileErrors(pub Vec<CompileError>);

impl CompileErrors {
    pub fn first_line(&self) -> Option<usize> {
        self.0.first().map(CompileError::line)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CompileError> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for CompileErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", e)?;
        }
        Ok(())
    }
}

impl std::error::Error for CompileErrors {}

impl From<CompileError> for CompileErrors {
    fn from(e: CompileError) -> Self {
        CompileErrors(vec![e])
    }
}

/// 源码到 Code 的整条流水线可能出现的失败
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("{}", .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("\n"))]
    Syntax(Vec<ParseError>),
    #[error("{0}")]
    Compile(#[from] CompileErrors),
}

impl SourceError {
    pub fn line(&self) -> Option<usize> {
        match self {
            SourceError::Syntax(errors) => errors.first().map(|e| e.line),
            SourceError::Compile(errors) => errors.first_line(),
        }
    }

    pub fn column(&self) -> Option<usize> {
        match self {
            SourceError::Syntax(errors) => errors.first().map(|e| e.column),
            SourceError::Compile(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(CompileError::UnsupportedNode { kind: "handle", line: 1 }.is_fatal());
        assert!(CompileError::DuplicateCatchAll {
            effect: "Ask".into(),
            line: 1
        }
        .is_fatal());
        assert!(!CompileError::TooManyLocals { line: 1 }.is_fatal());
        assert!(!CompileError::Encode {
            error: EncodeError::JumpTooFar(70_000),
            line: 1
        }
        .is_fatal());
    }

    #[test]
    fn test_errors_display_joined() {
        let errors = CompileErrors(vec![
            CompileError::TooManyLocals { line: 1 },
            CompileError::DuplicateParameter {
                name: "x".into(),
                line: 2,
            },
        ]);
        assert_eq!(
            errors.to_string(),
            "[line 1] Too many local variables\n[line 2] Duplicate parameter 'x'"
        );
        assert_eq!(errors.first_line(), Some(1));
    }

    #[test]
    fn test_parse_error_display() {
        let err = ParseError::at("expected ')'", 3, 7);
        assert_eq!(err.to_string(), "[3:7] expected ')'");
    }
}
