//! 运行时错误
//!
//! 以 Error trampoline 的形式传播，只展开引发它的那个执行上下文。

use thiserror::Error;

/// 统一的运行时错误类型
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    /// 类型错误
    #[error("TypeError: {0}")]
    TypeError(String),
    /// 未定义变量
    #[error("UndefinedVariable: {0}")]
    UndefinedVariable(String),
    /// 索引越界
    #[error("IndexOutOfBounds: index {index} out of range for length {len}")]
    IndexOutOfBounds { index: i64, len: usize },
    /// 除零错误
    #[error("DivisionByZero")]
    DivisionByZero,
    /// 栈溢出
    #[error("StackOverflow: {0}")]
    StackOverflow(String),
    /// 参数个数不符
    #[error("ArityMismatch: {name} expects {expected} argument(s) ({given} given)")]
    ArityMismatch {
        name: String,
        expected: usize,
        given: usize,
    },
    /// 调用了不可调用的值
    #[error("NotCallable: {0}")]
    NotCallable(String),
    /// 没有 handler 接住的效应
    #[error("UnhandledEffect: unhandled effect {0}")]
    UnhandledEffect(String),
    /// 语言层 panic
    #[error("Panic: {0}")]
    Panic(String),
    /// 字节码损坏（编译器缺陷）
    #[error("InvalidBytecode: {0}")]
    InvalidBytecode(String),
    /// spawn 出去的任务失败
    #[error("TaskFailed: {0}")]
    TaskFailed(String),
    /// 其他错误
    #[error("{0}")]
    Other(String),
    /// 附带源码行号
    #[error("[line {line}] {error}")]
    At {
        line: usize,
        error: Box<RuntimeError>,
    },
}

impl RuntimeError {
    pub fn type_error(msg: impl Into<String>) -> Self {
        RuntimeError::TypeError(msg.into())
    }

    /// 附加行号（已有行号时保持最内层的那个）
    pub fn at_line(self, line: usize) -> Self {
        match self {
            located @ RuntimeError::At { .. } => located,
            other if line == 0 => other,
            other => RuntimeError::At {
                line,
                error: Box::new(other),
            },
        }
    }

    pub fn line(&self) -> Option<usize> {
        match self {
            RuntimeError::At { line, .. } => Some(*line),
            _ => None,
        }
    }

    /// 去掉位置包装后的错误
    /// 变体名（结构化报告用）
    pub fn kind(&self) -> &'static str {
        match self.root() {
            RuntimeError::TypeError(_) => "TypeError",
            RuntimeError::UndefinedVariable(_) => "UndefinedVariable",
            RuntimeError::IndexOutOfBounds { .. } => "IndexOutOfBounds",
            RuntimeError::DivisionByZero => "DivisionByZero",
            RuntimeError::StackOverflow(_) => "StackOverflow",
            RuntimeError::ArityMismatch { .. } => "ArityMismatch",
            RuntimeError::NotCallable(_) => "NotCallable",
            RuntimeError::UnhandledEffect(_) => "UnhandledEffect",
            RuntimeError::Panic(_) => "Panic",
            RuntimeError::InvalidBytecode(_) => "InvalidBytecode",
            RuntimeError::TaskFailed(_) => "TaskFailed",
            RuntimeError::Other(_) | RuntimeError::At { .. } => "RuntimeError",
        }
    }

    pub fn root(&self) -> &RuntimeError {
        match self {
            RuntimeError::At { error, .. } => error.root(),
            other => other,
        }
    }
}

impl From<String> for RuntimeError {
    fn from(msg: String) -> Self {
        RuntimeError::Other(msg)
    }
}

impl From<&str> for RuntimeError {
    fn from(msg: &str) -> Self {
        RuntimeError::Other(msg.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(RuntimeError::DivisionByZero.to_string(), "DivisionByZero");
        let err = RuntimeError::ArityMismatch {
            name: "add".into(),
            expected: 2,
            given: 3,
        };
        assert_eq!(err.to_string(), "ArityMismatch: add expects 2 argument(s) (3 given)");
    }

    #[test]
    fn test_at_line_keeps_innermost() {
        let err = RuntimeError::Panic("boom".into()).at_line(3).at_line(9);
        assert_eq!(err.line(), Some(3));
        assert_eq!(err.root(), &RuntimeError::Panic("boom".into()));
        assert_eq!(err.to_string(), "[line 3] Panic: boom");
        assert_eq!(err.kind(), "Panic");
    }
}
