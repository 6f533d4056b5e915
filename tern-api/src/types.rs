//! API 类型定义
//!
//! 编译和执行的输入输出类型。

use std::sync::Arc;
use tern_core::{Code, Value, Vm};

/// 编译输出
pub struct CompileOutput {
    /// 顶层字节码
    pub code: Arc<Code>,
    /// 编译所用的 VM（interner 与全局表），执行时复用
    pub vm: Vm,
}

impl std::fmt::Debug for CompileOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompileOutput")
            .field("bytes", &self.code.instrs.len())
            .field("constants", &self.code.consts.len())
            .field("locals", &self.code.local_count)
            .finish()
    }
}

/// 执行输出
#[derive(Debug)]
pub struct ExecuteOutput {
    /// 顶层表达式的值
    pub value: Value,
}
