//! 测试辅助工具
//!
//! 提供端到端测试的辅助函数

use tern_core::{CompilerConfig, RuntimeError, SourceError, Value, Vm, VmConfig};

/// 执行 Tern 代码并返回结果（完整流程：解析 + 脱糖 + 编译 + 执行，带 prelude）
///
/// # Example
/// ```
/// let value = run_code("var x = 5; x").unwrap();
/// assert_eq!(get_int(&value), Some(5));
/// ```
pub fn run_code(code: &str) -> Result<Value, ExecError> {
    let mut vm = Vm::with_config(VmConfig::default()).map_err(ExecError::Runtime)?;
    run_in(&mut vm, code)
}

/// 在已有的 VM 上执行（全局表跨次保留）
pub fn run_in(vm: &mut Vm, code: &str) -> Result<Value, ExecError> {
    let chunk = vm
        .compile(code, &CompilerConfig::default())
        .map_err(ExecError::Compile)?;
    vm.interpret(chunk).map_err(ExecError::Runtime)
}

/// 执行错误
#[derive(Debug)]
pub enum ExecError {
    Compile(SourceError),
    Runtime(RuntimeError),
}

impl ExecError {
    /// 去掉行号包装后的运行时错误
    pub fn runtime(&self) -> Option<&RuntimeError> {
        match self {
            ExecError::Runtime(e) => Some(e.root()),
            ExecError::Compile(_) => None,
        }
    }
}

impl std::fmt::Display for ExecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecError::Compile(e) => write!(f, "Compile error: {}", e),
            ExecError::Runtime(e) => write!(f, "Runtime error: {}", e),
        }
    }
}

impl std::error::Error for ExecError {}

/// 获取整数值
pub fn get_int(value: &Value) -> Option<i64> {
    value.as_int()
}

/// 获取浮点数值
pub fn get_float(value: &Value) -> Option<f64> {
    value.as_float()
}

/// 获取字符串值
pub fn get_string(value: &Value) -> Option<String> {
    value.as_str().map(str::to_string)
}
