//! 虚拟机实现
//!
//! 每个 `Vm` 是一个独立的执行上下文：自己的帧栈、值栈、handler 栈与
//! interner。全局表通过 `Arc<RwLock<..>>` 在 fork 出的上下文之间共享。

use crate::compiler::{compile_source, SourceError};
use crate::interner::{Interner, Symbol};
use crate::runtime::bytecode::code::Code;
use crate::runtime::error::RuntimeError;
use crate::runtime::stdlib::{self, task::TaskRegistry};
use crate::runtime::value::{Closure, Env, NativeFn, Value};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tern_config::{targets, CompilerConfig, LimitConfig};
use tracing::debug;

// 子模块
pub(crate) mod call;
pub mod effect;
mod execution;
mod stack;

pub use call::{Frame, Trampoline};
pub use effect::{Continuation, HandlerEntry};

/// VM 配置
#[derive(Debug, Clone)]
pub struct VmConfig {
    pub initial_stack_size: usize,
    pub initial_frames_capacity: usize,
    pub limits: LimitConfig,
    /// 启动时执行内嵌 prelude
    pub load_prelude: bool,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            initial_stack_size: 256,
            initial_frames_capacity: 64,
            limits: LimitConfig::default(),
            load_prelude: true,
        }
    }
}

pub type Globals = Arc<RwLock<HashMap<Symbol, Value>>>;

pub struct Vm {
    pub(crate) frames: Vec<Frame>,
    pub(crate) stack: Vec<Value>,
    pub(crate) handlers: Vec<HandlerEntry>,
    globals: Globals,
    interner: Interner,
    next_label: u64,
    pub(crate) config: VmConfig,
    pub(crate) tasks: Arc<TaskRegistry>,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    /// 只装标准库、不跑 prelude 的 VM
    pub fn new() -> Self {
        Self::bare(VmConfig {
            load_prelude: false,
            ..VmConfig::default()
        })
    }

    fn bare(config: VmConfig) -> Self {
        let mut vm = Self {
            frames: Vec::with_capacity(config.initial_frames_capacity),
            stack: Vec::with_capacity(config.initial_stack_size),
            handlers: Vec::new(),
            globals: Arc::new(RwLock::new(HashMap::new())),
            interner: Interner::new(),
            next_label: 0,
            config,
            tasks: Arc::new(TaskRegistry::default()),
        };
        stdlib::install(&mut vm);
        vm
    }

    /// 按配置创建；prelude 出错视为启动失败
    pub fn with_config(config: VmConfig) -> Result<Self, RuntimeError> {
        let load_prelude = config.load_prelude;
        let mut vm = Self::bare(config);
        if load_prelude {
            vm.load_prelude()?;
        }
        Ok(vm)
    }

    fn load_prelude(&mut self) -> Result<(), RuntimeError> {
        let code = self
            .compile(stdlib::prelude::SOURCE, &CompilerConfig::default())
            .map_err(|e| RuntimeError::Other(format!("prelude failed to compile: {}", e)))?;
        self.interpret(code)?;
        debug!(target: targets::STDLIB, "prelude loaded");
        Ok(())
    }

    /// 派生一个独立执行上下文：拷贝 interner，共享全局表
    pub fn fork(&self) -> Self {
        Self {
            frames: Vec::with_capacity(self.config.initial_frames_capacity),
            stack: Vec::with_capacity(self.config.initial_stack_size),
            handlers: Vec::new(),
            globals: self.globals.clone(),
            interner: self.interner.clone(),
            next_label: 0,
            config: self.config.clone(),
            tasks: self.tasks.clone(),
        }
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn interner(&self) -> &Interner {
        &self.interner
    }

    pub fn interner_mut(&mut self) -> &mut Interner {
        &mut self.interner
    }

    /// 用本 VM 的 interner 编译源码
    pub fn compile(&mut self, source: &str, config: &CompilerConfig) -> Result<Arc<Code>, SourceError> {
        compile_source(source, &mut self.interner, config)
    }

    /// 执行顶层 Code
    pub fn interpret(&mut self, code: Arc<Code>) -> Result<Value, RuntimeError> {
        debug!(
            target: targets::VM,
            bytes = code.instrs.len(),
            constants = code.consts.len(),
            "interpret"
        );
        let main = Value::Closure(Arc::new(Closure::new(code, Arc::new(Env::new()))));
        self.call_value(main, Vec::new())
    }

    /// 调用任意可调用值并运行到它返回；出错时把本次调用留下的状态清掉
    pub fn call_value(&mut self, callee: Value, args: Vec<Value>) -> Result<Value, RuntimeError> {
        let base_depth = self.frames.len();
        let stack_height = self.stack.len();
        let handler_count = self.handlers.len();

        let result = self.call_at(callee, args, base_depth);
        if result.is_err() {
            self.frames.truncate(base_depth);
            self.stack.truncate(stack_height);
            self.handlers.truncate(handler_count);
        }
        result
    }

    fn call_at(&mut self, callee: Value, args: Vec<Value>, base_depth: usize) -> Result<Value, RuntimeError> {
        let trampoline = call::apply(self, callee, args, false);
        self.dispatch(trampoline, false, base_depth)?;
        if self.frames.len() > base_depth {
            execution::run(self, base_depth)
        } else {
            stack::pop(self)
        }
    }

    // ==================== 全局表 ====================

    pub(crate) fn global(&self, name: &Symbol) -> Option<Value> {
        let globals = self.globals.read().unwrap_or_else(|e| e.into_inner());
        globals.get(name).cloned()
    }

    pub(crate) fn set_global(&self, name: Symbol, value: Value) {
        let mut globals = self.globals.write().unwrap_or_else(|e| e.into_inner());
        globals.insert(name, value);
    }

    /// 定义（或覆盖）全局
    pub fn define_global(&mut self, name: &str, value: Value) {
        let symbol = self.interner.intern(name);
        self.set_global(symbol, value);
    }

    pub fn get_global(&self, name: &str) -> Option<Value> {
        let symbol = self.interner.lookup(name)?;
        self.global(&symbol)
    }

    /// 注册原生函数为全局
    pub fn register_native(&mut self, name: &str, arity: usize, func: NativeFn) {
        self.define_global(name, Value::native(name, arity, func));
    }

    /// 注册模块：一组成员打包成一个全局 Record
    pub fn register_module(&mut self, name: &str, members: Vec<(&str, Value)>) {
        let fields = members
            .into_iter()
            .map(|(field, value)| (self.interner.intern(field), value))
            .collect();
        self.define_global(name, Value::record(fields));
    }

    /// 当前帧深度（测试与诊断用）
    pub fn frame_depth(&self) -> usize {
        self.frames.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(vm: &mut Vm, source: &str) -> Result<Value, RuntimeError> {
        let code = vm.compile(source, &CompilerConfig::default()).unwrap();
        vm.interpret(code)
    }

    #[test]
    fn test_state_is_clean_after_error() {
        let mut vm = Vm::new();
        assert!(run(&mut vm, "{ var f = |x| x(1); f(2) }").is_err());
        assert_eq!(vm.frame_depth(), 0);
        assert!(vm.stack.is_empty());
        assert!(vm.handlers.is_empty());
        assert_eq!(run(&mut vm, "1 + 1").unwrap(), Value::Int(2));
    }

    #[test]
    fn test_globals_persist_between_runs() {
        let mut vm = Vm::new();
        run(&mut vm, "var answer = 42").unwrap();
        assert_eq!(run(&mut vm, "answer").unwrap(), Value::Int(42));
        assert_eq!(vm.get_global("answer"), Some(Value::Int(42)));
    }

    #[test]
    fn test_fork_shares_globals() {
        let mut vm = Vm::new();
        let child = vm.fork();
        vm.define_global("shared", Value::Int(1));
        assert_eq!(child.get_global("shared"), None); // 名字在 fork 之后才驻留
        let mut child = vm.fork();
        assert_eq!(child.get_global("shared"), Some(Value::Int(1)));
        child.define_global("shared", Value::Int(2));
        assert_eq!(vm.get_global("shared"), Some(Value::Int(2)));
    }

    #[test]
    fn test_register_module() {
        let mut vm = Vm::new();
        vm.register_module("m", vec![("x", Value::Int(3))]);
        assert_eq!(run(&mut vm, "m.x").unwrap(), Value::Int(3));
    }

    #[test]
    fn test_call_value_native() {
        let mut vm = Vm::new();
        let add = vm.get_global("add").unwrap();
        assert_eq!(
            vm.call_value(add, vec![Value::Int(2), Value::Int(3)]).unwrap(),
            Value::Int(5)
        );
    }

    #[test]
    fn test_prelude_loads() {
        let mut vm = Vm::with_config(VmConfig::default()).unwrap();
        assert!(vm.get_global("map").is_some());
        assert_eq!(run(&mut vm, "sum([1, 2, 3])").unwrap(), Value::Int(6));
    }
}
