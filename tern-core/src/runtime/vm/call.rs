//! 函数调用：调用帧、trampoline 协议、闭包构造

use super::effect::Continuation;
use super::Vm;
use crate::runtime::bytecode::code::{Code, CaptureSource};
use crate::runtime::error::RuntimeError;
use crate::runtime::value::{Closure, EffectType, Env, PartialApp, Value};
use std::sync::Arc;
use tern_config::targets;
use tracing::trace;

/// 调用帧
#[derive(Debug, Clone)]
pub struct Frame {
    pub code: Arc<Code>,
    /// 动态查找用的捕获环境（写入时拷贝）
    pub env: Arc<Env>,
    pub locals: Vec<Value>,
    pub ip: usize,
    /// 本帧操作数区在值栈上的起点
    pub stack_base: usize,
    /// handler 安装点：返回时一并移除 Label 与 handler 记录
    pub boundary: bool,
}

impl Frame {
    /// 参数放入槽位 0..arity，自引用名放在槽位 arity
    pub fn new(closure: Arc<Closure>, args: Vec<Value>, stack_base: usize, boundary: bool) -> Self {
        let code = closure.code.clone();
        let mut locals = args;
        locals.resize(code.local_count.max(locals.len()), Value::None);
        if code.self_name.is_some() {
            let slot = code.params.len();
            if slot < locals.len() {
                locals[slot] = Value::Closure(closure.clone());
            }
        }
        Self {
            code,
            env: closure.env.clone(),
            locals,
            ip: 0,
            stack_base,
            boundary,
        }
    }
}

/// 所有调用类操作的结果，由执行循环统一处理
pub enum Trampoline {
    /// 立即得到的值（原生函数、部分应用）
    Returned(Value),
    /// 压入新帧
    Call(Arc<Closure>, Vec<Value>),
    /// 原地替换当前帧
    TailCall(Arc<Closure>, Vec<Value>),
    /// 抛出效应
    Effect(Arc<EffectType>, Value),
    /// 恢复续体，值作为抛出点那次调用的结果
    RestoreContinuation(Arc<Continuation>, Value),
    Error(RuntimeError),
}

fn arity_error(name: String, expected: usize, given: usize) -> Trampoline {
    Trampoline::Error(RuntimeError::ArityMismatch {
        name,
        expected,
        given,
    })
}

/// 按被调者种类分派；实参少于元数时得到部分应用
pub fn apply(vm: &mut Vm, callee: Value, args: Vec<Value>, tail: bool) -> Trampoline {
    match &callee {
        Value::Closure(closure) => {
            let arity = closure.arity();
            if args.len() < arity {
                return Trampoline::Returned(Value::PartialApp(Arc::new(PartialApp {
                    callee: Value::Closure(closure.clone()),
                    bound: args,
                })));
            }
            if args.len() > arity {
                let name = closure
                    .code
                    .name
                    .as_ref()
                    .map(|n| n.as_str().to_string())
                    .unwrap_or_else(|| "<lambda>".to_string());
                return arity_error(name, arity, args.len());
            }
            if tail {
                Trampoline::TailCall(closure.clone(), args)
            } else {
                Trampoline::Call(closure.clone(), args)
            }
        }
        Value::NativeFunc(native) => {
            if args.len() < native.arity {
                return Trampoline::Returned(Value::PartialApp(Arc::new(PartialApp {
                    callee: Value::NativeFunc(native.clone()),
                    bound: args,
                })));
            }
            if args.len() > native.arity {
                return arity_error(native.name.clone(), native.arity, args.len());
            }
            trace!(target: targets::VM, native = %native.name, "call native");
            match (native.func)(vm, &args) {
                Ok(value) => Trampoline::Returned(value),
                Err(e) => Trampoline::Error(e),
            }
        }
        Value::PartialApp(partial) => {
            let mut all = partial.bound.clone();
            all.extend(args);
            apply(vm, partial.callee.clone(), all, tail)
        }
        Value::Type(effect) => match args.len() {
            0 => Trampoline::Returned(Value::PartialApp(Arc::new(PartialApp {
                callee: Value::Type(effect.clone()),
                bound: args,
            }))),
            1 => {
                let payload = args.into_iter().next().unwrap_or(Value::None);
                Trampoline::Effect(effect.clone(), payload)
            }
            n => arity_error(effect.name.clone(), 1, n),
        },
        Value::Continuation(k) => match args.len() {
            0 => Trampoline::Returned(Value::PartialApp(Arc::new(PartialApp {
                callee: Value::Continuation(k.clone()),
                bound: args,
            }))),
            1 => {
                let value = args.into_iter().next().unwrap_or(Value::None);
                Trampoline::RestoreContinuation(k.clone(), value)
            }
            n => arity_error("continuation".to_string(), 1, n),
        },
        other => Trampoline::Error(RuntimeError::NotCallable(format!(
            "{} is not callable",
            other.type_name()
        ))),
    }
}

/// 压入新帧
pub fn push_frame(
    vm: &mut Vm,
    closure: Arc<Closure>,
    args: Vec<Value>,
    boundary: bool,
) -> Result<(), RuntimeError> {
    let limits = &vm.config.limits;
    if vm.frames.len() >= limits.max_recursion_depth {
        return Err(RuntimeError::StackOverflow(format!(
            "maximum recursion depth {} exceeded",
            limits.max_recursion_depth
        )));
    }
    if vm.stack.len() >= limits.max_stack_size {
        return Err(RuntimeError::StackOverflow(format!(
            "value stack limit {} exceeded",
            limits.max_stack_size
        )));
    }
    let frame = Frame::new(closure, args, vm.stack.len(), boundary);
    vm.frames.push(frame);
    Ok(())
}

/// 尾调用：复用当前帧的位置、栈起点与边界标记
pub fn replace_frame(vm: &mut Vm, closure: Arc<Closure>, args: Vec<Value>) -> Result<(), RuntimeError> {
    let Some(current) = vm.frames.last_mut() else {
        return Err(RuntimeError::InvalidBytecode("tail call without a frame".to_string()));
    };
    let stack_base = current.stack_base;
    let boundary = current.boundary;
    *current = Frame::new(closure, args, stack_base, boundary);
    vm.stack.truncate(stack_base);
    Ok(())
}

/// 按 Code 的捕获表从当前帧拷贝绑定，构造闭包
pub fn make_closure(vm: &Vm, code: Arc<Code>) -> Result<Value, RuntimeError> {
    let frame = vm
        .frames
        .last()
        .ok_or_else(|| RuntimeError::InvalidBytecode("lambda without a frame".to_string()))?;
    let mut env = Env::new();
    for capture in &code.captures {
        let value = match capture.source {
            CaptureSource::Local(slot) => frame.locals.get(slot as usize).cloned(),
            CaptureSource::Enclosing => frame.env.get(&capture.name).cloned(),
        };
        let value = value.ok_or_else(|| {
            RuntimeError::InvalidBytecode(format!("capture '{}' has no source", capture.name))
        })?;
        env.define(capture.name.clone(), value);
    }
    Ok(Value::Closure(Arc::new(Closure::new(code, Arc::new(env)))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interner::Interner;

    fn closure(arity: usize) -> Arc<Closure> {
        let mut interner = Interner::new();
        let code = Code {
            params: (0..arity).map(|i| interner.intern(&format!("p{}", i))).collect(),
            local_count: arity,
            ..Code::default()
        };
        Arc::new(Closure::new(Arc::new(code), Arc::new(Env::new())))
    }

    #[test]
    fn test_fewer_args_makes_partial() {
        let mut vm = Vm::new();
        let t = apply(&mut vm, Value::Closure(closure(2)), vec![Value::Int(1)], false);
        match &t {
            Trampoline::Returned(Value::PartialApp(p)) => assert_eq!(p.arity(), 1),
            _ => panic!("expected partial application"),
        }
    }

    #[test]
    fn test_too_many_args() {
        let mut vm = Vm::new();
        let t = apply(
            &mut vm,
            Value::Closure(closure(1)),
            vec![Value::Int(1), Value::Int(2)],
            false,
        );
        assert!(matches!(
            t,
            Trampoline::Error(RuntimeError::ArityMismatch {
                expected: 1,
                given: 2,
                ..
            })
        ));
    }

    #[test]
    fn test_tail_flag_selects_trampoline() {
        let mut vm = Vm::new();
        assert!(matches!(
            apply(&mut vm, Value::Closure(closure(0)), vec![], true),
            Trampoline::TailCall(..)
        ));
        assert!(matches!(
            apply(&mut vm, Value::Closure(closure(0)), vec![], false),
            Trampoline::Call(..)
        ));
    }

    #[test]
    fn test_not_callable() {
        let mut vm = Vm::new();
        assert!(matches!(
            apply(&mut vm, Value::Int(3), vec![], false),
            Trampoline::Error(RuntimeError::NotCallable(_))
        ));
    }

    #[test]
    fn test_effect_type_raises() {
        let mut vm = Vm::new();
        let t = apply(&mut vm, Value::effect_type("Ask"), vec![Value::Int(1)], false);
        assert!(matches!(t, Trampoline::Effect(_, Value::Int(1))));
    }

    #[test]
    fn test_frame_binds_self_slot() {
        let mut interner = Interner::new();
        let f = interner.intern("f");
        let code = Code {
            params: vec![interner.intern("x")],
            self_name: Some(f),
            local_count: 2,
            ..Code::default()
        };
        let closure = Arc::new(Closure::new(Arc::new(code), Arc::new(Env::new())));
        let frame = Frame::new(closure.clone(), vec![Value::Int(7)], 0, false);
        assert_eq!(frame.locals[0], Value::Int(7));
        assert_eq!(frame.locals[1], Value::Closure(closure));
    }
}
