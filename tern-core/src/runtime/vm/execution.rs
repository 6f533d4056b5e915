//! run() 主执行循环

use super::call;
use super::stack;
use super::Vm;
use crate::runtime::bytecode::OpCode;
use crate::runtime::error::RuntimeError;
use crate::runtime::value::{Handler, Record, Value};
use std::sync::Arc;
#[cfg(feature = "trace_execution")]
use tern_config::targets;

/// 取出的一条指令
struct Fetched {
    op: OpCode,
    operand: usize,
    /// 指令起始位置（跳转偏移的基准）
    start: usize,
    line: usize,
}

fn fetch(vm: &mut Vm) -> Result<Fetched, RuntimeError> {
    let frame = vm
        .frames
        .last_mut()
        .ok_or_else(|| RuntimeError::InvalidBytecode("no active frame".to_string()))?;
    let code = &frame.code;
    let start = frame.ip;
    let byte = *code
        .instrs
        .get(start)
        .ok_or_else(|| RuntimeError::InvalidBytecode(format!("ip {} past end of code", start)))?;
    let op = OpCode::try_from(byte).map_err(|e| RuntimeError::InvalidBytecode(e.to_string()))?;
    let size = op.operand_size();
    if start + size >= code.instrs.len() && size > 0 {
        return Err(RuntimeError::InvalidBytecode(format!(
            "truncated {} at {}",
            op.name(),
            start
        )));
    }
    let operand = match size {
        0 => 0,
        1 => code.read_u8(start + 1) as usize,
        _ => code.read_u16(start + 1) as usize,
    };
    let line = code.lines.get(start).copied().unwrap_or(0);
    frame.ip = start + 1 + size;
    Ok(Fetched {
        op,
        operand,
        start,
        line,
    })
}

fn constant(vm: &Vm, idx: usize) -> Result<Value, RuntimeError> {
    vm.frames
        .last()
        .and_then(|f| f.code.consts.get(idx))
        .cloned()
        .ok_or_else(|| RuntimeError::InvalidBytecode(format!("constant {} out of range", idx)))
}

fn symbol_constant(vm: &Vm, idx: usize) -> Result<crate::interner::Symbol, RuntimeError> {
    match &constant(vm, idx)? {
        Value::Symbol(s) => Ok(s.clone()),
        other => Err(RuntimeError::InvalidBytecode(format!(
            "expected symbol constant, found {}",
            other.type_name()
        ))),
    }
}

fn frame_mut(vm: &mut Vm) -> Result<&mut call::Frame, RuntimeError> {
    vm.frames
        .last_mut()
        .ok_or_else(|| RuntimeError::InvalidBytecode("no active frame".to_string()))
}

/// 执行直到帧栈回落到 base_depth，返回那一帧的返回值
pub fn run(vm: &mut Vm, base_depth: usize) -> Result<Value, RuntimeError> {
    loop {
        let fetched = fetch(vm)?;
        let line = fetched.line;
        match step(vm, fetched, base_depth) {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => {}
            Err(e) => return Err(e.at_line(line)),
        }
    }
}

/// 执行一条指令；最外层帧返回时得到 Some
fn step(vm: &mut Vm, fetched: Fetched, base_depth: usize) -> Result<Option<Value>, RuntimeError> {
    let Fetched {
        op, operand, start, ..
    } = fetched;

    #[cfg(feature = "trace_execution")]
    tracing::trace!(
        target: targets::VM,
        ip = start,
        op = op.name(),
        operand,
        stack = vm.stack.len(),
        frames = vm.frames.len(),
        "execute"
    );

    match op {
        // ===== 控制 =====
        OpCode::Return => {
            let value = stack::pop(vm)?;
            let frame = vm
                .frames
                .pop()
                .ok_or_else(|| RuntimeError::InvalidBytecode("return without frame".to_string()))?;
            vm.stack.truncate(frame.stack_base);
            if frame.boundary {
                vm.uninstall_handler();
            }
            if vm.frames.len() <= base_depth {
                return Ok(Some(value));
            }
            stack::push(vm, value);
        }
        OpCode::Call | OpCode::TailCall => {
            let callee = stack::pop(vm)?;
            let args = stack::pop_n(vm, operand)?;
            let tail = op == OpCode::TailCall;
            let trampoline = call::apply(vm, callee, args, tail);
            vm.dispatch(trampoline, tail, base_depth)?;
        }
        OpCode::Jump => {
            frame_mut(vm)?.ip = start + operand;
        }
        OpCode::JumpIfFalse => {
            let cond = stack::pop(vm)?;
            if !cond.is_truthy() {
                frame_mut(vm)?.ip = start + operand;
            }
        }

        // ===== 常量与栈 =====
        OpCode::Constant | OpCode::ConstantWide => {
            let value = constant(vm, operand)?;
            stack::push(vm, value);
        }
        OpCode::PushNone => stack::push(vm, Value::None),
        OpCode::Pop => {
            stack::pop(vm)?;
        }

        // ===== 局部变量 =====
        OpCode::LoadLocal | OpCode::LoadLocalWide => {
            let value = frame_mut(vm)?
                .locals
                .get(operand)
                .cloned()
                .ok_or_else(|| RuntimeError::InvalidBytecode(format!("local slot {} out of range", operand)))?;
            stack::push(vm, value);
        }
        OpCode::StoreLocal | OpCode::StoreLocalWide => {
            let value = stack::pop(vm)?;
            let frame = frame_mut(vm)?;
            if operand >= frame.locals.len() {
                frame.locals.resize(operand + 1, Value::None);
            }
            frame.locals[operand] = value;
        }

        // ===== 捕获环境 =====
        OpCode::LoadDynamic | OpCode::LoadDynamicWide => {
            let name = symbol_constant(vm, operand)?;
            let value = frame_mut(vm)?
                .env
                .get(&name)
                .cloned()
                .ok_or_else(|| RuntimeError::UndefinedVariable(name.as_str().to_string()))?;
            stack::push(vm, value);
        }
        OpCode::StoreDynamic | OpCode::StoreDynamicWide => {
            let name = symbol_constant(vm, operand)?;
            let value = stack::pop(vm)?;
            let frame = frame_mut(vm)?;
            // 只改本帧的环境副本
            if !Arc::make_mut(&mut frame.env).set(&name, value) {
                return Err(RuntimeError::UndefinedVariable(name.as_str().to_string()));
            }
        }

        // ===== 全局变量 =====
        OpCode::LoadGlobal | OpCode::LoadGlobalWide => {
            let name = symbol_constant(vm, operand)?;
            let value = vm
                .global(&name)
                .ok_or_else(|| RuntimeError::UndefinedVariable(name.as_str().to_string()))?;
            stack::push(vm, value);
        }
        OpCode::StoreGlobal | OpCode::StoreGlobalWide => {
            let name = symbol_constant(vm, operand)?;
            let value = stack::pop(vm)?;
            vm.set_global(name, value);
        }

        // ===== 函数 =====
        OpCode::Lambda | OpCode::LambdaWide => {
            let code = match &constant(vm, operand)? {
                Value::Code(code) => code.clone(),
                other => {
                    return Err(RuntimeError::InvalidBytecode(format!(
                        "lambda operand is {}, not code",
                        other.type_name()
                    )))
                }
            };
            let closure = call::make_closure(vm, code)?;
            stack::push(vm, closure);
        }

        // ===== 数据构造 =====
        OpCode::BuildList => {
            let items = stack::pop_n(vm, operand)?;
            stack::push(vm, Value::list(items));
        }
        OpCode::BuildTuple => {
            let items = stack::pop_n(vm, operand)?;
            stack::push(vm, Value::tuple(items));
        }
        OpCode::BuildRecord => {
            let flat = stack::pop_n(vm, operand * 2)?;
            let mut fields = Vec::with_capacity(operand);
            let mut iter = flat.into_iter();
            while let (Some(key), Some(value)) = (iter.next(), iter.next()) {
                match &key {
                    Value::Symbol(name) => {
                        // 同名字段后写覆盖前写
                        match fields.iter_mut().find(|(k, _)| *k == *name) {
                            Some((_, slot)) => *slot = value,
                            None => fields.push((name.clone(), value)),
                        }
                    }
                    other => {
                        return Err(RuntimeError::InvalidBytecode(format!(
                            "record key is {}, not symbol",
                            other.type_name()
                        )))
                    }
                }
            }
            stack::push(vm, Value::Record(Arc::new(Record::new(fields))));
        }
        OpCode::GetField | OpCode::GetFieldWide => {
            let name = symbol_constant(vm, operand)?;
            let target = stack::pop(vm)?;
            let value = match &target {
                Value::Record(record) => record.get(&name).cloned().ok_or_else(|| {
                    RuntimeError::type_error(format!("record has no field '{}'", name))
                })?,
                other => {
                    return Err(RuntimeError::type_error(format!(
                        "cannot read field '{}' of {}",
                        name,
                        other.type_name()
                    )))
                }
            };
            stack::push(vm, value);
        }

        // ===== 效应 =====
        OpCode::MakeHandler => {
            let flat = stack::pop_n(vm, operand * 2)?;
            let mut clauses = Vec::with_capacity(operand);
            let mut iter = flat.into_iter();
            while let (Some(effect), Some(clause)) = (iter.next(), iter.next()) {
                match &effect {
                    Value::Type(ty) => clauses.push((ty.clone(), clause)),
                    other => {
                        return Err(RuntimeError::type_error(format!(
                            "handler clause expects an effect, got {}",
                            other.type_name()
                        )))
                    }
                }
            }
            stack::push(vm, Value::Handler(Arc::new(Handler { clauses })));
        }
        OpCode::Handle => {
            let thunk = stack::pop(vm)?;
            let handler = match &stack::pop(vm)? {
                Value::Handler(h) => h.clone(),
                other => {
                    return Err(RuntimeError::InvalidBytecode(format!(
                        "handle expects a handler, got {}",
                        other.type_name()
                    )))
                }
            };
            vm.install_handler(handler, thunk)?;
        }
    }
    Ok(None)
}
