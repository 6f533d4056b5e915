//! 标准库实现
//!
//! 全部是定长原生函数，VM 创建时注册为全局；`math`、`string`、`time`
//! 以模块（全局 Record）的形式注入。运算符本身也是以运算符命名的全局
//! 原生函数。

pub mod math;
pub mod operators;
pub mod prelude;
pub mod string;
pub mod task;
pub mod time;

use crate::runtime::error::RuntimeError;
use crate::runtime::value::Value;
use crate::runtime::vm::Vm;
use tern_config::targets;
use tracing::debug;

/// 注册全部原生函数与模块
pub fn install(vm: &mut Vm) {
    operators::install(vm);

    // ===== 数据 =====
    vm.register_native("len", 1, len_fn);
    vm.register_native("get", 2, get_fn);
    vm.register_native("push", 2, push_fn);
    vm.register_native("head", 1, head_fn);
    vm.register_native("tail", 1, tail_fn);
    vm.register_native("range", 2, range_fn);
    vm.register_native("record_get", 2, record_get_fn);
    vm.register_native("str", 1, str_fn);
    vm.register_native("type_of", 1, type_of_fn);

    // ===== Cell =====
    vm.register_native("cell", 1, cell_fn);
    vm.register_native("cell_get", 1, cell_get_fn);
    vm.register_native("cell_set", 2, cell_set_fn);

    // ===== 效应与控制 =====
    vm.register_native("new_effect", 1, new_effect_fn);
    vm.register_native("panic", 1, panic_fn);
    vm.register_native("print", 1, print_fn);

    // ===== 并发 =====
    vm.register_native("spawn", 1, task::spawn_fn);
    vm.register_native("join", 1, task::join_fn);

    // ===== 模块 =====
    vm.register_module("math", math::members());
    vm.register_module("string", string::members());
    vm.register_module("time", time::members());

    debug!(target: targets::STDLIB, "standard library installed");
}

// ==================== 参数工具 ====================

pub(crate) fn expect_int(name: &str, value: &Value) -> Result<i64, RuntimeError> {
    value.as_int().ok_or_else(|| {
        RuntimeError::type_error(format!("{} expects int, got {}", name, value.type_name()))
    })
}

pub(crate) fn expect_str<'a>(name: &str, value: &'a Value) -> Result<&'a str, RuntimeError> {
    value.as_str().ok_or_else(|| {
        RuntimeError::type_error(format!("{} expects string, got {}", name, value.type_name()))
    })
}

pub(crate) fn expect_number(name: &str, value: &Value) -> Result<f64, RuntimeError> {
    match value {
        Value::Int(n) => Ok(*n as f64),
        Value::Float(n) => Ok(*n),
        other => Err(RuntimeError::type_error(format!(
            "{} expects number, got {}",
            name,
            other.type_name()
        ))),
    }
}

fn expect_list<'a>(name: &str, value: &'a Value) -> Result<&'a [Value], RuntimeError> {
    value.as_seq().ok_or_else(|| {
        RuntimeError::type_error(format!("{} expects list, got {}", name, value.type_name()))
    })
}

/// 负数或越界下标
fn checked_index(index: i64, len: usize) -> Result<usize, RuntimeError> {
    usize::try_from(index)
        .ok()
        .filter(|i| *i < len)
        .ok_or(RuntimeError::IndexOutOfBounds { index, len })
}

// ==================== 数据 ====================

fn len_fn(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    let n = match &args[0] {
        Value::String(s) => s.chars().count(),
        Value::List(items) | Value::Tuple(items) => items.len(),
        Value::Record(record) => record.fields.len(),
        other => {
            return Err(RuntimeError::type_error(format!(
                "len expects a string, list, tuple or record, got {}",
                other.type_name()
            )))
        }
    };
    Ok(Value::Int(n as i64))
}

fn get_fn(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    let index = expect_int("get", &args[1])?;
    match &args[0] {
        Value::List(items) | Value::Tuple(items) => {
            let i = checked_index(index, items.len())?;
            Ok(items[i].clone())
        }
        Value::String(s) => {
            let len = s.chars().count();
            let i = checked_index(index, len)?;
            Ok(s.chars().nth(i).map(|c| Value::from(c.to_string())).unwrap_or(Value::None))
        }
        other => Err(RuntimeError::type_error(format!(
            "cannot index {}",
            other.type_name()
        ))),
    }
}

fn push_fn(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    let items = expect_list("push", &args[0])?;
    let mut out = Vec::with_capacity(items.len() + 1);
    out.extend_from_slice(items);
    out.push(args[1].clone());
    Ok(Value::list(out))
}

fn head_fn(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    let items = expect_list("head", &args[0])?;
    items
        .first()
        .cloned()
        .ok_or(RuntimeError::IndexOutOfBounds { index: 0, len: 0 })
}

fn tail_fn(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    let items = expect_list("tail", &args[0])?;
    if items.is_empty() {
        return Err(RuntimeError::IndexOutOfBounds { index: 1, len: 0 });
    }
    Ok(Value::list(items[1..].to_vec()))
}

/// 半开区间 [from, to)
fn range_fn(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    let from = expect_int("range", &args[0])?;
    let to = expect_int("range", &args[1])?;
    Ok(Value::list((from..to).map(Value::Int).collect()))
}

fn record_get_fn(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    let name = expect_str("record_get", &args[1])?;
    match &args[0] {
        Value::Record(record) => record
            .get_by_name(name)
            .cloned()
            .ok_or_else(|| RuntimeError::type_error(format!("record has no field '{}'", name))),
        other => Err(RuntimeError::type_error(format!(
            "record_get expects record, got {}",
            other.type_name()
        ))),
    }
}

fn str_fn(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::from(args[0].to_string()))
}

fn type_of_fn(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::from(args[0].type_name()))
}

// ==================== Cell ====================

fn cell_fn(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::cell(args[0].clone()))
}

fn cell_get_fn(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    match &args[0] {
        Value::Cell(cell) => Ok(cell.get()),
        other => Err(RuntimeError::type_error(format!(
            "cell_get expects cell, got {}",
            other.type_name()
        ))),
    }
}

fn cell_set_fn(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    match &args[0] {
        Value::Cell(cell) => {
            cell.set(args[1].clone());
            Ok(Value::None)
        }
        other => Err(RuntimeError::type_error(format!(
            "cell_set expects cell, got {}",
            other.type_name()
        ))),
    }
}

// ==================== 效应与控制 ====================

fn new_effect_fn(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    let name = expect_str("new_effect", &args[0])?;
    Ok(Value::effect_type(name))
}

fn panic_fn(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    Err(RuntimeError::Panic(args[0].to_string()))
}

fn print_fn(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    println!("{}", args[0]);
    Ok(Value::None)
}
