//! `string` 模块

use super::expect_str;
use crate::runtime::error::RuntimeError;
use crate::runtime::value::Value;
use crate::runtime::vm::Vm;

pub fn members() -> Vec<(&'static str, Value)> {
    vec![
        ("concat", Value::native("concat", 2, concat_fn)),
        ("upper", Value::native("upper", 1, upper_fn)),
        ("lower", Value::native("lower", 1, lower_fn)),
        ("trim", Value::native("trim", 1, trim_fn)),
        ("split", Value::native("split", 2, split_fn)),
        ("contains", Value::native("contains", 2, contains_fn)),
    ]
}

fn upper_fn(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::from(expect_str("upper", &args[0])?.to_uppercase()))
}

fn lower_fn(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::from(expect_str("lower", &args[0])?.to_lowercase()))
}

fn trim_fn(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::from(expect_str("trim", &args[0])?.trim()))
}

fn split_fn(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    let s = expect_str("split", &args[0])?;
    let sep = expect_str("split", &args[1])?;
    if sep.is_empty() {
        return Err(RuntimeError::type_error("split separator must not be empty"));
    }
    Ok(Value::list(s.split(sep).map(Value::from).collect()))
}

fn contains_fn(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    let s = expect_str("contains", &args[0])?;
    let needle = expect_str("contains", &args[1])?;
    Ok(Value::Bool(s.contains(needle)))
}

/// 非字符串参数先按 `str` 渲染
fn concat_fn(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::from(format!("{}{}", args[0], args[1])))
}
