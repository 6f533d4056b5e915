//! `math` 模块

use super::expect_number;
use crate::runtime::error::RuntimeError;
use crate::runtime::value::Value;
use crate::runtime::vm::Vm;

pub fn members() -> Vec<(&'static str, Value)> {
    vec![
        ("sqrt", Value::native("sqrt", 1, sqrt_fn)),
        ("abs", Value::native("abs", 1, abs_fn)),
        ("floor", Value::native("floor", 1, floor_fn)),
        ("ceil", Value::native("ceil", 1, ceil_fn)),
        ("pow", Value::native("pow", 2, pow_fn)),
        ("min", Value::native("min", 2, min_fn)),
        ("max", Value::native("max", 2, max_fn)),
        ("pi", Value::Float(std::f64::consts::PI)),
    ]
}

fn sqrt_fn(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::Float(expect_number("sqrt", &args[0])?.sqrt()))
}

fn abs_fn(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    match &args[0] {
        Value::Int(n) => Ok(Value::Int(n.wrapping_abs())),
        other => Ok(Value::Float(expect_number("abs", other)?.abs())),
    }
}

/// 取整结果为 Int
fn floor_fn(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    match &args[0] {
        Value::Int(n) => Ok(Value::Int(*n)),
        other => Ok(Value::Int(expect_number("floor", other)?.floor() as i64)),
    }
}

fn ceil_fn(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    match &args[0] {
        Value::Int(n) => Ok(Value::Int(*n)),
        other => Ok(Value::Int(expect_number("ceil", other)?.ceil() as i64)),
    }
}

/// 整数底数配非负整数指数时保持 Int
fn pow_fn(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    if let (Value::Int(base), Value::Int(exp)) = (&args[0], &args[1]) {
        if let Ok(exp) = u32::try_from(*exp) {
            return Ok(Value::Int(base.wrapping_pow(exp)));
        }
    }
    let base = expect_number("pow", &args[0])?;
    let exp = expect_number("pow", &args[1])?;
    Ok(Value::Float(base.powf(exp)))
}

fn min_fn(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    pick(&args[0], &args[1], "min", |a, b| a <= b)
}

fn max_fn(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    pick(&args[0], &args[1], "max", |a, b| a >= b)
}

fn pick(a: &Value, b: &Value, name: &str, keep_left: fn(f64, f64) -> bool) -> Result<Value, RuntimeError> {
    if let (Value::Int(x), Value::Int(y)) = (a, b) {
        let keep = keep_left(*x as f64, *y as f64);
        return Ok(Value::Int(if keep { *x } else { *y }));
    }
    let x = expect_number(name, a)?;
    let y = expect_number(name, b)?;
    Ok(if keep_left(x, y) { a.clone() } else { b.clone() })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: Vec<Value>) -> Value {
        let mut vm = Vm::new();
        let (_, f) = members().into_iter().find(|(n, _)| *n == name).unwrap();
        vm.call_value(f, args).unwrap()
    }

    #[test]
    fn test_sqrt() {
        assert_eq!(call("sqrt", vec![Value::Int(16)]), Value::Float(4.0));
    }

    #[test]
    fn test_floor_ceil_return_int() {
        assert_eq!(call("floor", vec![Value::Float(2.7)]), Value::Int(2));
        assert_eq!(call("ceil", vec![Value::Float(2.1)]), Value::Int(3));
        assert_eq!(call("floor", vec![Value::Float(-2.5)]), Value::Int(-3));
    }

    #[test]
    fn test_pow() {
        assert_eq!(call("pow", vec![Value::Int(2), Value::Int(10)]), Value::Int(1024));
        assert_eq!(call("pow", vec![Value::Int(2), Value::Int(-1)]), Value::Float(0.5));
    }

    #[test]
    fn test_abs_min_max() {
        assert_eq!(call("abs", vec![Value::Int(-3)]), Value::Int(3));
        assert_eq!(call("min", vec![Value::Int(3), Value::Int(-1)]), Value::Int(-1));
        assert_eq!(call("max", vec![Value::Int(1), Value::Float(2.5)]), Value::Float(2.5));
    }
}
