//! 运算符与整数算术原生函数
//!
//! 解析器把 `a + b` 变成对全局 `+` 的调用。运算符做 Int→Float 提升，
//! `add`/`sub`/`mul`/`div`/`mod` 只接受 Int。整数运算按补码回绕。

use super::expect_int;
use crate::runtime::error::RuntimeError;
use crate::runtime::value::Value;
use crate::runtime::vm::Vm;
use std::cmp::Ordering;

pub fn install(vm: &mut Vm) {
    // ===== 整数算术 =====
    vm.register_native("add", 2, add_fn);
    vm.register_native("sub", 2, sub_fn);
    vm.register_native("mul", 2, mul_fn);
    vm.register_native("div", 2, div_fn);
    vm.register_native("mod", 2, mod_fn);

    // ===== 运算符 =====
    vm.register_native("+", 2, plus_fn);
    vm.register_native("-", 2, minus_fn);
    vm.register_native("*", 2, star_fn);
    vm.register_native("/", 2, slash_fn);
    vm.register_native("%", 2, percent_fn);
    vm.register_native("==", 2, eq_fn);
    vm.register_native("!=", 2, ne_fn);
    vm.register_native("<", 2, lt_fn);
    vm.register_native("<=", 2, le_fn);
    vm.register_native(">", 2, gt_fn);
    vm.register_native(">=", 2, ge_fn);
    vm.register_native("neg", 1, neg_fn);
    vm.register_native("not", 1, not_fn);
}

#[derive(Clone, Copy)]
enum Arith {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl Arith {
    fn symbol(self) -> &'static str {
        match self {
            Arith::Add => "+",
            Arith::Sub => "-",
            Arith::Mul => "*",
            Arith::Div => "/",
            Arith::Rem => "%",
        }
    }

    fn ints(self, a: i64, b: i64) -> Result<i64, RuntimeError> {
        match self {
            Arith::Add => Ok(a.wrapping_add(b)),
            Arith::Sub => Ok(a.wrapping_sub(b)),
            Arith::Mul => Ok(a.wrapping_mul(b)),
            Arith::Div if b == 0 => Err(RuntimeError::DivisionByZero),
            Arith::Div => Ok(a.wrapping_div(b)),
            Arith::Rem if b == 0 => Err(RuntimeError::DivisionByZero),
            Arith::Rem => Ok(a.wrapping_rem(b)),
        }
    }

    fn floats(self, a: f64, b: f64) -> f64 {
        match self {
            Arith::Add => a + b,
            Arith::Sub => a - b,
            Arith::Mul => a * b,
            Arith::Div => a / b,
            Arith::Rem => a % b,
        }
    }
}

/// 数值运算：两边都是 Int 时按整数算，否则提升为 Float
fn numeric(op: Arith, a: &Value, b: &Value) -> Result<Value, RuntimeError> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => op.ints(*x, *y).map(Value::Int),
        (Value::Int(x), Value::Float(y)) => Ok(Value::Float(op.floats(*x as f64, *y))),
        (Value::Float(x), Value::Int(y)) => Ok(Value::Float(op.floats(*x, *y as f64))),
        (Value::Float(x), Value::Float(y)) => Ok(Value::Float(op.floats(*x, *y))),
        _ => Err(RuntimeError::type_error(format!(
            "unsupported operand types for {}: {} and {}",
            op.symbol(),
            a.type_name(),
            b.type_name()
        ))),
    }
}

fn int_only(name: &str, op: Arith, args: &[Value]) -> Result<Value, RuntimeError> {
    let a = expect_int(name, &args[0])?;
    let b = expect_int(name, &args[1])?;
    op.ints(a, b).map(Value::Int)
}

fn add_fn(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    int_only("add", Arith::Add, args)
}

fn sub_fn(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    int_only("sub", Arith::Sub, args)
}

fn mul_fn(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    int_only("mul", Arith::Mul, args)
}

fn div_fn(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    int_only("div", Arith::Div, args)
}

fn mod_fn(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    int_only("mod", Arith::Rem, args)
}

/// `+` 还负责字符串与列表拼接
fn plus_fn(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    match (&args[0], &args[1]) {
        (Value::String(a), Value::String(b)) => {
            let mut s = String::with_capacity(a.len() + b.len());
            s.push_str(a);
            s.push_str(b);
            Ok(Value::from(s))
        }
        (Value::List(a), Value::List(b)) => {
            let mut items = Vec::with_capacity(a.len() + b.len());
            items.extend(a.iter().cloned());
            items.extend(b.iter().cloned());
            Ok(Value::list(items))
        }
        (a, b) => numeric(Arith::Add, a, b),
    }
}

fn minus_fn(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    numeric(Arith::Sub, &args[0], &args[1])
}

fn star_fn(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    numeric(Arith::Mul, &args[0], &args[1])
}

fn slash_fn(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    numeric(Arith::Div, &args[0], &args[1])
}

fn percent_fn(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    numeric(Arith::Rem, &args[0], &args[1])
}

// ==================== 比较 ====================

/// 相等：数值跨 Int/Float 比较，其余按值模型的相等性
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int(x), Value::Float(y)) | (Value::Float(y), Value::Int(x)) => (*x as f64) == *y,
        _ => a == b,
    }
}

/// 比较（仅数值与字符串）
pub fn compare_values(a: &Value, b: &Value) -> Result<Ordering, RuntimeError> {
    let ordering = match (a, b) {
        (Value::Int(x), Value::Int(y)) => Some(x.cmp(y)),
        (Value::Int(x), Value::Float(y)) => (*x as f64).partial_cmp(y),
        (Value::Float(x), Value::Int(y)) => x.partial_cmp(&(*y as f64)),
        (Value::Float(x), Value::Float(y)) => x.partial_cmp(y),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => {
            return Err(RuntimeError::type_error(format!(
                "cannot compare {} with {}",
                a.type_name(),
                b.type_name()
            )))
        }
    };
    ordering.ok_or_else(|| RuntimeError::type_error("cannot compare NaN"))
}

fn eq_fn(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::Bool(values_equal(&args[0], &args[1])))
}

fn ne_fn(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::Bool(!values_equal(&args[0], &args[1])))
}

fn lt_fn(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::Bool(compare_values(&args[0], &args[1])? == Ordering::Less))
}

fn le_fn(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::Bool(compare_values(&args[0], &args[1])? != Ordering::Greater))
}

fn gt_fn(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::Bool(compare_values(&args[0], &args[1])? == Ordering::Greater))
}

fn ge_fn(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::Bool(compare_values(&args[0], &args[1])? != Ordering::Less))
}

fn neg_fn(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    match &args[0] {
        Value::Int(n) => Ok(Value::Int(n.wrapping_neg())),
        Value::Float(n) => Ok(Value::Float(-n)),
        other => Err(RuntimeError::type_error(format!(
            "cannot negate {}",
            other.type_name()
        ))),
    }
}

fn not_fn(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::Bool(!args[0].is_truthy()))
}
