//! 值栈操作

use super::Vm;
use crate::runtime::error::RuntimeError;
use crate::runtime::value::Value;

/// 压栈
#[inline]
pub fn push(vm: &mut Vm, value: Value) {
    vm.stack.push(value);
}

/// 弹栈；栈空说明字节码损坏
#[inline]
pub fn pop(vm: &mut Vm) -> Result<Value, RuntimeError> {
    vm.stack
        .pop()
        .ok_or_else(|| RuntimeError::InvalidBytecode("stack underflow".to_string()))
}

/// 按压栈顺序弹出 n 个值
pub fn pop_n(vm: &mut Vm, n: usize) -> Result<Vec<Value>, RuntimeError> {
    let len = vm.stack.len();
    if n > len {
        return Err(RuntimeError::InvalidBytecode(format!(
            "stack underflow: need {} values, have {}",
            n, len
        )));
    }
    Ok(vm.stack.split_off(len - n))
}

/// 查看栈顶元素 (distance=0 是栈顶)
pub fn peek(vm: &Vm, distance: usize) -> Option<&Value> {
    let len = vm.stack.len();
    if distance >= len {
        return None;
    }
    vm.stack.get(len - 1 - distance)
}
