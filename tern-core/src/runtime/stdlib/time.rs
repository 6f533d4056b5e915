//! `time` 模块

use super::expect_int;
use crate::runtime::error::RuntimeError;
use crate::runtime::value::Value;
use crate::runtime::vm::Vm;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub fn members() -> Vec<(&'static str, Value)> {
    vec![
        ("now_ms", Value::native("now_ms", 0, now_ms_fn)),
        ("sleep", Value::native("sleep", 1, sleep_fn)),
    ]
}

fn now_ms_fn(_vm: &mut Vm, _args: &[Value]) -> Result<Value, RuntimeError> {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| RuntimeError::Other(format!("system clock before epoch: {}", e)))?;
    Ok(Value::Int(elapsed.as_millis() as i64))
}

/// 阻塞当前执行上下文所在线程
fn sleep_fn(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    let ms = expect_int("sleep", &args[0])?;
    let ms = u64::try_from(ms).map_err(|_| RuntimeError::type_error("sleep expects ms >= 0"))?;
    std::thread::sleep(Duration::from_millis(ms));
    Ok(Value::None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_and_sleep() {
        let mut vm = Vm::new();
        let before = now_ms_fn(&mut vm, &[]).unwrap().as_int().unwrap();
        sleep_fn(&mut vm, &[Value::Int(5)]).unwrap();
        let after = now_ms_fn(&mut vm, &[]).unwrap().as_int().unwrap();
        assert!(after >= before + 5);
        assert!(sleep_fn(&mut vm, &[Value::Int(-1)]).is_err());
    }
}
