//! spawn / join
//!
//! `spawn(f)` 在新线程上以 fork 出的执行上下文运行 `f()`，返回任务 id。
//! `join(id)` 阻塞到任务结束，取回结果或重新抛出它的错误。

use super::expect_int;
use crate::runtime::error::RuntimeError;
use crate::runtime::value::Value;
use crate::runtime::vm::Vm;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use std::thread::{self, JoinHandle};
use tern_config::targets;
use tracing::debug;

type TaskHandle = JoinHandle<Result<Value, RuntimeError>>;

/// 同一棵 fork 树里共享的任务表
#[derive(Debug, Default)]
pub struct TaskRegistry {
    next_id: AtomicI64,
    handles: Mutex<HashMap<i64, TaskHandle>>,
}

impl TaskRegistry {
    fn insert(&self, handle: TaskHandle) -> i64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let mut handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
        handles.insert(id, handle);
        id
    }

    fn take(&self, id: i64) -> Option<TaskHandle> {
        let mut handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
        handles.remove(&id)
    }

    /// 尚未 join 的任务数
    pub fn pending(&self) -> usize {
        self.handles.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

pub(crate) fn spawn_fn(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    let callee = args[0].clone();
    if callee.arity().is_none() {
        return Err(RuntimeError::NotCallable(format!(
            "spawn expects a function, got {}",
            callee.type_name()
        )));
    }
    let mut child = vm.fork();
    let handle = thread::Builder::new()
        .name("tern-task".into())
        .spawn(move || child.call_value(callee, Vec::new()))
        .map_err(|e| RuntimeError::TaskFailed(format!("failed to start thread: {}", e)))?;
    let id = vm.tasks.insert(handle);
    debug!(target: targets::STDLIB, id, "task spawned");
    Ok(Value::Int(id))
}

pub(crate) fn join_fn(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    let id = expect_int("join", &args[0])?;
    let handle = vm
        .tasks
        .take(id)
        .ok_or_else(|| RuntimeError::TaskFailed(format!("unknown task {}", id)))?;
    debug!(target: targets::STDLIB, id, "joining task");
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(RuntimeError::TaskFailed(format!("task {} panicked", id))),
    }
}
