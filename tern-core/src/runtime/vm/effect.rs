//! 代数效应：handler 栈、续体捕获与恢复
//!
//! `Handle` 在值栈上压一个 Label 作为分界，再以边界帧调用被处理的
//! thunk。抛出效应时，从最内层开始找能处理它的 handler，把分界以上的
//! 帧、值栈片段与 handler 记录整体拷贝进续体，然后回退到安装点调用子句。
//!
//! 续体里的位置都相对分界保存，恢复时重新定位到当前栈顶。每次恢复都
//! 拷贝一份快照，所以同一个续体可以恢复多次。

use super::call::{self, Frame, Trampoline};
use super::Vm;
use crate::runtime::error::RuntimeError;
use crate::runtime::value::{EffectType, Handler, Value};
use std::sync::Arc;
use tern_config::targets;
use tracing::trace;

/// 一个已安装的 handler
#[derive(Debug, Clone)]
pub struct HandlerEntry {
    pub handler: Arc<Handler>,
    /// 边界帧在帧栈上的下标
    pub frame_depth: usize,
    /// Label 在值栈上的下标
    pub stack_height: usize,
    pub label: u64,
}

/// 被挂起的一段执行
pub struct Continuation {
    /// stack_base 相对 Label 位置
    frames: Vec<Frame>,
    /// Label 之上的值
    stack: Vec<Value>,
    /// frame_depth 相对边界帧，stack_height 相对 Label 位置
    handlers: Vec<HandlerEntry>,
}

impl Continuation {
    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

impl Vm {
    fn next_label(&mut self) -> u64 {
        self.next_label += 1;
        self.next_label
    }

    /// 执行 `Handle`：安装 handler 并以边界帧调用 thunk
    pub(crate) fn install_handler(&mut self, handler: Arc<Handler>, thunk: Value) -> Result<(), RuntimeError> {
        let closure = match &thunk {
            Value::Closure(c) if c.arity() == 0 => c.clone(),
            other => {
                return Err(RuntimeError::type_error(format!(
                    "handled body must be a zero-argument function, got {}",
                    other.type_name()
                )))
            }
        };
        let label = self.next_label();
        let stack_height = self.stack.len();
        self.stack.push(Value::Label(label));
        self.handlers.push(HandlerEntry {
            handler,
            frame_depth: self.frames.len(),
            stack_height,
            label,
        });
        trace!(target: targets::VM, label, depth = self.frames.len(), "install handler");
        call::push_frame(self, closure, Vec::new(), true)
    }

    /// 边界帧返回后移除它的 Label 与 handler 记录
    pub(crate) fn uninstall_handler(&mut self) {
        let depth = self.frames.len();
        if self.handlers.last().map(|h| h.frame_depth) == Some(depth) {
            if let Some(entry) = self.handlers.pop() {
                if entry.stack_height < self.stack.len() {
                    self.stack.truncate(entry.stack_height);
                }
            }
        }
    }

    /// 抛出效应：捕获续体，回退到安装点，调用子句
    pub(crate) fn raise_effect(
        &mut self,
        effect: Arc<EffectType>,
        payload: Value,
        base_depth: usize,
    ) -> Result<(), RuntimeError> {
        let found = self.handlers.iter().enumerate().rev().find_map(|(j, entry)| {
            if entry.frame_depth < base_depth {
                return None;
            }
            entry.handler.find(&effect).map(|clause| (j, clause.clone()))
        });
        let Some((j, clause)) = found else {
            return Err(RuntimeError::UnhandledEffect(effect.name.clone()));
        };

        let install_depth = self.handlers[j].frame_depth;
        let label_pos = self.handlers[j].stack_height;

        let mut frames = self.frames.split_off(install_depth);
        let stack = self.stack.split_off(label_pos + 1);
        let mut handlers = self.handlers.split_off(j);
        self.stack.truncate(label_pos);

        for frame in &mut frames {
            frame.stack_base -= label_pos;
        }
        for entry in &mut handlers {
            entry.frame_depth -= install_depth;
            entry.stack_height -= label_pos;
        }

        trace!(
            target: targets::VM,
            effect = %effect.name,
            frames = frames.len(),
            values = stack.len(),
            "capture continuation"
        );

        let k = Value::Continuation(Arc::new(Continuation {
            frames,
            stack,
            handlers,
        }));
        let args = if clause.arity() == Some(1) {
            vec![payload]
        } else {
            vec![payload, k]
        };
        let trampoline = call::apply(self, clause, args, false);
        self.dispatch(trampoline, false, base_depth)
    }

    /// 把续体的快照接回当前栈顶，并把 value 作为抛出点那次调用的结果
    pub(crate) fn restore_continuation(
        &mut self,
        k: &Continuation,
        value: Value,
    ) -> Result<(), RuntimeError> {
        if self.frames.len() + k.frames.len() > self.config.limits.max_recursion_depth {
            return Err(RuntimeError::StackOverflow(format!(
                "maximum recursion depth {} exceeded",
                self.config.limits.max_recursion_depth
            )));
        }
        let label = self.next_label();
        let label_pos = self.stack.len();
        let frame_base = self.frames.len();

        self.stack.push(Value::Label(label));
        self.stack.extend(k.stack.iter().cloned());
        self.frames.extend(k.frames.iter().cloned().map(|mut frame| {
            frame.stack_base += label_pos;
            frame
        }));
        for (i, entry) in k.handlers.iter().enumerate() {
            let mut entry = entry.clone();
            entry.frame_depth += frame_base;
            entry.stack_height += label_pos;
            if i == 0 {
                entry.label = label;
            }
            self.handlers.push(entry);
        }
        trace!(target: targets::VM, label, frames = k.frames.len(), "restore continuation");
        self.stack.push(value);
        Ok(())
    }

    /// 处理一次 trampoline；tail 表示它来自尾位置
    pub(crate) fn dispatch(
        &mut self,
        trampoline: Trampoline,
        tail: bool,
        base_depth: usize,
    ) -> Result<(), RuntimeError> {
        match trampoline {
            Trampoline::Returned(value) => {
                self.stack.push(value);
                Ok(())
            }
            Trampoline::Call(closure, args) => call::push_frame(self, closure, args, false),
            Trampoline::TailCall(closure, args) => call::replace_frame(self, closure, args),
            Trampoline::Effect(effect, payload) => self.raise_effect(effect, payload, base_depth),
            Trampoline::RestoreContinuation(k, value) => {
                // 尾位置恢复：当前帧不再需要（边界帧除外，它还要负责拆除 handler）
                let droppable = self
                    .frames
                    .last()
                    .map(|f| !f.boundary && self.frames.len() > base_depth + 1)
                    .unwrap_or(false);
                if tail && droppable {
                    if let Some(frame) = self.frames.pop() {
                        self.stack.truncate(frame.stack_base);
                    }
                }
                self.restore_continuation(&k, value)
            }
            Trampoline::Error(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::value::{Closure, Env};
    use crate::runtime::bytecode::code::Code;

    fn thunk() -> Value {
        Value::Closure(Arc::new(Closure::new(
            Arc::new(Code::default()),
            Arc::new(Env::new()),
        )))
    }

    #[test]
    fn test_install_pushes_label_and_boundary_frame() {
        let mut vm = Vm::new();
        vm.install_handler(Arc::new(Handler::default()), thunk()).unwrap();
        assert!(matches!(vm.stack.last(), Some(Value::Label(_))));
        assert_eq!(vm.handlers.len(), 1);
        assert_eq!(vm.handlers[0].frame_depth, 0);
        assert!(vm.frames[0].boundary);
    }

    #[test]
    fn test_install_rejects_non_thunk() {
        let mut vm = Vm::new();
        let err = vm
            .install_handler(Arc::new(Handler::default()), Value::Int(1))
            .unwrap_err();
        assert!(matches!(err, RuntimeError::TypeError(_)));
    }

    #[test]
    fn test_unhandled_effect() {
        let mut vm = Vm::new();
        let effect = Arc::new(EffectType { name: "Ask".into() });
        let err = vm.raise_effect(effect, Value::None, 0).unwrap_err();
        assert_eq!(err, RuntimeError::UnhandledEffect("Ask".into()));
    }

    #[test]
    fn test_restore_rebases_snapshot() {
        let mut vm = Vm::new();
        vm.stack.push(Value::Int(9));
        let mut frame = Frame::new(
            match &thunk() {
                Value::Closure(c) => c.clone(),
                _ => unreachable!(),
            },
            vec![],
            1,
            true,
        );
        frame.ip = 3;
        let k = Continuation {
            frames: vec![frame],
            stack: vec![Value::Int(5)],
            handlers: vec![HandlerEntry {
                handler: Arc::new(Handler::default()),
                frame_depth: 0,
                stack_height: 0,
                label: 1,
            }],
        };
        vm.restore_continuation(&k, Value::Int(42)).unwrap();
        // [9, label, 5, 42]
        assert_eq!(vm.stack.len(), 4);
        assert!(matches!(vm.stack[1], Value::Label(_)));
        assert_eq!(vm.frames[0].stack_base, 2);
        assert_eq!(vm.handlers[0].stack_height, 1);
        assert_eq!(vm.stack[3], Value::Int(42));
        // 可以再恢复一次
        vm.restore_continuation(&k, Value::Int(43)).unwrap();
        assert_eq!(vm.frames.len(), 2);
        assert_eq!(k.depth(), 1);
    }
}
