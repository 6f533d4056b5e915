//! 变量解析和管理
//!
//! 每个正在编译的函数一个 `FunctionScope`，按嵌套顺序放在栈上。
//! 名字先在当前函数的局部里找，再到外层函数找；外层命中时沿途
//! 每一层都登记一次捕获，闭包创建时按登记拷贝绑定。

use super::error::CompileError;
use crate::interner::Symbol;
use crate::runtime::bytecode::code::{Capture, CaptureSource};

/// 局部槽位上限（2 字节操作数）
pub const MAX_LOCALS: usize = 1 << 16;

/// 局部变量信息
#[derive(Debug, Clone)]
pub struct Local {
    pub name: Symbol,
    pub depth: usize,
}

/// 变量解析结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variable {
    /// 当前帧的局部槽位
    Local(usize),
    /// 闭包捕获环境中的名字
    Outer,
    /// 全局表
    Global,
}

#[derive(Debug, Default)]
struct FunctionScope {
    locals: Vec<Local>,
    scope_depth: usize,
    max_locals: usize,
    captures: Vec<Capture>,
}

impl FunctionScope {
    fn resolve_local(&self, name: &Symbol) -> Option<usize> {
        self.locals.iter().rposition(|local| &local.name == name)
    }

    /// 登记捕获，同名只登记一次
    fn add_capture(&mut self, name: &Symbol, source: CaptureSource) {
        if self.captures.iter().any(|c| &c.name == name) {
            return;
        }
        self.captures.push(Capture {
            name: name.clone(),
            source,
        });
    }
}

/// 函数作用域栈
#[derive(Debug)]
pub struct ScopeResolver {
    functions: Vec<FunctionScope>,
}

impl Default for ScopeResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeResolver {
    /// 以顶层单元作为最外层函数
    pub fn new() -> Self {
        Self {
            functions: vec![FunctionScope::default()],
        }
    }

    fn current(&self) -> &FunctionScope {
        // 栈底的顶层单元永远存在
        &self.functions[self.functions.len() - 1]
    }

    fn current_mut(&mut self) -> &mut FunctionScope {
        let last = self.functions.len() - 1;
        &mut self.functions[last]
    }

    /// 当前作用域深度，0 表示顶层
    pub fn depth(&self) -> usize {
        self.current().scope_depth
    }

    /// 是否处在顶层单元的最外层（声明即全局）
    pub fn is_global_scope(&self) -> bool {
        self.functions.len() == 1 && self.current().scope_depth == 0
    }

    /// 进入新作用域
    pub fn begin_scope(&mut self) {
        self.current_mut().scope_depth += 1;
    }

    /// 退出作用域，返回弹出的变量数量；空出的槽位之后可复用
    pub fn end_scope(&mut self) -> usize {
        let scope = self.current_mut();
        scope.scope_depth = scope.scope_depth.saturating_sub(1);
        let mut popped = 0;
        while let Some(local) = scope.locals.last() {
            if local.depth <= scope.scope_depth {
                break;
            }
            scope.locals.pop();
            popped += 1;
        }
        popped
    }

    /// 开始编译一个函数体；参数与函数体位于深度 1
    pub fn begin_function(&mut self) {
        self.functions.push(FunctionScope {
            scope_depth: 1,
            ..FunctionScope::default()
        });
    }

    /// 结束函数体，返回 (局部槽位总数, 捕获表)
    pub fn end_function(&mut self) -> (usize, Vec<Capture>) {
        if self.functions.len() == 1 {
            return (self.current().max_locals, Vec::new());
        }
        match self.functions.pop() {
            Some(scope) => (scope.max_locals, scope.captures),
            None => (0, Vec::new()),
        }
    }

    /// 顶层单元用到的槽位数
    pub fn max_locals(&self) -> usize {
        self.current().max_locals
    }

    /// 添加局部变量，返回其槽位
    pub fn declare(&mut self, name: Symbol, line: usize) -> Result<usize, CompileError> {
        let scope = self.current_mut();
        if scope.locals.len() >= MAX_LOCALS {
            return Err(CompileError::TooManyLocals { line });
        }

        // 检查同作用域内是否已有同名变量
        for local in scope.locals.iter().rev() {
            if local.depth < scope.scope_depth {
                break;
            }
            if local.name == name {
                return Err(CompileError::VariableAlreadyExists {
                    name: name.as_str().to_string(),
                    line,
                });
            }
        }

        let depth = scope.scope_depth;
        scope.locals.push(Local { name, depth });
        scope.max_locals = scope.max_locals.max(scope.locals.len());
        Ok(scope.locals.len() - 1)
    }

    /// 解析名字：当前帧局部 > 外层函数（捕获）> 全局
    pub fn resolve(&mut self, name: &Symbol) -> Variable {
        let current = self.functions.len() - 1;
        if let Some(slot) = self.functions[current].resolve_local(name) {
            return Variable::Local(slot);
        }

        // 从内向外找到定义它的函数
        let found = (0..current)
            .rev()
            .find_map(|k| self.functions[k].resolve_local(name).map(|slot| (k, slot)));
        let Some((owner, slot)) = found else {
            return Variable::Global;
        };

        // 直接内层从定义处帧的槽位拷贝，再往内的层从各自的捕获环境转拷
        self.functions[owner + 1].add_capture(name, CaptureSource::Local(slot as u16));
        for scope in &mut self.functions[owner + 2..=current] {
            scope.add_capture(name, CaptureSource::Enclosing);
        }
        Variable::Outer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interner::Interner;

    #[test]
    fn test_top_level_is_global_scope() {
        let mut resolver = ScopeResolver::new();
        assert!(resolver.is_global_scope());
        resolver.begin_scope();
        assert!(!resolver.is_global_scope());
        resolver.end_scope();
        assert!(resolver.is_global_scope());
    }

    #[test]
    fn test_declare_and_resolve_local() {
        let mut interner = Interner::new();
        let x = interner.intern("x");
        let y = interner.intern("y");
        let mut resolver = ScopeResolver::new();
        resolver.begin_scope();
        assert_eq!(resolver.declare(x.clone(), 1).unwrap(), 0);
        assert_eq!(resolver.resolve(&x), Variable::Local(0));
        assert_eq!(resolver.resolve(&y), Variable::Global);
    }

    #[test]
    fn test_duplicate_in_same_scope() {
        let mut interner = Interner::new();
        let x = interner.intern("x");
        let mut resolver = ScopeResolver::new();
        resolver.begin_scope();
        resolver.declare(x.clone(), 1).unwrap();
        assert!(matches!(
            resolver.declare(x.clone(), 2),
            Err(CompileError::VariableAlreadyExists { line: 2, .. })
        ));
        // 内层作用域可以遮蔽
        resolver.begin_scope();
        assert_eq!(resolver.declare(x.clone(), 3).unwrap(), 1);
        assert_eq!(resolver.resolve(&x), Variable::Local(1));
    }

    #[test]
    fn test_slots_reused_after_scope() {
        let mut interner = Interner::new();
        let a = interner.intern("a");
        let b = interner.intern("b");
        let mut resolver = ScopeResolver::new();
        resolver.begin_scope();
        resolver.declare(a, 1).unwrap();
        assert_eq!(resolver.end_scope(), 1);
        resolver.begin_scope();
        assert_eq!(resolver.declare(b, 1).unwrap(), 0);
        assert_eq!(resolver.max_locals(), 1);
    }

    #[test]
    fn test_capture_through_two_levels() {
        let mut interner = Interner::new();
        let x = interner.intern("x");
        let mut resolver = ScopeResolver::new();
        resolver.begin_scope();
        resolver.declare(x.clone(), 1).unwrap();

        resolver.begin_function(); // 中间层
        resolver.begin_function(); // 最内层
        assert_eq!(resolver.resolve(&x), Variable::Outer);
        let (_, inner) = resolver.end_function();
        let (_, middle) = resolver.end_function();

        assert_eq!(inner[0].source, CaptureSource::Enclosing);
        assert_eq!(middle[0].source, CaptureSource::Local(0));
    }

    #[test]
    fn test_capture_registered_once() {
        let mut interner = Interner::new();
        let x = interner.intern("x");
        let mut resolver = ScopeResolver::new();
        resolver.begin_scope();
        resolver.declare(x.clone(), 1).unwrap();
        resolver.begin_function();
        resolver.resolve(&x);
        resolver.resolve(&x);
        let (_, captures) = resolver.end_function();
        assert_eq!(captures.len(), 1);
    }
}
