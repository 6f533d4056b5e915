//! AST → Bytecode 发射器
//!
//! 每个表达式在栈上恰好留下一个值。调用按“先参数、后被调者”的顺序
//! 压栈；尾位置的调用发射 `TailCall`。输入必须已经脱糖，遇到 `Handle`
//! 节点属于内部错误。

use super::ast::{Expr, ExprKind, Program};
use super::error::{CompileError, CompileErrors};
use super::scope::{ScopeResolver, Variable};
use crate::interner::{Interner, Symbol};
use crate::runtime::bytecode::code::{Code, EncodeError};
use crate::runtime::bytecode::OpCode;
use crate::runtime::value::Value;
use std::sync::Arc;
use tern_config::{targets, CompilerConfig};
use tracing::{debug, trace};

type EmitResult = Result<(), CompileError>;

pub struct Emitter<'a> {
    interner: &'a mut Interner,
    config: &'a CompilerConfig,
    scopes: ScopeResolver,
    code: Code,
    errors: Vec<CompileError>,
}

impl<'a> Emitter<'a> {
    pub fn new(interner: &'a mut Interner, config: &'a CompilerConfig) -> Self {
        Self {
            interner,
            config,
            scopes: ScopeResolver::new(),
            code: Code::new(),
            errors: Vec::new(),
        }
    }

    /// 发射整个编译单元（视为无参函数体）
    pub fn emit_program(mut self, program: &Program) -> Result<Arc<Code>, CompileErrors> {
        match self.emit_body(program) {
            Ok(()) => {}
            Err(fatal) => {
                self.errors.push(fatal);
                return Err(CompileErrors(self.errors));
            }
        }
        if !self.errors.is_empty() {
            return Err(CompileErrors(self.errors));
        }
        self.code.local_count = self.scopes.max_locals();
        debug!(
            target: targets::COMPILER,
            bytes = self.code.instrs.len(),
            constants = self.code.consts.len(),
            locals = self.code.local_count,
            "emitted program"
        );
        Ok(Arc::new(self.code))
    }

    fn emit_body(&mut self, program: &Program) -> EmitResult {
        let last = program.body.len().saturating_sub(1);
        if program.body.is_empty() {
            self.code.write_op(OpCode::PushNone, 0);
        }
        for (i, expr) in program.body.iter().enumerate() {
            self.expr(expr, i == last)?;
            if i != last {
                self.code.write_op(OpCode::Pop, self.line(expr));
            }
        }
        let line = program.body.last().map(|e| self.line(e)).unwrap_or(0);
        self.code.write_op(OpCode::Return, line);
        Ok(())
    }

    // ==================== 工具 ====================

    fn line(&self, expr: &Expr) -> usize {
        if self.config.emit_debug_info {
            expr.line
        } else {
            0
        }
    }

    /// 非 fatal 错误记下继续，fatal 错误向上传播
    fn report(&mut self, error: CompileError) -> EmitResult {
        if error.is_fatal() {
            return Err(error);
        }
        self.errors.push(error);
        Ok(())
    }

    fn encode<T>(&mut self, result: Result<T, EncodeError>, line: usize) -> Result<Option<T>, CompileError> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(error) => {
                self.report(CompileError::Encode { error, line })?;
                Ok(None)
            }
        }
    }

    fn emit_indexed(&mut self, op: OpCode, index: usize, line: usize) -> EmitResult {
        let result = self.code.write_indexed(op, index, line);
        self.encode(result, line)?;
        Ok(())
    }

    /// 发射常量加载指令
    fn emit_constant(&mut self, value: Value, line: usize) -> EmitResult {
        let result = self.code.add_constant(value);
        if let Some(idx) = self.encode(result, line)? {
            self.emit_indexed(OpCode::Constant, idx, line)?;
        } else {
            self.code.write_op(OpCode::PushNone, line);
        }
        Ok(())
    }

    /// 发射以符号常量为操作数的指令
    fn emit_symbol_op(&mut self, op: OpCode, symbol: &Symbol, line: usize) -> EmitResult {
        let result = self.code.add_symbol(symbol);
        if let Some(idx) = self.encode(result, line)? {
            self.emit_indexed(op, idx, line)?;
        }
        Ok(())
    }

    /// u8 计数类操作数
    fn emit_count(&mut self, op: OpCode, count: usize, what: &'static str, line: usize) -> EmitResult {
        match u8::try_from(count) {
            Ok(n) => self.code.write_op_u8(op, n, line),
            Err(_) => {
                self.report(CompileError::TooManyOperands { what, count, line })?;
                self.code.write_op_u8(op, u8::MAX, line);
            }
        }
        Ok(())
    }

    fn patch(&mut self, jump: usize, line: usize) -> EmitResult {
        let result = self.code.patch_jump(jump);
        self.encode(result, line)?;
        Ok(())
    }

    // ==================== 表达式 ====================

    fn expr(&mut self, expr: &Expr, tail: bool) -> EmitResult {
        let line = self.line(expr);
        match &expr.kind {
            ExprKind::None => self.code.write_op(OpCode::PushNone, line),
            ExprKind::Bool(b) => self.emit_constant(Value::Bool(*b), line)?,
            ExprKind::Int(n) => self.emit_constant(Value::Int(*n), line)?,
            ExprKind::Float(n) => self.emit_constant(Value::Float(*n), line)?,
            ExprKind::Str(s) => self.emit_constant(Value::string(s.as_str()), line)?,
            ExprKind::Ident(name) => self.load_variable(name, line)?,
            ExprKind::Call { callee, args } => {
                for arg in args {
                    self.expr(arg, false)?;
                }
                self.expr(callee, false)?;
                let op = if tail { OpCode::TailCall } else { OpCode::Call };
                self.emit_count(op, args.len(), "arguments", line)?;
            }
            ExprKind::If {
                cond,
                then,
                otherwise,
            } => {
                self.expr(cond, false)?;
                let else_jump = self.code.write_jump(OpCode::JumpIfFalse, line);
                self.expr(then, tail)?;
                let end_jump = self.code.write_jump(OpCode::Jump, line);
                self.patch(else_jump, line)?;
                match otherwise {
                    Some(otherwise) => self.expr(otherwise, tail)?,
                    None => self.code.write_op(OpCode::PushNone, line),
                }
                self.patch(end_jump, line)?;
            }
            ExprKind::Lambda(lambda) => {
                self.emit_lambda(lambda.name.as_deref(), &lambda.params, &lambda.body, line)?
            }
            ExprKind::Block(exprs) => {
                self.scopes.begin_scope();
                if exprs.is_empty() {
                    self.code.write_op(OpCode::PushNone, line);
                }
                let last = exprs.len().saturating_sub(1);
                for (i, e) in exprs.iter().enumerate() {
                    self.expr(e, tail && i == last)?;
                    if i != last {
                        self.code.write_op(OpCode::Pop, self.line(e));
                    }
                }
                self.scopes.end_scope();
            }
            ExprKind::Let { name, value } => {
                self.expr(value, false)?;
                let symbol = self.interner.intern(name);
                if self.scopes.is_global_scope() {
                    self.emit_symbol_op(OpCode::StoreGlobal, &symbol, line)?;
                } else {
                    match self.scopes.declare(symbol, line) {
                        Ok(slot) => self.emit_indexed(OpCode::StoreLocal, slot, line)?,
                        Err(e) => {
                            self.report(e)?;
                            self.code.write_op(OpCode::Pop, line);
                        }
                    }
                }
                self.code.write_op(OpCode::PushNone, line);
            }
            ExprKind::Assign { name, value } => {
                self.expr(value, false)?;
                let symbol = self.interner.intern(name);
                match self.scopes.resolve(&symbol) {
                    Variable::Local(slot) => self.emit_indexed(OpCode::StoreLocal, slot, line)?,
                    Variable::Outer => self.emit_symbol_op(OpCode::StoreDynamic, &symbol, line)?,
                    Variable::Global => self.emit_symbol_op(OpCode::StoreGlobal, &symbol, line)?,
                }
                self.code.write_op(OpCode::PushNone, line);
            }
            ExprKind::List(items) => {
                for item in items {
                    self.expr(item, false)?;
                }
                self.emit_count(OpCode::BuildList, items.len(), "list elements", line)?;
            }
            ExprKind::Tuple(items) => {
                for item in items {
                    self.expr(item, false)?;
                }
                self.emit_count(OpCode::BuildTuple, items.len(), "tuple elements", line)?;
            }
            ExprKind::Record(fields) => {
                for (name, value) in fields {
                    let symbol = self.interner.intern(name);
                    self.emit_constant(Value::Symbol(symbol), line)?;
                    self.expr(value, false)?;
                }
                self.emit_count(OpCode::BuildRecord, fields.len(), "record fields", line)?;
            }
            ExprKind::Field { target, name } => {
                self.expr(target, false)?;
                let symbol = self.interner.intern(name);
                self.emit_symbol_op(OpCode::GetField, &symbol, line)?;
            }
            ExprKind::Handle { .. } => {
                return Err(CompileError::UnsupportedNode {
                    kind: expr.kind_name(),
                    line: expr.line,
                });
            }
            ExprKind::WithHandler { clauses, body } => {
                for (effect, clause) in clauses {
                    self.expr(effect, false)?;
                    self.expr(clause, false)?;
                }
                self.emit_count(OpCode::MakeHandler, clauses.len(), "handler clauses", line)?;
                // 被处理的主体包成无参 thunk，由 Handle 在新边界帧里调用
                self.emit_lambda(None, &[], body, line)?;
                self.code.write_op(OpCode::Handle, line);
            }
        }
        Ok(())
    }

    fn load_variable(&mut self, name: &str, line: usize) -> EmitResult {
        let symbol = self.interner.intern(name);
        match self.scopes.resolve(&symbol) {
            Variable::Local(slot) => self.emit_indexed(OpCode::LoadLocal, slot, line),
            Variable::Outer => self.emit_symbol_op(OpCode::LoadDynamic, &symbol, line),
            Variable::Global => self.emit_symbol_op(OpCode::LoadGlobal, &symbol, line),
        }
    }

    /// 编译函数体为嵌套 Code，常量池存 Code，发射 Lambda
    fn emit_lambda(
        &mut self,
        name: Option<&str>,
        params: &[String],
        body: &Expr,
        line: usize,
    ) -> EmitResult {
        let name = name.map(|n| self.interner.intern(n));
        let enclosing = std::mem::take(&mut self.code);
        self.scopes.begin_function();

        let mut param_symbols: Vec<Symbol> = Vec::with_capacity(params.len());
        for param in params {
            let symbol = self.interner.intern(param);
            if param_symbols.contains(&symbol) {
                self.report(CompileError::DuplicateParameter {
                    name: param.clone(),
                    line,
                })?;
                // 仍占一个槽位，保持参数与槽位一一对应
                let placeholder = self.interner.intern(&format!("$dup{}", param_symbols.len()));
                self.scopes.declare(placeholder.clone(), line)?;
                param_symbols.push(placeholder);
                continue;
            }
            if let Err(e) = self.scopes.declare(symbol.clone(), line) {
                self.report(e)?;
            }
            param_symbols.push(symbol);
        }

        // 自引用槽位紧跟参数；与参数同名时参数优先
        let self_name = match &name {
            Some(n) if !param_symbols.contains(n) => {
                self.scopes.declare(n.clone(), line)?;
                Some(n.clone())
            }
            _ => None,
        };

        let body_result = self.expr(body, true);
        let (local_count, captures) = self.scopes.end_function();
        let mut function = std::mem::replace(&mut self.code, enclosing);
        body_result?;
        function.write_op(OpCode::Return, line);

        function.name = name;
        function.params = param_symbols;
        function.self_name = self_name;
        function.local_count = local_count;
        function.captures = captures;

        trace!(
            target: targets::COMPILER,
            name = function.name.as_ref().map(|n| n.as_str()).unwrap_or("<lambda>"),
            arity = function.params.len(),
            captures = function.captures.len(),
            bytes = function.instrs.len(),
            "emitted function"
        );

        let result = self.code.add_constant(Value::Code(Arc::new(function)));
        if let Some(idx) = self.encode(result, line)? {
            self.emit_indexed(OpCode::Lambda, idx, line)?;
        } else {
            self.code.write_op(OpCode::PushNone, line);
        }
        Ok(())
    }
}
