//! handler 子句脱糖
//!
//! 把表层的 `handle body with { ... }` 改写成 `WithHandler`：
//! 同一效应的子句合并成一个二元 lambda `|$arg, $k| ...`，带守卫的子句
//! 按书写顺序串成 if 链，无守卫子句放在链尾。没有无守卫子句时，链尾
//! 把同一载荷重新抛给外层 handler，再用其结果恢复续体。
//!
//! 效应表达式只求值一次，先绑定到 `$effN`。带 `$` 的名字用户写不出来。

use super::ast::{Expr, ExprKind, HandlerClause, Lambda, Program};
use super::error::{CompileError, CompileErrors};
use tern_config::targets;
use tracing::{debug, trace};

/// 同一效应的一组子句
struct ClauseGroup {
    key: String,
    effect: Expr,
    clauses: Vec<HandlerClause>,
}

pub struct Desugarer {
    counter: usize,
    errors: Vec<CompileError>,
}

impl Default for Desugarer {
    fn default() -> Self {
        Self::new()
    }
}

impl Desugarer {
    pub fn new() -> Self {
        Self {
            counter: 0,
            errors: Vec::new(),
        }
    }

    /// 改写整个程序；fatal 错误立即返回，其余收集后一起返回
    pub fn run(mut self, program: Program) -> Result<Program, CompileErrors> {
        let mut body = Vec::with_capacity(program.body.len());
        for expr in program.body {
            match self.expr(expr) {
                Ok(expr) => body.push(expr),
                Err(fatal) => {
                    self.errors.push(fatal);
                    return Err(CompileErrors(self.errors));
                }
            }
        }
        debug!(target: targets::DESUGAR, handlers = self.counter, "desugared program");
        if self.errors.is_empty() {
            Ok(Program { body })
        } else {
            Err(CompileErrors(self.errors))
        }
    }

    fn boxed(&mut self, expr: Box<Expr>) -> Result<Box<Expr>, CompileError> {
        Ok(Box::new(self.expr(*expr)?))
    }

    fn all(&mut self, exprs: Vec<Expr>) -> Result<Vec<Expr>, CompileError> {
        exprs.into_iter().map(|e| self.expr(e)).collect()
    }

    fn expr(&mut self, expr: Expr) -> Result<Expr, CompileError> {
        let line = expr.line;
        let kind = match expr.kind {
            ExprKind::Call { callee, args } => ExprKind::Call {
                callee: self.boxed(callee)?,
                args: self.all(args)?,
            },
            ExprKind::If {
                cond,
                then,
                otherwise,
            } => ExprKind::If {
                cond: self.boxed(cond)?,
                then: self.boxed(then)?,
                otherwise: otherwise.map(|e| self.boxed(e)).transpose()?,
            },
            ExprKind::Lambda(Lambda { name, params, body }) => ExprKind::Lambda(Lambda {
                name,
                params,
                body: self.boxed(body)?,
            }),
            ExprKind::Block(exprs) => ExprKind::Block(self.all(exprs)?),
            ExprKind::Let { name, value } => ExprKind::Let {
                name,
                value: self.boxed(value)?,
            },
            ExprKind::Assign { name, value } => ExprKind::Assign {
                name,
                value: self.boxed(value)?,
            },
            ExprKind::List(items) => ExprKind::List(self.all(items)?),
            ExprKind::Tuple(items) => ExprKind::Tuple(self.all(items)?),
            ExprKind::Record(fields) => ExprKind::Record(
                fields
                    .into_iter()
                    .map(|(name, value)| Ok((name, self.expr(value)?)))
                    .collect::<Result<_, CompileError>>()?,
            ),
            ExprKind::Field { target, name } => ExprKind::Field {
                target: self.boxed(target)?,
                name,
            },
            ExprKind::WithHandler { clauses, body } => ExprKind::WithHandler {
                clauses: clauses
                    .into_iter()
                    .map(|(effect, clause)| Ok((self.expr(effect)?, self.expr(clause)?)))
                    .collect::<Result<_, CompileError>>()?,
                body: self.boxed(body)?,
            },
            ExprKind::Handle { body, clauses } => return self.handle(*body, clauses, line),
            leaf => leaf,
        };
        Ok(Expr::new(kind, line))
    }

    /// 按效应路径分组，保持首次出现的顺序
    fn group(&mut self, clauses: Vec<HandlerClause>) -> Vec<ClauseGroup> {
        let mut groups: Vec<ClauseGroup> = Vec::new();
        for clause in clauses {
            let Some(key) = clause.effect.path_key() else {
                self.errors.push(CompileError::InvalidEffectPath {
                    found: clause.effect.kind_name().to_string(),
                    line: clause.line,
                });
                continue;
            };
            match groups.iter_mut().find(|g| g.key == key) {
                Some(group) => group.clauses.push(clause),
                None => groups.push(ClauseGroup {
                    key,
                    effect: clause.effect.clone(),
                    clauses: vec![clause],
                }),
            }
        }
        groups
    }

    fn handle(
        &mut self,
        body: Expr,
        clauses: Vec<HandlerClause>,
        line: usize,
    ) -> Result<Expr, CompileError> {
        let body = self.expr(body)?;
        let mut bindings = Vec::new();
        let mut handler_clauses = Vec::new();

        for group in self.group(clauses) {
            let n = self.counter;
            self.counter += 1;
            let effect_name = format!("$eff{}", n);
            let arg = format!("$arg{}", n);
            let k = format!("$k{}", n);

            let mut catch_all: Option<HandlerClause> = None;
            let mut guarded = Vec::new();
            for clause in group.clauses {
                let clause = HandlerClause {
                    guard: clause.guard.map(|g| self.expr(g)).transpose()?,
                    body: self.expr(clause.body)?,
                    ..clause
                };
                if clause.guard.is_some() {
                    guarded.push(clause);
                } else if catch_all.is_some() {
                    return Err(CompileError::DuplicateCatchAll {
                        effect: group.key,
                        line: clause.line,
                    });
                } else {
                    catch_all = Some(clause);
                }
            }

            trace!(
                target: targets::DESUGAR,
                effect = %group.key,
                guarded = guarded.len(),
                catch_all = catch_all.is_some(),
                "grouped handler clauses"
            );

            let fallback = match catch_all {
                Some(clause) => clause_body(clause, &arg, &k),
                // 重新抛给外层，再用结果恢复
                None => Expr::call(
                    Expr::ident(&k, line),
                    vec![Expr::call(
                        Expr::ident(&effect_name, line),
                        vec![Expr::ident(&arg, line)],
                        line,
                    )],
                    line,
                ),
            };
            let chain = guarded.into_iter().rev().fold(fallback, |next, clause| {
                let clause_line = clause.line;
                let bind = Expr::let_(&clause.param, Expr::ident(&arg, clause_line), clause_line);
                let guard = clause
                    .guard
                    .clone()
                    .unwrap_or_else(|| Expr::new(ExprKind::Bool(true), clause_line));
                let test = Expr::block(vec![bind, guard], clause_line);
                Expr::if_(test, clause_body(clause, &arg, &k), Some(next), clause_line)
            });

            bindings.push(Expr::let_(&effect_name, group.effect, line));
            handler_clauses.push((
                Expr::ident(&effect_name, line),
                Expr::lambda(None, vec![arg, k], chain, line),
            ));
        }

        bindings.push(Expr::new(
            ExprKind::WithHandler {
                clauses: handler_clauses,
                body: Box::new(body),
            },
            line,
        ));
        Ok(Expr::block(bindings, line))
    }
}

/// `{ var param = $arg; var resume = $k; body }`
fn clause_body(clause: HandlerClause, arg: &str, k: &str) -> Expr {
    let line = clause.line;
    let mut exprs = vec![Expr::let_(clause.param, Expr::ident(arg, line), line)];
    if let Some(resume) = clause.resume {
        exprs.push(Expr::let_(resume, Expr::ident(k, line), line));
    }
    exprs.push(clause.body);
    Expr::block(exprs, line)
}

/// 脱糖入口
pub fn desugar(program: Program) -> Result<Program, CompileErrors> {
    Desugarer::new().run(program)
}
