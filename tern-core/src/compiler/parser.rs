//! 递归下降解析器
//!
//! 二元运算用优先级爬升；运算符直接变成对同名全局函数的调用，
//! `and`/`or` 变成条件表达式。出错后跳到下一个 `;` 继续，错误全部收集。

use super::ast::{Expr, ExprKind, HandlerClause, Program};
use super::error::ParseError;
use super::lexer::{tokenize, Token, TokenKind};
use tern_config::targets;
use tracing::debug;

type ParseResult<T> = Result<T, ParseError>;

/// 运算符优先级，0 表示不是二元运算符
fn get_precedence(kind: &TokenKind) -> i32 {
    match kind {
        TokenKind::Or => 60,
        TokenKind::And => 80,
        TokenKind::DoubleEqual
        | TokenKind::BangEqual
        | TokenKind::Less
        | TokenKind::LessEqual
        | TokenKind::Greater
        | TokenKind::GreaterEqual => 100,
        TokenKind::Plus | TokenKind::Minus => 200,
        TokenKind::Star | TokenKind::Slash | TokenKind::Percent => 300,
        _ => 0,
    }
}

/// 二元运算符对应的全局函数名
fn operator_name(kind: &TokenKind) -> Option<&'static str> {
    let name = match kind {
        TokenKind::DoubleEqual => "==",
        TokenKind::BangEqual => "!=",
        TokenKind::Less => "<",
        TokenKind::LessEqual => "<=",
        TokenKind::Greater => ">",
        TokenKind::GreaterEqual => ">=",
        TokenKind::Plus => "+",
        TokenKind::Minus => "-",
        TokenKind::Star => "*",
        TokenKind::Slash => "/",
        TokenKind::Percent => "%",
        _ => return None,
    };
    Some(name)
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    errors: Vec<ParseError>,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            errors: Vec::new(),
        }
    }

    /// 解析整个编译单元
    pub fn parse(mut self) -> Result<Program, Vec<ParseError>> {
        let body = self.parse_sequence(|k| matches!(k, TokenKind::Eof));
        if self.errors.is_empty() {
            debug!(target: targets::PARSER, exprs = body.len(), "parsed program");
            Ok(Program { body })
        } else {
            Err(self.errors)
        }
    }

    // ==================== token 工具 ====================

    fn current(&self) -> &Token {
        // tokenize 保证最后一个是 Eof，pos 不会越过它
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.current().kind == kind
    }

    fn consume(&mut self) -> Token {
        let token = self.current().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn match_token(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.consume();
            true
        } else {
            false
        }
    }

    fn error_here(&self, message: impl Into<String>) -> ParseError {
        let token = self.current();
        ParseError::at(message, token.line, token.column)
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> ParseResult<Token> {
        if self.check(&kind) {
            Ok(self.consume())
        } else {
            Err(self.error_here(format!(
                "expected {}, found {}",
                what,
                self.current().kind.describe()
            )))
        }
    }

    fn expect_ident(&mut self, what: &str) -> ParseResult<String> {
        match &self.current().kind {
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.consume();
                Ok(name)
            }
            other => Err(self.error_here(format!("expected {}, found {}", what, other.describe()))),
        }
    }

    /// 出错后跳到下一个分号（或块结束）
    fn synchronize(&mut self) {
        let mut depth = 0usize;
        loop {
            match self.current().kind {
                TokenKind::Eof => return,
                TokenKind::Semicolon if depth == 0 => {
                    self.consume();
                    return;
                }
                TokenKind::RightCurly if depth == 0 => return,
                TokenKind::LeftCurly | TokenKind::LeftParen | TokenKind::LeftSquare => depth += 1,
                TokenKind::RightCurly | TokenKind::RightParen | TokenKind::RightSquare => {
                    depth = depth.saturating_sub(1)
                }
                _ => {}
            }
            self.consume();
        }
    }

    // ==================== 序列与表达式 ====================

    /// `expr (';' expr)* ';'?`，直到 is_end
    fn parse_sequence(&mut self, is_end: impl Fn(&TokenKind) -> bool) -> Vec<Expr> {
        let mut exprs = Vec::new();
        while !is_end(&self.current().kind) && !self.check(&TokenKind::Eof) {
            match self.parse_expr() {
                Ok(expr) => {
                    exprs.push(expr);
                    if !self.match_token(&TokenKind::Semicolon) && !is_end(&self.current().kind) {
                        let err = self.error_here(format!(
                            "expected ';', found {}",
                            self.current().kind.describe()
                        ));
                        self.errors.push(err);
                        self.synchronize();
                    }
                }
                Err(err) => {
                    self.errors.push(err);
                    self.synchronize();
                }
            }
        }
        exprs
    }

    pub fn parse_expr(&mut self) -> ParseResult<Expr> {
        let line = self.current().line;
        match self.current().kind.clone() {
            TokenKind::Var => self.parse_var(),
            TokenKind::Effect => {
                self.consume();
                let name = self.expect_ident("effect name")?;
                let ctor = Expr::call_named(
                    "new_effect",
                    vec![Expr::new(ExprKind::Str(name.clone()), line)],
                    line,
                );
                Ok(Expr::let_(name, ctor, line))
            }
            TokenKind::Handle => self.parse_handle(),
            TokenKind::If => self.parse_if(),
            TokenKind::Pipe => self.parse_lambda(None),
            TokenKind::Ident(name) if self.peek_kind(1) == Some(&TokenKind::Equal) => {
                self.consume();
                self.consume();
                let value = self.parse_expr()?;
                Ok(Expr::new(
                    ExprKind::Assign {
                        name,
                        value: Box::new(value),
                    },
                    line,
                ))
            }
            _ => self.parse_binary(0),
        }
    }

    fn peek_kind(&self, ahead: usize) -> Option<&TokenKind> {
        self.tokens.get(self.pos + ahead).map(|t| &t.kind)
    }

    fn parse_var(&mut self) -> ParseResult<Expr> {
        let line = self.consume().line;
        let name = self.expect_ident("variable name")?;
        self.expect(TokenKind::Equal, "'='")?;
        let value = if self.check(&TokenKind::Pipe) {
            // var f = |x| ... 给 lambda 命名，函数体内可以自引用
            self.parse_lambda(Some(name.clone()))?
        } else {
            self.parse_expr()?
        };
        Ok(Expr::let_(name, value, line))
    }

    fn parse_lambda(&mut self, name: Option<String>) -> ParseResult<Expr> {
        let line = self.consume().line; // |
        let mut params = Vec::new();
        if !self.check(&TokenKind::Pipe) {
            loop {
                params.push(self.expect_ident("parameter name")?);
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::Pipe, "'|' after parameters")?;
        let body = self.parse_expr()?;
        Ok(Expr::lambda(name, params, body, line))
    }

    fn parse_if(&mut self) -> ParseResult<Expr> {
        let line = self.consume().line;
        let cond = self.parse_expr()?;
        self.expect(TokenKind::Colon, "':' after condition")?;
        let then = self.parse_expr()?;
        let otherwise = if self.match_token(&TokenKind::Else) {
            self.expect(TokenKind::Colon, "':' after else")?;
            Some(self.parse_expr()?)
        } else {
            None
        };
        Ok(Expr::if_(cond, then, otherwise, line))
    }

    fn parse_handle(&mut self) -> ParseResult<Expr> {
        let line = self.consume().line;
        let body = self.parse_expr()?;
        self.expect(TokenKind::With, "'with'")?;
        self.expect(TokenKind::LeftCurly, "'{' before handler clauses")?;
        let mut clauses = Vec::new();
        while !self.check(&TokenKind::RightCurly) {
            clauses.push(self.parse_clause()?);
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RightCurly, "'}' after handler clauses")?;
        Ok(Expr::new(
            ExprKind::Handle {
                body: Box::new(body),
                clauses,
            },
            line,
        ))
    }

    /// `Path.To.Effect(payload, k) if guard => body`
    fn parse_clause(&mut self) -> ParseResult<HandlerClause> {
        let line = self.current().line;
        let mut effect = Expr::ident(self.expect_ident("effect name")?, line);
        while self.match_token(&TokenKind::Dot) {
            let name = self.expect_ident("identifier after '.'")?;
            effect = Expr::new(
                ExprKind::Field {
                    target: Box::new(effect),
                    name,
                },
                line,
            );
        }
        self.expect(TokenKind::LeftParen, "'(' after effect")?;
        let param = self.expect_ident("payload name")?;
        let resume = if self.match_token(&TokenKind::Comma) {
            Some(self.expect_ident("continuation name")?)
        } else {
            None
        };
        self.expect(TokenKind::RightParen, "')'")?;
        let guard = if self.match_token(&TokenKind::If) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        self.expect(TokenKind::FatArrow, "'=>'")?;
        let body = self.parse_expr()?;
        Ok(HandlerClause {
            effect,
            param,
            resume,
            guard,
            body,
            line,
        })
    }

    /// 优先级爬升，全部左结合
    fn parse_binary(&mut self, min_precedence: i32) -> ParseResult<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = self.current().kind.clone();
            let precedence = get_precedence(&op);
            if precedence == 0 || precedence <= min_precedence {
                break;
            }
            let line = self.consume().line;
            let right = self.parse_binary(precedence)?;
            left = match op {
                TokenKind::And => Expr::if_(
                    left,
                    right,
                    Some(Expr::new(ExprKind::Bool(false), line)),
                    line,
                ),
                TokenKind::Or => Expr::if_(
                    left,
                    Expr::new(ExprKind::Bool(true), line),
                    Some(right),
                    line,
                ),
                other => match operator_name(&other) {
                    Some(name) => Expr::call_named(name, vec![left, right], line),
                    None => return Err(ParseError::at("invalid operator", line, 0)),
                },
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        let line = self.current().line;
        if self.match_token(&TokenKind::Minus) {
            let operand = self.parse_unary()?;
            return Ok(match operand.kind {
                ExprKind::Int(n) => Expr::new(ExprKind::Int(n.wrapping_neg()), line),
                ExprKind::Float(n) => Expr::new(ExprKind::Float(-n), line),
                _ => Expr::call_named("neg", vec![operand], line),
            });
        }
        if self.match_token(&TokenKind::Not) {
            let operand = self.parse_unary()?;
            return Ok(Expr::call_named("not", vec![operand], line));
        }
        let primary = self.parse_primary()?;
        self.parse_postfix(primary)
    }

    fn parse_postfix(&mut self, mut expr: Expr) -> ParseResult<Expr> {
        loop {
            let line = self.current().line;
            if self.match_token(&TokenKind::LeftParen) {
                let args = self.parse_comma_list(TokenKind::RightParen, "')' after arguments")?;
                expr = Expr::call(expr, args, line);
            } else if self.match_token(&TokenKind::Dot) {
                let name = self.expect_ident("field name after '.'")?;
                expr = Expr::new(
                    ExprKind::Field {
                        target: Box::new(expr),
                        name,
                    },
                    line,
                );
            } else if self.match_token(&TokenKind::LeftSquare) {
                let index = self.parse_expr()?;
                self.expect(TokenKind::RightSquare, "']' after index")?;
                expr = Expr::call_named("get", vec![expr, index], line);
            } else {
                return Ok(expr);
            }
        }
    }

    /// 逗号分隔列表，允许结尾逗号；开括号已被消费
    fn parse_comma_list(&mut self, close: TokenKind, what: &str) -> ParseResult<Vec<Expr>> {
        let mut items = Vec::new();
        while !self.check(&close) {
            items.push(self.parse_expr()?);
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(close, what)?;
        Ok(items)
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        let token = self.current().clone();
        let line = token.line;
        let kind = match token.kind {
            TokenKind::Int(n) => ExprKind::Int(n),
            TokenKind::Float(n) => ExprKind::Float(n),
            TokenKind::Str(s) => ExprKind::Str(s),
            TokenKind::True => ExprKind::Bool(true),
            TokenKind::False => ExprKind::Bool(false),
            TokenKind::None => ExprKind::None,
            TokenKind::Ident(name) => ExprKind::Ident(name),
            TokenKind::LeftParen => return self.parse_parenthesized(),
            TokenKind::LeftSquare => {
                self.consume();
                let items = self.parse_comma_list(TokenKind::RightSquare, "']' after list")?;
                return Ok(Expr::new(ExprKind::List(items), line));
            }
            TokenKind::LeftCurly => {
                self.consume();
                let body = self.parse_sequence(|k| matches!(k, TokenKind::RightCurly));
                self.expect(TokenKind::RightCurly, "'}' after block")?;
                return Ok(Expr::block(body, line));
            }
            TokenKind::Record => return self.parse_record(),
            TokenKind::If | TokenKind::Pipe | TokenKind::Handle => return self.parse_expr(),
            other => {
                return Err(self.error_here(format!("expected expression, found {}", other.describe())))
            }
        };
        self.consume();
        Ok(Expr::new(kind, line))
    }

    /// `(e)` 分组，`(a, b)` / `(a,)` 元组，`()` 空元组
    fn parse_parenthesized(&mut self) -> ParseResult<Expr> {
        let line = self.consume().line;
        if self.match_token(&TokenKind::RightParen) {
            return Ok(Expr::new(ExprKind::Tuple(Vec::new()), line));
        }
        let first = self.parse_expr()?;
        if self.match_token(&TokenKind::RightParen) {
            return Ok(first);
        }
        self.expect(TokenKind::Comma, "',' or ')'")?;
        let mut items = vec![first];
        items.extend(self.parse_comma_list(TokenKind::RightParen, "')' after tuple")?);
        Ok(Expr::new(ExprKind::Tuple(items), line))
    }

    fn parse_record(&mut self) -> ParseResult<Expr> {
        let line = self.consume().line;
        self.expect(TokenKind::LeftCurly, "'{' after record")?;
        let mut fields = Vec::new();
        while !self.check(&TokenKind::RightCurly) {
            let name = self.expect_ident("field name")?;
            self.expect(TokenKind::Colon, "':' after field name")?;
            let value = self.parse_expr()?;
            fields.push((name, value));
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RightCurly, "'}' after record fields")?;
        Ok(Expr::new(ExprKind::Record(fields), line))
    }
}

/// 词法 + 语法分析
pub fn parse_source(source: &str) -> Result<Program, Vec<ParseError>> {
    let (tokens, mut lex_errors) = tokenize(source);
    let parsed = Parser::new(tokens).parse();
    match parsed {
        Ok(program) if lex_errors.is_empty() => Ok(program),
        Ok(_) => Err(lex_errors),
        Err(parse_errors) => {
            lex_errors.extend(parse_errors);
            lex_errors.sort_by_key(|e| (e.line, e.column));
            Err(lex_errors)
        }
    }
}
