//! 语法树
//!
//! 解析器产出的表达式树。名字保持为 `String`，由发射器驻留成 Symbol。
//! `Handle` 是表层形式，必须先经过 desugar 变成 `WithHandler` 才能发射。

/// 整个编译单元
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub body: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// 变量引用
    Ident(String),
    /// 函数调用
    Call { callee: Box<Expr>, args: Vec<Expr> },
    /// 条件表达式，缺 else 时假分支求值为 none
    If {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Option<Box<Expr>>,
    },
    Lambda(Lambda),
    /// 顺序求值，值为最后一个表达式
    Block(Vec<Expr>),
    /// 声明绑定（顶层为全局）
    Let { name: String, value: Box<Expr> },
    /// 给已有绑定赋值
    Assign { name: String, value: Box<Expr> },
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    Record(Vec<(String, Expr)>),
    /// 字段访问
    Field { target: Box<Expr>, name: String },
    /// 表层 handler 构造
    Handle {
        body: Box<Expr>,
        clauses: Vec<HandlerClause>,
    },
    /// desugar 之后的规范形式：每个效应一个 (效应表达式, 子句 lambda)
    WithHandler {
        clauses: Vec<(Expr, Expr)>,
        body: Box<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lambda {
    /// 有名字时函数体内可直接自引用
    pub name: Option<String>,
    pub params: Vec<String>,
    pub body: Box<Expr>,
}

/// `Effect.Path(payload, k) if guard => body`
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerClause {
    pub effect: Expr,
    pub param: String,
    pub resume: Option<String>,
    pub guard: Option<Expr>,
    pub body: Expr,
    pub line: usize,
}

impl Expr {
    pub fn new(kind: ExprKind, line: usize) -> Self {
        Self { kind, line }
    }

    pub fn ident(name: impl Into<String>, line: usize) -> Self {
        Self::new(ExprKind::Ident(name.into()), line)
    }

    pub fn call(callee: Expr, args: Vec<Expr>, line: usize) -> Self {
        Self::new(
            ExprKind::Call {
                callee: Box::new(callee),
                args,
            },
            line,
        )
    }

    /// 按名字调用全局（运算符等）
    pub fn call_named(name: &str, args: Vec<Expr>, line: usize) -> Self {
        Self::call(Self::ident(name, line), args, line)
    }

    pub fn let_(name: impl Into<String>, value: Expr, line: usize) -> Self {
        Self::new(
            ExprKind::Let {
                name: name.into(),
                value: Box::new(value),
            },
            line,
        )
    }

    pub fn if_(cond: Expr, then: Expr, otherwise: Option<Expr>, line: usize) -> Self {
        Self::new(
            ExprKind::If {
                cond: Box::new(cond),
                then: Box::new(then),
                otherwise: otherwise.map(Box::new),
            },
            line,
        )
    }

    pub fn block(exprs: Vec<Expr>, line: usize) -> Self {
        Self::new(ExprKind::Block(exprs), line)
    }

    pub fn lambda(name: Option<String>, params: Vec<String>, body: Expr, line: usize) -> Self {
        Self::new(
            ExprKind::Lambda(Lambda {
                name,
                params,
                body: Box::new(body),
            }),
            line,
        )
    }

    /// 节点种类名（错误信息用）
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            ExprKind::None => "none",
            ExprKind::Bool(_) => "bool",
            ExprKind::Int(_) => "int",
            ExprKind::Float(_) => "float",
            ExprKind::Str(_) => "string",
            ExprKind::Ident(_) => "identifier",
            ExprKind::Call { .. } => "call",
            ExprKind::If { .. } => "if",
            ExprKind::Lambda(_) => "lambda",
            ExprKind::Block(_) => "block",
            ExprKind::Let { .. } => "var",
            ExprKind::Assign { .. } => "assignment",
            ExprKind::List(_) => "list",
            ExprKind::Tuple(_) => "tuple",
            ExprKind::Record(_) => "record",
            ExprKind::Field { .. } => "field",
            ExprKind::Handle { .. } => "handle",
            ExprKind::WithHandler { .. } => "with-handler",
        }
    }

    /// 把点分标识符路径还原成字符串键；不是路径则返回 None
    pub fn path_key(&self) -> Option<String> {
        match &self.kind {
            ExprKind::Ident(name) => Some(name.clone()),
            ExprKind::Field { target, name } => {
                target.path_key().map(|prefix| format!("{}.{}", prefix, name))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_key() {
        let io = Expr::ident("io", 1);
        let read = Expr::new(
            ExprKind::Field {
                target: Box::new(io),
                name: "Read".into(),
            },
            1,
        );
        assert_eq!(read.path_key().as_deref(), Some("io.Read"));
        assert_eq!(Expr::new(ExprKind::Int(1), 1).path_key(), None);
    }
}
