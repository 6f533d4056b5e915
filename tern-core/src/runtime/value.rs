//! 运行时值
//!
//! 封闭的 tagged union：VM 热循环里对变体直接 `match`，没有动态派发。
//! 所有变体都是 `Send + Sync`，spawn 出的执行上下文可以直接共享。
//!
//! 相等性：不可变数据按结构比较；闭包、续体、Code、handler、cell、
//! 原生函数与部分应用按身份（`Arc::ptr_eq`）比较；效应类型与 Label
//! 也只比较身份。

use crate::interner::Symbol;
use crate::runtime::bytecode::code::Code;
use crate::runtime::error::RuntimeError;
use crate::runtime::vm::effect::Continuation;
use crate::runtime::vm::Vm;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

/// 原生函数签名：执行上下文 + 参数
pub type NativeFn = fn(&mut Vm, &[Value]) -> Result<Value, RuntimeError>;

#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(Arc<str>),
    Symbol(Symbol),
    List(Arc<Vec<Value>>),
    Tuple(Arc<Vec<Value>>),
    Record(Arc<Record>),
    Closure(Arc<Closure>),
    NativeFunc(Arc<NativeFunc>),
    PartialApp(Arc<PartialApp>),
    Continuation(Arc<Continuation>),
    Type(Arc<EffectType>),
    Handler(Arc<Handler>),
    Code(Arc<Code>),
    Cell(Arc<Cell>),
    Label(u64),
}

// ==================== 复合对象 ====================

/// 一个词法帧的绑定（闭包创建时拷贝）
#[derive(Debug, Clone, Default)]
pub struct Env {
    bindings: HashMap<Symbol, Value>,
}

impl Env {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &Symbol) -> Option<&Value> {
        self.bindings.get(name)
    }

    /// 写入已有绑定，不存在时返回 false
    pub fn set(&mut self, name: &Symbol, value: Value) -> bool {
        match self.bindings.get_mut(name) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn define(&mut self, name: Symbol, value: Value) {
        self.bindings.insert(name, value);
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// 闭包：共享的 Code + 捕获环境的拷贝
#[derive(Debug)]
pub struct Closure {
    pub code: Arc<Code>,
    pub env: Arc<Env>,
}

impl Closure {
    pub fn new(code: Arc<Code>, env: Arc<Env>) -> Self {
        Self { code, env }
    }

    pub fn params(&self) -> &[Symbol] {
        &self.code.params
    }

    pub fn self_name(&self) -> Option<&Symbol> {
        self.code.self_name.as_ref()
    }

    pub fn arity(&self) -> usize {
        self.code.params.len()
    }
}

/// 宿主提供的定长原生函数
pub struct NativeFunc {
    pub name: String,
    pub arity: usize,
    pub func: NativeFn,
}

impl fmt::Debug for NativeFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunc")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

/// 预先绑定了前缀参数的可调用值
#[derive(Debug)]
pub struct PartialApp {
    pub callee: Value,
    pub bound: Vec<Value>,
}

impl PartialApp {
    /// 剩余元数 = 底层元数 - 已绑定个数
    pub fn arity(&self) -> usize {
        self.callee
            .arity()
            .unwrap_or(0)
            .saturating_sub(self.bound.len())
    }
}

/// 效应类型：身份唯一，同名效应互不相等
#[derive(Debug)]
pub struct EffectType {
    pub name: String,
}

/// 效应类型 -> 子句
#[derive(Debug, Default)]
pub struct Handler {
    pub clauses: Vec<(Arc<EffectType>, Value)>,
}

impl Handler {
    pub fn find(&self, effect: &Arc<EffectType>) -> Option<&Value> {
        self.clauses
            .iter()
            .find(|(ty, _)| Arc::ptr_eq(ty, effect))
            .map(|(_, clause)| clause)
    }
}

/// 单槽可变引用
#[derive(Debug)]
pub struct Cell {
    value: Mutex<Value>,
}

impl Cell {
    pub fn new(value: Value) -> Self {
        Self {
            value: Mutex::new(value),
        }
    }

    pub fn get(&self) -> Value {
        match self.value.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn set(&self, value: Value) {
        match self.value.lock() {
            Ok(mut guard) => *guard = value,
            Err(poisoned) => *poisoned.into_inner() = value,
        }
    }

    /// 独占时取走内容，留下 none
    fn take(&mut self) -> Value {
        let slot = match self.value.get_mut() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::replace(slot, Value::None)
    }
}

/// 按符号取字段的记录，字段保持声明顺序
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    pub fields: Vec<(Symbol, Value)>,
}

impl Record {
    pub fn new(fields: Vec<(Symbol, Value)>) -> Self {
        Self { fields }
    }

    pub fn get(&self, name: &Symbol) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// 按名字文本查找（宿主侧使用，无需 interner）
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(k, _)| k.as_str() == name)
            .map(|(_, v)| v)
    }
}

// ==================== Value 方法 ====================

impl Value {
    pub fn string(s: impl Into<Arc<str>>) -> Self {
        Value::String(s.into())
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Arc::new(items))
    }

    pub fn tuple(items: Vec<Value>) -> Self {
        Value::Tuple(Arc::new(items))
    }

    pub fn record(fields: Vec<(Symbol, Value)>) -> Self {
        Value::Record(Arc::new(Record::new(fields)))
    }

    pub fn cell(value: Value) -> Self {
        Value::Cell(Arc::new(Cell::new(value)))
    }

    pub fn native(name: &str, arity: usize, func: NativeFn) -> Self {
        Value::NativeFunc(Arc::new(NativeFunc {
            name: name.to_string(),
            arity,
            func,
        }))
    }

    pub fn effect_type(name: &str) -> Self {
        Value::Type(Arc::new(EffectType {
            name: name.to_string(),
        }))
    }

    /// 类型名（用于错误信息与 `type_of`）
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Symbol(_) => "symbol",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Record(_) => "record",
            Value::Closure(_) => "closure",
            Value::NativeFunc(_) => "native",
            Value::PartialApp(_) => "partial",
            Value::Continuation(_) => "continuation",
            Value::Type(_) => "effect",
            Value::Handler(_) => "handler",
            Value::Code(_) => "code",
            Value::Cell(_) => "cell",
            Value::Label(_) => "label",
        }
    }

    /// 只有 none 与 false 为假
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::None | Value::Bool(false))
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    /// 可调用值的元数；不可调用返回 None
    pub fn arity(&self) -> Option<usize> {
        match self {
            Value::Closure(c) => Some(c.arity()),
            Value::NativeFunc(n) => Some(n.arity),
            Value::PartialApp(p) => Some(p.arity()),
            Value::Continuation(_) | Value::Type(_) => Some(1),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// 列表与元组共用的元素视图
    pub fn as_seq(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) | Value::Tuple(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    /// 容器内部的渲染：字符串加引号，超过深度上限的部分省略
    fn fmt_nested(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Value::String(s) = self {
            return write!(f, "{:?}", s.as_ref());
        }
        let depth = RENDERING.with(|state| {
            let mut state = state.borrow_mut();
            state.depth += 1;
            state.depth
        });
        let result = if depth > MAX_RENDER_DEPTH {
            f.write_str("...")
        } else {
            write!(f, "{}", self)
        };
        RENDERING.with(|state| state.borrow_mut().depth -= 1);
        result
    }

    /// 独占的容器交出自己的元素；共享的保持原样
    fn take_children(&mut self) -> Option<Vec<Value>> {
        match self {
            Value::List(items) | Value::Tuple(items) => Arc::get_mut(items).map(std::mem::take),
            Value::Record(record) => Arc::get_mut(record).map(|record| {
                std::mem::take(&mut record.fields)
                    .into_iter()
                    .map(|(_, value)| value)
                    .collect()
            }),
            Value::Cell(cell) => Arc::get_mut(cell).map(|cell| vec![cell.take()]),
            _ => None,
        }
    }
}

/// 深层嵌套的值用工作表逐层释放，析构不随嵌套深度递归
impl Drop for Value {
    fn drop(&mut self) {
        let mut pending = match self.take_children() {
            Some(children) if !children.is_empty() => children,
            _ => return,
        };
        while let Some(mut value) = pending.pop() {
            if let Some(children) = value.take_children() {
                pending.extend(children);
            }
        }
    }
}

/// 嵌套渲染的深度上限
const MAX_RENDER_DEPTH: usize = 128;

#[derive(Default)]
struct RenderState {
    depth: usize,
    /// 正在渲染的 cell 地址，用来截断自引用
    cells: Vec<usize>,
}

thread_local! {
    static RENDERING: RefCell<RenderState> = RefCell::new(RenderState::default());
}

fn fmt_cell(f: &mut fmt::Formatter<'_>, cell: &Arc<Cell>) -> fmt::Result {
    let addr = Arc::as_ptr(cell) as usize;
    let entered = RENDERING.with(|state| {
        let mut state = state.borrow_mut();
        if state.cells.contains(&addr) {
            false
        } else {
            state.cells.push(addr);
            true
        }
    });
    if !entered {
        return f.write_str("<cell ...>");
    }
    let result = f
        .write_str("<cell ")
        .and_then(|_| cell.get().fmt_nested(f))
        .and_then(|_| f.write_str(">"));
    RENDERING.with(|state| state.borrow_mut().cells.pop());
    result
}

fn fmt_items(f: &mut fmt::Formatter<'_>, items: &[Value]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        item.fmt_nested(f)?;
    }
    Ok(())
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => f.write_str("none"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(n) => {
                if n.is_finite() && n.fract() == 0.0 {
                    write!(f, "{:.1}", n)
                } else {
                    write!(f, "{}", n)
                }
            }
            Value::String(s) => f.write_str(s),
            Value::Symbol(s) => write!(f, "{}", s),
            Value::List(items) => {
                f.write_str("[")?;
                fmt_items(f, items)?;
                f.write_str("]")
            }
            Value::Tuple(items) => {
                f.write_str("(")?;
                fmt_items(f, items)?;
                if items.len() == 1 {
                    f.write_str(",")?;
                }
                f.write_str(")")
            }
            Value::Record(record) => {
                f.write_str("{")?;
                for (i, (name, value)) in record.fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: ", name)?;
                    value.fmt_nested(f)?;
                }
                f.write_str("}")
            }
            Value::Closure(c) => match &c.code.name {
                Some(name) => write!(f, "<fn {}/{}>", name, c.arity()),
                None => write!(f, "<fn/{}>", c.arity()),
            },
            Value::NativeFunc(n) => write!(f, "<native {}/{}>", n.name, n.arity),
            Value::PartialApp(p) => write!(f, "<partial {} +{}>", p.callee, p.bound.len()),
            Value::Continuation(_) => f.write_str("<continuation>"),
            Value::Type(t) => write!(f, "<effect {}>", t.name),
            Value::Handler(h) => write!(f, "<handler {}>", h.clauses.len()),
            Value::Code(c) => match &c.name {
                Some(name) => write!(f, "<code {}>", name),
                None => f.write_str("<code>"),
            },
            Value::Cell(c) => fmt_cell(f, c),
            Value::Label(id) => write!(f, "<label {}>", id),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "String({:?})", s.as_ref()),
            Value::Symbol(s) => write!(f, "{:?}", s),
            other => write!(f, "{}({})", other.type_name(), other),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::Record(a), Value::Record(b)) => a == b,
            (Value::Closure(a), Value::Closure(b)) => Arc::ptr_eq(a, b),
            (Value::NativeFunc(a), Value::NativeFunc(b)) => Arc::ptr_eq(a, b),
            (Value::PartialApp(a), Value::PartialApp(b)) => Arc::ptr_eq(a, b),
            (Value::Continuation(a), Value::Continuation(b)) => Arc::ptr_eq(a, b),
            (Value::Type(a), Value::Type(b)) => Arc::ptr_eq(a, b),
            (Value::Handler(a), Value::Handler(b)) => Arc::ptr_eq(a, b),
            (Value::Code(a), Value::Code(b)) => Arc::ptr_eq(a, b),
            (Value::Cell(a), Value::Cell(b)) => Arc::ptr_eq(a, b),
            (Value::Label(a), Value::Label(b)) => a == b,
            _ => false,
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Arc::from(s))
    }
}
