//! 符号驻留表
//!
//! 把名字字符串映射为唯一、稳定的 [`Symbol`]。编译期和运行期都只比较
//! Symbol 的 id，不做字符串比较。
//!
//! 每个 VM 持有一个 Interner。`clone()` 得到的副本预先包含当前所有映射，
//! 之后各自独立驻留新名字；副本与原表共享同一个 id 计数器，因此两边新
//! 分配的 id 永不冲突。

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// 驻留后的名字句柄
///
/// 相等性与哈希只看 id；同时携带名字文本，便于不借助 Interner 直接渲染。
#[derive(Clone)]
pub struct Symbol {
    id: u32,
    name: Arc<str>,
}

impl Symbol {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn as_str(&self) -> &str {
        &self.name
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({}#{})", self.name, self.id)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// 名字 -> Symbol 的映射表
#[derive(Debug)]
pub struct Interner {
    map: HashMap<Arc<str>, Symbol>,
    next_id: Arc<AtomicU32>,
}

impl Interner {
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
            next_id: Arc::new(AtomicU32::new(0)),
        }
    }

    /// 驻留名字：首次出现时分配，之后直接查表
    pub fn intern(&mut self, name: &str) -> Symbol {
        if let Some(symbol) = self.map.get(name) {
            return symbol.clone();
        }
        let name: Arc<str> = Arc::from(name);
        let symbol = Symbol {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            name: name.clone(),
        };
        self.map.insert(name, symbol.clone());
        symbol
    }

    /// 只查不建
    pub fn lookup(&self, name: &str) -> Option<Symbol> {
        self.map.get(name).cloned()
    }

    pub fn resolve<'a>(&self, symbol: &'a Symbol) -> &'a str {
        symbol.as_str()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl Default for Interner {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Interner {
    fn clone(&self) -> Self {
        Self {
            map: self.map.clone(),
            next_id: Arc::clone(&self.next_id),
        }
    }
}
