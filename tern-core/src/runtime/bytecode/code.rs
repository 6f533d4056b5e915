//! Code 对象：指令字节流 + 常量池 + 行号表
//!
//! 由发射器逐字节写入，编译完成后包进 `Arc` 不再修改。

use super::{InvalidOpCode, OpCode};
use crate::interner::Symbol;
use crate::runtime::value::Value;
use std::fmt::Write as _;
use thiserror::Error;

/// 常量池上限（2 字节索引）
pub const MAX_CONSTANTS: usize = 1 << 16;

/// 编码失败
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("too many constants in one code object (limit {MAX_CONSTANTS})")]
    TooManyConstants,
    #[error("jump offset {0} does not fit in 16 bits")]
    JumpTooFar(usize),
    #[error("operand {0} does not fit in 16 bits")]
    OperandTooWide(usize),
}

/// 闭包创建时某个被捕获名字的来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureSource {
    /// 定义处帧的局部槽位
    Local(u16),
    /// 定义处闭包自己的捕获环境
    Enclosing,
}

/// 被捕获的名字
#[derive(Debug, Clone, PartialEq)]
pub struct Capture {
    pub name: Symbol,
    pub source: CaptureSource,
}

/// 一段编译单元或函数体
#[derive(Debug, Clone, Default)]
pub struct Code {
    /// 函数名（顶层单元为 None）
    pub name: Option<Symbol>,
    /// 参数名，占据局部槽位 0..arity
    pub params: Vec<Symbol>,
    /// 自引用名，占据槽位 arity
    pub self_name: Option<Symbol>,
    /// 局部槽位总数
    pub local_count: usize,
    /// 由本 Code 构造闭包时要拷贝的绑定
    pub captures: Vec<Capture>,
    /// 指令字节
    pub instrs: Vec<u8>,
    /// 常量池
    pub consts: Vec<Value>,
    /// 行号表，与 instrs 等长
    pub lines: Vec<usize>,
}

/// 解码后的一条指令
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub offset: usize,
    pub op: OpCode,
    /// 原始操作数字节
    pub operands: Vec<u8>,
}

impl Instruction {
    /// 操作数按大端拼成整数
    pub fn operand(&self) -> Option<usize> {
        match self.operands.as_slice() {
            [] => None,
            [a] => Some(*a as usize),
            [hi, lo] => Some(u16::from_be_bytes([*hi, *lo]) as usize),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        1 + self.operands.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

/// 字节流中途截断或含未知操作码
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("{0} at offset {1}")]
    InvalidOpCode(InvalidOpCode, usize),
    #[error("truncated instruction at offset {0}")]
    Truncated(usize),
}

impl Code {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// 写入单字节指令
    pub fn write_op(&mut self, op: OpCode, line: usize) {
        self.instrs.push(op as u8);
        self.lines.push(line);
    }

    /// 写入带 u8 操作数的指令
    pub fn write_op_u8(&mut self, op: OpCode, operand: u8, line: usize) {
        self.write_op(op, line);
        self.instrs.push(operand);
        self.lines.push(line);
    }

    /// 写入带 u16 操作数（大端）的指令
    pub fn write_op_u16(&mut self, op: OpCode, operand: u16, line: usize) {
        self.write_op(op, line);
        let [hi, lo] = operand.to_be_bytes();
        self.instrs.push(hi);
        self.instrs.push(lo);
        self.lines.push(line);
        self.lines.push(line);
    }

    /// 写入索引类指令：索引放得进一个字节用窄版本，否则用宽版本
    pub fn write_indexed(&mut self, op: OpCode, index: usize, line: usize) -> Result<(), EncodeError> {
        if let Ok(narrow) = u8::try_from(index) {
            self.write_op_u8(op, narrow, line);
            return Ok(());
        }
        let wide = u16::try_from(index).map_err(|_| EncodeError::OperandTooWide(index))?;
        match op.wide() {
            Some(wide_op) => {
                self.write_op_u16(wide_op, wide, line);
                Ok(())
            }
            None => Err(EncodeError::OperandTooWide(index)),
        }
    }

    /// 写入跳转指令（占位），返回指令起始位置
    pub fn write_jump(&mut self, op: OpCode, line: usize) -> usize {
        let start = self.instrs.len();
        self.write_op_u16(op, u16::MAX, line);
        start
    }

    /// 修补跳转：偏移 = 当前位置 - 跳转指令起始位置
    pub fn patch_jump(&mut self, jump_start: usize) -> Result<(), EncodeError> {
        let distance = self.instrs.len() - jump_start;
        let offset = u16::try_from(distance).map_err(|_| EncodeError::JumpTooFar(distance))?;
        let [hi, lo] = offset.to_be_bytes();
        self.instrs[jump_start + 1] = hi;
        self.instrs[jump_start + 2] = lo;
        Ok(())
    }

    /// 添加常量
    pub fn add_constant(&mut self, value: Value) -> Result<usize, EncodeError> {
        let idx = self.consts.len();
        if idx >= MAX_CONSTANTS {
            return Err(EncodeError::TooManyConstants);
        }
        self.consts.push(value);
        Ok(idx)
    }

    /// 添加符号常量，同名符号只占一个槽位
    pub fn add_symbol(&mut self, symbol: &Symbol) -> Result<usize, EncodeError> {
        let existing = self
            .consts
            .iter()
            .position(|c| matches!(c, Value::Symbol(s) if s == symbol));
        match existing {
            Some(idx) => Ok(idx),
            None => self.add_constant(Value::Symbol(symbol.clone())),
        }
    }

    /// 获取当前代码位置
    pub fn current_offset(&self) -> usize {
        self.instrs.len()
    }

    #[inline]
    pub fn read_u8(&self, offset: usize) -> u8 {
        self.instrs[offset]
    }

    #[inline]
    pub fn read_u16(&self, offset: usize) -> u16 {
        u16::from_be_bytes([self.instrs[offset], self.instrs[offset + 1]])
    }

    /// 解码 offset 处的一条指令
    pub fn decode_at(&self, offset: usize) -> Result<Instruction, DecodeError> {
        let byte = self.instrs[offset];
        let op = OpCode::try_from(byte).map_err(|e| DecodeError::InvalidOpCode(e, offset))?;
        let end = offset + 1 + op.operand_size();
        if end > self.instrs.len() {
            return Err(DecodeError::Truncated(offset));
        }
        Ok(Instruction {
            offset,
            op,
            operands: self.instrs[offset + 1..end].to_vec(),
        })
    }

    /// 顺序解码全部指令
    pub fn instructions(&self) -> Result<Vec<Instruction>, DecodeError> {
        let mut out = Vec::new();
        let mut offset = 0;
        while offset < self.instrs.len() {
            let instr = self.decode_at(offset)?;
            offset += instr.len();
            out.push(instr);
        }
        Ok(out)
    }

    /// 嵌套的函数体（常量池中的 Code）
    pub fn nested(&self) -> impl Iterator<Item = (usize, &Code)> {
        self.consts.iter().enumerate().filter_map(|(idx, c)| match c {
            Value::Code(code) => Some((idx, code.as_ref())),
            _ => None,
        })
    }

    /// 反汇编为可读文本，递归展开嵌套函数
    pub fn disassemble(&self, name: &str) -> String {
        let mut out = String::new();
        self.disassemble_into(name, &mut out);
        out
    }

    fn disassemble_into(&self, name: &str, out: &mut String) {
        let _ = writeln!(
            out,
            "== {} (arity {}, locals {}, constants {}) ==",
            name,
            self.arity(),
            self.local_count,
            self.consts.len()
        );
        let mut offset = 0;
        let mut last_line = None;
        while offset < self.instrs.len() {
            let instr = match self.decode_at(offset) {
                Ok(instr) => instr,
                Err(e) => {
                    let _ = writeln!(out, "{:04}      <{}>", offset, e);
                    break;
                }
            };
            let line = self.lines.get(offset).copied();
            let line_col = if line == last_line {
                "   |".to_string()
            } else {
                format!("{:4}", line.unwrap_or(0))
            };
            last_line = line;

            let operands = instr
                .operands
                .iter()
                .map(|b| b.to_string())
                .collect::<Vec<_>>()
                .join(" ");
            let _ = write!(out, "{:04} {} {:<20} {}", offset, line_col, instr.op.name(), operands);

            match (instr.op, instr.operand()) {
                (OpCode::Jump | OpCode::JumpIfFalse, Some(delta)) => {
                    let _ = write!(out, " -> {:04}", offset + delta);
                }
                (op, Some(idx)) if op.has_constant_operand() => {
                    if let Some(value) = self.consts.get(idx) {
                        let _ = write!(out, " ; {}", value);
                    }
                }
                _ => {}
            }
            out.push('\n');
            offset += instr.len();
        }

        for (idx, nested) in self.nested() {
            let nested_name = match &nested.name {
                Some(n) => format!("{}#{}", n, idx),
                None => format!("{}#lambda_{}", name, idx),
            };
            out.push('\n');
            nested.disassemble_into(&nested_name, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_op() {
        let mut code = Code::new();
        code.write_op(OpCode::Return, 1);
        assert_eq!(code.instrs, vec![0x00]);
        assert_eq!(code.lines.len(), code.instrs.len());
    }

    #[test]
    fn test_constant() {
        let mut code = Code::new();
        let idx = code.add_constant(Value::Int(42)).unwrap();
        assert_eq!(idx, 0);
        assert_eq!(code.consts[0], Value::Int(42));
    }

    #[test]
    fn test_write_indexed_switches_to_wide() {
        let mut code = Code::new();
        code.write_indexed(OpCode::Constant, 7, 1).unwrap();
        code.write_indexed(OpCode::Constant, 300, 1).unwrap();
        assert_eq!(code.instrs, vec![OpCode::Constant as u8, 7, OpCode::ConstantWide as u8, 0x01, 0x2c]);
        assert_eq!(code.lines.len(), 5);
        assert!(code.write_indexed(OpCode::Call, 300, 1).is_err());
    }

    #[test]
    fn test_jump() {
        let mut code = Code::new();
        let jump = code.write_jump(OpCode::Jump, 1);
        code.write_op(OpCode::Pop, 1);
        code.write_op(OpCode::Pop, 1);
        code.patch_jump(jump).unwrap();
        // 偏移相对跳转指令起点：3 字节指令 + 2 个 POP
        assert_eq!(code.read_u16(jump + 1), 5);
    }

    #[test]
    fn test_jump_too_far() {
        let mut code = Code::new();
        let jump = code.write_jump(OpCode::Jump, 1);
        for _ in 0..70_000 {
            code.write_op(OpCode::Pop, 1);
        }
        assert!(matches!(code.patch_jump(jump), Err(EncodeError::JumpTooFar(_))));
    }

    #[test]
    fn test_constant_pool_limit() {
        let mut code = Code::new();
        code.consts = vec![Value::None; MAX_CONSTANTS];
        assert_eq!(code.add_constant(Value::Int(1)), Err(EncodeError::TooManyConstants));
    }

    #[test]
    fn test_decode_rejects_unknown_byte() {
        let mut code = Code::new();
        code.instrs.push(0xEE);
        code.lines.push(1);
        assert!(matches!(code.instructions(), Err(DecodeError::InvalidOpCode(_, 0))));
    }

    #[test]
    fn test_decode_truncated() {
        let mut code = Code::new();
        code.instrs.push(OpCode::Jump as u8);
        code.lines.push(1);
        assert_eq!(code.instructions(), Err(DecodeError::Truncated(0)));
    }
}
