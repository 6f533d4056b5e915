//! 字节码测试
//!
//! 编码格式与反汇编输出

use std::sync::Arc;
use tern_core::{compile_source, Code, CompilerConfig, Interner, OpCode, Value};

fn compile(source: &str) -> Arc<Code> {
    let mut interner = Interner::new();
    compile_source(source, &mut interner, &CompilerConfig::default()).unwrap()
}

fn ops(code: &Code) -> Vec<OpCode> {
    code.instructions().unwrap().into_iter().map(|i| i.op).collect()
}

// ===== 编码 =====

#[test]
fn test_if_else_encoding() {
    let code = compile("if true: 1 else: 2");
    assert_eq!(
        code.instrs,
        vec![0x10, 0, 0x04, 0, 8, 0x10, 1, 0x03, 0, 5, 0x10, 2, 0x00]
    );
    assert_eq!(code.consts, vec![Value::Bool(true), Value::Int(1), Value::Int(2)]);
}

#[test]
fn test_line_table_matches_bytes() {
    let code = compile("var x = 1;\nvar y = x;\ny");
    assert_eq!(code.lines.len(), code.instrs.len());
    assert_eq!(code.lines.first(), Some(&1));
    assert_eq!(code.lines.last(), Some(&3));
}

#[test]
fn test_without_debug_info() {
    let mut interner = Interner::new();
    let config = CompilerConfig {
        emit_debug_info: false,
    };
    let code = compile_source("1 + 2", &mut interner, &config).unwrap();
    assert!(code.lines.iter().all(|line| *line == 0));
}

#[test]
fn test_top_level_ends_with_return() {
    for source in ["", "1", "var x = 1", "effect E; handle 1 with { E(x) => x }"] {
        let code = compile(source);
        assert_eq!(ops(&code).last(), Some(&OpCode::Return), "{}", source);
    }
}

#[test]
fn test_handle_lowering() {
    let code = compile("effect E; handle 1 with { E(x, k) => k(x) }");
    let ops = ops(&code);
    let make = ops.iter().position(|op| *op == OpCode::MakeHandler).unwrap();
    let handle = ops.iter().position(|op| *op == OpCode::Handle).unwrap();
    assert!(make < handle);
    assert_eq!(ops[handle - 1], OpCode::Lambda);
}

#[test]
fn test_wide_constant_operands() {
    let source = (0..300).map(|i| i.to_string()).collect::<Vec<_>>().join("; ");
    let code = compile(&source);
    assert!(ops(&code).contains(&OpCode::ConstantWide));
}

// ===== 反汇编 =====

#[test]
fn test_disassemble_jumps_and_constants() {
    let code = compile("if true: 1 else: 2");
    let text = code.disassemble("main");
    assert!(text.starts_with("== main"));
    assert!(text.contains("JUMP_IF_FALSE"));
    assert!(text.contains("-> 0010"));
    assert!(text.contains("; true"));
    assert!(text.contains("RETURN"));
}

#[test]
fn test_disassemble_nested_functions() {
    let code = compile("var twice = |x| x * 2; twice(2)");
    let text = code.disassemble("main");
    assert!(text.contains("twice#"));
    assert!(text.contains("TAIL_CALL"));
}
