//! 编译流水线：源码 → token → AST → 脱糖 → Code

pub mod ast;
pub mod desugar;
pub mod emitter;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod scope;

pub use ast::{Expr, ExprKind, HandlerClause, Lambda, Program};
pub use error::{CompileError, CompileErrors, ParseError, SourceError};
pub use parser::parse_source;

use crate::interner::Interner;
use crate::runtime::bytecode::code::Code;
use emitter::Emitter;
use std::sync::Arc;
use tern_config::CompilerConfig;

/// 把（未脱糖的）AST 编译成顶层 Code
pub fn compile_program(
    program: Program,
    interner: &mut Interner,
    config: &CompilerConfig,
) -> Result<Arc<Code>, CompileErrors> {
    let program = desugar::desugar(program)?;
    Emitter::new(interner, config).emit_program(&program)
}

/// 从源码编译
pub fn compile_source(
    source: &str,
    interner: &mut Interner,
    config: &CompilerConfig,
) -> Result<Arc<Code>, SourceError> {
    let program = parse_source(source).map_err(SourceError::Syntax)?;
    Ok(compile_program(program, interner, config)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syntax_error_reported_with_position() {
        let mut interner = Interner::new();
        let err = compile_source("var = 3", &mut interner, &CompilerConfig::default()).unwrap_err();
        assert!(matches!(err, SourceError::Syntax(_)));
        assert_eq!(err.line(), Some(1));
        assert_eq!(err.column(), Some(5));
    }

    #[test]
    fn test_compile_error_surfaces() {
        let mut interner = Interner::new();
        let err = compile_source(
            "handle 1 with { A(x) => 1, A(y) => 2 }",
            &mut interner,
            &CompilerConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, SourceError::Compile(_)));
    }
}
