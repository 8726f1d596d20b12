use koopa::ir::Program;

use crate::utils::SourceMap;
use crate::CompilerError;

pub mod ast;
pub mod consteval;
pub mod ir;
pub mod symtab;

use crate::front::ast::CompUnit;
use crate::front::ir::{GenerateIR, IrContext};

/// 前端入口：遍历 AST 生成 Koopa IR 程序
pub fn generate_ir(ast: &CompUnit, source_map: Option<SourceMap>) -> Result<Program, CompilerError> {
    let mut ctx = IrContext::new(source_map);
    ast.generate_ir(&mut ctx)?;
    Ok(ctx.program)
}
