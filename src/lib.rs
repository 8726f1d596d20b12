use koopa::back::KoopaGenerator;
use koopa::ir::{Program, Type};
use lalrpop_util::lexer::Token;
use lalrpop_util::{lalrpop_mod, ParseError};

pub mod back;
pub mod front;
pub mod utils;

pub use crate::utils::CompilerError;
pub use crate::utils::SourceMap;

use crate::front::ast::CompUnit;

// lalrpop 生成的解析器，模块名来自 sysy.lalrpop
lalrpop_mod!(pub sysy);

/// 解析 SysY 源码，解析错误带行列信息
pub fn parse(input: &str) -> Result<CompUnit, CompilerError> {
    let source_map = SourceMap::new(input);
    sysy::CompUnitParser::new()
        .parse(input)
        .map_err(|e| CompilerError::ParseError(format_parse_error(&source_map, e)))
}

fn format_expected(expected: Vec<String>) -> String {
    if expected.is_empty() {
        "no expected tokens".to_string()
    } else {
        expected.join(", ")
    }
}

fn format_parse_error(source_map: &SourceMap, err: ParseError<usize, Token<'_>, &str>) -> String {
    match err {
        ParseError::InvalidToken { location } => {
            format!("Invalid token at {}", source_map.format_location(location))
        }
        ParseError::UnrecognizedEOF { location, expected } => {
            let expected = format_expected(expected);
            format!(
                "Unexpected end of file at {}. Expected: {}",
                source_map.format_location(location),
                expected
            )
        }
        ParseError::UnrecognizedToken { token, expected } => {
            let (start, tok, _end) = token;
            let expected = format_expected(expected);
            format!(
                "Unrecognized token {:?} at {}. Expected: {}",
                tok,
                source_map.format_location(start),
                expected
            )
        }
        ParseError::ExtraToken { token } => {
            let (start, tok, _end) = token;
            format!(
                "Extra token {:?} at {}",
                tok,
                source_map.format_location(start)
            )
        }
        ParseError::User { error } => {
            format!("Parse error: {}", error)
        }
    }
}

/// 前端：源码 → Koopa IR 程序
pub fn build_ir(input: &str) -> Result<Program, CompilerError> {
    let source_map = SourceMap::new(input);
    let ast = parse(input)?;
    front::generate_ir(&ast, Some(source_map))
}

/// 把 Koopa IR 程序序列化为文本
pub fn koopa_to_text(program: &Program) -> Result<String, CompilerError> {
    let mut gen = KoopaGenerator::new(Vec::new());
    gen.generate_on(program).map_err(|e| {
        CompilerError::CodeGenerationError(format!("Failed to serialize Koopa IR: {}", e))
    })?;
    std::str::from_utf8(&gen.writer())
        .map(|s| s.to_string())
        .map_err(|_| CompilerError::CodeGenerationError("Koopa IR is not valid UTF-8".to_string()))
}

/// 文本 IR → 内存程序。Driver 顺带完成结构合法性校验
pub fn parse_koopa_text(text: String) -> Result<Program, CompilerError> {
    koopa::front::Driver::from(text)
        .generate_program()
        .map_err(|_| CompilerError::CodeGenerationError("Ill-formed Koopa IR".to_string()))
}

/// 源码 → Koopa IR 文本
pub fn emit_koopa_text(input: &str) -> Result<String, CompilerError> {
    let program = build_ir(input)?;
    koopa_to_text(&program)
}

/// 源码 → RISC-V 汇编。
/// 两段之间经过文本 IR，后端消费重新读入的程序。
pub fn emit_riscv_text(input: &str) -> Result<String, CompilerError> {
    // 目标是 riscv32，指针占 4 字节
    Type::set_ptr_size(4);
    let text = emit_koopa_text(input)?;
    let program = parse_koopa_text(text)?;
    back::generate_asm(&program)
}
