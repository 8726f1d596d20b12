//! # 后端模块
//!
//! 把 Koopa IR 程序翻译为 RISC-V (RV32IM) 汇编。
//!
//! ## 翻译策略
//!
//! 1. **栈帧规划**（`frame`）
//!    - 每个有名字的 IR 值在栈上有自己的槽
//!    - 低区是第 9 个起的出参，高区固定保存返回地址
//!    - 帧大小对齐到 16 字节
//!
//! 2. **取值-计算-写回**（`asm`）
//!    - 指令周围把操作数取进固定的 t1/t2/t3 临时寄存器
//!    - 计算结果立即写回结果槽，没有值跨指令驻留寄存器
//!    - 偏移超出 imm12 时用 li 合成
//!
//! 3. **全局变量**（`globals`）
//!    - 生成 .data 段，记录 alloc 到符号名的映射
//!
//! ## 模块结构
//!
//! - `asm`: 每种 IR 指令的翻译逻辑
//! - `insts`: RISC-V 指令及其文本形式
//! - `program`: 汇编程序的收集与输出
//! - `context`: 代码生成上下文
//! - `frame`: 栈帧规划
//! - `globals`: 全局变量名表
//! - `utils`: 大偏移访存的合成

pub mod asm;
pub mod context;
pub mod frame;
pub mod globals;
pub mod insts;
pub mod program;
pub mod utils;

use koopa::ir::Program;

use crate::back::asm::GenerateAsm;
use crate::back::context::Context;
use crate::CompilerError;

/// 从 Koopa IR 程序生成 RISC-V 汇编文本
pub fn generate_asm(program: &Program) -> Result<String, CompilerError> {
    let mut ctx = Context::new();
    program.generate(program, &mut ctx)?;
    Ok(ctx.program.dump())
}
