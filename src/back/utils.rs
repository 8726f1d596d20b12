use crate::back::context::Context;
use crate::back::insts::{Instruction, Reg};

/// 偏移在 imm12 内直接 lw；超出时临时挪动 sp，访问完复原。
/// tmp 必须与 reg 不同。
pub fn load_reg_with_offset(ctx: &mut Context, reg: Reg, offset: i32, tmp: Reg) {
    if (-2048..=2047).contains(&offset) {
        ctx.program.push(Instruction::Lw(reg, offset, Reg::Sp));
    } else {
        ctx.program.push(Instruction::Li(tmp, offset));
        ctx.program.push(Instruction::Add(Reg::Sp, Reg::Sp, tmp));
        ctx.program.push(Instruction::Lw(reg, 0, Reg::Sp));
        ctx.program.push(Instruction::Sub(Reg::Sp, Reg::Sp, tmp));
    }
}

/// store 一侧的同款合成。tmp 必须与 reg 不同。
pub fn store_reg_with_offset(ctx: &mut Context, reg: Reg, offset: i32, tmp: Reg) {
    if (-2048..=2047).contains(&offset) {
        ctx.program.push(Instruction::Sw(reg, offset, Reg::Sp));
    } else {
        ctx.program.push(Instruction::Li(tmp, offset));
        ctx.program.push(Instruction::Add(Reg::Sp, Reg::Sp, tmp));
        ctx.program.push(Instruction::Sw(reg, 0, Reg::Sp));
        ctx.program.push(Instruction::Sub(Reg::Sp, Reg::Sp, tmp));
    }
}
