use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Reg {
    Sp,                 // 栈指针
    Ra,                 // 返回地址
    A0, A1, A2, A3,     // 参数与返回值
    A4, A5, A6, A7,
    T1, T2, T3,         // 固定的临时寄存器池
}

impl Reg {
    /// 第 index 个入参寄存器（0..8）
    pub fn arg(index: usize) -> Option<Reg> {
        match index {
            0 => Some(Reg::A0),
            1 => Some(Reg::A1),
            2 => Some(Reg::A2),
            3 => Some(Reg::A3),
            4 => Some(Reg::A4),
            5 => Some(Reg::A5),
            6 => Some(Reg::A6),
            7 => Some(Reg::A7),
            _ => None,
        }
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let r = match self {
            Reg::Sp => "sp",
            Reg::Ra => "ra",
            Reg::A0 => "a0", Reg::A1 => "a1", Reg::A2 => "a2", Reg::A3 => "a3",
            Reg::A4 => "a4", Reg::A5 => "a5", Reg::A6 => "a6", Reg::A7 => "a7",
            Reg::T1 => "t1", Reg::T2 => "t2", Reg::T3 => "t3",
        };
        write!(f, "{}", r)
    }
}

pub enum Instruction {
    // --- 加载与移动 ---
    Li(Reg, i32),        // li rd, imm
    La(Reg, String),     // la rd, label（全局变量取址）
    Mv(Reg, Reg),        // mv rd, rs

    // --- 访存 ---
    Lw(Reg, i32, Reg),   // lw rd, imm12(rs1)
    Sw(Reg, i32, Reg),   // sw rs2, imm12(rs1)

    // --- 运算（寄存器-寄存器） ---
    Add(Reg, Reg, Reg),  Sub(Reg, Reg, Reg),
    Mul(Reg, Reg, Reg),  Div(Reg, Reg, Reg), Rem(Reg, Reg, Reg),
    And(Reg, Reg, Reg),  Or(Reg, Reg, Reg),  Xor(Reg, Reg, Reg),
    Slt(Reg, Reg, Reg),  Sgt(Reg, Reg, Reg),

    // --- 运算（寄存器-立即数） ---
    Addi(Reg, Reg, i32), // addi rd, rs1, imm12

    // --- 比较伪指令 ---
    Seqz(Reg, Reg),      // rd = (rs == 0)
    Snez(Reg, Reg),      // rd = (rs != 0)

    // --- 控制转移 ---
    Bnez(Reg, String),   // bnez rs, label
    J(String),           // j label
    Call(String),        // call label
    Ret,                 // ret

    // --- 汇编指示符 ---
    Label(String),
    Global(String),
    Section(String),
    Word(i32),           // .word <value>
    Zero(i32),           // .zero <size>
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Instruction::Li(rd, imm) => write!(f, "  li {}, {}", rd, imm),
            Instruction::La(rd, label) => write!(f, "  la {}, {}", rd, label),
            Instruction::Mv(rd, rs) => write!(f, "  mv {}, {}", rd, rs),

            // 注意 offset(reg) 的访存格式
            Instruction::Lw(rd, imm, rs1) => write!(f, "  lw {}, {}({})", rd, imm, rs1),
            Instruction::Sw(rs2, imm, rs1) => write!(f, "  sw {}, {}({})", rs2, imm, rs1),

            Instruction::Add(rd, r1, r2) => write!(f, "  add {}, {}, {}", rd, r1, r2),
            Instruction::Sub(rd, r1, r2) => write!(f, "  sub {}, {}, {}", rd, r1, r2),
            Instruction::Mul(rd, r1, r2) => write!(f, "  mul {}, {}, {}", rd, r1, r2),
            Instruction::Div(rd, r1, r2) => write!(f, "  div {}, {}, {}", rd, r1, r2),
            Instruction::Rem(rd, r1, r2) => write!(f, "  rem {}, {}, {}", rd, r1, r2),
            Instruction::And(rd, r1, r2) => write!(f, "  and {}, {}, {}", rd, r1, r2),
            Instruction::Or(rd, r1, r2) => write!(f, "  or {}, {}, {}", rd, r1, r2),
            Instruction::Xor(rd, r1, r2) => write!(f, "  xor {}, {}, {}", rd, r1, r2),
            Instruction::Slt(rd, r1, r2) => write!(f, "  slt {}, {}, {}", rd, r1, r2),
            Instruction::Sgt(rd, r1, r2) => write!(f, "  sgt {}, {}, {}", rd, r1, r2),

            Instruction::Addi(rd, rs, imm) => write!(f, "  addi {}, {}, {}", rd, rs, imm),

            Instruction::Seqz(rd, rs) => write!(f, "  seqz {}, {}", rd, rs),
            Instruction::Snez(rd, rs) => write!(f, "  snez {}, {}", rd, rs),

            Instruction::Bnez(rs, label) => write!(f, "  bnez {}, {}", rs, label),
            Instruction::J(label) => write!(f, "  j {}", label),
            Instruction::Call(label) => write!(f, "  call {}", label),
            Instruction::Ret => write!(f, "  ret"),

            // Label 不缩进
            Instruction::Label(name) => write!(f, "{}:", name),
            Instruction::Global(name) => write!(f, "  .globl {}", name),
            Instruction::Section(name) => write!(f, "  {}", name),
            Instruction::Word(value) => write!(f, "  .word {}", value),
            Instruction::Zero(size) => write!(f, "  .zero {}", size),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_memory_access_with_offset() {
        assert_eq!(Instruction::Lw(Reg::T1, 8, Reg::Sp).to_string(), "  lw t1, 8(sp)");
        assert_eq!(Instruction::Sw(Reg::A0, -4, Reg::Sp).to_string(), "  sw a0, -4(sp)");
    }

    #[test]
    fn formats_directives_and_labels() {
        assert_eq!(Instruction::Label("main".to_string()).to_string(), "main:");
        assert_eq!(Instruction::Global("main".to_string()).to_string(), "  .globl main");
        assert_eq!(Instruction::Section(".data".to_string()).to_string(), "  .data");
        assert_eq!(Instruction::Word(42).to_string(), "  .word 42");
        assert_eq!(Instruction::Zero(12).to_string(), "  .zero 12");
    }

    #[test]
    fn argument_registers_cover_a0_to_a7() {
        assert_eq!(Reg::arg(0), Some(Reg::A0));
        assert_eq!(Reg::arg(7), Some(Reg::A7));
        assert_eq!(Reg::arg(8), None);
    }
}
