use std::collections::HashMap;

use koopa::ir::{BasicBlock, Function, Value};

use crate::back::frame::StackFrame;
use crate::back::globals::GlobalNames;
use crate::back::insts::{Instruction, Reg};
use crate::back::program::AsmProgram;
use crate::CompilerError;

/// 运算结果寄存器，也给取值阶段当临时用
pub const REG_X: Reg = Reg::T1;
/// 左操作数 / 地址寄存器
pub const REG_Y: Reg = Reg::T2;
/// 右操作数 / 次级临时寄存器
pub const REG_Z: Reg = Reg::T3;

/// 代码生成上下文。
///
/// 所有 IR 值都落在栈槽里，指令周围按需取进固定的临时寄存器池，
/// 算完立即写回；没有跨指令驻留寄存器的值。
pub struct Context {
    pub program: AsmProgram,
    pub frame: StackFrame,
    pub globals: GlobalNames,
    /// 基本块到汇编标签的映射
    pub bb_labels: HashMap<BasicBlock, String>,
    pub current_func: Option<Function>,
    pub current_inst: Option<Value>,
}

impl Context {
    pub fn new() -> Self {
        Self {
            program: AsmProgram::new(),
            frame: StackFrame::new(),
            globals: GlobalNames::new(),
            bb_labels: HashMap::new(),
            current_func: None,
            current_inst: None,
        }
    }

    /// 每个函数处理前重置；全局名表跨函数保留
    pub fn reset_for_function(&mut self) {
        self.frame.clear();
        self.bb_labels.clear();
        self.current_inst = None;
    }

    pub fn current_func(&self) -> Result<Function, CompilerError> {
        self.current_func.ok_or_else(|| {
            CompilerError::CodeGenerationError("No current function context".to_string())
        })
    }

    pub fn current_inst(&self) -> Result<Value, CompilerError> {
        self.current_inst.ok_or_else(|| {
            CompilerError::CodeGenerationError("No current instruction context".to_string())
        })
    }

    pub fn bb_label(&self, bb: BasicBlock) -> Result<String, CompilerError> {
        self.bb_labels.get(&bb).cloned().ok_or_else(|| {
            CompilerError::CodeGenerationError(format!("Basic block {:?} has no label", bb))
        })
    }

    /// 按帧大小移动栈指针，处理 imm12 放不下的情形
    pub fn move_stack_pointer(&mut self, offset: i32) {
        if offset == 0 {
            return;
        }
        if (-2048..=2047).contains(&offset) {
            self.program.push(Instruction::Addi(Reg::Sp, Reg::Sp, offset));
        } else {
            self.program.push(Instruction::Li(REG_Y, offset));
            self.program.push(Instruction::Add(Reg::Sp, Reg::Sp, REG_Y));
        }
    }
}
