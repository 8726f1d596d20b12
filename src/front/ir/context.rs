use koopa::ir::builder_traits::*;
use koopa::ir::dfg::DataFlowGraph;
use koopa::ir::layout::Layout;
use koopa::ir::{BasicBlock, Function, Program, Type, Value};

use crate::front::ast::Span;
use crate::front::symtab::SymbolTable;
use crate::utils::SourceMap;
use crate::CompilerError;

/// 基本块标签族计数器。
///
/// 整个编译单元内单调递增，保证标签不重名；
/// if/else、land/land_sc、lor/lor_sc、while/while_body 各共用一个编号。
#[derive(Default)]
pub struct Labels {
    seq: u32,
    branch: u32,
    land: u32,
    lor: u32,
    looping: u32,
}

impl Labels {
    pub fn next_seq(&mut self) -> String {
        self.seq += 1;
        format!("seq_{}", self.seq)
    }

    pub fn next_if(&mut self) -> (String, String) {
        self.branch += 1;
        (format!("if_{}", self.branch), format!("else_{}", self.branch))
    }

    pub fn next_land(&mut self) -> (String, String) {
        self.land += 1;
        (format!("land_{}", self.land), format!("land_sc_{}", self.land))
    }

    pub fn next_lor(&mut self) -> (String, String) {
        self.lor += 1;
        (format!("lor_{}", self.lor), format!("lor_sc_{}", self.lor))
    }

    pub fn next_while(&mut self) -> (String, String) {
        self.looping += 1;
        (
            format!("while_{}", self.looping),
            format!("while_body_{}", self.looping),
        )
    }
}

/// IR 生成上下文。
pub struct IrContext {
    pub program: Program,
    pub current_func: Option<Function>,
    pub current_bb: Option<BasicBlock>,
    /// 当前函数入口块，集中放置表达式求值用的一次性 alloc
    pub entry_bb: Option<BasicBlock>,
    pub symbols: SymbolTable,
    /// 每层循环的 (continue 目标, break 目标)
    pub loop_stack: Vec<(BasicBlock, BasicBlock)>,
    pub labels: Labels,
    pub source_map: Option<SourceMap>,
}

impl IrContext {
    pub fn new(source_map: Option<SourceMap>) -> Self {
        Self {
            program: Program::new(),
            current_func: None,
            current_bb: None,
            entry_bb: None,
            symbols: SymbolTable::new(),
            loop_stack: Vec::new(),
            labels: Labels::default(),
            source_map,
        }
    }

    /// 语义错误，有源码映射时解析出行列
    pub fn error_at_span(&self, message: impl Into<String>, span: Span) -> CompilerError {
        match self.source_map.as_ref().map(|sm| sm.line_col(span.begin)) {
            Some((line, col)) => CompilerError::semantic_at(message, line, col),
            None => CompilerError::semantic(message),
        }
    }

    pub fn get_current_bb(&self) -> Result<BasicBlock, CompilerError> {
        self.current_bb
            .ok_or_else(|| CompilerError::semantic("No current basic block"))
    }

    pub fn dfg_mut(&mut self) -> Result<&mut DataFlowGraph, CompilerError> {
        let f = self
            .current_func
            .ok_or_else(|| CompilerError::semantic("No current function"))?;
        Ok(self.program.func_mut(f).dfg_mut())
    }

    pub fn layout(&mut self) -> Result<&mut Layout, CompilerError> {
        let f = self
            .current_func
            .ok_or_else(|| CompilerError::semantic("No current function"))?;
        Ok(self.program.func_mut(f).layout_mut())
    }

    /// 新建带标签的基本块并挂到布局尾部；不切换当前块
    pub fn new_bb(&mut self, label: &str) -> Result<BasicBlock, CompilerError> {
        let name = format!("%{}", label);
        let bb = self.dfg_mut()?.new_bb().basic_block(Some(name));
        self.layout()?
            .bbs_mut()
            .push_key_back(bb)
            .map_err(|_| CompilerError::semantic("Failed to add basic block"))?;
        Ok(bb)
    }

    pub fn set_current_bb(&mut self, bb: BasicBlock) {
        self.current_bb = Some(bb);
    }

    /// 把指令追加到当前基本块末尾
    pub fn push_inst(&mut self, inst: Value) -> Result<(), CompilerError> {
        let bb = self.get_current_bb()?;
        self.layout()?
            .bb_mut(bb)
            .insts_mut()
            .push_key_back(inst)
            .map_err(|_| CompilerError::semantic("Failed to insert instruction"))
    }

    /// 结束当前块：无条件跳转到 target。
    /// 生成约定保证当前块此刻尚无终结指令。
    pub fn emit_jump(&mut self, target: BasicBlock) -> Result<(), CompilerError> {
        let jump = self.dfg_mut()?.new_value().jump(target);
        self.push_inst(jump)
    }

    /// 在入口块最前插入 alloc，避免循环体内反复分配
    pub fn alloc_in_entry(&mut self, ty: Type) -> Result<Value, CompilerError> {
        let entry_bb = self
            .entry_bb
            .ok_or_else(|| CompilerError::semantic("No entry basic block for current function"))?;
        let alloc = self.dfg_mut()?.new_value().alloc(ty);
        self.layout()?
            .bb_mut(entry_bb)
            .insts_mut()
            .push_key_front(alloc)
            .map_err(|_| CompilerError::semantic("Failed to add alloc to entry block"))?;
        Ok(alloc)
    }

    /// 整数常量。全局作用域下挂在 Program 上，函数内挂在 DFG 上
    pub fn integer(&mut self, v: i32) -> Result<Value, CompilerError> {
        if self.current_func.is_none() {
            Ok(self.program.new_value().integer(v))
        } else {
            Ok(self.dfg_mut()?.new_value().integer(v))
        }
    }

    /// 函数内某个值的类型
    pub fn value_type(&self, value: Value) -> Result<Type, CompilerError> {
        let f = self
            .current_func
            .ok_or_else(|| CompilerError::semantic("No current function"))?;
        Ok(self.program.func(f).dfg().value(value).ty().clone())
    }
}
