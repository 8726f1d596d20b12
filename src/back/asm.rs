//! 指令选择与翻译。
//!
//! 所有 IR 值统一落在栈槽里：每条指令先把操作数取进固定的
//! 临时寄存器（t1/t2/t3），算完把结果写回自己的槽。
//! a0 专用于返回值与调用结果，a0-a7 传参，ra 由被调用者保存。

use koopa::ir::entities::ValueData;
use koopa::ir::values::{
    Binary, Branch, Call, GetElemPtr, GetPtr, GlobalAlloc, Jump, Load, Return, Store,
};
use koopa::ir::{BinaryOp, Function, FunctionData, Program, Type, TypeKind, Value, ValueKind};

use crate::back::context::{Context, REG_X, REG_Y, REG_Z};
use crate::back::insts::{Instruction, Reg};
use crate::back::utils::{load_reg_with_offset, store_reg_with_offset};
use crate::CompilerError;

pub trait GenerateAsm {
    fn generate(&self, program: &Program, ctx: &mut Context) -> Result<(), CompilerError>;
}

impl GenerateAsm for Program {
    fn generate(&self, program: &Program, ctx: &mut Context) -> Result<(), CompilerError> {
        ctx.globals.clear();

        // 全局变量：.data 段
        for &global in self.inst_layout() {
            let data = self.borrow_value(global);
            if let ValueKind::GlobalAlloc(alloc) = data.kind() {
                generate_global_alloc(alloc, program, ctx, global)?;
            }
        }

        // 函数：.text 段。没有基本块的是声明，直接跳过
        for &func in self.func_layout() {
            let func_data = self.func(func);
            if func_data.layout().entry_bb().is_none() {
                continue;
            }
            ctx.current_func = Some(func);
            func_data.generate(program, ctx)?;
        }
        Ok(())
    }
}

impl GenerateAsm for FunctionData {
    fn generate(&self, program: &Program, ctx: &mut Context) -> Result<(), CompilerError> {
        let name = &self.name()[1..];
        ctx.reset_for_function();
        ctx.program.push(Instruction::Section(".text".to_string()));
        ctx.program.push(Instruction::Global(name.to_string()));
        ctx.program.push(Instruction::Label(name.to_string()));

        // 第一步：栈帧规划。返回地址总是保留，
        // 每个非 unit 的指令值占一个槽，alloc 槽按被分配类型的大小。
        ctx.frame.alloc_upper(4);
        let mut max_call_args = 0;
        for (_bb, node) in self.layout().bbs() {
            for &inst in node.insts().keys() {
                let value_data = self.dfg().value(inst);
                if let ValueKind::Call(call) = value_data.kind() {
                    max_call_args = max_call_args.max(call.args().len());
                }
                if let ValueKind::Alloc(_) = value_data.kind() {
                    ctx.frame.alloc(inst, pointee_size(value_data)?);
                } else if !value_data.ty().is_unit() {
                    ctx.frame.alloc(inst, value_data.ty().size());
                }
            }
        }
        if max_call_args > 8 {
            ctx.frame.alloc_lower((max_call_args - 8) * 4);
        }

        // 第二步：基本块标签。第一个块复用函数名
        let mut bb_index = 0;
        for (bb, _node) in self.layout().bbs() {
            let label = if bb_index == 0 {
                name.to_string()
            } else {
                format!("{}_bb{}", name, bb_index - 1)
            };
            ctx.bb_labels.insert(*bb, label);
            bb_index += 1;
        }

        // 第三步：导言。移栈指针，保存 ra
        let frame_size = ctx.frame.rounded_size();
        let ra_offset = ctx.frame.offset_upper();
        ctx.move_stack_pointer(-frame_size);
        store_reg_with_offset(ctx, Reg::Ra, ra_offset, REG_X);

        // 第四步：逐块逐指令生成
        let mut bb_index = 0;
        for (bb, node) in self.layout().bbs() {
            if bb_index > 0 {
                let label = ctx.bb_label(*bb)?;
                ctx.program.push(Instruction::Label(label));
            }
            bb_index += 1;
            for &inst in node.insts().keys() {
                ctx.current_inst = Some(inst);
                self.dfg().value(inst).generate(program, ctx)?;
            }
        }
        Ok(())
    }
}

impl GenerateAsm for ValueData {
    fn generate(&self, program: &Program, ctx: &mut Context) -> Result<(), CompilerError> {
        match self.kind() {
            ValueKind::Alloc(_) => Ok(()), // 槽在扫描阶段已分配
            ValueKind::Return(ret) => generate_return(ret, program, ctx),
            ValueKind::Binary(bin) => generate_binary(bin, program, ctx),
            ValueKind::Load(load) => generate_load(load, program, ctx),
            ValueKind::Store(store) => generate_store(store, program, ctx),
            ValueKind::Branch(branch) => generate_branch(branch, program, ctx),
            ValueKind::Jump(jump) => generate_jump(jump, ctx),
            ValueKind::Call(call) => generate_call(call, program, ctx),
            ValueKind::GetElemPtr(gep) => generate_get_elem_ptr(gep, program, ctx),
            ValueKind::GetPtr(gp) => generate_get_ptr(gp, program, ctx),
            other => Err(CompilerError::CodeGenerationError(format!(
                "Unsupported instruction in RISC-V lowering: {:?}",
                other
            ))),
        }
    }
}

/// alloc 指令值的类型是 *T，栈上要留出 T 的大小
fn pointee_size(value_data: &ValueData) -> Result<usize, CompilerError> {
    match value_data.ty().kind() {
        TypeKind::Pointer(base) => Ok(base.size()),
        _ => Err(CompilerError::CodeGenerationError(format!(
            "Alloc value has non-pointer type: {:?}",
            value_data.ty()
        ))),
    }
}

fn value_kind<'p>(
    program: &'p Program,
    ctx: &Context,
    value: Value,
) -> Result<&'p ValueKind, CompilerError> {
    let func = ctx.current_func()?;
    Ok(program.func(func).dfg().value(value).kind())
}

fn value_ty(program: &Program, ctx: &Context, value: Value) -> Result<Type, CompilerError> {
    if ctx.globals.contains(value) {
        return Ok(program.borrow_value(value).ty().clone());
    }
    let func = ctx.current_func()?;
    Ok(program.func(func).dfg().value(value).ty().clone())
}

/// 把操作数取进寄存器。
///
/// 整数常量 li；函数参数从 a 寄存器或调用者栈帧取；
/// 其余一律从自己的栈槽取。tmp 只在偏移超出 imm12 时使用。
fn load_value(
    ctx: &mut Context,
    program: &Program,
    value: Value,
    reg: Reg,
    tmp: Reg,
) -> Result<(), CompilerError> {
    match value_kind(program, ctx, value)? {
        ValueKind::Integer(i) => {
            ctx.program.push(Instruction::Li(reg, i.value()));
        }
        ValueKind::FuncArgRef(arg) => match Reg::arg(arg.index()) {
            Some(src) => {
                ctx.program.push(Instruction::Mv(reg, src));
            }
            None => {
                // 第 9 个起的参数在调用者帧里，紧贴当前帧之上
                let offset = ctx.frame.rounded_size() + ((arg.index() - 8) * 4) as i32;
                load_reg_with_offset(ctx, reg, offset, tmp);
            }
        },
        _ => {
            let offset = ctx.frame.offset(value)?;
            load_reg_with_offset(ctx, reg, offset, tmp);
        }
    }
    Ok(())
}

/// 把指针型操作数指向的地址取进寄存器。
///
/// 全局用 la；alloc 的槽本身就是存储，取槽地址；
/// 计算出来的指针（load/getelemptr/getptr 的结果）从槽里把指针值读出来。
fn load_address(
    ctx: &mut Context,
    program: &Program,
    value: Value,
    reg: Reg,
    tmp: Reg,
) -> Result<(), CompilerError> {
    if let Some(name) = ctx.globals.get(value).map(|s| s.to_string()) {
        ctx.program.push(Instruction::La(reg, name));
        return Ok(());
    }
    if matches!(value_kind(program, ctx, value)?, ValueKind::Alloc(_)) {
        let offset = ctx.frame.offset(value)?;
        if (-2048..=2047).contains(&offset) {
            ctx.program.push(Instruction::Addi(reg, Reg::Sp, offset));
        } else {
            ctx.program.push(Instruction::Li(tmp, offset));
            ctx.program.push(Instruction::Add(reg, Reg::Sp, tmp));
        }
        return Ok(());
    }
    let offset = ctx.frame.offset(value)?;
    load_reg_with_offset(ctx, reg, offset, tmp);
    Ok(())
}

/// 把寄存器写回当前指令的结果槽
fn store_result(ctx: &mut Context, value: Value, reg: Reg, tmp: Reg) -> Result<(), CompilerError> {
    let offset = ctx.frame.offset(value)?;
    store_reg_with_offset(ctx, reg, offset, tmp);
    Ok(())
}

fn generate_return(ret: &Return, program: &Program, ctx: &mut Context) -> Result<(), CompilerError> {
    if let Some(value) = ret.value() {
        load_value(ctx, program, value, Reg::A0, REG_X)?;
    }
    // 后记：恢复 ra，收回栈帧
    let ra_offset = ctx.frame.offset_upper();
    let frame_size = ctx.frame.rounded_size();
    load_reg_with_offset(ctx, Reg::Ra, ra_offset, REG_X);
    ctx.move_stack_pointer(frame_size);
    ctx.program.push(Instruction::Ret);
    Ok(())
}

fn generate_load(load: &Load, program: &Program, ctx: &mut Context) -> Result<(), CompilerError> {
    let result = ctx.current_inst()?;
    load_address(ctx, program, load.src(), REG_Y, REG_Z)?;
    ctx.program.push(Instruction::Lw(REG_X, 0, REG_Y));
    store_result(ctx, result, REG_X, REG_Y)
}

fn generate_store(store: &Store, program: &Program, ctx: &mut Context) -> Result<(), CompilerError> {
    load_value(ctx, program, store.value(), REG_X, REG_Z)?;
    load_address(ctx, program, store.dest(), REG_Y, REG_Z)?;
    ctx.program.push(Instruction::Sw(REG_X, 0, REG_Y));
    Ok(())
}

fn generate_binary(bin: &Binary, program: &Program, ctx: &mut Context) -> Result<(), CompilerError> {
    let result = ctx.current_inst()?;
    load_value(ctx, program, bin.lhs(), REG_Y, REG_X)?;
    load_value(ctx, program, bin.rhs(), REG_Z, REG_X)?;

    match bin.op() {
        BinaryOp::Add => ctx.program.push(Instruction::Add(REG_X, REG_Y, REG_Z)),
        BinaryOp::Sub => ctx.program.push(Instruction::Sub(REG_X, REG_Y, REG_Z)),
        BinaryOp::Mul => ctx.program.push(Instruction::Mul(REG_X, REG_Y, REG_Z)),
        BinaryOp::Div => ctx.program.push(Instruction::Div(REG_X, REG_Y, REG_Z)),
        BinaryOp::Mod => ctx.program.push(Instruction::Rem(REG_X, REG_Y, REG_Z)),
        BinaryOp::Lt => ctx.program.push(Instruction::Slt(REG_X, REG_Y, REG_Z)),
        BinaryOp::Gt => ctx.program.push(Instruction::Sgt(REG_X, REG_Y, REG_Z)),
        BinaryOp::Le => {
            ctx.program.push(Instruction::Sgt(REG_X, REG_Y, REG_Z));
            ctx.program.push(Instruction::Seqz(REG_X, REG_X));
        }
        BinaryOp::Ge => {
            ctx.program.push(Instruction::Slt(REG_X, REG_Y, REG_Z));
            ctx.program.push(Instruction::Seqz(REG_X, REG_X));
        }
        BinaryOp::Eq => {
            ctx.program.push(Instruction::Xor(REG_X, REG_Y, REG_Z));
            ctx.program.push(Instruction::Seqz(REG_X, REG_X));
        }
        BinaryOp::NotEq => {
            ctx.program.push(Instruction::Xor(REG_X, REG_Y, REG_Z));
            ctx.program.push(Instruction::Snez(REG_X, REG_X));
        }
        BinaryOp::And => ctx.program.push(Instruction::And(REG_X, REG_Y, REG_Z)),
        BinaryOp::Or => ctx.program.push(Instruction::Or(REG_X, REG_Y, REG_Z)),
        BinaryOp::Xor => ctx.program.push(Instruction::Xor(REG_X, REG_Y, REG_Z)),
        other => {
            return Err(CompilerError::CodeGenerationError(format!(
                "Binary operator {:?} is outside the supported set",
                other
            )))
        }
    }

    store_result(ctx, result, REG_X, REG_Y)
}

fn generate_branch(branch: &Branch, program: &Program, ctx: &mut Context) -> Result<(), CompilerError> {
    let true_label = ctx.bb_label(branch.true_bb())?;
    let false_label = ctx.bb_label(branch.false_bb())?;

    // 条件是字面量时折叠成无条件跳转
    if let ValueKind::Integer(i) = value_kind(program, ctx, branch.cond())? {
        let target = if i.value() != 0 { true_label } else { false_label };
        ctx.program.push(Instruction::J(target));
        return Ok(());
    }
    load_value(ctx, program, branch.cond(), REG_X, REG_Y)?;
    ctx.program.push(Instruction::Bnez(REG_X, true_label));
    ctx.program.push(Instruction::J(false_label));
    Ok(())
}

fn generate_jump(jump: &Jump, ctx: &mut Context) -> Result<(), CompilerError> {
    let label = ctx.bb_label(jump.target())?;
    ctx.program.push(Instruction::J(label));
    Ok(())
}

fn generate_call(call: &Call, program: &Program, ctx: &mut Context) -> Result<(), CompilerError> {
    let result = ctx.current_inst()?;

    // 前 8 个参数进 a0-a7，其余压在低区出参区
    for (index, &arg) in call.args().iter().enumerate() {
        match Reg::arg(index) {
            Some(reg) => load_value(ctx, program, arg, reg, REG_Y)?,
            None => {
                load_value(ctx, program, arg, REG_X, REG_Y)?;
                let offset = ctx.frame.offset_lower() + ((index - 8) * 4) as i32;
                store_reg_with_offset(ctx, REG_X, offset, REG_Y);
            }
        }
    }

    let callee = callee_name(program, call.callee());
    ctx.program.push(Instruction::Call(callee));

    // 有返回值就把 a0 落回结果槽
    let has_result = {
        let func = ctx.current_func()?;
        !program.func(func).dfg().value(result).ty().is_unit()
    };
    if has_result {
        store_result(ctx, result, Reg::A0, REG_X)?;
    }
    Ok(())
}

fn callee_name(program: &Program, func: Function) -> String {
    program.func(func).name()[1..].to_string()
}

fn generate_get_elem_ptr(
    gep: &GetElemPtr,
    program: &Program,
    ctx: &mut Context,
) -> Result<(), CompilerError> {
    let elem_size = match value_ty(program, ctx, gep.src())?.kind() {
        TypeKind::Pointer(base) => match base.kind() {
            TypeKind::Array(elem, _) => elem.size(),
            _ => {
                return Err(CompilerError::CodeGenerationError(format!(
                    "getelemptr source is not a pointer to array: {}",
                    base
                )))
            }
        },
        other => {
            return Err(CompilerError::CodeGenerationError(format!(
                "getelemptr source is not a pointer: {}",
                other
            )))
        }
    };
    generate_pointer_arith(gep.src(), gep.index(), elem_size, program, ctx)
}

fn generate_get_ptr(gp: &GetPtr, program: &Program, ctx: &mut Context) -> Result<(), CompilerError> {
    let elem_size = match value_ty(program, ctx, gp.src())?.kind() {
        TypeKind::Pointer(base) => base.size(),
        other => {
            return Err(CompilerError::CodeGenerationError(format!(
                "getptr source is not a pointer: {}",
                other
            )))
        }
    };
    generate_pointer_arith(gp.src(), gp.index(), elem_size, program, ctx)
}

/// `结果 = 基址 + 下标 × 元素大小`，对 getelemptr / getptr 通用
fn generate_pointer_arith(
    src: Value,
    index: Value,
    elem_size: usize,
    program: &Program,
    ctx: &mut Context,
) -> Result<(), CompilerError> {
    let result = ctx.current_inst()?;
    load_address(ctx, program, src, REG_X, REG_Z)?;
    load_value(ctx, program, index, REG_Y, REG_Z)?;
    ctx.program.push(Instruction::Li(REG_Z, elem_size as i32));
    ctx.program.push(Instruction::Mul(REG_Y, REG_Y, REG_Z));
    ctx.program.push(Instruction::Add(REG_X, REG_X, REG_Y));
    store_result(ctx, result, REG_X, REG_Y)
}

fn generate_global_alloc(
    alloc: &GlobalAlloc,
    program: &Program,
    ctx: &mut Context,
    value: Value,
) -> Result<(), CompilerError> {
    let symbol = {
        let data = program.borrow_value(value);
        let name = data.name().as_ref().ok_or_else(|| {
            CompilerError::CodeGenerationError(format!("Global value {:?} has no name", value))
        })?;
        name[1..].to_string()
    };
    ctx.globals.insert(value, symbol.clone());

    ctx.program.push(Instruction::Section(".data".to_string()));
    ctx.program.push(Instruction::Global(symbol.clone()));
    ctx.program.push(Instruction::Label(symbol));
    emit_global_init(alloc.init(), program, ctx)
}

fn emit_global_init(value: Value, program: &Program, ctx: &mut Context) -> Result<(), CompilerError> {
    let data = program.borrow_value(value);
    match data.kind() {
        ValueKind::Integer(i) => {
            ctx.program.push(Instruction::Word(i.value()));
            Ok(())
        }
        ValueKind::ZeroInit(_) => {
            ctx.program.push(Instruction::Zero(data.ty().size() as i32));
            Ok(())
        }
        ValueKind::Aggregate(agg) => {
            for &elem in agg.elems() {
                emit_global_init(elem, program, ctx)?;
            }
            Ok(())
        }
        other => Err(CompilerError::CodeGenerationError(format!(
            "Unsupported global initializer: {:?}",
            other
        ))),
    }
}
