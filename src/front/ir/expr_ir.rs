use koopa::ir::builder_traits::*;
use koopa::ir::{Type, TypeKind, Value};

use crate::front::ast::{self, Expr, LVal, Span};
use crate::front::ir::{GenerateIR, IrContext};
use crate::front::symtab::Symbol;
use crate::CompilerError;

fn binary_inst(
    op: koopa::ir::BinaryOp,
    lhs: Value,
    rhs: Value,
    ctx: &mut IrContext,
) -> Result<Value, CompilerError> {
    let inst = ctx.dfg_mut()?.new_value().binary(op, lhs, rhs);
    ctx.push_inst(inst)?;
    Ok(inst)
}

pub fn generate_unary_op_ir(
    op: &ast::UnaryOp,
    expr: &Expr,
    ctx: &mut IrContext,
) -> Result<Value, CompilerError> {
    let operand = expr.generate_ir(ctx)?;
    match op {
        ast::UnaryOp::Plus => Ok(operand),
        ast::UnaryOp::Minus => {
            let zero = ctx.integer(0)?;
            binary_inst(koopa::ir::BinaryOp::Sub, zero, operand, ctx)
        }
        ast::UnaryOp::Not => {
            let zero = ctx.integer(0)?;
            binary_inst(koopa::ir::BinaryOp::Eq, operand, zero, ctx)
        }
    }
}

pub fn generate_binary_op_ir(
    op: ast::BinaryOp,
    lhs: &Expr,
    rhs: &Expr,
    ctx: &mut IrContext,
) -> Result<Value, CompilerError> {
    let l = lhs.generate_ir(ctx)?;
    let r = rhs.generate_ir(ctx)?;
    let op = match op {
        ast::BinaryOp::Add => koopa::ir::BinaryOp::Add,
        ast::BinaryOp::Sub => koopa::ir::BinaryOp::Sub,
        ast::BinaryOp::Mul => koopa::ir::BinaryOp::Mul,
        ast::BinaryOp::Div => koopa::ir::BinaryOp::Div,
        ast::BinaryOp::Mod => koopa::ir::BinaryOp::Mod,
    };
    binary_inst(op, l, r, ctx)
}

pub fn generate_rel_op_ir(
    op: ast::RelOp,
    lhs: &Expr,
    rhs: &Expr,
    ctx: &mut IrContext,
) -> Result<Value, CompilerError> {
    let l = lhs.generate_ir(ctx)?;
    let r = rhs.generate_ir(ctx)?;
    let op = match op {
        ast::RelOp::Lt => koopa::ir::BinaryOp::Lt,
        ast::RelOp::Gt => koopa::ir::BinaryOp::Gt,
        ast::RelOp::Le => koopa::ir::BinaryOp::Le,
        ast::RelOp::Ge => koopa::ir::BinaryOp::Ge,
    };
    binary_inst(op, l, r, ctx)
}

pub fn generate_eq_op_ir(
    op: ast::EqOp,
    lhs: &Expr,
    rhs: &Expr,
    ctx: &mut IrContext,
) -> Result<Value, CompilerError> {
    let l = lhs.generate_ir(ctx)?;
    let r = rhs.generate_ir(ctx)?;
    let op = match op {
        ast::EqOp::Eq => koopa::ir::BinaryOp::Eq,
        ast::EqOp::Ne => koopa::ir::BinaryOp::NotEq,
    };
    binary_inst(op, l, r, ctx)
}

/// `A && B` 的短路求值。
///
/// 结果经由栈槽物化，无需 phi：
/// 先置 1，A 为真才进入 land 块求 B 并写入 `B != 0`，
/// 否则走 land_sc 块写 0；汇合块把槽里的值读出来作为结果。
pub fn generate_land_op_ir(
    lhs: &Expr,
    rhs: &Expr,
    ctx: &mut IrContext,
) -> Result<Value, CompilerError> {
    let result = ctx.alloc_in_entry(Type::get_i32())?;
    let one = ctx.integer(1)?;
    let init = ctx.dfg_mut()?.new_value().store(one, result);
    ctx.push_inst(init)?;

    let lhs_val = lhs.generate_ir(ctx)?;

    let (rhs_label, sc_label) = ctx.labels.next_land();
    let next_label = ctx.labels.next_seq();
    let rhs_bb = ctx.new_bb(&rhs_label)?;
    let sc_bb = ctx.new_bb(&sc_label)?;
    let next_bb = ctx.new_bb(&next_label)?;

    let br = ctx.dfg_mut()?.new_value().branch(lhs_val, rhs_bb, sc_bb);
    ctx.push_inst(br)?;

    ctx.set_current_bb(rhs_bb);
    let rhs_val = rhs.generate_ir(ctx)?;
    let zero = ctx.integer(0)?;
    let normalized = binary_inst(koopa::ir::BinaryOp::NotEq, rhs_val, zero, ctx)?;
    let store = ctx.dfg_mut()?.new_value().store(normalized, result);
    ctx.push_inst(store)?;
    ctx.emit_jump(next_bb)?;

    ctx.set_current_bb(sc_bb);
    let zero = ctx.integer(0)?;
    let store = ctx.dfg_mut()?.new_value().store(zero, result);
    ctx.push_inst(store)?;
    ctx.emit_jump(next_bb)?;

    ctx.set_current_bb(next_bb);
    let load = ctx.dfg_mut()?.new_value().load(result);
    ctx.push_inst(load)?;
    Ok(load)
}

/// `A || B`：与 && 对称，初值 0，短路分支写 1
pub fn generate_lor_op_ir(
    lhs: &Expr,
    rhs: &Expr,
    ctx: &mut IrContext,
) -> Result<Value, CompilerError> {
    let result = ctx.alloc_in_entry(Type::get_i32())?;
    let zero = ctx.integer(0)?;
    let init = ctx.dfg_mut()?.new_value().store(zero, result);
    ctx.push_inst(init)?;

    let lhs_val = lhs.generate_ir(ctx)?;

    let (rhs_label, sc_label) = ctx.labels.next_lor();
    let next_label = ctx.labels.next_seq();
    let rhs_bb = ctx.new_bb(&rhs_label)?;
    let sc_bb = ctx.new_bb(&sc_label)?;
    let next_bb = ctx.new_bb(&next_label)?;

    let br = ctx.dfg_mut()?.new_value().branch(lhs_val, sc_bb, rhs_bb);
    ctx.push_inst(br)?;

    ctx.set_current_bb(rhs_bb);
    let rhs_val = rhs.generate_ir(ctx)?;
    let zero = ctx.integer(0)?;
    let normalized = binary_inst(koopa::ir::BinaryOp::NotEq, rhs_val, zero, ctx)?;
    let store = ctx.dfg_mut()?.new_value().store(normalized, result);
    ctx.push_inst(store)?;
    ctx.emit_jump(next_bb)?;

    ctx.set_current_bb(sc_bb);
    let one = ctx.integer(1)?;
    let store = ctx.dfg_mut()?.new_value().store(one, result);
    ctx.push_inst(store)?;
    ctx.emit_jump(next_bb)?;

    ctx.set_current_bb(next_bb);
    let load = ctx.dfg_mut()?.new_value().load(result);
    ctx.push_inst(load)?;
    Ok(load)
}

/// 沿下标链推进声明类型并生成地址计算。
///
/// 指针一层先 load 出指针值再 getptr（数组形参），
/// 数组一层直接 getelemptr；返回最终指针和消耗完下标后的残余类型。
pub(crate) fn build_element_ptr(
    lval: &LVal,
    base: Value,
    declared_ty: &Type,
    ctx: &mut IrContext,
) -> Result<(Value, Type), CompilerError> {
    let mut src = base;
    let mut ty = declared_ty.clone();
    for index_expr in &lval.indices {
        let base_ty = match ty.kind() {
            TypeKind::Pointer(base) => {
                let loaded = ctx.dfg_mut()?.new_value().load(src);
                ctx.push_inst(loaded)?;
                let base = base.clone();
                let index = index_expr.generate_ir(ctx)?;
                let next = ctx.dfg_mut()?.new_value().get_ptr(loaded, index);
                ctx.push_inst(next)?;
                src = next;
                base
            }
            TypeKind::Array(base, _) => {
                let base = base.clone();
                let index = index_expr.generate_ir(ctx)?;
                let next = ctx.dfg_mut()?.new_value().get_elem_ptr(src, index);
                ctx.push_inst(next)?;
                src = next;
                base
            }
            _ => {
                return Err(ctx.error_at_span(
                    format!("Too many indices for `{}`", lval.name),
                    lval.span,
                ))
            }
        };
        ty = base_ty;
    }
    Ok((src, ty))
}

/// 左值在右值位置的取值。
///
/// 标量常量已在上层被折叠掉，这里只处理需要寻址的情形。
/// 残余类型仍是复合类型时隐式退化为指针，供数组实参使用。
pub fn generate_lval_ir(lval: &LVal, ctx: &mut IrContext) -> Result<Value, CompilerError> {
    let symbol = ctx
        .symbols
        .lookup(&lval.name)
        .cloned()
        .ok_or_else(|| ctx.error_at_span(format!("Variable `{}` not found", lval.name), lval.span))?;
    let (value, ty) = match symbol {
        Symbol::Var { value, ty, .. } => (value, ty),
        Symbol::Const { value, .. } => {
            if !lval.indices.is_empty() {
                return Err(ctx.error_at_span(
                    format!("Indexed access on scalar constant `{}`", lval.name),
                    lval.span,
                ));
            }
            return ctx.integer(value);
        }
        Symbol::Func { .. } => {
            return Err(ctx.error_at_span(
                format!("Function `{}` used as a value", lval.name),
                lval.span,
            ))
        }
    };

    let (ptr, rest_ty) = build_element_ptr(lval, value, &ty, ctx)?;
    match rest_ty.kind() {
        // 数组隐式退化为指向首元素的指针
        TypeKind::Array(..) => {
            let zero = ctx.integer(0)?;
            let decayed = ctx.dfg_mut()?.new_value().get_elem_ptr(ptr, zero);
            ctx.push_inst(decayed)?;
            Ok(decayed)
        }
        // 指针形参：把保存的指针取出来传递
        TypeKind::Pointer(..) => {
            let load = ctx.dfg_mut()?.new_value().load(ptr);
            ctx.push_inst(load)?;
            Ok(load)
        }
        _ => {
            let load = ctx.dfg_mut()?.new_value().load(ptr);
            ctx.push_inst(load)?;
            Ok(load)
        }
    }
}

pub fn generate_call_ir(
    name: &str,
    args: &[Expr],
    span: Span,
    ctx: &mut IrContext,
) -> Result<Value, CompilerError> {
    let func = match ctx.symbols.lookup(name) {
        Some(Symbol::Func { func, .. }) => *func,
        Some(_) => {
            return Err(ctx.error_at_span(format!("`{}` is not a function", name), span))
        }
        None => return Err(ctx.error_at_span(format!("Function `{}` not found", name), span)),
    };
    let param_tys: Vec<Type> = match ctx.program.func(func).ty().kind() {
        TypeKind::Function(params, _) => params.clone(),
        _ => {
            return Err(CompilerError::semantic(format!(
                "`{}` does not have a function type",
                name
            )))
        }
    };
    if args.len() != param_tys.len() {
        return Err(ctx.error_at_span(
            format!(
                "Function `{}` expects {} argument(s), got {}",
                name,
                param_tys.len(),
                args.len()
            ),
            span,
        ));
    }

    let mut arg_values = Vec::with_capacity(args.len());
    for arg in args {
        arg_values.push(arg.generate_ir(ctx)?);
    }
    // 数组实参退化后类型应与形参一致
    for (idx, (value, expected)) in arg_values.iter().zip(&param_tys).enumerate() {
        let actual = ctx.value_type(*value)?;
        if actual != *expected {
            return Err(ctx.error_at_span(
                format!(
                    "Argument {} of `{}` has type {}, expected {}",
                    idx + 1,
                    name,
                    actual,
                    expected
                ),
                span,
            ));
        }
    }

    let call = ctx.dfg_mut()?.new_value().call(func, arg_values);
    ctx.push_inst(call)?;
    Ok(call)
}
