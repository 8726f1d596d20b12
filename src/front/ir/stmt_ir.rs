use koopa::ir::builder_traits::*;
use koopa::ir::TypeKind;

use crate::front::ast::{Block, BlockItem, Expr, LVal, Span, Stmt};
use crate::front::ir::expr_ir::build_element_ptr;
use crate::front::ir::{GenerateIR, IrContext};
use crate::front::symtab::Symbol;
use crate::CompilerError;

/// 终结指令之后开一个新的顺序块，让后续语句始终有归属的开放块。
/// 这样每个基本块恰好以一条终结指令结束。
fn open_seq_block(ctx: &mut IrContext) -> Result<(), CompilerError> {
    let label = ctx.labels.next_seq();
    let bb = ctx.new_bb(&label)?;
    ctx.set_current_bb(bb);
    Ok(())
}

pub fn generate_return_stmt_ir(
    expr: &Option<Expr>,
    ctx: &mut IrContext,
) -> Result<(), CompilerError> {
    let ret_val = match expr {
        Some(e) => Some(e.generate_ir(ctx)?),
        None => None,
    };
    let ret = ctx.dfg_mut()?.new_value().ret(ret_val);
    ctx.push_inst(ret)?;
    open_seq_block(ctx)
}

pub fn generate_assign_stmt_ir(
    lval: &LVal,
    expr: &Expr,
    ctx: &mut IrContext,
) -> Result<(), CompilerError> {
    // 先求右值，再算地址
    let expr_val = expr.generate_ir(ctx)?;

    let symbol = ctx
        .symbols
        .lookup(&lval.name)
        .cloned()
        .ok_or_else(|| ctx.error_at_span(format!("Variable `{}` not found", lval.name), lval.span))?;
    let (value, ty) = match symbol {
        Symbol::Var {
            value,
            ty,
            is_const: false,
            ..
        } => (value, ty),
        Symbol::Var { is_const: true, .. } | Symbol::Const { .. } => {
            return Err(ctx.error_at_span(
                format!("Cannot assign to constant `{}`", lval.name),
                lval.span,
            ))
        }
        Symbol::Func { .. } => {
            return Err(ctx.error_at_span(
                format!("Cannot assign to function `{}`", lval.name),
                lval.span,
            ))
        }
    };

    let (ptr, rest_ty) = build_element_ptr(lval, value, &ty, ctx)?;
    if !matches!(rest_ty.kind(), TypeKind::Int32) {
        return Err(ctx.error_at_span(
            format!("Cannot assign to non-scalar lvalue `{}`", lval.name),
            lval.span,
        ));
    }
    let store = ctx.dfg_mut()?.new_value().store(expr_val, ptr);
    ctx.push_inst(store)
}

pub fn generate_block_stmt_ir(block: &Block, ctx: &mut IrContext) -> Result<(), CompilerError> {
    ctx.symbols.push();
    for item in block {
        match item {
            BlockItem::Decl(decl) => decl.generate_ir(ctx)?,
            BlockItem::Stmt(stmt) => stmt.generate_ir(ctx)?,
        }
    }
    ctx.symbols.pop();
    Ok(())
}

pub fn generate_expr_stmt_ir(expr: &Option<Expr>, ctx: &mut IrContext) -> Result<(), CompilerError> {
    if let Some(e) = expr {
        e.generate_ir(ctx)?;
    }
    Ok(())
}

pub fn generate_if_stmt_ir(
    cond: &Expr,
    then_stmt: &Stmt,
    else_stmt: Option<&Stmt>,
    ctx: &mut IrContext,
) -> Result<(), CompilerError> {
    let cond_val = cond.generate_ir(ctx)?;

    let (if_label, else_label) = ctx.labels.next_if();
    let next_label = ctx.labels.next_seq();
    let then_bb = ctx.new_bb(&if_label)?;
    let else_bb = match else_stmt {
        Some(_) => Some(ctx.new_bb(&else_label)?),
        None => None,
    };
    let next_bb = ctx.new_bb(&next_label)?;

    let br = ctx
        .dfg_mut()?
        .new_value()
        .branch(cond_val, then_bb, else_bb.unwrap_or(next_bb));
    ctx.push_inst(br)?;

    ctx.set_current_bb(then_bb);
    then_stmt.generate_ir(ctx)?;
    ctx.emit_jump(next_bb)?;

    if let (Some(else_bb), Some(else_stmt)) = (else_bb, else_stmt) {
        ctx.set_current_bb(else_bb);
        else_stmt.generate_ir(ctx)?;
        ctx.emit_jump(next_bb)?;
    }

    ctx.set_current_bb(next_bb);
    Ok(())
}

pub fn generate_while_stmt_ir(
    cond: &Expr,
    body: &Stmt,
    ctx: &mut IrContext,
) -> Result<(), CompilerError> {
    let (while_label, body_label) = ctx.labels.next_while();
    let next_label = ctx.labels.next_seq();
    let entry_bb = ctx.new_bb(&while_label)?;
    let body_bb = ctx.new_bb(&body_label)?;
    let next_bb = ctx.new_bb(&next_label)?;

    // 条件每轮都要重新求值，先跳进条件块
    ctx.emit_jump(entry_bb)?;
    ctx.set_current_bb(entry_bb);
    let cond_val = cond.generate_ir(ctx)?;
    let br = ctx.dfg_mut()?.new_value().branch(cond_val, body_bb, next_bb);
    ctx.push_inst(br)?;

    ctx.set_current_bb(body_bb);
    ctx.loop_stack.push((entry_bb, next_bb));
    body.generate_ir(ctx)?;
    ctx.loop_stack.pop();
    ctx.emit_jump(entry_bb)?;

    ctx.set_current_bb(next_bb);
    Ok(())
}

pub fn generate_break_stmt_ir(span: &Span, ctx: &mut IrContext) -> Result<(), CompilerError> {
    let (_, break_target) = *ctx
        .loop_stack
        .last()
        .ok_or_else(|| ctx.error_at_span("break used outside of loop".to_string(), *span))?;
    ctx.emit_jump(break_target)?;
    open_seq_block(ctx)
}

pub fn generate_continue_stmt_ir(span: &Span, ctx: &mut IrContext) -> Result<(), CompilerError> {
    let (continue_target, _) = *ctx
        .loop_stack
        .last()
        .ok_or_else(|| ctx.error_at_span("continue used outside of loop".to_string(), *span))?;
    ctx.emit_jump(continue_target)?;
    open_seq_block(ctx)
}
