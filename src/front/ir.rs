pub mod context;
pub mod expr_ir;
pub mod stmt_ir;

use koopa::ir::builder_traits::*;
use koopa::ir::{FunctionData, Type, Value};

use crate::front::ast::*;
use crate::front::consteval::{eval_const, inline_number};
use crate::front::ir::expr_ir::*;
use crate::front::ir::stmt_ir::*;
use crate::front::symtab::Symbol;
use crate::CompilerError;

pub use crate::front::ir::context::IrContext;

pub trait GenerateIR {
    type Output;
    fn generate_ir(&self, ctx: &mut IrContext) -> Result<Self::Output, CompilerError>;
}

impl GenerateIR for CompUnit {
    type Output = ();

    fn generate_ir(&self, ctx: &mut IrContext) -> Result<Self::Output, CompilerError> {
        // SysY 库函数先进符号表，对应的 decl 随程序一起输出
        declare_library_functions(ctx);

        // 全局声明先于一切函数体处理
        for item in &self.items {
            if let GlobalItem::Decl(decl) = item {
                decl.generate_ir(ctx)?;
            }
        }

        // 先登记所有函数签名，允许调用文件中靠后定义的函数
        for item in &self.items {
            if let GlobalItem::FuncDef(func) = item {
                if matches!(ctx.symbols.lookup(&func.name), Some(Symbol::Func { .. })) {
                    return Err(ctx.error_at_span(
                        format!("Function `{}` already declared", func.name),
                        func.span,
                    ));
                }
                let mut params = Vec::with_capacity(func.params.len());
                for param in &func.params {
                    params.push((Some(format!("@{}", param.name)), param_type(param, ctx)?));
                }
                let ret_ty = match func.ty {
                    DataType::Int => Type::get_i32(),
                    DataType::Void => Type::get_unit(),
                };
                let data = FunctionData::with_param_names(format!("@{}", func.name), params, ret_ty);
                let f = ctx.program.new_func(data);
                ctx.symbols.insert_func(&func.name, f);
            }
        }

        for item in &self.items {
            if let GlobalItem::FuncDef(func) = item {
                func.generate_ir(ctx)?;
            }
        }
        Ok(())
    }
}

/// SysY 运行时库的八个函数，签名固定
fn declare_library_functions(ctx: &mut IrContext) {
    let int = Type::get_i32;
    let unit = Type::get_unit;
    let ptr = || Type::get_pointer(Type::get_i32());
    let signatures: [(&str, Vec<Type>, Type); 8] = [
        ("getint", vec![], int()),
        ("getch", vec![], int()),
        ("getarray", vec![ptr()], int()),
        ("putint", vec![int()], unit()),
        ("putch", vec![int()], unit()),
        ("putarray", vec![int(), ptr()], unit()),
        ("starttime", vec![], unit()),
        ("stoptime", vec![], unit()),
    ];
    for (name, params, ret) in signatures {
        // 不挂基本块，entry_bb() 为 None 即函数声明
        let data = FunctionData::new(format!("@{}", name), params, ret);
        let f = ctx.program.new_func(data);
        ctx.symbols.insert_func(name, f);
    }
}

impl GenerateIR for FuncDef {
    type Output = ();

    fn generate_ir(&self, ctx: &mut IrContext) -> Result<Self::Output, CompilerError> {
        let f = match ctx.symbols.lookup(&self.name) {
            Some(Symbol::Func { func, .. }) => *func,
            _ => {
                return Err(ctx.error_at_span(
                    format!("Function `{}` is not declared", self.name),
                    self.span,
                ))
            }
        };
        ctx.current_func = Some(f);

        let entry = ctx.new_bb(&format!("{}_entry", self.name))?;
        ctx.set_current_bb(entry);
        ctx.entry_bb = Some(entry);

        // 形参独占一层作用域，函数体块会再开一层
        ctx.symbols.push();
        let param_values: Vec<Value> = ctx.program.func(f).params().to_vec();
        for (param, &pv) in self.params.iter().zip(param_values.iter()) {
            let ty = param_type(param, ctx)?;
            let alloc = ctx.dfg_mut()?.new_value().alloc(ty.clone());
            ctx.push_inst(alloc)?;
            let internal = ctx.symbols.insert_var(&param.name, ty, alloc, false);
            ctx.dfg_mut()?
                .set_value_name(alloc, Some(format!("@{}", internal)));
            let store = ctx.dfg_mut()?.new_value().store(pv, alloc);
            ctx.push_inst(store)?;
        }

        generate_block_stmt_ir(&self.body, ctx)?;

        // 兜底 ret：源码没写 return 时当前块仍是开放的
        let ret = match self.ty {
            DataType::Int => {
                let zero = ctx.dfg_mut()?.new_value().integer(0);
                ctx.dfg_mut()?.new_value().ret(Some(zero))
            }
            DataType::Void => ctx.dfg_mut()?.new_value().ret(None),
        };
        ctx.push_inst(ret)?;

        ctx.symbols.pop();
        ctx.entry_bb = None;
        ctx.current_bb = None;
        ctx.current_func = None;
        Ok(())
    }
}

impl GenerateIR for Stmt {
    type Output = ();

    fn generate_ir(&self, ctx: &mut IrContext) -> Result<Self::Output, CompilerError> {
        match self {
            Stmt::Return(expr) => generate_return_stmt_ir(expr, ctx),
            Stmt::Assign(lval, expr) => generate_assign_stmt_ir(lval, expr, ctx),
            Stmt::Block(block) => generate_block_stmt_ir(block, ctx),
            Stmt::Expr(expr) => generate_expr_stmt_ir(expr, ctx),
            Stmt::If {
                cond,
                then_stmt,
                else_stmt,
                ..
            } => generate_if_stmt_ir(cond, then_stmt, else_stmt.as_deref(), ctx),
            Stmt::While { cond, body, .. } => generate_while_stmt_ir(cond, body, ctx),
            Stmt::Break(span) => generate_break_stmt_ir(span, ctx),
            Stmt::Continue(span) => generate_continue_stmt_ir(span, ctx),
        }
    }
}

impl GenerateIR for Expr {
    type Output = Value;

    fn generate_ir(&self, ctx: &mut IrContext) -> Result<Self::Output, CompilerError> {
        // 可折叠的子树直接内联成整数，不生成任何指令
        if let Some(v) = inline_number(self, &ctx.symbols) {
            return ctx.integer(v);
        }
        match self {
            Expr::IntLiteral(n, _) => ctx.integer(*n),
            Expr::LVal(lval) => generate_lval_ir(lval, ctx),
            Expr::UnaryOp(op, operand, _) => generate_unary_op_ir(op, operand, ctx),
            Expr::BinaryOp(op, lhs, rhs, _) => generate_binary_op_ir(*op, lhs, rhs, ctx),
            Expr::RelOp(op, lhs, rhs, _) => generate_rel_op_ir(*op, lhs, rhs, ctx),
            Expr::EqOp(op, lhs, rhs, _) => generate_eq_op_ir(*op, lhs, rhs, ctx),
            Expr::LAndOp(_, lhs, rhs, _) => generate_land_op_ir(lhs, rhs, ctx),
            Expr::LOrOp(_, lhs, rhs, _) => generate_lor_op_ir(lhs, rhs, ctx),
            Expr::Call(name, args, span) => generate_call_ir(name, args, *span, ctx),
        }
    }
}

impl GenerateIR for Decl {
    type Output = ();

    fn generate_ir(&self, ctx: &mut IrContext) -> Result<Self::Output, CompilerError> {
        match self {
            Decl::ConstDecl(decl) => decl.generate_ir(ctx),
            Decl::VarDecl(decl) => decl.generate_ir(ctx),
        }
    }
}

impl GenerateIR for ConstDecl {
    type Output = ();

    fn generate_ir(&self, ctx: &mut IrContext) -> Result<Self::Output, CompilerError> {
        for def in &self.defs {
            if def.dims.is_empty() {
                // 标量常量：编译期求值，只进符号表
                match &def.init {
                    ConstInitVal::Single(expr) => {
                        let value = eval_const(expr, ctx)?;
                        ctx.symbols.insert_const(&def.name, value);
                    }
                    ConstInitVal::List(_) => {
                        return Err(ctx.error_at_span(
                            "Scalar const cannot be initialized with a list".to_string(),
                            def.span,
                        ))
                    }
                }
                continue;
            }

            // 常量数组需要真实存储
            let dims = eval_dims(&def.dims, ctx)?;
            let ty = array_type_from_dims(&dims);
            let elems = match &def.init {
                ConstInitVal::List(elems) => elems,
                ConstInitVal::Single(_) => {
                    return Err(ctx.error_at_span(
                        "Const array must be initialized with a list".to_string(),
                        def.span,
                    ))
                }
            };
            let values = flatten_const_init_list(elems, &dims, ctx)?;

            if ctx.current_func.is_none() {
                let init = global_array_init(&values, &dims, &ty, ctx);
                let global = ctx.program.new_value().global_alloc(init);
                let internal = ctx.symbols.insert_var(&def.name, ty, global, true);
                ctx.program
                    .set_value_name(global, Some(format!("@{}", internal)));
            } else {
                let alloc = ctx.dfg_mut()?.new_value().alloc(ty.clone());
                ctx.push_inst(alloc)?;
                let internal = ctx.symbols.insert_var(&def.name, ty, alloc, true);
                ctx.dfg_mut()?
                    .set_value_name(alloc, Some(format!("@{}", internal)));
                for (idx, v) in values.iter().enumerate() {
                    let value = ctx.dfg_mut()?.new_value().integer(*v);
                    let ptr = element_ptr(alloc, idx, &dims, ctx)?;
                    let store = ctx.dfg_mut()?.new_value().store(value, ptr);
                    ctx.push_inst(store)?;
                }
            }
        }
        Ok(())
    }
}

impl GenerateIR for VarDecl {
    type Output = ();

    fn generate_ir(&self, ctx: &mut IrContext) -> Result<Self::Output, CompilerError> {
        for def in &self.defs {
            let dims = eval_dims(&def.dims, ctx)?;

            if ctx.current_func.is_none() {
                // 全局变量：初始化必须折叠为常量
                if dims.is_empty() {
                    let init = match &def.init {
                        Some(InitVal::Single(expr)) => {
                            let v = eval_const(expr, ctx)?;
                            ctx.program.new_value().integer(v)
                        }
                        Some(InitVal::List(_)) => {
                            return Err(ctx.error_at_span(
                                "Scalar variable cannot be initialized with a list".to_string(),
                                def.span,
                            ))
                        }
                        None => ctx.program.new_value().zero_init(Type::get_i32()),
                    };
                    let global = ctx.program.new_value().global_alloc(init);
                    let internal =
                        ctx.symbols
                            .insert_var(&def.name, Type::get_i32(), global, false);
                    ctx.program
                        .set_value_name(global, Some(format!("@{}", internal)));
                } else {
                    let ty = array_type_from_dims(&dims);
                    let init = match &def.init {
                        Some(InitVal::List(elems)) => {
                            let flat = flatten_init_list(elems, &dims, ctx)?;
                            let mut values = Vec::with_capacity(flat.len());
                            for elem in flat {
                                values.push(match elem {
                                    Some(expr) => eval_const(&expr, ctx)?,
                                    None => 0,
                                });
                            }
                            global_array_init(&values, &dims, &ty, ctx)
                        }
                        Some(InitVal::Single(_)) => {
                            return Err(ctx.error_at_span(
                                "Global array must be initialized with a list".to_string(),
                                def.span,
                            ))
                        }
                        None => ctx.program.new_value().zero_init(ty.clone()),
                    };
                    let global = ctx.program.new_value().global_alloc(init);
                    let internal = ctx.symbols.insert_var(&def.name, ty, global, false);
                    ctx.program
                        .set_value_name(global, Some(format!("@{}", internal)));
                }
                continue;
            }

            // 局部变量
            if dims.is_empty() {
                let alloc = ctx.dfg_mut()?.new_value().alloc(Type::get_i32());
                ctx.push_inst(alloc)?;
                let internal = ctx
                    .symbols
                    .insert_var(&def.name, Type::get_i32(), alloc, false);
                ctx.dfg_mut()?
                    .set_value_name(alloc, Some(format!("@{}", internal)));
                match &def.init {
                    Some(InitVal::Single(expr)) => {
                        let value = expr.generate_ir(ctx)?;
                        let store = ctx.dfg_mut()?.new_value().store(value, alloc);
                        ctx.push_inst(store)?;
                    }
                    Some(InitVal::List(_)) => {
                        return Err(ctx.error_at_span(
                            "Scalar variable cannot be initialized with a list".to_string(),
                            def.span,
                        ))
                    }
                    None => {}
                }
            } else {
                let ty = array_type_from_dims(&dims);
                let alloc = ctx.dfg_mut()?.new_value().alloc(ty.clone());
                ctx.push_inst(alloc)?;
                let internal = ctx.symbols.insert_var(&def.name, ty, alloc, false);
                ctx.dfg_mut()?
                    .set_value_name(alloc, Some(format!("@{}", internal)));
                match &def.init {
                    Some(InitVal::List(elems)) => {
                        let flat = flatten_init_list(elems, &dims, ctx)?;
                        for (idx, elem) in flat.iter().enumerate() {
                            let value = match elem {
                                Some(expr) => expr.generate_ir(ctx)?,
                                None => ctx.dfg_mut()?.new_value().integer(0),
                            };
                            let ptr = element_ptr(alloc, idx, &dims, ctx)?;
                            let store = ctx.dfg_mut()?.new_value().store(value, ptr);
                            ctx.push_inst(store)?;
                        }
                    }
                    Some(InitVal::Single(_)) => {
                        return Err(ctx.error_at_span(
                            "Local array must be initialized with a list".to_string(),
                            def.span,
                        ))
                    }
                    None => {}
                }
            }
        }
        Ok(())
    }
}

fn product(dims: &[usize]) -> usize {
    dims.iter().product()
}

/// 求数组各维长度，必须是非负常量
fn eval_dims(dims: &[Expr], ctx: &IrContext) -> Result<Vec<usize>, CompilerError> {
    let mut out = Vec::with_capacity(dims.len());
    for expr in dims {
        let v = eval_const(expr, ctx)?;
        if v < 0 {
            return Err(ctx.error_at_span(
                "Array dimension must be non-negative".to_string(),
                expr.span(),
            ));
        }
        out.push(v as usize);
    }
    Ok(out)
}

/// `[d1][d2]…[dn]` 的 i32 数组类型，自内向外构造
pub(crate) fn array_type_from_dims(dims: &[usize]) -> Type {
    let mut ty = Type::get_i32();
    for dim in dims.iter().rev() {
        ty = Type::get_array(ty, *dim);
    }
    ty
}

/// 数组形参类型：标量形参为 i32，数组形参为指向剩余维度的指针
pub(crate) fn param_type(param: &FuncFParam, ctx: &IrContext) -> Result<Type, CompilerError> {
    if !param.is_array {
        return Ok(Type::get_i32());
    }
    let dims = eval_dims(&param.dims, ctx)?;
    Ok(Type::get_pointer(array_type_from_dims(&dims)))
}

/// 初始化列表与维度边界对齐：从最外层的子数组往里找，
/// 取块大小能整除 filled 的最大尾部子维度。
/// 没有任何子维度对齐时，该列表在语义上非法。
fn pick_aligned_sub_dims(filled: usize, dims: &[usize]) -> Option<&[usize]> {
    (1..dims.len())
        .map(|k| &dims[k..])
        .find(|sub| filled % product(sub) == 0)
}

/// 把嵌套初始化列表按声明维度拍平成定长元素序列，空位用 None 占住。
/// 超出总长的元素按原实现直接截断。
fn flatten_init_exprs<T>(
    elems: &[T],
    dims: &[usize],
    as_single: &dyn Fn(&T) -> Option<&Expr>,
    as_list: &dyn Fn(&T) -> Option<&[T]>,
    out: &mut Vec<Option<Expr>>,
) -> Result<(), CompilerError> {
    let total = product(dims);
    let base = out.len();
    for elem in elems {
        if out.len() - base >= total {
            break;
        }
        if let Some(expr) = as_single(elem) {
            out.push(Some(expr.clone()));
        } else if let Some(list) = as_list(elem) {
            let filled = out.len() - base;
            let sub_dims = pick_aligned_sub_dims(filled, dims).ok_or_else(|| {
                CompilerError::semantic("Initializer list is not aligned with array dimensions")
            })?;
            flatten_init_exprs(list, sub_dims, as_single, as_list, out)?;
        }
    }
    while out.len() - base < total {
        out.push(None);
    }
    Ok(())
}

/// 变量初始化列表 → 定长的表达式序列
pub(crate) fn flatten_init_list(
    elems: &[InitVal],
    dims: &[usize],
    ctx: &IrContext,
) -> Result<Vec<Option<Expr>>, CompilerError> {
    if dims.is_empty() {
        return Err(CompilerError::semantic(
            "Braces around scalar initializer are not allowed",
        ));
    }
    let mut out = Vec::with_capacity(product(dims));
    flatten_init_exprs(
        elems,
        dims,
        &|e| match e {
            InitVal::Single(expr) => Some(expr),
            InitVal::List(_) => None,
        },
        &|e| match e {
            InitVal::Single(_) => None,
            InitVal::List(list) => Some(list.as_slice()),
        },
        &mut out,
    )?;
    Ok(out)
}

/// 常量初始化列表 → 定长的整数序列，元素就地求值
pub(crate) fn flatten_const_init_list(
    elems: &[ConstInitVal],
    dims: &[usize],
    ctx: &IrContext,
) -> Result<Vec<i32>, CompilerError> {
    if dims.is_empty() {
        return Err(CompilerError::semantic(
            "Braces around scalar initializer are not allowed",
        ));
    }
    let mut exprs = Vec::with_capacity(product(dims));
    flatten_init_exprs(
        elems,
        dims,
        &|e| match e {
            ConstInitVal::Single(expr) => Some(expr),
            ConstInitVal::List(_) => None,
        },
        &|e| match e {
            ConstInitVal::Single(_) => None,
            ConstInitVal::List(list) => Some(list.as_slice()),
        },
        &mut exprs,
    )?;
    let mut values = Vec::with_capacity(exprs.len());
    for expr in exprs {
        values.push(match expr {
            Some(expr) => eval_const(&expr, ctx)?,
            None => 0,
        });
    }
    Ok(values)
}

/// 线性下标 → 各维下标
fn linear_to_indices(mut idx: usize, dims: &[usize]) -> Vec<usize> {
    let mut indices = Vec::with_capacity(dims.len());
    for i in 0..dims.len() {
        let stride = product(&dims[i + 1..]).max(1);
        indices.push(idx / stride);
        idx %= stride;
    }
    indices
}

/// 沿各维下标生成 getelemptr 链，返回指向第 idx 个元素的指针
pub(crate) fn element_ptr(
    base: Value,
    flat_idx: usize,
    dims: &[usize],
    ctx: &mut IrContext,
) -> Result<Value, CompilerError> {
    let mut ptr = base;
    for index in linear_to_indices(flat_idx, dims) {
        let idx_val = ctx.dfg_mut()?.new_value().integer(index as i32);
        let next = ctx.dfg_mut()?.new_value().get_elem_ptr(ptr, idx_val);
        ctx.push_inst(next)?;
        ptr = next;
    }
    Ok(ptr)
}

/// 全局数组的初始化值：全零时用 zeroinit，否则按维度构造聚合
fn global_array_init(flat: &[i32], dims: &[usize], ty: &Type, ctx: &mut IrContext) -> Value {
    if flat.iter().all(|v| *v == 0) {
        ctx.program.new_value().zero_init(ty.clone())
    } else {
        build_aggregate(flat, dims, ctx)
    }
}

fn build_aggregate(flat: &[i32], dims: &[usize], ctx: &mut IrContext) -> Value {
    if dims.len() == 1 {
        let values: Vec<Value> = flat
            .iter()
            .map(|v| ctx.program.new_value().integer(*v))
            .collect();
        return ctx.program.new_value().aggregate(values);
    }
    let sub_size = product(&dims[1..]);
    let mut elems = Vec::with_capacity(dims[0]);
    for i in 0..dims[0] {
        let sub = build_aggregate(&flat[i * sub_size..(i + 1) * sub_size], &dims[1..], ctx);
        elems.push(sub);
    }
    ctx.program.new_value().aggregate(elems)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(n: i32) -> InitVal {
        InitVal::Single(Expr::IntLiteral(n, Span::default()))
    }

    fn list(elems: Vec<InitVal>) -> InitVal {
        InitVal::List(elems)
    }

    fn flat_values(elems: &[InitVal], dims: &[usize]) -> Result<Vec<i32>, CompilerError> {
        let ctx = IrContext::new(None);
        let flat = flatten_init_list(elems, dims, &ctx)?;
        Ok(flat
            .into_iter()
            .map(|e| match e {
                Some(Expr::IntLiteral(n, _)) => n,
                Some(_) => panic!("non-literal element"),
                None => 0,
            })
            .collect())
    }

    #[test]
    fn picks_largest_aligned_sub_dims() {
        let dims = [2, 3, 4];
        // 起始位置对齐到最外层的子数组
        assert_eq!(pick_aligned_sub_dims(0, &dims), Some(&dims[1..]));
        assert_eq!(pick_aligned_sub_dims(12, &dims), Some(&dims[1..]));
        // 只对齐到最内层
        assert_eq!(pick_aligned_sub_dims(4, &dims), Some(&dims[2..]));
        // 完全不对齐
        assert_eq!(pick_aligned_sub_dims(5, &dims), None);
    }

    #[test]
    fn flattens_flat_list_with_padding() {
        let elems = vec![lit(1), lit(2), lit(3)];
        assert_eq!(flat_values(&elems, &[2, 2]).unwrap(), vec![1, 2, 3, 0]);
    }

    #[test]
    fn flattens_nested_rows() {
        // {{1}, {2}} 按 [2][2]：每个子列表补齐一行
        let elems = vec![list(vec![lit(1)]), list(vec![lit(2)])];
        assert_eq!(flat_values(&elems, &[2, 2]).unwrap(), vec![1, 0, 2, 0]);
    }

    #[test]
    fn nested_list_after_full_row_starts_next_row() {
        // {1, 2, {3}} 按 [2][2]：{3} 对齐到第二行
        let elems = vec![lit(1), lit(2), list(vec![lit(3)])];
        assert_eq!(flat_values(&elems, &[2, 2]).unwrap(), vec![1, 2, 3, 0]);
    }

    #[test]
    fn misaligned_nested_list_is_rejected() {
        // {1, {2}} 按 [2][2]：已填 1 个元素，没有任何子维度边界对齐
        let elems = vec![lit(1), list(vec![lit(2)])];
        assert!(flat_values(&elems, &[2, 2]).is_err());
    }

    #[test]
    fn deep_shape_mixes_scalars_and_rows() {
        // {1, 2, 3, 4, {5}} 按 [2][2][2]：{5} 对齐到第二个 [2][2] 子数组
        let elems = vec![lit(1), lit(2), lit(3), lit(4), list(vec![lit(5)])];
        assert_eq!(
            flat_values(&elems, &[2, 2, 2]).unwrap(),
            vec![1, 2, 3, 4, 5, 0, 0, 0]
        );
    }

    #[test]
    fn linear_index_round_trip() {
        assert_eq!(linear_to_indices(0, &[2, 3]), vec![0, 0]);
        assert_eq!(linear_to_indices(4, &[2, 3]), vec![1, 1]);
        assert_eq!(linear_to_indices(5, &[2, 3]), vec![1, 2]);
        assert_eq!(linear_to_indices(7, &[2, 2, 2]), vec![1, 1, 1]);
    }

    #[test]
    fn array_types_nest_inner_first() {
        let ty = array_type_from_dims(&[2, 3]);
        assert_eq!(format!("{}", ty), "[[i32, 3], 2]");
    }
}
