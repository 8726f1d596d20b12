use crate::front::ast::*;
use crate::front::ir::IrContext;
use crate::front::symtab::{Symbol, SymbolTable};
use crate::CompilerError;

/// 表达式的机会式编译期求值。
///
/// 能折叠则返回折叠出的整数，否则返回 None，由调用方退回运行期求值。
/// 溢出按 32 位补码回绕；除零、模零视为不可折叠，留给运行期。
/// 数组左值（无论是否带下标）和函数调用一律不折叠。
pub fn inline_number(expr: &Expr, symbols: &SymbolTable) -> Option<i32> {
    match expr {
        Expr::IntLiteral(n, _) => Some(*n),
        Expr::LVal(lval) => {
            if !lval.indices.is_empty() {
                return None;
            }
            match symbols.lookup(&lval.name)? {
                Symbol::Const { value, .. } => Some(*value),
                _ => None,
            }
        }
        Expr::UnaryOp(op, operand, _) => {
            let v = inline_number(operand, symbols)?;
            Some(match op {
                UnaryOp::Plus => v,
                UnaryOp::Minus => v.wrapping_neg(),
                UnaryOp::Not => (v == 0) as i32,
            })
        }
        Expr::BinaryOp(op, lhs, rhs, _) => {
            let l = inline_number(lhs, symbols)?;
            let r = inline_number(rhs, symbols)?;
            match op {
                BinaryOp::Add => Some(l.wrapping_add(r)),
                BinaryOp::Sub => Some(l.wrapping_sub(r)),
                BinaryOp::Mul => Some(l.wrapping_mul(r)),
                BinaryOp::Div => (r != 0).then(|| l.wrapping_div(r)),
                BinaryOp::Mod => (r != 0).then(|| l.wrapping_rem(r)),
            }
        }
        Expr::RelOp(op, lhs, rhs, _) => {
            let l = inline_number(lhs, symbols)?;
            let r = inline_number(rhs, symbols)?;
            let result = match op {
                RelOp::Lt => l < r,
                RelOp::Gt => l > r,
                RelOp::Le => l <= r,
                RelOp::Ge => l >= r,
            };
            Some(result as i32)
        }
        Expr::EqOp(op, lhs, rhs, _) => {
            let l = inline_number(lhs, symbols)?;
            let r = inline_number(rhs, symbols)?;
            let result = match op {
                EqOp::Eq => l == r,
                EqOp::Ne => l != r,
            };
            Some(result as i32)
        }
        Expr::LAndOp(_, lhs, rhs, _) => {
            let l = inline_number(lhs, symbols)?;
            if l == 0 {
                // 短路：右侧不参与求值
                return Some(0);
            }
            let r = inline_number(rhs, symbols)?;
            Some((r != 0) as i32)
        }
        Expr::LOrOp(_, lhs, rhs, _) => {
            let l = inline_number(lhs, symbols)?;
            if l != 0 {
                // 短路：右侧不参与求值
                return Some(1);
            }
            let r = inline_number(rhs, symbols)?;
            Some((r != 0) as i32)
        }
        Expr::Call(..) => None,
    }
}

/// 必须是常量表达式的场合：数组维度、常量定义、全局变量初始化。
///
/// 与 [`inline_number`] 的区别在于失败即语义错误，要把原因报告出来。
pub fn eval_const(expr: &Expr, ctx: &IrContext) -> Result<i32, CompilerError> {
    match expr {
        Expr::IntLiteral(n, _) => Ok(*n),
        Expr::LVal(lval) => {
            if !lval.indices.is_empty() {
                return Err(ctx.error_at_span(
                    "Array element access is not allowed in constant expressions".to_string(),
                    lval.span,
                ));
            }
            match ctx.symbols.lookup(&lval.name) {
                Some(Symbol::Const { value, .. }) => Ok(*value),
                Some(_) => Err(ctx.error_at_span(
                    format!("`{}` is not a constant", lval.name),
                    lval.span,
                )),
                None => Err(ctx.error_at_span(
                    format!("`{}` not found in constant expression", lval.name),
                    lval.span,
                )),
            }
        }
        Expr::UnaryOp(op, operand, _) => {
            let v = eval_const(operand, ctx)?;
            Ok(match op {
                UnaryOp::Plus => v,
                UnaryOp::Minus => v.wrapping_neg(),
                UnaryOp::Not => (v == 0) as i32,
            })
        }
        Expr::BinaryOp(op, lhs, rhs, span) => {
            let l = eval_const(lhs, ctx)?;
            let r = eval_const(rhs, ctx)?;
            match op {
                BinaryOp::Add => Ok(l.wrapping_add(r)),
                BinaryOp::Sub => Ok(l.wrapping_sub(r)),
                BinaryOp::Mul => Ok(l.wrapping_mul(r)),
                BinaryOp::Div => {
                    if r == 0 {
                        return Err(ctx.error_at_span(
                            "Division by zero in constant expression".to_string(),
                            *span,
                        ));
                    }
                    Ok(l.wrapping_div(r))
                }
                BinaryOp::Mod => {
                    if r == 0 {
                        return Err(ctx.error_at_span(
                            "Modulo by zero in constant expression".to_string(),
                            *span,
                        ));
                    }
                    Ok(l.wrapping_rem(r))
                }
            }
        }
        Expr::RelOp(op, lhs, rhs, _) => {
            let l = eval_const(lhs, ctx)?;
            let r = eval_const(rhs, ctx)?;
            let result = match op {
                RelOp::Lt => l < r,
                RelOp::Gt => l > r,
                RelOp::Le => l <= r,
                RelOp::Ge => l >= r,
            };
            Ok(result as i32)
        }
        Expr::EqOp(op, lhs, rhs, _) => {
            let l = eval_const(lhs, ctx)?;
            let r = eval_const(rhs, ctx)?;
            let result = match op {
                EqOp::Eq => l == r,
                EqOp::Ne => l != r,
            };
            Ok(result as i32)
        }
        Expr::LAndOp(_, lhs, rhs, _) => {
            let l = eval_const(lhs, ctx)?;
            if l == 0 {
                return Ok(0);
            }
            let r = eval_const(rhs, ctx)?;
            Ok((r != 0) as i32)
        }
        Expr::LOrOp(_, lhs, rhs, _) => {
            let l = eval_const(lhs, ctx)?;
            if l != 0 {
                return Ok(1);
            }
            let r = eval_const(rhs, ctx)?;
            Ok((r != 0) as i32)
        }
        Expr::Call(_, _, span) => Err(ctx.error_at_span(
            "Function calls are not allowed in constant expressions".to_string(),
            *span,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(n: i32) -> Expr {
        Expr::IntLiteral(n, Span::default())
    }

    fn binary(op: BinaryOp, l: Expr, r: Expr) -> Expr {
        Expr::BinaryOp(op, Box::new(l), Box::new(r), Span::default())
    }

    fn lval(name: &str) -> Expr {
        Expr::LVal(LVal {
            name: name.to_string(),
            indices: Vec::new(),
            span: Span::default(),
        })
    }

    #[test]
    fn folds_arithmetic_with_wrapping() {
        let symbols = SymbolTable::new();
        let e = binary(
            BinaryOp::Sub,
            binary(BinaryOp::Add, lit(1), binary(BinaryOp::Mul, lit(2), lit(3))),
            lit(4),
        );
        assert_eq!(inline_number(&e, &symbols), Some(3));

        let overflow = binary(BinaryOp::Add, lit(i32::MAX), lit(1));
        assert_eq!(inline_number(&overflow, &symbols), Some(i32::MIN));
    }

    #[test]
    fn division_by_zero_is_not_foldable() {
        let symbols = SymbolTable::new();
        assert_eq!(inline_number(&binary(BinaryOp::Div, lit(1), lit(0)), &symbols), None);
        assert_eq!(inline_number(&binary(BinaryOp::Mod, lit(1), lit(0)), &symbols), None);
    }

    #[test]
    fn logical_ops_short_circuit() {
        let symbols = SymbolTable::new();
        // 0 && (1/0)：左侧为假，右侧的除零不妨碍折叠
        let div0 = binary(BinaryOp::Div, lit(1), lit(0));
        let and = Expr::LAndOp(
            LAndOp::And,
            Box::new(lit(0)),
            Box::new(div0.clone()),
            Span::default(),
        );
        assert_eq!(inline_number(&and, &symbols), Some(0));

        let or = Expr::LOrOp(LOrOp::Or, Box::new(lit(5)), Box::new(div0), Span::default());
        assert_eq!(inline_number(&or, &symbols), Some(1));

        // 左侧为真则取决于右侧
        let and2 = Expr::LAndOp(
            LAndOp::And,
            Box::new(lit(2)),
            Box::new(lit(7)),
            Span::default(),
        );
        assert_eq!(inline_number(&and2, &symbols), Some(1));
    }

    #[test]
    fn constants_fold_but_variables_do_not() {
        let mut symbols = SymbolTable::new();
        symbols.insert_const("c", 42);
        assert_eq!(inline_number(&lval("c"), &symbols), Some(42));
        assert_eq!(inline_number(&lval("v"), &symbols), None);

        // 带下标的左值不折叠
        let indexed = Expr::LVal(LVal {
            name: "c".to_string(),
            indices: vec![lit(0)],
            span: Span::default(),
        });
        assert_eq!(inline_number(&indexed, &symbols), None);
    }

    #[test]
    fn calls_never_fold() {
        let symbols = SymbolTable::new();
        let call = Expr::Call("getint".to_string(), Vec::new(), Span::default());
        assert_eq!(inline_number(&call, &symbols), None);
    }
}
