//! # Expression Typing and Folding
//!
//! Pure expression typing against resolved names, plus constant folding for
//! the places the language demands constants: PARAMETER values, array
//! bounds, character lengths, kind selectors, CASE values, and DATA items.
//!
//! Typing here never reports diagnostics; it returns `None` for anything
//! unresolved or already in error. The expression checker in
//! `check_expressions` is the single place operand errors are reported, so
//! later passes can re-derive types without duplicating messages.

use chumsky::span::SimpleSpan;
use ferro_compiler_diagnostics::DiagnosticCode;
use ferro_compiler_parser::ast::{BinaryOp, Expr, Spanned, UnaryOp};

use crate::context::SemanticsContext;
use crate::scope::ScopeId;
use crate::symbol::SymbolDetails;
use crate::types::{ConstValue, TypeDesc};

/// Numeric promotion: REAL wins over INTEGER, larger kinds win within a
/// category
pub fn promote(lhs: TypeDesc, rhs: TypeDesc) -> Option<TypeDesc> {
    match (lhs, rhs) {
        (TypeDesc::Integer { kind: a }, TypeDesc::Integer { kind: b }) => {
            Some(TypeDesc::Integer { kind: a.max(b) })
        }
        (TypeDesc::Real { kind: a }, TypeDesc::Real { kind: b }) => {
            Some(TypeDesc::Real { kind: a.max(b) })
        }
        (TypeDesc::Real { kind }, TypeDesc::Integer { .. })
        | (TypeDesc::Integer { .. }, TypeDesc::Real { kind }) => Some(TypeDesc::Real { kind }),
        _ => None,
    }
}

/// Type of an expression, if it can be known
pub fn expr_type(ctx: &SemanticsContext, expr: &Spanned<Expr>) -> Option<TypeDesc> {
    match expr.value() {
        Expr::IntLiteral(_) => Some(TypeDesc::default_integer(&ctx.default_kinds)),
        Expr::RealLiteral(_) => Some(TypeDesc::default_real(&ctx.default_kinds)),
        Expr::LogicalLiteral(_) => Some(TypeDesc::default_logical(&ctx.default_kinds)),
        Expr::CharLiteral(s) => Some(TypeDesc::Character {
            len: s.chars().count() as u32,
        }),
        Expr::Named(name) | Expr::ArrayElement { name, .. } => {
            let id = ctx.ultimate(name.symbol?);
            ctx.symbol(id).type_desc().copied()
        }
        Expr::FunctionRef { name, args } => {
            let id = ctx.ultimate(name.symbol?);
            match &ctx.symbol(id).details {
                SymbolDetails::Intrinsic => {
                    let arg_types: Vec<Option<TypeDesc>> =
                        args.iter().map(|arg| expr_type(ctx, arg)).collect();
                    intrinsic_result_type(ctx, &ctx.symbol(id).name, &arg_types)
                }
                SymbolDetails::Subprogram(details) => {
                    let result = details.result?;
                    ctx.symbol(result).type_desc().copied()
                }
                _ => None,
            }
        }
        Expr::Unary { operand, .. } => expr_type(ctx, operand),
        Expr::Binary { op, lhs, rhs } => {
            let left = expr_type(ctx, lhs)?;
            let right = expr_type(ctx, rhs)?;
            match op {
                BinaryOp::Pow | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Add | BinaryOp::Sub => {
                    promote(left, right)
                }
                BinaryOp::Concat => match (left, right) {
                    (TypeDesc::Character { len: a }, TypeDesc::Character { len: b }) => {
                        Some(TypeDesc::Character { len: a + b })
                    }
                    _ => None,
                },
                BinaryOp::Lt
                | BinaryOp::Le
                | BinaryOp::Gt
                | BinaryOp::Ge
                | BinaryOp::Eq
                | BinaryOp::Ne
                | BinaryOp::And
                | BinaryOp::Or
                | BinaryOp::Eqv
                | BinaryOp::Neqv => Some(TypeDesc::default_logical(&ctx.default_kinds)),
            }
        }
        Expr::Paren(inner) => expr_type(ctx, inner),
    }
}

/// Rank of an expression; elements and scalars are rank zero, a bare array
/// name has the array's rank
pub fn expr_rank(ctx: &SemanticsContext, expr: &Spanned<Expr>) -> Option<usize> {
    match expr.value() {
        Expr::IntLiteral(_)
        | Expr::RealLiteral(_)
        | Expr::LogicalLiteral(_)
        | Expr::CharLiteral(_)
        | Expr::FunctionRef { .. }
        | Expr::ArrayElement { .. } => Some(0),
        Expr::Named(name) => {
            let id = ctx.ultimate(name.symbol?);
            Some(ctx.symbol(id).object().map_or(0, |details| details.rank()))
        }
        Expr::Unary { operand, .. } => expr_rank(ctx, operand),
        Expr::Binary { lhs, rhs, .. } => {
            let left = expr_rank(ctx, lhs)?;
            let right = expr_rank(ctx, rhs)?;
            Some(if left == 0 { right } else { left })
        }
        Expr::Paren(inner) => expr_rank(ctx, inner),
    }
}

/// Fold to a constant value. Reports division by zero; stays quiet about
/// everything else that merely fails to fold.
pub fn fold_constant(
    ctx: &mut SemanticsContext,
    scope: ScopeId,
    expr: &Spanned<Expr>,
) -> Option<ConstValue> {
    match expr.value() {
        Expr::IntLiteral(n) => Some(ConstValue::Int(*n)),
        Expr::RealLiteral(x) => Some(ConstValue::Real(*x)),
        Expr::LogicalLiteral(b) => Some(ConstValue::Logical(*b)),
        Expr::CharLiteral(s) => Some(ConstValue::Char(s.clone())),
        Expr::Named(name) => {
            let id = ctx.ultimate(name.symbol?);
            let symbol = ctx.symbol(id);
            if symbol.is_named_constant() {
                symbol.object().and_then(|details| details.value.clone())
            } else {
                None
            }
        }
        Expr::Unary { op, operand } => {
            let value = fold_constant(ctx, scope, operand)?;
            match (op, value) {
                (UnaryOp::Plus, value) => Some(value),
                (UnaryOp::Negate, ConstValue::Int(n)) => Some(ConstValue::Int(n.checked_neg()?)),
                (UnaryOp::Negate, ConstValue::Real(x)) => Some(ConstValue::Real(-x)),
                (UnaryOp::Not, ConstValue::Logical(b)) => Some(ConstValue::Logical(!b)),
                _ => None,
            }
        }
        Expr::Binary { op, lhs, rhs } => {
            let left = fold_constant(ctx, scope, lhs)?;
            let right = fold_constant(ctx, scope, rhs)?;
            fold_binary(ctx, *op, left, right, rhs.span())
        }
        Expr::Paren(inner) => fold_constant(ctx, scope, inner),
        Expr::FunctionRef { name, args } => {
            let id = ctx.ultimate(name.symbol?);
            if !matches!(ctx.symbol(id).details, SymbolDetails::Intrinsic) {
                return None;
            }
            let intrinsic_name = ctx.symbol(id).name.clone();
            fold_intrinsic(ctx, scope, &intrinsic_name, args)
        }
        Expr::ArrayElement { .. } => None,
    }
}

fn fold_binary(
    ctx: &mut SemanticsContext,
    op: BinaryOp,
    left: ConstValue,
    right: ConstValue,
    rhs_span: SimpleSpan<usize>,
) -> Option<ConstValue> {
    use ConstValue::{Char, Int, Logical, Real};
    match (op, left, right) {
        (BinaryOp::Add, Int(a), Int(b)) => Some(Int(a.checked_add(b)?)),
        (BinaryOp::Sub, Int(a), Int(b)) => Some(Int(a.checked_sub(b)?)),
        (BinaryOp::Mul, Int(a), Int(b)) => Some(Int(a.checked_mul(b)?)),
        (BinaryOp::Div, Int(a), Int(b)) => {
            if b == 0 {
                ctx.error(
                    DiagnosticCode::DivisionByZero,
                    "Division by zero".to_string(),
                    rhs_span,
                );
                None
            } else {
                Some(Int(a.checked_div(b)?))
            }
        }
        (BinaryOp::Pow, Int(a), Int(b)) => {
            if b < 0 {
                None
            } else {
                Some(Int(a.checked_pow(u32::try_from(b).ok()?)?))
            }
        }
        (
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Pow,
            left,
            right,
        ) => {
            let a = as_real(&left)?;
            let b = as_real(&right)?;
            let x = match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => {
                    if b == 0.0 {
                        ctx.error(
                            DiagnosticCode::DivisionByZero,
                            "Division by zero".to_string(),
                            rhs_span,
                        );
                        return None;
                    }
                    a / b
                }
                BinaryOp::Pow => a.powf(b),
                _ => unreachable!(),
            };
            Some(Real(x))
        }
        (BinaryOp::Concat, Char(a), Char(b)) => Some(Char(a + &b)),
        (BinaryOp::And, Logical(a), Logical(b)) => Some(Logical(a && b)),
        (BinaryOp::Or, Logical(a), Logical(b)) => Some(Logical(a || b)),
        (BinaryOp::Eqv, Logical(a), Logical(b)) => Some(Logical(a == b)),
        (BinaryOp::Neqv, Logical(a), Logical(b)) => Some(Logical(a != b)),
        (
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge | BinaryOp::Eq | BinaryOp::Ne,
            left,
            right,
        ) => {
            let ordering = match (&left, &right) {
                (Int(a), Int(b)) => a.partial_cmp(b),
                (Char(a), Char(b)) => a.partial_cmp(b),
                _ => as_real(&left)?.partial_cmp(&as_real(&right)?),
            }?;
            let result = match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Le => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                BinaryOp::Ge => ordering.is_ge(),
                BinaryOp::Eq => ordering.is_eq(),
                BinaryOp::Ne => ordering.is_ne(),
                _ => unreachable!(),
            };
            Some(Logical(result))
        }
        _ => None,
    }
}

fn as_real(value: &ConstValue) -> Option<f64> {
    match value {
        ConstValue::Int(n) => Some(*n as f64),
        ConstValue::Real(x) => Some(*x),
        _ => None,
    }
}

fn fold_intrinsic(
    ctx: &mut SemanticsContext,
    scope: ScopeId,
    name: &str,
    args: &[Spanned<Expr>],
) -> Option<ConstValue> {
    use ConstValue::{Int, Real};
    let fold_all = |ctx: &mut SemanticsContext| -> Option<Vec<ConstValue>> {
        args.iter().map(|arg| fold_constant(ctx, scope, arg)).collect()
    };
    match name {
        "abs" => match fold_all(ctx)?.as_slice() {
            [Int(n)] => Some(Int(n.checked_abs()?)),
            [Real(x)] => Some(Real(x.abs())),
            _ => None,
        },
        "max" | "min" => {
            let values = fold_all(ctx)?;
            if values.iter().all(|v| matches!(v, Int(_))) {
                let iter = values.iter().filter_map(ConstValue::as_int);
                if name == "max" {
                    iter.max().map(Int)
                } else {
                    iter.min().map(Int)
                }
            } else {
                let reals: Option<Vec<f64>> = values.iter().map(as_real).collect();
                let reals = reals?;
                let folded = reals
                    .into_iter()
                    .reduce(|a, b| if (name == "max") == (a > b) { a } else { b })?;
                Some(Real(folded))
            }
        }
        "mod" => match fold_all(ctx)?.as_slice() {
            [Int(a), Int(b)] => {
                if *b == 0 {
                    ctx.error(
                        DiagnosticCode::DivisionByZero,
                        "Division by zero".to_string(),
                        args[1].span(),
                    );
                    None
                } else {
                    Some(Int(a % b))
                }
            }
            _ => None,
        },
        "int" => match fold_all(ctx)?.as_slice() {
            [Int(n)] => Some(Int(*n)),
            [Real(x)] => Some(Int(x.trunc() as i64)),
            _ => None,
        },
        "real" => match fold_all(ctx)?.as_slice() {
            [Int(n)] => Some(Real(*n as f64)),
            [Real(x)] => Some(Real(*x)),
            _ => None,
        },
        "len" => match fold_all(ctx)?.as_slice() {
            [ConstValue::Char(s)] => Some(Int(s.chars().count() as i64)),
            _ => None,
        },
        "kind" => {
            let ty = expr_type(ctx, args.first()?)?;
            let kind = match ty {
                TypeDesc::Integer { kind }
                | TypeDesc::Real { kind }
                | TypeDesc::Logical { kind } => kind as i64,
                TypeDesc::Character { .. } => i64::from(ctx.default_kinds.character),
                TypeDesc::Derived(_) => return None,
            };
            Some(Int(kind))
        }
        _ => None,
    }
}

/// Fold an expression to an integer
pub fn fold_int_expr(
    ctx: &mut SemanticsContext,
    scope: ScopeId,
    expr: &Spanned<Expr>,
) -> Option<i64> {
    match fold_constant(ctx, scope, expr)? {
        ConstValue::Int(n) => Some(n),
        _ => None,
    }
}

// ===== Intrinsics =====

#[derive(Debug, Clone, Copy)]
pub struct IntrinsicInfo {
    pub name: &'static str,
    pub min_args: usize,
    /// None for unbounded argument lists
    pub max_args: Option<usize>,
}

pub const INTRINSICS: &[IntrinsicInfo] = &[
    IntrinsicInfo { name: "abs", min_args: 1, max_args: Some(1) },
    IntrinsicInfo { name: "int", min_args: 1, max_args: Some(1) },
    IntrinsicInfo { name: "kind", min_args: 1, max_args: Some(1) },
    IntrinsicInfo { name: "len", min_args: 1, max_args: Some(1) },
    IntrinsicInfo { name: "max", min_args: 2, max_args: None },
    IntrinsicInfo { name: "min", min_args: 2, max_args: None },
    IntrinsicInfo { name: "mod", min_args: 2, max_args: Some(2) },
    IntrinsicInfo { name: "real", min_args: 1, max_args: Some(1) },
    IntrinsicInfo { name: "sqrt", min_args: 1, max_args: Some(1) },
];

pub fn intrinsic(name: &str) -> Option<&'static IntrinsicInfo> {
    INTRINSICS.iter().find(|info| info.name == name)
}

/// Result type of an intrinsic reference given its argument types
pub fn intrinsic_result_type(
    ctx: &SemanticsContext,
    name: &str,
    arg_types: &[Option<TypeDesc>],
) -> Option<TypeDesc> {
    let first = || arg_types.first().copied().flatten();
    match name {
        "abs" => first(),
        "max" | "min" | "mod" => {
            let mut types = arg_types.iter().copied();
            let mut result = types.next()??;
            for ty in types {
                result = promote(result, ty?)?;
            }
            Some(result)
        }
        "sqrt" => match first() {
            Some(TypeDesc::Real { kind }) => Some(TypeDesc::Real { kind }),
            Some(TypeDesc::Integer { .. }) => Some(TypeDesc::default_real(&ctx.default_kinds)),
            _ => None,
        },
        "int" | "kind" | "len" => Some(TypeDesc::default_integer(&ctx.default_kinds)),
        "real" => Some(TypeDesc::default_real(&ctx.default_kinds)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::GLOBAL_SCOPE;
    use crate::symbol::{ObjectDetails, Symbol, SymbolDetails, SymbolFlags};
    use ferro_compiler_parser::ast::Name;

    fn spanned(expr: Expr) -> Spanned<Expr> {
        Spanned::new(expr, SimpleSpan::from(0..1))
    }

    fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Spanned<Expr> {
        spanned(Expr::Binary {
            op,
            lhs: Box::new(spanned(lhs)),
            rhs: Box::new(spanned(rhs)),
        })
    }

    #[test]
    fn test_promotion() {
        let int4 = TypeDesc::Integer { kind: 4 };
        let int8 = TypeDesc::Integer { kind: 8 };
        let real4 = TypeDesc::Real { kind: 4 };
        assert_eq!(promote(int4, int8), Some(int8));
        assert_eq!(promote(int8, real4), Some(real4));
        assert_eq!(
            promote(int4, TypeDesc::Character { len: 1 }),
            None
        );
    }

    #[test]
    fn test_fold_arithmetic() {
        let mut ctx = SemanticsContext::default();
        let expr = binary(
            BinaryOp::Add,
            Expr::IntLiteral(2),
            Expr::Binary {
                op: BinaryOp::Mul,
                lhs: Box::new(spanned(Expr::IntLiteral(3))),
                rhs: Box::new(spanned(Expr::IntLiteral(4))),
            },
        );
        assert_eq!(
            fold_constant(&mut ctx, GLOBAL_SCOPE, &expr),
            Some(ConstValue::Int(14))
        );
        assert!(ctx.sink().is_empty());
    }

    #[test]
    fn test_fold_division_by_zero_reports() {
        let mut ctx = SemanticsContext::default();
        let expr = binary(BinaryOp::Div, Expr::IntLiteral(1), Expr::IntLiteral(0));
        assert_eq!(fold_constant(&mut ctx, GLOBAL_SCOPE, &expr), None);
        assert!(ctx.any_fatal_error());
        assert!(ctx.sink().all()[0].message.contains("Division by zero"));
    }

    #[test]
    fn test_fold_named_constant() {
        let mut ctx = SemanticsContext::default();
        let id = ctx.new_symbol(
            Symbol::new(
                "n",
                GLOBAL_SCOPE,
                SimpleSpan::from(0..1),
                SymbolDetails::Object(ObjectDetails {
                    decl_type: Some(TypeDesc::Integer { kind: 4 }),
                    value: Some(ConstValue::Int(10)),
                    ..ObjectDetails::default()
                }),
            )
            .with_flags(SymbolFlags::PARAMETER),
        );
        let mut name = Name::new("n", SimpleSpan::from(0..1));
        name.symbol = Some(id);
        let expr = spanned(Expr::Named(name));
        assert_eq!(
            fold_constant(&mut ctx, GLOBAL_SCOPE, &expr),
            Some(ConstValue::Int(10))
        );
    }

    #[test]
    fn test_fold_intrinsics() {
        let mut ctx = SemanticsContext::default();
        let intrinsic_id = ctx.new_symbol(Symbol::new(
            "max",
            GLOBAL_SCOPE,
            SimpleSpan::from(0..1),
            SymbolDetails::Intrinsic,
        ));
        let mut name = Name::new("max", SimpleSpan::from(0..1));
        name.symbol = Some(intrinsic_id);
        let expr = spanned(Expr::FunctionRef {
            name,
            args: vec![
                spanned(Expr::IntLiteral(3)),
                spanned(Expr::IntLiteral(7)),
                spanned(Expr::IntLiteral(5)),
            ],
        });
        assert_eq!(
            fold_constant(&mut ctx, GLOBAL_SCOPE, &expr),
            Some(ConstValue::Int(7))
        );
    }

    #[test]
    fn test_concat_typing() {
        let ctx = SemanticsContext::default();
        let expr = binary(
            BinaryOp::Concat,
            Expr::CharLiteral("ab".to_string()),
            Expr::CharLiteral("cde".to_string()),
        );
        assert_eq!(
            expr_type(&ctx, &expr),
            Some(TypeDesc::Character { len: 5 })
        );
    }

    #[test]
    fn test_intrinsic_table() {
        assert!(intrinsic("sqrt").is_some());
        assert!(intrinsic("nonsense").is_none());
        let max = intrinsic("max").unwrap();
        assert_eq!(max.min_args, 2);
        assert_eq!(max.max_args, None);
    }
}
