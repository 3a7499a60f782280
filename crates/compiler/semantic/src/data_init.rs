//! # DATA Statement Compilation
//!
//! Expands the DATA statements recorded during name resolution into
//! per-object initializer images. Objects unroll to element slots in array
//! element order, values unroll through their repeat counts, and the two
//! sequences are paired off. Elements covered twice, values that cannot be
//! converted to the object's type, and objects that may not be initialized
//! at all are reported here. The surviving images land on the symbols as
//! `Initializer::Elements`, with `None` holes for uncovered elements.

use chumsky::span::SimpleSpan;
use ferro_compiler_parser::ast::{
    BinaryOp, DataImpliedDo, DataObject, DataSet, DataStmt, Expr, Spanned, SymbolId, UnaryOp,
    Variable,
};
use rustc_hash::FxHashMap;

use crate::context::{DeferredDataInit, IndexVarKind, SemanticsContext};
use crate::expr::{fold_constant, fold_int_expr};
use crate::scope::ScopeId;
use crate::symbol::{Initializer, SymbolDetails, SymbolFlags};
use crate::types::{self, describe_type, element_count, ConstValue, Extent};
use ferro_compiler_diagnostics::DiagnosticCode;

/// Initializer images being assembled, keyed by ultimate symbol
pub(crate) type ImageMap = FxHashMap<SymbolId, Image>;

pub(crate) struct Image {
    pub(crate) elements: Vec<Option<ConstValue>>,
}

/// One storage unit an object list entry expands to
struct Slot {
    symbol: SymbolId,
    element: u64,
    span: SimpleSpan<usize>,
}

/// Values bound to active implied DO variables, keyed by ultimate symbol
type Env = FxHashMap<SymbolId, i64>;

/// Compile every deferred DATA statement into initializer images and
/// attach them to the symbols. One image map spans all statements, so an
/// element initialized by two different DATA statements is caught here.
pub fn compile_data_initializations(ctx: &mut SemanticsContext) -> bool {
    let deferred = ctx.take_deferred_data();
    compile_items(ctx, &deferred);
    !ctx.any_fatal_error()
}

/// Expand a batch of deferred DATA statements against one image map and
/// attach the results. Module file reading compiles its own batch through
/// here, separate from the user program's.
pub(crate) fn compile_items(ctx: &mut SemanticsContext, items: &[DeferredDataInit]) {
    let mut images = ImageMap::default();
    for init in items {
        expand_data_stmt(ctx, init.scope, &init.data, &mut images);
    }
    apply_images(ctx, images);
}

pub(crate) fn expand_data_stmt(
    ctx: &mut SemanticsContext,
    scope: ScopeId,
    data: &DataStmt,
    images: &mut ImageMap,
) {
    for set in &data.sets {
        expand_data_set(ctx, scope, set, images);
    }
}

fn expand_data_set(
    ctx: &mut SemanticsContext,
    scope: ScopeId,
    set: &DataSet,
    images: &mut ImageMap,
) {
    let mut env = Env::default();
    let mut slots = Vec::new();
    let mut objects_ok = true;
    for object in &set.objects {
        objects_ok &= expand_object(ctx, scope, &mut env, object, &mut slots);
    }
    let Some(values) = expand_values(ctx, scope, set) else {
        return;
    };
    if !objects_ok {
        return;
    }
    use std::cmp::Ordering;
    match slots.len().cmp(&values.len()) {
        Ordering::Less => ctx.error(
            DiagnosticCode::InvalidDataStatement,
            "DATA statement set has more values than objects".to_string(),
            set.span,
        ),
        Ordering::Greater => ctx.error(
            DiagnosticCode::InvalidDataStatement,
            "DATA statement set has more objects than values".to_string(),
            set.span,
        ),
        Ordering::Equal => {
            for (slot, (value, value_span)) in slots.iter().zip(values) {
                assign_slot(ctx, images, slot, value, value_span);
            }
        }
    }
}

fn expand_object(
    ctx: &mut SemanticsContext,
    scope: ScopeId,
    env: &mut Env,
    object: &DataObject,
    slots: &mut Vec<Slot>,
) -> bool {
    match object {
        DataObject::Variable(variable) => expand_variable(ctx, scope, env, variable, slots),
        DataObject::ImpliedDo(implied) => expand_implied_do(ctx, scope, env, implied, slots),
    }
}

fn expand_variable(
    ctx: &mut SemanticsContext,
    scope: ScopeId,
    env: &Env,
    variable: &Variable,
    slots: &mut Vec<Slot>,
) -> bool {
    let name = variable.name.as_str();
    let Some(id) = variable.name.symbol else {
        return false;
    };
    if matches!(ctx.symbol(id).details, SymbolDetails::Use { .. }) {
        ctx.error(
            DiagnosticCode::InvalidDataStatement,
            format!("USE-associated name '{name}' must not be initialized in a DATA statement"),
            variable.name.span,
        );
        return false;
    }
    let ultimate = ctx.ultimate(id);
    let symbol = ctx.symbol(ultimate);
    let flags = symbol.flags;
    let named_constant = symbol.is_named_constant();
    let shape = symbol.object().map(|object| object.shape.clone());
    if flags.contains(SymbolFlags::DUMMY) {
        ctx.error(
            DiagnosticCode::InvalidDataStatement,
            format!("Dummy argument '{name}' must not be initialized in a DATA statement"),
            variable.name.span,
        );
        return false;
    }
    if flags.contains(SymbolFlags::FUNCTION_RESULT) {
        ctx.error(
            DiagnosticCode::InvalidDataStatement,
            format!("Function result '{name}' must not be initialized in a DATA statement"),
            variable.name.span,
        );
        return false;
    }
    if named_constant {
        ctx.error(
            DiagnosticCode::InvalidDataStatement,
            format!("Named constant '{name}' must not be initialized in a DATA statement"),
            variable.name.span,
        );
        return false;
    }
    let Some(shape) = shape else {
        ctx.error(
            DiagnosticCode::InvalidDataStatement,
            format!("'{name}' may not appear in a DATA statement"),
            variable.name.span,
        );
        return false;
    };
    if ctx.has_error(ultimate) {
        return false;
    }
    match &variable.subscripts {
        Some(subscripts) => {
            if subscripts.len() != shape.len() {
                ctx.error(
                    DiagnosticCode::InvalidSubscript,
                    format!(
                        "Reference to '{name}' has {} subscripts but rank is {}",
                        subscripts.len(),
                        shape.len()
                    ),
                    variable.span,
                );
                return false;
            }
            let mut indexes = Vec::with_capacity(subscripts.len());
            for subscript in subscripts {
                match eval_int(ctx, scope, env, subscript) {
                    Some(index) => indexes.push(index),
                    None => {
                        ctx.error(
                            DiagnosticCode::NonConstantExpression,
                            "DATA subscript must be a constant expression".to_string(),
                            subscript.span(),
                        );
                        return false;
                    }
                }
            }
            match linear_index(&shape, &indexes) {
                Some(element) => {
                    slots.push(Slot {
                        symbol: ultimate,
                        element,
                        span: variable.span,
                    });
                    true
                }
                None => {
                    ctx.error(
                        DiagnosticCode::InvalidDataStatement,
                        format!("DATA object subscript is out of range for '{name}'"),
                        variable.span,
                    );
                    false
                }
            }
        }
        None => {
            let count = if shape.is_empty() {
                1
            } else {
                element_count(&shape)
            };
            for element in 0..count {
                slots.push(Slot {
                    symbol: ultimate,
                    element,
                    span: variable.span,
                });
            }
            true
        }
    }
}

/// Element offset of a subscripted reference, in array element order
fn linear_index(shape: &[Extent], indexes: &[i64]) -> Option<u64> {
    let mut element: u64 = 0;
    let mut stride: u64 = 1;
    for (extent, &index) in shape.iter().zip(indexes) {
        if index < extent.lower || index > extent.upper {
            return None;
        }
        element += (index - extent.lower) as u64 * stride;
        stride *= extent.count();
    }
    Some(element)
}

fn expand_implied_do(
    ctx: &mut SemanticsContext,
    scope: ScopeId,
    env: &mut Env,
    implied: &DataImpliedDo,
    slots: &mut Vec<Slot>,
) -> bool {
    let Some(id) = implied.var.symbol else {
        return false;
    };
    let ultimate = ctx.ultimate(id);
    let symbol = ctx.symbol(ultimate);
    let usable = match symbol.object() {
        Some(object) if !symbol.is_named_constant() => {
            object.rank() == 0 && object.decl_type.map_or(true, |ty| ty.is_integer())
        }
        _ => false,
    };
    if !usable {
        ctx.error(
            DiagnosticCode::InvalidDataStatement,
            format!(
                "Implied DO variable '{}' must be a scalar integer",
                implied.var.as_str()
            ),
            implied.var.span,
        );
        return false;
    }
    ctx.activate_index_var(id, IndexVarKind::ImpliedDo, implied.span);
    let result = run_implied_do(ctx, scope, env, ultimate, implied, slots);
    env.remove(&ultimate);
    ctx.deactivate_index_var(id, implied.span);
    result
}

fn run_implied_do(
    ctx: &mut SemanticsContext,
    scope: ScopeId,
    env: &mut Env,
    var: SymbolId,
    implied: &DataImpliedDo,
    slots: &mut Vec<Slot>,
) -> bool {
    let bounds = (|| {
        let lower = eval_int(ctx, scope, env, &implied.lower)?;
        let upper = eval_int(ctx, scope, env, &implied.upper)?;
        let step = match &implied.step {
            Some(step) => eval_int(ctx, scope, env, step)?,
            None => 1,
        };
        Some((lower, upper, step))
    })();
    let Some((lower, upper, step)) = bounds else {
        ctx.error(
            DiagnosticCode::NonConstantExpression,
            "Implied DO bounds must be constant expressions".to_string(),
            implied.span,
        );
        return false;
    };
    if step == 0 {
        ctx.error(
            DiagnosticCode::InvalidDataStatement,
            "Implied DO step must not be zero".to_string(),
            implied.span,
        );
        return false;
    }
    let mut ok = true;
    let mut index = lower;
    while (step > 0 && index <= upper) || (step < 0 && index >= upper) {
        env.insert(var, index);
        for object in &implied.objects {
            ok &= expand_object(ctx, scope, env, object, slots);
        }
        match index.checked_add(step) {
            Some(next) => index = next,
            None => break,
        }
    }
    ok
}

/// Evaluate a subscript or bound, looking through active implied DO
/// variables before trying ordinary constant folding
fn eval_int(
    ctx: &mut SemanticsContext,
    scope: ScopeId,
    env: &Env,
    expr: &Spanned<Expr>,
) -> Option<i64> {
    match expr.value() {
        Expr::IntLiteral(n) => Some(*n),
        Expr::Named(name) => {
            if let Some(id) = name.symbol {
                if let Some(&value) = env.get(&ctx.ultimate(id)) {
                    return Some(value);
                }
            }
            fold_int_expr(ctx, scope, expr)
        }
        Expr::Paren(inner) => eval_int(ctx, scope, env, inner),
        Expr::Unary {
            op: UnaryOp::Plus,
            operand,
        } => eval_int(ctx, scope, env, operand),
        Expr::Unary {
            op: UnaryOp::Negate,
            operand,
        } => eval_int(ctx, scope, env, operand)?.checked_neg(),
        Expr::Binary {
            op: op @ (BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div),
            lhs,
            rhs,
        } => {
            let lhs = eval_int(ctx, scope, env, lhs)?;
            let rhs = eval_int(ctx, scope, env, rhs)?;
            match op {
                BinaryOp::Add => lhs.checked_add(rhs),
                BinaryOp::Sub => lhs.checked_sub(rhs),
                BinaryOp::Mul => lhs.checked_mul(rhs),
                BinaryOp::Div if rhs != 0 => lhs.checked_div(rhs),
                _ => None,
            }
        }
        _ => fold_int_expr(ctx, scope, expr),
    }
}

/// Unroll the value list through repeat counts into `(value, span)` pairs
fn expand_values(
    ctx: &mut SemanticsContext,
    scope: ScopeId,
    set: &DataSet,
) -> Option<Vec<(ConstValue, SimpleSpan<usize>)>> {
    let mut out = Vec::new();
    let mut ok = true;
    for value in &set.values {
        let repeat = match &value.repeat {
            Some(expr) => match fold_int_expr(ctx, scope, expr) {
                Some(n) if n < 0 => {
                    ctx.error(
                        DiagnosticCode::InvalidDataStatement,
                        format!("Repeat count ({n}) must not be negative"),
                        expr.span(),
                    );
                    ok = false;
                    continue;
                }
                Some(n) => n as u64,
                None => {
                    ctx.error(
                        DiagnosticCode::NonConstantExpression,
                        "Repeat count must be a constant expression".to_string(),
                        expr.span(),
                    );
                    ok = false;
                    continue;
                }
            },
            None => 1,
        };
        let Some(folded) = fold_constant(ctx, scope, &value.value) else {
            ctx.error(
                DiagnosticCode::NonConstantExpression,
                "DATA value must be a constant expression".to_string(),
                value.value.span(),
            );
            ok = false;
            continue;
        };
        for _ in 0..repeat {
            out.push((folded.clone(), value.value.span()));
        }
    }
    ok.then_some(out)
}

/// Convert one value to its slot's type and place it in the image
fn assign_slot(
    ctx: &mut SemanticsContext,
    images: &mut ImageMap,
    slot: &Slot,
    value: ConstValue,
    value_span: SimpleSpan<usize>,
) {
    let symbol = ctx.symbol(slot.symbol);
    let name = symbol.name.clone();
    let Some(object) = symbol.object() else { return };
    let already_initialized = object.init.is_some();
    let decl_type = object.decl_type;
    let count = if object.shape.is_empty() {
        1
    } else {
        element_count(&object.shape)
    };
    if already_initialized {
        ctx.error(
            DiagnosticCode::InvalidDataStatement,
            format!("'{name}' is initialized more than once"),
            slot.span,
        );
        return;
    }
    let Some(decl_type) = decl_type else { return };
    let Some(converted) = types::convert_constant(value, &decl_type) else {
        let shown = describe_type(&decl_type, &ctx.symbols);
        ctx.error(
            DiagnosticCode::TypeMismatch,
            format!("DATA value cannot be converted to the type {shown} of '{name}'"),
            value_span,
        );
        return;
    };
    let image = images.entry(slot.symbol).or_insert_with(|| Image {
        elements: vec![None; count as usize],
    });
    let element = slot.element as usize;
    if image.elements[element].is_some() {
        ctx.error(
            DiagnosticCode::InvalidDataStatement,
            format!("'{name}' is initialized more than once"),
            slot.span,
        );
        return;
    }
    image.elements[element] = Some(converted);
}

/// Attach the finished images to their symbols
fn apply_images(ctx: &mut SemanticsContext, images: ImageMap) {
    for (id, image) in images {
        if image.elements.iter().all(Option::is_none) {
            continue;
        }
        let scalar = ctx
            .symbol(id)
            .object()
            .map_or(false, |object| object.shape.is_empty());
        let init = if scalar {
            match image.elements.into_iter().next().flatten() {
                Some(value) => Initializer::Scalar(value),
                None => continue,
            }
        } else {
            Initializer::Elements(image.elements)
        };
        let symbol = ctx.symbol_mut(id);
        symbol.flags |= SymbolFlags::DATA_INIT;
        if let Some(object) = symbol.object_mut() {
            object.init = Some(init);
        }
    }
}
