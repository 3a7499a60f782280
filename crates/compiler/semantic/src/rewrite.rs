//! # Reference Rewriting
//!
//! The grammar cannot tell `a(i)` the array element from `f(i)` the
//! function call, so the parser produces [`Expr::FunctionRef`] for both.
//! Once names are resolved, references whose base is an array object are
//! rewritten into [`Expr::ArrayElement`] so later passes see the right
//! shape.

use ferro_compiler_parser::ast::{
    Block, CaseValue, Construct, DataObject, DataStmt, ExecPart, Expr, LoopControl, Program,
    Spanned, Statement, Stmt, Variable,
};

use crate::canonicalize::each_body;
use crate::context::SemanticsContext;

/// Rewrite array references that parsed as function calls
pub fn rewrite_function_refs(ctx: &SemanticsContext, program: &mut Program) -> bool {
    let rewriter = Rewriter { ctx };
    for unit in &mut program.units {
        each_body(unit, &mut |body| {
            rewriter.rewrite_block(&mut body.execution);
        });
    }
    !ctx.any_fatal_error()
}

struct Rewriter<'a> {
    ctx: &'a SemanticsContext,
}

impl Rewriter<'_> {
    fn rewrite_block(&self, block: &mut Block) {
        for part in block {
            match part {
                ExecPart::Statement(stmt) => self.rewrite_stmt(stmt),
                ExecPart::Construct(construct) => self.rewrite_construct(construct),
            }
        }
    }

    fn rewrite_stmt(&self, stmt: &mut Statement<Stmt>) {
        match &mut stmt.value {
            Stmt::Assignment { target, value } => {
                self.rewrite_variable(target);
                self.rewrite_expr(value);
            }
            Stmt::IfStmt { cond, action } => {
                self.rewrite_expr(cond);
                self.rewrite_stmt(action);
            }
            Stmt::ArithIf { expr, .. } => self.rewrite_expr(expr),
            Stmt::Call { args, .. } => {
                for arg in args {
                    self.rewrite_expr(arg);
                }
            }
            Stmt::Stop { code: Some(code) } => self.rewrite_expr(code),
            Stmt::Print { items } => {
                for item in items {
                    self.rewrite_expr(item);
                }
            }
            Stmt::ForallStmt {
                headers,
                mask,
                target,
                value,
            } => {
                for header in headers {
                    self.rewrite_expr(&mut header.lower);
                    self.rewrite_expr(&mut header.upper);
                    if let Some(step) = &mut header.step {
                        self.rewrite_expr(step);
                    }
                }
                if let Some(mask) = mask {
                    self.rewrite_expr(mask);
                }
                self.rewrite_variable(target);
                self.rewrite_expr(value);
            }
            Stmt::LabelDo {
                control: Some(control),
                ..
            } => self.rewrite_loop_control(control),
            Stmt::Data(data) => self.rewrite_data(data),
            _ => {}
        }
    }

    fn rewrite_construct(&self, construct: &mut Construct) {
        match construct {
            Construct::If(c) => {
                for arm in &mut c.arms {
                    self.rewrite_expr(&mut arm.cond);
                    self.rewrite_block(&mut arm.block);
                }
                if let Some(else_block) = &mut c.else_block {
                    self.rewrite_block(else_block);
                }
            }
            Construct::Do(c) => {
                if let Some(control) = &mut c.control {
                    self.rewrite_loop_control(control);
                }
                self.rewrite_block(&mut c.body);
            }
            Construct::Forall(c) => {
                for header in &mut c.headers {
                    self.rewrite_expr(&mut header.lower);
                    self.rewrite_expr(&mut header.upper);
                    if let Some(step) = &mut header.step {
                        self.rewrite_expr(step);
                    }
                }
                if let Some(mask) = &mut c.mask {
                    self.rewrite_expr(mask);
                }
                self.rewrite_block(&mut c.body);
            }
            Construct::Case(c) => {
                self.rewrite_expr(&mut c.selector);
                for arm in &mut c.arms {
                    if let Some(values) = &mut arm.values {
                        for value in values {
                            match value {
                                CaseValue::Single(expr) => self.rewrite_expr(expr),
                                CaseValue::Range(lower, upper) => {
                                    if let Some(lower) = lower {
                                        self.rewrite_expr(lower);
                                    }
                                    if let Some(upper) = upper {
                                        self.rewrite_expr(upper);
                                    }
                                }
                            }
                        }
                    }
                    self.rewrite_block(&mut arm.block);
                }
            }
            Construct::Parallel(c) => self.rewrite_block(&mut c.body),
            Construct::Offload(c) => self.rewrite_block(&mut c.body),
            Construct::Simd(c) => self.rewrite_block(&mut c.body),
        }
    }

    fn rewrite_loop_control(&self, control: &mut LoopControl) {
        match control {
            LoopControl::Counted {
                lower, upper, step, ..
            } => {
                self.rewrite_expr(lower);
                self.rewrite_expr(upper);
                if let Some(step) = step {
                    self.rewrite_expr(step);
                }
            }
            LoopControl::While(cond) => self.rewrite_expr(cond),
        }
    }

    fn rewrite_variable(&self, variable: &mut Variable) {
        if let Some(subscripts) = &mut variable.subscripts {
            for subscript in subscripts {
                self.rewrite_expr(subscript);
            }
        }
    }

    fn rewrite_data(&self, data: &mut DataStmt) {
        for set in &mut data.sets {
            for object in &mut set.objects {
                self.rewrite_data_object(object);
            }
            for value in &mut set.values {
                if let Some(repeat) = &mut value.repeat {
                    self.rewrite_expr(repeat);
                }
                self.rewrite_expr(&mut value.value);
            }
        }
    }

    fn rewrite_data_object(&self, object: &mut DataObject) {
        match object {
            DataObject::Variable(variable) => self.rewrite_variable(variable),
            DataObject::ImpliedDo(implied) => {
                for nested in &mut implied.objects {
                    self.rewrite_data_object(nested);
                }
                self.rewrite_expr(&mut implied.lower);
                self.rewrite_expr(&mut implied.upper);
                if let Some(step) = &mut implied.step {
                    self.rewrite_expr(step);
                }
            }
        }
    }

    fn rewrite_expr(&self, expr: &mut Spanned<Expr>) {
        match expr.value_mut() {
            Expr::FunctionRef { name, args } => {
                for arg in args.iter_mut() {
                    self.rewrite_expr(arg);
                }
                let is_array = name.symbol.is_some_and(|id| {
                    let ultimate = self.ctx.ultimate(id);
                    self.ctx
                        .symbol(ultimate)
                        .object()
                        .is_some_and(|object| object.rank() > 0)
                });
                if is_array {
                    let call = std::mem::replace(expr.value_mut(), Expr::IntLiteral(0));
                    if let Expr::FunctionRef { name, args } = call {
                        *expr.value_mut() = Expr::ArrayElement {
                            name,
                            subscripts: args,
                        };
                    }
                }
            }
            Expr::ArrayElement { subscripts, .. } => {
                for subscript in subscripts {
                    self.rewrite_expr(subscript);
                }
            }
            Expr::Unary { operand, .. } => self.rewrite_expr(operand),
            Expr::Binary { lhs, rhs, .. } => {
                self.rewrite_expr(lhs);
                self.rewrite_expr(rhs);
            }
            Expr::Paren(inner) => self.rewrite_expr(inner),
            _ => {}
        }
    }
}
