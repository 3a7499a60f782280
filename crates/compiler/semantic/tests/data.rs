//! Deferred DATA compilation at the end of the pipeline. The deferral
//! matters: initialization images are only built once every earlier step
//! has passed.

use ferro_compiler_semantic::symbol::Initializer;
use ferro_compiler_semantic::{ConstValue, SemanticsContext};

use crate::*;

fn initializer_of(ctx: &SemanticsContext, name: &str) -> Option<Initializer> {
    let id = symbol_in(ctx, "p", name);
    ctx.symbol(id).object().and_then(|object| object.init.clone())
}

#[test]
fn test_data_values_become_initializers() {
    let (ctx, ok) = analyze(
        "program p\n\
         implicit none\n\
         integer n, a(3)\n\
         data n /7/\n\
         data a /1, 2, 3/\n\
         end program\n",
    );
    assert!(ok, "{:?}", ctx.sink().all());
    assert_eq!(
        initializer_of(&ctx, "n"),
        Some(Initializer::Scalar(ConstValue::Int(7)))
    );
    assert_eq!(
        initializer_of(&ctx, "a"),
        Some(Initializer::Elements(vec![
            Some(ConstValue::Int(1)),
            Some(ConstValue::Int(2)),
            Some(ConstValue::Int(3)),
        ]))
    );
}

#[test]
fn test_repeat_counts_expand() {
    let (ctx, ok) = analyze(
        "program p\n\
         implicit none\n\
         real table(4)\n\
         data table /4*0.5/\n\
         end program\n",
    );
    assert!(ok, "{:?}", ctx.sink().all());
    assert_eq!(
        initializer_of(&ctx, "table"),
        Some(Initializer::Elements(vec![
            Some(ConstValue::Real(0.5)),
            Some(ConstValue::Real(0.5)),
            Some(ConstValue::Real(0.5)),
            Some(ConstValue::Real(0.5)),
        ]))
    );
}

#[test]
fn test_values_convert_to_the_object_type() {
    let (ctx, ok) = analyze(
        "program p\n\
         implicit none\n\
         real x\n\
         data x /1/\n\
         end program\n",
    );
    assert!(ok, "{:?}", ctx.sink().all());
    assert_eq!(
        initializer_of(&ctx, "x"),
        Some(Initializer::Scalar(ConstValue::Real(1.0)))
    );
}

#[test]
fn test_data_is_not_compiled_after_a_failed_check() {
    let (ctx, ok) = analyze(
        "program p\n\
         implicit none\n\
         integer a(3)\n\
         data a /1, 2, 3/\n\
         return\n\
         end program\n",
    );
    assert!(!ok);
    assert_error(&ctx, "RETURN may only appear in a function or subroutine");
    // The pipeline stopped before the deferred DATA step
    assert_eq!(initializer_of(&ctx, "a"), None);
}

#[test]
fn test_implied_do_initializes_selected_elements() {
    let (ctx, ok) = analyze(
        "program p\n\
         implicit none\n\
         integer i, a(5)\n\
         data (a(i), i = 1, 5, 2) /3*9/\n\
         end program\n",
    );
    assert!(ok, "{:?}", ctx.sink().all());
    assert_eq!(
        initializer_of(&ctx, "a"),
        Some(Initializer::Elements(vec![
            Some(ConstValue::Int(9)),
            None,
            Some(ConstValue::Int(9)),
            None,
            Some(ConstValue::Int(9)),
        ]))
    );
}
