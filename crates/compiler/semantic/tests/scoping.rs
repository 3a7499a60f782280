//! Name resolution across program units: implicit typing, IMPLICIT NONE,
//! host association through CONTAINS, and USE association.

use crate::*;

#[test]
fn test_implicit_typing_follows_the_first_letter() {
    let (ctx, ok) = analyze(
        "program p\n\
         i = 1\n\
         x = 2.5\n\
         end program\n",
    );
    assert_clean(&ctx, ok);
}

#[test]
fn test_implicit_none_requires_declarations() {
    let (ctx, ok) = analyze(
        "program p\n\
         implicit none\n\
         i = 1\n\
         end program\n",
    );
    assert!(!ok);
    assert_error(&ctx, "No explicit type declared for 'i'");
}

#[test]
fn test_host_association_reaches_contained_subprograms() {
    let (ctx, ok) = analyze(
        "program p\n\
         implicit none\n\
         integer total\n\
         total = 0\n\
         call bump\n\
         contains\n\
         subroutine bump\n\
         total = total + 1\n\
         end subroutine\n\
         end program\n",
    );
    assert_clean(&ctx, ok);
    // Only one symbol was created for the variable
    let host = symbol_in(&ctx, "p", "total");
    let inner = ctx
        .scopes
        .find_symbol_from(scope_named(&ctx, "bump"), "total")
        .unwrap();
    assert_eq!(ctx.ultimate(inner), host);
}

#[test]
fn test_redeclaring_a_type_is_an_error() {
    let (ctx, ok) = analyze(
        "program p\n\
         implicit none\n\
         integer x\n\
         real x\n\
         x = 1\n\
         end program\n",
    );
    assert!(!ok);
    assert_error(&ctx, "The type of 'x' has already been declared");
}

#[test]
fn test_builtin_module_resolves_through_use() {
    let (ctx, ok) = analyze(
        "program p\n\
         use __ferro_builtins\n\
         implicit none\n\
         integer r\n\
         r = __builtin_max_rank\n\
         end program\n",
    );
    assert_clean(&ctx, ok);
}

#[test]
fn test_module_entities_are_visible_through_use() {
    let (ctx, ok) = analyze(
        "module consts\n\
         implicit none\n\
         integer, parameter :: answer = 42\n\
         end module\n\
         program p\n\
         use consts\n\
         implicit none\n\
         integer v\n\
         v = answer\n\
         end program\n",
    );
    assert_clean(&ctx, ok);
}

#[test]
fn test_subscripting_a_scalar_is_an_error() {
    let (ctx, ok) = analyze(
        "program p\n\
         implicit none\n\
         integer x, n\n\
         x = 1\n\
         n = x(2)\n\
         end program\n",
    );
    assert!(!ok);
    assert_error(&ctx, "'x' is neither an array nor a function");
}
