//! Construct checks over canonicalized trees, driven through the full
//! pipeline so the walk over contained subprograms is exercised too.

use crate::*;

#[test]
fn test_exit_outside_a_loop_is_reported() {
    let (ctx, ok) = analyze(
        "program p\n\
         exit\n\
         end program\n",
    );
    assert!(!ok);
    assert_error(&ctx, "EXIT may only appear within a DO construct");
}

#[test]
fn test_deeply_nested_constructs_are_quiet() {
    let (ctx, ok) = analyze(
        "program p\n\
         implicit none\n\
         integer i, j, s\n\
         s = 0\n\
         do i = 1, 4\n\
         do j = 1, 4\n\
         if (j > 2) then\n\
         s = s + j\n\
         else\n\
         s = s - 1\n\
         end if\n\
         end do\n\
         end do\n\
         end program\n",
    );
    assert_clean(&ctx, ok);
}

#[test]
fn test_do_variable_is_protected_inside_nested_constructs() {
    let (ctx, ok) = analyze(
        "program p\n\
         implicit none\n\
         integer i\n\
         do i = 1, 5\n\
         if (i > 2) then\n\
         i = 0\n\
         end if\n\
         end do\n\
         end program\n",
    );
    assert!(!ok);
    assert_error(&ctx, "Cannot redefine DO variable 'i'");
}

#[test]
fn test_case_default_may_appear_only_once() {
    let (ctx, ok) = analyze(
        "program p\n\
         implicit none\n\
         integer n\n\
         n = 1\n\
         select case (n)\n\
         case (1)\n\
         n = 2\n\
         case default\n\
         n = 3\n\
         case default\n\
         n = 4\n\
         end select\n\
         end program\n",
    );
    assert!(!ok);
    assert_error(&ctx, "CASE DEFAULT may appear only once in a SELECT CASE");
}

#[test]
fn test_checks_reach_contained_subprograms() {
    let (ctx, ok) = analyze(
        "program p\n\
         implicit none\n\
         call work\n\
         contains\n\
         subroutine work\n\
         implicit none\n\
         integer n\n\
         n = 1\n\
         select case (n)\n\
         case (3)\n\
         n = 2\n\
         case (3)\n\
         n = 4\n\
         end select\n\
         end subroutine\n\
         end program\n",
    );
    assert!(!ok);
    assert_error(&ctx, "CASE value overlaps an earlier case");
}

#[test]
fn test_arithmetic_if_requires_a_numeric_expression() {
    let (ctx, ok) = analyze(
        "program p\n\
         implicit none\n\
         logical flag\n\
         flag = .true.\n\
         if (flag) 1, 2, 3\n\
         1 continue\n\
         2 continue\n\
         3 continue\n\
         end program\n",
    );
    assert!(!ok);
    assert_error(&ctx, "Arithmetic IF expression must be a scalar numeric expression");
}
