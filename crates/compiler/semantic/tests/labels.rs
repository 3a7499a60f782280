//! Statement labels through the full driver, including the fold of labeled
//! DO loops that runs right after validation.

use crate::*;

#[test]
fn test_goto_to_missing_label_stops_analysis() {
    let (ctx, ok) = analyze(
        "program p\n\
         goto 42\n\
         end program\n",
    );
    assert!(!ok);
    assert_error(&ctx, "Label 42 was not found");
    // Later passes never ran, so this is the only diagnostic
    assert_eq!(ctx.sink().len(), 1);
}

#[test]
fn test_duplicate_label_reports_the_previous_site() {
    let (ctx, ok) = analyze(
        "program p\n\
         10 continue\n\
         10 continue\n\
         end program\n",
    );
    assert!(!ok);
    assert_error(&ctx, "Label 10 is already defined");
    assert!(!ctx.sink().errors()[0].related_spans.is_empty());
}

#[test]
fn test_labeled_do_folds_and_checks() {
    let (ctx, ok) = analyze(
        "program p\n\
         implicit none\n\
         integer i, s\n\
         s = 0\n\
         do 10 i = 1, 3\n\
         s = s + i\n\
         10 continue\n\
         end program\n",
    );
    assert_clean(&ctx, ok);
}

#[test]
fn test_nonstandard_do_termination_is_a_remark() {
    let (ctx, ok) = analyze(
        "program p\n\
         implicit none\n\
         integer i, s\n\
         s = 0\n\
         do 10 i = 1, 3\n\
         10 s = s + i\n\
         end program\n",
    );
    assert!(ok);
    assert_warning(&ctx, "DO loop 10 should terminate with a CONTINUE statement");
}

#[test]
fn test_label_space_is_per_unit() {
    let (ctx, ok) = analyze(
        "module m\n\
         contains\n\
         subroutine first\n\
         goto 10\n\
         10 continue\n\
         end subroutine\n\
         subroutine second\n\
         goto 10\n\
         10 continue\n\
         end subroutine\n\
         end module\n",
    );
    assert_clean(&ctx, ok);
}
