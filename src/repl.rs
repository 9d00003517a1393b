use rustyline::validate::{ValidationContext, ValidationResult, Validator};
use rustyline::{Completer, Helper, Highlighter, Hinter, Result};

use crate::input::is_incomplete;

/// Helper that extends editor
///
/// Only implements the `Validator` trait: multiline editing is triggered when a `\` is seen at
/// the end of a line or while brackets, comments or strings are left open.
#[derive(Completer, Helper, Highlighter, Hinter)]
pub struct ReplHelper {}

impl ReplHelper {
    pub fn new() -> Self {
        ReplHelper {}
    }

    fn check(&self, input: &str) -> ValidationResult {
        if input.ends_with('\\') || is_incomplete(input) {
            ValidationResult::Incomplete
        } else {
            ValidationResult::Valid(None)
        }
    }
}

impl Validator for ReplHelper {
    fn validate(&self, ctx: &mut ValidationContext) -> Result<ValidationResult> {
        Ok(self.check(ctx.input()))
    }
}

#[test]
fn test_check() {
    let helper = ReplHelper::new();
    assert!(matches!(
        helper.check("var x = 1 \\"),
        ValidationResult::Incomplete
    ));
    assert!(matches!(
        helper.check("function f() {"),
        ValidationResult::Incomplete
    ));
    assert!(matches!(helper.check("log(1)"), ValidationResult::Valid(None)));
}
