//! Output comparison for graded test cases.
//!
//! Trailing whitespace is noise from print conventions and trailing
//! newlines, so both sides are compared with it stripped. Everything
//! else is significant: leading whitespace, interior spacing and case
//! all have to match exactly.

pub(crate) fn normalize(output: &str) -> &str {
    output.trim_end()
}

pub(crate) fn outputs_match(actual: &str, expected: &str) -> bool {
    normalize(actual) == normalize(expected)
}
