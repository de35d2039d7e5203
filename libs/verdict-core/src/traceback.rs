//! Error normalization: turns structured exception captures from the
//! sandbox into deterministic, bounded, learner-facing diagnostic text.
//!
//! Host filesystem layout never leaks: the only source name that appears in
//! output is the fixed `<string>` placeholder, and the only frames rendered
//! are those originating in the submitted or test-case code (an allow-list
//! on the synthetic source name, never a path pattern match).

use crate::sandbox::{ExceptionReport, SUBMISSION_SOURCE};

/// The source name shown to learners in place of the synthetic name the
/// snippet was actually loaded under.
pub const SOURCE_PLACEHOLDER: &str = "<string>";

const MAX_DIAGNOSTIC_BYTES: usize = 8192;
const TRUNCATION_MARKER: &str = "... (diagnostic truncated)";

/// Single-line form for an `AssertionError` raised directly by a standard
/// test case. The assertion is the check; a traceback adds nothing.
pub(crate) fn assertion_diagnostic(code: &str) -> String {
    clamp(format!("AssertionError  in: {}", code))
}

/// Diagnostic for a StdIO case whose captured output differs from the
/// expected output. Both values are shown Python-`repr` quoted.
pub(crate) fn mismatch_diagnostic(expected: &str, got: &str) -> String {
    clamp(format!(
        "Incorrect answer: expected {}, got {}",
        py_repr(expected),
        py_repr(got)
    ))
}

/// Conventional traceback rendering for every other exception kind: header,
/// one frame block per retained frame, syntax location when present, and
/// the final `Type: message` line. Line count depends only on the report,
/// so identical inputs yield byte-identical text.
pub(crate) fn exception_diagnostic(report: &ExceptionReport) -> String {
    let mut lines = vec!["Traceback (most recent call last):".to_string()];

    for frame in report.frames.iter().filter(|f| f.file == SUBMISSION_SOURCE) {
        lines.push(format!(
            "  File \"{}\", line {}, in {}",
            SOURCE_PLACEHOLDER, frame.line, frame.func
        ));
    }

    if let Some(syntax) = &report.syntax {
        lines.push(format!(
            "  File \"{}\", line {}",
            SOURCE_PLACEHOLDER, syntax.line
        ));
        if let Some(text) = &syntax.text {
            let stripped = text.trim_start();
            lines.push(format!("    {}", stripped));
            if let Some(offset) = syntax.offset {
                let lead = text.len() - stripped.len();
                let col = (offset as usize).saturating_sub(1).saturating_sub(lead);
                lines.push(format!("    {}^", " ".repeat(col)));
            }
        }
    }

    if report.message.is_empty() {
        lines.push(report.exc_type.clone());
    } else {
        lines.push(format!("{}: {}", report.exc_type, report.message));
    }

    clamp(lines.join("\n"))
}

/// Python-style `repr` for a string: quote choice and escapes match what a
/// learner would see from the interpreter itself.
fn py_repr(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') { '"' } else { '\'' };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

fn clamp(s: String) -> String {
    if s.len() <= MAX_DIAGNOSTIC_BYTES {
        return s;
    }
    let mut cut = MAX_DIAGNOSTIC_BYTES;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    let mut out = s[..cut].to_string();
    out.push('\n');
    out.push_str(TRUNCATION_MARKER);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::{RawFrame, SyntaxLocation};

    fn frame(file: &str, line: u32, func: &str) -> RawFrame {
        RawFrame { file: file.to_string(), line, func: func.to_string() }
    }

    fn report(exc_type: &str, message: &str, frames: Vec<RawFrame>) -> ExceptionReport {
        ExceptionReport {
            exc_type: exc_type.to_string(),
            message: message.to_string(),
            frames,
            syntax: None,
        }
    }

    #[test]
    fn assertion_diagnostic_is_the_single_line_form() {
        assert_eq!(
            assertion_diagnostic("assert(add(1,2)==3)"),
            "AssertionError  in: assert(add(1,2)==3)"
        );
    }

    #[test]
    fn mismatch_diagnostic_uses_python_repr() {
        assert_eq!(
            mismatch_diagnostic("3", "-1\n"),
            "Incorrect answer: expected '3', got '-1\\n'"
        );
    }

    #[test]
    fn py_repr_switches_quotes_like_python() {
        assert_eq!(py_repr("it's"), "\"it's\"");
        assert_eq!(py_repr("say \"hi\""), "'say \"hi\"'");
        assert_eq!(py_repr("both ' and \""), "'both \\' and \"'");
    }

    #[test]
    fn internal_frames_are_dropped_and_names_replaced() {
        let report = report(
            "NameError",
            "name 'S' is not defined",
            vec![
                frame("<string>", 61, "run_assertion"),
                frame(SUBMISSION_SOURCE, 2, "<module>"),
            ],
        );

        let text = exception_diagnostic(&report);
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "Traceback (most recent call last):");
        assert_eq!(lines[1], "  File \"<string>\", line 2, in <module>");
        assert_eq!(lines[2], "NameError: name 'S' is not defined");
        assert!(!text.contains("run_assertion"));
    }

    #[test]
    fn syntax_error_renders_location_text_and_caret() {
        let mut rep = report("SyntaxError", "invalid syntax", vec![]);
        rep.syntax = Some(SyntaxLocation {
            line: 2,
            text: Some("def add(a, b);".to_string()),
            offset: Some(14),
        });

        let text = exception_diagnostic(&rep);
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "Traceback (most recent call last):");
        assert_eq!(lines[1], "  File \"<string>\", line 2");
        assert_eq!(lines[2], "    def add(a, b);");
        assert_eq!(lines[3], format!("    {}^", " ".repeat(13)));
        assert_eq!(lines[4], "SyntaxError: invalid syntax");
    }

    #[test]
    fn caret_accounts_for_stripped_indent() {
        let mut rep = report("IndentationError", "expected an indented block", vec![]);
        rep.syntax = Some(SyntaxLocation {
            line: 3,
            text: Some("  return a + b".to_string()),
            offset: Some(3),
        });

        let text = exception_diagnostic(&rep);
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[2], "    return a + b");
        assert_eq!(lines[3], "    ^");
    }

    #[test]
    fn empty_message_renders_bare_type() {
        let rep = report("ValueError", "", vec![frame(SUBMISSION_SOURCE, 1, "<module>")]);
        let text = exception_diagnostic(&rep);
        assert!(text.ends_with("\nValueError"));
    }

    #[test]
    fn identical_reports_render_identically() {
        let make = || {
            report(
                "TypeError",
                "add() takes 1 positional argument but 2 were given",
                vec![frame(SUBMISSION_SOURCE, 1, "<module>")],
            )
        };
        assert_eq!(exception_diagnostic(&make()), exception_diagnostic(&make()));
    }

    #[test]
    fn oversized_diagnostics_are_clamped() {
        let frames: Vec<RawFrame> = (0..500)
            .map(|i| frame(SUBMISSION_SOURCE, i, "very_long_function_name_for_padding"))
            .collect();
        let rep = report("RecursionError", "maximum recursion depth exceeded", frames);

        let text = exception_diagnostic(&rep);
        assert!(text.len() <= MAX_DIAGNOSTIC_BYTES + TRUNCATION_MARKER.len() + 1);
        assert!(text.ends_with(TRUNCATION_MARKER));
    }
}
