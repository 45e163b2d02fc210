//! Pre-compilation security filter (invariant 5).
//!
//! Scans raw expression source — before any `minijinja` compilation or
//! evaluation — for blocklisted identifiers. A hit is rejected unconditionally,
//! regardless of where in the expression it appears (property-scoped, pipeline
//! argument, conditional branch), because the scan runs over the whole source
//! string rather than over a parsed AST subset.

use regex::Regex;

use crate::error::TemplateError;

const BLOCKLIST: &[&str] = &["exec", "system", "spawn", "popen", "eval", "command"];

fn blocklist_pattern() -> Regex {
    let alternation = BLOCKLIST.join("|");
    Regex::new(&format!(r"\b({alternation})\b")).expect("static blocklist regex is valid")
}

/// Rejects `source` if it contains any blocklisted identifier as a whole
/// word. Must be called before the expression reaches `minijinja`.
pub fn check_security(source: &str) -> Result<(), TemplateError> {
    if let Some(m) = blocklist_pattern().find(source) {
        return Err(TemplateError::Security(m.as_str().to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_exec_and_system_in_any_position() {
        let cases = [
            "{{ exec(\"rm -rf /\") }}",
            "{{ .value | system }}",
            "{{ if exec }}yes{% endif %}",
            "plain text mentioning system call",
            "{{ .a.exec.b }}",
        ];
        for case in cases {
            assert!(check_security(case).is_err(), "expected rejection for: {case}");
        }
    }

    #[test]
    fn allows_benign_expressions() {
        assert!(check_security("{{ .workflow.input.message }}").is_ok());
        assert!(check_security("{{ .item.active and not .item.notified }}").is_ok());
    }

    #[test]
    fn does_not_false_positive_on_substrings() {
        // "executive" contains "exec" but not as a whole word
        assert!(check_security("{{ .executive_summary }}").is_ok());
        assert!(check_security("{{ .systematic }}").is_ok());
    }
}
