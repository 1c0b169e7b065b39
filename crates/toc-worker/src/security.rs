//! Security scan for on-disk dynamic tool sources (spec §4.2).
//!
//! Rust cannot safely load arbitrary foreign code at runtime the way the
//! teacher's `libloading`-based plugin loader does for trusted `.so`/`.dylib`
//! artifacts, so a "dynamic tool" here is a declarative descriptor whose
//! optional `code` field is a small scripted action body (see
//! `toc_worker::tools::scripted`), not a compiled module. The scan still
//! walks that source text for the same class of dangerous primitives the
//! teacher's plugin pipeline would reject in a loaded module.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub severity: Severity,
    pub pattern: String,
    pub line: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ScanResult {
    pub findings: Vec<Finding>,
}

impl ScanResult {
    pub fn has_error(&self) -> bool {
        self.findings.iter().any(|f| f.severity == Severity::Error)
    }
}

struct Rule {
    pattern: &'static str,
    severity: Severity,
}

const RULES: &[Rule] = &[
    Rule { pattern: "eval(", severity: Severity::Error },
    Rule { pattern: "Function(", severity: Severity::Error },
    Rule { pattern: "child_process", severity: Severity::Error },
    Rule { pattern: "std::process::Command", severity: Severity::Error },
    Rule { pattern: "Command::new", severity: Severity::Error },
    Rule { pattern: "__proto__", severity: Severity::Error },
    Rule { pattern: "prototype.constructor", severity: Severity::Error },
    Rule { pattern: "std::fs::remove_dir_all", severity: Severity::Error },
    Rule { pattern: "rm -rf", severity: Severity::Error },
    Rule { pattern: "loop {", severity: Severity::Warning },
    Rule { pattern: "while true", severity: Severity::Warning },
    Rule { pattern: "unsafe ", severity: Severity::Warning },
];

/// Scan tool source text line-by-line for the patterns in `RULES`.
pub fn scan(source: &str) -> ScanResult {
    let mut findings = Vec::new();
    for (idx, line) in source.lines().enumerate() {
        for rule in RULES {
            if line.contains(rule.pattern) {
                findings.push(Finding {
                    severity: rule.severity,
                    pattern: rule.pattern.to_string(),
                    line: idx + 1,
                });
            }
        }
    }
    ScanResult { findings }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_source_has_no_findings() {
        let result = scan("fn handler(args) { return args.url; }");
        assert!(result.findings.is_empty());
        assert!(!result.has_error());
    }

    #[test]
    fn subprocess_spawn_is_an_error() {
        let result = scan("let out = Command::new(\"ls\").output();");
        assert!(result.has_error());
    }

    #[test]
    fn unbounded_loop_is_only_a_warning() {
        let result = scan("loop { tick(); }");
        assert!(!result.has_error());
        assert_eq!(result.findings.len(), 1);
        assert_eq!(result.findings[0].severity, Severity::Warning);
    }
}
