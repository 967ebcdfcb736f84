//! Attack signature patterns for the content inspectors.
//!
//! Patterns are deliberately relaxed: each one matches an unambiguous attack
//! signature and little else, trading recall for a low false-positive rate on
//! clinical free-text fields. Inspectors compile their table once at
//! construction; nothing here is recompiled per request.

use regex::Regex;

/// One detection signature
#[derive(Debug, Clone)]
pub struct ThreatPattern {
    /// Pattern name, surfaced in events
    pub name: &'static str,
    /// Regex source
    pub pattern: &'static str,
    /// What the signature indicates
    pub description: &'static str,
}

/// SQL injection signatures
pub static SQL_PATTERNS: &[ThreatPattern] = &[
    ThreatPattern {
        name: "union_select",
        pattern: r"(?i)\bunion(\s+all)?\s+select\b",
        description: "UNION-based extraction probe",
    },
    ThreatPattern {
        name: "quoted_tautology",
        pattern: r"(?i)'\s*(or|and)\s*'[^']*'\s*=",
        description: "Always-true quoted comparison",
    },
    ThreatPattern {
        name: "numeric_tautology",
        pattern: r"(?i)\b(or|and)\b\s+\d+\s*=\s*\d+",
        description: "Always-true numeric comparison",
    },
    ThreatPattern {
        name: "stacked_statement",
        pattern: r"(?i);\s*(drop|delete|truncate|alter|insert)\b",
        description: "Stacked destructive statement",
    },
    ThreatPattern {
        name: "quote_comment",
        pattern: r"(?i)'\s*(--|#)",
        description: "Quote followed by SQL comment",
    },
    ThreatPattern {
        name: "timing_probe",
        pattern: r"(?i)\b(sleep|benchmark|pg_sleep)\s*\(|\bwaitfor\s+delay\b",
        description: "Time-based blind injection probe",
    },
    ThreatPattern {
        name: "schema_probe",
        pattern: r"(?i)\binformation_schema\b",
        description: "Catalog enumeration probe",
    },
];

/// Cross-site scripting signatures
pub static XSS_PATTERNS: &[ThreatPattern] = &[
    ThreatPattern {
        name: "script_tag",
        pattern: r"(?i)<\s*script[^>]*>",
        description: "Inline script element",
    },
    ThreatPattern {
        name: "event_handler",
        pattern: r"(?i)\bon(error|load|click|mouseover|focus|submit)\s*=",
        description: "Inline event handler attribute",
    },
    ThreatPattern {
        name: "javascript_uri",
        pattern: r"(?i)javascript\s*:",
        description: "javascript: URI scheme",
    },
    ThreatPattern {
        name: "embedding_element",
        pattern: r"(?i)<\s*(iframe|embed|object)[^>]*>",
        description: "Content embedding element",
    },
    ThreatPattern {
        name: "cookie_access",
        pattern: r"(?i)document\s*\.\s*cookie",
        description: "Session cookie access",
    },
];

/// Directory traversal signatures
pub static PATH_TRAVERSAL_PATTERNS: &[ThreatPattern] = &[
    ThreatPattern {
        name: "dotdot_sequence",
        pattern: r"\.\./|\.\.\\",
        description: "Relative parent-directory escape",
    },
    ThreatPattern {
        name: "encoded_dotdot",
        pattern: r"(?i)%2e%2e(%2f|%5c|/|\\)",
        description: "Percent-encoded parent-directory escape",
    },
    ThreatPattern {
        name: "system_file_probe",
        pattern: r"(?i)/etc/(passwd|shadow|hosts)\b|\b(boot|win)\.ini\b|windows[/\\]system32",
        description: "Direct system file probe",
    },
    ThreatPattern {
        name: "null_byte",
        pattern: r"%00|\x00",
        description: "Null byte path truncation",
    },
];

/// Compile a table into ready-to-run matchers. Signatures are fixed at
/// compile time; an entry that fails to compile is skipped, and the test
/// suite pins every entry as compilable.
pub fn compile(table: &'static [ThreatPattern]) -> Vec<(Regex, &'static ThreatPattern)> {
    table
        .iter()
        .filter_map(|p| Regex::new(p.pattern).ok().map(|r| (r, p)))
        .collect()
}
