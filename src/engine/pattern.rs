//! Decomposition pattern compiler.
//!
//! Raw decomposition patterns are a small mini-language layered over regex:
//!
//! - a leading `$` marks the decomposition as memory-deferred,
//! - `@word` references a synonym group,
//! - `*` matches zero or more words and becomes a capture group,
//! - literal text matches itself, whole-word and case-insensitively.
//!
//! Compilation is an ordered pipeline of pure passes, each testable on its
//! own. Order matters: synonym references must expand before wildcard
//! expansion so that boundary assertions can account for the alternation
//! parentheses a synonym leaves behind.
//!
//! ```text
//! "$ * i am* @sad *"
//!   └─ strip_memory_marker ─> (memory=true, "* i am* @sad *")
//!        └─ expand_synonyms ─> "* i am* (?:sad|unhappy|…) *"
//!             └─ expand_wildcards ─> "\s*(.*)\s*\bi am\b\s*(.*)\s*(?:sad|…)\s*(.*)\s*"
//!                  └─ normalize_whitespace ─> literal runs become \s+
//! ```
//!
//! Capture groups come only from wildcards (synonym alternations are
//! non-capturing), numbered left to right; reassembly templates reference
//! them as `(1)`, `(2)`, …

use regex::{Regex, RegexBuilder};
use std::collections::HashMap;

/// The expansion of one wildcard: a capture over zero or more words.
const GROUP: &str = r"\s*(.*)\s*";

/// Compile one raw pattern against the synonym alternation table.
///
/// Returns the matcher and whether the pattern carried the memory marker.
pub(crate) fn compile(raw: &str, synonyms: &HashMap<String, String>) -> Result<(Regex, bool), regex::Error> {
    let (memory, stripped) = strip_memory_marker(raw);
    let expanded = expand_synonyms(stripped, synonyms);
    let expanded = expand_wildcards(&expanded);
    let expanded = normalize_whitespace(&expanded);
    let matcher = RegexBuilder::new(&expanded).case_insensitive(true).build()?;
    Ok((matcher, memory))
}

/// Strip a leading `$` (plus following spaces); true when it was present.
pub(crate) fn strip_memory_marker(raw: &str) -> (bool, &str) {
    match raw.strip_prefix('$') {
        Some(rest) => (true, rest.trim_start_matches(' ')),
        None => (false, raw),
    }
}

/// Replace every `@word` reference with its group's non-capturing alternation.
///
/// An unregistered reference degrades to the bare word. Replacements are not
/// rescanned, so expansion converges in one pass.
fn expand_synonyms(pattern: &str, synonyms: &HashMap<String, String>) -> String {
    regex!(r"@(\S+)")
        .replace_all(pattern, |caps: &regex::Captures| {
            synonyms.get(&caps[1]).cloned().unwrap_or_else(|| caps[1].to_string())
        })
        .into_owned()
}

/// Expand `*` wildcards into capture groups with word-boundary assertions.
///
/// A boundary is skipped when the neighboring character is a grouping or
/// escape character, so wildcards sit cleanly next to synonym alternations.
/// Interior wildcards are expanded left to right, resuming the scan at the
/// right-hand neighbor so consecutive interior occurrences all expand; leading
/// and trailing wildcards are handled afterwards.
fn expand_wildcards(pattern: &str) -> String {
    if regex!(r"^\s*\*\s*$").is_match(pattern) {
        return GROUP.to_string();
    }

    let interior = regex!(r"(\S)\s*\*\s*(\S)");
    let mut out = String::new();
    let mut rest = pattern.to_string();
    while let Some(caps) = interior.captures(&rest) {
        let left = caps.get(1).unwrap();
        let right = caps.get(2).unwrap();
        out.push_str(&rest[..left.end()]);
        if left.as_str() != ")" {
            out.push_str(r"\b");
        }
        out.push_str(GROUP);
        if right.as_str() != "(" && right.as_str() != "\\" {
            out.push_str(r"\b");
        }
        rest = rest[right.start()..].to_string();
    }
    let mut expanded = format!("{out}{rest}");

    if let Some(caps) = regex!(r"^\s*\*\s*(\S)").captures(&expanded) {
        let next = caps.get(1).unwrap();
        let mut lead = String::from(GROUP);
        if next.as_str() != ")" && next.as_str() != "\\" {
            lead.push_str(r"\b");
        }
        expanded = format!("{lead}{}", &expanded[next.start()..]);
    }
    if let Some(caps) = regex!(r"(\S)\s*\*\s*$").captures(&expanded) {
        let prev = caps.get(1).unwrap();
        let mut lead = expanded[..prev.end()].to_string();
        if prev.as_str() != "(" {
            lead.push_str(r"\b");
        }
        lead.push_str(GROUP);
        expanded = lead;
    }
    expanded
}

/// Collapse literal whitespace runs into one-or-more matchers, so
/// multi-space input still matches single-space-authored patterns.
fn normalize_whitespace(pattern: &str) -> String {
    regex!(r"\s+").replace_all(pattern, r"\s+").into_owned()
}
