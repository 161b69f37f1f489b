extern crate self as rogerian;

use regex::{Regex, RegexBuilder};
use std::collections::HashMap;

#[macro_use]
mod macros;
mod api;
mod engine;
mod script;

pub use api::{compile, farewell, greeting, turn};
pub use engine::{CompileError, Conversation, DEFAULT_REPLY, RuleSet};
pub use script::{DecompositionEntry, KeywordEntry, Script, Transform};

// --- Internal compiled types -------------------------------------------------

/// A compiled keyword rule: a topic trigger, its priority rank, and the
/// decompositions tried against a clause once the trigger fires.
#[derive(Debug)]
pub(crate) struct KeywordRule {
    pub keyword: String,
    /// Whole-word, case-insensitive occurrence check used by the clause scan.
    pub trigger: Regex,
    pub rank: i32,
    /// Authoring position; stable tie-break for equal ranks.
    pub original_index: usize,
    /// Non-empty after compilation (checked at load).
    pub decompositions: Vec<Decomposition>,
}

#[derive(Debug)]
pub(crate) struct Decomposition {
    /// Compiled pattern with capture groups numbered left to right.
    pub matcher: Regex,
    /// Replies from this decomposition are deferred into session memory
    /// instead of being returned.
    pub memory: bool,
    /// Non-empty after compilation (checked at load).
    pub reassemblies: Vec<Reassembly>,
}

/// One reassembly choice: an output template, or a redirect to another rule.
#[derive(Debug)]
pub(crate) enum Reassembly {
    Template(Vec<Segment>),
    Goto(String),
}

#[derive(Debug)]
pub(crate) enum Segment {
    Literal(String),
    /// 1-based capture group reference, written `(n)` in the raw template.
    Capture(usize),
}

/// Whole-word substitution table (used for both pre- and post-substitution).
///
/// Keys are stored lowercased alongside one combined `\b(k1|k2|…)\b`
/// alternation; replacement is a single left-to-right non-overlapping pass.
#[derive(Debug)]
pub(crate) struct Subst {
    map: HashMap<String, String>,
    pattern: Option<Regex>,
}

impl Subst {
    pub(crate) fn build(pairs: &[(String, String)]) -> Result<Self, regex::Error> {
        let mut map = HashMap::new();
        for (from, to) in pairs {
            map.insert(from.to_lowercase(), to.clone());
        }
        let pattern = if map.is_empty() {
            None
        } else {
            let alternation = map.keys().map(|k| regex::escape(k)).collect::<Vec<_>>().join("|");
            Some(RegexBuilder::new(&format!(r"\b({alternation})\b")).case_insensitive(true).build()?)
        };
        Ok(Subst { map, pattern })
    }

    pub(crate) fn apply(&self, text: &str) -> String {
        match &self.pattern {
            Some(re) => re
                .replace_all(text, |caps: &regex::Captures| {
                    self.map.get(&caps[1].to_lowercase()).cloned().unwrap_or_default()
                })
                .into_owned(),
            None => text.to_string(),
        }
    }
}
