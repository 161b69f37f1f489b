//! Rule set assembly.
//!
//! This is the *static* side of the engine: everything derived once from a raw
//! [`Script`] so that per-turn work stays cheap and allocation-light.
//!
//! Assembly runs every raw decomposition through the pattern pipeline
//! (`pattern.rs`), parses reassembly templates into their sum type, builds the
//! pre/post substitution tables and output transforms, precompiles a
//! whole-word trigger per keyword, and finally sorts the keyword rules by
//! `(rank descending, authored order ascending)` — the order the clause scan
//! relies on.
//!
//! ## Invariants
//!
//! - `RuleSet::keywords` is sorted; `by_keyword` maps each keyword to its
//!   index in that sorted vector and both stay aligned.
//! - Every rule has at least one decomposition and every decomposition at
//!   least one reassembly; a script violating this fails to compile.
//! - Nothing in a `RuleSet` is mutated after `compile` returns.

use crate::engine::pattern;
use crate::script::Script;
use crate::{Decomposition, KeywordRule, Reassembly, Segment, Subst};
use regex::{Regex, RegexBuilder};
use std::collections::HashMap;
use thiserror::Error;

/// Malformed or self-contradictory rule data, detected at load time.
///
/// Fatal to loading: no sessions may be created against a script that failed
/// to compile.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("keyword {keyword:?} has no decompositions")]
    EmptyDecompositions { keyword: String },
    #[error("keyword {keyword:?} has an empty decomposition pattern")]
    EmptyPattern { keyword: String },
    #[error("keyword {keyword:?}, pattern {pattern:?} has no reassemblies")]
    EmptyReassemblies { keyword: String, pattern: String },
    #[error("synonym group {word:?} is defined more than once")]
    DuplicateSynonym { word: String },
    #[error("keyword {keyword:?}, pattern {pattern:?} does not compile: {source}")]
    BadPattern { keyword: String, pattern: String, source: regex::Error },
    #[error("substitution table does not compile: {source}")]
    BadSubstitution { source: regex::Error },
    #[error("output transform {pattern:?} does not compile: {source}")]
    BadTransform { pattern: String, source: regex::Error },
}

/// The compiled, immutable-after-load rule collection.
///
/// Compile once, then share freely: a `RuleSet` has no interior mutability
/// and may serve arbitrarily many concurrent sessions. All per-session
/// mutation lives in [`Conversation`](crate::Conversation).
#[derive(Debug)]
pub struct RuleSet {
    /// Keyword rules, sorted by `(rank desc, original index asc)`.
    pub(crate) keywords: Vec<KeywordRule>,
    /// Keyword → index into `keywords`; used to resolve redirects.
    by_keyword: HashMap<String, usize>,
    pub(crate) pre: Subst,
    pub(crate) post: Subst,
    pub(crate) quits: Vec<String>,
    pub(crate) initials: Vec<String>,
    pub(crate) finals: Vec<String>,
    /// Ordered output transforms applied to every finished reply.
    pub(crate) transforms: Vec<(Regex, String)>,
}

impl RuleSet {
    /// Compile a raw script into an executable rule set.
    pub(crate) fn compile(script: &Script) -> Result<RuleSet, CompileError> {
        // Synonym alternations: word -> (?:word|syn1|syn2|…), non-capturing so
        // group numbering stays a property of wildcards alone.
        let mut synonyms: HashMap<String, String> = HashMap::new();
        for (word, alternatives) in &script.synons {
            if synonyms.contains_key(word) {
                return Err(CompileError::DuplicateSynonym { word: word.clone() });
            }
            let mut parts = vec![regex::escape(word)];
            parts.extend(alternatives.iter().map(|s| regex::escape(s)));
            synonyms.insert(word.clone(), format!("(?:{})", parts.join("|")));
        }

        let mut keywords = Vec::with_capacity(script.keywords.len());
        for (original_index, entry) in script.keywords.iter().enumerate() {
            if entry.rules.is_empty() {
                return Err(CompileError::EmptyDecompositions { keyword: entry.keyword.clone() });
            }
            let mut decompositions = Vec::with_capacity(entry.rules.len());
            for raw in &entry.rules {
                let (_, stripped) = pattern::strip_memory_marker(&raw.pattern);
                if stripped.trim().is_empty() {
                    return Err(CompileError::EmptyPattern { keyword: entry.keyword.clone() });
                }
                if raw.reassemblies.is_empty() {
                    return Err(CompileError::EmptyReassemblies {
                        keyword: entry.keyword.clone(),
                        pattern: raw.pattern.clone(),
                    });
                }
                let (matcher, memory) = pattern::compile(&raw.pattern, &synonyms).map_err(|source| {
                    CompileError::BadPattern {
                        keyword: entry.keyword.clone(),
                        pattern: raw.pattern.clone(),
                        source,
                    }
                })?;
                let reassemblies = raw.reassemblies.iter().map(|t| parse_reassembly(t)).collect();
                decompositions.push(Decomposition { matcher, memory, reassemblies });
            }
            let trigger = RegexBuilder::new(&format!(r"\b{}\b", regex::escape(&entry.keyword)))
                .case_insensitive(true)
                .build()
                .map_err(|source| CompileError::BadPattern {
                    keyword: entry.keyword.clone(),
                    pattern: entry.keyword.clone(),
                    source,
                })?;
            keywords.push(KeywordRule {
                keyword: entry.keyword.clone(),
                trigger,
                rank: entry.rank,
                original_index,
                decompositions,
            });
        }

        // Higher rank first; authoring order breaks ties.
        keywords.sort_by(|a, b| b.rank.cmp(&a.rank).then(a.original_index.cmp(&b.original_index)));
        let by_keyword = keywords.iter().enumerate().map(|(idx, rule)| (rule.keyword.clone(), idx)).collect();

        let pre = Subst::build(&script.pres).map_err(|source| CompileError::BadSubstitution { source })?;
        let post = Subst::build(&script.posts).map_err(|source| CompileError::BadSubstitution { source })?;

        let mut transforms = Vec::with_capacity(script.transforms.len());
        for transform in &script.transforms {
            let re = Regex::new(&transform.pattern)
                .map_err(|source| CompileError::BadTransform { pattern: transform.pattern.clone(), source })?;
            transforms.push((re, transform.replacement.clone()));
        }

        Ok(RuleSet {
            keywords,
            by_keyword,
            pre,
            post,
            quits: script.quits.clone(),
            initials: script.initials.clone(),
            finals: script.finals.clone(),
            transforms,
        })
    }

    /// Index of the rule registered under `keyword`, if any.
    pub(crate) fn rule_index(&self, keyword: &str) -> Option<usize> {
        self.by_keyword.get(keyword).copied()
    }
}

/// Parse a raw reassembly into its sum type: a `goto` redirect, or a template
/// split into literal and capture segments.
fn parse_reassembly(raw: &str) -> Reassembly {
    if let Some(target) = raw.strip_prefix("goto ") {
        return Reassembly::Goto(target.trim().to_string());
    }
    let mut segments = Vec::new();
    let mut last = 0;
    for caps in regex!(r"\((\d+)\)").captures_iter(raw) {
        let whole = caps.get(0).unwrap();
        if whole.start() > last {
            segments.push(Segment::Literal(raw[last..whole.start()].to_string()));
        }
        segments.push(Segment::Capture(caps[1].parse().unwrap_or(0)));
        last = whole.end();
    }
    if last < raw.len() {
        segments.push(Segment::Literal(raw[last..].to_string()));
    }
    Reassembly::Template(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::{DecompositionEntry, KeywordEntry};

    fn entry(keyword: &str, rank: i32, pattern: &str, reassemblies: &[&str]) -> KeywordEntry {
        KeywordEntry {
            keyword: keyword.to_string(),
            rank,
            rules: vec![DecompositionEntry {
                pattern: pattern.to_string(),
                reassemblies: reassemblies.iter().map(|s| s.to_string()).collect(),
            }],
        }
    }

    #[test]
    fn keywords_sort_by_rank_then_authored_order() {
        let script = Script {
            keywords: vec![
                entry("low", 0, "*", &["a"]),
                entry("high", 10, "*", &["b"]),
                entry("also-low", 0, "*", &["c"]),
                entry("mid", 5, "*", &["d"]),
            ],
            ..Script::default()
        };
        let rules = RuleSet::compile(&script).unwrap();
        let order: Vec<&str> = rules.keywords.iter().map(|k| k.keyword.as_str()).collect();
        assert_eq!(order, vec!["high", "mid", "low", "also-low"]);
        assert_eq!(rules.rule_index("mid"), Some(1));
    }

    #[test]
    fn equal_ranks_preserve_authoring_order_deterministically() {
        let script = Script {
            keywords: (0..8).map(|i| entry(&format!("k{i}"), 3, "*", &["r"])).collect(),
            ..Script::default()
        };
        let first = RuleSet::compile(&script).unwrap();
        let second = RuleSet::compile(&script).unwrap();
        let names = |rules: &RuleSet| rules.keywords.iter().map(|k| k.keyword.clone()).collect::<Vec<_>>();
        assert_eq!(names(&first), names(&second));
        assert_eq!(first.keywords[0].keyword, "k0");
        assert_eq!(first.keywords[7].keyword, "k7");
    }

    #[test]
    fn empty_pattern_is_rejected() {
        let script = Script { keywords: vec![entry("topic", 0, "  ", &["r"])], ..Script::default() };
        assert!(matches!(RuleSet::compile(&script), Err(CompileError::EmptyPattern { .. })));

        // A bare memory marker is just as empty.
        let script = Script { keywords: vec![entry("topic", 0, "$ ", &["r"])], ..Script::default() };
        assert!(matches!(RuleSet::compile(&script), Err(CompileError::EmptyPattern { .. })));
    }

    #[test]
    fn missing_decompositions_and_reassemblies_are_rejected() {
        let script = Script {
            keywords: vec![KeywordEntry { keyword: "topic".to_string(), rank: 0, rules: vec![] }],
            ..Script::default()
        };
        assert!(matches!(RuleSet::compile(&script), Err(CompileError::EmptyDecompositions { .. })));

        let script = Script { keywords: vec![entry("topic", 0, "*", &[])], ..Script::default() };
        assert!(matches!(RuleSet::compile(&script), Err(CompileError::EmptyReassemblies { .. })));
    }

    #[test]
    fn duplicate_synonym_group_is_rejected() {
        let script = Script {
            synons: vec![
                ("sad".to_string(), vec!["unhappy".to_string()]),
                ("sad".to_string(), vec!["depressed".to_string()]),
            ],
            keywords: vec![entry("topic", 0, "*", &["r"])],
            ..Script::default()
        };
        assert!(matches!(RuleSet::compile(&script), Err(CompileError::DuplicateSynonym { .. })));
    }

    #[test]
    fn goto_and_placeholders_parse_into_segments() {
        assert!(matches!(parse_reassembly("goto alike"), Reassembly::Goto(target) if target == "alike"));
        match parse_reassembly("Why are you (2)?") {
            Reassembly::Template(segments) => {
                assert!(matches!(&segments[0], Segment::Literal(s) if s == "Why are you "));
                assert!(matches!(segments[1], Segment::Capture(2)));
                assert!(matches!(&segments[2], Segment::Literal(s) if s == "?"));
            }
            other => panic!("expected template, got {other:?}"),
        }
    }

    #[test]
    fn substitution_is_whole_word_single_pass() {
        let pairs = vec![
            ("i".to_string(), "you".to_string()),
            ("you".to_string(), "I".to_string()),
            ("my".to_string(), "your".to_string()),
        ];
        let subst = Subst::build(&pairs).unwrap();
        // "i" -> "you" must not be re-substituted into "I" by the same pass.
        assert_eq!(subst.apply("i love you and my dog"), "you love I and your dog");
        assert_eq!(subst.apply("myself is untouched"), "myself is untouched");
    }

    #[test]
    fn empty_substitution_table_is_identity() {
        let subst = Subst::build(&[]).unwrap();
        assert_eq!(subst.apply("unchanged"), "unchanged");
    }
}
