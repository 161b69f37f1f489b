//! Raw rule database model.
//!
//! A [`Script`] is the declarative, human-authored side of the engine: phrase
//! lists, substitution pairs, synonym groups, and keyword entries written in
//! the pattern mini-language. The engine reads a `Script` exactly once, in
//! [`compile`](crate::compile); where the value comes from — the bundled
//! default, a JSON file, a network fetch — is the caller's concern.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// One decomposition: a raw pattern plus its reassembly templates.
///
/// Patterns may open with `$` (defer replies into memory), reference synonym
/// groups as `@word`, and use `*` wildcards. Reassemblies reference wildcard
/// captures as `(1)`, `(2)`, … or redirect with `goto keyword`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecompositionEntry {
    pub pattern: String,
    pub reassemblies: Vec<String>,
}

/// One keyword entry: the trigger word, its priority rank, and its
/// decompositions in authored order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordEntry {
    pub keyword: String,
    pub rank: i32,
    pub rules: Vec<DecompositionEntry>,
}

/// One output transform: a regex applied to every finished reply, replacing
/// the first occurrence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transform {
    pub pattern: String,
    pub replacement: String,
}

/// A raw rule database. Owned by the caller, read once at load time, never
/// mutated by the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Script {
    /// Greetings offered when a transcript opens.
    #[serde(default)]
    pub initials: Vec<String>,
    /// Farewells returned once a quit phrase is recognized.
    #[serde(default)]
    pub finals: Vec<String>,
    /// Clauses that end the session when matched exactly.
    #[serde(default)]
    pub quits: Vec<String>,
    /// Whole-word rewrites applied to a clause before the keyword scan.
    #[serde(default)]
    pub pres: Vec<(String, String)>,
    /// Whole-word rewrites applied to captured fragments before insertion.
    #[serde(default)]
    pub posts: Vec<(String, String)>,
    /// Synonym groups as `(word, synonyms)` pairs. A list rather than a map so
    /// a duplicated group key is caught at compile time.
    #[serde(default)]
    pub synons: Vec<(String, Vec<String>)>,
    /// Keyword entries in authoring order (the order is the rank tie-break).
    pub keywords: Vec<KeywordEntry>,
    /// Ordered output transforms applied to every finished reply.
    #[serde(default)]
    pub transforms: Vec<Transform>,
}

impl Script {
    /// The bundled default database: a compact rendition of the classic
    /// psychotherapist script.
    pub fn doctor() -> &'static Script {
        static DOCTOR: Lazy<Script> = Lazy::new(|| {
            serde_json::from_str(include_str!("script/doctor.json")).expect("bundled script is valid")
        });
        &DOCTOR
    }
}
