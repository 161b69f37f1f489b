//! Compilation and dialogue engine.
//!
//! The engine is deliberately split into a *static* phase and a *dynamic*
//! phase, mirrored by the submodules under `src/engine/`:
//!
//! ```text
//! Script (raw rule database)
//!        │
//!        │  RuleSet::compile            (ruleset.rs)
//!        │    └─ per decomposition: pattern pass pipeline (pattern.rs)
//!        v
//!     RuleSet  ── immutable, shareable across sessions
//!
//! utterance ── Transformer::reply       (transformer.rs)
//!                - normalize + clause split
//!                - quit check / pre-substitution
//!                - keyword scan (rank desc, authored order)
//!                - rule execution: decompose, rotate, reassemble
//!                - fallback ladder: memory → catch-all → default
//!        │
//!        │  reads RuleSet, mutates Conversation (state.rs)
//!        v
//!     reply string
//! ```
//!
//! ## Responsibilities by module
//!
//! - `pattern.rs`: compiles one raw decomposition pattern (memory marker,
//!   synonym references, wildcards, whitespace) into a regex matcher.
//! - `ruleset.rs`: derives the sorted, precompiled [`RuleSet`] from a raw
//!   [`Script`](crate::Script) and owns the [`CompileError`] taxonomy.
//! - `transformer.rs`: the per-turn algorithm, including redirect resolution
//!   and the strict fallback ladder.
//! - `state.rs`: per-session mutable state ([`Conversation`]): bounded memory,
//!   reassembly rotation, the session rng, and the quit flag.
//!
//! ## Invariants
//!
//! - A [`RuleSet`] is never mutated after `compile` returns; it can be shared
//!   across any number of sessions without synchronization.
//! - A [`Conversation`] belongs to exactly one session and is mutated on every
//!   turn; never share one across sessions.
//! - Every compiled keyword rule has at least one decomposition, and every
//!   decomposition at least one reassembly (checked at load).

#[path = "engine/pattern.rs"]
mod pattern;
#[path = "engine/ruleset.rs"]
mod ruleset;
#[path = "engine/state.rs"]
mod state;
#[path = "engine/transformer.rs"]
mod transformer;

pub use ruleset::{CompileError, RuleSet};
pub use state::Conversation;
pub use transformer::DEFAULT_REPLY;
pub(crate) use transformer::Transformer;
