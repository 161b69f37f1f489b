//! Per-session conversation state.
//!
//! A [`Conversation`] is the only mutable piece of the engine: the bounded
//! short-term memory, the per-decomposition rotation cursors, and the session
//! rng. One value per session, threaded through every [`turn`](crate::turn);
//! the shared [`RuleSet`](crate::RuleSet) stays read-only.

use crate::engine::ruleset::RuleSet;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;

/// Upper bound on deferred replies held by a session.
pub(crate) const MAX_MEMORY: usize = 20;

/// Mutable per-session record: bounded memory queue, reassembly rotation
/// cursors, capitalization flag, and quit state.
///
/// Created at session start, mutated on every turn, discarded with the
/// session. Never share one `Conversation` across sessions; route a session's
/// turns through a single logical thread of control.
#[derive(Debug)]
pub struct Conversation {
    memory: VecDeque<String>,
    /// Last chosen reassembly index per (keyword, decomposition) slot.
    rotation: Vec<Vec<Option<usize>>>,
    pub(crate) capitalize: bool,
    pub(crate) quit: bool,
    rng: StdRng,
}

impl Conversation {
    /// Create a fresh session against `rules`.
    pub fn new(rules: &RuleSet) -> Self {
        Self::from_rng(rules, StdRng::from_entropy())
    }

    /// Create a fresh session with a seeded rng, for reproducible transcripts.
    pub fn with_seed(rules: &RuleSet, seed: u64) -> Self {
        Self::from_rng(rules, StdRng::seed_from_u64(seed))
    }

    fn from_rng(rules: &RuleSet, rng: StdRng) -> Self {
        Conversation {
            memory: VecDeque::new(),
            rotation: Self::fresh_rotation(rules),
            capitalize: true,
            quit: false,
            rng,
        }
    }

    fn fresh_rotation(rules: &RuleSet) -> Vec<Vec<Option<usize>>> {
        rules.keywords.iter().map(|rule| vec![None; rule.decompositions.len()]).collect()
    }

    /// Clear memory, rotation, and the quit flag. The rule set is untouched.
    pub fn reset(&mut self, rules: &RuleSet) {
        self.memory.clear();
        self.rotation = Self::fresh_rotation(rules);
        self.quit = false;
    }

    /// True once a quit phrase has ended this session.
    pub fn is_quit(&self) -> bool {
        self.quit
    }

    /// Replies normally get their first letter uppercased; disable to keep
    /// template casing untouched.
    pub fn set_capitalize(&mut self, capitalize: bool) {
        self.capitalize = capitalize;
    }

    /// Defer a reply into memory, evicting the oldest beyond [`MAX_MEMORY`].
    pub(crate) fn remember(&mut self, reply: String) {
        self.memory.push_back(reply);
        if self.memory.len() > MAX_MEMORY {
            self.memory.pop_front();
        }
    }

    /// Remove and return a uniformly random remembered reply; the order of
    /// the remaining entries is preserved.
    pub(crate) fn recall(&mut self) -> Option<String> {
        if self.memory.is_empty() {
            return None;
        }
        let at = self.rng.gen_range(0..self.memory.len());
        self.memory.remove(at)
    }

    #[cfg(test)]
    pub(crate) fn memory_len(&self) -> usize {
        self.memory.len()
    }

    /// Pick a reassembly index for this (keyword, decomposition) slot without
    /// repeating the previous pick: a repeated draw advances to the next
    /// index, wrapping past the end back to 0. The cursor always records the
    /// returned index, so two consecutive picks can never collide.
    ///
    /// Single-template lists degenerate to index 0 on every call; that matches
    /// the original engine and is intentional.
    pub(crate) fn pick_reassembly(&mut self, keyword: usize, decomposition: usize, len: usize) -> usize {
        let mut choice = self.rng.gen_range(0..len);
        let slot = &mut self.rotation[keyword][decomposition];
        if *slot == Some(choice) {
            choice += 1;
            if choice >= len {
                choice = 0;
            }
        }
        *slot = Some(choice);
        choice
    }

    /// Uniformly random pick from a phrase list; `None` when the list is empty.
    pub(crate) fn random_pick<'a>(&mut self, phrases: &'a [String]) -> Option<&'a str> {
        if phrases.is_empty() {
            None
        } else {
            Some(phrases[self.rng.gen_range(0..phrases.len())].as_str())
        }
    }
}
