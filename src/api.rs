//! Public entry points.
//!
//! Thin free functions over the engine: [`compile`] a [`Script`] once into a
//! shareable [`RuleSet`], then drive any number of independent sessions
//! through [`turn`], each with its own [`Conversation`].

use crate::engine::{CompileError, Conversation, DEFAULT_REPLY, RuleSet, Transformer};
use crate::script::Script;

/// Compile a raw script into an executable rule set.
///
/// Validation is strict: empty decomposition lists, empty patterns, missing
/// reassemblies, duplicated synonym groups, and malformed patterns all fail
/// here rather than mid-conversation.
///
/// ```
/// let rules = rogerian::compile(rogerian::Script::doctor())?;
/// let mut session = rogerian::Conversation::with_seed(&rules, 7);
///
/// let opening = rogerian::greeting(&rules, &mut session);
/// assert!(!opening.is_empty());
///
/// let reply = rogerian::turn(&rules, &mut session, "Well, my mother cooks");
/// assert!(!reply.is_empty());
/// # Ok::<(), rogerian::CompileError>(())
/// ```
pub fn compile(script: &Script) -> Result<RuleSet, CompileError> {
    RuleSet::compile(script)
}

/// Produce the reply for one utterance in `session`.
///
/// Once a quit phrase has been recognized the session is over: every further
/// call returns a closing phrase. Check [`Conversation::is_quit`] to stop.
pub fn turn(rules: &RuleSet, session: &mut Conversation, utterance: &str) -> String {
    Transformer::new(rules, session).reply(utterance)
}

/// A randomly chosen opening phrase from the script.
pub fn greeting(rules: &RuleSet, session: &mut Conversation) -> String {
    session.random_pick(&rules.initials).unwrap_or(DEFAULT_REPLY).to_string()
}

/// A randomly chosen closing phrase from the script.
pub fn farewell(rules: &RuleSet, session: &mut Conversation) -> String {
    session.random_pick(&rules.finals).unwrap_or(DEFAULT_REPLY).to_string()
}
