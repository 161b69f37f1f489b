//! Turn processing.
//!
//! This module is the operational core of the engine: one utterance in, one
//! reply out, with all mutation confined to the caller's [`Conversation`].
//!
//! ```text
//! utterance
//!    │ normalize (lowercase, strip symbols, clause breaks)
//!    v
//! clauses ──> per clause:
//!               quit phrase?        ── yes ─> final phrase (terminal)
//!               pre-substitution
//!               keyword scan        ── first trigger in rank order
//!               rule execution      ── non-empty reply returns immediately
//!    │ (no clause replied)
//!    v
//! fallback ladder: memory recall ─> "xnone" rule ─> default apology
//! ```
//!
//! The ladder is a strict priority order, not a race. Redirects (`goto`)
//! resolve in a bounded loop; an unknown target or an over-long chain fails
//! the turn closed: a `log::warn!` diagnostic and the default reply.

use crate::engine::ruleset::RuleSet;
use crate::engine::state::Conversation;
use crate::{Reassembly, Segment};
use log::warn;

/// Fixed reply of last resort, used when every rung of the fallback ladder
/// comes up empty and when a turn fails closed.
pub const DEFAULT_REPLY: &str = "I am at a loss for words.";

/// Designated catch-all keyword, executed against the empty clause.
const CATCH_ALL: &str = "xnone";

/// Redirect chains longer than this fail the turn closed.
const MAX_REDIRECT_HOPS: usize = 10;

/// A redirect chain that cannot complete; the turn degrades to the default
/// reply instead of propagating.
enum RedirectFault {
    UnknownTarget(String),
    DepthExceeded,
}

/// Applies the rule set to one utterance at a time, reading the shared
/// [`RuleSet`] and mutating the session's [`Conversation`].
pub(crate) struct Transformer<'a> {
    rules: &'a RuleSet,
    state: &'a mut Conversation,
}

impl<'a> Transformer<'a> {
    pub fn new(rules: &'a RuleSet, state: &'a mut Conversation) -> Self {
        Transformer { rules, state }
    }

    /// Produce the reply for one utterance.
    ///
    /// A quit session stays quit: every further call returns a final phrase
    /// without any clause processing.
    pub fn reply(&mut self, utterance: &str) -> String {
        let rules = self.rules;
        if self.state.quit {
            return self.final_phrase();
        }

        let normalized = normalize(utterance);
        for clause in normalized.split('.') {
            let clause = clause.trim();
            if clause.is_empty() {
                continue;
            }
            if rules.quits.iter().any(|quit| quit == clause) {
                self.state.quit = true;
                return self.final_phrase();
            }
            let clause = rules.pre.apply(clause);
            let Some(selected) = rules.keywords.iter().position(|rule| rule.trigger.is_match(&clause)) else {
                continue;
            };
            match self.execute(selected, &clause) {
                Ok(Some(reply)) => return reply,
                Ok(None) => {}
                Err(fault) => return self.fail_closed(fault),
            }
        }

        // Nothing replied: memory, then the catch-all, then the fixed default.
        if let Some(remembered) = self.state.recall() {
            return remembered;
        }
        if let Some(catch_all) = rules.rule_index(CATCH_ALL) {
            match self.execute(catch_all, "") {
                Ok(Some(reply)) => return reply,
                Ok(None) => {}
                Err(fault) => return self.fail_closed(fault),
            }
        }
        DEFAULT_REPLY.to_string()
    }

    /// Execute one keyword rule against a clause, following redirects.
    ///
    /// The first matching decomposition decides the reassembly. Memory-flagged
    /// decompositions defer their reply and keep scanning instead of
    /// returning. `Ok(None)` means no decomposition matched (try the next
    /// clause or fallback rung).
    fn execute(&mut self, rule_index: usize, clause: &str) -> Result<Option<String>, RedirectFault> {
        let rules = self.rules;
        let mut current = rule_index;
        let mut inherited: Vec<String> = Vec::new();
        let mut hops = 0;

        'chain: loop {
            let rule = &rules.keywords[current];
            for (decomp_index, decomp) in rule.decompositions.iter().enumerate() {
                let Some(caps) = decomp.matcher.captures(clause) else {
                    continue;
                };
                // This match's groups override inherited ones index by index;
                // inherited groups beyond them stay in scope through the chain.
                let mut groups = inherited.clone();
                for i in 0..caps.len() {
                    let value = caps.get(i).map(|m| m.as_str().trim().to_string()).unwrap_or_default();
                    if i < groups.len() {
                        groups[i] = value;
                    } else {
                        groups.push(value);
                    }
                }
                let choice = self.state.pick_reassembly(current, decomp_index, decomp.reassemblies.len());
                match &decomp.reassemblies[choice] {
                    Reassembly::Goto(target) => {
                        hops += 1;
                        if hops > MAX_REDIRECT_HOPS {
                            return Err(RedirectFault::DepthExceeded);
                        }
                        let Some(next) = rules.rule_index(target) else {
                            return Err(RedirectFault::UnknownTarget(target.clone()));
                        };
                        current = next;
                        inherited = groups;
                        continue 'chain;
                    }
                    Reassembly::Template(segments) => {
                        let reply = self.assemble(segments, &groups);
                        if decomp.memory {
                            self.state.remember(reply);
                            continue;
                        }
                        return Ok(Some(reply));
                    }
                }
            }
            return Ok(None);
        }
    }

    /// Fill a template's capture references (post-substituted) and clean up.
    fn assemble(&mut self, segments: &[Segment], groups: &[String]) -> String {
        let mut reply = String::new();
        for segment in segments {
            match segment {
                Segment::Literal(text) => reply.push_str(text),
                Segment::Capture(index) => {
                    let value = groups.get(*index).map(String::as_str).unwrap_or("");
                    reply.push_str(&self.rules.post.apply(value));
                }
            }
        }
        self.cleanup(reply)
    }

    /// Final cleanup: collapse spaces, drop space-before-period, apply the
    /// script's output transforms in order, then capitalize.
    fn cleanup(&self, reply: String) -> String {
        let reply = regex!(r"\s{2,}").replace_all(&reply, " ");
        let reply = regex!(r"\s+\.").replace_all(&reply, ".");
        let mut reply = reply.into_owned();
        for (re, replacement) in &self.rules.transforms {
            reply = re.replace(&reply, replacement.as_str()).into_owned();
        }
        if self.state.capitalize {
            reply = capitalize_first(&reply);
        }
        reply
    }

    fn final_phrase(&mut self) -> String {
        let rules = self.rules;
        self.state.random_pick(&rules.finals).unwrap_or(DEFAULT_REPLY).to_string()
    }

    fn fail_closed(&self, fault: RedirectFault) -> String {
        match fault {
            RedirectFault::UnknownTarget(target) => {
                warn!("redirect names unknown keyword {target:?}; replying with the default");
            }
            RedirectFault::DepthExceeded => {
                warn!("redirect chain exceeded {MAX_REDIRECT_HOPS} hops; replying with the default");
            }
        }
        DEFAULT_REPLY.to_string()
    }
}

/// Lowercase, strip symbol characters to spaces, rewrite clause boundaries
/// (` - ` runs, `,.?!;` runs, standalone "but") to the break marker, and
/// collapse repeated spaces.
fn normalize(text: &str) -> String {
    let text = text.to_lowercase();
    let text = regex!(r"[@#$%^&*()_+=~`{\[}\]|:<>/\\\t]").replace_all(&text, " ");
    let text = regex!(r"\s+-+\s+").replace_all(&text, ".");
    let text = regex!(r"\s*[,.?!;]+\s*").replace_all(&text, ".");
    let text = regex!(r"\s*\bbut\b\s*").replace_all(&text, ".");
    let text = regex!(r"\s{2,}").replace_all(&text, " ");
    text.into_owned()
}

/// Uppercase the first letter when it is a lowercase ASCII letter.
fn capitalize_first(reply: &str) -> String {
    let mut chars = reply.chars();
    match chars.next() {
        Some(first) if first.is_ascii_lowercase() => {
            format!("{}{}", first.to_ascii_uppercase(), chars.as_str())
        }
        _ => reply.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::{DecompositionEntry, KeywordEntry, Script, Transform};
    use crate::{compile, turn};

    fn entry(keyword: &str, rank: i32, decomps: &[(&str, &[&str])]) -> KeywordEntry {
        KeywordEntry {
            keyword: keyword.to_string(),
            rank,
            rules: decomps
                .iter()
                .map(|(pattern, reassemblies)| DecompositionEntry {
                    pattern: pattern.to_string(),
                    reassemblies: reassemblies.iter().map(|s| s.to_string()).collect(),
                })
                .collect(),
        }
    }

    #[test]
    fn normalization_splits_clauses() {
        assert_eq!(normalize("Hello, world! How are you"), "hello.world.how are you");
        assert_eq!(normalize("odd  spacing - everywhere"), "odd spacing.everywhere");
        assert_eq!(normalize("anything but the kitchen"), "anything.the kitchen");
        assert_eq!(normalize("strip @#$ symbols"), "strip symbols");
    }

    #[test]
    fn end_to_end_mother_example() {
        let script = Script {
            keywords: vec![entry("mother", 3, &[("* my mother *", &["Tell me more about your family."])])],
            ..Script::default()
        };
        let rules = compile(&script).unwrap();
        let mut session = Conversation::with_seed(&rules, 1);
        assert_eq!(turn(&rules, &mut session, "well my mother is strict"), "Tell me more about your family.");
    }

    #[test]
    fn quit_phrase_is_terminal_and_sticky() {
        let script = Script {
            quits: vec!["goodbye".to_string()],
            finals: vec!["It was nice talking to you.".to_string()],
            keywords: vec![entry("goodbye", 0, &[("*", &["You cannot leave yet."])])],
            ..Script::default()
        };
        let rules = compile(&script).unwrap();
        let mut session = Conversation::with_seed(&rules, 1);

        // The quit check preempts keyword matching and later clauses.
        assert_eq!(turn(&rules, &mut session, "goodbye, my friend"), "It was nice talking to you.");
        assert!(session.is_quit());
        assert_eq!(turn(&rules, &mut session, "wait i have more to say"), "It was nice talking to you.");

        session.reset(&rules);
        assert!(!session.is_quit());
    }

    #[test]
    fn higher_rank_preempts_regardless_of_position_or_authoring() {
        let script = Script {
            keywords: vec![
                entry("alpha", 1, &[("*", &["alpha wins"])]),
                entry("beta", 5, &[("*", &["beta wins"])]),
            ],
            ..Script::default()
        };
        let rules = compile(&script).unwrap();
        let mut session = Conversation::with_seed(&rules, 1);
        assert_eq!(turn(&rules, &mut session, "alpha then beta"), "Beta wins");
        assert_eq!(turn(&rules, &mut session, "beta then alpha"), "Beta wins");
    }

    #[test]
    fn equal_rank_selects_the_rule_authored_first() {
        let script = Script {
            keywords: vec![
                entry("alpha", 1, &[("*", &["alpha wins"])]),
                entry("beta", 1, &[("*", &["beta wins"])]),
            ],
            ..Script::default()
        };
        let rules = compile(&script).unwrap();
        let mut session = Conversation::with_seed(&rules, 1);
        assert_eq!(turn(&rules, &mut session, "beta then alpha"), "Alpha wins");
    }

    #[test]
    fn rotation_never_repeats_a_template_consecutively() {
        let script = Script {
            keywords: vec![entry("echo", 0, &[("*", &["first.", "second.", "third."])])],
            ..Script::default()
        };
        let rules = compile(&script).unwrap();
        let mut session = Conversation::with_seed(&rules, 42);
        let mut previous = String::new();
        for _ in 0..60 {
            let reply = turn(&rules, &mut session, "echo");
            assert_ne!(reply, previous);
            previous = reply;
        }
    }

    #[test]
    fn captures_flow_through_post_substitution() {
        let script = Script {
            posts: vec![("my".to_string(), "your".to_string()), ("i".to_string(), "you".to_string())],
            keywords: vec![entry("i", 0, &[("* i am *", &["Why are you (2)?"])])],
            ..Script::default()
        };
        let rules = compile(&script).unwrap();
        let mut session = Conversation::with_seed(&rules, 1);
        assert_eq!(
            turn(&rules, &mut session, "honestly i am upset about my job"),
            "Why are you upset about your job?"
        );
    }

    #[test]
    fn pre_substitution_feeds_the_keyword_scan() {
        let script = Script {
            pres: vec![("dont".to_string(), "don't".to_string())],
            keywords: vec![entry("don't", 0, &[("*", &["Don't you really?"])])],
            ..Script::default()
        };
        let rules = compile(&script).unwrap();
        let mut session = Conversation::with_seed(&rules, 1);
        assert_eq!(turn(&rules, &mut session, "i dont know"), "Don't you really?");
    }

    #[test]
    fn memory_flagged_decomposition_defers_and_keeps_scanning() {
        let script = Script {
            posts: vec![("my".to_string(), "your".to_string())],
            keywords: vec![entry(
                "my",
                2,
                &[
                    ("$ * my *", &["Earlier you said your (2)."]),
                    ("* my *", &["Your (2)?"]),
                ],
            )],
            ..Script::default()
        };
        let rules = compile(&script).unwrap();
        let mut session = Conversation::with_seed(&rules, 1);

        // The memory decomposition defers; the plain one answers immediately.
        assert_eq!(turn(&rules, &mut session, "my dog is sick"), "Your dog is sick?");

        // A keyword-less turn recalls the deferred reply before the default.
        assert_eq!(turn(&rules, &mut session, "pondering quietly"), "Earlier you said your dog is sick.");

        // Memory spent; the ladder bottoms out at the fixed default.
        assert_eq!(turn(&rules, &mut session, "pondering quietly"), DEFAULT_REPLY);
    }

    #[test]
    fn fallback_prefers_catch_all_over_default() {
        let script = Script {
            keywords: vec![entry("xnone", 0, &[("*", &["Please go on."])])],
            ..Script::default()
        };
        let rules = compile(&script).unwrap();
        let mut session = Conversation::with_seed(&rules, 1);
        assert_eq!(turn(&rules, &mut session, "no keyword here matches"), "Please go on.");
    }

    #[test]
    fn missing_catch_all_degrades_to_default() {
        let script = Script {
            keywords: vec![entry("unrelated", 0, &[("* unrelated *", &["never chosen"])])],
            ..Script::default()
        };
        let rules = compile(&script).unwrap();
        let mut session = Conversation::with_seed(&rules, 1);
        assert_eq!(turn(&rules, &mut session, "nothing to see"), DEFAULT_REPLY);
    }

    #[test]
    fn goto_redirects_to_the_named_rule() {
        let script = Script {
            keywords: vec![
                entry("machine", 10, &[("*", &["goto computer"])]),
                entry("computer", 50, &[("*", &["Do computers worry you?"])]),
            ],
            ..Script::default()
        };
        let rules = compile(&script).unwrap();
        let mut session = Conversation::with_seed(&rules, 1);
        assert_eq!(turn(&rules, &mut session, "this machine hums"), "Do computers worry you?");
    }

    #[test]
    fn goto_keeps_the_original_captures_in_scope() {
        let script = Script {
            keywords: vec![
                entry("pivot", 5, &[("* pivot *", &["goto landing"])]),
                // The landing pattern captures nothing; (2) still resolves to
                // the original decomposition's trailing capture.
                entry("landing", 0, &[("pivot", &["You pivoted to (2)."])]),
            ],
            ..Script::default()
        };
        let rules = compile(&script).unwrap();
        let mut session = Conversation::with_seed(&rules, 1);
        assert_eq!(turn(&rules, &mut session, "we pivot towards safety"), "You pivoted to towards safety.");
    }

    #[test]
    fn unknown_goto_target_fails_the_turn_closed() {
        let script = Script {
            keywords: vec![entry("lost", 0, &[("*", &["goto nowhere"])])],
            ..Script::default()
        };
        let rules = compile(&script).unwrap();
        let mut session = Conversation::with_seed(&rules, 1);
        assert_eq!(turn(&rules, &mut session, "i feel lost"), DEFAULT_REPLY);
    }

    #[test]
    fn redirect_cycles_fail_the_turn_closed() {
        let script = Script {
            keywords: vec![
                entry("ping", 0, &[("*", &["goto pong"])]),
                entry("pong", 0, &[("*", &["goto ping"])]),
            ],
            ..Script::default()
        };
        let rules = compile(&script).unwrap();
        let mut session = Conversation::with_seed(&rules, 1);
        assert_eq!(turn(&rules, &mut session, "ping"), DEFAULT_REPLY);
    }

    #[test]
    fn output_transforms_apply_in_order() {
        let script = Script {
            keywords: vec![entry("topic", 0, &[("* topic *", &["well (2) indeed"])])],
            transforms: vec![Transform { pattern: r"\bindeed\b".to_string(), replacement: "truly".to_string() }],
            ..Script::default()
        };
        let rules = compile(&script).unwrap();
        let mut session = Conversation::with_seed(&rules, 1);
        assert_eq!(turn(&rules, &mut session, "the topic is closed"), "Well is closed truly");
    }

    #[test]
    fn capitalization_can_be_disabled() {
        let script = Script {
            keywords: vec![entry("topic", 0, &[("*", &["lowercase stays"])])],
            ..Script::default()
        };
        let rules = compile(&script).unwrap();
        let mut session = Conversation::with_seed(&rules, 1);
        session.set_capitalize(false);
        assert_eq!(turn(&rules, &mut session, "topic"), "lowercase stays");
    }

    #[test]
    fn wildcard_only_pattern_matches_the_empty_clause() {
        let script = Script {
            keywords: vec![entry("xnone", 0, &[("*", &["Echo: (1)!"])])],
            ..Script::default()
        };
        let rules = compile(&script).unwrap();
        let mut session = Conversation::with_seed(&rules, 1);
        // No clause matches, memory is empty: xnone runs on the empty clause
        // and its capture is empty.
        assert_eq!(turn(&rules, &mut session, "zzz zzz"), "Echo: !");
    }
}
