use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentVerb {
    Describe,
    List,
    Select,
    Type,
    Press,
    Scroll,
    Unknown,
}

impl IntentVerb {
    /// Verbs that will drive a UI action and therefore only rank against
    /// interactive elements.
    pub fn implies_action(self) -> bool {
        matches!(self, Self::Select | Self::Type | Self::Press | Self::Scroll)
    }
}

/// Parsed voice command. Created per utterance, consumed once by the
/// ranker, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intent {
    pub verb: IntentVerb,
    pub target_phrase: String,
    pub raw_text: String,
}

/// Trigger phrases in priority order; the first matching rule wins.
/// Longer variants of a verb come before their prefixes so "click on the
/// start button" strips "click on", not just "click".
const VERB_RULES: &[(IntentVerb, &[&str])] = &[
    (
        IntentVerb::Describe,
        &["what's on screen", "whats on screen", "what is on screen", "describe"],
    ),
    (
        IntentVerb::List,
        &["list options", "read options", "read the options", "list"],
    ),
    (
        IntentVerb::Select,
        &["click on", "click", "select", "choose", "pick"],
    ),
    (IntentVerb::Type, &["type"]),
    (IntentVerb::Press, &["press", "hit"]),
    (IntentVerb::Scroll, &["scroll to", "scroll"]),
];

/// Connective words stripped from the target phrase after the trigger is
/// removed. The ranker matches on content words only.
const CONNECTIVES: &[&str] = &[
    "the", "a", "an", "on", "to", "in", "of", "button", "option", "item", "please",
];

/// Deterministic, rule-based utterance parser. No external calls, never
/// fails: unmatched text becomes `Unknown` with the raw text preserved
/// verbatim as the target phrase.
#[derive(Debug, Clone, Default)]
pub struct IntentParser;

impl IntentParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, raw_text: &str) -> Intent {
        let raw = raw_text.trim();
        let lowered = raw.to_lowercase();

        if raw.is_empty() {
            return Intent {
                verb: IntentVerb::Unknown,
                target_phrase: String::new(),
                raw_text: raw.to_string(),
            };
        }

        for (verb, triggers) in VERB_RULES {
            for trigger in *triggers {
                if let Some(rest) = match_trigger(&lowered, trigger) {
                    let target_phrase = strip_connectives(rest);
                    tracing::debug!(
                        verb = ?verb,
                        trigger,
                        target = %target_phrase,
                        "intent matched"
                    );
                    return Intent {
                        verb: *verb,
                        target_phrase,
                        raw_text: raw.to_string(),
                    };
                }
            }
        }

        Intent {
            verb: IntentVerb::Unknown,
            target_phrase: raw.to_string(),
            raw_text: raw.to_string(),
        }
    }
}

/// Matches a trigger at the start of the utterance or as a standalone
/// phrase inside it, returning the text after the trigger.
fn match_trigger<'a>(lowered: &'a str, trigger: &str) -> Option<&'a str> {
    if let Some(rest) = lowered.strip_prefix(trigger) {
        if rest.is_empty() || rest.starts_with(' ') {
            return Some(rest);
        }
    }
    let padded = format!(" {trigger} ");
    if let Some(pos) = lowered.find(&padded) {
        return Some(&lowered[pos + padded.len()..]);
    }
    // Trigger at the very end ("options please, list")
    let suffix = format!(" {trigger}");
    if lowered.ends_with(&suffix) {
        return Some("");
    }
    None
}

fn strip_connectives(rest: &str) -> String {
    rest.split_whitespace()
        .filter(|word| {
            let bare = word.trim_matches(|c: char| !c.is_alphanumeric());
            !CONNECTIVES.contains(&bare)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_triggers_map_to_select() {
        let parser = IntentParser::new();
        for utterance in ["click start game", "select start game", "choose start game"] {
            let intent = parser.parse(utterance);
            assert_eq!(intent.verb, IntentVerb::Select, "{utterance}");
            assert_eq!(intent.target_phrase, "start game");
        }
    }

    #[test]
    fn trigger_and_connectives_are_stripped() {
        let parser = IntentParser::new();
        let intent = parser.parse("click on the Start Game button");
        assert_eq!(intent.verb, IntentVerb::Select);
        assert_eq!(intent.target_phrase, "start game");
    }

    #[test]
    fn describe_and_list_take_priority_over_select() {
        let parser = IntentParser::new();
        assert_eq!(parser.parse("what's on screen").verb, IntentVerb::Describe);
        assert_eq!(parser.parse("describe the screen").verb, IntentVerb::Describe);
        assert_eq!(parser.parse("list options").verb, IntentVerb::List);
        assert_eq!(parser.parse("read options").verb, IntentVerb::List);
    }

    #[test]
    fn unmatched_text_is_unknown_with_raw_target() {
        let parser = IntentParser::new();
        let intent = parser.parse("open sesame magic words");
        assert_eq!(intent.verb, IntentVerb::Unknown);
        assert_eq!(intent.target_phrase, "open sesame magic words");
        assert_eq!(intent.raw_text, "open sesame magic words");
    }

    #[test]
    fn empty_utterance_is_unknown_not_a_crash() {
        let parser = IntentParser::new();
        let intent = parser.parse("   ");
        assert_eq!(intent.verb, IntentVerb::Unknown);
        assert!(intent.target_phrase.is_empty());
    }

    #[test]
    fn first_matching_rule_wins() {
        // "select" appears after "list" in the utterance, but List has
        // higher table priority.
        let parser = IntentParser::new();
        let intent = parser.parse("list options then select one");
        assert_eq!(intent.verb, IntentVerb::List);
    }
}
