use crate::config::RankerConfig;
use crate::intent::Intent;
use crate::perception::types::{ScreenAnalysis, UIElement};

/// Outcome of ranking screen elements against a target phrase.
///
/// `Ambiguous` and `NoMatch` are first-class outcomes, not errors: both are
/// routed to spoken disambiguation or recovery prompts.
#[derive(Debug, Clone)]
pub enum RankedOutcome {
    Unique(UIElement),
    /// Top candidates inside the decision margin, in on-screen reading
    /// order. The order is presentational only.
    Ambiguous(Vec<UIElement>),
    NoMatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MatchReason {
    ExactLabel,
    TokenSubset,
    Fuzzy,
    PositionalHint,
    KindHint,
}

/// Ephemeral pairing of an element with its score, alive only for one
/// ranking pass.
struct CandidateScore<'a> {
    element: &'a UIElement,
    score: f32,
    reasons: Vec<MatchReason>,
}

const AMBIGUOUS_LIMIT: usize = 3;

/// Scores UI elements against a parsed intent and picks a winner or
/// declares ambiguity.
///
/// A wrong unique pick executes an unintended game action, so a candidate
/// only wins outright when it is the sole scorer or leads the runner-up by
/// the configured margin. Anything closer goes back to the user.
#[derive(Debug, Clone)]
pub struct CandidateRanker {
    config: RankerConfig,
}

impl CandidateRanker {
    pub fn new(config: RankerConfig) -> Self {
        Self { config }
    }

    pub fn rank(&self, intent: &Intent, analysis: &ScreenAnalysis) -> RankedOutcome {
        let candidates: Vec<&UIElement> = if intent.verb.implies_action() {
            analysis.interactive_elements().collect()
        } else {
            analysis.ui_elements.iter().collect()
        };

        if candidates.is_empty() {
            return RankedOutcome::NoMatch;
        }

        let phrase = intent.target_phrase.trim().to_lowercase();
        let mut scored: Vec<CandidateScore<'_>> = candidates
            .into_iter()
            .map(|element| self.score(element, &phrase, analysis))
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        let top = scored[0].score;
        if top <= 0.0 {
            return RankedOutcome::NoMatch;
        }

        tracing::debug!(
            top,
            runner_up = ?scored.get(1).map(|c| c.score),
            reasons = ?scored[0].reasons,
            "ranking pass complete"
        );

        let scorers = scored.iter().filter(|c| c.score > 0.0).count();
        let runner_up = scored.get(1).map(|c| c.score).unwrap_or(0.0);
        if scorers == 1 || top - runner_up >= self.config.ambiguity_margin {
            return RankedOutcome::Unique(scored[0].element.clone());
        }

        // Near-tie: present the contenders in reading order and let the
        // user decide.
        let mut contenders: Vec<UIElement> = scored
            .iter()
            .take_while(|c| top - c.score < self.config.ambiguity_margin)
            .take(AMBIGUOUS_LIMIT)
            .map(|c| c.element.clone())
            .collect();
        sort_reading_order(&mut contenders);
        RankedOutcome::Ambiguous(contenders)
    }

    fn score<'a>(
        &self,
        element: &'a UIElement,
        phrase: &str,
        analysis: &ScreenAnalysis,
    ) -> CandidateScore<'a> {
        let mut reasons = Vec::new();
        let mut score = 0.0f32;

        let label = element
            .label
            .as_deref()
            .unwrap_or("")
            .trim()
            .to_lowercase();

        // Positional words steer the bonus, not the label match: "top start"
        // matches labels on "start" alone.
        let hint = positional_hint(phrase);
        let content = phrase
            .split_whitespace()
            .filter(|t| !is_positional_word(t))
            .collect::<Vec<_>>()
            .join(" ");

        if !content.is_empty() && !label.is_empty() {
            // Strongest label tier only: an exact match trivially implies
            // the weaker tiers.
            if label == content {
                score += 1.0;
                reasons.push(MatchReason::ExactLabel);
            } else if token_subset(&content, &label) {
                score += 0.6;
                reasons.push(MatchReason::TokenSubset);
            } else if strsim::normalized_levenshtein(&content, &label)
                >= self.config.fuzzy_threshold
            {
                score += 0.3;
                reasons.push(MatchReason::Fuzzy);
            }
        }

        if score > 0.0 {
            if let Some(hint) = hint {
                if hint_matches(hint, element, analysis.frame_width, analysis.frame_height) {
                    score += 0.1;
                    reasons.push(MatchReason::PositionalHint);
                }
            }
            if kind_mentioned(phrase, element) {
                reasons.push(MatchReason::KindHint);
            }
        }

        CandidateScore {
            element,
            score: score * element.detection_confidence,
            reasons,
        }
    }
}

/// Every word of the target phrase appears among the label's words.
fn token_subset(phrase: &str, label: &str) -> bool {
    let label_tokens: Vec<&str> = label.split_whitespace().collect();
    let mut any = false;
    for token in phrase.split_whitespace() {
        any = true;
        if !label_tokens.contains(&token) {
            return false;
        }
    }
    any
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PositionalHint {
    Top,
    Bottom,
    Left,
    Right,
}

fn positional_hint(phrase: &str) -> Option<PositionalHint> {
    for token in phrase.split_whitespace() {
        match token {
            "top" | "upper" => return Some(PositionalHint::Top),
            "bottom" | "lower" => return Some(PositionalHint::Bottom),
            "left" => return Some(PositionalHint::Left),
            "right" => return Some(PositionalHint::Right),
            _ => {}
        }
    }
    None
}

fn is_positional_word(token: &str) -> bool {
    matches!(token, "top" | "upper" | "bottom" | "lower" | "left" | "right")
}

fn hint_matches(
    hint: PositionalHint,
    element: &UIElement,
    frame_width: u32,
    frame_height: u32,
) -> bool {
    if frame_width == 0 || frame_height == 0 {
        return false;
    }
    let (cx, cy) = element.bounds.center();
    match hint {
        PositionalHint::Top => cy < frame_height / 2,
        PositionalHint::Bottom => cy >= frame_height / 2,
        PositionalHint::Left => cx < frame_width / 2,
        PositionalHint::Right => cx >= frame_width / 2,
    }
}

fn kind_mentioned(phrase: &str, element: &UIElement) -> bool {
    use crate::perception::types::ElementKind;
    let word = match element.kind {
        ElementKind::Button => "button",
        ElementKind::Menu => "menu",
        ElementKind::Text => "text",
        ElementKind::Input => "input",
        ElementKind::Other => return false,
    };
    phrase.split_whitespace().any(|t| t == word)
}

/// Top-to-bottom, left-to-right, with a row tolerance so elements on the
/// same visual line sort left-to-right rather than by exact pixel.
pub fn sort_reading_order(elements: &mut [UIElement]) {
    const ROW_TOLERANCE: u32 = 16;
    elements.sort_by(|a, b| {
        let (ax, ay) = a.bounds.center();
        let (bx, by) = b.bounds.center();
        let same_row = ay.abs_diff(by) <= ROW_TOLERANCE;
        if same_row {
            ax.cmp(&bx)
        } else {
            ay.cmp(&by)
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::IntentParser;
    use crate::perception::types::{Bounds, ElementKind, FingerprintKey};

    fn element(label: &str, x: u32, y: u32, confidence: f32, interactive: bool) -> UIElement {
        UIElement {
            kind: ElementKind::Button,
            bounds: Bounds { x, y, width: 200, height: 48 },
            label: Some(label.to_string()),
            is_interactive: interactive,
            detection_confidence: confidence,
        }
    }

    fn analysis_with(elements: Vec<UIElement>) -> ScreenAnalysis {
        ScreenAnalysis {
            fingerprint: FingerprintKey::from_hash("test".into()),
            description: "a menu".into(),
            ui_elements: elements,
            game_state: None,
            confidence: 0.9,
            captured_at: chrono::Utc::now(),
            frame_width: 1920,
            frame_height: 1080,
        }
    }

    fn ranker() -> CandidateRanker {
        CandidateRanker::new(RankerConfig::default())
    }

    #[test]
    fn tied_scores_are_ambiguous() {
        let intent = IntentParser::new().parse("click start");
        let analysis = analysis_with(vec![
            element("Start Game", 100, 300, 1.0, true),
            element("Start Tutorial", 100, 360, 1.0, true),
        ]);
        match ranker().rank(&intent, &analysis) {
            RankedOutcome::Ambiguous(options) => {
                assert_eq!(options.len(), 2);
                // Reading order: Start Game sits above Start Tutorial.
                assert_eq!(options[0].label.as_deref(), Some("Start Game"));
                assert_eq!(options[1].label.as_deref(), Some("Start Tutorial"));
            }
            other => panic!("expected Ambiguous, got {other:?}"),
        }
    }

    #[test]
    fn clear_margin_is_unique() {
        // Exact label (1.0) vs token subset (0.6): margin 0.4 >= 0.25.
        let intent = IntentParser::new().parse("click start game");
        let analysis = analysis_with(vec![
            element("Start Game", 100, 300, 1.0, true),
            element("Start Game Settings", 100, 360, 1.0, true),
        ]);
        match ranker().rank(&intent, &analysis) {
            RankedOutcome::Unique(el) => {
                assert_eq!(el.label.as_deref(), Some("Start Game"));
            }
            other => panic!("expected Unique, got {other:?}"),
        }
    }

    #[test]
    fn all_zero_scores_is_no_match() {
        let intent = IntentParser::new().parse("click quit");
        let analysis = analysis_with(vec![
            element("Inventory", 100, 300, 1.0, true),
            element("Map", 100, 360, 1.0, true),
        ]);
        assert!(matches!(
            ranker().rank(&intent, &analysis),
            RankedOutcome::NoMatch
        ));
    }

    #[test]
    fn action_verbs_ignore_non_interactive_elements() {
        let intent = IntentParser::new().parse("click start game");
        let analysis = analysis_with(vec![element("Start Game", 100, 300, 1.0, false)]);
        assert!(matches!(
            ranker().rank(&intent, &analysis),
            RankedOutcome::NoMatch
        ));
    }

    #[test]
    fn detection_confidence_scales_the_score() {
        // Same exact label, but one detection is much weaker. 1.0 vs 0.5
        // clears the margin.
        let intent = IntentParser::new().parse("click retry");
        let analysis = analysis_with(vec![
            element("Retry", 100, 300, 1.0, true),
            element("Retry", 100, 700, 0.5, true),
        ]);
        match ranker().rank(&intent, &analysis) {
            RankedOutcome::Unique(el) => assert_eq!(el.bounds.y, 300),
            other => panic!("expected Unique, got {other:?}"),
        }
    }

    #[test]
    fn positional_hint_breaks_a_tie_past_the_margin() {
        // Token-subset on both (0.6); the hint adds 0.1 to one side, which
        // is still inside the margin, so this stays ambiguous.
        let intent = IntentParser::new().parse("click top start");
        let analysis = analysis_with(vec![
            element("Start Game", 100, 100, 1.0, true),
            element("Start Tutorial", 100, 900, 1.0, true),
        ]);
        match ranker().rank(&intent, &analysis) {
            RankedOutcome::Ambiguous(options) => assert_eq!(options.len(), 2),
            other => panic!("expected Ambiguous, got {other:?}"),
        }
    }

    #[test]
    fn fuzzy_match_scores_close_spellings() {
        // STT often drops a letter; "inventry" vs "inventory" is above the
        // 0.75 ratio and is the only scorer.
        let intent = IntentParser::new().parse("click inventry");
        let analysis = analysis_with(vec![
            element("Inventory", 100, 300, 1.0, true),
            element("Map", 100, 360, 1.0, true),
        ]);
        match ranker().rank(&intent, &analysis) {
            RankedOutcome::Unique(el) => {
                assert_eq!(el.label.as_deref(), Some("Inventory"));
            }
            other => panic!("expected Unique, got {other:?}"),
        }
    }

    #[test]
    fn ambiguous_list_is_capped_at_three() {
        let intent = IntentParser::new().parse("click start");
        let analysis = analysis_with(vec![
            element("Start One", 100, 100, 1.0, true),
            element("Start Two", 100, 200, 1.0, true),
            element("Start Three", 100, 300, 1.0, true),
            element("Start Four", 100, 400, 1.0, true),
        ]);
        match ranker().rank(&intent, &analysis) {
            RankedOutcome::Ambiguous(options) => assert_eq!(options.len(), 3),
            other => panic!("expected Ambiguous, got {other:?}"),
        }
    }
}
