//! Rule-based sentiment analysis for review text.
//!
//! The analyzer scores each token against a valence lexicon, adjusts the
//! valence for nearby boosters, negations, capitalisation and contrastive
//! "but", then squashes the total into a compound polarity in `[-1, 1]`.
//! No model files or training data are involved; the same text always
//! yields the same score.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use utoipa::ToSchema;

// Empirically derived increments for boosters, caps and punctuation.
const B_INCR: f64 = 0.293;
const B_DECR: f64 = -0.293;
const C_INCR: f64 = 0.733;
const N_SCALAR: f64 = -0.74;
const EXCLAMATION_INCR: f64 = 0.292;
const QUESTION_INCR: f64 = 0.18;
const QUESTION_CAP: f64 = 0.96;
const NORMALIZE_ALPHA: f64 = 15.0;

/// Compound scores at or beyond this magnitude get a non-neutral label.
pub const LABEL_THRESHOLD: f64 = 0.05;

static LEXICON: Lazy<HashMap<&'static str, f64>> = Lazy::new(|| {
    [
        // positive
        ("good", 1.9),
        ("great", 3.1),
        ("excellent", 2.7),
        ("amazing", 2.8),
        ("wonderful", 2.7),
        ("fantastic", 2.6),
        ("superb", 3.1),
        ("outstanding", 3.0),
        ("brilliant", 2.8),
        ("love", 3.2),
        ("loved", 2.9),
        ("loves", 2.7),
        ("like", 1.5),
        ("liked", 1.8),
        ("best", 3.2),
        ("better", 1.9),
        ("happy", 2.7),
        ("glad", 2.0),
        ("beautiful", 2.9),
        ("pretty", 2.2),
        ("perfect", 2.7),
        ("perfectly", 3.2),
        ("awesome", 3.1),
        ("incredible", 2.5),
        ("delightful", 2.9),
        ("pleasant", 2.3),
        ("satisfied", 1.8),
        ("satisfying", 2.0),
        ("recommend", 1.5),
        ("recommended", 1.6),
        ("impressive", 2.3),
        ("comfortable", 1.5),
        ("comfy", 1.8),
        ("soft", 1.0),
        ("cozy", 1.7),
        ("stylish", 1.7),
        ("elegant", 2.1),
        ("nice", 1.8),
        ("cool", 1.3),
        ("cute", 2.0),
        ("fine", 0.8),
        ("ok", 0.9),
        ("okay", 0.9),
        ("fits", 0.8),
        ("quality", 1.0),
        ("durable", 1.5),
        ("reliable", 1.8),
        ("worth", 0.9),
        ("bargain", 1.3),
        ("fast", 1.1),
        ("quick", 1.0),
        ("helpful", 1.8),
        ("thanks", 1.9),
        ("thank", 1.5),
        ("enjoy", 2.2),
        ("enjoyed", 2.3),
        ("pleased", 1.9),
        ("win", 2.8),
        (":)", 2.0),
        (":-)", 1.3),
        ("<3", 1.9),
        // negative
        ("bad", -2.5),
        ("terrible", -2.1),
        ("awful", -2.0),
        ("horrible", -2.5),
        ("poor", -2.1),
        ("worst", -3.1),
        ("worse", -2.1),
        ("hate", -2.7),
        ("hated", -3.2),
        ("dislike", -1.6),
        ("disappointing", -2.2),
        ("disappointed", -1.9),
        ("disappointment", -2.3),
        ("fail", -2.5),
        ("failed", -2.3),
        ("sad", -2.1),
        ("unhappy", -1.8),
        ("angry", -2.3),
        ("annoyed", -1.6),
        ("annoying", -1.7),
        ("frustrated", -2.4),
        ("frustrating", -1.9),
        ("problem", -1.7),
        ("problems", -1.7),
        ("issue", -0.6),
        ("issues", -0.6),
        ("broken", -2.1),
        ("broke", -1.8),
        ("defective", -1.9),
        ("damaged", -1.9),
        ("wrong", -2.1),
        ("useless", -1.8),
        ("waste", -1.8),
        ("scam", -2.8),
        ("fake", -2.1),
        ("cheap", -0.6),
        ("flimsy", -1.6),
        ("uncomfortable", -1.6),
        ("itchy", -1.1),
        ("tight", -0.3),
        ("faded", -1.0),
        ("ripped", -1.5),
        ("torn", -1.2),
        ("smells", -0.8),
        ("slow", -1.0),
        ("late", -0.5),
        ("expensive", -0.9),
        ("overpriced", -1.5),
        ("worthless", -1.9),
        ("garbage", -2.3),
        ("trash", -2.0),
        ("ugly", -2.3),
        ("mediocre", -1.0),
        ("refund", -0.5),
        ("return", -0.2),
        ("returned", -0.7),
        ("never", -0.4),
        (":(", -1.9),
        (":-(", -1.5),
    ]
    .into_iter()
    .collect()
});

// Degree modifiers and the increment they apply to the following sentiment word.
static BOOSTERS: Lazy<HashMap<&'static str, f64>> = Lazy::new(|| {
    [
        ("absolutely", B_INCR),
        ("completely", B_INCR),
        ("extremely", B_INCR),
        ("highly", B_INCR),
        ("incredibly", B_INCR),
        ("really", B_INCR),
        ("so", B_INCR),
        ("super", B_INCR),
        ("totally", B_INCR),
        ("very", B_INCR),
        ("most", B_INCR),
        ("more", B_INCR),
        ("truly", B_INCR),
        ("especially", B_INCR),
        ("almost", B_DECR),
        ("barely", B_DECR),
        ("hardly", B_DECR),
        ("kinda", B_DECR),
        ("less", B_DECR),
        ("little", B_DECR),
        ("marginally", B_DECR),
        ("occasionally", B_DECR),
        ("partly", B_DECR),
        ("slightly", B_DECR),
        ("somewhat", B_DECR),
        ("sorta", B_DECR),
    ]
    .into_iter()
    .collect()
});

static NEGATIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "not", "no", "never", "none", "nothing", "nowhere", "neither", "nor",
        "cannot", "cant", "can't", "dont", "don't", "doesnt", "doesn't",
        "didnt", "didn't", "isnt", "isn't", "wasnt", "wasn't", "arent",
        "aren't", "werent", "weren't", "wont", "won't", "wouldnt", "wouldn't",
        "shouldnt", "shouldn't", "couldnt", "couldn't", "aint", "ain't",
        "without", "hardly", "rarely", "seldom",
    ]
    .into_iter()
    .collect()
});

// Leading/trailing punctuation, keeping tokens that are punctuation only
// (emoticons) intact.
static EDGE_PUNCT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[[:punct:]]+|[[:punct:]]+$").expect("static regex"));

/// Coarse polarity bucket for a compound score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
}

impl SentimentLabel {
    pub fn from_compound(compound: f64) -> Self {
        if compound >= LABEL_THRESHOLD {
            SentimentLabel::Positive
        } else if compound <= -LABEL_THRESHOLD {
            SentimentLabel::Negative
        } else {
            SentimentLabel::Neutral
        }
    }
}

/// Full result of analysing one piece of text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SentimentScores {
    /// Normalised polarity in `[-1, 1]`.
    pub compound: f64,
    pub positive: f64,
    pub neutral: f64,
    pub negative: f64,
    pub label: SentimentLabel,
}

impl SentimentScores {
    fn neutral() -> Self {
        Self {
            compound: 0.0,
            positive: 0.0,
            neutral: 0.0,
            negative: 0.0,
            label: SentimentLabel::Neutral,
        }
    }
}

/// Immutable, cheaply cloneable lexicon scorer.
///
/// Construct once and share it; every method takes `&self` and the lexicon
/// tables are never mutated after initialisation.
#[derive(Debug, Clone)]
pub struct SentimentAnalyzer {
    lexicon: &'static HashMap<&'static str, f64>,
    boosters: &'static HashMap<&'static str, f64>,
    negations: &'static HashSet<&'static str>,
}

impl Default for SentimentAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl SentimentAnalyzer {
    pub fn new() -> Self {
        Self {
            lexicon: &LEXICON,
            boosters: &BOOSTERS,
            negations: &NEGATIONS,
        }
    }

    /// Compound polarity of `text` in `[-1, 1]`. Empty text scores 0.
    pub fn compound(&self, text: &str) -> f64 {
        self.polarity_scores(text).compound
    }

    /// Compound polarity plus the positive/neutral/negative proportions.
    pub fn polarity_scores(&self, text: &str) -> SentimentScores {
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return SentimentScores::neutral();
        }

        let mixed_case = is_mixed_case(&tokens);
        let mut valences: Vec<f64> = tokens
            .iter()
            .enumerate()
            .map(|(i, _)| self.token_valence(&tokens, i, mixed_case))
            .collect();
        apply_but_rule(&tokens, &mut valences);

        let sum: f64 = valences.iter().sum();
        let emphasis = punctuation_emphasis(text);
        let total = if sum > 0.0 {
            sum + emphasis
        } else if sum < 0.0 {
            sum - emphasis
        } else {
            sum
        };
        let compound = normalize(total);

        let (positive, neutral, negative) = proportions(&valences, emphasis);
        SentimentScores {
            compound,
            positive,
            neutral,
            negative,
            label: SentimentLabel::from_compound(compound),
        }
    }

    fn token_valence(&self, tokens: &[String], i: usize, mixed_case: bool) -> f64 {
        let token = &tokens[i];
        let lower = token.to_lowercase();
        if self.boosters.contains_key(lower.as_str()) {
            return 0.0;
        }
        let Some(&base) = self.lexicon.get(lower.as_str()) else {
            return 0.0;
        };

        let mut valence = base;
        if mixed_case && is_shouting(token) {
            valence += C_INCR.copysign(valence);
        }

        for distance in 1..=3 {
            let Some(j) = i.checked_sub(distance) else {
                break;
            };
            let previous = &tokens[j];
            let previous_lower = previous.to_lowercase();
            if let Some(&scalar) = self.boosters.get(previous_lower.as_str()) {
                let mut scalar = if valence < 0.0 { -scalar } else { scalar };
                if mixed_case && is_shouting(previous) {
                    scalar += C_INCR.copysign(valence);
                }
                valence += scalar * distance_damping(distance);
            }
            if self.is_negation(&previous_lower) {
                valence *= N_SCALAR;
            }
        }
        valence
    }

    fn is_negation(&self, lower: &str) -> bool {
        self.negations.contains(lower) || lower.ends_with("n't")
    }
}

/// Sentiment of `text` with the default lexicon, in `[-1, 1]`.
///
/// Pure function: no shared state is read or written.
pub fn compute_sentiment(text: &str) -> f64 {
    SentimentAnalyzer::new().compound(text)
}

fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .filter_map(|raw| {
            let stripped = EDGE_PUNCT.replace_all(raw, "");
            // Emoticons are all punctuation; keep them whole.
            let token = if stripped.is_empty() { raw } else { stripped.as_ref() };
            if token.chars().count() <= 1 {
                None
            } else {
                Some(token.to_string())
            }
        })
        .collect()
}

fn is_shouting(token: &str) -> bool {
    token.chars().any(char::is_alphabetic)
        && token
            .chars()
            .filter(|c| c.is_alphabetic())
            .all(char::is_uppercase)
}

fn is_mixed_case(tokens: &[String]) -> bool {
    let shouting = tokens.iter().filter(|t| is_shouting(t)).count();
    shouting > 0 && shouting < tokens.len()
}

fn distance_damping(distance: usize) -> f64 {
    match distance {
        1 => 1.0,
        2 => 0.95,
        _ => 0.9,
    }
}

fn apply_but_rule(tokens: &[String], valences: &mut [f64]) {
    let Some(pivot) = tokens.iter().position(|t| t.eq_ignore_ascii_case("but")) else {
        return;
    };
    for (i, valence) in valences.iter_mut().enumerate() {
        if i < pivot {
            *valence *= 0.5;
        } else if i > pivot {
            *valence *= 1.5;
        }
    }
}

fn punctuation_emphasis(text: &str) -> f64 {
    let exclamations = text.matches('!').count().min(4) as f64 * EXCLAMATION_INCR;
    let questions = text.matches('?').count();
    let questions = if questions > 1 {
        (questions as f64 * QUESTION_INCR).min(QUESTION_CAP)
    } else {
        0.0
    };
    exclamations + questions
}

fn normalize(score: f64) -> f64 {
    let normalized = score / (score * score + NORMALIZE_ALPHA).sqrt();
    normalized.clamp(-1.0, 1.0)
}

fn proportions(valences: &[f64], emphasis: f64) -> (f64, f64, f64) {
    let mut positive = 0.0;
    let mut negative = 0.0;
    let mut neutral = 0.0;
    for &v in valences {
        if v > 0.0 {
            positive += v + 1.0;
        } else if v < 0.0 {
            negative += v - 1.0;
        } else {
            neutral += 1.0;
        }
    }
    if positive > negative.abs() {
        positive += emphasis;
    } else if positive < negative.abs() {
        negative -= emphasis;
    }

    let total = positive + negative.abs() + neutral;
    if total == 0.0 {
        return (0.0, 0.0, 0.0);
    }
    (positive / total, neutral / total, negative.abs() / total)
}
