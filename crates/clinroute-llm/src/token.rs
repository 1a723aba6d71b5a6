//! Token estimation and per-task budgets
//!
//! Estimates are heuristic and only used for display and budgeting; no
//! request is rejected on an estimate.

use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tiktoken_rs::{cl100k_base, CoreBPE};

/// Latin-script characters per token
const CHARS_PER_TOKEN: f64 = 4.0;

/// CJK characters per token once CJK text dominates
const CJK_CHARS_PER_TOKEN: f64 = 1.5;

/// CJK share of code points at which CJK weighting applies
const CJK_RATIO_THRESHOLD: f64 = 0.3;

/// Pluggable token estimation strategy
pub trait TokenEstimator: Send + Sync {
    /// Approximate token count of `text`
    fn estimate(&self, text: &str) -> usize;
}

/// Character-ratio heuristic.
///
/// About four characters per token. When at least 30% of the code points are
/// CJK, those are weighted at 1.5 characters per token and the rest at four.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicEstimator;

impl TokenEstimator for HeuristicEstimator {
    fn estimate(&self, text: &str) -> usize {
        let (total, cjk) = text.chars().fold((0usize, 0usize), |(total, cjk), c| {
            (total + 1, cjk + usize::from(is_cjk(c)))
        });
        if total == 0 {
            return 0;
        }

        let estimate = if cjk as f64 / total as f64 >= CJK_RATIO_THRESHOLD {
            cjk as f64 / CJK_CHARS_PER_TOKEN + (total - cjk) as f64 / CHARS_PER_TOKEN
        } else {
            total as f64 / CHARS_PER_TOKEN
        };
        estimate.ceil() as usize
    }
}

/// Whether `c` belongs to a CJK script block
#[must_use]
pub fn is_cjk(c: char) -> bool {
    matches!(
        c as u32,
        0x1100..=0x11FF      // Hangul Jamo
        | 0x3000..=0x303F    // CJK symbols and punctuation
        | 0x3040..=0x309F    // Hiragana
        | 0x30A0..=0x30FF    // Katakana
        | 0x3130..=0x318F    // Hangul compatibility Jamo
        | 0x3400..=0x4DBF    // CJK extension A
        | 0x4E00..=0x9FFF    // CJK unified ideographs
        | 0xAC00..=0xD7AF    // Hangul syllables
        | 0xF900..=0xFAFF    // CJK compatibility ideographs
        | 0xFF00..=0xFFEF    // Half/full width forms
        | 0x20000..=0x2A6DF  // CJK extension B
    )
}

/// cl100k tokenizer, `None` if the embedded ranks fail to load
static TOKENIZER: LazyLock<Option<CoreBPE>> = LazyLock::new(|| cl100k_base().ok());

/// BPE-based estimator using tiktoken's cl100k_base encoding.
///
/// Falls back to [`HeuristicEstimator`] if the encoding is unavailable.
#[derive(Debug, Default, Clone, Copy)]
pub struct TiktokenEstimator;

impl TokenEstimator for TiktokenEstimator {
    fn estimate(&self, text: &str) -> usize {
        match TOKENIZER.as_ref() {
            Some(bpe) => bpe.encode_with_special_tokens(text).len(),
            None => HeuristicEstimator.estimate(text),
        }
    }
}

/// Token budget applied to requests that leave the limits unset
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TokenBudget {
    /// Maximum tokens to generate for this task type
    pub max_tokens: u32,
    /// Recommended temperature for this task type
    pub temperature: f32,
}

impl TokenBudget {
    /// Create a new token budget
    #[must_use]
    pub const fn new(max_tokens: u32, temperature: f32) -> Self {
        Self {
            max_tokens,
            temperature,
        }
    }
}

impl Default for TokenBudget {
    fn default() -> Self {
        Self {
            max_tokens: 2048,
            temperature: 0.7,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_heuristic_latin() {
        let estimator = HeuristicEstimator;
        assert_eq!(estimator.estimate(""), 0);
        assert_eq!(estimator.estimate("abcd"), 1);
        assert_eq!(estimator.estimate("abcde"), 2);
        assert_eq!(estimator.estimate(&"a".repeat(400)), 100);
    }

    #[test]
    fn test_heuristic_cjk_weighting() {
        let estimator = HeuristicEstimator;
        // 6 CJK code points: 6 / 1.5
        assert_eq!(estimator.estimate("患者血压正常"), 4);
        // 3 CJK + 3 latin, above the threshold: 3/1.5 + 3/4
        assert_eq!(estimator.estimate("血压正abc"), 3);
    }

    #[test]
    fn test_heuristic_below_cjk_threshold_uses_default_ratio() {
        let estimator = HeuristicEstimator;
        // 2 CJK out of 20 code points is 10%
        let text = format!("血压{}", "a".repeat(18));
        assert_eq!(estimator.estimate(&text), 5);
    }

    #[test]
    fn test_is_cjk() {
        assert!(is_cjk('血'));
        assert!(is_cjk('あ'));
        assert!(is_cjk('한'));
        assert!(!is_cjk('a'));
        assert!(!is_cjk('é'));
    }

    #[test]
    fn test_tiktoken_estimator() {
        let estimator = TiktokenEstimator;
        assert_eq!(estimator.estimate(""), 0);
        let tokens = estimator.estimate("Hello, world!");
        assert!(tokens > 0 && tokens < 10);
    }

    #[test]
    fn test_token_budget_default() {
        let budget = TokenBudget::default();
        assert_eq!(budget.max_tokens, 2048);
        assert_eq!(budget.temperature, 0.7);
    }

    proptest! {
        #[test]
        fn latin_estimate_is_monotonic(a in "[a-zA-Z ]{0,200}", b in "[a-zA-Z ]{0,200}") {
            let estimator = HeuristicEstimator;
            let joined = format!("{a}{b}");
            prop_assert!(estimator.estimate(&joined) >= estimator.estimate(&a));
        }

        #[test]
        fn cjk_estimate_is_monotonic(a in "[\u{4E00}-\u{9FFF}]{0,100}", b in "[\u{4E00}-\u{9FFF}]{0,100}") {
            let estimator = HeuristicEstimator;
            let joined = format!("{a}{b}");
            prop_assert!(estimator.estimate(&joined) >= estimator.estimate(&a));
        }

        #[test]
        fn repeated_mixed_text_is_monotonic(text in "[a-z\u{4E00}-\u{4E20} ]{1,40}", n in 1usize..20) {
            let estimator = HeuristicEstimator;
            let shorter = text.repeat(n);
            let longer = text.repeat(n + 1);
            prop_assert!(estimator.estimate(&longer) >= estimator.estimate(&shorter));
        }
    }
}
