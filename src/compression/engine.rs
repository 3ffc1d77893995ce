//! Compression Engine — picks a compression strategy from current usage
//! and estimates what it would buy before the pipeline actually runs it.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Standard,
    Aggressive,
    Selective,
    Emergency,
}

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy)]
pub struct StrategyParams {
    pub keep_recent: usize,
    pub min_to_compress: usize,
    pub compress_user: bool,
    pub level: u8,
    pub max_summary_tokens: usize,
}

impl Strategy {
    pub fn params(self) -> StrategyParams {
        match self {
            Strategy::Standard => StrategyParams {
                keep_recent: 5,
                min_to_compress: 2,
                compress_user: false,
                level: 3,
                max_summary_tokens: 500,
            },
            Strategy::Aggressive => StrategyParams {
                keep_recent: 3,
                min_to_compress: 1,
                compress_user: false,
                level: 2,
                max_summary_tokens: 300,
            },
            Strategy::Selective => StrategyParams {
                keep_recent: 7,
                min_to_compress: 3,
                compress_user: false,
                level: 3,
                max_summary_tokens: 500,
            },
            Strategy::Emergency => StrategyParams {
                keep_recent: 2,
                min_to_compress: 1,
                compress_user: true,
                level: 1,
                max_summary_tokens: 200,
            },
        }
    }

    /// Ratio of tokens saved relative to the tokens targeted, used by
    /// [`estimate_compression`] since the true ratio is only known after
    /// summarization actually runs.
    fn expected_ratio(self) -> f64 {
        match self {
            Strategy::Emergency => 0.10,
            Strategy::Aggressive => 0.15,
            Strategy::Standard => 0.20,
            Strategy::Selective => 0.25,
        }
    }
}

/// `recommendStrategy(currentTokens, limit)`: usage ≥ 0.95 → emergency;
/// ≥ 0.85 → aggressive; ≥ 0.70 → standard; else selective.
pub fn recommend_strategy(current_tokens: usize, limit: usize) -> Strategy {
    if limit == 0 {
        return Strategy::Emergency;
    }
    let usage = current_tokens as f64 / limit as f64;
    if usage >= 0.95 {
        Strategy::Emergency
    } else if usage >= 0.85 {
        Strategy::Aggressive
    } else if usage >= 0.70 {
        Strategy::Standard
    } else {
        Strategy::Selective
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CompressionEstimate {
    pub tokens_saved: usize,
    pub ratio: f64,
    pub worth_compressing: bool,
}

/// `estimateCompression(messages, strategy) → { tokensSaved, ratio, worthCompressing }`
/// using the strategy's expected compression ratio. `worthCompressing = tokensSaved ≥ 500`.
pub fn estimate_compression(target_tokens: usize, strategy: Strategy) -> CompressionEstimate {
    let ratio = strategy.expected_ratio();
    let tokens_saved = ((target_tokens as f64) * (1.0 - ratio)).round() as usize;
    CompressionEstimate {
        tokens_saved,
        ratio,
        worth_compressing: tokens_saved >= 500,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recommend_strategy_thresholds() {
        assert_eq!(recommend_strategy(96, 100), Strategy::Emergency);
        assert_eq!(recommend_strategy(85, 100), Strategy::Aggressive);
        assert_eq!(recommend_strategy(70, 100), Strategy::Standard);
        assert_eq!(recommend_strategy(50, 100), Strategy::Selective);
    }

    #[test]
    fn strategy_params_match_table() {
        let standard = Strategy::Standard.params();
        assert_eq!(standard.keep_recent, 5);
        assert_eq!(standard.min_to_compress, 2);
        assert!(!standard.compress_user);
        assert_eq!(standard.level, 3);
        assert_eq!(standard.max_summary_tokens, 500);

        let emergency = Strategy::Emergency.params();
        assert_eq!(emergency.keep_recent, 2);
        assert!(emergency.compress_user);
        assert_eq!(emergency.level, 1);
    }

    #[test]
    fn estimate_compression_worth_compressing_threshold() {
        let big = estimate_compression(10_000, Strategy::Standard);
        assert!(big.worth_compressing);
        let small = estimate_compression(100, Strategy::Standard);
        assert!(!small.worth_compressing);
    }
}
