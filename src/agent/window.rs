//! Context window selection over stored turns.

use super::transcript::Turn;
use crate::config::HistoryLimit;

/// Rough token estimate (~4 chars per token)
pub fn estimate_tokens(text: &str) -> usize {
    text.len() / 4
}

pub fn turn_tokens(turn: &Turn) -> usize {
    estimate_tokens(&turn.user_message) + estimate_tokens(&turn.assistant_message)
}

/// Select the suffix of `turns` that goes into the next request.
///
/// Turns are never split. With a token budget, whole turns are dropped from
/// the oldest end until the rest fits, but the newest turn is always kept.
pub fn window(turns: &[Turn], limit: HistoryLimit) -> &[Turn] {
    match limit {
        HistoryLimit::Turns(n) => &turns[turns.len().saturating_sub(n)..],
        HistoryLimit::Tokens { tokens: budget } => {
            let mut total: usize = turns.iter().map(turn_tokens).sum();
            let mut start = 0;

            while total > budget && start + 1 < turns.len() {
                total -= turn_tokens(&turns[start]);
                start += 1;
            }

            &turns[start..]
        }
    }
}
