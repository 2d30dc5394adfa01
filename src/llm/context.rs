//! History selection for outgoing requests.
//!
//! The whole transcript is resent on every turn by default, so context grows
//! with conversation length. A [`ContextPolicy`] decides which prior turns go
//! into the next request.

use std::borrow::Cow;

use super::{Role, Turn};

/// Chooses the history sent with the next request.
pub trait ContextPolicy: Send + Sync + std::fmt::Debug {
    /// Map the full transcript to the turns to send, oldest first.
    fn select<'a>(&self, transcript: &'a [Turn]) -> Cow<'a, [Turn]>;

    /// Name for logs.
    fn name(&self) -> &'static str;
}

/// Send every prior turn.
#[derive(Debug, Clone, Copy, Default)]
pub struct FullHistory;

impl ContextPolicy for FullHistory {
    fn select<'a>(&self, transcript: &'a [Turn]) -> Cow<'a, [Turn]> {
        Cow::Borrowed(transcript)
    }

    fn name(&self) -> &'static str {
        "full"
    }
}

/// Send at most the last `n` turns.
///
/// The window never opens on a model turn, so the history always starts with
/// a user turn.
#[derive(Debug, Clone, Copy)]
pub struct RecentTurns(pub usize);

impl ContextPolicy for RecentTurns {
    fn select<'a>(&self, transcript: &'a [Turn]) -> Cow<'a, [Turn]> {
        let mut start = transcript.len().saturating_sub(self.0);
        while start < transcript.len() && transcript[start].role == Role::Model {
            start += 1;
        }
        Cow::Borrowed(&transcript[start..])
    }

    fn name(&self) -> &'static str {
        "recent"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transcript(pairs: usize) -> Vec<Turn> {
        (0..pairs)
            .flat_map(|i| [Turn::user(format!("q{i}")), Turn::model(format!("a{i}"))])
            .collect()
    }

    #[test]
    fn test_full_history_keeps_everything() {
        let turns = transcript(5);
        assert_eq!(FullHistory.select(&turns).as_ref(), turns.as_slice());
    }

    #[test]
    fn test_recent_turns_window() {
        let turns = transcript(5);
        let window = RecentTurns(4).select(&turns);
        assert_eq!(window.len(), 4);
        assert_eq!(window[0], Turn::user("q3"));
    }

    #[test]
    fn test_recent_turns_skips_leading_model_turn() {
        let turns = transcript(3);
        let window = RecentTurns(3).select(&turns);
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].role, Role::User);
    }

    #[test]
    fn test_recent_turns_zero_and_short() {
        let turns = transcript(1);
        assert!(RecentTurns(0).select(&turns).is_empty());
        assert_eq!(RecentTurns(10).select(&turns).len(), 2);
    }
}
