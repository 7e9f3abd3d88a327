use crate::format::{escape_markdown, mention};
use crate::models::{PollVote, StoredUser, VoteOption};
use crate::telegram::{InlineKeyboardButton, InlineKeyboardMarkup};
use std::collections::HashMap;

/// Eligible voters split by their current vote, each bucket in eligible order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tally {
    pub affirmative: Vec<StoredUser>,
    pub negative: Vec<StoredUser>,
    pub pending: Vec<StoredUser>,
}

impl Tally {
    pub fn partition(eligible: &[StoredUser], votes: &[PollVote]) -> Self {
        let by_voter: HashMap<i64, VoteOption> = votes.iter().map(|v| (v.user_id, v.vote)).collect();

        let mut tally = Tally::default();
        for voter in eligible {
            let bucket = match by_voter.get(&voter.id) {
                Some(VoteOption::Yes) => &mut tally.affirmative,
                Some(VoteOption::No) => &mut tally.negative,
                None => &mut tally.pending,
            };
            bucket.push(voter.clone());
        }
        tally
    }

    pub fn total(&self) -> usize {
        self.affirmative.len() + self.negative.len() + self.pending.len()
    }
}

/// MarkdownV2 body of the tally message. Every voter is mentioned so the
/// pending ones get notified.
pub fn render(topic: &str, tally: &Tally) -> String {
    let mut text = format!("*{}*\n", escape_markdown(topic));

    let sections = [
        ("👍", &tally.affirmative),
        ("👎", &tally.negative),
        ("⏳", &tally.pending),
    ];
    for (label, voters) in sections {
        if voters.is_empty() {
            continue;
        }
        let names: Vec<String> = voters.iter().map(mention).collect();
        text.push_str(&format!("\n{} \\({}\\): {}", label, voters.len(), names.join(", ")));
    }

    if tally.total() == 0 {
        text.push_str("\nnobody follows this topic");
    }
    text
}

/// Inline buttons carrying the option index as callback data.
pub fn vote_keyboard(tally: &Tally) -> InlineKeyboardMarkup {
    let button = |label: &str, count: usize, option: VoteOption| InlineKeyboardButton {
        text: format!("{} {}", label, count),
        callback_data: option.index().to_string(),
    };
    InlineKeyboardMarkup {
        inline_keyboard: vec![vec![
            button("👍", tally.affirmative.len(), VoteOption::Yes),
            button("👎", tally.negative.len(), VoteOption::No),
        ]],
    }
}
