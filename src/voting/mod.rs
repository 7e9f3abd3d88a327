pub mod tally;

use crate::db::Database;
use crate::error::BotResult;
use crate::models::{StoredUser, VoteOption, VoteOutcome};
use log::{debug, info};

pub use tally::{render, vote_keyboard, Tally};

/// Records a vote with toggle semantics.
///
/// No previous vote stores the option, the same option retracts it, and a
/// different option replaces it in place. Concurrent submissions for the same
/// voter are serialized by the database.
pub async fn record_vote(
    database: &Database,
    poll_id: &str,
    voter_id: i64,
    option: VoteOption,
) -> BotResult<VoteOutcome> {
    let outcome = database.toggle_poll_vote(poll_id, voter_id, option).await?;
    info!("Vote on poll {} by user {}: {:?} ({:?})", poll_id, voter_id, option, outcome);
    Ok(outcome)
}

/// Removes a voter's choice. Returns false when there was none.
pub async fn retract_vote(database: &Database, poll_id: &str, voter_id: i64) -> BotResult<bool> {
    let deleted = database.delete_poll_vote(poll_id, voter_id).await?;
    if deleted == 0 {
        debug!("User {} had no vote on poll {} to retract", voter_id, poll_id);
    }
    Ok(deleted > 0)
}

/// Reads the current votes and partitions `eligible` by them. Nothing is cached.
pub async fn compute_tally(database: &Database, poll_id: &str, eligible: &[StoredUser]) -> BotResult<Tally> {
    let votes = database.find_poll_votes(poll_id).await?;
    Ok(Tally::partition(eligible, &votes))
}
