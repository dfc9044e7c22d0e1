//! Reward points for voting.
//!
//! Points are granted by a fire-and-forget notification sent after a vote is
//! recorded. The notification cannot fail from the caller's point of view:
//! a recorded vote stands regardless of what happens to its reward.
//! Implementations key awards by vote id so a replayed notification is a
//! no-op.

use std::sync::Arc;

use types_rs::arena::{VoteId, VoterId};

/// "Award `points` to `voter_id` for `vote_id`."
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardAward {
    pub vote_id: VoteId,
    pub voter_id: VoterId,
    pub points: u32,
}

pub type DynRewardNotifier = Arc<dyn RewardNotifier + Send + Sync>;

#[cfg_attr(test, mockall::automock)]
pub trait RewardNotifier {
    /// Queues the award and returns immediately.
    fn award(&self, award: RewardAward);
}
