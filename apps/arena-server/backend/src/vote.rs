//! Casting votes.

use std::{fmt, sync::Arc};

use time::OffsetDateTime;
use types_rs::arena::{api::VoteReceipt, BattleId, Choice, VoterId};

use crate::{
    error::Result,
    rewards::{DynRewardNotifier, RewardAward},
    store::BattleStore,
};

/// Validates votes, records them through a [`BattleStore`] and notifies the
/// reward system about every vote that lands.
pub struct VoteService<S> {
    store: Arc<S>,
    rewards: DynRewardNotifier,
    points_per_vote: u32,
}

impl<S> fmt::Debug for VoteService<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoteService")
            .field("points_per_vote", &self.points_per_vote)
            .finish_non_exhaustive()
    }
}

impl<S: BattleStore> VoteService<S> {
    pub fn new(store: Arc<S>, rewards: DynRewardNotifier, points_per_vote: u32) -> Self {
        Self {
            store,
            rewards,
            points_per_vote,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Records `voter_id`'s vote for `choice` in `battle_id`.
    ///
    /// The choice is validated before the store is consulted, so an invalid
    /// choice is reported even for an unknown battle. On success the reward
    /// notifier is called exactly once; it is never called on failure.
    pub async fn cast_vote(
        &self,
        battle_id: BattleId,
        voter_id: &VoterId,
        choice: &str,
    ) -> Result<VoteReceipt> {
        let choice: Choice = choice.parse()?;

        let recorded = self
            .store
            .record_vote(battle_id, voter_id, choice, OffsetDateTime::now_utc())
            .await?;

        tracing::info!(
            %battle_id,
            %voter_id,
            %choice,
            votes_a = recorded.tally.votes_a,
            votes_b = recorded.tally.votes_b,
            "vote recorded"
        );

        self.rewards.award(RewardAward {
            vote_id: recorded.vote.id,
            voter_id: voter_id.clone(),
            points: self.points_per_vote,
        });

        Ok(VoteReceipt::new(recorded.tally, choice))
    }
}
