//! Storage seam for battles, the vote ledger and cached tallies.
//!
//! Two implementations exist: [`PgStore`][`crate::db::PgStore`] for
//! production and [`MemoryStore`][`crate::memory::MemoryStore`] for running
//! without a database and for tests. Both must uphold the same contract:
//!
//! - at most one ledger entry per (battle, voter), even under concurrent
//!   [`record_vote`][`BattleStore::record_vote`] calls;
//! - the lifecycle check, the ledger insert and the counter increment happen
//!   in one atomic scope, so the cached tally never diverges from the ledger
//!   and no vote lands on a battle that closed in the meantime.

use std::future::Future;

use time::OffsetDateTime;
use types_rs::arena::{Battle, BattleId, Choice, Tally, Vote, VoterId};

use crate::error::Result;

/// A vote that made it into the ledger together with the tally right after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedVote {
    pub vote: Vote,
    pub tally: Tally,
}

pub trait BattleStore: Send + Sync + 'static {
    /// Persists a freshly created battle.
    fn create_battle(&self, battle: Battle) -> impl Future<Output = Result<Battle>> + Send;

    fn get_battle(
        &self,
        battle_id: BattleId,
    ) -> impl Future<Output = Result<Option<Battle>>> + Send;

    /// Active battles, newest first.
    fn list_active_battles(&self) -> impl Future<Output = Result<Vec<Battle>>> + Send;

    /// Soft-closes a battle. Its votes stay in the ledger.
    fn deactivate_battle(&self, battle_id: BattleId)
        -> impl Future<Output = Result<Battle>> + Send;

    /// Records `voter_id`'s vote if the battle is open at `now` and the voter
    /// has not voted in it yet, bumping the cached tally in the same atomic
    /// scope.
    fn record_vote(
        &self,
        battle_id: BattleId,
        voter_id: &VoterId,
        choice: Choice,
        now: OffsetDateTime,
    ) -> impl Future<Output = Result<RecordedVote>> + Send;

    /// Cached tally.
    fn get_tally(&self, battle_id: BattleId) -> impl Future<Output = Result<Tally>> + Send;

    /// Tally counted straight from the ledger.
    fn ledger_tally(&self, battle_id: BattleId) -> impl Future<Output = Result<Tally>> + Send;

    /// Overwrites the cached tally with the ledger count.
    fn reconcile_tally(&self, battle_id: BattleId) -> impl Future<Output = Result<Tally>> + Send;

    /// Every vote `voter_id` has cast, oldest first.
    fn votes_by_voter(&self, voter_id: &VoterId) -> impl Future<Output = Result<Vec<Vote>>> + Send;

    /// Total reward points awarded to `voter_id`.
    fn voter_points(&self, voter_id: &VoterId) -> impl Future<Output = Result<u64>> + Send;
}
