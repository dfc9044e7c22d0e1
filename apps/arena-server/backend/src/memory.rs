//! In-process [`BattleStore`] used when no database is configured and in
//! tests.
//!
//! Each battle lives behind its own mutex together with its part of the vote
//! ledger, so the lifecycle check, the duplicate check, the ledger insert and
//! the counter increment for one battle happen under a single lock while
//! votes on different battles proceed in parallel.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, RwLock},
};

use time::OffsetDateTime;
use types_rs::arena::{Battle, BattleId, Choice, Tally, Vote, VoteId, VoterId};

use crate::{
    error::{Error, Result},
    rewards::{RewardAward, RewardNotifier},
    store::{BattleStore, RecordedVote},
};

#[derive(Debug)]
struct BattleEntry {
    battle: Battle,
    ledger: HashMap<VoterId, Vote>,
}

impl BattleEntry {
    fn ledger_tally(&self) -> Tally {
        Tally::from_choices(self.ledger.values().map(|vote| vote.choice))
    }
}

type SharedEntry = Arc<Mutex<BattleEntry>>;

#[derive(Debug, Default)]
pub struct MemoryStore {
    battles: RwLock<HashMap<BattleId, SharedEntry>>,
    rewards: Mutex<HashMap<VoteId, RewardAward>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, battle_id: BattleId) -> Result<Option<SharedEntry>> {
        let battles = self
            .battles
            .read()
            .map_err(|_| Error::store_unavailable("battle index lock poisoned"))?;
        Ok(battles.get(&battle_id).cloned())
    }

    fn with_entry<T>(
        &self,
        battle_id: BattleId,
        f: impl FnOnce(&mut BattleEntry) -> Result<T>,
    ) -> Result<T> {
        let entry = self
            .entry(battle_id)?
            .ok_or(Error::BattleNotFound(battle_id))?;
        let mut entry = entry
            .lock()
            .map_err(|_| Error::store_unavailable("battle lock poisoned"))?;
        f(&mut entry)
    }

    fn entries(&self) -> Result<Vec<SharedEntry>> {
        let battles = self
            .battles
            .read()
            .map_err(|_| Error::store_unavailable("battle index lock poisoned"))?;
        Ok(battles.values().cloned().collect())
    }

    /// Overwrites the cached counts without touching the ledger, the way a
    /// lost counter update would.
    #[cfg(test)]
    pub(crate) fn corrupt_cached_tally(&self, battle_id: BattleId, tally: Tally) {
        self.with_entry(battle_id, |entry| {
            entry.battle.tally = tally;
            Ok(())
        })
        .unwrap();
    }
}

impl BattleStore for MemoryStore {
    async fn create_battle(&self, battle: Battle) -> Result<Battle> {
        let mut battles = self
            .battles
            .write()
            .map_err(|_| Error::store_unavailable("battle index lock poisoned"))?;
        battles.insert(
            battle.id,
            Arc::new(Mutex::new(BattleEntry {
                battle: battle.clone(),
                ledger: HashMap::new(),
            })),
        );
        Ok(battle)
    }

    async fn get_battle(&self, battle_id: BattleId) -> Result<Option<Battle>> {
        match self.with_entry(battle_id, |entry| Ok(entry.battle.clone())) {
            Ok(battle) => Ok(Some(battle)),
            Err(Error::BattleNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn list_active_battles(&self) -> Result<Vec<Battle>> {
        let mut battles = Vec::new();
        for entry in self.entries()? {
            let entry = entry
                .lock()
                .map_err(|_| Error::store_unavailable("battle lock poisoned"))?;
            if entry.battle.is_active {
                battles.push(entry.battle.clone());
            }
        }
        battles.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(battles)
    }

    async fn deactivate_battle(&self, battle_id: BattleId) -> Result<Battle> {
        self.with_entry(battle_id, |entry| {
            entry.battle.is_active = false;
            Ok(entry.battle.clone())
        })
    }

    async fn record_vote(
        &self,
        battle_id: BattleId,
        voter_id: &VoterId,
        choice: Choice,
        now: OffsetDateTime,
    ) -> Result<RecordedVote> {
        self.with_entry(battle_id, |entry| {
            let state = entry.battle.state_at(now);
            if !state.is_open() {
                return Err(Error::BattleNotOpen { battle_id, state });
            }

            if entry.ledger.contains_key(voter_id) {
                return Err(Error::DuplicateVote {
                    battle_id,
                    voter_id: voter_id.clone(),
                });
            }

            let vote = Vote {
                id: VoteId::new(),
                battle_id,
                voter_id: voter_id.clone(),
                choice,
                created_at: now,
            };
            entry.ledger.insert(voter_id.clone(), vote.clone());
            entry.battle.tally = entry.battle.tally.with_vote(choice);

            Ok(RecordedVote {
                vote,
                tally: entry.battle.tally,
            })
        })
    }

    async fn get_tally(&self, battle_id: BattleId) -> Result<Tally> {
        self.with_entry(battle_id, |entry| Ok(entry.battle.tally))
    }

    async fn ledger_tally(&self, battle_id: BattleId) -> Result<Tally> {
        self.with_entry(battle_id, |entry| Ok(entry.ledger_tally()))
    }

    async fn reconcile_tally(&self, battle_id: BattleId) -> Result<Tally> {
        self.with_entry(battle_id, |entry| {
            let counted = entry.ledger_tally();
            if counted != entry.battle.tally {
                tracing::warn!(
                    %battle_id,
                    cached = ?entry.battle.tally,
                    ?counted,
                    "cached tally drifted from the ledger"
                );
                entry.battle.tally = counted;
            }
            Ok(counted)
        })
    }

    async fn votes_by_voter(&self, voter_id: &VoterId) -> Result<Vec<Vote>> {
        let mut votes = Vec::new();
        for entry in self.entries()? {
            let entry = entry
                .lock()
                .map_err(|_| Error::store_unavailable("battle lock poisoned"))?;
            votes.extend(entry.ledger.get(voter_id).cloned());
        }
        votes.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(votes)
    }

    async fn voter_points(&self, voter_id: &VoterId) -> Result<u64> {
        let rewards = self
            .rewards
            .lock()
            .map_err(|_| Error::store_unavailable("reward lock poisoned"))?;
        Ok(rewards
            .values()
            .filter(|award| &award.voter_id == voter_id)
            .map(|award| u64::from(award.points))
            .sum())
    }
}

impl RewardNotifier for MemoryStore {
    fn award(&self, award: RewardAward) {
        match self.rewards.lock() {
            Ok(mut rewards) => {
                rewards.entry(award.vote_id).or_insert(award);
            }
            Err(_) => tracing::error!(vote_id = %award.vote_id, "failed to award points: reward lock poisoned"),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use time::Duration;
    use types_rs::arena::{LifecycleState, NewBattle};

    use super::*;

    fn open_battle(now: OffsetDateTime) -> Battle {
        NewBattle {
            title: "Denim vs. Linen".to_owned(),
            opens_at: Some(now - Duration::hours(1)),
            closes_at: Some(now + Duration::hours(1)),
            ..NewBattle::default()
        }
        .into_battle(now)
    }

    fn voter(id: &str) -> VoterId {
        VoterId::try_from(id).unwrap()
    }

    #[tokio::test]
    async fn test_record_vote_updates_cache_and_ledger() {
        let store = MemoryStore::new();
        let now = OffsetDateTime::now_utc();
        let battle = store.create_battle(open_battle(now)).await.unwrap();

        let recorded = store
            .record_vote(battle.id, &voter("v1"), Choice::B, now)
            .await
            .unwrap();
        assert_eq!(recorded.tally, Tally::new(0, 1));
        assert_eq!(recorded.vote.choice, Choice::B);

        assert_eq!(store.get_tally(battle.id).await.unwrap(), Tally::new(0, 1));
        assert_eq!(store.ledger_tally(battle.id).await.unwrap(), Tally::new(0, 1));
        assert_eq!(
            store.votes_by_voter(&voter("v1")).await.unwrap(),
            vec![recorded.vote]
        );
    }

    #[tokio::test]
    async fn test_duplicate_vote_leaves_tally_alone() {
        let store = MemoryStore::new();
        let now = OffsetDateTime::now_utc();
        let battle = store.create_battle(open_battle(now)).await.unwrap();

        store
            .record_vote(battle.id, &voter("v1"), Choice::A, now)
            .await
            .unwrap();
        let err = store
            .record_vote(battle.id, &voter("v1"), Choice::B, now)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::DuplicateVote { .. }), "{err:?}");
        assert_eq!(store.get_tally(battle.id).await.unwrap(), Tally::new(1, 0));
    }

    #[tokio::test]
    async fn test_unknown_battle() {
        let store = MemoryStore::new();
        let battle_id = BattleId::new();

        assert_eq!(store.get_battle(battle_id).await.unwrap(), None);
        assert!(matches!(
            store.get_tally(battle_id).await,
            Err(Error::BattleNotFound(id)) if id == battle_id
        ));
        assert!(matches!(
            store
                .record_vote(battle_id, &voter("v1"), Choice::A, OffsetDateTime::now_utc())
                .await,
            Err(Error::BattleNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_deactivated_battles_are_hidden_but_kept() {
        let store = MemoryStore::new();
        let now = OffsetDateTime::now_utc();
        let battle = store.create_battle(open_battle(now)).await.unwrap();
        store
            .record_vote(battle.id, &voter("v1"), Choice::A, now)
            .await
            .unwrap();

        let deactivated = store.deactivate_battle(battle.id).await.unwrap();
        assert!(!deactivated.is_active);
        assert_eq!(deactivated.state_at(now), LifecycleState::Closed);

        assert!(store.list_active_battles().await.unwrap().is_empty());
        assert_eq!(store.votes_by_voter(&voter("v1")).await.unwrap().len(), 1);
        assert!(matches!(
            store
                .record_vote(battle.id, &voter("v2"), Choice::A, now)
                .await,
            Err(Error::BattleNotOpen {
                state: LifecycleState::Closed,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_list_active_battles_newest_first() {
        let store = MemoryStore::new();
        let now = OffsetDateTime::now_utc();
        let older = store
            .create_battle(open_battle(now - Duration::minutes(5)))
            .await
            .unwrap();
        let newer = store.create_battle(open_battle(now)).await.unwrap();

        let ids: Vec<_> = store
            .list_active_battles()
            .await
            .unwrap()
            .into_iter()
            .map(|battle| battle.id)
            .collect();
        assert_eq!(ids, vec![newer.id, older.id]);
    }

    #[tokio::test]
    async fn test_reconcile_restores_ledger_counts() {
        let store = MemoryStore::new();
        let now = OffsetDateTime::now_utc();
        let battle = store.create_battle(open_battle(now)).await.unwrap();
        for (id, choice) in [("v1", Choice::A), ("v2", Choice::A), ("v3", Choice::B)] {
            store
                .record_vote(battle.id, &voter(id), choice, now)
                .await
                .unwrap();
        }

        store.corrupt_cached_tally(battle.id, Tally::new(7, 0));
        assert_eq!(store.reconcile_tally(battle.id).await.unwrap(), Tally::new(2, 1));
        assert_eq!(store.get_tally(battle.id).await.unwrap(), Tally::new(2, 1));
    }

    #[test]
    fn test_awards_are_idempotent_per_vote() {
        let store = MemoryStore::new();
        let award = RewardAward {
            vote_id: VoteId::new(),
            voter_id: voter("v1"),
            points: 10,
        };

        store.award(award.clone());
        store.award(award);
        store.award(RewardAward {
            vote_id: VoteId::new(),
            voter_id: voter("v1"),
            points: 5,
        });

        let points = futures::executor::block_on(store.voter_points(&voter("v1"))).unwrap();
        assert_eq!(points, 15);
    }
}
