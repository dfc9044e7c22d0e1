//! Request and response bodies of the arena HTTP API.

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::{Battle, BattleId, Choice, LifecycleState, Outcome, Tally};

/// Header carrying the voter identity set by the upstream identity provider.
pub const VOTER_ID_HEADER: &str = "x-voter-id";

/// Body of `POST /api/battles/:battle_id/votes`. The choice is kept as a raw
/// string so an unknown value is reported as [`ErrorKind::InvalidChoice`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CastVoteRequest {
    pub choice: String,
}

/// Successful response to a vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteReceipt {
    pub votes_a: u64,
    pub votes_b: u64,
    pub your_choice: Choice,
}

impl VoteReceipt {
    pub const fn new(tally: Tally, your_choice: Choice) -> Self {
        Self {
            votes_a: tally.votes_a,
            votes_b: tally.votes_b,
            your_choice,
        }
    }

    pub const fn tally(&self) -> Tally {
        Tally::new(self.votes_a, self.votes_b)
    }
}

/// A battle together with everything derived from it at read time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BattleSummary {
    #[serde(flatten)]
    pub battle: Battle,
    pub state: LifecycleState,
    pub outcome: Option<Outcome>,
    pub time_remaining: Option<String>,
    pub percentage_a: f64,
    pub percentage_b: f64,
}

impl BattleSummary {
    pub fn new(battle: Battle, now: OffsetDateTime) -> Self {
        Self {
            state: battle.state_at(now),
            outcome: battle.outcome_at(now),
            time_remaining: battle.time_remaining(now).map(|t| t.to_string()),
            percentage_a: battle.tally.percentage(Choice::A),
            percentage_b: battle.tally.percentage(Choice::B),
            battle,
        }
    }
}

/// Choices a voter has made, keyed by battle.
pub type VoterVotes = BTreeMap<BattleId, Choice>;

/// Arena statistics from one voter's point of view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoterStats {
    /// Number of active battles.
    pub total_battles: u64,
    /// Votes cast across all active battles.
    pub total_votes: u64,
    pub user_votes: u64,
    pub user_points: u64,
}

/// Error categories reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    BattleNotFound,
    BattleNotOpen,
    InvalidChoice,
    DuplicateVote,
    StoreUnavailable,
    Unauthorized,
    InvalidBattle,
}

impl ErrorKind {
    /// Whether repeating the same request may succeed.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// JSON body of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub success: bool,
    pub error: ErrorKind,
    pub message: String,
}
