use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod api;
mod battle;

pub use battle::{Battle, BattleOption, InvalidBattle, LifecycleState, NewBattle, TimeRemaining};

/// Identifies a battle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type), sqlx(transparent))]
#[serde(transparent)]
#[repr(transparent)]
pub struct BattleId(Uuid);

impl BattleId {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for BattleId {
    fn default() -> Self {
        Self(Uuid::new_v4())
    }
}

impl From<Uuid> for BattleId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl FromStr for BattleId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl fmt::Display for BattleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifies a single entry in the vote ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type), sqlx(transparent))]
#[serde(transparent)]
#[repr(transparent)]
pub struct VoteId(Uuid);

impl VoteId {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for VoteId {
    fn default() -> Self {
        Self(Uuid::new_v4())
    }
}

impl From<Uuid> for VoteId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for VoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Opaque voter identity as vouched for by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type), sqlx(transparent))]
#[serde(try_from = "String", into = "String")]
#[repr(transparent)]
pub struct VoterId(String);

impl VoterId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for VoterId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.trim().is_empty() {
            Err("Voter id cannot be empty".to_owned())
        } else {
            Ok(Self(value))
        }
    }
}

impl TryFrom<&str> for VoterId {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.to_owned().try_into()
    }
}

impl FromStr for VoterId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.try_into()
    }
}

impl From<VoterId> for String {
    fn from(voter_id: VoterId) -> Self {
        voter_id.0
    }
}

impl fmt::Display for VoterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One of the two sides of a battle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Choice {
    #[serde(rename = "a")]
    A,
    #[serde(rename = "b")]
    B,
}

impl Choice {
    pub const ALL: [Choice; 2] = [Choice::A, Choice::B];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Choice::A => "a",
            Choice::B => "b",
        }
    }

    pub const fn other(&self) -> Choice {
        match self {
            Choice::A => Choice::B,
            Choice::B => Choice::A,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid choice: {0:?} (expected \"a\" or \"b\")")]
pub struct InvalidChoice(pub String);

impl FromStr for Choice {
    type Err = InvalidChoice;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "a" | "A" => Ok(Choice::A),
            "b" | "B" => Ok(Choice::B),
            _ => Err(InvalidChoice(s.to_owned())),
        }
    }
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Vote counts for both sides of a battle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tally {
    pub votes_a: u64,
    pub votes_b: u64,
}

impl Tally {
    pub const fn new(votes_a: u64, votes_b: u64) -> Self {
        Self { votes_a, votes_b }
    }

    pub const fn count(&self, choice: Choice) -> u64 {
        match choice {
            Choice::A => self.votes_a,
            Choice::B => self.votes_b,
        }
    }

    pub const fn total(&self) -> u64 {
        self.votes_a + self.votes_b
    }

    /// Share of the total held by `choice`, in percent. Zero when nobody has
    /// voted yet.
    pub fn percentage(&self, choice: Choice) -> f64 {
        match self.total() {
            0 => 0.0,
            total => self.count(choice) as f64 / total as f64 * 100.0,
        }
    }

    /// Returns this tally with one more vote for `choice`.
    #[must_use]
    pub const fn with_vote(self, choice: Choice) -> Self {
        match choice {
            Choice::A => Self::new(self.votes_a + 1, self.votes_b),
            Choice::B => Self::new(self.votes_a, self.votes_b + 1),
        }
    }

    /// Builds a tally by counting ledger choices.
    pub fn from_choices(choices: impl IntoIterator<Item = Choice>) -> Self {
        choices
            .into_iter()
            .fold(Self::default(), |tally, choice| tally.with_vote(choice))
    }

    /// Who won, assuming voting is over.
    pub const fn outcome(&self) -> Outcome {
        if self.votes_a > self.votes_b {
            Outcome::Winner { choice: Choice::A }
        } else if self.votes_b > self.votes_a {
            Outcome::Winner { choice: Choice::B }
        } else if self.votes_a == 0 {
            Outcome::NoResult
        } else {
            Outcome::Tie
        }
    }
}

/// Result of a closed battle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Outcome {
    Winner { choice: Choice },
    Tie,
    /// Nobody voted.
    NoResult,
}

/// A single ledger entry. Never updated or deleted once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    pub id: VoteId,
    pub battle_id: BattleId,
    pub voter_id: VoterId,
    pub choice: Choice,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: time::OffsetDateTime,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_choice_parsing() {
        assert_eq!("a".parse::<Choice>(), Ok(Choice::A));
        assert_eq!("B".parse::<Choice>(), Ok(Choice::B));
        assert_eq!(" b ".parse::<Choice>(), Ok(Choice::B));
        assert_eq!(
            "c".parse::<Choice>(),
            Err(InvalidChoice("c".to_owned()))
        );
        assert!("".parse::<Choice>().is_err());
        assert!("ab".parse::<Choice>().is_err());
    }

    #[test]
    fn test_choice_serialization() {
        assert_eq!(serde_json::to_string(&Choice::A).unwrap(), r#""a""#);
        assert_eq!(
            serde_json::from_str::<Choice>(r#""b""#).unwrap(),
            Choice::B
        );
    }

    #[test]
    fn test_voter_id_rejects_blank() {
        assert!(VoterId::try_from("").is_err());
        assert!(VoterId::try_from("   ").is_err());
        assert_eq!(VoterId::try_from("v1").unwrap().as_str(), "v1");
        assert!(serde_json::from_str::<VoterId>(r#""""#).is_err());
    }

    #[test]
    fn test_tally_serialization() {
        let json = serde_json::to_value(Tally::new(3, 4)).unwrap();
        assert_eq!(json, serde_json::json!({ "votesA": 3, "votesB": 4 }));
    }

    #[test]
    fn test_percentage() {
        assert_eq!(Tally::default().percentage(Choice::A), 0.0);
        assert_eq!(Tally::new(1, 3).percentage(Choice::A), 25.0);
        assert_eq!(Tally::new(1, 3).percentage(Choice::B), 75.0);
    }

    #[test]
    fn test_outcome() {
        assert_eq!(
            Tally::new(3, 2).outcome(),
            Outcome::Winner { choice: Choice::A }
        );
        assert_eq!(
            Tally::new(0, 1).outcome(),
            Outcome::Winner { choice: Choice::B }
        );
        assert_eq!(Tally::new(5, 5).outcome(), Outcome::Tie);
        assert_eq!(Tally::new(0, 0).outcome(), Outcome::NoResult);
    }

    #[test]
    fn test_outcome_serialization() {
        assert_eq!(
            serde_json::to_value(Outcome::Winner { choice: Choice::B }).unwrap(),
            serde_json::json!({ "kind": "winner", "choice": "b" })
        );
        assert_eq!(
            serde_json::to_value(Outcome::NoResult).unwrap(),
            serde_json::json!({ "kind": "noResult" })
        );
    }

    fn arb_choice() -> impl Strategy<Value = Choice> {
        prop_oneof![Just(Choice::A), Just(Choice::B)]
    }

    proptest! {
        #[test]
        fn prop_from_choices_counts_every_vote(choices in proptest::collection::vec(arb_choice(), 0..200)) {
            let tally = Tally::from_choices(choices.iter().copied());
            prop_assert_eq!(tally.total(), choices.len() as u64);
            prop_assert_eq!(
                tally.votes_a,
                choices.iter().filter(|c| **c == Choice::A).count() as u64
            );
        }

        #[test]
        fn prop_outcome_is_tie_only_for_equal_nonzero(votes_a in 0u64..1000, votes_b in 0u64..1000) {
            let outcome = Tally::new(votes_a, votes_b).outcome();
            prop_assert_eq!(outcome == Outcome::Tie, votes_a == votes_b && votes_a > 0);
            prop_assert_eq!(outcome == Outcome::NoResult, votes_a == 0 && votes_b == 0);
        }

        #[test]
        fn prop_percentages_sum_to_100(votes_a in 0u64..1000, votes_b in 1u64..1000) {
            let tally = Tally::new(votes_a, votes_b);
            let sum = tally.percentage(Choice::A) + tally.percentage(Choice::B);
            prop_assert!((sum - 100.0).abs() < 1e-9);
        }
    }
}
