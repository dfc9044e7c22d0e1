use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::{BattleId, Outcome, Tally};

/// One side of a battle as presented to voters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BattleOption {
    pub description: String,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// A two-option voting contest with a schedule.
///
/// The counts in [`Battle::tally`] are a cached projection of the vote
/// ledger; the ledger is authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Battle {
    pub id: BattleId,
    pub title: String,
    pub description: String,
    pub option_a: BattleOption,
    pub option_b: BattleOption,
    #[serde(with = "time::serde::rfc3339")]
    pub opens_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub closes_at: Option<OffsetDateTime>,
    pub is_active: bool,
    #[serde(flatten)]
    pub tally: Tally,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Battle {
    pub fn state_at(&self, now: OffsetDateTime) -> LifecycleState {
        LifecycleState::evaluate(self.is_active, self.opens_at, self.closes_at, now)
    }

    /// The result of the battle, or `None` while it has not closed yet.
    pub fn outcome_at(&self, now: OffsetDateTime) -> Option<Outcome> {
        match self.state_at(now) {
            LifecycleState::Closed => Some(self.tally.outcome()),
            LifecycleState::Scheduled | LifecycleState::Open => None,
        }
    }

    /// Time left until the battle closes. `None` for battles without an end.
    pub fn time_remaining(&self, now: OffsetDateTime) -> Option<TimeRemaining> {
        let closes_at = self.closes_at?;
        let remaining = closes_at - now;
        Some(if remaining <= time::Duration::ZERO {
            TimeRemaining::Ended
        } else {
            TimeRemaining::Remaining(remaining)
        })
    }
}

/// Where a battle is in its schedule at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LifecycleState {
    Scheduled,
    Open,
    Closed,
}

impl LifecycleState {
    /// Classifies a battle. Deactivation and a passed `closes_at` both close
    /// the battle for good; `closes_at` is exclusive.
    pub fn evaluate(
        is_active: bool,
        opens_at: OffsetDateTime,
        closes_at: Option<OffsetDateTime>,
        now: OffsetDateTime,
    ) -> Self {
        if !is_active {
            return Self::Closed;
        }

        match closes_at {
            Some(closes_at) if now >= closes_at => Self::Closed,
            _ if now < opens_at => Self::Scheduled,
            _ => Self::Open,
        }
    }

    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Scheduled => "scheduled",
            Self::Open => "open",
            Self::Closed => "closed",
        })
    }
}

/// Countdown until a battle closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeRemaining {
    Ended,
    Remaining(time::Duration),
}

impl fmt::Display for TimeRemaining {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let remaining = match self {
            Self::Ended => return f.write_str("Ended"),
            Self::Remaining(remaining) => *remaining,
        };

        let days = remaining.whole_days();
        let hours = remaining.whole_hours() % 24;
        let minutes = remaining.whole_minutes() % 60;

        if days > 0 {
            write!(f, "{days}d {hours}h left")
        } else if hours > 0 {
            write!(f, "{hours}h {minutes}m left")
        } else {
            write!(f, "{minutes}m left")
        }
    }
}

/// Input for creating a battle. Counts always start at zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBattle {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub option_a: BattleOption,
    pub option_b: BattleOption,
    /// Defaults to the creation time.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub opens_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub closes_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidBattle {
    #[error("battle title cannot be empty")]
    EmptyTitle,

    #[error("battle must close after it opens")]
    ClosesBeforeOpening,

    /// The request body could not be read as a battle.
    #[error("malformed battle: {0}")]
    Malformed(String),
}

impl NewBattle {
    pub fn validate(&self, now: OffsetDateTime) -> Result<(), InvalidBattle> {
        if self.title.trim().is_empty() {
            return Err(InvalidBattle::EmptyTitle);
        }

        let opens_at = self.opens_at.unwrap_or(now);
        match self.closes_at {
            Some(closes_at) if closes_at <= opens_at => Err(InvalidBattle::ClosesBeforeOpening),
            _ => Ok(()),
        }
    }

    /// Materializes the battle with a fresh id and empty tally.
    pub fn into_battle(self, now: OffsetDateTime) -> Battle {
        Battle {
            id: BattleId::new(),
            title: self.title,
            description: self.description,
            option_a: self.option_a,
            option_b: self.option_b,
            opens_at: self.opens_at.unwrap_or(now),
            closes_at: self.closes_at,
            is_active: true,
            tally: Tally::default(),
            created_at: now,
        }
    }
}
