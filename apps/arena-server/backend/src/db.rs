//! Database access for the application.
//!
//! All direct use of [SQLx][`sqlx`] queries should be in this module. Queries
//! are checked at runtime rather than with the `query!` macros so the crate
//! builds without a database.
//!
//! Votes are recorded in one transaction that locks the battle row, checks
//! its lifecycle, inserts into the append-only `battle_votes` ledger and bumps
//! the cached counters. The `(battle_id, voter_id)` unique constraint turns a
//! concurrent second vote into a no-op insert, which is reported as
//! [`Error::DuplicateVote`] and rolls the transaction back.

use std::time::Duration;

use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use time::OffsetDateTime;
use tracing::Level;
use types_rs::arena::{Battle, BattleId, BattleOption, Choice, Tally, Vote, VoteId, VoterId};

use crate::{
    config::Config,
    error::{Error, Result},
    rewards::{RewardAward, RewardNotifier},
    store::{BattleStore, RecordedVote},
};

/// Sets up the database pool and runs any pending migrations, returning the
/// pool to be used by the app.
pub async fn setup(database_url: &str, config: &Config) -> color_eyre::Result<PgPool> {
    let _entered = tracing::span!(Level::DEBUG, "Setting up database").entered();
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .acquire_timeout(Duration::from_secs(3))
        .connect(database_url)
        .await?;
    sqlx::migrate!("db/migrations").run(&pool).await?;
    Ok(pool)
}

#[derive(Debug, FromRow)]
struct BattleRecord {
    id: BattleId,
    title: String,
    description: String,
    option_a_description: String,
    option_a_image_url: Option<String>,
    option_b_description: String,
    option_b_image_url: Option<String>,
    opens_at: OffsetDateTime,
    closes_at: Option<OffsetDateTime>,
    is_active: bool,
    votes_a: i64,
    votes_b: i64,
    created_at: OffsetDateTime,
}

impl From<BattleRecord> for Battle {
    fn from(record: BattleRecord) -> Self {
        Battle {
            id: record.id,
            title: record.title,
            description: record.description,
            option_a: BattleOption {
                description: record.option_a_description,
                image_url: record.option_a_image_url,
            },
            option_b: BattleOption {
                description: record.option_b_description,
                image_url: record.option_b_image_url,
            },
            opens_at: record.opens_at,
            closes_at: record.closes_at,
            is_active: record.is_active,
            tally: tally_from_counts(record.votes_a, record.votes_b),
            created_at: record.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct VoteRecord {
    id: VoteId,
    battle_id: BattleId,
    voter_id: VoterId,
    choice: String,
    created_at: OffsetDateTime,
}

impl TryFrom<VoteRecord> for Vote {
    type Error = Error;

    fn try_from(record: VoteRecord) -> Result<Self> {
        Ok(Vote {
            id: record.id,
            battle_id: record.battle_id,
            voter_id: record.voter_id,
            choice: record.choice.parse()?,
            created_at: record.created_at,
        })
    }
}

/// The counter columns are `CHECK (>= 0)`, so the fallback never applies.
fn tally_from_counts(votes_a: i64, votes_b: i64) -> Tally {
    Tally::new(
        u64::try_from(votes_a).unwrap_or_default(),
        u64::try_from(votes_b).unwrap_or_default(),
    )
}

/// [`BattleStore`] backed by PostgreSQL.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl BattleStore for PgStore {
    #[tracing::instrument(skip_all, fields(battle_id = %battle.id))]
    async fn create_battle(&self, battle: Battle) -> Result<Battle> {
        let record = sqlx::query_as::<_, BattleRecord>(
            r#"
            INSERT INTO battles (
                id,
                title,
                description,
                option_a_description,
                option_a_image_url,
                option_b_description,
                option_b_image_url,
                opens_at,
                closes_at,
                is_active,
                created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(battle.id)
        .bind(&battle.title)
        .bind(&battle.description)
        .bind(&battle.option_a.description)
        .bind(&battle.option_a.image_url)
        .bind(&battle.option_b.description)
        .bind(&battle.option_b.image_url)
        .bind(battle.opens_at)
        .bind(battle.closes_at)
        .bind(battle.is_active)
        .bind(battle.created_at)
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!("created battle");
        Ok(record.into())
    }

    async fn get_battle(&self, battle_id: BattleId) -> Result<Option<Battle>> {
        Ok(
            sqlx::query_as::<_, BattleRecord>("SELECT * FROM battles WHERE id = $1")
                .bind(battle_id)
                .fetch_optional(&self.pool)
                .await?
                .map(Into::into),
        )
    }

    async fn list_active_battles(&self) -> Result<Vec<Battle>> {
        Ok(sqlx::query_as::<_, BattleRecord>(
            r#"
            SELECT *
            FROM battles
            WHERE is_active
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Into::into)
        .collect())
    }

    #[tracing::instrument(skip(self))]
    async fn deactivate_battle(&self, battle_id: BattleId) -> Result<Battle> {
        sqlx::query_as::<_, BattleRecord>(
            r#"
            UPDATE battles
            SET is_active = FALSE
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(battle_id)
        .fetch_optional(&self.pool)
        .await?
        .map(Into::into)
        .ok_or(Error::BattleNotFound(battle_id))
    }

    #[tracing::instrument(skip(self, voter_id, now), fields(%voter_id))]
    async fn record_vote(
        &self,
        battle_id: BattleId,
        voter_id: &VoterId,
        choice: Choice,
        now: OffsetDateTime,
    ) -> Result<RecordedVote> {
        // Dropping `txn` without committing rolls it back.
        let mut txn = self.pool.begin().await?;

        let battle: Battle =
            sqlx::query_as::<_, BattleRecord>("SELECT * FROM battles WHERE id = $1 FOR UPDATE")
                .bind(battle_id)
                .fetch_optional(&mut *txn)
                .await?
                .ok_or(Error::BattleNotFound(battle_id))?
                .into();

        let state = battle.state_at(now);
        if !state.is_open() {
            return Err(Error::BattleNotOpen { battle_id, state });
        }

        let vote_id = VoteId::new();
        let inserted = sqlx::query(
            r#"
            INSERT INTO battle_votes (id, battle_id, voter_id, choice, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (battle_id, voter_id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(vote_id)
        .bind(battle_id)
        .bind(voter_id)
        .bind(choice.as_str())
        .bind(now)
        .fetch_optional(&mut *txn)
        .await?;

        if inserted.is_none() {
            return Err(Error::DuplicateVote {
                battle_id,
                voter_id: voter_id.clone(),
            });
        }

        let increment = match choice {
            Choice::A => {
                "UPDATE battles SET votes_a = votes_a + 1 WHERE id = $1 RETURNING votes_a, votes_b"
            }
            Choice::B => {
                "UPDATE battles SET votes_b = votes_b + 1 WHERE id = $1 RETURNING votes_a, votes_b"
            }
        };
        let (votes_a, votes_b) = sqlx::query_as::<_, (i64, i64)>(increment)
            .bind(battle_id)
            .fetch_one(&mut *txn)
            .await?;

        txn.commit().await?;

        Ok(RecordedVote {
            vote: Vote {
                id: vote_id,
                battle_id,
                voter_id: voter_id.clone(),
                choice,
                created_at: now,
            },
            tally: tally_from_counts(votes_a, votes_b),
        })
    }

    async fn get_tally(&self, battle_id: BattleId) -> Result<Tally> {
        let (votes_a, votes_b) = sqlx::query_as::<_, (i64, i64)>(
            "SELECT votes_a, votes_b FROM battles WHERE id = $1",
        )
        .bind(battle_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(Error::BattleNotFound(battle_id))?;

        Ok(tally_from_counts(votes_a, votes_b))
    }

    async fn ledger_tally(&self, battle_id: BattleId) -> Result<Tally> {
        let mut conn = self.pool.acquire().await?;
        count_ledger(&mut conn, battle_id).await
    }

    #[tracing::instrument(skip(self))]
    async fn reconcile_tally(&self, battle_id: BattleId) -> Result<Tally> {
        let mut txn = self.pool.begin().await?;

        let (votes_a, votes_b) = sqlx::query_as::<_, (i64, i64)>(
            "SELECT votes_a, votes_b FROM battles WHERE id = $1 FOR UPDATE",
        )
        .bind(battle_id)
        .fetch_optional(&mut *txn)
        .await?
        .ok_or(Error::BattleNotFound(battle_id))?;
        let cached = tally_from_counts(votes_a, votes_b);

        let counted = count_ledger(&mut txn, battle_id).await?;
        if counted != cached {
            tracing::warn!(?cached, ?counted, "cached tally drifted from the ledger");
            sqlx::query("UPDATE battles SET votes_a = $2, votes_b = $3 WHERE id = $1")
                .bind(battle_id)
                .bind(i64::try_from(counted.votes_a).unwrap_or(i64::MAX))
                .bind(i64::try_from(counted.votes_b).unwrap_or(i64::MAX))
                .execute(&mut *txn)
                .await?;
        }

        txn.commit().await?;
        Ok(counted)
    }

    async fn votes_by_voter(&self, voter_id: &VoterId) -> Result<Vec<Vote>> {
        sqlx::query_as::<_, VoteRecord>(
            r#"
            SELECT id, battle_id, voter_id, choice, created_at
            FROM battle_votes
            WHERE voter_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(voter_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Vote::try_from)
        .collect()
    }

    async fn voter_points(&self, voter_id: &VoterId) -> Result<u64> {
        let points = sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(SUM(points), 0)::BIGINT FROM reward_awards WHERE voter_id = $1",
        )
        .bind(voter_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(u64::try_from(points).unwrap_or_default())
    }
}

/// Counts the ledger for one battle. Fails with [`Error::BattleNotFound`] when
/// the battle does not exist.
async fn count_ledger(conn: &mut sqlx::PgConnection, battle_id: BattleId) -> Result<Tally> {
    let (votes_a, votes_b) = sqlx::query_as::<_, (i64, i64)>(
        r#"
        SELECT
            COUNT(v.id) FILTER (WHERE v.choice = 'a'),
            COUNT(v.id) FILTER (WHERE v.choice = 'b')
        FROM battles b
        LEFT JOIN battle_votes v ON v.battle_id = b.id
        WHERE b.id = $1
        GROUP BY b.id
        "#,
    )
    .bind(battle_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(Error::BattleNotFound(battle_id))?;

    Ok(tally_from_counts(votes_a, votes_b))
}

impl RewardNotifier for PgStore {
    fn award(&self, award: RewardAward) {
        let pool = self.pool.clone();
        tokio::spawn(async move {
            let result = sqlx::query(
                r#"
                INSERT INTO reward_awards (vote_id, voter_id, points)
                VALUES ($1, $2, $3)
                ON CONFLICT (vote_id) DO NOTHING
                "#,
            )
            .bind(award.vote_id)
            .bind(&award.voter_id)
            .bind(i64::from(award.points))
            .execute(&pool)
            .await;

            match result {
                Ok(_) => tracing::debug!(vote_id = %award.vote_id, points = award.points, "awarded points"),
                Err(e) => tracing::error!(vote_id = %award.vote_id, "failed to award points: {e}"),
            }
        });
    }
}
