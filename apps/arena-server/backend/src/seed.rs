//! # Demo Battles
//! Creates a few open battles so a fresh server has something to vote on.
//!
//! It is not intended to be used in production.

use time::{Duration, OffsetDateTime};
use types_rs::arena::{Battle, BattleOption, NewBattle};

use crate::{error::Result, store::BattleStore};

fn option(description: &str) -> BattleOption {
    BattleOption {
        description: description.to_owned(),
        image_url: None,
    }
}

fn demo_battles(now: OffsetDateTime) -> Vec<NewBattle> {
    let battle = |title: &str, description: &str, a: &str, b: &str, days: i64| NewBattle {
        title: title.to_owned(),
        description: description.to_owned(),
        option_a: option(a),
        option_b: option(b),
        opens_at: Some(now),
        closes_at: Some(now + Duration::days(days)),
    };

    vec![
        battle(
            "Denim vs. Linen",
            "Which fabric owns the summer?",
            "Raw selvedge denim",
            "Washed linen",
            7,
        ),
        battle(
            "Streetwear Showdown",
            "Pick the better fit for the weekend.",
            "Oversized hoodie",
            "Bomber jacket",
            3,
        ),
        battle(
            "Sneaker Face-off",
            "One pair, all year.",
            "High tops",
            "Low tops",
            14,
        ),
    ]
}

/// Creates the demo battles unless the store already has active battles.
/// Returns the battles created.
pub async fn seed_demo_battles<S: BattleStore>(store: &S) -> Result<Vec<Battle>> {
    if !store.list_active_battles().await?.is_empty() {
        tracing::debug!("Store already has active battles, not seeding");
        return Ok(Vec::new());
    }

    let now = OffsetDateTime::now_utc();
    let mut created = Vec::new();
    for new_battle in demo_battles(now) {
        new_battle.validate(now)?;
        created.push(store.create_battle(new_battle.into_battle(now)).await?);
    }

    tracing::info!("Seeded {} demo battles", created.len());
    Ok(created)
}

#[cfg(test)]
mod tests {
    use types_rs::arena::LifecycleState;

    use super::*;
    use crate::memory::MemoryStore;

    #[tokio::test]
    async fn test_seeds_open_battles_once() {
        let store = MemoryStore::new();

        let created = seed_demo_battles(&store).await.unwrap();
        assert_eq!(created.len(), 3);
        let now = OffsetDateTime::now_utc();
        assert!(created
            .iter()
            .all(|battle| battle.state_at(now) == LifecycleState::Open));

        assert!(seed_demo_battles(&store).await.unwrap().is_empty());
        assert_eq!(store.list_active_battles().await.unwrap().len(), 3);
    }
}
