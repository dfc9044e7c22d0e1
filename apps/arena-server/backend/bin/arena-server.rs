//! `arena-server` is the HTTP service behind arena battles. Voters cast one
//! vote per battle while it is open, and the service keeps each battle's
//! counts in step with its vote ledger no matter how many requests race.
//!
//! Votes are stored in Postgres via SQLx when `DATABASE_URL` is set, and in
//! process memory otherwise.

#![warn(
    clippy::all,
    clippy::todo,
    clippy::empty_enum,
    clippy::enum_glob_use,
    clippy::mem_forget,
    clippy::unused_self,
    clippy::filter_map_next,
    clippy::needless_continue,
    clippy::needless_borrow,
    clippy::match_wildcard_for_single_variants,
    clippy::if_let_mutex,
    clippy::await_holding_lock,
    clippy::match_on_vec_items,
    clippy::imprecise_flops,
    clippy::suboptimal_flops,
    clippy::lossy_float_literal,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::fn_params_excessive_bools,
    clippy::exit,
    clippy::inefficient_to_string,
    clippy::linkedlist,
    clippy::macro_use_imports,
    clippy::option_option,
    clippy::verbose_file_reads,
    clippy::unnested_or_patterns,
    clippy::str_to_string,
    rust_2018_idioms,
    future_incompatible,
    nonstandard_style,
    missing_debug_implementations,
    missing_docs
)]
#![deny(unreachable_pub)]
#![allow(elided_lifetimes_in_paths, clippy::type_complexity)]
#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_auto_cfg, doc_cfg))]
#![cfg_attr(test, allow(clippy::float_cmp))]
#![cfg_attr(not(test), warn(clippy::print_stdout, clippy::dbg_macro))]

use std::sync::Arc;

use arena_server::{
    app,
    config::Config,
    db::{self, PgStore},
    log,
    memory::MemoryStore,
    rewards::{DynRewardNotifier, RewardNotifier},
    seed,
    state::AppState,
    store::BattleStore,
    vote::VoteService,
};
use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    match dotenvy::dotenv() {
        Err(e) if !e.not_found() => return Err(e.into()),
        _ => {}
    }
    let config = Config::parse();
    log::setup(&config)?;

    match config.database_url.as_deref() {
        Some(database_url) => {
            let pool = db::setup(database_url, &config).await?;
            serve(PgStore::new(pool), &config).await
        }
        None => {
            tracing::warn!("DATABASE_URL is not set, votes are kept in memory and lost on exit");
            serve(MemoryStore::new(), &config).await
        }
    }
}

async fn serve<S>(store: S, config: &Config) -> color_eyre::Result<()>
where
    S: BattleStore + RewardNotifier,
{
    let store = Arc::new(store);

    if config.should_seed_demo_battles() {
        seed::seed_demo_battles(store.as_ref()).await?;
    } else if config.seed_demo_battles {
        tracing::warn!("SEED_DEMO_BATTLES is ignored in release builds");
    }

    let rewards: DynRewardNotifier = store.clone();
    let votes = VoteService::new(store, rewards, config.vote_reward_points);
    let state = AppState::new(votes, config.admin_token.clone());

    app::run(app::setup(state), config).await
}
