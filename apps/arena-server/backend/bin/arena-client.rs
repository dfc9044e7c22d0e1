use arena_server::client::Client;
use clap::Parser;
use reqwest::Url;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use types_rs::arena::{BattleId, BattleOption, NewBattle, VoterId};

#[derive(Parser)]
struct App {
    #[clap(flatten)]
    opts: GlobalOpts,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Parser)]
struct GlobalOpts {
    #[clap(long, env = "ARENA_SERVER_URL", default_value = "http://localhost:8000")]
    arena_server_url: Url,

    #[clap(long, env = "ADMIN_TOKEN")]
    admin_token: Option<String>,
}

impl GlobalOpts {
    fn client(&self) -> Client {
        let client = Client::new(self.arena_server_url.clone());
        match self.admin_token {
            Some(ref admin_token) => client.with_admin_token(admin_token.clone()),
            None => client,
        }
    }
}

#[derive(Parser)]
enum Command {
    Status,
    ListBattles,
    GetBattle(BattleOpts),
    Vote(VoteOpts),
    VoterStats(VoterOpts),
    CreateBattle(CreateBattleOpts),
    DeactivateBattle(BattleOpts),
    Reconcile(BattleOpts),
}

#[derive(Parser)]
struct BattleOpts {
    battle_id: BattleId,
}

#[derive(Parser)]
struct VoteOpts {
    battle_id: BattleId,

    /// "a" or "b".
    choice: String,

    #[clap(long, env = "VOTER_ID")]
    voter_id: VoterId,
}

#[derive(Parser)]
struct VoterOpts {
    #[clap(long, env = "VOTER_ID")]
    voter_id: VoterId,
}

#[derive(Parser)]
struct CreateBattleOpts {
    title: String,

    #[clap(short, long, default_value = "")]
    description: String,

    #[clap(short = 'a', long)]
    option_a: String,

    #[clap(short = 'b', long)]
    option_b: String,

    /// RFC 3339 timestamp; defaults to now.
    #[clap(long, value_parser = parse_timestamp)]
    opens_at: Option<OffsetDateTime>,

    /// RFC 3339 timestamp; the battle stays open indefinitely if omitted.
    #[clap(long, value_parser = parse_timestamp)]
    closes_at: Option<OffsetDateTime>,
}

fn parse_timestamp(s: &str) -> Result<OffsetDateTime, time::error::Parse> {
    OffsetDateTime::parse(s, &Rfc3339)
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let _ = dotenvy::dotenv();

    let app = App::parse();
    let client = app.opts.client();

    match app.command {
        Command::Status => {
            client.check_status().await?;
            println!("server is up");
        }
        Command::ListBattles => {
            let battles = client.list_battles().await?;
            println!("{}", serde_json::to_string_pretty(&battles)?);
        }
        Command::GetBattle(BattleOpts { battle_id }) => match client.get_battle(battle_id).await? {
            Some(battle) => println!("{}", serde_json::to_string_pretty(&battle)?),
            None => println!("no battle found with ID {battle_id}"),
        },
        Command::Vote(VoteOpts {
            battle_id,
            choice,
            voter_id,
        }) => {
            let receipt = client.cast_vote(battle_id, &voter_id, &choice).await?;
            println!(
                "voted {}: A={} B={}",
                receipt.your_choice, receipt.votes_a, receipt.votes_b
            );
        }
        Command::VoterStats(VoterOpts { voter_id }) => {
            let stats = client.get_voter_stats(&voter_id).await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::CreateBattle(opts) => {
            let battle = client
                .create_battle(&NewBattle {
                    title: opts.title,
                    description: opts.description,
                    option_a: BattleOption {
                        description: opts.option_a,
                        image_url: None,
                    },
                    option_b: BattleOption {
                        description: opts.option_b,
                        image_url: None,
                    },
                    opens_at: opts.opens_at,
                    closes_at: opts.closes_at,
                })
                .await?;
            println!("battle_id: {}", battle.battle.id);
        }
        Command::DeactivateBattle(BattleOpts { battle_id }) => {
            let battle = client.deactivate_battle(battle_id).await?;
            println!("deactivated battle {} ({})", battle.battle.id, battle.state);
        }
        Command::Reconcile(BattleOpts { battle_id }) => {
            let tally = client.reconcile_battle(battle_id).await?;
            println!("reconciled battle {battle_id}: A={} B={}", tally.votes_a, tally.votes_b);
        }
    }

    Ok(())
}
