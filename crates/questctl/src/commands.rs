//! Command execution

use crate::cli::{Cli, Commands};
use crate::client::QuestClient;
use crate::output;
use anyhow::Result;
use quest_common::api::LeaderboardQuery;
use serde::Serialize;

fn render<T: Serialize>(json: bool, value: &T, pretty: impl FnOnce(&T) -> String) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        print!("{}", pretty(value));
    }
    Ok(())
}

/// Run one command against the daemon
pub async fn run(cli: Cli) -> Result<()> {
    let client = QuestClient::new(&cli.url)?;
    let json = cli.json;

    match cli.command {
        Commands::Claim { user, quest_key } => {
            let outcome = client.claim(&user, &quest_key).await?;
            render(json, &outcome, output::claim)
        }
        Commands::Weekly { user, rank } => {
            let outcome = client.claim_weekly(&user, rank).await?;
            render(json, &outcome, output::claim)
        }
        Commands::Progress { user } => {
            let view = client.progress(&user).await?;
            render(json, &view, output::progress)
        }
        Commands::Leaderboard {
            category,
            rank,
            days,
            user,
            limit,
        } => {
            let query = LeaderboardQuery {
                category: category.into(),
                rank,
                window_days: days,
                user_id: user,
                limit,
            };
            let view = client.leaderboard(&query).await?;
            render(json, &view, output::leaderboard)
        }
        Commands::Today => {
            let quests = client.today().await?;
            render(json, &quests, output::today)
        }
        Commands::Grant {
            user,
            amount,
            reason,
        } => {
            let grant = client.grant(&user, amount, reason).await?;
            render(json, &grant, output::grant)
        }
        Commands::Reset { user } => {
            let outcome = client.reset(&user).await?;
            render(json, &outcome, output::reset)
        }
        Commands::Pending => {
            let claims = client.pending().await?;
            render(json, &claims, |c| output::pending(c))
        }
        Commands::Approve { id } => {
            let outcome = client.approve(id).await?;
            render(json, &outcome, output::review)
        }
        Commands::Reject { id } => {
            let outcome = client.reject(id).await?;
            render(json, &outcome, output::review)
        }
        Commands::Health => {
            let health = client.health().await?;
            render(json, &health, output::health)
        }
    }
}
