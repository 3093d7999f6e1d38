//! Command line definition

use clap::{Parser, Subcommand, ValueEnum};
use quest_common::api::LeaderboardCategory;

/// Address used when neither `--url` nor `QUESTD_URL` is given
pub const DEFAULT_URL: &str = "http://127.0.0.1:7870";

#[derive(Parser, Debug)]
#[command(name = "questctl")]
#[command(about = "Questline - quest progression for chat communities", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Base URL of the questd HTTP surface
    #[arg(long, global = true, env = "QUESTD_URL", default_value = DEFAULT_URL)]
    pub url: String,

    /// Print raw JSON instead of formatted output
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Claim one of today's quests
    Claim {
        /// Member identifier
        user: String,

        /// Pool key of the quest (e.g. "initiate-1")
        quest_key: String,
    },

    /// Claim this week's quest for the member's rank
    Weekly {
        user: String,

        /// Claim for a specific rank instead of the current one
        #[arg(long)]
        rank: Option<u8>,
    },

    /// Show XP, rank, streak and open quests
    Progress { user: String },

    /// Show a leaderboard
    Leaderboard {
        #[arg(long, value_enum, default_value_t = Category::Global)]
        category: Category,

        /// Rank to rank within (weekly, monthly and rank boards)
        #[arg(long)]
        rank: Option<u8>,

        /// Window length in days (rank board)
        #[arg(long)]
        days: Option<u32>,

        /// Report this member's position too
        #[arg(long)]
        user: Option<String>,

        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show today's daily quests and this week's weekly quests
    Today,

    /// Grant XP to a member (moderator)
    Grant {
        user: String,

        amount: i64,

        /// Reason stored with the XP event
        #[arg(long)]
        reason: Option<String>,
    },

    /// Reset a member to zero XP (moderator)
    Reset { user: String },

    /// List claims waiting for review (moderator)
    Pending,

    /// Approve a pending claim (moderator)
    Approve { id: i64 },

    /// Reject a pending claim (moderator)
    Reject { id: i64 },

    /// Show daemon health and calendar keys
    Health,
}

/// Leaderboard categories accepted on the command line
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Category {
    Global,
    Weekly,
    Monthly,
    Rank,
}

impl From<Category> for LeaderboardCategory {
    fn from(c: Category) -> Self {
        match c {
            Category::Global => LeaderboardCategory::Global,
            Category::Weekly => LeaderboardCategory::Weekly,
            Category::Monthly => LeaderboardCategory::Monthly,
            Category::Rank => LeaderboardCategory::Rank,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_arguments() {
        let cli = Cli::try_parse_from(["questctl", "claim", "u1", "explorer-2"]).unwrap();
        match cli.command {
            Commands::Claim { user, quest_key } => {
                assert_eq!(user, "u1");
                assert_eq!(quest_key, "explorer-2");
            }
            other => panic!("unexpected command: {:?}", other),
        }
        assert!(!cli.json);
    }

    #[test]
    fn test_leaderboard_flags() {
        let cli = Cli::try_parse_from([
            "questctl",
            "leaderboard",
            "--category",
            "monthly",
            "--rank",
            "3",
            "--json",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Leaderboard { category, rank, days, .. } => {
                assert_eq!(LeaderboardCategory::from(category), LeaderboardCategory::Monthly);
                assert_eq!(rank, Some(3));
                assert_eq!(days, None);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_negative_grant_amount_parses() {
        // The daemon rejects it; the CLI only forwards
        let cli = Cli::try_parse_from(["questctl", "grant", "u1", "--", "-5"]).unwrap();
        match cli.command {
            Commands::Grant { amount, .. } => assert_eq!(amount, -5),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_category_rejected() {
        assert!(Cli::try_parse_from(["questctl", "leaderboard", "--category", "yearly"]).is_err());
    }
}
