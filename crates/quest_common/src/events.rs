//! Outbound side effects.
//!
//! The engine never talks to the chat platform itself. After a transaction
//! commits it pushes `SideEffect`s into an unbounded channel; the daemon's
//! dispatcher drains it and delivers them. Delivery failures never reach the
//! engine.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

/// Command prefix used in hints
pub const COMMAND_PREFIX: &str = "!";

/// A quest as announced to the community
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostedQuest {
    pub quest_key: String,
    /// Pool key or rank name
    pub title: String,
    pub quest_text: String,
    pub xp_reward: i64,
    /// What a member types to claim it
    pub command_hint: String,
}

impl PostedQuest {
    pub fn daily(pool_key: &str, quest_text: &str, xp_reward: i64) -> Self {
        Self {
            quest_key: pool_key.to_string(),
            title: pool_key.to_string(),
            quest_text: quest_text.to_string(),
            xp_reward,
            command_hint: format!("{}claim {}", COMMAND_PREFIX, pool_key),
        }
    }

    pub fn weekly(quest_key: &str, rank_name: &str, quest_text: &str, xp_reward: i64) -> Self {
        Self {
            quest_key: quest_key.to_string(),
            title: rank_name.to_string(),
            quest_text: quest_text.to_string(),
            xp_reward,
            command_hint: format!("{}weekly", COMMAND_PREFIX),
        }
    }
}

/// Community-wide announcement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    DailyQuestsPosted {
        day_key: String,
        quests: Vec<PostedQuest>,
    },
    WeeklyQuestsPosted {
        week_key: String,
        quests: Vec<PostedQuest>,
    },
    DailyReminder {
        day_key: String,
        message: String,
        quests: Vec<PostedQuest>,
    },
    /// Moderated mode: a claim is waiting for review
    ClaimSubmitted {
        pending_id: i64,
        user_id: String,
        quest_text: String,
        xp_reward: i64,
    },
    /// Moderated mode: a claim was approved and XP granted
    ClaimApproved {
        user_id: String,
        quest_text: String,
        xp_reward: i64,
        xp_total: i64,
        rank_name: String,
    },
}

/// Effect on the outside world
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "effect", content = "payload", rename_all = "snake_case")]
pub enum SideEffect {
    /// Give `role` to the member and drop every role in `remove_roles`
    RoleSync {
        user_id: String,
        rank: u8,
        role: String,
        remove_roles: Vec<String>,
    },
    Broadcast(Notification),
}

impl SideEffect {
    /// Role sync for a member now at `rank`, given the roles of every rank
    pub fn role_sync(user_id: &str, rank: u8, roles: &[String]) -> Option<Self> {
        let role = roles.get((rank as usize).checked_sub(1)?)?.clone();
        let remove_roles = roles.iter().filter(|r| **r != role).cloned().collect();
        Some(SideEffect::RoleSync {
            user_id: user_id.to_string(),
            rank,
            role,
            remove_roles,
        })
    }

    /// Short label for logs
    pub fn label(&self) -> &'static str {
        match self {
            SideEffect::RoleSync { .. } => "role_sync",
            SideEffect::Broadcast(Notification::DailyQuestsPosted { .. }) => "daily_quests_posted",
            SideEffect::Broadcast(Notification::WeeklyQuestsPosted { .. }) => "weekly_quests_posted",
            SideEffect::Broadcast(Notification::DailyReminder { .. }) => "daily_reminder",
            SideEffect::Broadcast(Notification::ClaimSubmitted { .. }) => "claim_submitted",
            SideEffect::Broadcast(Notification::ClaimApproved { .. }) => "claim_approved",
        }
    }
}

/// Sending half of the side-effect channel
#[derive(Debug, Clone)]
pub struct EffectSender {
    tx: mpsc::UnboundedSender<SideEffect>,
}

pub type EffectReceiver = mpsc::UnboundedReceiver<SideEffect>;

pub fn channel() -> (EffectSender, EffectReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EffectSender { tx }, rx)
}

impl EffectSender {
    /// Queue an effect; never blocks. A closed channel only loses the effect.
    pub fn emit(&self, effect: SideEffect) {
        let label = effect.label();
        if self.tx.send(effect).is_err() {
            debug!("Side-effect channel closed, dropped {}", label);
        }
    }
}
