//! Quest catalogue.
//!
//! Static configuration: daily quest pools (one active quest per pool per day),
//! weekly pools (one per rank), and the explicit per-rank access whitelist.
//! Access is NOT derived from rank order: a rank may keep some lower pools and
//! lose others.

use crate::error::{QuestError, QuestResult};
use crate::ladder::Ladder;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Prefix reserved for weekly quest keys
pub const WEEKLY_KEY_PREFIX: &str = "weekly-";

/// How a pool picks its daily quest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum RotationPolicy {
    /// Independent uniform draw every day; repeats allowed
    SimpleRandom,
    /// No quest repeats inside a cycle of at most `window_days` days
    NoRepeatWindow { window_days: u32 },
}

impl Default for RotationPolicy {
    fn default() -> Self {
        RotationPolicy::NoRepeatWindow { window_days: 7 }
    }
}

/// One daily quest slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestPoolDefinition {
    /// Claim key, e.g. `explorer-1`
    pub key: String,
    /// Candidate quest texts
    pub quests: Vec<String>,
    pub xp_reward: i64,
    #[serde(default)]
    pub rotation: RotationPolicy,
}

/// Weekly quest candidates for one rank
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyPool {
    pub rank: u8,
    pub quests: Vec<String>,
    pub xp_reward: i64,
}

/// Pools a rank may claim from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRule {
    pub rank: u8,
    pub pools: Vec<String>,
}

/// Complete quest catalogue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalogue {
    pub pools: Vec<QuestPoolDefinition>,
    #[serde(default)]
    pub weekly: Vec<WeeklyPool>,
    pub access: Vec<AccessRule>,
}

impl Default for Catalogue {
    fn default() -> Self {
        Self::builtin()
    }
}

fn texts(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn pool(key: &str, xp_reward: i64, rotation: RotationPolicy, quests: &[&str]) -> QuestPoolDefinition {
    QuestPoolDefinition {
        key: key.to_string(),
        quests: texts(quests),
        xp_reward,
        rotation,
    }
}

impl Catalogue {
    /// Built-in social-confidence catalogue
    pub fn builtin() -> Self {
        let weekly_window = RotationPolicy::NoRepeatWindow { window_days: 7 };

        let pools = vec![
            pool(
                "initiate-1",
                5,
                weekly_window,
                &[
                    "Smile at 3 people",
                    "Say good morning to a neighbour",
                    "Make eye contact and nod at a passer-by",
                    "Thank a cashier by name",
                    "Hold the door for someone and say hello",
                    "Wave at someone you recognise",
                    "Ask a shop assistant where something is",
                ],
            ),
            pool(
                "initiate-2",
                15,
                weekly_window,
                &[
                    "Compliment someone's clothing",
                    "Ask someone for the time",
                    "Give a genuine compliment to a coworker",
                    "Ask a barista for their recommendation",
                    "Compliment a stranger's dog",
                    "Ask someone how their weekend was",
                    "Tell someone you like their shoes",
                ],
            ),
            pool(
                "explorer-1",
                30,
                weekly_window,
                &[
                    "Ask someone how their day is going",
                    "Ask a stranger for a local recommendation",
                    "Start a conversation while waiting in line",
                    "Ask a follow-up question in a conversation",
                    "Join a group conversation at work or school",
                    "Ask someone about the book they are reading",
                    "Chat with a neighbour for two minutes",
                ],
            ),
            pool(
                "explorer-2",
                40,
                RotationPolicy::SimpleRandom,
                &[
                    "Introduce yourself to someone new",
                    "Ask a question in a class or meeting",
                    "Call a business instead of emailing",
                    "Invite a coworker for coffee",
                    "Say hello to someone new in a voice channel",
                ],
            ),
            pool(
                "connector-1",
                60,
                RotationPolicy::NoRepeatWindow { window_days: 5 },
                &[
                    "Keep a 5-minute conversation going with a stranger",
                    "Ask someone new for their contact details",
                    "Introduce two people to each other",
                    "Invite an acquaintance to an event",
                    "Share a personal story with someone new",
                ],
            ),
            pool(
                "connector-2",
                75,
                RotationPolicy::SimpleRandom,
                &[
                    "Attend a meetup alone",
                    "Start a conversation with a group of strangers",
                    "Organise a small hangout",
                    "Give someone kind, constructive feedback",
                ],
            ),
            pool(
                "leader-1",
                100,
                weekly_window,
                &[
                    "Host a small gathering",
                    "Speak up first in a meeting",
                    "Lead an icebreaker",
                    "Welcome a newcomer and show them around",
                    "Make a toast or a short speech",
                    "Organise a group outing",
                    "Volunteer to lead part of a project",
                ],
            ),
            pool(
                "leader-2",
                120,
                RotationPolicy::SimpleRandom,
                &[
                    "Give a short talk to a group",
                    "Calmly mediate a disagreement",
                    "Walk a new member through their first quest",
                ],
            ),
            pool(
                "mentor-1",
                150,
                weekly_window,
                &[
                    "Coach a member through a quest they are nervous about",
                    "Run a community event",
                    "Give a 5-minute talk to strangers",
                    "Organise a meetup for the community",
                    "Post a confidence tip for newcomers",
                    "Pair up with an Initiate for their first conversation",
                    "Share a story about a quest that scared you",
                ],
            ),
        ];

        let weekly = vec![
            WeeklyPool {
                rank: 1,
                xp_reward: 50,
                quests: texts(&[
                    "Say hello to 10 different people this week",
                    "Compliment someone every day this week",
                ]),
            },
            WeeklyPool {
                rank: 2,
                xp_reward: 100,
                quests: texts(&[
                    "Have three conversations with strangers this week",
                    "Ask five people for a recommendation this week",
                ]),
            },
            WeeklyPool {
                rank: 3,
                xp_reward: 150,
                quests: texts(&[
                    "Make one new friend this week",
                    "Attend a social event you would normally skip",
                ]),
            },
            WeeklyPool {
                rank: 4,
                xp_reward: 200,
                quests: texts(&[
                    "Organise an event for at least four people",
                    "Lead a group activity this week",
                ]),
            },
            WeeklyPool {
                rank: 5,
                xp_reward: 250,
                quests: texts(&[
                    "Mentor two members through their daily quests",
                    "Run a community challenge this week",
                ]),
            },
        ];

        let access = vec![
            AccessRule {
                rank: 1,
                pools: texts(&["initiate-1", "initiate-2"]),
            },
            AccessRule {
                rank: 2,
                pools: texts(&["initiate-2", "explorer-1", "explorer-2"]),
            },
            AccessRule {
                rank: 3,
                pools: texts(&["explorer-2", "connector-1", "connector-2"]),
            },
            AccessRule {
                rank: 4,
                pools: texts(&["connector-2", "leader-1", "leader-2"]),
            },
            AccessRule {
                rank: 5,
                pools: texts(&["connector-1", "leader-2", "mentor-1"]),
            },
        ];

        Self {
            pools,
            weekly,
            access,
        }
    }

    /// Check the catalogue against the ladder it will be used with
    pub fn validate(&self, ladder: &Ladder) -> QuestResult<()> {
        if self.pools.is_empty() {
            return Err(QuestError::validation("catalogue must define at least one pool"));
        }

        let mut keys = HashSet::new();
        for pool in &self.pools {
            if pool.key.trim().is_empty() || pool.key.chars().any(char::is_whitespace) {
                return Err(QuestError::validation(format!(
                    "pool key '{}' must be a single non-empty word",
                    pool.key
                )));
            }
            if pool.key.starts_with(WEEKLY_KEY_PREFIX) {
                return Err(QuestError::validation(format!(
                    "pool key '{}' uses the reserved '{}' prefix",
                    pool.key, WEEKLY_KEY_PREFIX
                )));
            }
            if !keys.insert(pool.key.as_str()) {
                return Err(QuestError::validation(format!("pool '{}' is defined twice", pool.key)));
            }
            validate_quests(&pool.key, &pool.quests, pool.xp_reward)?;
            if let RotationPolicy::NoRepeatWindow { window_days: 0 } = pool.rotation {
                return Err(QuestError::validation(format!(
                    "pool '{}' needs a rotation window of at least one day",
                    pool.key
                )));
            }
        }

        let mut weekly_ranks = HashSet::new();
        for weekly in &self.weekly {
            let label = weekly_quest_key(weekly.rank);
            if !ladder.contains(weekly.rank) {
                return Err(QuestError::validation(format!(
                    "weekly pool for unknown rank {}",
                    weekly.rank
                )));
            }
            if !weekly_ranks.insert(weekly.rank) {
                return Err(QuestError::validation(format!(
                    "rank {} has two weekly pools",
                    weekly.rank
                )));
            }
            validate_quests(&label, &weekly.quests, weekly.xp_reward)?;
        }

        let mut access_ranks = HashSet::new();
        for rule in &self.access {
            if !ladder.contains(rule.rank) {
                return Err(QuestError::validation(format!(
                    "access rule for unknown rank {}",
                    rule.rank
                )));
            }
            if !access_ranks.insert(rule.rank) {
                return Err(QuestError::validation(format!(
                    "rank {} has two access rules",
                    rule.rank
                )));
            }
            for key in &rule.pools {
                if !keys.contains(key.as_str()) {
                    return Err(QuestError::validation(format!(
                        "access rule for rank {} names unknown pool '{}'",
                        rule.rank, key
                    )));
                }
            }
        }

        Ok(())
    }

    pub fn pool(&self, key: &str) -> Option<&QuestPoolDefinition> {
        self.pools.iter().find(|p| p.key == key)
    }

    /// Pool keys claimable at `rank`, in configured order
    pub fn pools_for_rank(&self, rank: u8) -> &[String] {
        self.access
            .iter()
            .find(|rule| rule.rank == rank)
            .map(|rule| rule.pools.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_eligible(&self, rank: u8, pool_key: &str) -> bool {
        self.pools_for_rank(rank).iter().any(|k| k == pool_key)
    }

    pub fn weekly_for(&self, rank: u8) -> Option<&WeeklyPool> {
        self.weekly.iter().find(|w| w.rank == rank)
    }
}

fn validate_quests(label: &str, quests: &[String], xp_reward: i64) -> QuestResult<()> {
    if quests.is_empty() {
        return Err(QuestError::validation(format!("pool '{}' has no quests", label)));
    }
    if xp_reward <= 0 {
        return Err(QuestError::validation(format!(
            "pool '{}' must reward a positive amount of XP",
            label
        )));
    }
    let mut seen = HashSet::new();
    for quest in quests {
        if quest.trim().is_empty() {
            return Err(QuestError::validation(format!("pool '{}' has an empty quest", label)));
        }
        if !seen.insert(quest.as_str()) {
            return Err(QuestError::validation(format!(
                "pool '{}' lists '{}' twice",
                label, quest
            )));
        }
    }
    Ok(())
}

/// Claim key of the weekly quest for `rank`
pub fn weekly_quest_key(rank: u8) -> String {
    format!("{}{}", WEEKLY_KEY_PREFIX, rank)
}
