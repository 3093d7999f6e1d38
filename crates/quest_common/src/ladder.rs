//! Rank ladder.
//!
//! Ranks are contiguous XP bands: rank 1 = [T1_min, T2_min), rank 2 =
//! [T2_min, T3_min), ..., top rank = [Tmax, ∞). Each rank carries absolute tier
//! sub-thresholds; the tier is 1 + the number of sub-thresholds strictly
//! exceeded by the current XP, clamped to the rank's tier count.
//!
//! ## Default ladder
//!
//! | rank | name      | from XP | tiers at     |
//! |------|-----------|---------|--------------|
//! | 1    | Initiate  | 0       | 100, 200     |
//! | 2    | Explorer  | 300     | 450, 600     |
//! | 3    | Connector | 800     | 1100, 1400   |
//! | 4    | Leader    | 1800    | 2300, 2800   |
//! | 5    | Mentor    | 3500    | 4500, 6000   |

use crate::error::{QuestError, QuestResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Default rank bands: (name, min_xp, tier sub-thresholds)
pub const DEFAULT_RANKS: &[(&str, i64, &[i64])] = &[
    ("Initiate", 0, &[100, 200]),
    ("Explorer", 300, &[450, 600]),
    ("Connector", 800, &[1100, 1400]),
    ("Leader", 1800, &[2300, 2800]),
    ("Mentor", 3500, &[4500, 6000]),
];

/// One rank band
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankDef {
    /// Display name
    pub name: String,
    /// First XP value belonging to this rank
    pub min_xp: i64,
    /// Absolute XP values separating the tiers of this rank
    #[serde(default)]
    pub tier_thresholds: Vec<i64>,
    /// Platform role for this rank (defaults to the rank name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl RankDef {
    pub fn tier_count(&self) -> u8 {
        (self.tier_thresholds.len() + 1).min(u8::MAX as usize) as u8
    }

    pub fn role_name(&self) -> &str {
        self.role.as_deref().unwrap_or(&self.name)
    }

    /// Tier of `xp` within this rank
    pub fn tier_for(&self, xp: i64) -> u8 {
        let exceeded = self.tier_thresholds.iter().filter(|&&t| xp > t).count();
        ((exceeded + 1).min(self.tier_count() as usize)) as u8
    }
}

/// Rank and tier pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Standing {
    pub rank: u8,
    pub tier: u8,
}

/// Ordered set of rank bands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ladder {
    pub ranks: Vec<RankDef>,
}

impl Default for Ladder {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Ladder {
    pub fn builtin() -> Self {
        let ranks = DEFAULT_RANKS
            .iter()
            .map(|&(name, min_xp, tiers)| RankDef {
                name: name.to_string(),
                min_xp,
                tier_thresholds: tiers.to_vec(),
                role: None,
            })
            .collect();
        Self { ranks }
    }

    /// Check that bands are contiguous, ordered and start at zero
    pub fn validate(&self) -> QuestResult<()> {
        if self.ranks.is_empty() {
            return Err(QuestError::validation("ladder must define at least one rank"));
        }
        if self.ranks.len() > u8::MAX as usize {
            return Err(QuestError::validation("ladder defines too many ranks"));
        }
        if self.ranks[0].min_xp != 0 {
            return Err(QuestError::validation("first rank must start at 0 XP"));
        }

        let mut names = HashSet::new();
        for (idx, rank) in self.ranks.iter().enumerate() {
            if rank.name.trim().is_empty() {
                return Err(QuestError::validation(format!("rank {} has no name", idx + 1)));
            }
            if !names.insert(rank.name.to_lowercase()) {
                return Err(QuestError::validation(format!(
                    "rank name '{}' is used twice",
                    rank.name
                )));
            }

            let upper = self.ranks.get(idx + 1).map(|next| next.min_xp);
            if let Some(upper) = upper {
                if upper <= rank.min_xp {
                    return Err(QuestError::validation(format!(
                        "rank '{}' must start above rank '{}'",
                        self.ranks[idx + 1].name, rank.name
                    )));
                }
            }

            let mut previous = rank.min_xp;
            for &threshold in &rank.tier_thresholds {
                let in_band = threshold > previous && upper.map_or(true, |u| threshold < u);
                if !in_band {
                    return Err(QuestError::validation(format!(
                        "tier threshold {} of rank '{}' is out of order or outside the rank",
                        threshold, rank.name
                    )));
                }
                previous = threshold;
            }
        }
        Ok(())
    }

    pub fn rank_count(&self) -> u8 {
        self.ranks.len() as u8
    }

    /// Rank definition (1-based)
    pub fn get(&self, rank: u8) -> Option<&RankDef> {
        if rank == 0 {
            return None;
        }
        self.ranks.get(rank as usize - 1)
    }

    pub fn contains(&self, rank: u8) -> bool {
        self.get(rank).is_some()
    }

    pub fn name(&self, rank: u8) -> &str {
        self.get(rank).map(|r| r.name.as_str()).unwrap_or("Unknown")
    }

    /// Rank band containing `xp`
    pub fn rank_from_xp(&self, xp: i64) -> u8 {
        let idx = self
            .ranks
            .iter()
            .rposition(|r| xp >= r.min_xp)
            .unwrap_or(0);
        (idx + 1) as u8
    }

    /// Tier of `xp` inside `rank`
    pub fn tier_for(&self, rank: u8, xp: i64) -> u8 {
        self.get(rank).map(|r| r.tier_for(xp)).unwrap_or(1)
    }

    /// Standing after a change in XP. Ranks never move backwards here; only an
    /// explicit reset brings a member back to rank 1.
    pub fn advance(&self, current_rank: u8, xp: i64) -> Standing {
        let rank = self.rank_from_xp(xp).max(current_rank.max(1)).min(self.rank_count());
        Standing {
            rank,
            tier: self.tier_for(rank, xp),
        }
    }

    /// XP still needed to reach the next rank (None at the top rank)
    pub fn xp_to_next_rank(&self, rank: u8, xp: i64) -> Option<i64> {
        self.get(rank.saturating_add(1))
            .map(|next| (next.min_xp - xp).max(0))
    }

    /// Role names of every rank, in ladder order
    pub fn role_names(&self) -> Vec<String> {
        self.ranks.iter().map(|r| r.role_name().to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_is_valid() {
        let ladder = Ladder::builtin();
        ladder.validate().unwrap();
        assert_eq!(ladder.rank_count(), 5);
        assert_eq!(ladder.name(1), "Initiate");
        assert_eq!(ladder.name(5), "Mentor");
        assert_eq!(ladder.name(9), "Unknown");
    }

    #[test]
    fn test_rank_bands_are_contiguous() {
        let ladder = Ladder::builtin();
        assert_eq!(ladder.rank_from_xp(0), 1);
        assert_eq!(ladder.rank_from_xp(299), 1);
        assert_eq!(ladder.rank_from_xp(300), 2);
        assert_eq!(ladder.rank_from_xp(799), 2);
        assert_eq!(ladder.rank_from_xp(800), 3);
        assert_eq!(ladder.rank_from_xp(3500), 5);
        assert_eq!(ladder.rank_from_xp(1_000_000), 5);
        // Negative totals never happen in practice but stay in rank 1
        assert_eq!(ladder.rank_from_xp(-5), 1);
    }

    #[test]
    fn test_tiers_count_strictly_exceeded_thresholds() {
        let ladder = Ladder::builtin();
        assert_eq!(ladder.tier_for(1, 0), 1);
        assert_eq!(ladder.tier_for(1, 100), 1);
        assert_eq!(ladder.tier_for(1, 101), 2);
        assert_eq!(ladder.tier_for(1, 201), 3);
        assert_eq!(ladder.tier_for(1, 299), 3);
    }

    #[test]
    fn test_tier_is_clamped() {
        let rank = RankDef {
            name: "Solo".to_string(),
            min_xp: 0,
            tier_thresholds: vec![],
            role: None,
        };
        assert_eq!(rank.tier_count(), 1);
        assert_eq!(rank.tier_for(10_000), 1);
    }

    #[test]
    fn test_rank_up_lands_on_first_tier() {
        let ladder = Ladder::builtin();
        let before = ladder.advance(1, 295);
        assert_eq!(before, Standing { rank: 1, tier: 3 });

        let after = ladder.advance(before.rank, 305);
        assert_eq!(after, Standing { rank: 2, tier: 1 });
    }

    #[test]
    fn test_advance_never_demotes() {
        let ladder = Ladder::builtin();
        let standing = ladder.advance(3, 10);
        assert_eq!(standing.rank, 3);
        assert_eq!(standing.tier, 1);
    }

    #[test]
    fn test_xp_to_next_rank() {
        let ladder = Ladder::builtin();
        assert_eq!(ladder.xp_to_next_rank(1, 250), Some(50));
        assert_eq!(ladder.xp_to_next_rank(5, 9000), None);
    }

    #[test]
    fn test_role_names_default_to_rank_names() {
        let mut ladder = Ladder::builtin();
        ladder.ranks[4].role = Some("Mentor ⭐".to_string());
        let roles = ladder.role_names();
        assert_eq!(roles[0], "Initiate");
        assert_eq!(roles[4], "Mentor ⭐");
    }

    #[test]
    fn test_validate_rejects_bad_ladders() {
        let mut ladder = Ladder::builtin();
        ladder.ranks[0].min_xp = 10;
        assert!(ladder.validate().is_err());

        let mut ladder = Ladder::builtin();
        ladder.ranks[2].min_xp = 200;
        assert!(ladder.validate().is_err());

        let mut ladder = Ladder::builtin();
        ladder.ranks[1].tier_thresholds = vec![900];
        assert!(ladder.validate().is_err());

        let mut ladder = Ladder::builtin();
        ladder.ranks[3].name = "initiate".to_string();
        assert!(ladder.validate().is_err());

        assert!(Ladder { ranks: vec![] }.validate().is_err());
    }
}
