//! Quest Common - progression and quest-rotation engine
//!
//! Members complete real-world social quests, earn XP, climb a rank ladder,
//! keep daily streaks and compare themselves on leaderboards. Everything is
//! persisted in one SQLite database; outbound effects (role changes,
//! announcements) leave through a channel after each commit.

pub mod api;
pub mod catalogue;
pub mod claims;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod ladder;
pub mod leaderboard;
pub mod ledger;
pub mod rotation;
pub mod service;
pub mod store;
pub mod streak;

pub use catalogue::{Catalogue, QuestPoolDefinition, RotationPolicy};
pub use clock::{Clock, ManualTimeSource, SystemTimeSource, TimeSource};
pub use config::QuestConfig;
pub use error::{ErrorKind, QuestError, QuestResult};
pub use events::{EffectSender, Notification, SideEffect};
pub use ladder::Ladder;
pub use service::QuestService;
pub use store::{DbLocation, QuestDb};
