//! questctl - command line client for questd
//!
//! Issues the chat commands (`!claim`, `!weekly`, `!progress`, `!leaderboard`)
//! and the moderator commands against a running daemon.

pub mod cli;
pub mod client;
pub mod commands;
pub mod output;
