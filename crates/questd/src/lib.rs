//! questd - quest progression daemon
//!
//! Hosts the engine behind an HTTP command surface, generates and announces
//! quests on a schedule, and delivers side effects to the chat bridge.

pub mod daemon;
pub mod dispatcher;
pub mod routes;
pub mod scheduler;
pub mod server;
