//! conrelay-bot: relays console chat to a sink and runs operator commands
//! against the console.

pub mod chat;
pub mod commands;
pub mod config;
