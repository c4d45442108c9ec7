//! Stolyarko bot: Telegram sign-up form for the Столяркино woodworking workshop.

pub mod channels;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod intake;
