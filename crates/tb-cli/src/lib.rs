//! Startup sequence for the turbo bot: self-update first, then settings.

pub mod bootstrap;
