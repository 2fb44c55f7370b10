pub mod config;
pub mod document;
pub mod updater;
