pub mod categories;
pub mod client;
pub mod config;
pub mod pinned;
pub mod tags;
