pub mod complete;
pub mod config;
pub mod fetch;
pub mod play;
pub mod segment;
