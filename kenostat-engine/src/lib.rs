pub mod cache;
pub mod comparison;
pub mod config;
pub mod engine;
pub mod events;
pub mod generators;
pub mod momentum;
pub mod patterns;
pub mod payout;
pub mod stats;

pub use engine::Engine;
