pub mod walkers;

pub use walkers::{run, FeedConfig, WalkerFeed};
