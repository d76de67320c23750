pub mod engine;
pub mod message;
pub mod pubsub;
pub mod storage;
pub mod topic;

pub use engine::Broker;

#[cfg(test)]
mod tests;
