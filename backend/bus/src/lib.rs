//! Topic bus for the cipherbus pipeline.
//!
//! Components never talk to each other directly: the gateway publishes job keys,
//! dispatchers publish result keys, and each side consumes through a subscription.

pub mod error;
pub mod handler;
pub mod memory;
pub mod topic_bus;

pub use error::BusError;
pub use handler::{run_consumer, spawn_consumer, MessageHandler};
pub use memory::InMemoryTopicBus;
pub use topic_bus::{Delivery, PublishReceipt, Subscription, TopicBus};
