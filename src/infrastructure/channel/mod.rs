//! In-process live channel

mod memory;

pub use memory::{ChannelActivity, InMemoryChannel};
