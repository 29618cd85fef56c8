//! Infrastructure layer - adapters for the application ports

pub mod channel;
pub mod http;
pub mod session;
pub mod stomp;
pub mod storage;

pub use channel::{ChannelActivity, InMemoryChannel};
pub use http::HttpBookingApi;
pub use session::KvSessionStore;
pub use stomp::StompChannel;
pub use storage::{FileKeyValueStore, InMemoryKeyValueStore};
