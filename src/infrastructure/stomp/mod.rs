//! STOMP broker adapter

mod channel;
pub mod frame;

pub use channel::StompChannel;
pub use frame::{StompCommand, StompFrame, StompFrameError};
