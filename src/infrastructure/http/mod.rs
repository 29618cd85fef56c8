//! REST adapter

mod client;

pub use client::HttpBookingApi;
