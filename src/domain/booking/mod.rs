//! Booking domain

pub mod model;

pub use model::{
    BookingDetails, BookingId, BookingRequest, BookingSnapshot, BookingStatus, GeoPoint,
};
