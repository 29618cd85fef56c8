//! Signed-in user, as held by the session store

pub mod model;

pub use model::{AuthSession, UserProfile, UserRole};
