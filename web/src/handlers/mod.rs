//! HTTP request handlers.

pub mod appointments;
pub mod health;
pub mod ratings;
