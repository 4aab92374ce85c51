//! Request/response protocol and UI notifications.

pub mod notify;
pub mod protocol;
