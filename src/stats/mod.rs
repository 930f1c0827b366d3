//! Request log formatting

mod request_log;

pub use request_log::*;
