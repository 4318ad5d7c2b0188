//! Shared utilities
//!
//! Logging setup, timing helpers and panic payload formatting.

pub mod logger;
pub mod timer;

use std::any::Any;

/// Extract the message carried by a caught panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
