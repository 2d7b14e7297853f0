//! Core Data Types
//!
//! Request/event/usage shapes shared across the pipeline, plus the unified
//! error type.

pub mod error;
pub mod event;
pub mod request;
pub mod usage;

pub use error::{ForgeError, Result, StreamFault};
pub use event::TokenEvent;
pub use request::{GenerationRequest, ImageAttachment};
pub use usage::{UsageDelta, UsageRecord};
