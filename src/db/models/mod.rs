//! Database models.

pub mod registration;

pub use self::registration::*;
