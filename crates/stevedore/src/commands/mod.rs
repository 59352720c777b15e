//! Command implementations

pub mod down;
pub mod up;
