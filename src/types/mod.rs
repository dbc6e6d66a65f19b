//! Core types for Colloquy.

pub mod generation;
pub mod message;

pub use generation::*;
pub use message::*;
