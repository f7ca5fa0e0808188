//! Source composition and precedence.

pub mod service;
