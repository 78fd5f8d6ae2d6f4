//! Database entities
pub mod generation_history;
