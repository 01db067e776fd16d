//! Shared types for the Elara companion agent.
//!
//! These are the plain-data types exchanged between the memory store and its
//! external collaborators (the emotion detector, the response generator, and
//! whatever front-end is driving the conversation).

pub mod conversation;
pub mod emotion;

pub use conversation::{ParseRoleError, Role};
pub use emotion::{EmotionSnapshot, ParseSentimentError, Sentiment};
