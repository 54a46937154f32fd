//! Completion endpoint access: escalation ladder and gateway.

pub mod gateway;
pub mod ladder;

pub use gateway::{Completion, CompletionApi, CompletionGateway, GenerationParams, HttpCompletionApi};
pub use ladder::{Ladder, Rung};
