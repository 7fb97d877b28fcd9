pub mod config;
pub mod display;
pub mod engine;
pub mod message;
pub mod pipeline;
pub mod source;
