// ABOUTME: Root library module for the chatlog host layer
// ABOUTME: Exposes config, paths, reply channels, and the long-message handler

pub mod channel;
pub mod config;
pub mod handler;
pub mod paths;

// Re-export the core types hosts touch most
pub use chatlog_core::{ArtifactHandle, ArtifactManager, ConversionPolicy, IncomingMessage};
