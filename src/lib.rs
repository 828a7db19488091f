//! Configuration classloading and lifecycle engine.
//!
//! Loads named configurations from a database store, packed archives or
//! directories, layers them over shared and parent resources, and manages
//! their load, unload and reload lifecycle.

pub mod admin;
pub mod config;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod loader;
pub mod observability;
pub mod resilience;
pub mod xml;

pub use config::schema::EngineConfig;
pub use engine::ConfigurationEngine;
pub use lifecycle::Shutdown;
