//! worldsave-core: snapshot and restoration engine for a scene-based
//! simulation world.
//!
//! Save:  entities → SnapshotComposer → SaveStore
//! Load:  SaveStore → RestoreOrchestrator → entities
//!
//! `SaveEngine` wires the pieces together and is what a game embeds.

pub mod catalog;
pub mod clock;
pub mod composer;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod fallback;
pub mod identity;
pub mod restore;
pub mod rng;
pub mod saveable;
pub mod snapshot;
pub mod store;
pub mod types;
pub mod world;
