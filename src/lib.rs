#![deny(unsafe_code)]

//! dotkeeper — a stateless dotfiles manager.
//!
//! Packs live under a source root and are never mutated by deployment. A
//! rule engine assigns each file in a pack to exactly one handler; handlers
//! are pure functions from matched files to a small set of primitive
//! operations; an executor runs those operations against a `DataStore` that
//! owns every persistent side effect. Status and clear both reconstruct
//! state by querying the same `DataStore` — nothing is cached or tracked
//! outside of it.

pub mod core;
pub mod datastore;
pub mod executor;
pub mod fs;
pub mod handlers;
pub mod logger;
pub mod packs;
pub mod pipeline;
pub mod prelude;
pub mod rules;
