//! The Quarry Library.
//!
//! Shared entity core of the Quarry storage-orchestration control plane.
//! The controller and satellite crates both build their cluster topology
//! (nodes, resources, volumes, storage pools, snapshots and the pairwise
//! relations between them) from the types in this crate, so that both
//! processes converge on structurally identical object graphs.

#![deny(
    asm_sub_register,
    deprecated,
    missing_abi,
    unsafe_code,
    unused_macros,
    unused_must_use,
    unused_unsafe
)]
#![deny(clippy::from_over_into, clippy::needless_question_mark)]
#![cfg_attr(
    not(debug_assertions),
    deny(unused_imports, unused_mut, unused_variables,)
)]

pub mod access;
pub mod db;
pub mod error;
pub mod flags;
pub mod identifier;
pub mod objects;
pub mod pool;
pub mod props;
pub mod repository;
pub mod testing;
pub mod transaction;

pub use error::{QuarryError, QuarryResult};
