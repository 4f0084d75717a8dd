//! # Shared Types Crate
//!
//! Identifiers used across the radar workspace.
//!
//! ## Design Principles
//!
//! - **Opaque hashes**: a [`TxHash`] is only ever compared and hashed; the
//!   radar never interprets transaction contents.
//! - **Small integer ids**: sessions are indexed by [`ConnectionId`], never by
//!   socket handles or pointers.

pub mod entities;
pub mod errors;

pub use entities::*;
pub use errors::*;
