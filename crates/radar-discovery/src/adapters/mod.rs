//! Candidate source adapters.

/// `[seeds]` config table
pub mod config;
/// DNS seed resolution
pub mod dns_seed;
/// Fixed lists and chaining
pub mod static_list;
