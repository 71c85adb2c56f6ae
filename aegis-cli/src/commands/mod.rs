//! Subcommand implementations.

pub mod distribute;
pub mod embed;
pub mod extract;
pub mod identity;
pub mod sniff;
pub mod trace;
