//! Library half of the `vault-init` binary, split out so its configuration
//! can be unit tested.

pub mod config;
