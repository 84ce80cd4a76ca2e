// Shared type definitions for the synchronization core.
// Each submodule defines types used across managers, services and gateways.

pub mod bookmark;
pub mod counts;
pub mod errors;
pub mod feed;
pub mod outcome;
pub mod settings;
pub mod view;
