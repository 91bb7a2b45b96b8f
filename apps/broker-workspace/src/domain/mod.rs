//! Domain Layer - Core workspace types.
//!
//! This layer contains the workspace registry and contract metadata.
//! Nothing here talks to a broker; collaborators live behind the
//! application layer's ports.

/// Contract metadata and the markets-open signal.
pub mod market;

/// Named registry of live objects.
pub mod workspace;
