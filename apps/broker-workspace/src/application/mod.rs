//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the application services and port interfaces
//! that define how the domain interacts with the broker session.

/// Assembly error taxonomy.
pub mod error;

/// Port interfaces for the broker session and its live objects.
pub mod ports;

/// Application services for assembly and workspace management.
pub mod services;
