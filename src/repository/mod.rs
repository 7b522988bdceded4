//! Repository Pattern Implementation
//!
//! This module provides one storage contract for short URLs and three
//! interchangeable backends selected by configuration.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            UrlRepository                │
//! │  (Abstract interface for data access)   │
//! └──────────────┬──────────────────────────┘
//!                │
//!        ┌───────┴────────┬─────────────────┐
//!        │                │                 │
//! ┌──────▼──────┐  ┌──────▼──────────┐  ┌───▼───────────┐
//! │MemoryStore  │  │JournaledFile    │  │DatabaseStore  │
//! │             │  │Store            │  │               │
//! │- HashMap    │  │- JSON lines     │  │- SQLite       │
//! │- Volatile   │  │- Replayed       │  │- Soft delete  │
//! └─────────────┘  └─────────────────┘  └───────────────┘
//! ```

pub mod database;
pub mod factory;
pub mod file;
mod index;
pub mod memory;
mod schema;
pub mod traits;

// Re-export main types
pub use database::DatabaseStore;
pub use factory::RepositoryFactory;
pub use file::JournaledFileStore;
pub use memory::MemoryStore;
pub use traits::{RecordStream, UrlRepository};
