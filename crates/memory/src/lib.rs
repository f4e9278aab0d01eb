//! History store implementations for convorelay.

pub mod clock;
pub mod in_memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use clock::TurnClock;
pub use in_memory::InMemoryHistory;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteHistory;
