//! Local persistence: sensor records and operator settings.

pub mod memory;
pub mod sql;
pub mod traits;

pub use memory::InMemoryStore;
pub use sql::{Dialect, SqlStore};
pub use traits::{RecordStore, SettingsStore, StorageError};
