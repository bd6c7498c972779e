pub mod defs;
pub mod loader;

pub use loader::{resolve, ConfigFile};
