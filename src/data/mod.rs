pub mod loader;
pub mod snapshot;

pub use loader::*;
pub use snapshot::*;
