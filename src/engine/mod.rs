pub mod phase;
pub mod pipeline;
pub mod scheduler;
pub mod weights;

pub use phase::*;
pub use pipeline::*;
pub use scheduler::*;
pub use weights::*;
