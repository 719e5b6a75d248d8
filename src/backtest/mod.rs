pub mod split;
pub mod validation;
pub mod walk_forward;

pub use split::*;
pub use validation::*;
pub use walk_forward::*;
