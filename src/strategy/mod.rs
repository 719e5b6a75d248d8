pub mod patterns;
pub mod rule_based;
pub mod scorer;

pub use patterns::*;
pub use rule_based::*;
pub use scorer::*;
