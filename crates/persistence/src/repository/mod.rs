//! Repository implementations for database operations

pub mod findings;
pub mod patterns;
pub mod prices;
pub mod strategies;

pub use findings::*;
pub use patterns::*;
pub use prices::*;
pub use strategies::*;
