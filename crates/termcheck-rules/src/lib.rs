pub mod catalog;
pub mod evaluator;
pub mod extension;
pub mod fixture;

pub use catalog::*;
pub use evaluator::*;
pub use extension::*;
pub use fixture::*;
