pub mod backoff;
pub mod error;
pub mod ids;
pub mod model;
pub mod query;
pub mod types;

pub use backoff::*;
pub use error::*;
pub use ids::*;
pub use model::*;
pub use query::*;
pub use types::*;
