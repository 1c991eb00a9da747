pub mod config;
pub mod pools;
pub mod reconcile;
pub mod runner;
pub mod service;
pub mod util;

pub use config::*;
pub use pools::*;
pub use reconcile::*;
pub use runner::*;
pub use service::*;
pub use util::*;
