mod storage;

pub use storage::*;
