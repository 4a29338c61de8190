pub mod result_cache;

pub use result_cache::{CacheRecord, CacheStats, ResultCache};
