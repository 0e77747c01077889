//! 缓存条目的持久化记录（只管存储，不含任何淘汰策略）

mod entry;
mod store;

pub use entry::CacheEntry;
pub use store::CacheStore;
