pub mod cache;
pub mod env;
pub mod metrics;
pub mod redis_cache;
pub mod retry;
pub mod serde;

#[cfg(test)]
pub mod test_utils;
