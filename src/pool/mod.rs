//! C4/C5: per-origin idle pools and the LRU-of-pools manager (§4.4, §4.5).

pub mod key;
pub mod manager;
pub mod origin;

pub use key::{PoolKey, VerifyMode};
pub use manager::PoolManager;
pub use origin::PerOriginPool;
