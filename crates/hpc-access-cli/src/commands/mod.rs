pub mod snapshot;
pub mod state_dump;
pub mod state_sync;
pub mod storage_usage_sync;
