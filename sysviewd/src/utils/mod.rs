pub mod mounts;
pub mod time;
pub mod units;
