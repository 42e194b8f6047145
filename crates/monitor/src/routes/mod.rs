pub mod snapshots;
pub mod status;
