pub mod load_request;
pub mod resource_snapshot;
pub mod save_request;
