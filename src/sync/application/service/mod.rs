pub mod decompose_service;
pub mod persist_service;
pub mod recompose_service;
pub mod validation_service;

pub use decompose_service::DecomposeService;
pub use persist_service::PersistService;
pub use recompose_service::{RecomposeOutput, RecomposeService};
pub use validation_service::ValidationService;
