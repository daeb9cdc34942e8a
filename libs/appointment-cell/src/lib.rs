pub mod handlers;
pub mod router;
pub mod models;
pub mod services;
pub mod test_utils;

pub use models::*;
pub use handlers::SchedulingState;
pub use router::appointment_routes;
