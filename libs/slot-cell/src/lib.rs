pub mod handlers;
pub mod router;
pub mod models;
pub mod services;

pub use models::*;
pub use router::slot_routes;
pub use services::generation::{generate_slot_times, SLOT_MINUTES};
pub use services::slot::SlotService;
