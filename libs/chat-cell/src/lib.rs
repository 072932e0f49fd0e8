pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::*;
pub use router::chat_routes;
pub use services::chat::{ChatService, MAX_MESSAGE_CHARS};
