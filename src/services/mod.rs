//! Application-layer services: the thin layer between the Agent Loop and
//! the database that turns repository calls into the domain operations the
//! loop actually needs (append a message, bump usage, fetch history).

pub mod checkpoint_service;
pub mod message_service;
pub mod service_context;
pub mod session_service;

pub use checkpoint_service::CheckpointService;
pub use message_service::MessageService;
pub use service_context::ServiceContext;
pub use session_service::SessionService;
