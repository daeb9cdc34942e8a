//! Conversational side of the scheduler: provider webhooks in, replies and
//! notifications out.
//!
//! Inbound events are normalized, classified as confirm or cancel, and
//! applied to the sender's next appointment. Outbound traffic goes through
//! [`services::EvolutionNotificationSender`], which plugs into the
//! appointment cell's notification dispatcher.

pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use handlers::MessagingState;
pub use models::*;
pub use router::messaging_routes;
