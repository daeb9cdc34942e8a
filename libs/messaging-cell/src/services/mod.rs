pub mod channel;
pub mod deliveries;
pub mod dispatcher;
pub mod evolution;
pub mod intent;
pub mod normalizer;
pub mod sender;

pub use channel::ChannelStatusService;
pub use dispatcher::{WebhookDispatcher, WebhookSettings};
pub use evolution::EvolutionApiClient;
pub use intent::{IntentClassifier, IntentKeywords};
pub use normalizer::normalize_event;
pub use sender::EvolutionNotificationSender;
