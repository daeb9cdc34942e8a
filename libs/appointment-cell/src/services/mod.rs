pub mod booking;
pub mod conflict;
pub mod lifecycle;
pub mod locks;
pub mod notification;
pub mod slots;
pub mod store;
pub mod supabase_store;
pub mod templates;

pub use booking::{AppointmentBookingService, RenderedMessage};
pub use conflict::ConflictDetectionService;
pub use lifecycle::AppointmentLifecycleService;
pub use locks::SchedulingLocks;
pub use notification::{
    MessageBody, NotificationDispatcher, NotificationError, NotificationFailure, NotificationSender,
    OutboundNotification,
};
pub use slots::SlotRecommendationService;
pub use store::CalendarStore;
pub use supabase_store::SupabaseCalendarStore;
