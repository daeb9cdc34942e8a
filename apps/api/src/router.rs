use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use appointment_cell::{appointment_routes, SchedulingState};
use messaging_cell::{messaging_routes, MessagingState};

pub fn create_router(scheduling: Arc<SchedulingState>, messaging: Arc<MessagingState>) -> Router {
    Router::new()
        .route("/", get(|| async { "Clinic Scheduler API is running!" }))
        .merge(appointment_routes(scheduling))
        .merge(messaging_routes(messaging))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::{Request, StatusCode}};
    use tower::ServiceExt;

    use appointment_cell::models::local_offset;
    use appointment_cell::services::{AppointmentBookingService, NotificationDispatcher, SlotRecommendationService};
    use appointment_cell::test_utils::{InMemoryCalendarStore, RecordingNotificationSender};
    use messaging_cell::services::{ChannelStatusService, IntentClassifier, WebhookDispatcher, WebhookSettings};
    use shared_utils::test_utils::TestConfig;

    fn app() -> Router {
        let config = TestConfig::default().to_arc();
        let offset = local_offset(config.clinic_utc_offset_hours);
        let store = Arc::new(InMemoryCalendarStore::new());
        let (dispatcher, _failures) = NotificationDispatcher::new(Arc::new(RecordingNotificationSender::new()), 1);

        let booking = Arc::new(AppointmentBookingService::new(store.clone(), dispatcher, offset));
        let slots = Arc::new(SlotRecommendationService::new(store.clone(), offset));

        let messaging = Arc::new(MessagingState {
            dispatcher: Arc::new(WebhookDispatcher::new(
                booking.clone(),
                slots.clone(),
                IntentClassifier::default(),
                WebhookSettings::from(config.as_ref()),
            )),
            channel: Arc::new(ChannelStatusService::new(None, store)),
        });
        let scheduling = Arc::new(SchedulingState { config, booking, slots });

        create_router(scheduling, messaging)
    }

    #[tokio::test]
    async fn test_serves_liveness_and_both_cells() {
        let response = app()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/webhooks/messaging")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/appointments/00000000-0000-0000-0000-000000000001")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
