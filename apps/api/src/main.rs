use std::net::SocketAddr;
use std::sync::Arc;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{CorsLayer, Any};
use tower_http::trace::{self, TraceLayer};
use tracing::{Level, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use appointment_cell::models::local_offset;
use appointment_cell::services::{
    AppointmentBookingService, CalendarStore, NotificationDispatcher, SlotRecommendationService,
    SupabaseCalendarStore,
};
use appointment_cell::SchedulingState;
use messaging_cell::services::{
    ChannelStatusService, EvolutionApiClient, EvolutionNotificationSender, IntentClassifier,
    WebhookDispatcher, WebhookSettings,
};
use messaging_cell::MessagingState;
use shared_config::AppConfig;
use shared_database::SupabaseClient;

#[tokio::main]
async fn main() {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Clinic Scheduler API server");

    // Load configuration
    let config = Arc::new(AppConfig::from_env());
    if !config.is_configured() {
        warn!("Calendar store is not fully configured; requests will fail until it is");
    }

    let offset = local_offset(config.clinic_utc_offset_hours);

    // Calendar store
    let supabase = Arc::new(SupabaseClient::new(&config));
    let store: Arc<dyn CalendarStore> = Arc::new(SupabaseCalendarStore::new(supabase));

    // Messaging provider
    let provider = match EvolutionApiClient::new(&config) {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            warn!("Messaging provider disabled: {}", e);
            None
        }
    };
    let sender = Arc::new(EvolutionNotificationSender::new(
        provider.clone(),
        Arc::clone(&store),
        config.default_country_code.clone(),
    ));
    let notifications = NotificationDispatcher::with_failure_logging(sender, config.notification_concurrency);

    // Services
    let booking = Arc::new(AppointmentBookingService::new(Arc::clone(&store), notifications, offset));
    let slots = Arc::new(SlotRecommendationService::new(Arc::clone(&store), offset));

    let messaging = Arc::new(MessagingState {
        dispatcher: Arc::new(WebhookDispatcher::new(
            Arc::clone(&booking),
            Arc::clone(&slots),
            IntentClassifier::default(),
            WebhookSettings::from(config.as_ref()),
        )),
        channel: Arc::new(ChannelStatusService::new(provider, Arc::clone(&store))),
    });
    let scheduling = Arc::new(SchedulingState {
        config: Arc::clone(&config),
        booking,
        slots,
    });

    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build the application router
    let app = router::create_router(scheduling, messaging)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new()
                    .level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new()
                    .level(Level::INFO)),
        )
        .layer(cors);

    // Run the server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Listening on {}", addr);

    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", addr, e);
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        error!("Server error: {}", e);
    }
}
