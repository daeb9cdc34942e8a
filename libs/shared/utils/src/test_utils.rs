use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;

pub struct TestConfig {
    pub supabase_url: String,
    pub supabase_service_key: String,
    pub messaging_api_url: String,
    pub messaging_api_key: String,
    pub utc_offset_hours: i32,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            supabase_url: "http://localhost:54321".to_string(),
            supabase_service_key: "test-service-key".to_string(),
            messaging_api_url: "http://localhost:8080".to_string(),
            messaging_api_key: "test-messaging-key".to_string(),
            utc_offset_hours: 0,
        }
    }
}

impl TestConfig {
    pub fn with_supabase(mut self, url: impl Into<String>) -> Self {
        self.supabase_url = url.into();
        self
    }

    pub fn with_messaging(mut self, url: impl Into<String>) -> Self {
        self.messaging_api_url = url.into();
        self
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_service_key: self.supabase_service_key.clone(),
            messaging_api_url: self.messaging_api_url.clone(),
            messaging_api_key: self.messaging_api_key.clone(),
            messaging_timeout_secs: 2,
            clinic_utc_offset_hours: self.utc_offset_hours,
            ..AppConfig::default()
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

/// PostgREST row fixtures in the shape the store adapters read.
pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn service_response(organization_id: Uuid, service_id: Uuid, duration_minutes: i64) -> Value {
        json!({
            "id": service_id,
            "organization_id": organization_id,
            "name": "Limpeza",
            "duration_minutes": duration_minutes,
            "price": 150.0,
            "color": "#4f46e5",
            "active": true
        })
    }

    pub fn customer_response(organization_id: Uuid, customer_id: Uuid, phone: &str) -> Value {
        json!({
            "id": customer_id,
            "organization_id": organization_id,
            "name": "Maria Souza",
            "phone": phone,
            "active": true
        })
    }

    pub fn appointment_response(
        organization_id: Uuid,
        appointment_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        status: &str,
    ) -> Value {
        json!({
            "id": appointment_id,
            "organization_id": organization_id,
            "customer_id": Uuid::new_v4(),
            "service_id": Uuid::new_v4(),
            "staff_id": null,
            "start_time": start_time.to_rfc3339(),
            "end_time": end_time.to_rfc3339(),
            "status": status,
            "confirmed_at": null,
            "canceled_at": null,
            "created_at": Utc::now().to_rfc3339(),
            "updated_at": Utc::now().to_rfc3339()
        })
    }

    pub fn channel_response(organization_id: Uuid, instance_name: &str) -> Value {
        json!({
            "organization_id": organization_id,
            "instance_name": instance_name,
            "api_key": null
        })
    }
}

/// Polls `check` until it returns true or `timeout` elapses. Used to observe
/// work that was handed off to spawned tasks.
pub async fn wait_until<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = Instant::now();

    loop {
        if check().await {
            return true;
        }
        if start.elapsed() > timeout {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
