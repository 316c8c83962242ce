//! `health`: query the translation backend's health endpoint.

use super::{EXIT_CONFIG, EXIT_FAILURE, EXIT_OK};
use crate::backend::{HttpInferenceClient, InferenceBackend};
use crate::config;

/// Print backend health as JSON. Exit 0 when the backend reports healthy.
pub async fn run_health() -> i32 {
    let env = config::load();
    let client = match HttpInferenceClient::new(env.backend) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("ERROR: {e}");
            return EXIT_CONFIG;
        }
    };

    let health = client.health_check().await;
    match serde_json::to_string_pretty(&health) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("Failed to encode health report: {e}"),
    }
    if health.is_healthy() {
        EXIT_OK
    } else {
        EXIT_FAILURE
    }
}
