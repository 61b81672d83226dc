//! Health-Check-Endpunkt fuer Treffpunkt
//!
//! Endpoint: `GET /health`
//! Response: JSON mit Status, Version, Uptime und Anzahl registrierter Benutzer

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Status des Health-Checks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Antwort des Health-Check-Endpunkts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub online_users: u64,
    pub timestamp: DateTime<Utc>,
}

/// Geteilter Zustand fuer den Health-Check-Handler
///
/// Wird vom Metriken-Task des Servers aktualisiert.
#[derive(Clone)]
pub struct HealthState {
    start_time: Arc<Instant>,
    online_users: Arc<AtomicU64>,
    signaling_aktiv: Arc<AtomicBool>,
}

impl HealthState {
    pub fn neu() -> Self {
        Self {
            start_time: Arc::new(Instant::now()),
            online_users: Arc::new(AtomicU64::new(0)),
            signaling_aktiv: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn online_users(&self) -> u64 {
        self.online_users.load(Ordering::Relaxed)
    }

    pub fn online_users_setzen(&self, anzahl: u64) {
        self.online_users.store(anzahl, Ordering::Relaxed);
    }

    pub fn signaling_aktiv(&self) -> bool {
        self.signaling_aktiv.load(Ordering::Relaxed)
    }

    /// Markiert den Signaling-Listener als gestoppt oder laufend
    pub fn signaling_status_setzen(&self, aktiv: bool) {
        self.signaling_aktiv.store(aktiv, Ordering::Relaxed);
    }

    fn antwort(&self) -> HealthResponse {
        HealthResponse {
            status: if self.signaling_aktiv() {
                HealthStatus::Healthy
            } else {
                HealthStatus::Unhealthy
            },
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.uptime_seconds(),
            online_users: self.online_users(),
            timestamp: Utc::now(),
        }
    }
}

impl Default for HealthState {
    fn default() -> Self {
        Self::neu()
    }
}

/// Axum-Router fuer den `/health`-Endpunkt
pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(state)
}

/// `GET /health` – gibt den Serverstatus zurueck
async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let response = state.antwort();
    let http_status = match response.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (http_status, Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_state_frisch() {
        let state = HealthState::neu();
        assert!(state.uptime_seconds() < 5);
        assert_eq!(state.online_users(), 0);
        assert!(state.signaling_aktiv());
    }

    #[test]
    fn klone_teilen_zustand() {
        let state = HealthState::neu();
        let klon = state.clone();
        klon.online_users_setzen(7);
        assert_eq!(state.online_users(), 7);
    }

    #[test]
    fn gestopptes_signaling_ist_unhealthy() {
        let state = HealthState::neu();
        state.signaling_status_setzen(false);
        assert_eq!(state.antwort().status, HealthStatus::Unhealthy);
    }

    #[test]
    fn health_response_serialisierung() {
        let state = HealthState::neu();
        state.online_users_setzen(2);
        let json = serde_json::to_string(&state.antwort()).unwrap();
        assert!(json.contains("\"status\":\"healthy\""));
        assert!(json.contains("\"online_users\":2"));
        assert!(json.contains("\"timestamp\""));
    }

    #[test]
    fn health_response_deserialisierung() {
        let json = r#"{"status":"healthy","version":"0.1.0","uptime_seconds":100,"online_users":3,"timestamp":"2026-01-01T00:00:00Z"}"#;
        let response: HealthResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.status, HealthStatus::Healthy);
        assert_eq!(response.uptime_seconds, 100);
        assert_eq!(response.online_users, 3);
    }
}
