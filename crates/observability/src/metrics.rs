//! Prometheus-kompatible Metriken fuer Treffpunkt
//!
//! Registrierte Metriken:
//! - `treffpunkt_online_users` – Gauge: Registrierte Benutzer
//! - `treffpunkt_active_rooms` – Gauge: Existierende Raeume
//! - `treffpunkt_open_connections` – Gauge: Offene TCP-Verbindungen
//! - `treffpunkt_signals_relayed_total` – Counter: Weitergeleitete Signale
//! - `treffpunkt_signals_dropped_total` – Counter: Verworfene Signale
//! - `treffpunkt_room_members` – Histogram: Mitglieder pro Raum

use anyhow::Result;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Momentaufnahme der Signaling-Kennzahlen
///
/// Die Relay-Zaehler sind kumulativ seit Serverstart.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignalingKennzahlen {
    pub online_benutzer: u64,
    pub offene_verbindungen: u64,
    pub raeume: u64,
    pub signale_weitergeleitet: u64,
    pub signale_verworfen: u64,
    pub raum_groessen: Vec<usize>,
}

/// Alle Treffpunkt-Prometheus-Metriken
#[derive(Clone)]
pub struct TreffpunktMetrics {
    pub registry: Arc<Registry>,

    pub online_users: IntGauge,
    pub active_rooms: IntGauge,
    pub open_connections: IntGauge,
    pub signals_relayed_total: IntCounter,
    pub signals_dropped_total: IntCounter,
    pub room_members: Histogram,
}

impl TreffpunktMetrics {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        // --- Presence / Raeume ---
        let online_users = IntGauge::with_opts(Opts::new(
            "treffpunkt_online_users",
            "Anzahl registrierter Benutzer",
        ))?;
        registry.register(Box::new(online_users.clone()))?;

        let active_rooms = IntGauge::with_opts(Opts::new(
            "treffpunkt_active_rooms",
            "Anzahl existierender Raeume",
        ))?;
        registry.register(Box::new(active_rooms.clone()))?;

        let open_connections = IntGauge::with_opts(Opts::new(
            "treffpunkt_open_connections",
            "Anzahl offener Verbindungen (auch unregistriert)",
        ))?;
        registry.register(Box::new(open_connections.clone()))?;

        let room_members = Histogram::with_opts(
            HistogramOpts::new("treffpunkt_room_members", "Mitglieder pro Raum")
                .buckets(vec![1.0, 2.0, 3.0, 4.0, 6.0, 8.0, 12.0, 16.0]),
        )?;
        registry.register(Box::new(room_members.clone()))?;

        // --- Relay ---
        let signals_relayed_total = IntCounter::with_opts(Opts::new(
            "treffpunkt_signals_relayed_total",
            "Gesamtanzahl weitergeleiteter Signal-Nachrichten",
        ))?;
        registry.register(Box::new(signals_relayed_total.clone()))?;

        let signals_dropped_total = IntCounter::with_opts(Opts::new(
            "treffpunkt_signals_dropped_total",
            "Gesamtanzahl verworfener Signal-Nachrichten",
        ))?;
        registry.register(Box::new(signals_dropped_total.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            online_users,
            active_rooms,
            open_connections,
            signals_relayed_total,
            signals_dropped_total,
            room_members,
        })
    }

    /// Uebernimmt eine Momentaufnahme
    ///
    /// Gauges werden gesetzt, Counter um die Differenz zum letzten Stand
    /// erhoeht. Die Raumgroessen gehen als Stichprobe ins Histogram ein.
    pub fn aktualisieren(&self, kennzahlen: &SignalingKennzahlen) {
        self.online_users.set(gauge_wert(kennzahlen.online_benutzer));
        self.active_rooms.set(gauge_wert(kennzahlen.raeume));
        self.open_connections
            .set(gauge_wert(kennzahlen.offene_verbindungen));

        counter_nachziehen(&self.signals_relayed_total, kennzahlen.signale_weitergeleitet);
        counter_nachziehen(&self.signals_dropped_total, kennzahlen.signale_verworfen);

        for groesse in &kennzahlen.raum_groessen {
            self.room_members.observe(*groesse as f64);
        }
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

fn gauge_wert(wert: u64) -> i64 {
    i64::try_from(wert).unwrap_or(i64::MAX)
}

fn counter_nachziehen(counter: &IntCounter, stand: u64) {
    let bisher = counter.get();
    if stand > bisher {
        counter.inc_by(stand - bisher);
    }
}

/// Axum-Router fuer den `/metrics`-Endpunkt
pub fn metrics_router(metriken: TreffpunktMetrics) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metriken)
}

async fn metrics_handler(State(metriken): State<TreffpunktMetrics>) -> impl IntoResponse {
    match metriken.exportieren() {
        Ok(text) => (
            StatusCode::OK,
            [(
                axum::http::header::CONTENT_TYPE,
                "text/plain; version=0.0.4",
            )],
            text,
        )
            .into_response(),
        Err(err) => {
            tracing::error!(fehler = %err, "Metriken-Export fehlgeschlagen");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
