//! Structured Logging Setup via tracing-subscriber
//!
//! Konfigurierbar per Umgebungsvariable (ueberschreibt die Konfigdatei):
//! - `TP_LOG_LEVEL`: Filter-Direktive, z.B. `info` oder `treffpunkt_signaling=debug`
//! - `TP_LOG_FORMAT`: Format (text/json), Standard: text

use tracing_subscriber::{fmt, EnvFilter};

pub const ENV_LOG_LEVEL: &str = "TP_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "TP_LOG_FORMAT";

/// Ausgabeformat der Logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    /// Unbekannte Werte fallen auf `Text` zurueck
    pub fn aus_str(format: &str) -> Self {
        match format {
            "json" => LogFormat::Json,
            _ => LogFormat::Text,
        }
    }
}

/// Initialisiert das Logging-System.
///
/// `TP_LOG_LEVEL` und `TP_LOG_FORMAT` haben Vorrang vor den uebergebenen
/// Werten. Ist der Filter ungueltig, wird `info` verwendet.
/// Ein bereits installierter globaler Subscriber bleibt bestehen.
pub fn logging_initialisieren(level: &str, format: &str) {
    let filter = EnvFilter::try_from_env(ENV_LOG_LEVEL)
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let format = std::env::var(ENV_LOG_FORMAT).unwrap_or_else(|_| format.to_string());

    let ergebnis = match LogFormat::aus_str(&format) {
        LogFormat::Json => fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_current_span(true)
            .try_init(),
        LogFormat::Text => fmt().with_env_filter(filter).with_target(true).try_init(),
    };

    if let Err(e) = ergebnis {
        eprintln!("Logging bereits initialisiert: {e}");
    }
}

/// Validiert ob ein einfacher Log-Level-String gueltig ist.
pub fn log_level_gueltig(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error")
}

/// Validiert ob ein Log-Format-String gueltig ist.
pub fn log_format_gueltig(format: &str) -> bool {
    matches!(format, "text" | "json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_gueltige_werte() {
        for level in ["trace", "debug", "info", "warn", "error"] {
            assert!(log_level_gueltig(level));
        }
    }

    #[test]
    fn log_level_ungueltige_werte() {
        assert!(!log_level_gueltig("verbose"));
        assert!(!log_level_gueltig("INFO")); // Gross-/Kleinschreibung
        assert!(!log_level_gueltig(""));
    }

    #[test]
    fn log_format_werte() {
        assert!(log_format_gueltig("text"));
        assert!(log_format_gueltig("json"));
        assert!(!log_format_gueltig("xml"));
        assert!(!log_format_gueltig("JSON"));
    }

    #[test]
    fn log_format_parsen() {
        assert_eq!(LogFormat::aus_str("json"), LogFormat::Json);
        assert_eq!(LogFormat::aus_str("text"), LogFormat::Text);
        assert_eq!(LogFormat::aus_str("xml"), LogFormat::Text);
    }

    #[test]
    fn doppelte_initialisierung_ist_erlaubt() {
        logging_initialisieren("warn", "text");
        logging_initialisieren("debug", "json");
    }
}
