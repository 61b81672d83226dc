//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use treffpunkt_protocol::wire::DEFAULT_MAX_FRAME_SIZE;
use treffpunkt_signaling::SignalingConfig;

/// Umgebungsvariable fuer den Pfad der Konfigurationsdatei
pub const ENV_CONFIG: &str = "TP_CONFIG";

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Allgemeine Server-Einstellungen
    pub server: ServerEinstellungen,
    /// Netzwerk-Einstellungen
    pub netzwerk: NetzwerkEinstellungen,
    /// Signaling-Einstellungen (Timeouts, Queues, Raumgroesse)
    pub signaling: SignalingEinstellungen,
    /// Kontaktquelle fuer Presence
    pub kontakte: KontaktEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
    /// Observability-Einstellungen (Metriken, Health)
    pub observability: ObservabilityEinstellungen,
}

/// Allgemeine Server-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEinstellungen {
    /// Anzeigename des Servers
    pub name: String,
    /// Maximale Anzahl gleichzeitiger Verbindungen
    pub max_clients: u32,
}

impl Default for ServerEinstellungen {
    fn default() -> Self {
        Self {
            name: "Treffpunkt".into(),
            max_clients: 1024,
        }
    }
}

/// Netzwerk-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    /// Bind-Adresse fuer Signaling und Observability
    pub bind_adresse: String,
    /// Port fuer die Signaling-Verbindungen
    pub tcp_port: u16,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            tcp_port: 7400,
        }
    }
}

/// Signaling-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalingEinstellungen {
    /// Idle-Timeout in Sekunden (0 = aus)
    pub verbindungs_timeout_sek: u64,
    /// Ausgehende Nachrichten pro Verbindung, bevor getrennt wird
    pub send_queue_groesse: usize,
    /// Maximale Frame-Groesse in Bytes
    pub max_frame_groesse: usize,
    /// Mitgliederzahl ab der beim Raumbeitritt gewarnt wird
    pub mesh_soft_cap: usize,
}

impl Default for SignalingEinstellungen {
    fn default() -> Self {
        let basis = SignalingConfig::default();
        Self {
            verbindungs_timeout_sek: basis.verbindungs_timeout_sek,
            send_queue_groesse: basis.send_queue_groesse,
            max_frame_groesse: DEFAULT_MAX_FRAME_SIZE,
            mesh_soft_cap: basis.mesh_soft_cap,
        }
    }
}

/// Kontaktquelle
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KontaktEinstellungen {
    /// TOML-Datei mit Kontaktlisten (leer = niemand hat Kontakte)
    pub datei: Option<String>,
    /// Start abbrechen wenn die Datei nicht geladen werden kann
    pub pflicht: bool,
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level oder Filter-Direktive
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Observability-Einstellungen (Metriken + Health-Check)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityEinstellungen {
    /// Aktiviert den Observability-Server
    pub aktiviert: bool,
    /// Port fuer Metriken und Health
    pub port: u16,
    /// Intervall in Sekunden fuer die Aktualisierung der Metriken
    pub intervall_sek: u64,
}

impl Default for ObservabilityEinstellungen {
    fn default() -> Self {
        Self {
            aktiviert: true,
            port: 9300,
            intervall_sek: 5,
        }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }

    /// Bind-Adresse fuer die Signaling-Verbindungen
    pub fn tcp_bind_adresse(&self) -> anyhow::Result<SocketAddr> {
        adresse_parsen(&self.netzwerk.bind_adresse, self.netzwerk.tcp_port)
    }

    /// Bind-Adresse fuer den Observability-Server
    pub fn observability_bind_adresse(&self) -> anyhow::Result<SocketAddr> {
        adresse_parsen(&self.netzwerk.bind_adresse, self.observability.port)
    }

    /// Leitet die Konfiguration des Signaling-Service ab
    pub fn signaling_config(&self) -> SignalingConfig {
        SignalingConfig {
            server_name: self.server.name.clone(),
            max_clients: self.server.max_clients,
            verbindungs_timeout_sek: self.signaling.verbindungs_timeout_sek,
            send_queue_groesse: self.signaling.send_queue_groesse.max(1),
            max_frame_groesse: self.signaling.max_frame_groesse,
            mesh_soft_cap: self.signaling.mesh_soft_cap,
        }
    }
}

fn adresse_parsen(host: &str, port: u16) -> anyhow::Result<SocketAddr> {
    format!("{host}:{port}")
        .parse()
        .map_err(|e| anyhow::anyhow!("Ungueltige Bind-Adresse '{host}:{port}': {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config_ist_valide() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.server.max_clients, 1024);
        assert_eq!(cfg.netzwerk.tcp_port, 7400);
        assert_eq!(cfg.signaling.mesh_soft_cap, 8);
        assert_eq!(cfg.logging.level, "info");
        assert!(cfg.kontakte.datei.is_none());
        assert!(cfg.observability.aktiviert);
    }

    #[test]
    fn bind_adressen() {
        let cfg = ServerConfig::default();
        assert_eq!(
            cfg.tcp_bind_adresse().unwrap(),
            "0.0.0.0:7400".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(cfg.observability_bind_adresse().unwrap().port(), 9300);
    }

    #[test]
    fn ungueltige_bind_adresse() {
        let mut cfg = ServerConfig::default();
        cfg.netzwerk.bind_adresse = "kein host".into();
        assert!(cfg.tcp_bind_adresse().is_err());
    }

    #[test]
    fn config_aus_toml_string() {
        let toml = r#"
            [server]
            name = "Mein Treffpunkt"

            [signaling]
            verbindungs_timeout_sek = 0
            mesh_soft_cap = 4

            [kontakte]
            datei = "kontakte.toml"
        "#;
        let cfg: ServerConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.server.name, "Mein Treffpunkt");
        assert_eq!(cfg.signaling.verbindungs_timeout_sek, 0);
        assert_eq!(cfg.kontakte.datei.as_deref(), Some("kontakte.toml"));
        // Nicht angegebene Felder behalten Standardwerte
        assert_eq!(cfg.server.max_clients, 1024);
        assert_eq!(cfg.netzwerk.tcp_port, 7400);
        assert!(!cfg.kontakte.pflicht);
    }

    #[test]
    fn signaling_config_ableiten() {
        let mut cfg = ServerConfig::default();
        cfg.server.name = "Test".into();
        cfg.signaling.send_queue_groesse = 0;
        let sig = cfg.signaling_config();
        assert_eq!(sig.server_name, "Test");
        assert_eq!(sig.send_queue_groesse, 1);
        assert_eq!(sig.mesh_soft_cap, 8);
    }

    #[test]
    fn fehlende_datei_liefert_standard() {
        let cfg = ServerConfig::laden("/nicht/vorhanden/treffpunkt.toml").unwrap();
        assert_eq!(cfg.netzwerk.tcp_port, 7400);
    }

    #[test]
    fn kaputte_datei_ist_fehler() {
        let pfad = std::env::temp_dir().join(format!("tp-config-{}.toml", std::process::id()));
        std::fs::write(&pfad, "[server\nname = ").unwrap();
        let ergebnis = ServerConfig::laden(pfad.to_str().unwrap());
        std::fs::remove_file(&pfad).ok();
        assert!(ergebnis.is_err());
    }
}
