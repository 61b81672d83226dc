//! treffpunkt-server – Bibliotheks-Root
//!
//! Verdrahtet Konfiguration, Kontaktquelle, Signaling-Server und
//! Observability und stellt den Einstiegspunkt fuer Tests bereit.

pub mod config;

use anyhow::Result;
use config::ServerConfig;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use treffpunkt_observability::{
    observability_server_starten, HealthState, SignalingKennzahlen, TreffpunktMetrics,
};
use treffpunkt_signaling::{
    ContactLookup, KeineKontakte, SignalingServer, SignalingState, StatischeKontakte,
};

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Baut die Kontaktquelle aus der Konfiguration
    ///
    /// Eine nicht ladbare Datei fuehrt nur bei `pflicht = true` zum Abbruch,
    /// sonst laeuft der Server ohne Kontakte weiter.
    pub fn kontakte_laden(&self) -> Result<Arc<dyn ContactLookup>> {
        let Some(pfad) = self.config.kontakte.datei.as_deref() else {
            tracing::info!("Keine Kontaktdatei konfiguriert, Presence ohne Kontakte");
            return Ok(Arc::new(KeineKontakte));
        };

        match StatischeKontakte::aus_datei(Path::new(pfad)) {
            Ok(kontakte) => {
                tracing::info!(
                    pfad = pfad,
                    benutzer = kontakte.benutzer_anzahl(),
                    "Kontaktliste geladen"
                );
                Ok(Arc::new(kontakte))
            }
            Err(e) if self.config.kontakte.pflicht => Err(e.into()),
            Err(e) => {
                tracing::warn!(fehler = %e, "Kontaktliste nicht geladen, Presence ohne Kontakte");
                Ok(Arc::new(KeineKontakte))
            }
        }
    }

    /// Startet alle Server-Subsysteme und laeuft bis Ctrl-C
    pub async fn starten(self) -> Result<()> {
        let listener = TcpListener::bind(self.config.tcp_bind_adresse()?).await?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let ctrl_c = tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => tracing::info!("Shutdown-Signal empfangen, Server wird beendet"),
                Err(e) => tracing::error!(fehler = %e, "Ctrl-C-Handler fehlgeschlagen"),
            }
            let _ = shutdown_tx.send(true);
        });

        let ergebnis = self.mit_listener_starten(listener, shutdown_rx).await;
        ctrl_c.abort();
        ergebnis
    }

    /// Laeuft auf einem bereits gebundenen Listener bis `shutdown_rx` `true` meldet
    ///
    /// Reihenfolge:
    /// 1. Kontaktquelle laden
    /// 2. Observability-Server und Metriken-Task starten (falls aktiviert)
    /// 3. Signaling-Server betreiben
    pub async fn mit_listener_starten(
        self,
        listener: TcpListener,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Result<()> {
        let kontakte = self.kontakte_laden()?;
        let state = SignalingState::neu(self.config.signaling_config(), kontakte);

        tracing::info!(
            server_name = %self.config.server.name,
            adresse = %listener.local_addr()?,
            max_clients = self.config.server.max_clients,
            "Server startet"
        );

        let health = HealthState::neu();
        let mut hintergrund = Vec::new();

        if self.config.observability.aktiviert {
            let metriken = TreffpunktMetrics::neu()?;
            let bind = self.config.observability_bind_adresse()?;

            let http_health = health.clone();
            let http_metriken = metriken.clone();
            let http_shutdown = shutdown_rx.clone();
            hintergrund.push(tokio::spawn(async move {
                if let Err(e) =
                    observability_server_starten(bind, http_metriken, http_health, http_shutdown)
                        .await
                {
                    tracing::error!(fehler = %e, "Observability-Server beendet");
                }
            }));

            let intervall = Duration::from_secs(self.config.observability.intervall_sek.max(1));
            hintergrund.push(tokio::spawn(metriken_aktualisieren(
                Arc::clone(&state),
                metriken,
                health.clone(),
                intervall,
                shutdown_rx.clone(),
            )));
        }

        let ergebnis = SignalingServer::neu(Arc::clone(&state), listener.local_addr()?)
            .mit_listener_starten(listener, shutdown_rx)
            .await;
        health.signaling_status_setzen(false);

        for task in hintergrund {
            if ergebnis.is_err() {
                task.abort();
            }
            let _ = task.await;
        }

        tracing::info!(uptime_sek = state.uptime_sek(), "Server gestoppt");
        ergebnis.map_err(Into::into)
    }
}

/// Liest die aktuellen Kennzahlen aus dem Signaling-Zustand
pub fn kennzahlen_erfassen(state: &SignalingState) -> SignalingKennzahlen {
    let snapshot = state.snapshot();
    SignalingKennzahlen {
        online_benutzer: snapshot.online_benutzer as u64,
        offene_verbindungen: snapshot.offene_verbindungen as u64,
        raeume: snapshot.raeume as u64,
        signale_weitergeleitet: snapshot.signale_weitergeleitet,
        signale_verworfen: snapshot.signale_verworfen,
        raum_groessen: state
            .raum_uebersicht()
            .values()
            .map(|mitglieder| mitglieder.len())
            .collect(),
    }
}

/// Periodischer Task: uebertraegt Snapshots in Metriken und Health-Status
async fn metriken_aktualisieren(
    state: Arc<SignalingState>,
    metriken: TreffpunktMetrics,
    health: HealthState,
    intervall: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(intervall);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let kennzahlen = kennzahlen_erfassen(&state);
                metriken.aktualisieren(&kennzahlen);
                health.online_users_setzen(kennzahlen.online_benutzer);
                tracing::trace!(
                    online = kennzahlen.online_benutzer,
                    raeume = kennzahlen.raeume,
                    "Metriken aktualisiert"
                );
            }
            Ok(()) = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }
}
