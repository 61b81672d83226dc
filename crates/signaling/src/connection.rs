//! Client-Connection – Verwaltet eine einzelne TCP-Verbindung
//!
//! Jede TCP-Verbindung bekommt eine `ClientConnection` in einem eigenen
//! tokio-Task. Der Task liest Frames, dispatcht sie nacheinander und
//! schreibt sowohl direkte Antworten als auch Nachrichten aus der
//! Send-Queue des Broadcasters.
//!
//! ## Verbindungsende
//! - Client schliesst die Verbindung, Lesefehler oder zu grosses Frame
//! - Keine Daten innerhalb von `verbindungs_timeout_sek` (0 = aus)
//! - `Trennen` aus der Send-Queue (verdraengte Session)
//! - Server-Shutdown
//!
//! In jedem Fall laeuft danach genau einmal die Disconnect-Kaskade.

use futures_util::{SinkExt, StreamExt};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::Instant;
use tokio_util::codec::Framed;
use treffpunkt_core::types::ConnectionId;
use treffpunkt_protocol::control::{AckHeader, ClientMessage, ServerMessage};
use treffpunkt_protocol::wire::{json_dekodieren, FrameCodec};

use crate::broadcast::Ausgehend;
use crate::dispatcher::{DispatcherContext, MessageDispatcher};
use crate::error::SignalingError;
use crate::server_state::SignalingState;

/// Grund fuer das Ende einer Verbindung (fuer Logging)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrennGrund {
    /// Client hat die Verbindung geschlossen
    ClientGetrennt,
    /// Lese- oder Schreibfehler, zu grosses Frame
    Fehler,
    /// Keine Daten innerhalb des Timeouts
    Timeout,
    /// Verdraengt durch eine neuere Session
    Verdraengt,
    /// Server wird heruntergefahren
    Shutdown,
}

/// Verarbeitet eine einzelne TCP-Verbindung
pub struct ClientConnection {
    state: Arc<SignalingState>,
    peer_addr: SocketAddr,
    connection_id: ConnectionId,
}

impl ClientConnection {
    /// Erstellt eine neue ClientConnection mit frischer ConnectionId
    pub fn neu(state: Arc<SignalingState>, peer_addr: SocketAddr) -> Self {
        Self {
            state,
            peer_addr,
            connection_id: ConnectionId::new(),
        }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Startet die Verbindungs-Verarbeitungsschleife
    ///
    /// Laeuft bis die Verbindung endet oder ein Shutdown-Signal eingeht.
    pub async fn verarbeiten<S>(
        self,
        stream: S,
        mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
    ) -> TrennGrund
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let peer_addr = self.peer_addr;
        let connection_id = self.connection_id;
        let config = Arc::clone(&self.state.config);
        let timeout_dauer = Duration::from_secs(config.verbindungs_timeout_sek);
        let timeout_aktiv = config.verbindungs_timeout_sek > 0;

        tracing::info!(peer = %peer_addr, connection_id = %connection_id, "Neue Verbindung");

        let mut framed = Framed::new(stream, FrameCodec::with_max_size(config.max_frame_groesse));
        let mut empfaenger = self
            .state
            .broadcaster
            .client_registrieren(connection_id, config.send_queue_groesse);

        let mut ctx = DispatcherContext::neu(connection_id, peer_addr);
        let dispatcher = MessageDispatcher::neu(Arc::clone(&self.state));

        // Zeitpunkt des letzten empfangenen Frames
        let mut letzter_empfang = Instant::now();

        let trenn_grund = loop {
            tokio::select! {
                // Eingehendes Frame vom Client
                frame = framed.next() => {
                    match frame {
                        Some(Ok(frame)) => {
                            letzter_empfang = Instant::now();
                            let antwort = match json_dekodieren::<ClientMessage>(&frame) {
                                Ok(nachricht) => {
                                    tracing::trace!(
                                        connection_id = %connection_id,
                                        ack = ?nachricht.ack,
                                        "Nachricht empfangen"
                                    );
                                    dispatcher.dispatch(nachricht, &mut ctx).await
                                }
                                Err(e) => {
                                    let fehler = SignalingError::protokoll(e.to_string());
                                    let ack = json_dekodieren::<AckHeader>(&frame)
                                        .ok()
                                        .and_then(|h| h.ack);
                                    tracing::warn!(
                                        connection_id = %connection_id,
                                        fehler = %fehler,
                                        "Ungueltige Nachricht ignoriert"
                                    );
                                    ack.map(|_| ServerMessage::error(ack, fehler.client_grund()))
                                }
                            };

                            if let Some(antwort) = antwort {
                                match framed.send(antwort).await {
                                    Ok(()) => {}
                                    Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                                        tracing::warn!(
                                            connection_id = %connection_id,
                                            fehler = %e,
                                            "Antwort nicht kodierbar, verworfen"
                                        );
                                    }
                                    Err(e) => {
                                        tracing::warn!(
                                            connection_id = %connection_id,
                                            fehler = %e,
                                            "Senden fehlgeschlagen"
                                        );
                                        break TrennGrund::Fehler;
                                    }
                                }
                            }
                        }
                        Some(Err(e)) => {
                            tracing::warn!(
                                connection_id = %connection_id,
                                fehler = %e,
                                "Frame-Lesefehler"
                            );
                            break TrennGrund::Fehler;
                        }
                        None => {
                            tracing::info!(connection_id = %connection_id, "Verbindung vom Client getrennt");
                            break TrennGrund::ClientGetrennt;
                        }
                    }
                }

                // Ausgehende Nachricht aus dem Broadcaster
                ausgehend = empfaenger.rx.recv() => {
                    match ausgehend {
                        Some(Ausgehend::Nachricht(nachricht)) => {
                            match framed.send(nachricht).await {
                                Ok(()) => {}
                                // Zu gross oder nicht serialisierbar: nur diese Nachricht faellt weg
                                Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                                    tracing::warn!(
                                        connection_id = %connection_id,
                                        fehler = %e,
                                        "Ausgehende Nachricht nicht kodierbar, verworfen"
                                    );
                                }
                                Err(e) => {
                                    tracing::warn!(
                                        connection_id = %connection_id,
                                        fehler = %e,
                                        "Broadcast-Senden fehlgeschlagen"
                                    );
                                    break TrennGrund::Fehler;
                                }
                            }
                        }
                        Some(Ausgehend::Trennen) => {
                            tracing::info!(connection_id = %connection_id, "Verbindung durch neue Session ersetzt");
                            break TrennGrund::Verdraengt;
                        }
                        None => break TrennGrund::Fehler,
                    }
                }

                // Trennen bei voller Send-Queue
                _ = empfaenger.abbruch.notified() => {
                    tracing::info!(connection_id = %connection_id, "Verbindung zwangsweise getrennt");
                    break TrennGrund::Verdraengt;
                }

                // Idle-Timeout
                _ = tokio::time::sleep_until(letzter_empfang + timeout_dauer), if timeout_aktiv => {
                    tracing::warn!(connection_id = %connection_id, peer = %peer_addr, "Verbindungs-Timeout");
                    break TrennGrund::Timeout;
                }

                // Shutdown-Signal
                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!(connection_id = %connection_id, "Shutdown-Signal – Verbindung wird getrennt");
                        break TrennGrund::Shutdown;
                    }
                }
            }
        };

        // Disconnect-Kaskade, danach Send-Queue abbauen
        dispatcher.verbindung_beendet(&ctx);
        self.state.broadcaster.client_entfernen(&connection_id);

        tracing::info!(
            connection_id = %connection_id,
            user_id = ?ctx.user_id,
            grund = ?trenn_grund,
            "Verbindungs-Task beendet"
        );
        trenn_grund
    }
}
