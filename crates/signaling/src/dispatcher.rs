//! Message-Dispatcher – Routet Client-Events an die richtigen Handler
//!
//! Der Dispatcher empfaengt dekodierte `ClientMessage`s einer
//! `ClientConnection`, bestimmt den Handler und gibt eine eventuelle direkte
//! Antwort zurueck.
//!
//! ## Zustandspruefung
//! - `register`, `room:list` und `ping` sind immer erlaubt
//! - Alle anderen Events erst nach erfolgreichem `register`; vorher gibt es
//!   `error { error: "not-registered" }` (nur wenn die Anfrage eine `ack`-ID
//!   traegt, sonst wird still verworfen)

use std::net::SocketAddr;
use std::sync::Arc;
use treffpunkt_core::types::{ConnectionId, UserId};
use treffpunkt_protocol::control::{
    grund, ClientMessage, ClientPayload, PongResponse, ServerMessage, ServerPayload, SignalArt,
};

use crate::error::SignalingError;
use crate::handlers::{room_handler, session_handler, signal_handler};
use crate::server_state::SignalingState;

/// Dispatcher-Kontext – Informationen ueber die aktuelle Verbindung
#[derive(Debug, Clone)]
pub struct DispatcherContext {
    /// Vom Transport vergebene Verbindungs-ID
    pub connection_id: ConnectionId,
    /// Peer-Adresse (nur fuer Logging)
    pub peer_addr: SocketAddr,
    /// Registrierter Benutzer (None vor `register`)
    pub user_id: Option<UserId>,
}

impl DispatcherContext {
    pub fn neu(connection_id: ConnectionId, peer_addr: SocketAddr) -> Self {
        Self {
            connection_id,
            peer_addr,
            user_id: None,
        }
    }
}

/// Zentraler Message-Dispatcher
pub struct MessageDispatcher {
    state: Arc<SignalingState>,
}

impl MessageDispatcher {
    /// Erstellt einen neuen Dispatcher
    pub fn neu(state: Arc<SignalingState>) -> Self {
        Self { state }
    }

    /// Verarbeitet eine eingehende Nachricht und gibt die direkte Antwort zurueck
    ///
    /// Gibt `None` zurueck wenn nichts direkt geantwortet wird (Relay-Events,
    /// `room:leave`, oder Antworten die bereits ueber die Send-Queue gingen).
    pub async fn dispatch(
        &self,
        message: ClientMessage,
        ctx: &mut DispatcherContext,
    ) -> Option<ServerMessage> {
        let ack = message.ack;

        match message.payload {
            // -------------------------------------------------------------------
            // Immer erlaubt
            // -------------------------------------------------------------------
            ClientPayload::Register(req) => {
                session_handler::handle_register(req, ack, ctx, &self.state).await
            }

            ClientPayload::RoomList => Some(room_handler::handle_room_list(ack, &self.state)),

            ClientPayload::Ping(ping) => {
                let server_ts = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_millis() as u64;
                Some(ServerMessage::antwort(
                    ack,
                    ServerPayload::Pong(PongResponse {
                        client_timestamp_ms: ping.timestamp_ms,
                        server_timestamp_ms: server_ts,
                    }),
                ))
            }

            // -------------------------------------------------------------------
            // Registrierung erforderlich
            // -------------------------------------------------------------------
            payload => {
                let Some(user_id) = ctx.user_id.clone() else {
                    tracing::debug!(
                        connection_id = %ctx.connection_id,
                        "Event vor register ignoriert"
                    );
                    return ack.map(|_| {
                        ServerMessage::error(ack, SignalingError::NichtRegistriert.client_grund())
                    });
                };
                self.dispatch_registriert(payload, ack, &user_id)
            }
        }
    }

    /// Routet Events die eine Registrierung erfordern
    fn dispatch_registriert(
        &self,
        payload: ClientPayload,
        ack: Option<u32>,
        user_id: &UserId,
    ) -> Option<ServerMessage> {
        match payload {
            // -------------------------------------------------------------------
            // Raeume
            // -------------------------------------------------------------------
            ClientPayload::GetOrCreateRoom(req) => Some(
                room_handler::handle_get_or_create_room(req, ack, user_id, &self.state),
            ),

            ClientPayload::RoomJoin(req) => {
                Some(room_handler::handle_room_join(req, ack, user_id, &self.state))
            }

            ClientPayload::RoomLeave(req) => {
                room_handler::handle_room_leave(req, ack, user_id, &self.state)
            }

            // -------------------------------------------------------------------
            // Signaling-Relay
            // -------------------------------------------------------------------
            ClientPayload::WebrtcOffer(req) => {
                signal_handler::handle_signal(SignalArt::Offer, req, user_id, &self.state);
                None
            }

            ClientPayload::WebrtcAnswer(req) => {
                signal_handler::handle_signal(SignalArt::Answer, req, user_id, &self.state);
                None
            }

            ClientPayload::WebrtcIce(req) => {
                signal_handler::handle_signal(SignalArt::Ice, req, user_id, &self.state);
                None
            }

            ClientPayload::NotifyWaiting(req) => {
                signal_handler::handle_notify_waiting(req, user_id, &self.state);
                None
            }

            // Bereits in dispatch() behandelt
            ClientPayload::Register(_) | ClientPayload::RoomList | ClientPayload::Ping(_) => {
                tracing::warn!(user_id = %user_id, "Unerwartetes Event im Registriert-Pfad");
                ack.map(|_| ServerMessage::error(ack, grund::INVALID_REQUEST))
            }
        }
    }

    /// Wird von der Verbindung genau einmal beim Schliessen aufgerufen
    pub fn verbindung_beendet(&self, ctx: &DispatcherContext) {
        session_handler::handle_disconnect(&ctx.connection_id, &self.state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presence::KeineKontakte;
    use crate::server_state::SignalingConfig;
    use treffpunkt_protocol::control::{PingRequest, RoomRequest, SignalRequest};

    fn dispatcher() -> (MessageDispatcher, DispatcherContext) {
        let state = SignalingState::neu(SignalingConfig::default(), Arc::new(KeineKontakte));
        let ctx = DispatcherContext::neu(ConnectionId::new(), "127.0.0.1:1".parse().unwrap());
        (MessageDispatcher::neu(state), ctx)
    }

    #[tokio::test]
    async fn ping_ohne_registrierung() {
        let (d, mut ctx) = dispatcher();
        let antwort = d
            .dispatch(
                ClientMessage::new(Some(4), ClientPayload::Ping(PingRequest { timestamp_ms: 77 })),
                &mut ctx,
            )
            .await
            .expect("Pong erwartet");
        assert_eq!(antwort.ack, Some(4));
        let ServerPayload::Pong(pong) = antwort.payload else {
            panic!("Pong erwartet");
        };
        assert_eq!(pong.client_timestamp_ms, 77);
        assert!(pong.server_timestamp_ms > 0);
    }

    #[tokio::test]
    async fn nicht_registriert_mit_ack() {
        let (d, mut ctx) = dispatcher();
        let antwort = d
            .dispatch(
                ClientMessage::new(
                    Some(2),
                    ClientPayload::RoomJoin(RoomRequest {
                        room_id: Some("r".into()),
                    }),
                ),
                &mut ctx,
            )
            .await;
        assert_eq!(antwort, Some(ServerMessage::error(Some(2), grund::NOT_REGISTERED)));
        assert_eq!(d.state.snapshot().raeume, 0);
    }

    #[tokio::test]
    async fn nicht_registriert_ohne_ack_wird_ignoriert() {
        let (d, mut ctx) = dispatcher();
        let antwort = d
            .dispatch(
                ClientMessage::new(None, ClientPayload::WebrtcOffer(SignalRequest::default())),
                &mut ctx,
            )
            .await;
        assert!(antwort.is_none());
        assert_eq!(d.state.snapshot().signale_verworfen, 0);
    }

    #[tokio::test]
    async fn room_list_ohne_registrierung() {
        let (d, mut ctx) = dispatcher();
        let antwort = d
            .dispatch(ClientMessage::new(Some(1), ClientPayload::RoomList), &mut ctx)
            .await
            .expect("Antwort erwartet");
        assert!(matches!(antwort.payload, ServerPayload::RoomList(ref l) if l.ok && l.rooms.is_empty()));
    }
}
