//! Signal-Handler – webrtc-offer/answer/ice und notify_waiting
//!
//! Der Inhalt der Signaling-Nachrichten wird nicht interpretiert. Der Server
//! entfernt nur `to`/`room` und stempelt `from` mit dem registrierten
//! Absender. Ein vom Client gesetztes `from` wird dabei ueberschrieben.

use std::sync::Arc;
use treffpunkt_core::types::{RoomId, UserId};
use treffpunkt_protocol::control::{
    NotifyWaiting, NotifyWaitingRequest, ServerMessage, ServerPayload, SignalArt, SignalForward,
    SignalRequest,
};
use treffpunkt_protocol::wire::json_kodieren;

use crate::relay::{zustellung_bestimmen, Zustellung};
use crate::server_state::SignalingState;

/// Leitet eine Signaling-Nachricht weiter
///
/// Nicht zustellbare oder nicht in ein Frame passende Nachrichten werden
/// still verworfen.
pub fn handle_signal(
    art: SignalArt,
    request: SignalRequest,
    absender: &UserId,
    state: &Arc<SignalingState>,
) {
    let SignalRequest { to, room, body } = request;
    let to = to.as_deref().and_then(UserId::parse);
    let room = room.as_deref().and_then(RoomId::parse);

    let nachricht = ServerMessage::push(art.payload(SignalForward::gestempelt(absender.clone(), body)));

    // Durch `from` kann die Nachricht ueber das Frame-Limit wachsen
    if let Err(e) = json_kodieren(&nachricht, state.config.max_frame_groesse) {
        tracing::warn!(
            event = art.event_name(),
            from = %absender,
            fehler = %e,
            "Signal passt nicht in ein Frame, verworfen"
        );
        state.statistik.verworfen();
        return;
    }

    let kern = state.kern();
    let zustellung =
        zustellung_bestimmen(absender, to.as_ref(), room.as_ref(), &kern.registry, &kern.raeume);
    drop(kern);

    match zustellung {
        Zustellung::Direkt(connection_id) => {
            tracing::trace!(
                event = art.event_name(),
                from = %absender,
                connection_id = %connection_id,
                "Signal direkt weitergeleitet"
            );
            if state.broadcaster.an_verbindung_senden(&connection_id, nachricht) {
                state.statistik.weitergeleitet();
            } else {
                state.statistik.verworfen();
            }
        }
        Zustellung::Raum(ziele) => {
            tracing::trace!(
                event = art.event_name(),
                from = %absender,
                empfaenger = ziele.len(),
                "Signal an Raum weitergeleitet"
            );
            for connection_id in &ziele {
                if state
                    .broadcaster
                    .an_verbindung_senden(connection_id, nachricht.clone())
                {
                    state.statistik.weitergeleitet();
                } else {
                    state.statistik.verworfen();
                }
            }
        }
        Zustellung::Verworfen => {
            tracing::debug!(
                event = art.event_name(),
                from = %absender,
                to = ?to,
                room = ?room,
                "Signal ohne erreichbares Ziel verworfen"
            );
            state.statistik.verworfen();
        }
    }
}

/// Leitet `notify_waiting` an den Zielbenutzer weiter
pub fn handle_notify_waiting(
    request: NotifyWaitingRequest,
    absender: &UserId,
    state: &Arc<SignalingState>,
) {
    let Some(ziel) = request.to.as_deref().and_then(UserId::parse) else {
        tracing::debug!(from = %absender, "notify_waiting ohne Ziel");
        return;
    };

    let Some(connection_id) = state.aufloesen(&ziel) else {
        tracing::debug!(from = %absender, to = %ziel, "notify_waiting: Ziel nicht online");
        return;
    };

    state.broadcaster.an_verbindung_senden(
        &connection_id,
        ServerMessage::push(ServerPayload::NotifyWaiting(NotifyWaiting {
            from: absender.clone(),
        })),
    );
    tracing::debug!(from = %absender, to = %ziel, "notify_waiting zugestellt");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::{Ausgehend, ClientEmpfaenger};
    use crate::presence::KeineKontakte;
    use crate::server_state::SignalingConfig;
    use serde_json::{json, Map, Value};
    use treffpunkt_core::types::ConnectionId;

    fn u(name: &str) -> UserId {
        UserId::from(name)
    }

    fn test_state() -> Arc<SignalingState> {
        SignalingState::neu(SignalingConfig::default(), Arc::new(KeineKontakte))
    }

    fn online(state: &Arc<SignalingState>, name: &str) -> ClientEmpfaenger {
        let conn = ConnectionId::new();
        let rx = state.broadcaster.client_registrieren(conn, 16);
        state.kern().registry.installieren(conn, u(name));
        rx
    }

    fn naechstes(rx: &mut ClientEmpfaenger) -> Option<ServerPayload> {
        match rx.rx.try_recv() {
            Ok(Ausgehend::Nachricht(m)) => Some(m.payload),
            _ => None,
        }
    }

    fn body(wert: Value) -> Map<String, Value> {
        match wert {
            Value::Object(map) => map,
            _ => panic!("Objekt erwartet"),
        }
    }

    #[test]
    fn offer_an_direktes_ziel() {
        let state = test_state();
        let mut rx_a = online(&state, "alice");
        let mut rx_b = online(&state, "bob");

        handle_signal(
            SignalArt::Offer,
            SignalRequest {
                to: Some("bob".into()),
                room: None,
                body: body(json!({ "sdp": "x" })),
            },
            &u("alice"),
            &state,
        );

        assert_eq!(
            naechstes(&mut rx_b),
            Some(ServerPayload::WebrtcOffer(SignalForward {
                from: u("alice"),
                body: body(json!({ "sdp": "x" })),
            }))
        );
        assert!(naechstes(&mut rx_a).is_none());
        assert_eq!(state.snapshot().signale_weitergeleitet, 1);
    }

    #[test]
    fn ice_an_raum_ohne_absender() {
        let state = test_state();
        let mut rx_a = online(&state, "alice");
        let mut rx_b = online(&state, "bob");
        let mut rx_c = online(&state, "carol");
        let room = RoomId::from("r");
        {
            let mut kern = state.kern();
            for name in ["alice", "bob", "carol"] {
                kern.raeume.beitreten(&room, &u(name));
            }
        }

        handle_signal(
            SignalArt::Ice,
            SignalRequest {
                to: None,
                room: Some("r".into()),
                body: body(json!({ "candidate": { "sdpMid": "0" } })),
            },
            &u("alice"),
            &state,
        );

        assert!(matches!(naechstes(&mut rx_b), Some(ServerPayload::WebrtcIce(f)) if f.from == u("alice")));
        assert!(matches!(naechstes(&mut rx_c), Some(ServerPayload::WebrtcIce(_))));
        assert!(naechstes(&mut rx_a).is_none());
        assert_eq!(state.snapshot().signale_weitergeleitet, 2);
    }

    #[test]
    fn unzustellbares_signal_wird_gezaehlt() {
        let state = test_state();
        let _rx = online(&state, "alice");
        handle_signal(
            SignalArt::Answer,
            SignalRequest {
                to: Some("niemand".into()),
                room: None,
                body: Map::new(),
            },
            &u("alice"),
            &state,
        );
        let snap = state.snapshot();
        assert_eq!(snap.signale_weitergeleitet, 0);
        assert_eq!(snap.signale_verworfen, 1);
    }

    #[test]
    fn client_kann_from_nicht_faelschen() {
        let state = test_state();
        let _rx_a = online(&state, "alice");
        let mut rx_b = online(&state, "bob");

        handle_signal(
            SignalArt::Offer,
            SignalRequest {
                to: Some("bob".into()),
                room: None,
                body: body(json!({ "from": "mallory", "sdp": "x" })),
            },
            &u("alice"),
            &state,
        );

        assert_eq!(
            naechstes(&mut rx_b),
            Some(ServerPayload::WebrtcOffer(SignalForward {
                from: u("alice"),
                body: body(json!({ "sdp": "x" })),
            }))
        );
    }

    #[test]
    fn zu_grosses_signal_wird_verworfen() {
        let state = SignalingState::neu(
            SignalingConfig {
                max_frame_groesse: 256,
                ..SignalingConfig::default()
            },
            Arc::new(KeineKontakte),
        );
        let _rx_a = online(&state, "alice");
        let mut rx_b = online(&state, "bob");

        handle_signal(
            SignalArt::Offer,
            SignalRequest {
                to: Some("bob".into()),
                room: None,
                body: body(json!({ "sdp": "x".repeat(300) })),
            },
            &u("alice"),
            &state,
        );

        assert!(naechstes(&mut rx_b).is_none());
        assert!(state.aufloesen(&u("bob")).is_some());
        let snap = state.snapshot();
        assert_eq!(snap.signale_weitergeleitet, 0);
        assert_eq!(snap.signale_verworfen, 1);
    }

    #[test]
    fn notify_waiting_nur_an_ziel() {
        let state = test_state();
        let mut rx_a = online(&state, "alice");
        let mut rx_b = online(&state, "bob");

        handle_notify_waiting(
            NotifyWaitingRequest {
                to: Some("bob".into()),
            },
            &u("alice"),
            &state,
        );
        handle_notify_waiting(NotifyWaitingRequest { to: None }, &u("alice"), &state);

        assert_eq!(
            naechstes(&mut rx_b),
            Some(ServerPayload::NotifyWaiting(NotifyWaiting { from: u("alice") }))
        );
        assert!(naechstes(&mut rx_b).is_none());
        assert!(naechstes(&mut rx_a).is_none());
    }
}
