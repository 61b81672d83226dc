//! Session-Handler – Registrierung, Single-Session und Disconnect-Kaskade
//!
//! `register` installiert die Verbindung als aktive Verbindung des Benutzers,
//! verdraengt eine vorherige Session und verteilt danach die Presence an die
//! online Kontakte. `handle_disconnect` ist der einzige Ort, an dem eine
//! schliessende Verbindung Zustand veraendert.

use std::sync::Arc;
use treffpunkt_core::types::{ConnectionId, UserId};
use treffpunkt_protocol::control::{
    grund, RegisterRequest, RegisteredResponse, RoomMemberEvent, ServerMessage, ServerPayload,
    SessionTerminated, UserPresence, UsersList,
};

use crate::broadcast::EventBroadcaster;
use crate::dispatcher::DispatcherContext;
use crate::presence::{kontakte_oder_leer, online_kontakte};
use crate::server_state::{Kern, SignalingState};

/// Verarbeitet `register`
///
/// Die Bestaetigung `registered` wird ueber die Send-Queue verschickt, damit
/// sie vor `users_list` beim Client ankommt. Nur die Fehlerantwort wird
/// direkt zurueckgegeben.
pub async fn handle_register(
    request: RegisterRequest,
    ack: Option<u32>,
    ctx: &mut DispatcherContext,
    state: &Arc<SignalingState>,
) -> Option<ServerMessage> {
    let Some(user_id) = request.user_id.as_deref().and_then(UserId::parse) else {
        tracing::warn!(
            connection_id = %ctx.connection_id,
            peer = %ctx.peer_addr,
            "Registrierung ohne userId abgelehnt"
        );
        return Some(ServerMessage::antwort(
            ack,
            ServerPayload::Registered(RegisteredResponse {
                ok: false,
                err: Some(grund::MISSING_USER_ID.to_string()),
            }),
        ));
    };
    let connection_id = ctx.connection_id;

    {
        let mut kern = state.kern();

        // Identitaetswechsel: alte Identitaet wie bei einem Disconnect freigeben
        let bisher = kern.registry.besitzer(&connection_id).cloned();
        if let Some(bisher) = bisher.filter(|b| *b != user_id) {
            tracing::info!(
                connection_id = %connection_id,
                alt = %bisher,
                neu = %user_id,
                "Verbindung wechselt die Identitaet"
            );
            verbindung_abmelden(&mut kern, &state.broadcaster, &connection_id);
        }

        if let Some(alt) = kern.registry.installieren(connection_id, user_id.clone()) {
            tracing::info!(
                user_id = %user_id,
                alte_verbindung = %alt,
                neue_verbindung = %connection_id,
                "Neue Session verdraengt bestehende Verbindung"
            );
            state.broadcaster.an_verbindung_senden(
                &alt,
                ServerMessage::push(ServerPayload::SessionTerminated(SessionTerminated {
                    reason: grund::NEW_SESSION.to_string(),
                })),
            );
            state.broadcaster.verbindung_trennen(&alt);
        }

        state.broadcaster.an_verbindung_senden(
            &connection_id,
            ServerMessage::antwort(
                ack,
                ServerPayload::Registered(RegisteredResponse { ok: true, err: None }),
            ),
        );
    }
    ctx.user_id = Some(user_id.clone());

    tracing::info!(
        user_id = %user_id,
        connection_id = %connection_id,
        peer = %ctx.peer_addr,
        "Benutzer registriert"
    );

    // Kontakt-Lookup ohne Lock
    let kontakte = kontakte_oder_leer(state.kontakte.as_ref(), &user_id).await;

    let mut kern = state.kern();
    if kern.registry.aufloesen(&user_id) != Some(connection_id) {
        tracing::debug!(
            user_id = %user_id,
            connection_id = %connection_id,
            "Registrierung waehrend Kontakt-Lookup ueberholt – Presence entfaellt"
        );
        return None;
    }

    let online = online_kontakte(&kontakte, &kern.registry, &user_id);
    kern.kontakt_snapshots.insert(user_id.clone(), kontakte);

    let online_event = ServerMessage::push(ServerPayload::UserOnline(UserPresence {
        user_id: user_id.clone(),
    }));
    for (_, kontakt_verbindung) in &online {
        state
            .broadcaster
            .an_verbindung_senden(kontakt_verbindung, online_event.clone());
    }

    tracing::debug!(
        user_id = %user_id,
        online_kontakte = online.len(),
        "Presence verteilt"
    );

    state.broadcaster.an_verbindung_senden(
        &connection_id,
        ServerMessage::push(ServerPayload::UsersList(UsersList {
            users: online.into_iter().map(|(u, _)| u).collect(),
        })),
    );
    None
}

/// Disconnect-Kaskade fuer eine geschlossene Verbindung
///
/// Idempotent: eine unbekannte oder bereits abgemeldete Verbindung ist ein No-op.
pub fn handle_disconnect(connection_id: &ConnectionId, state: &SignalingState) {
    let mut kern = state.kern();
    verbindung_abmelden(&mut kern, &state.broadcaster, connection_id);
}

/// Gibt eine Verbindung frei: Registry, Presence (falls autoritativ), Raeume
pub(crate) fn verbindung_abmelden(
    kern: &mut Kern,
    broadcaster: &EventBroadcaster,
    connection_id: &ConnectionId,
) {
    let Some(abmeldung) = kern.registry.abmelden(connection_id) else {
        return;
    };
    let user_id = abmeldung.user_id;

    if abmeldung.autoritativ {
        let kontakte = kern.kontakt_snapshots.remove(&user_id).unwrap_or_default();
        let online = online_kontakte(&kontakte, &kern.registry, &user_id);
        let offline_event = ServerMessage::push(ServerPayload::UserOffline(UserPresence {
            user_id: user_id.clone(),
        }));
        for (_, kontakt_verbindung) in &online {
            broadcaster.an_verbindung_senden(kontakt_verbindung, offline_event.clone());
        }
        tracing::info!(
            user_id = %user_id,
            connection_id = %connection_id,
            benachrichtigt = online.len(),
            "Benutzer offline"
        );
    } else {
        tracing::debug!(
            user_id = %user_id,
            connection_id = %connection_id,
            "Verdraengte Verbindung abgemeldet"
        );
    }

    for (room_id, austritt) in kern.raeume.alle_verlassen(&user_id) {
        if austritt.verbleibend.is_empty() {
            continue;
        }
        let event = ServerMessage::push(ServerPayload::RoomUserLeft(RoomMemberEvent {
            room_id: room_id.clone(),
            user_id: user_id.clone(),
        }));
        broadcaster.an_benutzer_senden(&kern.registry, &austritt.verbleibend, &event);
        tracing::debug!(user_id = %user_id, room_id = %room_id, "Raum bei Disconnect verlassen");
    }
}
