//! Room-Handler – get_or_create_room, room:join, room:leave, room:list
//!
//! Alle Raumoperationen laufen unter einem Lock auf den Kern. Broadcasts an
//! andere Mitglieder werden noch unter diesem Lock eingereiht, damit die
//! Reihenfolge der Events der Reihenfolge der Zustandsaenderungen entspricht.

use std::sync::Arc;
use treffpunkt_core::types::{RoomId, UserId};
use treffpunkt_protocol::control::{
    grund, GetOrCreateRoomRequest, RoomAssigned, RoomListResponse, RoomMemberEvent, RoomPeers,
    RoomRequest, ServerMessage, ServerPayload,
};

use crate::error::SignalingError;
use crate::server_state::SignalingState;

fn fehlende_room_id(ack: Option<u32>) -> ServerMessage {
    ServerMessage::error(ack, SignalingError::FehlenderParameter("roomId").client_grund())
}

/// Verarbeitet `get_or_create_room`
pub fn handle_get_or_create_room(
    request: GetOrCreateRoomRequest,
    ack: Option<u32>,
    user_id: &UserId,
    state: &Arc<SignalingState>,
) -> ServerMessage {
    let Some(anderer) = request.with_user.as_deref().and_then(UserId::parse) else {
        tracing::debug!(user_id = %user_id, "get_or_create_room ohne withUser");
        return ServerMessage::error(ack, grund::GET_OR_CREATE_MISSING_PARAMS);
    };

    let (room_id, reused) = state.kern().raeume.holen_oder_erstellen(user_id, &anderer);

    tracing::info!(
        user_id = %user_id,
        with_user = %anderer,
        room_id = %room_id,
        reused,
        "Paar-Raum zugewiesen"
    );

    ServerMessage::antwort(ack, ServerPayload::RoomAssigned(RoomAssigned { room_id, reused }))
}

/// Verarbeitet `room:join`
///
/// Idempotent. Nur ein erstmaliger Beitritt wird den anderen Mitgliedern
/// als `room:user-joined` gemeldet.
pub fn handle_room_join(
    request: RoomRequest,
    ack: Option<u32>,
    user_id: &UserId,
    state: &Arc<SignalingState>,
) -> ServerMessage {
    let Some(room_id) = request.room_id.as_deref().and_then(RoomId::parse) else {
        return fehlende_room_id(ack);
    };

    let mut kern = state.kern();
    let beitritt = kern.raeume.beitreten(&room_id, user_id);

    if beitritt.neu {
        let event = ServerMessage::push(ServerPayload::RoomUserJoined(RoomMemberEvent {
            room_id: room_id.clone(),
            user_id: user_id.clone(),
        }));
        state
            .broadcaster
            .an_benutzer_senden(&kern.registry, &beitritt.peers, &event);

        tracing::info!(
            user_id = %user_id,
            room_id = %room_id,
            mitglieder = beitritt.mitglieder_anzahl,
            "Raum beigetreten"
        );
    } else {
        tracing::debug!(user_id = %user_id, room_id = %room_id, "Erneuter Beitritt");
    }
    drop(kern);

    if beitritt.mitglieder_anzahl > state.config.mesh_soft_cap {
        tracing::warn!(
            room_id = %room_id,
            mitglieder = beitritt.mitglieder_anzahl,
            soft_cap = state.config.mesh_soft_cap,
            "Mesh-Raum ueber der empfohlenen Groesse"
        );
    }

    ServerMessage::antwort(
        ack,
        ServerPayload::RoomPeers(RoomPeers {
            room_id,
            peers: beitritt.peers,
            initiator: beitritt.initiator,
        }),
    )
}

/// Verarbeitet `room:leave`
///
/// Unbekannte Raeume und Nicht-Mitglieder sind ein No-op.
pub fn handle_room_leave(
    request: RoomRequest,
    ack: Option<u32>,
    user_id: &UserId,
    state: &Arc<SignalingState>,
) -> Option<ServerMessage> {
    let Some(room_id) = request.room_id.as_deref().and_then(RoomId::parse) else {
        return Some(fehlende_room_id(ack));
    };

    let mut kern = state.kern();
    let austritt = kern.raeume.verlassen(&room_id, user_id)?;

    if austritt.war_mitglied {
        let event = ServerMessage::push(ServerPayload::RoomUserLeft(RoomMemberEvent {
            room_id: room_id.clone(),
            user_id: user_id.clone(),
        }));
        state
            .broadcaster
            .an_benutzer_senden(&kern.registry, &austritt.verbleibend, &event);

        tracing::info!(
            user_id = %user_id,
            room_id = %room_id,
            aufgeloest = austritt.aufgeloest,
            "Raum verlassen"
        );
    }
    None
}

/// Verarbeitet `room:list`
pub fn handle_room_list(ack: Option<u32>, state: &Arc<SignalingState>) -> ServerMessage {
    let rooms = state.raum_uebersicht();
    tracing::trace!(raeume = rooms.len(), "Raumliste angefordert");
    ServerMessage::antwort(
        ack,
        ServerPayload::RoomList(RoomListResponse { ok: true, rooms }),
    )
}
