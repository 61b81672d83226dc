//! Signaling-Relay – Zielbestimmung fuer Offer/Answer/ICE
//!
//! Vorrang: ein aufloesbares `to` gewinnt, sonst alle anderen Mitglieder
//! von `room`, sonst wird verworfen.

use treffpunkt_core::types::{ConnectionId, RoomId, UserId};

use crate::registry::ConnectionRegistry;
use crate::rooms::RoomStore;

/// Wohin eine Signaling-Nachricht geht
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Zustellung {
    /// Genau eine Verbindung (das `to`-Ziel)
    Direkt(ConnectionId),
    /// Alle anderen online Mitglieder eines Raums
    Raum(Vec<ConnectionId>),
    /// Kein erreichbares Ziel
    Verworfen,
}

/// Bestimmt die Empfaenger einer Signaling-Nachricht von `absender`
pub fn zustellung_bestimmen(
    absender: &UserId,
    to: Option<&UserId>,
    room: Option<&RoomId>,
    registry: &ConnectionRegistry,
    raeume: &RoomStore,
) -> Zustellung {
    if let Some(connection_id) = to.and_then(|ziel| registry.aufloesen(ziel)) {
        return Zustellung::Direkt(connection_id);
    }

    let Some(room) = room.and_then(|r| raeume.raum(r)) else {
        return Zustellung::Verworfen;
    };
    let ziele: Vec<ConnectionId> = room
        .andere_mitglieder(absender)
        .iter()
        .filter_map(|u| registry.aufloesen(u))
        .collect();

    if ziele.is_empty() {
        Zustellung::Verworfen
    } else {
        Zustellung::Raum(ziele)
    }
}
