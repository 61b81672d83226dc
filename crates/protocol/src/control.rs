//! Control-Protokoll (Events)
//!
//! Definiert alle Events die ueber die TCP-Verbindung zwischen Client und
//! Server ausgetauscht werden.
//!
//! ## Design
//! - Envelope: `{ "ack": 7, "event": "room:join", "data": { ... } }`
//! - `ack` ist optional; Antworten auf eine Anfrage tragen dieselbe `ack`-ID
//! - Adjacently tagged Enums fuer typsichere Event-Namen
//! - Feldnamen in `data` sind camelCase
//! - Signaling-Payloads (`webrtc-*`) sind opak und werden als JSON-Objekt
//!   durchgereicht

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use treffpunkt_core::types::{RoomId, UserId};

// ---------------------------------------------------------------------------
// Event-Namen
// ---------------------------------------------------------------------------

/// Event-Namen (Client -> Server und Server -> Client)
pub mod event {
    pub const REGISTER: &str = "register";
    pub const REGISTERED: &str = "registered";
    pub const USERS_LIST: &str = "users_list";
    pub const USER_ONLINE: &str = "user_online";
    pub const USER_OFFLINE: &str = "user_offline";
    pub const SESSION_TERMINATED: &str = "session_terminated";

    pub const GET_OR_CREATE_ROOM: &str = "get_or_create_room";
    pub const ROOM_ASSIGNED: &str = "room:assigned";
    pub const ROOM_JOIN: &str = "room:join";
    pub const ROOM_PEERS: &str = "room:peers";
    pub const ROOM_LEAVE: &str = "room:leave";
    pub const ROOM_USER_JOINED: &str = "room:user-joined";
    pub const ROOM_USER_LEFT: &str = "room:user-left";
    pub const ROOM_LIST: &str = "room:list";

    pub const WEBRTC_OFFER: &str = "webrtc-offer";
    pub const WEBRTC_ANSWER: &str = "webrtc-answer";
    pub const WEBRTC_ICE: &str = "webrtc-ice";
    pub const NOTIFY_WAITING: &str = "notify_waiting";

    pub const PING: &str = "ping";
    pub const PONG: &str = "pong";
    pub const ERROR: &str = "error";
}

/// Fehlergruende die in `registered.err` bzw. `error.error` zurueckgegeben werden
pub mod grund {
    pub const MISSING_USER_ID: &str = "missing-userId";
    pub const GET_OR_CREATE_MISSING_PARAMS: &str = "get_or_create_room missing params";
    pub const MISSING_ROOM_ID: &str = "missing-roomId";
    pub const NOT_REGISTERED: &str = "not-registered";
    pub const INVALID_REQUEST: &str = "invalid-request";
    pub const NEW_SESSION: &str = "new-session";
}

// ---------------------------------------------------------------------------
// Client -> Server
// ---------------------------------------------------------------------------

/// Registrierung einer Verbindung fuer einen Benutzer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Kanonischen 1:1-Raum mit einem anderen Benutzer holen oder anlegen
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetOrCreateRoomRequest {
    #[serde(default)]
    pub with_user: Option<String>,
}

/// Raum betreten oder verlassen
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomRequest {
    #[serde(default)]
    pub room_id: Option<String>,
}

/// Signaling-Nachricht (Offer/Answer/ICE) vom Client
///
/// `to` und `room` werden vom Server ausgewertet, alle weiteren Felder
/// landen unveraendert in `body`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignalRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

/// "Ich warte auf dich" – Klingel-Event an einen bestimmten Benutzer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifyWaitingRequest {
    #[serde(default)]
    pub to: Option<String>,
}

/// Keepalive-Ping vom Client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingRequest {
    #[serde(default)]
    pub timestamp_ms: u64,
}

/// Alle Events die ein Client senden darf
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientPayload {
    #[serde(rename = "register")]
    Register(RegisterRequest),
    #[serde(rename = "get_or_create_room")]
    GetOrCreateRoom(GetOrCreateRoomRequest),
    #[serde(rename = "room:join")]
    RoomJoin(RoomRequest),
    #[serde(rename = "room:leave")]
    RoomLeave(RoomRequest),
    #[serde(rename = "room:list")]
    RoomList,
    #[serde(rename = "webrtc-offer")]
    WebrtcOffer(SignalRequest),
    #[serde(rename = "webrtc-answer")]
    WebrtcAnswer(SignalRequest),
    #[serde(rename = "webrtc-ice")]
    WebrtcIce(SignalRequest),
    #[serde(rename = "notify_waiting")]
    NotifyWaiting(NotifyWaitingRequest),
    #[serde(rename = "ping")]
    Ping(PingRequest),
}

/// Envelope einer Client-Nachricht
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientMessage {
    /// Optionale Anfrage-ID; die Antwort traegt dieselbe ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack: Option<u32>,
    #[serde(flatten)]
    pub payload: ClientPayload,
}

impl ClientMessage {
    pub fn new(ack: Option<u32>, payload: ClientPayload) -> Self {
        Self { ack, payload }
    }
}

/// Nur die `ack`-ID einer Nachricht – fuer Fehlerantworten auf Frames die
/// sich nicht als `ClientMessage` dekodieren lassen
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AckHeader {
    #[serde(default)]
    pub ack: Option<u32>,
}

// ---------------------------------------------------------------------------
// Server -> Client
// ---------------------------------------------------------------------------

/// Ergebnis einer Registrierung
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisteredResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
}

/// Online-Kontakte des frisch registrierten Benutzers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsersList {
    pub users: Vec<UserId>,
}

/// Online/Offline-Event eines Benutzers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPresence {
    pub user_id: UserId,
}

/// Die Session wurde durch eine neuere Verbindung ersetzt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionTerminated {
    pub reason: String,
}

/// Antwort auf `get_or_create_room`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomAssigned {
    pub room_id: RoomId,
    pub reused: bool,
}

/// Antwort auf `room:join`
///
/// Raum-Mitgliedschaften haengen am Benutzer, nicht an der Verbindung.
/// Schliesst eine bereits verdraengte, aeltere Verbindung desselben Benutzers
/// erst nach dem Beitritt, entfernt ihr Disconnect den Benutzer trotzdem aus
/// allen Raeumen (die anderen Mitglieder bekommen `room:user-left`). Clients
/// treten nach einem Reconnect daher mit `room:join` erneut bei.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomPeers {
    pub room_id: RoomId,
    /// Andere Mitglieder (ohne den Beitretenden)
    pub peers: Vec<UserId>,
    /// Ersteller des Raums (nur bei kanonischen Paar-Raeumen)
    pub initiator: Option<UserId>,
}

/// Beitritt/Austritt eines Mitglieds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMemberEvent {
    pub room_id: RoomId,
    pub user_id: UserId,
}

/// Antwort auf `room:list`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomListResponse {
    pub ok: bool,
    pub rooms: BTreeMap<RoomId, Vec<UserId>>,
}

/// Weitergeleitete Signaling-Nachricht mit gestempeltem Absender
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalForward {
    pub from: UserId,
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

impl SignalForward {
    /// Stempelt den registrierten Absender
    ///
    /// Ein vom Client mitgeschicktes `from` im Body wird verworfen, sonst
    /// stuende der Schluessel nach dem Serialisieren doppelt im Objekt.
    pub fn gestempelt(from: UserId, mut body: Map<String, Value>) -> Self {
        body.remove("from");
        Self { from, body }
    }
}

/// Weitergeleitetes Klingel-Event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyWaiting {
    pub from: UserId,
}

/// Keepalive-Antwort
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PongResponse {
    pub client_timestamp_ms: u64,
    pub server_timestamp_ms: u64,
}

/// Strukturierte Fehlerantwort
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Alle Events die der Server sendet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerPayload {
    #[serde(rename = "registered")]
    Registered(RegisteredResponse),
    #[serde(rename = "users_list")]
    UsersList(UsersList),
    #[serde(rename = "user_online")]
    UserOnline(UserPresence),
    #[serde(rename = "user_offline")]
    UserOffline(UserPresence),
    #[serde(rename = "session_terminated")]
    SessionTerminated(SessionTerminated),
    #[serde(rename = "room:assigned")]
    RoomAssigned(RoomAssigned),
    #[serde(rename = "room:peers")]
    RoomPeers(RoomPeers),
    #[serde(rename = "room:user-joined")]
    RoomUserJoined(RoomMemberEvent),
    #[serde(rename = "room:user-left")]
    RoomUserLeft(RoomMemberEvent),
    #[serde(rename = "room:list")]
    RoomList(RoomListResponse),
    #[serde(rename = "webrtc-offer")]
    WebrtcOffer(SignalForward),
    #[serde(rename = "webrtc-answer")]
    WebrtcAnswer(SignalForward),
    #[serde(rename = "webrtc-ice")]
    WebrtcIce(SignalForward),
    #[serde(rename = "notify_waiting")]
    NotifyWaiting(NotifyWaiting),
    #[serde(rename = "pong")]
    Pong(PongResponse),
    #[serde(rename = "error")]
    Error(ErrorResponse),
}

impl ServerPayload {
    /// Gibt den Event-Namen zurueck (fuer Logging)
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Registered(_) => event::REGISTERED,
            Self::UsersList(_) => event::USERS_LIST,
            Self::UserOnline(_) => event::USER_ONLINE,
            Self::UserOffline(_) => event::USER_OFFLINE,
            Self::SessionTerminated(_) => event::SESSION_TERMINATED,
            Self::RoomAssigned(_) => event::ROOM_ASSIGNED,
            Self::RoomPeers(_) => event::ROOM_PEERS,
            Self::RoomUserJoined(_) => event::ROOM_USER_JOINED,
            Self::RoomUserLeft(_) => event::ROOM_USER_LEFT,
            Self::RoomList(_) => event::ROOM_LIST,
            Self::WebrtcOffer(_) => event::WEBRTC_OFFER,
            Self::WebrtcAnswer(_) => event::WEBRTC_ANSWER,
            Self::WebrtcIce(_) => event::WEBRTC_ICE,
            Self::NotifyWaiting(_) => event::NOTIFY_WAITING,
            Self::Pong(_) => event::PONG,
            Self::Error(_) => event::ERROR,
        }
    }
}

/// Art einer Signaling-Nachricht
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalArt {
    Offer,
    Answer,
    Ice,
}

impl SignalArt {
    /// Verpackt eine weitergeleitete Nachricht in das gleichnamige Event
    pub fn payload(self, forward: SignalForward) -> ServerPayload {
        match self {
            Self::Offer => ServerPayload::WebrtcOffer(forward),
            Self::Answer => ServerPayload::WebrtcAnswer(forward),
            Self::Ice => ServerPayload::WebrtcIce(forward),
        }
    }

    pub fn event_name(self) -> &'static str {
        match self {
            Self::Offer => event::WEBRTC_OFFER,
            Self::Answer => event::WEBRTC_ANSWER,
            Self::Ice => event::WEBRTC_ICE,
        }
    }
}

/// Envelope einer Server-Nachricht
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack: Option<u32>,
    #[serde(flatten)]
    pub payload: ServerPayload,
}

impl ServerMessage {
    /// Unaufgeforderte Server-Nachricht (Push, kein `ack`)
    pub fn push(payload: ServerPayload) -> Self {
        Self { ack: None, payload }
    }

    /// Antwort auf eine Client-Anfrage
    pub fn antwort(ack: Option<u32>, payload: ServerPayload) -> Self {
        Self { ack, payload }
    }

    /// Strukturierte Fehlerantwort
    pub fn error(ack: Option<u32>, error: impl Into<String>) -> Self {
        Self {
            ack,
            payload: ServerPayload::Error(ErrorResponse {
                error: error.into(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
