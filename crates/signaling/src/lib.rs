//! treffpunkt-signaling – Presence, Raeume und Signaling-Relay
//!
//! Dieser Crate implementiert den Echtzeit-Kern von Treffpunkt: wer ist
//! ueber welche Verbindung erreichbar, welche Benutzer teilen sich einen
//! Raum, und wohin werden Offer/Answer/ICE-Nachrichten weitergeleitet.
//! Der Inhalt der Signaling-Nachrichten wird dabei nie interpretiert.
//!
//! ## Architektur
//!
//! ```text
//! TCP Listener (SignalingServer)
//!     |
//!     v
//! ClientConnection (pro Verbindung ein Task)
//!     |
//!     v
//! MessageDispatcher
//!     |
//!     +-- SessionHandler (register, Single-Session, Disconnect-Kaskade)
//!     +-- RoomHandler    (get_or_create_room, room:join/leave/list)
//!     +-- SignalHandler  (webrtc-offer/answer/ice, notify_waiting)
//!
//! SignalingState
//!     +-- Kern (ein Mutex): ConnectionRegistry, RoomStore, Kontakt-Snapshots
//!     +-- EventBroadcaster: Send-Queues aller offenen Verbindungen
//!     +-- ContactLookup: externer Kontaktdienst
//! ```
//!
//! ## Invarianten
//!
//! Nach jedem verarbeiteten Event gilt:
//! 1. Aktive Verbindung eines Benutzers gehoert diesem Benutzer
//! 2. Raeume die durch Austritt leer werden existieren nicht mehr
//! 3. Jeder Paar-Schluessel zeigt auf einen existierenden Raum mit diesem Schluessel
//! 4. Raum-Mitglieder und Benutzer-Mitgliedschaften sind deckungsgleich
//!
//! [`SignalingState::invarianten_pruefen`] prueft alle vier.

pub mod broadcast;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod presence;
pub mod registry;
pub mod relay;
pub mod rooms;
pub mod server_state;
pub mod tcp;

// Bequeme Re-Exporte
pub use broadcast::EventBroadcaster;
pub use connection::{ClientConnection, TrennGrund};
pub use dispatcher::{DispatcherContext, MessageDispatcher};
pub use error::{SignalingError, SignalingResult};
pub use presence::{ContactLookup, KeineKontakte, KontaktFehler, StatischeKontakte};
pub use server_state::{SignalingConfig, SignalingState, ZustandSnapshot};
pub use tcp::SignalingServer;
