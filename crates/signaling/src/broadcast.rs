//! Event-Broadcaster – Sendet Events an verbundene Clients
//!
//! Der EventBroadcaster verwaltet die Send-Queues aller offenen Verbindungen
//! (auch noch nicht registrierter) und stellt Methoden bereit, um Nachrichten
//! gezielt an eine Verbindung oder an eine Menge von Benutzern zu senden.
//!
//! Zustellung ist best-effort: `try_send`, hoechstens einmal, keine
//! Wiederholung. Eine volle Queue verwirft die Nachricht.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use treffpunkt_core::types::{ConnectionId, UserId};
use treffpunkt_protocol::control::ServerMessage;

use crate::registry::ConnectionRegistry;

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Standard-Groesse der Send-Queue pro Verbindung
pub const SEND_QUEUE_GROESSE: usize = 64;

// ---------------------------------------------------------------------------
// Ausgehende Elemente
// ---------------------------------------------------------------------------

/// Element der Send-Queue einer Verbindung
#[derive(Debug, Clone)]
pub enum Ausgehend {
    /// Nachricht an den Client schreiben
    Nachricht(ServerMessage),
    /// Verbindung schliessen, nachdem alle vorherigen Nachrichten geschrieben sind
    Trennen,
}

/// Empfangsseite einer Verbindung (gehoert der `ClientConnection`)
pub struct ClientEmpfaenger {
    pub rx: mpsc::Receiver<Ausgehend>,
    /// Wird signalisiert wenn `Trennen` wegen voller Queue nicht eingereiht werden konnte
    pub abbruch: Arc<Notify>,
}

// ---------------------------------------------------------------------------
// ClientSender
// ---------------------------------------------------------------------------

/// Handle auf die Send-Queue einer Verbindung
#[derive(Clone, Debug)]
pub struct ClientSender {
    pub connection_id: ConnectionId,
    tx: mpsc::Sender<Ausgehend>,
    abbruch: Arc<Notify>,
}

impl ClientSender {
    /// Sendet eine Nachricht nicht-blockierend an den Client
    ///
    /// Gibt `false` zurueck wenn die Queue voll oder geschlossen ist.
    pub fn senden(&self, nachricht: ServerMessage) -> bool {
        let event = nachricht.payload.event_name();
        match self.tx.try_send(Ausgehend::Nachricht(nachricht)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(
                    connection_id = %self.connection_id,
                    event,
                    "Send-Queue voll – Nachricht verworfen"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(
                    connection_id = %self.connection_id,
                    event,
                    "Send-Queue geschlossen (Client getrennt)"
                );
                false
            }
        }
    }

    /// Fordert das Schliessen der Verbindung an
    ///
    /// Normalerweise als `Trennen` hinter den bereits eingereihten Nachrichten,
    /// bei voller Queue sofort ueber `abbruch`.
    pub fn trennen(&self) -> bool {
        match self.tx.try_send(Ausgehend::Trennen) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.abbruch.notify_one();
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

// ---------------------------------------------------------------------------
// EventBroadcaster
// ---------------------------------------------------------------------------

/// Zentraler Event-Broadcaster fuer alle offenen Verbindungen
///
/// Thread-safe via Arc + DashMap. Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct EventBroadcaster {
    inner: Arc<EventBroadcasterInner>,
}

struct EventBroadcasterInner {
    /// Send-Queues, indiziert nach ConnectionId
    clients: DashMap<ConnectionId, ClientSender>,
}

impl EventBroadcaster {
    pub fn neu() -> Self {
        Self {
            inner: Arc::new(EventBroadcasterInner {
                clients: DashMap::new(),
            }),
        }
    }

    /// Registriert eine neue Verbindung und gibt ihre Empfangs-Queue zurueck
    ///
    /// Die `ClientConnection` liest aus dieser Queue und schreibt via TCP.
    pub fn client_registrieren(
        &self,
        connection_id: ConnectionId,
        queue_groesse: usize,
    ) -> ClientEmpfaenger {
        let (tx, rx) = mpsc::channel(queue_groesse.max(1));
        let abbruch = Arc::new(Notify::new());
        let sender = ClientSender {
            connection_id,
            tx,
            abbruch: Arc::clone(&abbruch),
        };
        self.inner.clients.insert(connection_id, sender);
        tracing::debug!(connection_id = %connection_id, "Verbindung im Broadcaster registriert");
        ClientEmpfaenger { rx, abbruch }
    }

    /// Entfernt eine Verbindung aus dem Broadcaster
    pub fn client_entfernen(&self, connection_id: &ConnectionId) {
        if self.inner.clients.remove(connection_id).is_some() {
            tracing::debug!(connection_id = %connection_id, "Verbindung aus Broadcaster entfernt");
        }
    }

    /// Sendet eine Nachricht an eine einzelne Verbindung
    ///
    /// Gibt `true` zurueck wenn die Verbindung gefunden und die Nachricht eingereiht wurde.
    pub fn an_verbindung_senden(&self, connection_id: &ConnectionId, nachricht: ServerMessage) -> bool {
        match self.inner.clients.get(connection_id) {
            Some(sender) => sender.senden(nachricht),
            None => {
                tracing::debug!(connection_id = %connection_id, "Senden an unbekannte Verbindung");
                false
            }
        }
    }

    /// Sendet eine Nachricht an die aktuelle Verbindung jedes genannten Benutzers
    ///
    /// Benutzer ohne Live-Verbindung werden uebersprungen. Gibt die Anzahl
    /// der erfolgreichen Sendungen zurueck.
    pub fn an_benutzer_senden<'a>(
        &self,
        registry: &ConnectionRegistry,
        empfaenger: impl IntoIterator<Item = &'a UserId>,
        nachricht: &ServerMessage,
    ) -> usize {
        let mut gesendet = 0;
        for user_id in empfaenger {
            if let Some(connection_id) = registry.aufloesen(user_id) {
                if self.an_verbindung_senden(&connection_id, nachricht.clone()) {
                    gesendet += 1;
                }
            }
        }
        gesendet
    }

    /// Fordert das Schliessen einer Verbindung an
    pub fn verbindung_trennen(&self, connection_id: &ConnectionId) -> bool {
        match self.inner.clients.get(connection_id) {
            Some(sender) => sender.trennen(),
            None => false,
        }
    }

    /// Gibt die Anzahl der offenen Verbindungen zurueck
    pub fn client_anzahl(&self) -> usize {
        self.inner.clients.len()
    }

    /// Prueft ob eine Verbindung offen ist
    pub fn ist_registriert(&self, connection_id: &ConnectionId) -> bool {
        self.inner.clients.contains_key(connection_id)
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::neu()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn test_nachricht(id: u32) -> ServerMessage {
        ServerMessage::error(Some(id), "test")
    }

    #[tokio::test]
    async fn verbindung_registrieren_und_senden() {
        let broadcaster = EventBroadcaster::neu();
        let conn = ConnectionId::new();

        let mut empfaenger = broadcaster.client_registrieren(conn, SEND_QUEUE_GROESSE);
        assert!(broadcaster.ist_registriert(&conn));
        assert!(broadcaster.an_verbindung_senden(&conn, test_nachricht(1)));

        match empfaenger.rx.try_recv().expect("Nachricht muss vorhanden sein") {
            Ausgehend::Nachricht(msg) => assert_eq!(msg.ack, Some(1)),
            Ausgehend::Trennen => panic!("Nachricht erwartet"),
        }
    }

    #[tokio::test]
    async fn an_benutzer_senden_nutzt_registry() {
        let broadcaster = EventBroadcaster::neu();
        let mut registry = ConnectionRegistry::default();

        let (c1, c2) = (ConnectionId::new(), ConnectionId::new());
        let mut rx1 = broadcaster.client_registrieren(c1, SEND_QUEUE_GROESSE);
        let mut rx2 = broadcaster.client_registrieren(c2, SEND_QUEUE_GROESSE);
        registry.installieren(c1, UserId::from("alice"));

        let empfaenger = [UserId::from("alice"), UserId::from("offline")];
        let gesendet = broadcaster.an_benutzer_senden(&registry, &empfaenger, &test_nachricht(5));
        assert_eq!(gesendet, 1);
        assert!(rx1.rx.try_recv().is_ok());
        assert!(rx2.rx.try_recv().is_err(), "Nicht registrierte Verbindung darf nichts empfangen");
    }

    #[tokio::test]
    async fn volle_queue_verwirft_nachricht() {
        let broadcaster = EventBroadcaster::neu();
        let conn = ConnectionId::new();
        let _empfaenger = broadcaster.client_registrieren(conn, 1);

        assert!(broadcaster.an_verbindung_senden(&conn, test_nachricht(1)));
        assert!(!broadcaster.an_verbindung_senden(&conn, test_nachricht(2)));
    }

    #[tokio::test]
    async fn trennen_kommt_nach_vorherigen_nachrichten() {
        let broadcaster = EventBroadcaster::neu();
        let conn = ConnectionId::new();
        let mut empfaenger = broadcaster.client_registrieren(conn, SEND_QUEUE_GROESSE);

        broadcaster.an_verbindung_senden(&conn, test_nachricht(1));
        assert!(broadcaster.verbindung_trennen(&conn));

        assert!(matches!(empfaenger.rx.try_recv(), Ok(Ausgehend::Nachricht(_))));
        assert!(matches!(empfaenger.rx.try_recv(), Ok(Ausgehend::Trennen)));
    }

    #[tokio::test]
    async fn trennen_bei_voller_queue_signalisiert_abbruch() {
        let broadcaster = EventBroadcaster::neu();
        let conn = ConnectionId::new();
        let empfaenger = broadcaster.client_registrieren(conn, 1);

        broadcaster.an_verbindung_senden(&conn, test_nachricht(1));
        assert!(broadcaster.verbindung_trennen(&conn));

        // Permit ist gespeichert, notified() kehrt sofort zurueck
        tokio::time::timeout(std::time::Duration::from_millis(100), empfaenger.abbruch.notified())
            .await
            .expect("Abbruch muss signalisiert sein");
    }

    #[test]
    fn client_entfernen() {
        let broadcaster = EventBroadcaster::neu();
        let conn = ConnectionId::new();
        let _rx = broadcaster.client_registrieren(conn, SEND_QUEUE_GROESSE);
        assert_eq!(broadcaster.client_anzahl(), 1);

        broadcaster.client_entfernen(&conn);
        assert!(!broadcaster.ist_registriert(&conn));
        assert!(!broadcaster.verbindung_trennen(&conn));
        assert_eq!(broadcaster.client_anzahl(), 0);
    }
}
