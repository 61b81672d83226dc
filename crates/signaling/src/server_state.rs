//! Gemeinsamer Server-Zustand fuer den Signaling-Service
//!
//! Registry, Raeume und Kontakt-Snapshots liegen gemeinsam in einem `Kern`
//! hinter genau einem Mutex. Jede Aenderung an diesen Tabellen laeuft
//! durch diesen Lock; er wird nie ueber ein `.await` gehalten.

use parking_lot::{Mutex, MutexGuard};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use treffpunkt_core::types::{ConnectionId, RoomId, UserId};
use treffpunkt_protocol::wire::DEFAULT_MAX_FRAME_SIZE;

use crate::broadcast::{EventBroadcaster, SEND_QUEUE_GROESSE};
use crate::presence::ContactLookup;
use crate::registry::ConnectionRegistry;
use crate::rooms::{Room, RoomStore};

/// Konfiguration fuer den Signaling-Service
#[derive(Debug, Clone)]
pub struct SignalingConfig {
    /// Anzeigename des Servers
    pub server_name: String,
    /// Maximale gleichzeitige Verbindungen
    pub max_clients: u32,
    /// Timeout fuer inaktive Verbindungen in Sekunden
    pub verbindungs_timeout_sek: u64,
    /// Groesse der Send-Queue pro Verbindung
    pub send_queue_groesse: usize,
    /// Maximale Frame-Groesse in Bytes
    pub max_frame_groesse: usize,
    /// Ab dieser Mitgliederzahl wird beim Beitritt gewarnt (nicht erzwungen)
    pub mesh_soft_cap: usize,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            server_name: "Treffpunkt".to_string(),
            max_clients: 1024,
            verbindungs_timeout_sek: 90,
            send_queue_groesse: SEND_QUEUE_GROESSE,
            max_frame_groesse: DEFAULT_MAX_FRAME_SIZE,
            mesh_soft_cap: 8,
        }
    }
}

/// Alle geteilten Tabellen, nur gemeinsam unter `SignalingState::kern` aenderbar
#[derive(Debug, Default)]
pub(crate) struct Kern {
    pub registry: ConnectionRegistry,
    pub raeume: RoomStore,
    /// Kontaktliste aus der Registrierung, solange diese autoritativ ist
    pub kontakt_snapshots: HashMap<UserId, Vec<UserId>>,
}

/// Momentaufnahme fuer Metriken und Health-Checks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ZustandSnapshot {
    pub online_benutzer: usize,
    pub registrierte_verbindungen: usize,
    pub offene_verbindungen: usize,
    pub raeume: usize,
    pub signale_weitergeleitet: u64,
    pub signale_verworfen: u64,
}

/// Zaehler des Signaling-Relays
#[derive(Debug, Default)]
pub struct RelayStatistik {
    weitergeleitet: AtomicU64,
    verworfen: AtomicU64,
}

impl RelayStatistik {
    pub fn weitergeleitet(&self) {
        self.weitergeleitet.fetch_add(1, Ordering::Relaxed);
    }

    pub fn verworfen(&self) {
        self.verworfen.fetch_add(1, Ordering::Relaxed);
    }
}

/// Gemeinsamer Server-Zustand (thread-safe, Arc-geteilt)
pub struct SignalingState {
    /// Server-Konfiguration
    pub config: Arc<SignalingConfig>,
    /// Event-Broadcaster (Nachrichten an Verbindungen senden)
    pub broadcaster: EventBroadcaster,
    /// Externer Kontaktdienst
    pub kontakte: Arc<dyn ContactLookup>,
    /// Relay-Zaehler
    pub statistik: RelayStatistik,
    kern: Mutex<Kern>,
    /// Startzeitpunkt des Servers (fuer Uptime-Berechnung)
    pub start_time: Instant,
}

impl SignalingState {
    /// Erstellt einen neuen SignalingState
    pub fn neu(config: SignalingConfig, kontakte: Arc<dyn ContactLookup>) -> Arc<Self> {
        Arc::new(Self {
            config: Arc::new(config),
            broadcaster: EventBroadcaster::neu(),
            kontakte,
            statistik: RelayStatistik::default(),
            kern: Mutex::new(Kern::default()),
            start_time: Instant::now(),
        })
    }

    /// Sperrt den Kern (nie ueber ein `.await` halten)
    pub(crate) fn kern(&self) -> MutexGuard<'_, Kern> {
        self.kern.lock()
    }

    /// Gibt die Uptime in Sekunden zurueck
    pub fn uptime_sek(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    // -----------------------------------------------------------------------
    // Lesende Abfragen
    // -----------------------------------------------------------------------

    /// Aktive Verbindung eines Benutzers
    pub fn aufloesen(&self, user_id: &UserId) -> Option<ConnectionId> {
        self.kern().registry.aufloesen(user_id)
    }

    /// Benutzer unter dem eine Verbindung registriert ist
    pub fn besitzer(&self, connection_id: &ConnectionId) -> Option<UserId> {
        self.kern().registry.besitzer(connection_id).cloned()
    }

    /// Kopie eines Raums
    pub fn raum_info(&self, room_id: &RoomId) -> Option<Room> {
        self.kern().raeume.raum(room_id).cloned()
    }

    /// Kanonischer Raum eines Benutzerpaars
    pub fn pair_raum(&self, a: &UserId, b: &UserId) -> Option<RoomId> {
        self.kern().raeume.raum_fuer_paar(a, b).cloned()
    }

    /// Raeume eines Benutzers
    pub fn raeume_von(&self, user_id: &UserId) -> Vec<RoomId> {
        self.kern().raeume.raeume_von(user_id)
    }

    /// Alle Raeume mit Mitgliedern
    pub fn raum_uebersicht(&self) -> BTreeMap<RoomId, Vec<UserId>> {
        self.kern().raeume.uebersicht()
    }

    pub fn snapshot(&self) -> ZustandSnapshot {
        let kern = self.kern();
        ZustandSnapshot {
            online_benutzer: kern.registry.online_anzahl(),
            registrierte_verbindungen: kern.registry.verbindungen_anzahl(),
            offene_verbindungen: self.broadcaster.client_anzahl(),
            raeume: kern.raeume.anzahl(),
            signale_weitergeleitet: self.statistik.weitergeleitet.load(Ordering::Relaxed),
            signale_verworfen: self.statistik.verworfen.load(Ordering::Relaxed),
        }
    }

    /// Prueft alle Tabellen-Invarianten (fuer Tests und Debug-Ausgaben)
    pub fn invarianten_pruefen(&self) -> Result<(), String> {
        let kern = self.kern();
        kern.registry.pruefen()?;
        kern.raeume.pruefen()?;
        for user_id in kern.kontakt_snapshots.keys() {
            if !kern.registry.ist_online(user_id) {
                return Err(format!("Kontakt-Snapshot fuer {user_id} ohne aktive Verbindung"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presence::KeineKontakte;

    #[test]
    fn neuer_zustand_ist_leer() {
        let state = SignalingState::neu(SignalingConfig::default(), Arc::new(KeineKontakte));
        assert_eq!(state.snapshot(), ZustandSnapshot::default());
        assert!(state.invarianten_pruefen().is_ok());
        assert!(state.raum_uebersicht().is_empty());
    }

    #[test]
    fn statistik_zaehlt() {
        let state = SignalingState::neu(SignalingConfig::default(), Arc::new(KeineKontakte));
        state.statistik.weitergeleitet();
        state.statistik.weitergeleitet();
        state.statistik.verworfen();
        let snap = state.snapshot();
        assert_eq!(snap.signale_weitergeleitet, 2);
        assert_eq!(snap.signale_verworfen, 1);
    }

    #[test]
    fn standard_konfiguration() {
        let config = SignalingConfig::default();
        assert_eq!(config.mesh_soft_cap, 8);
        assert_eq!(config.max_frame_groesse, DEFAULT_MAX_FRAME_SIZE);
    }
}
