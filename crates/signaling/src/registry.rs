//! Connection-Registry – Wer ist gerade ueber welche Verbindung erreichbar
//!
//! Haelt die beiden Richtungen `UserId -> ConnectionId` (aktive Verbindung)
//! und `ConnectionId -> UserId` (Besitzer) und aendert sie immer gemeinsam.
//! Pro Benutzer gibt es hoechstens eine aktive Verbindung.

use std::collections::HashMap;
use treffpunkt_core::types::{ConnectionId, UserId};

/// Ergebnis von [`ConnectionRegistry::abmelden`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Abmeldung {
    pub user_id: UserId,
    /// `true` wenn die Verbindung zum Zeitpunkt der Abmeldung noch die aktive
    /// Verbindung des Benutzers war
    pub autoritativ: bool,
}

/// Bidirektionale Zuordnung Benutzer <-> Verbindung
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    aktiv: HashMap<UserId, ConnectionId>,
    besitzer: HashMap<ConnectionId, UserId>,
}

impl ConnectionRegistry {
    /// Macht `connection_id` zur aktiven Verbindung von `user_id`
    ///
    /// Gibt die bisherige aktive Verbindung zurueck, falls es eine andere
    /// war. Deren Besitzer-Eintrag bleibt bestehen, bis sie sich abmeldet.
    pub fn installieren(&mut self, connection_id: ConnectionId, user_id: UserId) -> Option<ConnectionId> {
        let vorher = self.aktiv.insert(user_id.clone(), connection_id);
        self.besitzer.insert(connection_id, user_id);
        vorher.filter(|alt| *alt != connection_id)
    }

    /// Aktive Verbindung eines Benutzers
    pub fn aufloesen(&self, user_id: &UserId) -> Option<ConnectionId> {
        self.aktiv.get(user_id).copied()
    }

    /// Benutzer unter dem eine Verbindung registriert ist
    pub fn besitzer(&self, connection_id: &ConnectionId) -> Option<&UserId> {
        self.besitzer.get(connection_id)
    }

    /// Entfernt eine Verbindung aus der Registry
    ///
    /// Der Besitzer-Eintrag wird immer entfernt, die aktive Zuordnung nur
    /// wenn sie noch auf diese Verbindung zeigt. Unbekannte Verbindungen
    /// ergeben `None`.
    pub fn abmelden(&mut self, connection_id: &ConnectionId) -> Option<Abmeldung> {
        let user_id = self.besitzer.remove(connection_id)?;
        let autoritativ = self.aktiv.get(&user_id) == Some(connection_id);
        if autoritativ {
            self.aktiv.remove(&user_id);
        }
        Some(Abmeldung { user_id, autoritativ })
    }

    pub fn ist_online(&self, user_id: &UserId) -> bool {
        self.aktiv.contains_key(user_id)
    }

    /// Anzahl der Benutzer mit aktiver Verbindung
    pub fn online_anzahl(&self) -> usize {
        self.aktiv.len()
    }

    /// Anzahl der registrierten Verbindungen (inkl. verdraengter)
    pub fn verbindungen_anzahl(&self) -> usize {
        self.besitzer.len()
    }

    /// Alle Benutzer mit aktiver Verbindung (unsortiert)
    pub fn online_benutzer(&self) -> impl Iterator<Item = &UserId> {
        self.aktiv.keys()
    }

    /// Prueft: aktiv[u] = c  =>  besitzer[c] = u
    pub fn pruefen(&self) -> Result<(), String> {
        for (user_id, connection_id) in &self.aktiv {
            match self.besitzer.get(connection_id) {
                Some(b) if b == user_id => {}
                Some(b) => {
                    return Err(format!(
                        "{connection_id} ist aktiv fuer {user_id}, gehoert aber {b}"
                    ))
                }
                None => {
                    return Err(format!(
                        "{connection_id} ist aktiv fuer {user_id}, hat aber keinen Besitzer"
                    ))
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> UserId {
        UserId::from("alice")
    }

    #[test]
    fn installieren_und_aufloesen() {
        let mut reg = ConnectionRegistry::default();
        let c1 = ConnectionId::new();
        assert_eq!(reg.installieren(c1, alice()), None);
        assert_eq!(reg.aufloesen(&alice()), Some(c1));
        assert_eq!(reg.besitzer(&c1), Some(&alice()));
        assert!(reg.ist_online(&alice()));
        reg.pruefen().unwrap();
    }

    #[test]
    fn zweite_verbindung_verdraengt_erste() {
        let mut reg = ConnectionRegistry::default();
        let (c1, c2) = (ConnectionId::new(), ConnectionId::new());
        reg.installieren(c1, alice());
        assert_eq!(reg.installieren(c2, alice()), Some(c1));
        assert_eq!(reg.aufloesen(&alice()), Some(c2));
        // Alte Verbindung behaelt ihren Besitzer bis zur Abmeldung
        assert_eq!(reg.besitzer(&c1), Some(&alice()));
        assert_eq!(reg.verbindungen_anzahl(), 2);
        assert_eq!(reg.online_anzahl(), 1);
        reg.pruefen().unwrap();
    }

    #[test]
    fn erneutes_installieren_derselben_verbindung() {
        let mut reg = ConnectionRegistry::default();
        let c1 = ConnectionId::new();
        reg.installieren(c1, alice());
        assert_eq!(reg.installieren(c1, alice()), None);
    }

    #[test]
    fn veraltete_abmeldung_laesst_aktive_verbindung_stehen() {
        let mut reg = ConnectionRegistry::default();
        let (c1, c2) = (ConnectionId::new(), ConnectionId::new());
        reg.installieren(c1, alice());
        reg.installieren(c2, alice());

        let abmeldung = reg.abmelden(&c1).unwrap();
        assert_eq!(abmeldung.user_id, alice());
        assert!(!abmeldung.autoritativ);
        assert_eq!(reg.aufloesen(&alice()), Some(c2));
        assert!(reg.besitzer(&c1).is_none());
        reg.pruefen().unwrap();
    }

    #[test]
    fn autoritative_abmeldung() {
        let mut reg = ConnectionRegistry::default();
        let c1 = ConnectionId::new();
        reg.installieren(c1, alice());

        let abmeldung = reg.abmelden(&c1).unwrap();
        assert!(abmeldung.autoritativ);
        assert!(!reg.ist_online(&alice()));
        assert_eq!(reg.online_anzahl(), 0);
        assert!(reg.abmelden(&c1).is_none(), "Zweite Abmeldung ist ein No-op");
    }

    #[test]
    fn unbekannte_verbindung_abmelden() {
        let mut reg = ConnectionRegistry::default();
        assert!(reg.abmelden(&ConnectionId::new()).is_none());
    }
}
