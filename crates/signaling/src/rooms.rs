//! Room-Store – Raeume, Paar-Index und Mitgliedschaften
//!
//! Drei Tabellen die nur gemeinsam geaendert werden:
//! - `RoomId -> Room` (Mitglieder, optionaler Paar-Schluessel, Ersteller)
//! - `PairKey -> RoomId` (kanonischer 1:1-Raum pro Benutzerpaar)
//! - `UserId -> {RoomId}` (Rueckrichtung der Mitgliedschaft)
//!
//! Ein Raum ohne Mitglieder existiert nur zwischen `holen_oder_erstellen`
//! und dem ersten Beitritt. Wird ein Raum durch Austritt leer, werden er und
//! sein Paar-Schluessel sofort entfernt.

use std::collections::{BTreeMap, HashMap, HashSet};
use treffpunkt_core::types::{PairKey, RoomId, UserId};

// ---------------------------------------------------------------------------
// Room
// ---------------------------------------------------------------------------

/// Ein Raum und seine aktuellen Mitglieder
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Room {
    pub mitglieder: HashSet<UserId>,
    /// Nur bei Raeumen aus `get_or_create_room` gesetzt
    pub pair_key: Option<PairKey>,
    /// Benutzer der den Paar-Raum angelegt hat
    pub initiator: Option<UserId>,
}

impl Room {
    /// Mitglieder ohne `ausser`, sortiert
    pub fn andere_mitglieder(&self, ausser: &UserId) -> Vec<UserId> {
        let mut peers: Vec<UserId> = self
            .mitglieder
            .iter()
            .filter(|u| *u != ausser)
            .cloned()
            .collect();
        peers.sort();
        peers
    }
}

/// Ergebnis eines Beitritts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Beitritt {
    /// Andere Mitglieder zum Zeitpunkt des Beitritts
    pub peers: Vec<UserId>,
    pub initiator: Option<UserId>,
    /// `false` wenn der Benutzer bereits Mitglied war
    pub neu: bool,
    pub mitglieder_anzahl: usize,
}

/// Ergebnis eines Austritts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Austritt {
    /// Mitglieder nach dem Austritt (Empfaenger von `room:user-left`)
    pub verbleibend: Vec<UserId>,
    /// Raum wurde entfernt, weil er leer war
    pub aufgeloest: bool,
    /// Benutzer war tatsaechlich Mitglied
    pub war_mitglied: bool,
}

// ---------------------------------------------------------------------------
// RoomStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct RoomStore {
    raeume: HashMap<RoomId, Room>,
    paare: HashMap<PairKey, RoomId>,
    mitgliedschaften: HashMap<UserId, HashSet<RoomId>>,
}

impl RoomStore {
    /// Liefert den kanonischen Raum eines Benutzerpaars oder legt ihn an
    ///
    /// Gibt `(room_id, wiederverwendet)` zurueck. Ein neuer Raum hat noch
    /// keine Mitglieder; `anfragender` wird als Initiator vermerkt.
    pub fn holen_oder_erstellen(&mut self, anfragender: &UserId, anderer: &UserId) -> (RoomId, bool) {
        let key = PairKey::aus_paar(anfragender, anderer);
        if let Some(room_id) = self.paare.get(&key) {
            return (room_id.clone(), true);
        }

        let mut room_id = RoomId::generieren();
        while self.raeume.contains_key(&room_id) {
            room_id = RoomId::generieren();
        }
        self.raeume.insert(
            room_id.clone(),
            Room {
                mitglieder: HashSet::new(),
                pair_key: Some(key.clone()),
                initiator: Some(anfragender.clone()),
            },
        );
        self.paare.insert(key, room_id.clone());
        (room_id, false)
    }

    /// Fuegt einen Benutzer einem Raum hinzu (legt unbekannte Raeume an)
    pub fn beitreten(&mut self, room_id: &RoomId, user_id: &UserId) -> Beitritt {
        let room = self.raeume.entry(room_id.clone()).or_default();
        let neu = room.mitglieder.insert(user_id.clone());
        let beitritt = Beitritt {
            peers: room.andere_mitglieder(user_id),
            initiator: room.initiator.clone(),
            neu,
            mitglieder_anzahl: room.mitglieder.len(),
        };
        self.mitgliedschaften
            .entry(user_id.clone())
            .or_default()
            .insert(room_id.clone());
        beitritt
    }

    /// Entfernt einen Benutzer aus einem Raum
    ///
    /// `None` fuer unbekannte Raeume. Ein leerer Raum wird entfernt, auch
    /// wenn der Benutzer nicht Mitglied war.
    pub fn verlassen(&mut self, room_id: &RoomId, user_id: &UserId) -> Option<Austritt> {
        let room = self.raeume.get_mut(room_id)?;
        let war_mitglied = room.mitglieder.remove(user_id);
        let verbleibend = room.andere_mitglieder(user_id);
        let leer = room.mitglieder.is_empty();

        if war_mitglied {
            if let Some(raeume) = self.mitgliedschaften.get_mut(user_id) {
                raeume.remove(room_id);
                if raeume.is_empty() {
                    self.mitgliedschaften.remove(user_id);
                }
            }
        }
        if leer {
            self.aufloesen(room_id);
        }

        Some(Austritt {
            verbleibend,
            aufgeloest: leer,
            war_mitglied,
        })
    }

    /// Entfernt einen Benutzer aus allen seinen Raeumen
    pub fn alle_verlassen(&mut self, user_id: &UserId) -> Vec<(RoomId, Austritt)> {
        let Some(raeume) = self.mitgliedschaften.remove(user_id) else {
            return Vec::new();
        };
        let mut raeume: Vec<RoomId> = raeume.into_iter().collect();
        raeume.sort();

        let mut ergebnis = Vec::with_capacity(raeume.len());
        for room_id in raeume {
            if let Some(austritt) = self.verlassen(&room_id, user_id) {
                ergebnis.push((room_id, austritt));
            }
        }
        ergebnis
    }

    /// Entfernt Raum und Paar-Schluessel in einem Schritt
    fn aufloesen(&mut self, room_id: &RoomId) {
        if let Some(room) = self.raeume.remove(room_id) {
            if let Some(key) = room.pair_key {
                if self.paare.get(&key) == Some(room_id) {
                    self.paare.remove(&key);
                }
            }
            tracing::debug!(room_id = %room_id, "Leerer Raum entfernt");
        }
    }

    // -----------------------------------------------------------------------
    // Abfragen
    // -----------------------------------------------------------------------

    pub fn raum(&self, room_id: &RoomId) -> Option<&Room> {
        self.raeume.get(room_id)
    }

    /// Kanonischer Raum eines Benutzerpaars
    pub fn raum_fuer_paar(&self, a: &UserId, b: &UserId) -> Option<&RoomId> {
        self.paare.get(&PairKey::aus_paar(a, b))
    }

    /// Raeume in denen ein Benutzer Mitglied ist, sortiert
    pub fn raeume_von(&self, user_id: &UserId) -> Vec<RoomId> {
        let mut raeume: Vec<RoomId> = self
            .mitgliedschaften
            .get(user_id)
            .map(|r| r.iter().cloned().collect())
            .unwrap_or_default();
        raeume.sort();
        raeume
    }

    /// Alle Raeume mit sortierten Mitgliederlisten
    pub fn uebersicht(&self) -> BTreeMap<RoomId, Vec<UserId>> {
        self.raeume
            .iter()
            .map(|(id, room)| {
                let mut mitglieder: Vec<UserId> = room.mitglieder.iter().cloned().collect();
                mitglieder.sort();
                (id.clone(), mitglieder)
            })
            .collect()
    }

    pub fn anzahl(&self) -> usize {
        self.raeume.len()
    }

    /// Prueft Paar-Index und Mitgliedschaften auf Konsistenz
    pub fn pruefen(&self) -> Result<(), String> {
        for (key, room_id) in &self.paare {
            match self.raeume.get(room_id) {
                Some(room) if room.pair_key.as_ref() == Some(key) => {}
                Some(_) => return Err(format!("Paar {key} zeigt auf {room_id} mit anderem Schluessel")),
                None => return Err(format!("Paar {key} zeigt auf fehlenden Raum {room_id}")),
            }
        }

        for (room_id, room) in &self.raeume {
            if room.mitglieder.is_empty() && room.pair_key.is_none() {
                return Err(format!("Leerer Raum {room_id} ohne Paar-Schluessel"));
            }
            for user_id in &room.mitglieder {
                let eingetragen = self
                    .mitgliedschaften
                    .get(user_id)
                    .is_some_and(|r| r.contains(room_id));
                if !eingetragen {
                    return Err(format!("{user_id} in {room_id}, aber ohne Mitgliedschaft"));
                }
            }
        }

        for (user_id, raeume) in &self.mitgliedschaften {
            if raeume.is_empty() {
                return Err(format!("Leere Mitgliedschaftsmenge fuer {user_id}"));
            }
            for room_id in raeume {
                let drin = self
                    .raeume
                    .get(room_id)
                    .is_some_and(|r| r.mitglieder.contains(user_id));
                if !drin {
                    return Err(format!("Mitgliedschaft {user_id} -> {room_id} ohne Raum-Eintrag"));
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn u(name: &str) -> UserId {
        UserId::from(name)
    }

    #[test]
    fn holen_oder_erstellen_ist_kommutativ() {
        let mut store = RoomStore::default();
        let (r1, reused1) = store.holen_oder_erstellen(&u("alice"), &u("bob"));
        let (r2, reused2) = store.holen_oder_erstellen(&u("bob"), &u("alice"));
        assert!(!reused1);
        assert!(reused2);
        assert_eq!(r1, r2);

        let room = store.raum(&r1).unwrap();
        assert!(room.mitglieder.is_empty());
        assert_eq!(room.initiator, Some(u("alice")));
        assert_eq!(store.raum_fuer_paar(&u("bob"), &u("alice")), Some(&r1));
        store.pruefen().unwrap();
    }

    #[test]
    fn paar_raeume_mit_doppelpunkt_in_ids_bleiben_getrennt() {
        let mut store = RoomStore::default();
        let (r1, _) = store.holen_oder_erstellen(&u("a:b"), &u("c"));
        let (r2, reused) = store.holen_oder_erstellen(&u("a"), &u("b:c"));
        assert!(!reused);
        assert_ne!(r1, r2);
        store.pruefen().unwrap();
    }

    #[test]
    fn beitreten_legt_unbekannten_raum_an() {
        let mut store = RoomStore::default();
        let room_id = RoomId::from("gruppe");
        let beitritt = store.beitreten(&room_id, &u("alice"));
        assert!(beitritt.neu);
        assert!(beitritt.peers.is_empty());
        assert!(beitritt.initiator.is_none());

        let room = store.raum(&room_id).unwrap();
        assert!(room.pair_key.is_none());
        assert_eq!(store.raeume_von(&u("alice")), vec![room_id]);
        store.pruefen().unwrap();
    }

    #[test]
    fn beitreten_ist_idempotent() {
        let mut store = RoomStore::default();
        let room_id = RoomId::from("r");
        store.beitreten(&room_id, &u("alice"));
        store.beitreten(&room_id, &u("bob"));

        let nochmal = store.beitreten(&room_id, &u("alice"));
        assert!(!nochmal.neu);
        assert_eq!(nochmal.peers, vec![u("bob")]);
        assert_eq!(nochmal.mitglieder_anzahl, 2);
    }

    #[test]
    fn verlassen_entfernt_leeren_raum_und_paar() {
        let mut store = RoomStore::default();
        let (room_id, _) = store.holen_oder_erstellen(&u("alice"), &u("bob"));
        store.beitreten(&room_id, &u("alice"));
        store.beitreten(&room_id, &u("bob"));

        let a = store.verlassen(&room_id, &u("alice")).unwrap();
        assert!(a.war_mitglied);
        assert!(!a.aufgeloest);
        assert_eq!(a.verbleibend, vec![u("bob")]);

        let b = store.verlassen(&room_id, &u("bob")).unwrap();
        assert!(b.aufgeloest);
        assert!(b.verbleibend.is_empty());
        assert!(store.raum(&room_id).is_none());
        assert!(store.raum_fuer_paar(&u("alice"), &u("bob")).is_none());
        assert_eq!(store.anzahl(), 0);
        store.pruefen().unwrap();

        // Naechstes get-or-create liefert einen frischen Raum
        let (neu, reused) = store.holen_oder_erstellen(&u("bob"), &u("alice"));
        assert!(!reused);
        assert_ne!(neu, room_id);
    }

    #[test]
    fn verlassen_unbekannter_raum_ist_noop() {
        let mut store = RoomStore::default();
        assert!(store.verlassen(&RoomId::from("nix"), &u("alice")).is_none());
    }

    #[test]
    fn verlassen_als_nicht_mitglied() {
        let mut store = RoomStore::default();
        let room_id = RoomId::from("r");
        store.beitreten(&room_id, &u("alice"));

        let austritt = store.verlassen(&room_id, &u("bob")).unwrap();
        assert!(!austritt.war_mitglied);
        assert!(!austritt.aufgeloest);
        assert_eq!(store.raum(&room_id).unwrap().mitglieder.len(), 1);
        store.pruefen().unwrap();
    }

    #[test]
    fn alle_verlassen() {
        let mut store = RoomStore::default();
        let (r1, r2) = (RoomId::from("r1"), RoomId::from("r2"));
        store.beitreten(&r1, &u("alice"));
        store.beitreten(&r1, &u("bob"));
        store.beitreten(&r2, &u("alice"));

        let austritte = store.alle_verlassen(&u("alice"));
        assert_eq!(austritte.len(), 2);
        assert_eq!(austritte[0].0, r1);
        assert_eq!(austritte[0].1.verbleibend, vec![u("bob")]);
        assert!(austritte[1].1.aufgeloest);

        assert!(store.raeume_von(&u("alice")).is_empty());
        assert!(store.raum(&r2).is_none());
        assert!(store.alle_verlassen(&u("alice")).is_empty());
        store.pruefen().unwrap();
    }

    #[test]
    fn uebersicht_ist_sortiert() {
        let mut store = RoomStore::default();
        let room_id = RoomId::from("r");
        store.beitreten(&room_id, &u("zoe"));
        store.beitreten(&room_id, &u("anna"));

        let uebersicht = store.uebersicht();
        assert_eq!(uebersicht.get(&room_id), Some(&vec![u("anna"), u("zoe")]));
    }
}
