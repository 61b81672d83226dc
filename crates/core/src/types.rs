//! Gemeinsame Identifikationstypen fuer Treffpunkt
//!
//! Alle IDs verwenden das Newtype-Pattern um Verwechslungen zwischen
//! verschiedenen ID-Arten zur Compilezeit auszuschliessen.
//!
//! `UserId` und `RoomId` sind opake Strings (vom Auth-Layer bzw. vom Client
//! vergeben), `ConnectionId` wird vom Transport als UUID vergeben.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Trennzeichen zwischen den beiden User-IDs eines `PairKey`
pub const PAIR_KEY_TRENNER: char = ':';

/// Opake, stabile Benutzer-ID (vom Authentifizierungs-Layer vergeben)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Erstellt eine UserId aus einer Client-Eingabe
    ///
    /// Gibt `None` zurueck wenn die Eingabe leer ist oder nur aus
    /// Leerzeichen besteht. Fuehrende/abschliessende Leerzeichen werden entfernt.
    pub fn parse(eingabe: &str) -> Option<Self> {
        let getrimmt = eingabe.trim();
        if getrimmt.is_empty() {
            None
        } else {
            Some(Self(getrimmt.to_string()))
        }
    }

    /// Gibt die ID als String-Slice zurueck
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Eindeutige ID einer Live-Verbindung (vom Transport vergeben)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    /// Erstellt eine neue zufaellige ConnectionId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Gibt die innere UUID zurueck
    pub fn inner(&self) -> Uuid {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn:{}", self.0)
    }
}

/// Raum-ID
///
/// Von `get_or_create_room` generierte Raeume bekommen eine UUID, Ad-hoc-
/// Gruppenraeume duerfen beliebige nicht-leere Strings verwenden.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Erstellt eine neue zufaellige RoomId (UUID v4)
    pub fn generieren() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Erstellt eine RoomId aus einer Client-Eingabe (leer -> `None`)
    pub fn parse(eingabe: &str) -> Option<Self> {
        let getrimmt = eingabe.trim();
        if getrimmt.is_empty() {
            None
        } else {
            Some(Self(getrimmt.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RoomId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kanonischer Schluessel fuer ein ungeordnetes Benutzerpaar
///
/// Beide IDs werden lexikographisch sortiert, damit `(a, b)` und `(b, a)`
/// denselben Schluessel ergeben. Vor der ersten ID steht ihre Byte-Laenge,
/// sodass IDs die selbst `:` enthalten eindeutig bleiben: `5:alice:bob`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PairKey(String);

impl PairKey {
    /// Bildet den kanonischen Schluessel fuer zwei Benutzer
    pub fn aus_paar(a: &UserId, b: &UserId) -> Self {
        let (erster, zweiter) = if a.as_str() <= b.as_str() {
            (a, b)
        } else {
            (b, a)
        };
        Self(format!(
            "{laenge}{PAIR_KEY_TRENNER}{erster}{PAIR_KEY_TRENNER}{zweiter}",
            laenge = erster.as_str().len()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PairKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
