//! Presence – Kontaktbezogene Online/Offline-Benachrichtigungen
//!
//! Wer erfaehrt, dass ein Benutzer online oder offline geht? Nur dessen
//! Kontakte. Die Kontaktliste kommt von einem externen Dienst
//! ([`ContactLookup`]); faellt dieser aus, wird mit einer leeren Liste
//! weitergearbeitet.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use thiserror::Error;
use treffpunkt_core::types::{ConnectionId, UserId};
use treffpunkt_core::TreffpunktError;

use crate::registry::ConnectionRegistry;

// ---------------------------------------------------------------------------
// ContactLookup
// ---------------------------------------------------------------------------

/// Fehler beim Laden einer Kontaktliste
#[derive(Debug, Error)]
pub enum KontaktFehler {
    #[error("Kontaktdienst nicht verfuegbar")]
    NichtVerfuegbar,

    #[error("Kontakt-Lookup fehlgeschlagen: {0}")]
    Lookup(String),
}

/// Externer Dienst: "Welche Benutzer betrachtet dieser Benutzer als Kontakt?"
///
/// Wird ohne gehaltenen Lock aufgerufen und darf beliebig lange dauern.
#[async_trait]
pub trait ContactLookup: Send + Sync + 'static {
    async fn kontakte_laden(&self, user_id: &UserId) -> Result<Vec<UserId>, KontaktFehler>;
}

/// Kein Kontaktdienst konfiguriert
#[derive(Debug, Default, Clone, Copy)]
pub struct KeineKontakte;

#[async_trait]
impl ContactLookup for KeineKontakte {
    async fn kontakte_laden(&self, _user_id: &UserId) -> Result<Vec<UserId>, KontaktFehler> {
        Err(KontaktFehler::NichtVerfuegbar)
    }
}

// ---------------------------------------------------------------------------
// StatischeKontakte
// ---------------------------------------------------------------------------

/// Dateiformat einer Kontaktdatei
///
/// ```toml
/// symmetrisch = true
///
/// [kontakte]
/// alice = ["bob", "carol"]
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct KontaktDatei {
    symmetrisch: bool,
    kontakte: BTreeMap<String, Vec<String>>,
}

/// In-Memory-Kontaktliste (Adjazenzliste)
#[derive(Debug, Default, Clone)]
pub struct StatischeKontakte {
    kanten: HashMap<UserId, Vec<UserId>>,
}

impl StatischeKontakte {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Fuegt die Kante `von -> zu` hinzu (Duplikate werden ignoriert)
    pub fn kante_hinzufuegen(&mut self, von: UserId, zu: UserId) {
        let liste = self.kanten.entry(von).or_default();
        if !liste.contains(&zu) {
            liste.push(zu);
        }
    }

    /// Liest eine Kontaktliste im TOML-Format
    pub fn aus_toml_str(inhalt: &str) -> treffpunkt_core::Result<Self> {
        let datei: KontaktDatei = toml::from_str(inhalt)
            .map_err(|e| TreffpunktError::Konfiguration(format!("Kontaktdatei: {e}")))?;

        let mut kontakte = Self::neu();
        for (von, liste) in datei.kontakte {
            let Some(von) = UserId::parse(&von) else {
                continue;
            };
            for zu in liste.iter().filter_map(|z| UserId::parse(z)) {
                if zu == von {
                    continue;
                }
                if datei.symmetrisch {
                    kontakte.kante_hinzufuegen(zu.clone(), von.clone());
                }
                kontakte.kante_hinzufuegen(von.clone(), zu);
            }
        }
        Ok(kontakte)
    }

    /// Laedt eine Kontaktliste aus einer TOML-Datei
    pub fn aus_datei(pfad: &Path) -> treffpunkt_core::Result<Self> {
        let inhalt = std::fs::read_to_string(pfad).map_err(|e| {
            TreffpunktError::Konfiguration(format!(
                "Kontaktdatei '{}' nicht lesbar: {e}",
                pfad.display()
            ))
        })?;
        Self::aus_toml_str(&inhalt)
    }

    /// Anzahl der Benutzer mit mindestens einem Kontakt
    pub fn benutzer_anzahl(&self) -> usize {
        self.kanten.len()
    }
}

#[async_trait]
impl ContactLookup for StatischeKontakte {
    async fn kontakte_laden(&self, user_id: &UserId) -> Result<Vec<UserId>, KontaktFehler> {
        Ok(self.kanten.get(user_id).cloned().unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Hilfsfunktionen
// ---------------------------------------------------------------------------

/// Laedt die Kontakte eines Benutzers; Fehler ergeben eine leere Liste
pub async fn kontakte_oder_leer(lookup: &dyn ContactLookup, user_id: &UserId) -> Vec<UserId> {
    match lookup.kontakte_laden(user_id).await {
        Ok(kontakte) => kontakte,
        Err(e) => {
            tracing::warn!(user_id = %user_id, fehler = %e, "Kontakte nicht ladbar – Presence ohne Kontakte");
            Vec::new()
        }
    }
}

/// Schnittmenge aus Kontaktliste und aktuell registrierten Benutzern
///
/// Entfernt Duplikate und den Benutzer selbst, behaelt die Reihenfolge der
/// Kontaktliste bei.
pub fn online_kontakte(
    kontakte: &[UserId],
    registry: &ConnectionRegistry,
    selbst: &UserId,
) -> Vec<(UserId, ConnectionId)> {
    let mut gesehen = HashSet::new();
    kontakte
        .iter()
        .filter(|k| *k != selbst && gesehen.insert(*k))
        .filter_map(|k| registry.aufloesen(k).map(|c| (k.clone(), c)))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
