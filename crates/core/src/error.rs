//! Fehlertypen fuer Treffpunkt
//!
//! Zentraler Fehler-Enum fuer crate-uebergreifende Fehlerzustaende.

use thiserror::Error;

/// Globaler Result-Alias fuer Treffpunkt
pub type Result<T> = std::result::Result<T, TreffpunktError>;

/// Alle crate-uebergreifenden Fehler im Treffpunkt-System
#[derive(Debug, Error)]
pub enum TreffpunktError {
    /// Konfigurations- oder Kontaktdatei fehlt oder ist ungueltig
    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fehler_anzeige() {
        let e = TreffpunktError::Konfiguration("Port fehlt".into());
        assert_eq!(e.to_string(), "Konfigurationsfehler: Port fehlt");
    }
}
