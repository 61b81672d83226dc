//! Fehlertypen fuer den Signaling-Service

use thiserror::Error;
use treffpunkt_protocol::control::grund;

/// Fehlertyp fuer den Signaling-Service
#[derive(Debug, Error)]
pub enum SignalingError {
    /// IO-Fehler (TCP, Socket)
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    /// Pflichtfeld einer Anfrage fehlt oder ist leer
    #[error("Pflichtfeld fehlt: {0}")]
    FehlenderParameter(&'static str),

    /// Event erfordert eine vorherige Registrierung
    #[error("Verbindung ist nicht registriert")]
    NichtRegistriert,

    /// Protokollfehler (ungueltiges Frame, unbekanntes Event)
    #[error("Protokollfehler: {0}")]
    Protokoll(String),
}

impl SignalingError {
    /// Erstellt einen Protokollfehler
    pub fn protokoll(msg: impl Into<String>) -> Self {
        Self::Protokoll(msg.into())
    }

    /// Grund-String fuer die strukturierte Fehlerantwort an den Client
    pub fn client_grund(&self) -> String {
        match self {
            Self::FehlenderParameter(feld) => format!("missing-{feld}"),
            Self::NichtRegistriert => grund::NOT_REGISTERED.to_string(),
            Self::Protokoll(_) => grund::INVALID_REQUEST.to_string(),
            Self::Io(_) => "internal-error".to_string(),
        }
    }
}

/// Result-Typ fuer den Signaling-Service
pub type SignalingResult<T> = Result<T, SignalingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_grund_fuer_fehlende_felder() {
        assert_eq!(
            SignalingError::FehlenderParameter("userId").client_grund(),
            grund::MISSING_USER_ID
        );
        assert_eq!(
            SignalingError::FehlenderParameter("roomId").client_grund(),
            grund::MISSING_ROOM_ID
        );
    }

    #[test]
    fn client_grund_verraet_keine_interna() {
        let e = SignalingError::from(std::io::Error::other("Socket weg"));
        assert_eq!(e.client_grund(), "internal-error");
        assert!(e.to_string().contains("Socket weg"));
    }
}
