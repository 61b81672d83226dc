//! Wire-Format fuer TCP-Verbindungen
//!
//! Frame-basiertes Protokoll: Length(u32 big-endian) + JSON-Payload.
//!
//! ## Frame-Format
//!
//! ```text
//! +--------+--------+--------+--------+----...----+
//! | Laenge (u32 BE) | 4 Bytes        | Payload    |
//! +--------+--------+--------+--------+----...----+
//! ```
//!
//! Der Decoder liefert die rohen Payload-Bytes eines Frames. Das JSON wird
//! erst danach mit [`json_dekodieren`] gelesen, damit ein Frame mit
//! unbekanntem Event die Verbindung nicht aus dem Takt bringt.

use bytes::{Buf, BufMut, BytesMut};
use serde::{de::DeserializeOwned, Serialize};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{Decoder, Encoder};

// ---------------------------------------------------------------------------
// Konstanten
// ---------------------------------------------------------------------------

/// Standard-maximale Frame-Groesse (1 MB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Groesse des Laengen-Felds in Bytes
pub const LENGTH_FIELD_SIZE: usize = 4;

// ---------------------------------------------------------------------------
// FrameCodec
// ---------------------------------------------------------------------------

/// tokio-util Codec fuer frame-basierte TCP-Verbindungen
///
/// `Decoder` liefert rohe Frames (`BytesMut`), `Encoder` akzeptiert jeden
/// serialisierbaren Typ (`ServerMessage` auf dem Server, `ClientMessage` im
/// Client bzw. in Tests).
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl FrameCodec {
    /// Erstellt einen neuen `FrameCodec` mit Standard-Limits
    pub fn new() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Erstellt einen `FrameCodec` mit benutzerdefinierter maximaler Frame-Groesse
    pub fn with_max_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

fn zu_gross(laenge: usize, maximum: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("Frame zu gross: {laenge} Bytes (Maximum: {maximum} Bytes)"),
    )
}

/// Serialisiert eine Nachricht und prueft die Groesse
pub fn json_kodieren<T: Serialize>(item: &T, max_frame_size: usize) -> io::Result<Vec<u8>> {
    let json = serde_json::to_vec(item).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("JSON-Serialisierung fehlgeschlagen: {e}"),
        )
    })?;
    if json.len() > max_frame_size {
        return Err(zu_gross(json.len(), max_frame_size));
    }
    Ok(json)
}

/// Dekodiert die Payload eines Frames als JSON
pub fn json_dekodieren<T: DeserializeOwned>(payload: &[u8]) -> io::Result<T> {
    serde_json::from_slice(payload).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("JSON-Deserialisierung fehlgeschlagen: {e}"),
        )
    })
}

// ---------------------------------------------------------------------------
// Decoder-Implementierung
// ---------------------------------------------------------------------------

impl Decoder for FrameCodec {
    type Item = BytesMut;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < LENGTH_FIELD_SIZE {
            return Ok(None);
        }

        // Laenge lesen ohne den Buffer zu veraendern
        let length = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if length > self.max_frame_size {
            return Err(zu_gross(length, self.max_frame_size));
        }

        let total_size = LENGTH_FIELD_SIZE + length;
        if src.len() < total_size {
            src.reserve(total_size - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_FIELD_SIZE);
        Ok(Some(src.split_to(length)))
    }
}

// ---------------------------------------------------------------------------
// Encoder-Implementierung
// ---------------------------------------------------------------------------

impl<T: Serialize> Encoder<T> for FrameCodec {
    type Error = io::Error;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let json = json_kodieren(&item, self.max_frame_size)?;
        dst.reserve(LENGTH_FIELD_SIZE + json.len());
        dst.put_u32(json.len() as u32);
        dst.put_slice(&json);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Hilfsfunktionen fuer direktes async Lesen/Schreiben
// ---------------------------------------------------------------------------

/// Liest einen einzelnen Frame aus einem `AsyncRead` und dekodiert ihn
///
/// # Fehler
/// - `UnexpectedEof` wenn die Verbindung vor Abschluss des Frames getrennt wird
/// - `InvalidData` bei ungueltigem JSON oder zu grossem Frame
pub async fn read_frame<R, T>(reader: &mut R, max_frame_size: usize) -> io::Result<T>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; LENGTH_FIELD_SIZE];
    reader.read_exact(&mut len_buf).await?;
    let length = u32::from_be_bytes(len_buf) as usize;
    if length > max_frame_size {
        return Err(zu_gross(length, max_frame_size));
    }

    let mut payload = vec![0u8; length];
    reader.read_exact(&mut payload).await?;
    json_dekodieren(&payload)
}

/// Schreibt eine Nachricht als einzelnen Frame in einen `AsyncWrite`
pub async fn write_frame<W, T>(writer: &mut W, message: &T, max_frame_size: usize) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let json = json_kodieren(message, max_frame_size)?;
    writer.write_all(&(json.len() as u32).to_be_bytes()).await?;
    writer.write_all(&json).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{ClientMessage, ClientPayload, PingRequest, ServerMessage};

    fn test_ping(ack: u32) -> ClientMessage {
        ClientMessage::new(
            Some(ack),
            ClientPayload::Ping(PingRequest {
                timestamp_ms: 999_888_777,
            }),
        )
    }

    #[test]
    fn unvollstaendiger_frame_wartet_auf_daten() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(test_ping(1), &mut buf).unwrap();

        let half = buf.len() / 2;
        let mut partial = buf.split_to(half);
        assert!(codec.decode(&mut partial).unwrap().is_none());
    }

    #[test]
    fn zu_wenig_bytes_fuer_laengenfeld() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from(&[0x00, 0x00][..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn zu_grosser_frame_wird_abgelehnt() {
        let mut codec = FrameCodec::with_max_size(100);
        let mut buf = BytesMut::new();
        buf.put_u32(200);
        buf.put_slice(&[b'x'; 200]);
        assert!(codec.decode(&mut buf).is_err());
    }

    #[test]
    fn zu_grosse_nachricht_beim_encode() {
        let mut codec = FrameCodec::with_max_size(10);
        let mut buf = BytesMut::new();
        assert!(codec.encode(test_ping(1), &mut buf).is_err());
        assert!(buf.is_empty());
    }

    #[test]
    fn mehrere_frames_im_buffer() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        for i in 0..3u32 {
            codec.encode(test_ping(i), &mut buf).unwrap();
        }
        for i in 0..3u32 {
            let frame = codec.decode(&mut buf).unwrap().expect("Frame erwartet");
            let msg: ClientMessage = json_dekodieren(&frame).unwrap();
            assert_eq!(msg.ack, Some(i));
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn unbekanntes_event_bleibt_im_takt() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        codec
            .encode(serde_json::json!({ "event": "gibts-nicht" }), &mut buf)
            .unwrap();
        codec.encode(test_ping(7), &mut buf).unwrap();

        let erster = codec.decode(&mut buf).unwrap().expect("Frame erwartet");
        assert!(json_dekodieren::<ClientMessage>(&erster).is_err());

        let zweiter = codec.decode(&mut buf).unwrap().expect("Frame erwartet");
        let msg: ClientMessage = json_dekodieren(&zweiter).unwrap();
        assert_eq!(msg.ack, Some(7));
    }

    #[tokio::test]
    async fn async_write_und_read_frame() {
        let original = ServerMessage::error(Some(99), "kaputt");
        let mut buffer: Vec<u8> = Vec::new();
        write_frame(&mut buffer, &original, DEFAULT_MAX_FRAME_SIZE)
            .await
            .unwrap();
        assert!(buffer.len() > LENGTH_FIELD_SIZE);

        let mut cursor = io::Cursor::new(buffer);
        let gelesen: ServerMessage = read_frame(&mut cursor, DEFAULT_MAX_FRAME_SIZE)
            .await
            .unwrap();
        assert_eq!(gelesen, original);
    }

    #[tokio::test]
    async fn async_read_frame_eof() {
        let mut cursor = io::Cursor::new(vec![0x00, 0x00, 0x00, 0x10, b'{']);
        let res: io::Result<ServerMessage> = read_frame(&mut cursor, DEFAULT_MAX_FRAME_SIZE).await;
        assert_eq!(res.unwrap_err().kind(), io::ErrorKind::UnexpectedEof);
    }
}
