//! treffpunkt-protocol – Netzwerkprotokoll-Definitionen
//!
//! Dieses Crate definiert alle Events die zwischen Client und Server
//! ausgetauscht werden sowie das Frame-Format der TCP-Verbindung.

pub mod control;
pub mod wire;

pub use control::{ClientMessage, ClientPayload, ServerMessage, ServerPayload};
pub use wire::FrameCodec;
