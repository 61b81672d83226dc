//! Handler fuer alle Client-Events
//!
//! Jeder Handler ist fuer eine Gruppe von Events zustaendig und hat Zugriff
//! auf den gemeinsamen SignalingState.

pub mod room_handler;
pub mod session_handler;
pub mod signal_handler;
