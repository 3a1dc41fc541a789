//! # Match Session Client Library
//!
//! A headless participant for the match session server. It connects over
//! TCP, joins the room, flags ready, acknowledges the scene load and keeps a
//! local mirror of everything the server announces.
//!
//! ## Module Organization
//!
//! ### Connection Module (`connection`)
//! Length-delimited TCP framing around `shared::Packet`.
//!
//! ### State Module (`state`)
//! `ClientMatchState`, the local mirror of roster, phase, own role and the
//! final result. Duplicate events are discarded by sequence number.
//!
//! ### Network Module (`network`)
//! The `Client` loop: answers the server's lifecycle packets and sends
//! heartbeats so the connection is not timed out.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::{Client, ClientOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let options = ClientOptions {
//!         nickname: "Wyatt".to_string(),
//!         ..ClientOptions::default()
//!     };
//!     let mut client = Client::new("127.0.0.1:8080", options).await?;
//!
//!     // Play until the match is decided
//!     client.run_until(|state| state.result().is_some()).await?;
//!     if let Some(result) = client.state().result() {
//!         println!("{} win", result.winning_team);
//!     }
//!     Ok(())
//! }
//! ```

pub mod connection;
pub mod network;
pub mod state;
