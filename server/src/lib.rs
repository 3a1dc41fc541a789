//! # Match Session Server Library
//!
//! This library provides the authoritative coordinator for a hidden-role
//! match. It owns the roster and the match phase, hands out secret roles once
//! every client has loaded the match scene, watches deaths and disconnects,
//! and declares a single winning team.
//!
//! ## Core Responsibilities
//!
//! ### Session Authority
//! All session decisions happen here. Clients send intents (join, ready,
//! scene loaded) and receive sequenced events; they never decide anything
//! about the roster, the phase or the outcome.
//!
//! ### Role Secrecy
//! Each player learns only its own role through a targeted `YourRole` packet.
//! Everyone else sees only that roles were assigned. Roles are revealed to
//! the whole room in the `MatchEnded` event.
//!
//! ### Exactly-Once Announcements
//! Match starting, roles assigned, match initialized and match ended are
//! each broadcast at most once per session, no matter how many triggers race
//! to produce them.
//!
//! ## Architecture Design
//!
//! ### Single-Writer Event Loop
//! Socket tasks, the heartbeat checker and in-process collaborators all feed
//! one channel. The server loop drains it one message at a time and applies
//! each message to the `MatchCoordinator` through `&mut self`. Two deaths
//! processed back to back can never both end the match.
//!
//! ### TCP-Based Communication
//! Uses TCP with length-delimited frames. Every packet is a bincode-encoded
//! `shared::Packet`. Delivery is ordered per connection, which keeps the
//! event sequence readable on the client side.
//!
//! ## Module Organization
//!
//! - `coordinator`: the session itself and its configuration
//! - `registry`: players, stable indices, health and roles
//! - `state_machine`: Waiting, Starting, InProgress, Ended
//! - `barrier`: scene-load acknowledgements before roles are dealt
//! - `roles`: role table and shuffling
//! - `win`: win-condition evaluation
//! - `broadcast`: sequenced outbound events
//! - `lobby`: room-level ready flags
//! - `client_manager`: open TCP connections and heartbeats
//! - `network`: the TCP server, its tasks and the collaborator handle
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::coordinator::SessionConfig;
//! use server::network::{Server, ServerOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let mut server = Server::new(
//!         "127.0.0.1:8080",
//!         SessionConfig::default(),
//!         ServerOptions::default(),
//!     )
//!     .await?;
//!
//!     // Damage and cutscene systems report through the handle
//!     let handle = server.handle();
//!     tokio::spawn(async move {
//!         handle.notify_damage(1, 40.0);
//!     });
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod barrier;
pub mod broadcast;
pub mod client_manager;
pub mod coordinator;
pub mod error;
pub mod lobby;
pub mod network;
pub mod registry;
pub mod roles;
pub mod state_machine;
pub mod win;
