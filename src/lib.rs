//! A SOCKS4/5 proxy that tunnels connections through an encrypted relay
//!
//! ## Hikari
//!
//! - Client:
//!     - SOCKS5 CONNECT with no authentication
//!     - SOCKS4 CONNECT
//!     - Optional local DNS resolution of domain targets
//!     - Round-robin over the configured server ports
//! - Server:
//!     - MD5 hashed private keys
//!     - One reactor per listen port
//! - Tunnel:
//!     - Length-prefixed frames protected by CRC32
//!     - plain, rc4 or aes-128-cfb stream ciphers keyed from a shared secret
//! - Single-threaded reactors driving non-blocking sockets with backpressure
//! - [SOCKS5 (RFC 1928)](https://datatracker.ietf.org/doc/html/rfc1928)
//!
//! # Example
//! ```no_run
//! use hikari::{Client, ClientConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = ClientConfig::load("hikari-client.json")?;
//!     let handle = Client::new(&config)?.start()?;
//!     handle.join()
//! }
//! ```

pub mod address;
pub mod auth;
pub mod client;
pub mod codec;
pub mod config;
pub mod context;
pub mod crypto;
pub mod error;
pub mod hikari;
pub mod protocol;
pub mod reactor;
pub mod relay;
pub mod server;
pub mod socks;

// Re-export main types at crate root for convenience
pub use address::TargetAddress;
pub use client::Client;
pub use config::{ClientConfig, ConfigError, ServerConfig};
pub use crypto::{CipherKind, CipherSpec, Endpoint};
pub use error::{CryptoError, FrameError, ProtocolError};
pub use protocol::{Command, HikariReply, ReplyCode, Version};
pub use reactor::{Handler, Reactor, ReactorHandle};
pub use server::Server;
