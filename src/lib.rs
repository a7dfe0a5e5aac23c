//! # emberkv
//!
//! An in-memory key-value store speaking a Redis-style request/reply
//! protocol over TCP.
//!
//! Values are strings, integers, hashes or sorted sets, spread over sixteen
//! numbered databases, with per-key expiration. Every successful write is
//! recorded in an append-only log that is replayed on startup.

pub mod command;
pub mod config;
pub mod connection;
pub mod error;
pub mod persistence;
pub mod resp;
pub mod server;
pub mod store;
pub mod types;
