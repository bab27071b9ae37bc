#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::return_self_not_must_use)]

//! Core of the hotweb dev server: the build filesystem, the export scanner,
//! and module proxy generation.
//!
//! This crate does no logging and performs no network IO. The server crate
//! wires these pieces to HTTP, websockets, and the filesystem watcher.

pub mod client;
pub mod config;
pub mod error;
pub mod exports;
pub mod makefs;
pub mod proxy;
pub mod transform;

pub use client::render_client;
pub use config::HotwebConfig;
pub use error::{Error, Result};
pub use exports::{exports, LexError};
pub use makefs::{CowStore, DirStore, FileMeta, MakeFs, MemStore, ReadOnlyStore, Store};
pub use proxy::ModuleProxy;
pub use transform::{SwcTransform, Transform, TransformError};
