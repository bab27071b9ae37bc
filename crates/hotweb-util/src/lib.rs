#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Shared utilities for hotweb.
//!
//! Pure helpers with no logging: virtual path handling and atomic file writes.

pub mod fs;
pub mod path;
