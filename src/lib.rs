// SPDX-License-Identifier: Apache-2.0

//! Micropub publishing endpoint
//!
//! This crate implements a [Micropub](https://www.w3.org/TR/micropub/)
//! server for a statically generated blog whose source of record is a
//! GitLab repository:
//!
//! - IndieAuth bearer-token verification against a token endpoint
//! - JSON, form-urlencoded and multipart request normalization
//! - Create/update/delete of markdown posts with YAML-like front-matter
//! - A media endpoint with a MIME allow-list and size cap
//!
//! Every component returns a result value; the HTTP layer in [`handlers`]
//! is the only place errors become status codes.

pub mod auth;
pub mod codec;
pub mod config;
pub mod entry;
pub mod error;
pub mod handlers;
pub mod media;
pub mod patch;
pub mod store;

pub use config::Config;
pub use entry::{Action, CanonicalEntry, PropertyValue};
pub use error::MicropubError;
