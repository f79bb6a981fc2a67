// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Client library for the Buzz static site hosting service.
//!
//! Buzz turns a local directory into a deployed static site: the directory is
//! packed into a deterministic ZIP, streamed to the server as a multipart
//! upload, and served from a subdomain recorded in a per-project marker file.
//! Operators authenticate through an OAuth device-code flow proxied by the
//! server.
//!
//! The `buzz` binary wires these modules to the terminal; everything here
//! stays free of terminal rendering so the core is testable without one.

pub mod api;
pub mod archive;
pub mod auth;
pub mod config;
pub mod path;
pub mod site;
