// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Device reachability for fleetprov.
//!
//! Devices are addressed by logical name. The [`Resolver`] trait turns a
//! logical name into a concrete `host:port`, exposes ports bound on this host
//! to a device, and wraps storage URLs so the device downloads through the
//! fleet-local artifact cache.
//!
//! Two implementations are provided:
//! - [`HttpWiringClient`]: talks to the lab wiring service over HTTP
//! - [`StaticResolver`]: a fixed host map for small labs and tests

pub mod error;
pub mod http;
pub mod resolver;
pub mod static_map;

pub use error::{Result, WiringError};
pub use http::HttpWiringClient;
pub use resolver::{annotate_cache_url, CacheAnnotations, ExposedPort, Resolver};
pub use static_map::StaticResolver;
