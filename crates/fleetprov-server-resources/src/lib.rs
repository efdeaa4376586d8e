// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Ephemeral resources that must outlive a single request.
//!
//! The [`ResourceRegistry`] owns named [`Closable`] objects. The only kind
//! created today is the fake update-origin server, which serves update
//! payloads to a device through a port exposed by the reachability resolver.

pub mod error;
pub mod fake_origin;
pub mod registry;

pub use error::{ResourceError, Result};
pub use fake_origin::{
	build_update_url, create_fake_origin, FakeOrigin, FakeOriginConfig, FakeOriginRequest,
	FakeOriginServer, FAKE_ORIGIN_KIND,
};
pub use registry::{generate_name, Closable, ResourceRegistry};
