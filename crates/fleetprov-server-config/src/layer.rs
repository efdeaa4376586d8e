// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Partial configuration produced by a single source.

use serde::{Deserialize, Serialize};

use crate::sections::{
	ExecConfigLayer, FakeOriginConfigLayer, HttpConfigLayer, LoggingConfigLayer,
	OperationsConfigLayer, ProvisionConfigLayer, SshConfigLayer, WiringConfigLayer,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ServerConfigLayer {
	#[serde(default)]
	pub http: Option<HttpConfigLayer>,
	#[serde(default)]
	pub ssh: Option<SshConfigLayer>,
	#[serde(default)]
	pub provision: Option<ProvisionConfigLayer>,
	#[serde(default)]
	pub operations: Option<OperationsConfigLayer>,
	#[serde(default)]
	pub wiring: Option<WiringConfigLayer>,
	#[serde(default)]
	pub fake_origin: Option<FakeOriginConfigLayer>,
	#[serde(default)]
	pub exec: Option<ExecConfigLayer>,
	#[serde(default)]
	pub logging: Option<LoggingConfigLayer>,
}

fn merge_section<T>(base: &mut Option<T>, other: Option<T>, merge: impl FnOnce(&mut T, T)) {
	match (base.as_mut(), other) {
		(Some(b), Some(o)) => merge(b, o),
		(None, Some(o)) => *base = Some(o),
		(_, None) => {}
	}
}

impl ServerConfigLayer {
	/// Overlay `other` on top of `self`; set fields in `other` win.
	pub fn merge(&mut self, other: Self) {
		merge_section(&mut self.http, other.http, HttpConfigLayer::merge);
		merge_section(&mut self.ssh, other.ssh, SshConfigLayer::merge);
		merge_section(&mut self.provision, other.provision, ProvisionConfigLayer::merge);
		merge_section(&mut self.operations, other.operations, OperationsConfigLayer::merge);
		merge_section(&mut self.wiring, other.wiring, WiringConfigLayer::merge);
		merge_section(&mut self.fake_origin, other.fake_origin, FakeOriginConfigLayer::merge);
		merge_section(&mut self.exec, other.exec, ExecConfigLayer::merge);
		merge_section(&mut self.logging, other.logging, LoggingConfigLayer::merge);
	}
}
