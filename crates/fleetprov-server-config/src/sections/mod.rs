// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

mod exec;
mod fake_origin;
mod http;
mod logging;
mod operations;
mod provision;
mod ssh;
mod wiring;

pub use exec::{ExecConfig, ExecConfigLayer};
pub use fake_origin::{FakeOriginConfig, FakeOriginConfigLayer};
pub use http::{HttpConfig, HttpConfigLayer};
pub use logging::{LogFormat, LoggingConfig, LoggingConfigLayer};
pub use operations::{OperationsConfig, OperationsConfigLayer};
pub use provision::{ProvisionConfig, ProvisionConfigLayer};
pub use ssh::{SshConfig, SshConfigLayer};
pub use wiring::{WiringConfig, WiringConfigLayer};
