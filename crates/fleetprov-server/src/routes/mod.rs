// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

pub mod exec;
pub mod health;
pub mod operations;
pub mod provision;
pub mod resources;
