// Copyright 2025 Benchwatch Contributors
// SPDX-License-Identifier: Apache-2.0

//! Route groups, each exposing `routes()`.

pub mod changes;
pub mod comparison;
pub mod health;
pub mod logs;
pub mod reports;
pub mod results;
pub mod timeline;
