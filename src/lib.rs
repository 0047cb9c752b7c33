// Copyright 2026 Revharvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Revharvest library: browser-driven review acquisition engine.
//!
//! Drives a persistent Chromium session through product search,
//! disambiguation, paginated listing traversal with anti-bot challenge
//! detection, and per-source field extraction for G2 and Capterra,
//! normalizing everything into one canonical review record.

pub mod challenge;
pub mod daterange;
pub mod engine;
pub mod error;
pub mod export;
pub mod model;
pub mod normalize;
pub mod resolve;
pub mod session;
pub mod source;
pub mod walker;
