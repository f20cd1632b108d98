// SPDX-License-Identifier: MIT OR Apache-2.0

//! Subcommand implementations

pub mod ask;
pub mod index;
