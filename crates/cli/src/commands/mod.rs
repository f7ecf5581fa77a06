// SPDX-License-Identifier: MIT

pub mod adapters;
pub mod cost;
pub mod plan;
pub mod signal;
pub mod start;
