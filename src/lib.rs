//! Pet photo restyling backend
//!
//! Takes a pet photo, sends it to an image generation provider with a prompt
//! built from the caller's choices, stamps a logo on the result and publishes
//! it to Supabase Storage.

#![allow(clippy::multiple_crate_versions)]
#![deny(clippy::all)]
#![deny(clippy::await_holding_lock)]
#![deny(clippy::complexity)]
#![deny(clippy::correctness)]
#![deny(clippy::disallowed_methods)]
#![deny(clippy::expect_used)]
#![deny(clippy::needless_pass_by_value)]
#![deny(clippy::panic)]
#![deny(clippy::perf)]
#![deny(clippy::trivially_copy_pass_by_ref)]
#![deny(clippy::unreachable)]
#![deny(clippy::unwrap_used)]
#![deny(warnings)]
#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::panic))]

pub mod cli;
pub mod config;
pub mod constants;
pub mod error;
pub mod imaging;
pub mod pipeline;
pub mod prompts;
pub mod providers;
pub mod storage;
pub mod web;
