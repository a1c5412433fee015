//! Core types shared by the rpzd crates.
//!
//! This crate holds the plain data types the policy server is built from:
//!
//! - **Policy**: [`PolicyAction`] and its RPZ CNAME encoding, [`TagMask`]
//! - **Sources**: [`ListType`], [`SourceFormat`], [`TaggedName`]
//! - **Feed**: [`IntelBatch`] updates from the threat-intelligence feed
//! - **Control**: [`CommandRequest`] / [`CommandResponse`]
//! - **Errors**: [`CoreError`] for malformed input
//!
//! # Example
//!
//! ```rust
//! use rpz_core::{PolicyAction, TagMask};
//!
//! let action: PolicyAction = "nxdomain".parse().unwrap();
//! assert_eq!(action.rpz_target(), Some("."));
//! assert_eq!(TagMask::from_names(["newname", "badip"]).unwrap().count(), 2);
//! ```

mod error;
pub mod types;

pub use error::{CoreError, Result};
pub use types::*;
