//! # epochlog testkit
//!
//! Test utilities for the epochlog crates.
//!
//! This crate provides:
//! - Temporary log files and seeded payloads
//! - Property-based test generators using proptest
//! - A fault-injecting storage backend and crash recovery checks
//! - A state model that mirrors a state log for verification
//! - Fuzz targets for the reader, rewind and restore
//!
//! ## Usage
//!
//! ```rust,ignore
//! use epochlog_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_log_file() {
//!     with_temp_log(|path| {
//!         let file = StateFile::open(path, &Config::default()).unwrap();
//!         // ... test operations
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod fuzz;
pub mod generators;
pub mod integration;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::fuzz::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
}

pub use crash::*;
pub use fixtures::*;
pub use fuzz::*;
pub use generators::*;
pub use integration::*;
