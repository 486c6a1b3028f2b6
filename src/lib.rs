//! Exercise route sync from Polar AccessLink and a photo EXIF catalog,
//! kept side by side so routes can later be matched to photos by time.

pub mod accesslink;
pub mod catalog;
pub mod config;
pub mod error;
pub mod logging;
pub mod materialize;
pub mod store;

pub use error::{Error, Result};
