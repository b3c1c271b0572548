//! Catalog of scenes and channels extracted from CZI microscope slides.
//!
//! Each [`SlideCziTif`] row records one scene/channel written out as a TIFF
//! during slide conversion, and belongs to exactly one [`Slide`].

pub mod config;
pub mod error;
pub mod state;

pub use config::CatalogConfig;
pub use error::{CatalogError, Result};
pub use state::catalog::Catalog;
pub use state::data::{NewSlide, NewSlideCziTif, Slide, SlideCziTif};
