/// Record types stored in the catalog
///
/// These structs are the row shapes of `slide` and `slide_czi_to_tif`.
/// The `New*` variants carry only what a caller supplies; ids and
/// creation times are assigned by the catalog.

use serde::{Deserialize, Serialize};

/// A source microscope slide (the original CZI file)
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Slide {
    pub id: i64,
    /// Original file name, e.g. "DK39_slide042.czi"
    pub file_name: String,
    pub active: bool,
    /// Unix seconds (UTC)
    pub created: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NewSlide {
    pub file_name: String,
}

impl NewSlide {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
        }
    }
}

/// One scene/channel extracted from a slide and written out as a TIFF
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SlideCziTif {
    /// Assigned by the catalog, never changes
    pub id: i64,
    /// Owning slide
    pub slide_id: i64,
    pub scene_number: Option<i64>,
    pub channel: Option<i64>,
    /// Pixel width
    pub width: Option<i64>,
    /// Pixel height
    pub height: Option<i64>,
    /// Derived output file, e.g. "slide1_scene3_ch0.tif"
    pub file_name: Option<String>,
    /// Size of the derived file in bytes
    pub file_size: Option<f64>,
    pub comments: Option<String>,
    pub active: bool,
    /// Unix seconds (UTC)
    pub created: i64,
}

/// Fields supplied when recording a new extraction. Only `slide_id` is required.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct NewSlideCziTif {
    pub slide_id: i64,
    pub scene_number: Option<i64>,
    pub channel: Option<i64>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub file_name: Option<String>,
    pub file_size: Option<f64>,
    pub comments: Option<String>,
}

impl NewSlideCziTif {
    pub fn for_slide(slide_id: i64) -> Self {
        Self {
            slide_id,
            ..Self::default()
        }
    }
}
