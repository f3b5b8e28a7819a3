//! SnipFrame Edit Model
//!
//! Editing state that the export pipeline consumes:
//! - **Geometry:** Pointer positions mapped into native media pixel space
//! - **Crop:** Drag-to-select rectangle with provisional and committed phases
//! - **Trim:** Ordered `(start, end)` interval kept inside the source duration
//! - **Media:** Source handle and metadata
//! - **Artifact:** The exported byte blob offered to the user
//!
//! All crop coordinates are in native pixels of the loaded source, so the
//! export surface size never depends on how large the preview was drawn.

pub mod artifact;
pub mod crop;
pub mod geometry;
pub mod media;
pub mod trim;

pub use artifact::*;
pub use crop::*;
pub use geometry::*;
pub use media::*;
pub use trim::*;
