//! SnipFrame Export Engine
//!
//! Turns an edit (trim interval plus optional crop) into a new clip.
//! The engine validates the request, negotiates an output encoding, and
//! drives a backend through one run while tracking the pipeline state.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                  EditSession                      │
//! │  ┌────────────┐ ┌──────────────┐ ┌─────────────┐ │
//! │  │ Crop       │ │ Trim Range   │ │ Source +    │ │
//! │  │ Selector   │ │ Controller   │ │ Metadata    │ │
//! │  └─────┬──────┘ └──────┬───────┘ └──────┬──────┘ │
//! │        └───────────────┼────────────────┘        │
//! │                        ▼                         │
//! │               ┌─────────────────┐                │
//! │               │ ExportPipeline  │ Idle/Exporting │
//! │               │                 │ /Done/Error    │
//! │               └────────┬────────┘                │
//! └────────────────────────┼─────────────────────────┘
//!                          ▼
//!          ┌───────────────────────────────┐
//!          │ ExportBackend                 │
//!          │  RealtimeBackend (host traits)│
//!          │  FfmpegBackend   (subprocess) │
//!          └───────────────────────────────┘
//! ```

pub mod backend;
pub mod codec;
pub mod host;
pub mod pipeline;
pub mod session;

pub use backend::*;
pub use codec::*;
pub use pipeline::*;
pub use session::*;
