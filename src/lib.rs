//! Interactive mask and crop editor core.
//!
//! A host UI opens an [`EditSession`] with an optional image and mask,
//! forwards pointer events and tool changes, draws [`EditSession::visible`]
//! or [`EditSession::render_resize_preview`], and finally commits or
//! cancels.

#[macro_use]
pub mod logger;
pub mod canvas;
pub mod components;
pub mod error;
pub mod io;
pub mod ops;
pub mod session;
pub mod settings;

pub use canvas::{to_raster_position, Dimensions, PaintSurface, Position};
pub use components::history::{HistoryManager, MaskSnapshot};
pub use components::tools::{BrushState, PenType, StrokeEngine};
pub use error::EditorError;
pub use ops::transform::{CropOffset, Interpolation, ResizeEditor, ResizeMode, ResizePlan};
pub use session::{
    CommitError, CommitOutput, EditPreferences, EditSession, EditorInput, EditorTab, MaskType,
    PointerListenerGuard,
};
pub use settings::EditorSettings;
