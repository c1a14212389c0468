use egui::{Pos2, Rect};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use crate::canvas::{to_raster_position, Dimensions, PaintSurface, SurfaceKind};
use crate::components::history::{HistoryManager, MaskSnapshot};
use crate::components::tools::{BrushState, PenType, StrokeEngine, StrokeEvent};
use crate::error::EditorError;
use crate::io::{encode_png, ImageLoader};
use crate::ops::transform::{
    commit_pair, render_crop_preview, render_stretch_preview, ResizeEditor, ResizeMode,
};
use crate::settings::EditorSettings;

/// What the downstream generator should do with the masked area.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MaskType {
    /// Regenerate the masked sections.
    #[default]
    ReplaceMasked,
    /// Keep the masked sections and regenerate the rest.
    KeepMasked,
}

/// Preferences the caller hands in and gets echoed back on commit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EditPreferences {
    pub mask_type: MaskType,
    pub resize_mode: ResizeMode,
}

/// Everything needed to open an editor.
#[derive(Clone, Debug, Default)]
pub struct EditorInput {
    pub image: Option<Vec<u8>>,
    pub mask: Option<Vec<u8>>,
    pub mask_type: MaskType,
    /// `None` uses [`EditorSettings::default_resize_mode`].
    pub resize_mode: Option<ResizeMode>,
}

/// Result of a successful commit: two PNG rasters of identical size.
#[derive(Clone, Debug)]
pub struct CommitOutput {
    pub image: Vec<u8>,
    pub mask: Vec<u8>,
    pub dimensions: Dimensions,
    pub preferences: EditPreferences,
}

// ============================================================================
// POINTER LISTENER SCOPE
// ============================================================================

/// Holds the host's document-level pointer subscription for as long as the
/// editor is open.  The release callback runs exactly once: on
/// [`PointerListenerGuard::release`] or on drop, whichever comes first.
pub struct PointerListenerGuard {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl PointerListenerGuard {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// A guard with nothing to release, for hosts without global listeners.
    pub fn none() -> Self {
        Self { release: None }
    }

    pub fn is_active(&self) -> bool {
        self.release.is_some()
    }

    pub fn release(&mut self) {
        if let Some(release) = self.release.take() {
            release();
            log_info!("Pointer listeners released");
        }
    }
}

impl Drop for PointerListenerGuard {
    fn drop(&mut self) {
        self.release();
    }
}

// ============================================================================
// EDIT SESSION
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum EditorTab {
    #[default]
    Mask,
    Resize,
}

/// A failed commit hands the session back so the user can retry or cancel.
pub struct CommitError {
    pub error: EditorError,
    pub session: Box<EditSession>,
}

impl fmt::Debug for CommitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommitError")
            .field("error", &self.error)
            .field("session", &self.session.id)
            .finish()
    }
}

impl fmt::Display for CommitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.error.fmt(f)
    }
}

impl std::error::Error for CommitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// One open editor.  Owns the surfaces, the stroke engine, the history and
/// the resize state; consumed by [`EditSession::commit`] or
/// [`EditSession::cancel`].
///
/// Pointer events carry the displayed bounds of whichever surface is visible
/// (`None` while it is not laid out yet, in which case the event is skipped)
/// and the pointer's screen position.
pub struct EditSession {
    id: Uuid,
    settings: EditorSettings,
    loader: ImageLoader,
    surface: PaintSurface,
    strokes: StrokeEngine,
    history: HistoryManager,
    resize: ResizeEditor,
    mask_type: MaskType,
    tab: EditorTab,
    listeners: PointerListenerGuard,
}

impl EditSession {
    /// Start decoding the inputs and return immediately.  Call
    /// [`EditSession::poll`] from the frame loop until loading finishes.
    pub fn open(input: EditorInput, settings: EditorSettings, listeners: PointerListenerGuard) -> Self {
        let id = Uuid::new_v4();
        let loader = ImageLoader::new(settings.decode_timeout());
        let mut surface = PaintSurface::new(settings.mask_opacity);
        surface.set_loading(SurfaceKind::Base, loader.load(input.image));
        surface.set_loading(SurfaceKind::Mask, loader.load(input.mask));

        let brush = BrushState {
            pen: PenType::Paint,
            diameter: settings.default_brush_diameter,
        };
        log_info!("Opened edit session {}", id);
        Self {
            id,
            strokes: StrokeEngine::new(brush, settings.brush_range()),
            history: HistoryManager::new(settings.history_capacity, MaskSnapshot::Empty),
            resize: ResizeEditor::new(input.resize_mode.unwrap_or(settings.default_resize_mode)),
            mask_type: input.mask_type,
            tab: EditorTab::Mask,
            loader,
            surface,
            settings,
            listeners,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn settings(&self) -> &EditorSettings {
        &self.settings
    }

    pub fn surface(&self) -> &PaintSurface {
        &self.surface
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    pub fn resize(&self) -> &ResizeEditor {
        &self.resize
    }

    pub fn is_loading(&self) -> bool {
        self.surface.is_loading()
    }

    /// Advance pending decodes.  Once the last one finishes, the resize
    /// target adopts the loaded size and history restarts from the loaded
    /// mask.  Returns the load failures seen by this poll.
    pub fn poll(&mut self) -> Vec<EditorError> {
        let report = self.surface.poll_loads();
        let mut errors: Vec<EditorError> = report.failures.into_iter().map(|(_, e)| e).collect();

        if report.settled {
            let dims = self.surface.dimensions();
            self.resize.set_source(dims);
            let initial = match self.surface.mask_image() {
                Some(mask) => MaskSnapshot::capture(mask).unwrap_or_else(|e| {
                    log_err!("Could not snapshot initial mask: {}", e);
                    errors.push(e);
                    MaskSnapshot::Empty
                }),
                None => MaskSnapshot::Empty,
            };
            self.history = HistoryManager::new(self.settings.history_capacity, initial);
            log_info!(
                "Session {} ready at {}×{}",
                self.id,
                dims.width,
                dims.height
            );
        }
        errors
    }

    /// Block until every pending decode has finished or timed out.
    pub fn finish_loading(&mut self) -> Vec<EditorError> {
        let mut errors = self.poll();
        while self.surface.is_loading() {
            std::thread::sleep(Duration::from_millis(2));
            errors.extend(self.poll());
        }
        errors
    }

    /// Replace the base image, e.g. after a failed decode.
    pub fn load_image(&mut self, blob: Option<Vec<u8>>) {
        self.strokes.cancel();
        self.resize.cancel_drag();
        self.surface.set_loading(SurfaceKind::Base, self.loader.load(blob));
    }

    // ------------------------------------------------------------------------
    // Pointer input
    // ------------------------------------------------------------------------

    pub fn pointer_down(&mut self, bounds: Option<Rect>, screen: Pos2) {
        let Some(bounds) = bounds else { return };
        match self.tab {
            EditorTab::Mask => {
                let pos = to_raster_position(bounds, self.surface.dimensions(), screen);
                self.strokes.pointer_down(&mut self.surface, pos);
            }
            EditorTab::Resize => {
                let pos = to_raster_position(bounds, self.resize.preview_dimensions(), screen);
                self.resize.begin_drag(pos);
            }
        }
    }

    /// `primary_down` is the button state reported with the move; a release
    /// outside the surface shows up here as `false`.
    pub fn pointer_move(
        &mut self,
        bounds: Option<Rect>,
        screen: Pos2,
        primary_down: bool,
    ) -> Result<(), EditorError> {
        let Some(bounds) = bounds else { return Ok(()) };
        match self.tab {
            EditorTab::Mask => {
                let pos = to_raster_position(bounds, self.surface.dimensions(), screen);
                if let Some(event) = self.strokes.pointer_move(&mut self.surface, pos, primary_down) {
                    self.record_stroke(event)?;
                }
            }
            EditorTab::Resize => {
                if self.resize.is_dragging() {
                    let pos = to_raster_position(bounds, self.resize.preview_dimensions(), screen);
                    self.resize.drag_to(pos);
                    if !primary_down {
                        self.resize.end_drag();
                    }
                }
            }
        }
        Ok(())
    }

    /// Ends the stroke or drag even when `bounds` is unavailable.
    pub fn pointer_up(&mut self, bounds: Option<Rect>, screen: Pos2) -> Result<(), EditorError> {
        match self.tab {
            EditorTab::Mask => {
                if let Some(event) = self.strokes.pointer_up(&mut self.surface) {
                    self.record_stroke(event)?;
                }
            }
            EditorTab::Resize => {
                if let Some(bounds) = bounds.filter(|_| self.resize.is_dragging()) {
                    let pos = to_raster_position(bounds, self.resize.preview_dimensions(), screen);
                    self.resize.drag_to(pos);
                }
                self.resize.end_drag();
            }
        }
        Ok(())
    }

    /// The pointer left the mask surface.  A crop drag keeps going since it
    /// is tracked by the document-level listeners.
    pub fn pointer_leave(&mut self) -> Result<(), EditorError> {
        if self.tab == EditorTab::Mask {
            if let Some(event) = self.strokes.pointer_leave(&mut self.surface) {
                self.record_stroke(event)?;
            }
        }
        Ok(())
    }

    fn record_stroke(&mut self, event: StrokeEvent) -> Result<(), EditorError> {
        let Some(mask) = self.surface.mask_image() else { return Ok(()) };
        let snapshot = MaskSnapshot::capture(mask).map_err(|e| {
            log_err!("Could not snapshot mask after stroke: {}", e);
            e
        })?;
        self.history.push(snapshot, event.description);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Brush
    // ------------------------------------------------------------------------

    pub fn brush(&self) -> BrushState {
        self.strokes.brush()
    }

    pub fn set_pen(&mut self, pen: PenType) {
        self.strokes.set_pen(pen);
    }

    pub fn set_brush_diameter(&mut self, diameter: f32) {
        self.strokes.set_diameter(diameter);
    }

    // ------------------------------------------------------------------------
    // History
    // ------------------------------------------------------------------------

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Step back one state.  The target state is decoded first; if that
    /// fails the timeline and the mask are left as they were.
    ///
    /// # Panics
    /// If [`EditSession::can_undo`] is false.
    pub fn undo(&mut self) -> Result<(), EditorError> {
        self.strokes.cancel();
        let image = match self.history.peek_undo() {
            Some(snapshot) => self.decode_snapshot(snapshot)?,
            None => panic!("undo called with nothing to undo"),
        };
        self.history.undo();
        self.show_mask(image);
        Ok(())
    }

    /// # Panics
    /// If [`EditSession::can_redo`] is false.
    pub fn redo(&mut self) -> Result<(), EditorError> {
        self.strokes.cancel();
        let image = match self.history.peek_redo() {
            Some(snapshot) => self.decode_snapshot(snapshot)?,
            None => panic!("redo called with nothing to redo"),
        };
        self.history.redo();
        self.show_mask(image);
        Ok(())
    }

    /// Empty the mask as an undoable step.  Ignored while the mask cannot be
    /// painted.
    pub fn clear_mask(&mut self) {
        if !self.surface.is_paintable() {
            return;
        }
        self.strokes.cancel();
        self.history.clear();
        let dims = self.surface.dimensions();
        self.surface.replace_mask(RgbaImage::new(dims.width, dims.height));
        self.surface.recomposite();
    }

    fn decode_snapshot(&self, snapshot: &MaskSnapshot) -> Result<RgbaImage, EditorError> {
        snapshot.decode(self.surface.dimensions()).map_err(|e| {
            log_err!("Could not restore mask state: {}", e);
            e
        })
    }

    fn show_mask(&mut self, image: RgbaImage) {
        self.surface.replace_mask(image);
        self.surface.recomposite();
    }

    // ------------------------------------------------------------------------
    // Tabs, resize and preferences
    // ------------------------------------------------------------------------

    pub fn tab(&self) -> EditorTab {
        self.tab
    }

    /// Switching away from the mask tab ends any stroke and hides the cursor.
    pub fn set_tab(&mut self, tab: EditorTab) -> Result<(), EditorError> {
        if tab == self.tab {
            return Ok(());
        }
        match self.tab {
            EditorTab::Mask => {
                if let Some(event) = self.strokes.pointer_leave(&mut self.surface) {
                    self.record_stroke(event)?;
                }
            }
            EditorTab::Resize => self.resize.cancel_drag(),
        }
        self.tab = tab;
        Ok(())
    }

    pub fn set_resize_mode(&mut self, mode: ResizeMode) {
        self.resize.set_mode(mode);
    }

    pub fn set_target_width(&mut self, width: u32) -> Result<(), EditorError> {
        self.resize.set_width(width)
    }

    pub fn set_target_height(&mut self, height: u32) -> Result<(), EditorError> {
        self.resize.set_height(height)
    }

    pub fn mask_type(&self) -> MaskType {
        self.mask_type
    }

    pub fn set_mask_type(&mut self, mask_type: MaskType) {
        self.mask_type = mask_type;
    }

    pub fn preferences(&self) -> EditPreferences {
        EditPreferences {
            mask_type: self.mask_type,
            resize_mode: self.resize.mode(),
        }
    }

    /// The mask tab's composite.
    pub fn visible(&self) -> &RgbaImage {
        self.surface.output()
    }

    /// The resize tab's preview, or `None` before anything has loaded.
    ///
    /// Crop mode shows the base image alone (the composite when there is no
    /// base image); stretch mode shows the image with its mask tint.
    pub fn render_resize_preview(&self) -> Option<RgbaImage> {
        if self.surface.dimensions().is_placeholder() {
            return None;
        }
        Some(match self.resize.mode() {
            ResizeMode::Crop => {
                let source = self.surface.base_image().unwrap_or(self.surface.output());
                render_crop_preview(source, self.resize.live_window())
            }
            ResizeMode::Stretch => render_stretch_preview(
                self.surface.output(),
                self.resize.target(),
                self.settings.stretch_filter,
            ),
        })
    }

    // ------------------------------------------------------------------------
    // Exit paths
    // ------------------------------------------------------------------------

    fn render_commit(&self) -> Result<CommitOutput, EditorError> {
        let plan = self.resize.plan();
        let (image, mask) = commit_pair(
            self.surface.base_image(),
            self.surface.mask_image(),
            &plan,
            self.settings.stretch_filter,
        )?;
        Ok(CommitOutput {
            image: encode_png(&image)?,
            mask: encode_png(&mask)?,
            dimensions: plan.target,
            preferences: self.preferences(),
        })
    }

    /// Produce the final image and mask.  On failure the session comes back
    /// inside the error, still open.
    pub fn commit(mut self) -> Result<CommitOutput, CommitError> {
        self.strokes.cancel();
        self.resize.cancel_drag();
        match self.render_commit() {
            Ok(output) => {
                log_info!(
                    "Session {} committed {}×{} ({} + {} bytes)",
                    self.id,
                    output.dimensions.width,
                    output.dimensions.height,
                    output.image.len(),
                    output.mask.len()
                );
                self.listeners.release();
                Ok(output)
            }
            Err(error) => {
                log_err!("Session {} commit failed: {}", self.id, error);
                Err(CommitError {
                    error,
                    session: Box::new(self),
                })
            }
        }
    }

    /// Discard the session and everything in it.
    pub fn cancel(mut self) {
        log_info!("Session {} cancelled", self.id);
        self.listeners.release();
    }
}
