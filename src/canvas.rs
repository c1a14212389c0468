use egui::{Pos2, Rect};
use image::{imageops, Rgba, RgbaImage};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::EditorError;
use crate::io::{LoadPoll, PendingLoad};

/// Opacity of the mask tint drawn over the base image.
pub const DEFAULT_MASK_OPACITY: f32 = 0.7;

/// Colour written into the mask wherever the user paints.
pub const MASK_INK: Rgba<u8> = Rgba([0, 0, 0, 255]);

const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Cursor ring interior: black at 25% alpha.
const CURSOR_FILL: Rgba<u8> = Rgba([0, 0, 0, 64]);
const CURSOR_RING: Rgba<u8> = Rgba([0, 0, 0, 255]);
const CURSOR_RING_WIDTH: f32 = 2.0;

/// Pixel coordinates in the editor's raster space (not screen space).
pub type Position = Pos2;

// ============================================================================
// DIMENSIONS
// ============================================================================

/// Raster size shared by the base image, the mask and every working surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    /// Stand-in size used before any content has loaded.  Never a real size.
    pub const PLACEHOLDER: Dimensions = Dimensions { width: 1, height: 1 };

    pub fn new(width: u32, height: u32) -> Result<Self, EditorError> {
        if width == 0 || height == 0 {
            return Err(EditorError::InvalidDimensions { width, height });
        }
        Ok(Self { width, height })
    }

    pub fn of(image: &RgbaImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        *self == Self::PLACEHOLDER
    }

    /// True if `pos` lies inside `[0, width] × [0, height]`.  The far edges
    /// count: a pointer on the displayed edge maps to exactly `width` or
    /// `height`, which [`pixel_index`] puts on the last column or row.
    pub fn contains(&self, pos: Position) -> bool {
        pos.x >= 0.0 && pos.y >= 0.0 && pos.x <= self.width as f32 && pos.y <= self.height as f32
    }
}

// ============================================================================
// COORDINATE MAPPING
// ============================================================================

/// Map a pointer position in screen space onto the backing raster of a
/// displayed surface element.
///
/// Horizontal and vertical scale factors are independent
/// (`backing / displayed`), so letterboxed or stretched elements map
/// correctly.  The product is taken before the division so pointer offsets
/// that land on exact fractions of the element map to exact pixels.
///
/// # Panics
/// If `bounds` has no displayed area.  Callers must not map events for a
/// surface that is not attached and sized yet; they skip the event instead.
pub fn to_raster_position(bounds: Rect, backing: Dimensions, pointer: Pos2) -> Position {
    assert!(
        bounds.width() > 0.0 && bounds.height() > 0.0,
        "surface element has no displayed size: {:?}",
        bounds
    );
    let dx = (pointer.x - bounds.min.x) as f64;
    let dy = (pointer.y - bounds.min.y) as f64;
    let x = dx * backing.width as f64 / bounds.width() as f64;
    let y = dy * backing.height as f64 / bounds.height() as f64;
    Pos2::new(x as f32, y as f32)
}

/// Pixel containing `pos`, clamped into the raster so a pointer on the far
/// displayed edge lands on the last row/column rather than past it.
pub fn pixel_index(pos: Position, dims: Dimensions) -> (u32, u32) {
    let max_x = dims.width.saturating_sub(1) as f32;
    let max_y = dims.height.saturating_sub(1) as f32;
    (
        pos.x.floor().clamp(0.0, max_x) as u32,
        pos.y.floor().clamp(0.0, max_y) as u32,
    )
}

// ============================================================================
// BLENDING
// ============================================================================

/// Non-premultiplied `source-over` of `top` onto `base`, with `top`'s alpha
/// scaled by `opacity`.
pub fn blend_over(base: Rgba<u8>, top: Rgba<u8>, opacity: f32) -> Rgba<u8> {
    if top[3] == 0 || opacity <= 0.0 {
        return base;
    }
    if opacity >= 1.0 && top[3] == 255 {
        return top;
    }

    let top_a = (top[3] as f32 / 255.0) * opacity.clamp(0.0, 1.0);
    let base_a = base[3] as f32 / 255.0;
    let out_a = top_a + base_a * (1.0 - top_a);
    if out_a <= 0.0 {
        return TRANSPARENT;
    }

    let channel = |i: usize| {
        let v = (top[i] as f32 * top_a + base[i] as f32 * base_a * (1.0 - top_a)) / out_a;
        v.round().clamp(0.0, 255.0) as u8
    };
    Rgba([
        channel(0),
        channel(1),
        channel(2),
        (out_a * 255.0).round().clamp(0.0, 255.0) as u8,
    ])
}

/// How a brush shape is composited into the mask.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MaskOp {
    /// Draw `ink` on top of existing coverage.
    SourceOver(Rgba<u8>),
    /// Remove coverage wherever the shape is (`destination-out` with an
    /// opaque source).
    DestinationOut,
}

impl MaskOp {
    fn apply(self, dst: Rgba<u8>) -> Rgba<u8> {
        match self {
            MaskOp::SourceOver(ink) => blend_over(dst, ink, 1.0),
            MaskOp::DestinationOut => TRANSPARENT,
        }
    }
}

// ============================================================================
// BRUSH SHAPES
// ============================================================================

/// A hard-edged shape stamped into the mask.  A pixel is covered when its
/// centre lies within `radius` of the shape's spine.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BrushShape {
    /// Filled circle, used for taps.
    Disc { center: Position, radius: f32 },
    /// Round-capped line segment, used between consecutive drag samples.
    Capsule { from: Position, to: Position, radius: f32 },
}

impl BrushShape {
    fn radius(&self) -> f32 {
        match self {
            BrushShape::Disc { radius, .. } | BrushShape::Capsule { radius, .. } => *radius,
        }
    }

    /// (min_x, min_y, max_x, max_y) in raster units, unclamped.
    fn bounds(&self) -> (f32, f32, f32, f32) {
        let r = self.radius();
        match self {
            BrushShape::Disc { center, .. } => {
                (center.x - r, center.y - r, center.x + r, center.y + r)
            }
            BrushShape::Capsule { from, to, .. } => (
                from.x.min(to.x) - r,
                from.y.min(to.y) - r,
                from.x.max(to.x) + r,
                from.y.max(to.y) + r,
            ),
        }
    }

    fn covers(&self, p: Pos2) -> bool {
        let r = self.radius();
        match self {
            BrushShape::Disc { center, .. } => (p - *center).length_sq() <= r * r,
            BrushShape::Capsule { from, to, .. } => distance_sq_to_segment(p, *from, *to) <= r * r,
        }
    }
}

fn distance_sq_to_segment(p: Pos2, a: Pos2, b: Pos2) -> f32 {
    let ab = b - a;
    let len_sq = ab.length_sq();
    if len_sq <= f32::EPSILON {
        return (p - a).length_sq();
    }
    let t = ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    (p - (a + ab * t)).length_sq()
}

/// Pixel range `[lo, hi)` touched by a shape spanning `[min, max]`.
fn pixel_span(min: f32, max: f32, limit: u32) -> (u32, u32) {
    let lo = min.floor().max(0.0) as u32;
    let hi = (max.ceil().max(0.0) as u32).min(limit);
    (lo.min(limit), hi)
}

fn stamp_into(image: &mut RgbaImage, shape: BrushShape, op: MaskOp) -> bool {
    let (min_x, min_y, max_x, max_y) = shape.bounds();
    let (x0, x1) = pixel_span(min_x, max_x, image.width());
    let (y0, y1) = pixel_span(min_y, max_y, image.height());
    let mut touched = false;
    for y in y0..y1 {
        for x in x0..x1 {
            let centre = Pos2::new(x as f32 + 0.5, y as f32 + 0.5);
            if shape.covers(centre) {
                let px = image.get_pixel_mut(x, y);
                *px = op.apply(*px);
                touched = true;
            }
        }
    }
    touched
}

// ============================================================================
// SURFACE STATE
// ============================================================================

/// Lifecycle of one loadable raster.
pub enum SurfaceState {
    /// No content: nothing was supplied, or decoding failed.
    Empty,
    /// A decode is in flight.
    Loading(PendingLoad),
    /// Decoded pixels.
    Ready(RgbaImage),
}

impl SurfaceState {
    pub fn is_loading(&self) -> bool {
        matches!(self, SurfaceState::Loading(_))
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, SurfaceState::Ready(_))
    }

    pub fn image(&self) -> Option<&RgbaImage> {
        match self {
            SurfaceState::Ready(img) => Some(img),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SurfaceState::Empty => "empty",
            SurfaceState::Loading(_) => "loading",
            SurfaceState::Ready(_) => "ready",
        }
    }
}

/// Which of the two loadable surfaces an event refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SurfaceKind {
    Base,
    Mask,
}

impl SurfaceKind {
    pub fn name(self) -> &'static str {
        match self {
            SurfaceKind::Base => "image",
            SurfaceKind::Mask => "mask",
        }
    }
}

/// Outcome of one [`PaintSurface::poll_loads`] call.
#[derive(Default)]
pub struct LoadReport {
    /// True when this poll finished the last pending load and the surfaces
    /// were conformed to their final dimensions.
    pub settled: bool,
    pub failures: Vec<(SurfaceKind, EditorError)>,
}

// ============================================================================
// PAINT SURFACE
// ============================================================================

/// Owns the base image, the mask and the cursor overlay, and the visible
/// composite built from them.
///
/// All three layers share one [`Dimensions`]; they are only ever resized
/// together (see [`PaintSurface::poll_loads`]).  Other components get narrow
/// read access and mutate through [`PaintSurface::stamp`],
/// [`PaintSurface::replace_mask`] and [`PaintSurface::set_cursor`].
pub struct PaintSurface {
    dims: Dimensions,
    base: SurfaceState,
    mask: SurfaceState,
    overlay: RgbaImage,
    output: RgbaImage,
    mask_opacity: f32,
    /// Bumped on every mutation so a renderer can tell when to re-upload.
    pub generation: u64,
}

impl PaintSurface {
    pub fn new(mask_opacity: f32) -> Self {
        let dims = Dimensions::PLACEHOLDER;
        Self {
            dims,
            base: SurfaceState::Empty,
            mask: SurfaceState::Empty,
            overlay: RgbaImage::new(dims.width, dims.height),
            output: RgbaImage::new(dims.width, dims.height),
            mask_opacity: mask_opacity.clamp(0.0, 1.0),
            generation: 0,
        }
    }

    pub fn dimensions(&self) -> Dimensions {
        self.dims
    }

    pub fn base(&self) -> &SurfaceState {
        &self.base
    }

    pub fn mask(&self) -> &SurfaceState {
        &self.mask
    }

    pub fn base_image(&self) -> Option<&RgbaImage> {
        self.base.image()
    }

    pub fn mask_image(&self) -> Option<&RgbaImage> {
        self.mask.image()
    }

    pub fn overlay(&self) -> &RgbaImage {
        &self.overlay
    }

    /// The visible composite, as of the last [`PaintSurface::recomposite`].
    pub fn output(&self) -> &RgbaImage {
        &self.output
    }

    pub fn mask_opacity(&self) -> f32 {
        self.mask_opacity
    }

    pub fn is_loading(&self) -> bool {
        self.base.is_loading() || self.mask.is_loading()
    }

    /// Painting is only allowed once loading has finished and a real-sized
    /// mask buffer exists.
    pub fn is_paintable(&self) -> bool {
        !self.is_loading() && self.mask.is_ready() && !self.dims.is_placeholder()
    }

    pub fn set_loading(&mut self, kind: SurfaceKind, pending: PendingLoad) {
        *self.slot_mut(kind) = SurfaceState::Loading(pending);
    }

    fn slot_mut(&mut self, kind: SurfaceKind) -> &mut SurfaceState {
        match kind {
            SurfaceKind::Base => &mut self.base,
            SurfaceKind::Mask => &mut self.mask,
        }
    }

    /// Advance any in-flight decodes.  Called from the UI loop; never blocks.
    pub fn poll_loads(&mut self) -> LoadReport {
        let mut report = LoadReport::default();
        let was_loading = self.is_loading();

        for kind in [SurfaceKind::Base, SurfaceKind::Mask] {
            let slot = self.slot_mut(kind);
            let state = std::mem::replace(slot, SurfaceState::Empty);
            *slot = match state {
                SurfaceState::Loading(pending) => match pending.poll() {
                    LoadPoll::Pending(pending) => SurfaceState::Loading(pending),
                    LoadPoll::Done(Ok(loaded)) => match loaded.pixels {
                        Some(img) => {
                            log_info!(
                                "Loaded {} ({}×{})",
                                kind.name(),
                                loaded.dimensions.width,
                                loaded.dimensions.height
                            );
                            SurfaceState::Ready(img)
                        }
                        None => SurfaceState::Empty,
                    },
                    LoadPoll::Done(Err(e)) => {
                        log_err!("Failed to load {}: {}", kind.name(), e);
                        report.failures.push((kind, e));
                        SurfaceState::Empty
                    }
                },
                other => other,
            };
        }

        if was_loading && !self.is_loading() {
            self.settle();
            report.settled = true;
        }
        report
    }

    /// Pick the session dimensions (base image first, then mask) and bring
    /// every buffer to that size in one step.
    fn settle(&mut self) {
        let dims = self
            .base
            .image()
            .or(self.mask.image())
            .map(Dimensions::of)
            .unwrap_or(Dimensions::PLACEHOLDER);

        if dims != Dimensions::of(&self.overlay) {
            self.overlay = RgbaImage::new(dims.width, dims.height);
            self.output = RgbaImage::new(dims.width, dims.height);
        }
        self.dims = dims;

        let mask = std::mem::replace(&mut self.mask, SurfaceState::Empty);
        self.mask = match mask {
            SurfaceState::Ready(img) if Dimensions::of(&img) != dims => {
                log_info!(
                    "Scaling mask {}×{} to image size {}×{}",
                    img.width(),
                    img.height(),
                    dims.width,
                    dims.height
                );
                SurfaceState::Ready(conform(&img, dims))
            }
            SurfaceState::Empty if !dims.is_placeholder() => {
                SurfaceState::Ready(RgbaImage::new(dims.width, dims.height))
            }
            other => other,
        };

        self.recomposite();
    }

    /// Composite `shape` into the mask.  Returns false when the mask is not
    /// paintable or the shape touched no pixel.
    pub fn stamp(&mut self, shape: BrushShape, op: MaskOp) -> bool {
        if !self.is_paintable() {
            return false;
        }
        let touched = match &mut self.mask {
            SurfaceState::Ready(mask) => stamp_into(mask, shape, op),
            _ => false,
        };
        if touched {
            self.generation = self.generation.wrapping_add(1);
        }
        touched
    }

    /// Swap in new mask content (undo/redo/clear).  Content of another size
    /// is scaled to the session dimensions.
    pub fn replace_mask(&mut self, image: RgbaImage) {
        let image = if Dimensions::of(&image) == self.dims {
            image
        } else {
            conform(&image, self.dims)
        };
        self.mask = SurfaceState::Ready(image);
        self.generation = self.generation.wrapping_add(1);
    }

    /// Redraw the cursor overlay: a ring of `diameter` at `pos`, or nothing.
    pub fn set_cursor(&mut self, pos: Option<Position>, diameter: f32) {
        for px in self.overlay.pixels_mut() {
            *px = TRANSPARENT;
        }
        if let Some(center) = pos {
            draw_cursor_ring(&mut self.overlay, center, diameter / 2.0);
        }
        self.generation = self.generation.wrapping_add(1);
    }

    /// Rebuild the visible composite.
    ///
    /// Order is fixed: clear, base image, mask tinted at `mask_opacity`,
    /// cursor overlay untinted.
    pub fn recomposite(&mut self) {
        let width = self.dims.width as usize;
        let dims = self.dims;
        let opacity = self.mask_opacity;
        let base = self.base.image().filter(|img| Dimensions::of(img) == dims);
        let mask = self.mask.image().filter(|img| Dimensions::of(img) == dims);
        let overlay = &self.overlay;

        self.output
            .par_chunks_mut(width * 4)
            .enumerate()
            .for_each(|(y, row)| {
                let y = y as u32;
                for x in 0..width {
                    let xu = x as u32;
                    let mut px = TRANSPARENT;
                    if let Some(base) = base {
                        px = *base.get_pixel(xu, y);
                    }
                    if let Some(mask) = mask {
                        px = blend_over(px, *mask.get_pixel(xu, y), opacity);
                    }
                    px = blend_over(px, *overlay.get_pixel(xu, y), 1.0);
                    row[x * 4..x * 4 + 4].copy_from_slice(&px.0);
                }
            });
    }
}

/// Nearest-neighbour keeps a binary mask binary when scaled.
fn conform(image: &RgbaImage, dims: Dimensions) -> RgbaImage {
    imageops::resize(image, dims.width, dims.height, imageops::FilterType::Nearest)
}

fn draw_cursor_ring(overlay: &mut RgbaImage, center: Position, radius: f32) {
    let outer = radius + CURSOR_RING_WIDTH / 2.0;
    let (x0, x1) = pixel_span(center.x - outer, center.x + outer, overlay.width());
    let (y0, y1) = pixel_span(center.y - outer, center.y + outer, overlay.height());
    for y in y0..y1 {
        for x in x0..x1 {
            let d = (Pos2::new(x as f32 + 0.5, y as f32 + 0.5) - center).length();
            if (d - radius).abs() <= CURSOR_RING_WIDTH / 2.0 {
                overlay.put_pixel(x, y, CURSOR_RING);
            } else if d < radius {
                overlay.put_pixel(x, y, CURSOR_FILL);
            }
        }
    }
}
