// ============================================================================
// RESIZE / CROP - target sizing, crop window dragging, previews and commit
// ============================================================================

use image::{imageops, Rgba, RgbaImage};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::canvas::{blend_over, Dimensions, Position};
use crate::error::EditorError;

/// Darkening applied outside the crop window in the preview.
const PREVIEW_SHADE: Rgba<u8> = Rgba([0, 0, 0, 255]);
const PREVIEW_SHADE_OPACITY: f32 = 0.7;
/// Crop window outline, drawn centred on the window edge.
const OUTLINE_COLOR: Rgba<u8> = Rgba([55, 55, 255, 255]);
const OUTLINE_OPACITY: f32 = 0.7;
const OUTLINE_WIDTH: i64 = 20;

/// Interpolation method for resize operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Interpolation {
    Nearest,
    #[default]
    Bilinear,
    Bicubic,
    Lanczos3,
}

impl Interpolation {
    pub fn name(&self) -> &'static str {
        match self {
            Interpolation::Nearest  => "nearest",
            Interpolation::Bilinear => "bilinear",
            Interpolation::Bicubic  => "bicubic",
            Interpolation::Lanczos3 => "lanczos3",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::all().iter().copied().find(|i| i.name() == name)
    }

    pub fn all() -> &'static [Interpolation] {
        &[
            Interpolation::Nearest,
            Interpolation::Bilinear,
            Interpolation::Bicubic,
            Interpolation::Lanczos3,
        ]
    }

    pub fn to_filter(&self) -> imageops::FilterType {
        match self {
            Interpolation::Nearest  => imageops::FilterType::Nearest,
            Interpolation::Bilinear => imageops::FilterType::Triangle,
            Interpolation::Bicubic  => imageops::FilterType::CatmullRom,
            Interpolation::Lanczos3 => imageops::FilterType::Lanczos3,
        }
    }
}

/// How the source is brought to the target size.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResizeMode {
    /// Fixed-size window copied 1:1 from the source.
    #[default]
    Crop,
    /// Whole source scaled to fill the target.
    Stretch,
}

impl ResizeMode {
    pub fn name(&self) -> &'static str {
        match self {
            ResizeMode::Crop => "crop",
            ResizeMode::Stretch => "stretch",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "crop" => Some(ResizeMode::Crop),
            "stretch" => Some(ResizeMode::Stretch),
            _ => None,
        }
    }
}

/// Top-left of the crop window in source pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CropOffset {
    pub x: u32,
    pub y: u32,
}

/// A crop window that may lie partly or wholly outside the source, as shown
/// while a drag is in progress.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CropWindow {
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
}

impl CropWindow {
    fn contains(&self, x: i64, y: i64) -> bool {
        x >= self.x
            && y >= self.y
            && x < self.x + self.width as i64
            && y < self.y + self.height as i64
    }

    /// True if (x, y) is within the outline band centred on the window edge.
    fn on_outline(&self, x: i64, y: i64) -> bool {
        let half = OUTLINE_WIDTH / 2;
        let (x0, y0) = (self.x, self.y);
        let (x1, y1) = (self.x + self.width as i64, self.y + self.height as i64);
        let in_outer = x >= x0 - half && y >= y0 - half && x < x1 + half && y < y1 + half;
        let in_inner = x >= x0 + half && y >= y0 + half && x < x1 - half && y < y1 - half;
        in_outer && !in_inner
    }
}

/// Clamp a proposed offset so the window stays inside the source, per axis:
/// pull back to `source - target` when it overhangs, then floor at zero.
///
/// When the target is larger than the source on an axis the offset on that
/// axis is zero; the overhang is left transparent by [`crop_window`].
pub fn clamp_crop_offset(source: Dimensions, target: Dimensions, x: i64, y: i64) -> CropOffset {
    fn axis(value: i64, target: u32, source: u32) -> u32 {
        let mut v = value;
        if v + target as i64 > source as i64 {
            v = source as i64 - target as i64;
        }
        v.max(0) as u32
    }
    CropOffset {
        x: axis(x, target.width, source.width),
        y: axis(y, target.height, source.height),
    }
}

// ============================================================================
// RESIZE EDITOR - state behind the resize tab
// ============================================================================

#[derive(Clone, Copy, Debug)]
struct CropDrag {
    start: Position,
    current: Position,
    origin: CropOffset,
}

/// Everything needed to produce the committed pair.  Image and mask are
/// always produced from the same plan.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResizePlan {
    pub mode: ResizeMode,
    pub target: Dimensions,
    pub offset: CropOffset,
}

/// Target size, mode and crop offset, plus the drag in progress.
///
/// Drag positions are in source raster space: map pointer events through
/// [`crate::canvas::to_raster_position`] against the preview's bounds and
/// [`ResizeEditor::preview_dimensions`] first.
#[derive(Clone, Debug)]
pub struct ResizeEditor {
    source: Dimensions,
    target: Dimensions,
    mode: ResizeMode,
    offset: CropOffset,
    drag: Option<CropDrag>,
}

impl ResizeEditor {
    pub fn new(mode: ResizeMode) -> Self {
        Self {
            source: Dimensions::PLACEHOLDER,
            target: Dimensions::PLACEHOLDER,
            mode,
            offset: CropOffset::default(),
            drag: None,
        }
    }

    /// Adopt newly loaded source dimensions.  The target resets to the full
    /// source and the offset to the origin.
    pub fn set_source(&mut self, source: Dimensions) {
        self.source = source;
        self.target = source;
        self.offset = CropOffset::default();
        self.drag = None;
    }

    pub fn source(&self) -> Dimensions {
        self.source
    }

    pub fn target(&self) -> Dimensions {
        self.target
    }

    pub fn mode(&self) -> ResizeMode {
        self.mode
    }

    pub fn offset(&self) -> CropOffset {
        self.offset
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    pub fn set_width(&mut self, width: u32) -> Result<(), EditorError> {
        self.set_target(Dimensions::new(width, self.target.height)?);
        Ok(())
    }

    pub fn set_height(&mut self, height: u32) -> Result<(), EditorError> {
        self.set_target(Dimensions::new(self.target.width, height)?);
        Ok(())
    }

    pub fn set_target(&mut self, target: Dimensions) {
        self.target = target;
        self.offset = clamp_crop_offset(
            self.source,
            target,
            self.offset.x as i64,
            self.offset.y as i64,
        );
    }

    pub fn set_mode(&mut self, mode: ResizeMode) {
        if mode != self.mode {
            self.drag = None;
        }
        self.mode = mode;
    }

    /// Start moving the crop window.  Ignored outside crop mode.
    pub fn begin_drag(&mut self, pos: Position) -> bool {
        if self.mode != ResizeMode::Crop {
            return false;
        }
        self.drag = Some(CropDrag {
            start: pos,
            current: pos,
            origin: self.offset,
        });
        true
    }

    pub fn drag_to(&mut self, pos: Position) {
        if let Some(drag) = &mut self.drag {
            drag.current = pos;
        }
    }

    /// Finish the drag: `origin + (end - start)`, rounded to whole pixels,
    /// then clamped into the source.
    pub fn end_drag(&mut self) -> Option<CropOffset> {
        let drag = self.drag.take()?;
        let (x, y) = Self::dragged(&drag);
        self.offset = clamp_crop_offset(self.source, self.target, x, y);
        log_info!("Crop offset moved to ({}, {})", self.offset.x, self.offset.y);
        Some(self.offset)
    }

    pub fn cancel_drag(&mut self) {
        self.drag = None;
    }

    fn dragged(drag: &CropDrag) -> (i64, i64) {
        let delta = drag.current - drag.start;
        (
            drag.origin.x as i64 + delta.x.round() as i64,
            drag.origin.y as i64 + delta.y.round() as i64,
        )
    }

    /// The window as currently shown: follows the drag without clamping
    /// until release.
    pub fn live_window(&self) -> CropWindow {
        let (x, y) = match &self.drag {
            Some(drag) => Self::dragged(drag),
            None => (self.offset.x as i64, self.offset.y as i64),
        };
        CropWindow {
            x,
            y,
            width: self.target.width,
            height: self.target.height,
        }
    }

    /// Raster size of the preview surface: the whole source in crop mode,
    /// the target in stretch mode.
    pub fn preview_dimensions(&self) -> Dimensions {
        match self.mode {
            ResizeMode::Crop => self.source,
            ResizeMode::Stretch => self.target,
        }
    }

    pub fn plan(&self) -> ResizePlan {
        ResizePlan {
            mode: self.mode,
            target: self.target,
            offset: self.offset,
        }
    }
}

impl Default for ResizeEditor {
    fn default() -> Self {
        Self::new(ResizeMode::default())
    }
}

// ============================================================================
// PIXEL OPERATIONS
// ============================================================================

/// Copy `[offset, offset + target)` out of `src` 1:1.  Parts of the window
/// beyond the source stay transparent.
pub fn crop_window(src: &RgbaImage, offset: CropOffset, target: Dimensions) -> RgbaImage {
    let mut out = RgbaImage::new(target.width, target.height);
    let copy_w = src.width().saturating_sub(offset.x).min(target.width);
    let copy_h = src.height().saturating_sub(offset.y).min(target.height);
    for y in 0..copy_h {
        for x in 0..copy_w {
            out.put_pixel(x, y, *src.get_pixel(offset.x + x, offset.y + y));
        }
    }
    out
}

pub fn apply_plan(src: &RgbaImage, plan: &ResizePlan, interp: Interpolation) -> RgbaImage {
    match plan.mode {
        ResizeMode::Crop => crop_window(src, plan.offset, plan.target),
        ResizeMode::Stretch => {
            if Dimensions::of(src) == plan.target {
                src.clone()
            } else {
                imageops::resize(src, plan.target.width, plan.target.height, interp.to_filter())
            }
        }
    }
}

/// Produce the committed image and mask from one plan.
///
/// Fails if either source never finished loading rather than emit a
/// mismatched or blank pair.
pub fn commit_pair(
    image: Option<&RgbaImage>,
    mask: Option<&RgbaImage>,
    plan: &ResizePlan,
    interp: Interpolation,
) -> Result<(RgbaImage, RgbaImage), EditorError> {
    let image = image.ok_or(EditorError::SourceUnavailable("image"))?;
    let mask = mask.ok_or(EditorError::SourceUnavailable("mask"))?;
    Ok(rayon::join(
        || apply_plan(image, plan, interp),
        || apply_plan(mask, plan, interp),
    ))
}

/// Crop preview: the whole source darkened, with `window` at full
/// brightness and outlined.
pub fn render_crop_preview(src: &RgbaImage, window: CropWindow) -> RgbaImage {
    let mut out = src.clone();
    let width = out.width() as usize;
    if width == 0 {
        return out;
    }
    out.par_chunks_mut(width * 4)
        .enumerate()
        .for_each(|(y, row)| {
            let y = y as i64;
            for x in 0..width {
                let xi = x as i64;
                let px = &mut row[x * 4..x * 4 + 4];
                let mut color = Rgba([px[0], px[1], px[2], px[3]]);
                if !window.contains(xi, y) {
                    color = blend_over(color, PREVIEW_SHADE, PREVIEW_SHADE_OPACITY);
                }
                if window.on_outline(xi, y) {
                    color = blend_over(color, OUTLINE_COLOR, OUTLINE_OPACITY);
                }
                px.copy_from_slice(&color.0);
            }
        });
    out
}

/// Stretch preview: the source redrawn at the target size.
pub fn render_stretch_preview(src: &RgbaImage, target: Dimensions, interp: Interpolation) -> RgbaImage {
    apply_plan(
        src,
        &ResizePlan {
            mode: ResizeMode::Stretch,
            target,
            offset: CropOffset::default(),
        },
        interp,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use egui::pos2;

    fn dims(w: u32, h: u32) -> Dimensions {
        Dimensions::new(w, h).unwrap()
    }

    fn gradient(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| Rgba([x as u8, y as u8, (x ^ y) as u8, 255]))
    }

    #[test]
    fn clamped_offset_always_keeps_window_inside_source() {
        let sizes = [1u32, 3, 7, 16, 64];
        let deltas = [-1000i64, -65, -8, -1, 0, 1, 5, 63, 1000];
        for &sw in &sizes {
            for &sh in &sizes {
                for &tw in &sizes {
                    for &th in &sizes {
                        for &dx in &deltas {
                            for &dy in &deltas {
                                let off = clamp_crop_offset(dims(sw, sh), dims(tw, th), dx, dy);
                                if tw <= sw {
                                    assert!(off.x + tw <= sw);
                                } else {
                                    assert_eq!(off.x, 0);
                                }
                                if th <= sh {
                                    assert!(off.y + th <= sh);
                                } else {
                                    assert_eq!(off.y, 0);
                                }
                                if dx >= 0 && dx + tw as i64 <= sw as i64 {
                                    assert_eq!(off.x as i64, dx);
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn drag_moves_crop_window_by_pointer_delta() {
        let mut editor = ResizeEditor::new(ResizeMode::Crop);
        editor.set_source(dims(800, 600));
        editor.set_width(512).unwrap();
        editor.set_height(512).unwrap();
        assert_eq!(editor.offset(), CropOffset { x: 0, y: 0 });

        assert!(editor.begin_drag(pos2(700.0, 10.0)));
        editor.drag_to(pos2(750.0, 10.0));
        assert_eq!(editor.end_drag(), Some(CropOffset { x: 50, y: 0 }));
        assert!(!editor.is_dragging());
    }

    #[test]
    fn live_window_is_unclamped_until_release() {
        let mut editor = ResizeEditor::new(ResizeMode::Crop);
        editor.set_source(dims(800, 600));
        editor.set_target(dims(512, 512));

        editor.begin_drag(pos2(100.0, 100.0));
        editor.drag_to(pos2(900.0, -50.0));
        let live = editor.live_window();
        assert_eq!((live.x, live.y), (800, -150));
        assert_eq!(editor.offset(), CropOffset::default());

        let done = editor.end_drag().unwrap();
        assert_eq!(done, CropOffset { x: 288, y: 0 });
        assert_eq!(editor.live_window().x, 288);
    }

    #[test]
    fn shrinking_source_overhang_reclamps_on_target_change() {
        let mut editor = ResizeEditor::new(ResizeMode::Crop);
        editor.set_source(dims(100, 100));
        editor.set_target(dims(10, 10));
        editor.begin_drag(pos2(0.0, 0.0));
        editor.drag_to(pos2(85.0, 85.0));
        editor.end_drag();
        assert_eq!(editor.offset(), CropOffset { x: 85, y: 85 });

        editor.set_width(40).unwrap();
        assert_eq!(editor.offset(), CropOffset { x: 60, y: 85 });
        assert!(editor.set_height(0).is_err());
        assert_eq!(editor.target(), dims(40, 10));
    }

    #[test]
    fn stretch_mode_ignores_drags() {
        let mut editor = ResizeEditor::new(ResizeMode::Stretch);
        editor.set_source(dims(50, 50));
        assert!(!editor.begin_drag(pos2(1.0, 1.0)));
        assert_eq!(editor.end_drag(), None);
        editor.set_target(dims(20, 30));
        assert_eq!(editor.preview_dimensions(), dims(20, 30));
        editor.set_mode(ResizeMode::Crop);
        assert_eq!(editor.preview_dimensions(), dims(50, 50));
    }

    #[test]
    fn crop_commit_is_a_verbatim_copy() {
        let image = gradient(64, 48);
        let mask = RgbaImage::from_fn(64, 48, |x, _| Rgba([0, 0, 0, if x < 32 { 255 } else { 0 }]));
        let plan = ResizePlan {
            mode: ResizeMode::Crop,
            target: dims(20, 10),
            offset: CropOffset { x: 25, y: 30 },
        };
        let (out_image, out_mask) =
            commit_pair(Some(&image), Some(&mask), &plan, Interpolation::Bilinear).unwrap();
        assert_eq!(Dimensions::of(&out_image), plan.target);
        assert_eq!(Dimensions::of(&out_mask), plan.target);
        for y in 0..10 {
            for x in 0..20 {
                assert_eq!(out_image.get_pixel(x, y), image.get_pixel(x + 25, y + 30));
                assert_eq!(out_mask.get_pixel(x, y), mask.get_pixel(x + 25, y + 30));
            }
        }
    }

    #[test]
    fn oversized_crop_target_leaves_overhang_transparent() {
        let image = RgbaImage::from_pixel(4, 4, Rgba([9, 9, 9, 255]));
        let out = crop_window(&image, CropOffset::default(), dims(6, 5));
        assert_eq!(out.get_pixel(3, 3)[3], 255);
        assert_eq!(out.get_pixel(5, 1)[3], 0);
        assert_eq!(out.get_pixel(1, 4)[3], 0);
    }

    #[test]
    fn stretch_commit_scales_both_to_target() {
        let image = gradient(40, 20);
        let mask = RgbaImage::from_pixel(40, 20, Rgba([0, 0, 0, 255]));
        let plan = ResizePlan {
            mode: ResizeMode::Stretch,
            target: dims(13, 29),
            offset: CropOffset::default(),
        };
        let (out_image, out_mask) =
            commit_pair(Some(&image), Some(&mask), &plan, Interpolation::Nearest).unwrap();
        assert_eq!(Dimensions::of(&out_image), dims(13, 29));
        assert_eq!(Dimensions::of(&out_mask), dims(13, 29));
        assert!(out_mask.pixels().all(|p| p[3] == 255));
    }

    #[test]
    fn commit_without_mask_fails_loudly() {
        let image = gradient(8, 8);
        let plan = ResizePlan {
            mode: ResizeMode::Crop,
            target: dims(8, 8),
            offset: CropOffset::default(),
        };
        let err = commit_pair(Some(&image), None, &plan, Interpolation::Bilinear).unwrap_err();
        assert!(matches!(err, EditorError::SourceUnavailable("mask")));
        let err = commit_pair(None, Some(&image), &plan, Interpolation::Bilinear).unwrap_err();
        assert!(matches!(err, EditorError::SourceUnavailable("image")));
    }

    #[test]
    fn crop_preview_darkens_outside_and_outlines_window() {
        let src = RgbaImage::from_pixel(200, 200, Rgba([255, 255, 255, 255]));
        let window = CropWindow { x: 50, y: 50, width: 100, height: 100 };
        let preview = render_crop_preview(&src, window);

        // Window interior clear of the outline band is untouched.
        assert_eq!(*preview.get_pixel(100, 100), Rgba([255, 255, 255, 255]));
        // Far outside: darkened to 30% brightness.
        assert_eq!(*preview.get_pixel(5, 5), Rgba([77, 77, 77, 255]));
        // On the edge: blue-tinted.
        let edge = preview.get_pixel(50, 100);
        assert!(edge[2] > edge[0]);
    }

    #[test]
    fn interpolation_names_round_trip() {
        for interp in Interpolation::all() {
            assert_eq!(Interpolation::from_name(interp.name()), Some(*interp));
        }
        assert_eq!(Interpolation::from_name("cubic"), None);
        assert_eq!(ResizeMode::from_name("stretch"), Some(ResizeMode::Stretch));
    }
}
