use serde::{Deserialize, Serialize};

use crate::canvas::{BrushShape, MaskOp, PaintSurface, Position, MASK_INK};

/// Brush diameter range offered by the size slider.
pub const MIN_BRUSH_DIAMETER: f32 = 1.0;
pub const MAX_BRUSH_DIAMETER: f32 = 100.0;
pub const DEFAULT_BRUSH_DIAMETER: f32 = 20.0;

/// Whether a stroke adds or removes mask coverage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PenType {
    #[default]
    Paint,
    Erase,
}

impl PenType {
    pub fn label(&self) -> &'static str {
        match self {
            PenType::Paint => "Brush",
            PenType::Erase => "Eraser",
        }
    }

    /// The compositing mode is the only thing that separates erasing from
    /// painting.
    pub fn mask_op(&self) -> MaskOp {
        match self {
            PenType::Paint => MaskOp::SourceOver(MASK_INK),
            PenType::Erase => MaskOp::DestinationOut,
        }
    }

    pub fn stroke_description(&self) -> &'static str {
        match self {
            PenType::Paint => "Paint Stroke",
            PenType::Erase => "Erase Stroke",
        }
    }
}

/// Current tool configuration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BrushState {
    pub pen: PenType,
    pub diameter: f32,
}

impl Default for BrushState {
    fn default() -> Self {
        Self {
            pen: PenType::Paint,
            diameter: DEFAULT_BRUSH_DIAMETER,
        }
    }
}

/// Emitted when a stroke that drew something ends.  The caller snapshots
/// the mask and pushes it to history.
#[derive(Clone, Debug, PartialEq)]
pub struct StrokeEvent {
    pub pen: PenType,
    pub samples: usize,
    pub description: &'static str,
}

enum StrokePhase {
    Idle,
    Painting {
        /// Brush captured at pointer-down; later changes wait for the next stroke.
        brush: BrushState,
        last: Option<Position>,
        samples: usize,
        drew: bool,
    },
}

/// Turns pointer samples into mask draws.
///
/// `Idle --down--> Painting --move--> Painting --up/leave/release--> Idle`.
/// Every draw is followed by a recomposite of the surface.
pub struct StrokeEngine {
    brush: BrushState,
    diameter_range: (f32, f32),
    phase: StrokePhase,
    cursor: Option<Position>,
}

impl Default for StrokeEngine {
    fn default() -> Self {
        Self::new(BrushState::default(), (MIN_BRUSH_DIAMETER, MAX_BRUSH_DIAMETER))
    }
}

impl StrokeEngine {
    pub fn new(brush: BrushState, diameter_range: (f32, f32)) -> Self {
        let (lo, hi) = diameter_range;
        let range = (lo.max(MIN_BRUSH_DIAMETER), hi.max(lo.max(MIN_BRUSH_DIAMETER)));
        Self {
            brush: BrushState {
                pen: brush.pen,
                diameter: brush.diameter.clamp(range.0, range.1),
            },
            diameter_range: range,
            phase: StrokePhase::Idle,
            cursor: None,
        }
    }

    pub fn brush(&self) -> BrushState {
        self.brush
    }

    pub fn set_pen(&mut self, pen: PenType) {
        self.brush.pen = pen;
    }

    /// Clamped to the configured range.  Does not affect a stroke in progress.
    pub fn set_diameter(&mut self, diameter: f32) {
        self.brush.diameter = diameter.clamp(self.diameter_range.0, self.diameter_range.1);
    }

    pub fn diameter_range(&self) -> (f32, f32) {
        self.diameter_range
    }

    pub fn is_painting(&self) -> bool {
        matches!(self.phase, StrokePhase::Painting { .. })
    }

    pub fn cursor(&self) -> Option<Position> {
        self.cursor
    }

    /// Start a stroke at `pos`, stamping one disc so a tap leaves a mark.
    /// Ignored unless the surface is paintable and `pos` is inside it.
    pub fn pointer_down(&mut self, surface: &mut PaintSurface, pos: Position) -> bool {
        if self.is_painting() || !surface.is_paintable() || !surface.dimensions().contains(pos) {
            return false;
        }
        let brush = self.brush;
        let drew = surface.stamp(
            BrushShape::Disc { center: pos, radius: brush.diameter / 2.0 },
            brush.pen.mask_op(),
        );
        self.phase = StrokePhase::Painting {
            brush,
            last: Some(pos),
            samples: 1,
            drew,
        };
        self.update_cursor(surface, Some(pos));
        true
    }

    /// Track the pointer.  While painting, joins the previous sample to
    /// `pos` with a round-capped segment so fast motion leaves no gaps.
    ///
    /// `primary_down` false while painting means the button was released
    /// somewhere we did not see; the stroke ends here.
    pub fn pointer_move(
        &mut self,
        surface: &mut PaintSurface,
        pos: Position,
        primary_down: bool,
    ) -> Option<StrokeEvent> {
        if !primary_down && self.is_painting() {
            let event = self.finish();
            self.update_cursor(surface, Some(pos));
            return event;
        }

        if let StrokePhase::Painting { brush, last, samples, drew } = &mut self.phase {
            let radius = brush.diameter / 2.0;
            let shape = match *last {
                Some(prev) => BrushShape::Capsule { from: prev, to: pos, radius },
                None => BrushShape::Disc { center: pos, radius },
            };
            *drew |= surface.stamp(shape, brush.pen.mask_op());
            *last = Some(pos);
            *samples += 1;
        }
        self.update_cursor(surface, Some(pos));
        None
    }

    pub fn pointer_up(&mut self, surface: &mut PaintSurface) -> Option<StrokeEvent> {
        let event = self.finish();
        surface.recomposite();
        event
    }

    /// The pointer left the tracked region: hide the cursor and end any stroke.
    pub fn pointer_leave(&mut self, surface: &mut PaintSurface) -> Option<StrokeEvent> {
        let event = self.finish();
        self.update_cursor(surface, None);
        event
    }

    /// Drop an in-progress stroke without reporting it.
    pub fn cancel(&mut self) {
        self.phase = StrokePhase::Idle;
    }

    fn finish(&mut self) -> Option<StrokeEvent> {
        match std::mem::replace(&mut self.phase, StrokePhase::Idle) {
            StrokePhase::Painting { brush, samples, drew: true, .. } => Some(StrokeEvent {
                pen: brush.pen,
                samples,
                description: brush.pen.stroke_description(),
            }),
            _ => None,
        }
    }

    fn update_cursor(&mut self, surface: &mut PaintSurface, pos: Option<Position>) {
        self.cursor = pos;
        surface.set_cursor(pos, self.brush.diameter);
        surface.recomposite();
    }
}
