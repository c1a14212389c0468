use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use egui::{pos2, vec2, Pos2, Rect};
use fusion_editor::io::{decode_blob, encode_png};
use fusion_editor::{
    CropOffset, Dimensions, EditPreferences, EditSession, EditorError, EditorInput,
    EditorSettings, EditorTab, MaskType, PenType, PointerListenerGuard, ResizeMode,
};
use image::{Rgba, RgbaImage};

fn gradient(w: u32, h: u32) -> RgbaImage {
    RgbaImage::from_fn(w, h, |x, y| Rgba([(x as u8).wrapping_mul(3), (y as u8).wrapping_mul(5), 90, 255]))
}

fn tracked_guard() -> (PointerListenerGuard, Arc<AtomicBool>) {
    let released = Arc::new(AtomicBool::new(false));
    let flag = released.clone();
    let guard = PointerListenerGuard::new(move || flag.store(true, Ordering::SeqCst));
    (guard, released)
}

fn open(input: EditorInput, settings: EditorSettings) -> (EditSession, Arc<AtomicBool>) {
    let (guard, released) = tracked_guard();
    let mut session = EditSession::open(input, settings, guard);
    let errors = session.finish_loading();
    assert!(errors.is_empty(), "load errors: {:?}", errors);
    (session, released)
}

fn image_input(w: u32, h: u32) -> EditorInput {
    EditorInput {
        image: Some(encode_png(&gradient(w, h)).unwrap()),
        ..Default::default()
    }
}

fn bounds(w: f32, h: f32) -> Option<Rect> {
    Some(Rect::from_min_size(Pos2::ZERO, vec2(w, h)))
}

fn tap(session: &mut EditSession, area: Option<Rect>, at: Pos2) {
    session.pointer_down(area, at);
    session.pointer_up(area, at).unwrap();
}

fn mask_alpha(session: &EditSession, x: u32, y: u32) -> u8 {
    session.surface().mask_image().unwrap().get_pixel(x, y)[3]
}

#[test]
fn paint_undo_crop_and_commit() {
    let (mut session, released) = open(image_input(64, 48), EditorSettings::default());
    let area = bounds(64.0, 48.0);

    tap(&mut session, area, pos2(10.0, 10.0));
    session.pointer_down(area, pos2(30.0, 30.0));
    session.pointer_move(area, pos2(40.0, 30.0), true).unwrap();
    session.pointer_up(area, pos2(40.0, 30.0)).unwrap();
    assert_eq!(session.history().len(), 3);
    assert_eq!(mask_alpha(&session, 40, 30), 255);

    session.undo().unwrap();
    assert_eq!(mask_alpha(&session, 40, 30), 0);
    assert_eq!(mask_alpha(&session, 10, 10), 255);
    session.redo().unwrap();
    assert_eq!(mask_alpha(&session, 40, 30), 255);

    session.set_mask_type(MaskType::KeepMasked);
    session.set_tab(EditorTab::Resize).unwrap();
    session.set_target_width(32).unwrap();
    session.set_target_height(32).unwrap();
    session.pointer_down(area, pos2(50.0, 10.0));
    session.pointer_move(area, pos2(60.0, 10.0), true).unwrap();
    session.pointer_up(area, pos2(60.0, 10.0)).unwrap();
    assert_eq!(session.resize().offset(), CropOffset { x: 10, y: 0 });
    assert!(session.render_resize_preview().is_some());
    assert!(!released.load(Ordering::SeqCst));

    let output = session.commit().unwrap();
    assert!(released.load(Ordering::SeqCst));
    assert_eq!(output.dimensions, Dimensions::new(32, 32).unwrap());
    assert_eq!(
        output.preferences,
        EditPreferences { mask_type: MaskType::KeepMasked, resize_mode: ResizeMode::Crop }
    );

    let image = decode_blob(&output.image).unwrap();
    let mask = decode_blob(&output.mask).unwrap();
    assert_eq!(image.dimensions(), (32, 32));
    assert_eq!(mask.dimensions(), (32, 32));
    let source = gradient(64, 48);
    assert_eq!(image.get_pixel(0, 0), source.get_pixel(10, 0));
    assert_eq!(image.get_pixel(31, 31), source.get_pixel(41, 31));
    assert_eq!(*mask.get_pixel(0, 0), Rgba([0, 0, 0, 255]));
    assert_eq!(mask.get_pixel(31, 0)[3], 0);
}

#[test]
fn scaled_display_maps_to_raster_pixels() {
    let (mut session, _) = open(image_input(64, 48), EditorSettings::default());
    session.set_brush_diameter(2.0);
    // Displayed at twice the raster size.
    tap(&mut session, bounds(128.0, 96.0), pos2(41.0, 21.0));
    assert_eq!(mask_alpha(&session, 20, 10), 255);
    assert_eq!(mask_alpha(&session, 40, 20), 0);
}

#[test]
fn tap_on_displayed_far_edge_paints_last_pixel() {
    let (mut session, _) = open(image_input(512, 512), EditorSettings::default());
    let area = bounds(300.0, 300.0);
    assert!(area.unwrap().contains(pos2(300.0, 300.0)));

    tap(&mut session, area, pos2(300.0, 300.0));
    assert_eq!(mask_alpha(&session, 511, 511), 255);
    assert!(session.can_undo());
}

#[test]
fn stretch_commit_scales_image_and_mask_together() {
    let mut input = image_input(40, 20);
    input.resize_mode = Some(ResizeMode::Stretch);
    let (mut session, _) = open(input, EditorSettings::default());
    tap(&mut session, bounds(40.0, 20.0), pos2(20.0, 10.0));
    session.set_target_width(80).unwrap();
    session.set_target_height(60).unwrap();
    assert_eq!(session.render_resize_preview().unwrap().dimensions(), (80, 60));

    let output = session.commit().unwrap();
    assert_eq!(output.preferences.resize_mode, ResizeMode::Stretch);
    assert_eq!(decode_blob(&output.image).unwrap().dimensions(), (80, 60));
    assert_eq!(decode_blob(&output.mask).unwrap().dimensions(), (80, 60));
}

#[test]
fn existing_mask_is_scaled_and_is_the_first_undo_target() {
    let mask = RgbaImage::from_fn(32, 24, |x, _| {
        if x < 16 { Rgba([0, 0, 0, 255]) } else { Rgba([0, 0, 0, 0]) }
    });
    let input = EditorInput {
        image: Some(encode_png(&gradient(64, 48)).unwrap()),
        mask: Some(encode_png(&mask).unwrap()),
        ..Default::default()
    };
    let (mut session, _) = open(input, EditorSettings::default());
    assert_eq!(mask_alpha(&session, 5, 5), 255);
    assert_eq!(mask_alpha(&session, 60, 5), 0);

    session.set_pen(PenType::Erase);
    tap(&mut session, bounds(64.0, 48.0), pos2(5.0, 5.0));
    assert_eq!(mask_alpha(&session, 5, 5), 0);
    assert_eq!(session.history().undo_description(), Some("Erase Stroke"));

    session.undo().unwrap();
    assert!(!session.can_undo());
    assert_eq!(mask_alpha(&session, 5, 5), 255);
}

#[test]
fn history_window_follows_settings() {
    let settings = EditorSettings { history_capacity: 2, ..Default::default() };
    let (mut session, _) = open(image_input(64, 48), settings);
    let area = bounds(64.0, 48.0);
    for x in [10.0, 30.0, 50.0] {
        tap(&mut session, area, pos2(x, 20.0));
    }
    assert_eq!(session.history().len(), 2);
    session.undo().unwrap();
    assert!(!session.can_undo());
    // Second stroke kept, third undone.
    assert_eq!(mask_alpha(&session, 30, 20), 255);
    assert_eq!(mask_alpha(&session, 50, 20), 0);
}

#[test]
fn corrupt_image_can_be_replaced() {
    let (guard, _) = tracked_guard();
    let input = EditorInput { image: Some(vec![0, 1, 2, 3]), ..Default::default() };
    let mut session = EditSession::open(input, EditorSettings::default(), guard);
    let errors = session.finish_loading();
    assert!(matches!(errors.as_slice(), [EditorError::Decode(_)]));
    assert!(!session.surface().is_paintable());
    assert!(session.render_resize_preview().is_none());

    session.load_image(Some(encode_png(&gradient(16, 16)).unwrap()));
    assert!(session.finish_loading().is_empty());
    assert!(session.surface().is_paintable());
    assert_eq!(session.resize().target(), Dimensions::new(16, 16).unwrap());
}

#[test]
fn commit_without_image_keeps_session_open() {
    let (mut session, released) = open(EditorInput::default(), EditorSettings::default());
    tap(&mut session, bounds(10.0, 10.0), pos2(0.5, 0.5));
    assert!(!session.can_undo());

    let err = session.commit().unwrap_err();
    assert!(matches!(err.error, EditorError::SourceUnavailable("image")));
    assert!(!released.load(Ordering::SeqCst));

    err.session.cancel();
    assert!(released.load(Ordering::SeqCst));
}

#[test]
fn cancel_releases_listeners() {
    let (session, released) = open(image_input(8, 8), EditorSettings::default());
    session.cancel();
    assert!(released.load(Ordering::SeqCst));
}

#[test]
fn dropping_a_session_releases_listeners() {
    let (session, released) = open(image_input(8, 8), EditorSettings::default());
    drop(session);
    assert!(released.load(Ordering::SeqCst));
}
