//! Debug overlay of a structure report drawn over the source screenshot.

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect as DrawRect;

use crate::geometry::{Point, Rect};
use crate::report::{LeafSlot, StructureReport};

const TOP_LEVEL_COLOR: Rgb<u8> = Rgb([255, 0, 255]);
const BAND_COLOR: Rgb<u8> = Rgb([0, 200, 255]);
const SLOT_COLOR: Rgb<u8> = Rgb([160, 160, 160]);
const INCOMPLETE_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const COMPLETE_COLOR: Rgb<u8> = Rgb([0, 200, 0]);
const UNLABELED_COLOR: Rgb<u8> = Rgb([0, 0, 255]);

const TOP_LEVEL_THICKNESS: u32 = 3;
const CLICK_RADIUS: i32 = 5;

fn to_draw_rect(rect: Rect, grow: u32) -> DrawRect {
    DrawRect::at(rect.x as i32 - grow as i32, rect.y as i32 - grow as i32)
        .of_size(rect.width + 2 * grow, rect.height + 2 * grow)
}

fn draw_click_point(img: &mut RgbImage, point: Point, color: Rgb<u8>) {
    if point.x < img.width() && point.y < img.height() {
        draw_filled_circle_mut(img, (point.x as i32, point.y as i32), CLICK_RADIUS, color);
    }
}

fn slot_color(slot: &LeafSlot) -> Rgb<u8> {
    match &slot.label {
        Some(label) if label.is_incomplete() => INCOMPLETE_COLOR,
        Some(_) => COMPLETE_COLOR,
        None => UNLABELED_COLOR,
    }
}

/// Draws bands, slots, top-level regions and click points.
///
/// Click points of labeled slots are red when work is left and green when
/// the label is complete; unlabeled slots get blue.
pub fn render_overlay(image: &RgbImage, report: &StructureReport) -> RgbImage {
    let mut out = image.clone();
    let right = out.width().saturating_sub(1) as f32;

    for sub in report.sub_regions() {
        for y in [sub.band_start, sub.band_end.saturating_sub(1)] {
            draw_line_segment_mut(&mut out, (0.0, y as f32), (right, y as f32), BAND_COLOR);
        }
    }

    for slot in report.items() {
        draw_hollow_rect_mut(&mut out, to_draw_rect(slot.bounds, 0), SLOT_COLOR);
    }

    for region in report.top_level_regions() {
        for grow in 0..TOP_LEVEL_THICKNESS {
            draw_hollow_rect_mut(&mut out, to_draw_rect(region.rect, grow), TOP_LEVEL_COLOR);
        }
        draw_click_point(&mut out, region.click_point, TOP_LEVEL_COLOR);
    }

    for slot in report.items() {
        draw_click_point(&mut out, slot.click_point, slot_color(slot));
    }
    out
}
