use overlay::geometry::Transform;

use crate::layer::HwcRect;

/// Clips `dst` to `scissor` and trims `crop` by the same proportion on the matching source
/// edge, so the visible part keeps its aspect ratio. `transform` is the layer transform; the
/// source edge a destination edge maps to depends on its flips and rotation.
///
/// Returns false, leaving both rectangles untouched, when `dst` does not overlap `scissor`.
pub fn calculate_crop_rects(
    crop: &mut HwcRect,
    dst: &mut HwcRect,
    scissor: &HwcRect,
    transform: Transform,
) -> bool {
    let dst_w = dst.width();
    let dst_h = dst.height();
    if dst_w <= 0
        || dst_h <= 0
        || dst.left >= scissor.right
        || dst.right <= scissor.left
        || dst.top >= scissor.bottom
        || dst.bottom <= scissor.top
    {
        return false;
    }

    let mut left_cut = 0.0f32;
    let mut top_cut = 0.0f32;
    let mut right_cut = 0.0f32;
    let mut bottom_cut = 0.0f32;

    if dst.left < scissor.left {
        left_cut = (scissor.left - dst.left) as f32 / dst_w as f32;
        dst.left = scissor.left;
    }
    if dst.right > scissor.right {
        right_cut = (dst.right - scissor.right) as f32 / dst_w as f32;
        dst.right = scissor.right;
    }
    if dst.top < scissor.top {
        top_cut = (scissor.top - dst.top) as f32 / dst_h as f32;
        dst.top = scissor.top;
    }
    if dst.bottom > scissor.bottom {
        bottom_cut = (dst.bottom - scissor.bottom) as f32 / dst_h as f32;
        dst.bottom = scissor.bottom;
    }

    // Walk the cuts back from display edges to source edges.
    if transform.contains(Transform::FLIP_H) {
        std::mem::swap(&mut left_cut, &mut right_cut);
    }
    if transform.contains(Transform::FLIP_V) {
        std::mem::swap(&mut top_cut, &mut bottom_cut);
    }
    if transform.contains(Transform::ROT_90) {
        // A clockwise quarter turn shows the source's left edge at the top.
        let tmp = left_cut;
        left_cut = top_cut;
        top_cut = right_cut;
        right_cut = bottom_cut;
        bottom_cut = tmp;
    }

    let crop_w = crop.width() as f32;
    let crop_h = crop.height() as f32;
    crop.left += (crop_w * left_cut) as i32;
    crop.top += (crop_h * top_cut) as i32;
    crop.right -= (crop_w * right_cut) as i32;
    crop.bottom -= (crop_h * bottom_cut) as i32;
    true
}
