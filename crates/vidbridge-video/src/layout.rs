//! Split-screen geometry for the host container.

/// Axis-aligned frame in platform points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionFrames {
    pub subscriber: Rect,
    pub publisher: Rect,
}

/// Subscriber on the left half, publisher on the right half.
///
/// Negative sizes (a view measured before layout) are clamped to zero.
pub fn split_layout(width: f32, height: f32) -> RegionFrames {
    let width = width.max(0.0);
    let height = height.max(0.0);
    let half = width / 2.0;

    RegionFrames {
        subscriber: Rect { x: 0.0, y: 0.0, width: half, height },
        publisher: Rect { x: half, y: 0.0, width: half, height },
    }
}
