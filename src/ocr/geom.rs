use crate::ocr::LineBox;

pub(super) fn union_bbox(a: &LineBox, b: &LineBox) -> LineBox {
    LineBox {
        x_min: a.x_min.min(b.x_min),
        y_min: a.y_min.min(b.y_min),
        x_max: a.x_max.max(b.x_max),
        y_max: a.y_max.max(b.y_max),
    }
}

pub(super) fn contains(outer: &LineBox, inner: &LineBox) -> bool {
    outer.x_min <= inner.x_min
        && outer.y_min <= inner.y_min
        && outer.x_max >= inner.x_max
        && outer.y_max >= inner.y_max
}

pub(super) fn scale_down(value: u32, scale: u32) -> u32 {
    if scale <= 1 {
        return value;
    }
    ((value as f32) / scale as f32).round() as u32
}
