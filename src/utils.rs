/// Geometry helpers shared by the tracker and the gate counter.
use nalgebra::{Point2, Vector2};

/// Euclidean distance between two pixel positions.
pub fn point_distance(a: &Point2<f32>, b: &Point2<f32>) -> f32 {
    nalgebra::distance(a, b)
}

/// Z component of the 3-D cross product of two planar vectors.
pub fn cross(a: &Vector2<f64>, b: &Vector2<f64>) -> f64 {
    a.x * b.y - a.y * b.x
}

/// Signed side of `p` relative to the directed line `start -> end`.
/// Positive on the left of the direction (in y-up coordinates), zero on the line.
pub fn side_of(start: &Point2<f64>, end: &Point2<f64>, p: &Point2<f64>) -> f64 {
    cross(&(end - start), &(p - start))
}

/// Whether the line through `from -> to` meets the finite segment `seg_start -> seg_end`.
///
/// Computes the two signed triangle areas spanned by the path direction and the segment
/// endpoints; their ratio is the parameter of the intersection along the segment.
/// Callers that need a segment/segment test combine this with `side_of` on both path ends.
pub fn path_meets_segment(
    from: &Point2<f64>,
    to: &Point2<f64>,
    seg_start: &Point2<f64>,
    seg_end: &Point2<f64>,
) -> bool {
    let v = seg_end - seg_start;
    let a = from - seg_start;
    let b = to - seg_start;
    let d = b - a;

    let s1 = cross(&d, &(-a)) / 2.0;
    let s2 = cross(&d, &(a - v)) / 2.0;
    if s1 + s2 == 0.0 {
        return false;
    }

    let t = s1 / (s1 + s2);
    (0.0..=1.0).contains(&t)
}
