use super::{Point3, Vector3, TOLERANCE};

/// Normal of the first non-collinear consecutive point triple of a loop.
///
/// Walks `(p[i], p[i+1], p[i+2])` and returns the normalized cross product
/// of the two edge vectors from `p[i]`, together with `p[i]` as the plane
/// origin. Returns `None` when every triple is collinear or the loop has
/// fewer than three points.
#[must_use]
pub fn first_triple_normal(points: &[Point3]) -> Option<(Point3, Vector3)> {
    points.windows(3).find_map(|w| {
        let cross = (w[1] - w[0]).cross(&(w[2] - w[0]));
        let len = cross.norm();
        (len > TOLERANCE).then(|| (w[0], cross / len))
    })
}

/// Computes the unit normal of a closed polygon using Newell's method.
///
/// Robust against slightly non-planar loops. Returns `None` for degenerate
/// (collinear or empty) polygons.
#[must_use]
pub fn newell_normal(points: &[Point3]) -> Option<Vector3> {
    let n = points.len();
    if n < 3 {
        return None;
    }
    let mut normal = Vector3::new(0.0, 0.0, 0.0);
    for i in 0..n {
        let curr = &points[i];
        let next = &points[(i + 1) % n];
        normal.x += (curr.y - next.y) * (curr.z + next.z);
        normal.y += (curr.z - next.z) * (curr.x + next.x);
        normal.z += (curr.x - next.x) * (curr.y + next.y);
    }
    let len = normal.norm();
    (len > TOLERANCE).then(|| normal / len)
}

/// Removes consecutive coincident points from a closed loop.
///
/// The wrap-around pair (last, first) is also checked, so an explicitly
/// repeated closing point is dropped.
#[must_use]
pub fn remove_coincident_points(points: &[Point3], tolerance: f64) -> Vec<Point3> {
    let mut cleaned: Vec<Point3> = Vec::with_capacity(points.len());
    for p in points {
        if cleaned.last().is_some_and(|last| (p - last).norm() < tolerance) {
            continue;
        }
        cleaned.push(*p);
    }
    while cleaned.len() > 1 {
        let first = cleaned[0];
        match cleaned.last() {
            Some(last) if (first - last).norm() < tolerance => {
                cleaned.pop();
            }
            _ => break,
        }
    }
    cleaned
}
