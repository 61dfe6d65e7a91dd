//! Piecewise-linear fuzzy membership functions.

/// A piecewise-linear membership function defined by `(x, membership)` nodes.
///
/// Outside the node range the value is clamped to the nearest end node.
#[derive(Debug, Clone, PartialEq)]
pub struct MembershipFunction {
    nodes: Vec<(f64, f64)>,
}

impl MembershipFunction {
    /// Creates a membership function from nodes. Nodes are sorted by `x`.
    #[must_use]
    pub fn new(nodes: &[(f64, f64)]) -> Self {
        let mut nodes = nodes.to_vec();
        nodes.sort_by(|a, b| a.0.total_cmp(&b.0));
        Self { nodes }
    }

    /// Returns the nodes in ascending `x` order.
    #[must_use]
    pub fn nodes(&self) -> &[(f64, f64)] {
        &self.nodes
    }

    /// Evaluates the membership at `x`.
    #[must_use]
    pub fn value(&self, x: f64) -> f64 {
        let (Some(first), Some(last)) = (self.nodes.first(), self.nodes.last()) else {
            return 0.0;
        };
        if x <= first.0 {
            return first.1;
        }
        if x >= last.0 {
            return last.1;
        }
        for w in self.nodes.windows(2) {
            let (x0, y0) = w[0];
            let (x1, y1) = w[1];
            if x >= x0 && x <= x1 {
                if (x1 - x0).abs() < f64::EPSILON {
                    return y1;
                }
                return y0 + (y1 - y0) * (x - x0) / (x1 - x0);
            }
        }
        last.1
    }

    /// Clips the function at `clip`: memberships above it are lowered to it,
    /// and nodes are inserted where the function crosses the clip level.
    #[must_use]
    pub fn clipped(&self, clip: f64) -> Self {
        if clip >= 1.0 {
            return self.clone();
        }
        let mut nodes: Vec<(f64, f64)> = Vec::with_capacity(self.nodes.len() * 2);
        for w in self.nodes.windows(2) {
            let (x0, y0) = w[0];
            let (x1, y1) = w[1];
            if (y0 < clip && y1 > clip) || (y0 > clip && y1 < clip) {
                let x = x0 + (x1 - x0) * (y0 - clip) / (y0 - y1);
                nodes.push((x, clip));
            }
        }
        nodes.extend(self.nodes.iter().map(|&(x, y)| (x, y.min(clip))));
        Self::new(&nodes)
    }

    /// Area under the function and the `x` coordinate of its centroid,
    /// or `None` when the area is zero.
    #[must_use]
    pub fn area_and_centroid(&self) -> Option<(f64, f64)> {
        let mut area = 0.0;
        let mut moment = 0.0;
        for w in self.nodes.windows(2) {
            let (x0, y0) = w[0];
            let (x1, y1) = w[1];
            let width = x1 - x0;

            // Bottom rectangle plus a triangle on whichever side is higher.
            let rect_area = width * y0.min(y1);
            let rect_centroid = x0 + width / 2.0;
            let tri_area = width * (y1 - y0).abs() / 2.0;
            let tri_centroid = if y1 > y0 {
                x0 + width * 2.0 / 3.0
            } else {
                x0 + width / 3.0
            };

            area += rect_area + tri_area;
            moment += rect_area * rect_centroid + tri_area * tri_centroid;
        }
        (area > 0.0).then(|| (area, moment / area))
    }
}

/// Combined centroid of several membership functions (centre of gravity
/// defuzzification). Returns `None` if all functions have zero area.
#[must_use]
pub fn centroid_of(functions: &[MembershipFunction]) -> Option<f64> {
    let (area, moment) = functions
        .iter()
        .filter_map(MembershipFunction::area_and_centroid)
        .fold((0.0, 0.0), |(a, m), (area, c)| (a + area, m + area * c));
    (area > 0.0).then(|| moment / area)
}
