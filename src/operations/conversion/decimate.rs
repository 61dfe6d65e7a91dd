use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap};

use ordered_float::OrderedFloat;
use tracing::debug;

use crate::error::{ParameterError, Result};
use crate::geometry::TriangleMesh;
use crate::math::{Point3, TOLERANCE};

/// Checks a target reduction against `[0, 1]`.
pub(crate) fn validate_reduction(reduction: f64) -> Result<()> {
    if (0.0..=1.0).contains(&reduction) {
        Ok(())
    } else {
        Err(ParameterError::ParameterOutOfRange {
            parameter: "decimation_factor",
            value: reduction,
            min: 0.0,
            max: 1.0,
        }
        .into())
    }
}

/// Reduces the triangle count of a closed mesh by collapsing its shortest
/// edges to their midpoints.
///
/// An edge is only collapsed when the two triangles sharing it are the only
/// ones whose vertices both endpoints see (the link condition) and no other
/// surrounding triangle would flip. Both rules keep a closed, consistently
/// oriented mesh closed. Decimation stops at the target or when no edge can
/// be collapsed.
pub struct Decimate<'a> {
    mesh: &'a TriangleMesh,
    target_reduction: f64,
}

impl<'a> Decimate<'a> {
    #[must_use]
    pub fn new(mesh: &'a TriangleMesh) -> Self {
        Self {
            mesh,
            target_reduction: 0.0,
        }
    }

    /// Sets the fraction of triangles to remove (`0.0..=1.0`).
    #[must_use]
    pub fn with_target_reduction(mut self, target_reduction: f64) -> Self {
        self.target_reduction = target_reduction;
        self
    }

    /// Executes the decimation.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::ParameterOutOfRange`] for a reduction
    /// outside `[0, 1]`.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn execute(&self) -> Result<TriangleMesh> {
        validate_reduction(self.target_reduction)?;
        let start = self.mesh.triangle_count();
        if self.target_reduction <= 0.0 || start == 0 {
            return Ok(self.mesh.clone());
        }
        let target = (start as f64 * (1.0 - self.target_reduction)).ceil() as usize;

        let mut state = CollapseState::new(self.mesh);
        while state.alive > target.max(4) {
            let Some(Reverse((OrderedFloat(length), a, b))) = state.heap.pop() else {
                break;
            };
            if state.removed[a] || state.removed[b] {
                continue;
            }
            let current = (state.positions[a] - state.positions[b]).norm_squared();
            if (current - length).abs() > TOLERANCE {
                state.heap.push(Reverse((OrderedFloat(current), a, b)));
                continue;
            }
            state.try_collapse(a, b);
        }

        let mesh = state.into_mesh();
        debug!(
            from = start,
            to = mesh.triangle_count(),
            target,
            "mesh decimated"
        );
        Ok(mesh)
    }
}

struct CollapseState {
    positions: Vec<Point3>,
    triangles: Vec<[usize; 3]>,
    alive_triangles: Vec<bool>,
    removed: Vec<bool>,
    vertex_triangles: Vec<Vec<usize>>,
    heap: BinaryHeap<Reverse<(OrderedFloat<f64>, usize, usize)>>,
    alive: usize,
}

impl CollapseState {
    fn new(mesh: &TriangleMesh) -> Self {
        let triangles: Vec<[usize; 3]> = mesh
            .indices
            .iter()
            .map(|t| t.map(|i| i as usize))
            .collect();
        let mut vertex_triangles = vec![Vec::new(); mesh.vertices.len()];
        let mut edges = BTreeSet::new();
        for (t, tri) in triangles.iter().enumerate() {
            for e in 0..3 {
                let (a, b) = (tri[e], tri[(e + 1) % 3]);
                vertex_triangles[a].push(t);
                edges.insert((a.min(b), a.max(b)));
            }
        }
        let positions = mesh.vertices.clone();
        let heap = edges
            .into_iter()
            .map(|(a, b)| Reverse((OrderedFloat((positions[a] - positions[b]).norm_squared()), a, b)))
            .collect();
        Self {
            alive: triangles.len(),
            alive_triangles: vec![true; triangles.len()],
            removed: vec![false; positions.len()],
            positions,
            triangles,
            vertex_triangles,
            heap,
        }
    }

    fn live_triangles(&self, v: usize) -> impl Iterator<Item = usize> + '_ {
        self.vertex_triangles[v]
            .iter()
            .copied()
            .filter(|&t| self.alive_triangles[t])
    }

    fn neighbours(&self, v: usize) -> BTreeSet<usize> {
        self.live_triangles(v)
            .flat_map(|t| self.triangles[t])
            .filter(|&u| u != v)
            .collect()
    }

    fn try_collapse(&mut self, a: usize, b: usize) {
        let shared: Vec<usize> = self
            .live_triangles(a)
            .filter(|&t| self.triangles[t].contains(&b))
            .collect();
        if shared.len() != 2 {
            return;
        }
        let opposite: BTreeSet<usize> = shared
            .iter()
            .flat_map(|&t| self.triangles[t])
            .filter(|&u| u != a && u != b)
            .collect();
        let common: BTreeSet<usize> = self
            .neighbours(a)
            .intersection(&self.neighbours(b))
            .copied()
            .collect();
        if common != opposite {
            return;
        }

        let midpoint = Point3::from((self.positions[a].coords + self.positions[b].coords) / 2.0);
        let mut touched: Vec<usize> = self.live_triangles(a).chain(self.live_triangles(b)).collect();
        touched.sort_unstable();
        touched.dedup();
        for &t in &touched {
            if shared.contains(&t) {
                continue;
            }
            let before = self.triangles[t].map(|i| self.positions[i]);
            let after = self.triangles[t].map(|i| if i == a || i == b { midpoint } else { self.positions[i] });
            let n0 = (before[1] - before[0]).cross(&(before[2] - before[0]));
            let n1 = (after[1] - after[0]).cross(&(after[2] - after[0]));
            if n1.norm() < TOLERANCE || n0.dot(&n1) <= 0.0 {
                return;
            }
        }

        self.positions[a] = midpoint;
        self.removed[b] = true;
        for &t in &shared {
            self.alive_triangles[t] = false;
        }
        self.alive -= shared.len();
        let moved = std::mem::take(&mut self.vertex_triangles[b]);
        for t in moved {
            if !self.alive_triangles[t] {
                continue;
            }
            for i in &mut self.triangles[t] {
                if *i == b {
                    *i = a;
                }
            }
            self.vertex_triangles[a].push(t);
        }
        for u in self.neighbours(a) {
            let length = (self.positions[a] - self.positions[u]).norm_squared();
            self.heap.push(Reverse((OrderedFloat(length), a.min(u), a.max(u))));
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn into_mesh(self) -> TriangleMesh {
        let mut remap: HashMap<usize, u32> = HashMap::new();
        let mut vertices = Vec::new();
        let mut indices = Vec::with_capacity(self.alive);
        for (t, tri) in self.triangles.iter().enumerate() {
            if !self.alive_triangles[t] {
                continue;
            }
            indices.push(tri.map(|i| {
                *remap.entry(i).or_insert_with(|| {
                    vertices.push(self.positions[i]);
                    (vertices.len() - 1) as u32
                })
            }));
        }
        TriangleMesh::from_parts(vertices, indices)
    }
}
