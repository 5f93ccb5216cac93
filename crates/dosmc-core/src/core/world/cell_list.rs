use super::geometry::SimulationBox;
use crate::core::models::ids::SiteId;
use itertools::iproduct;
use nalgebra::{Point3, Vector3};
use slotmap::SecondaryMap;
use tracing::trace;

/// Linked-cell neighbor index with stripe compression.
///
/// The box is cut into an `Nx × Ny × Nz` grid in fractional coordinates whose cells are at
/// least `ratio × cutoff` wide. Sites are stored cell by cell in one flat array
/// (`entries`), with `cell_ptr[m]..cell_ptr[m + 1]` delimiting cell `m`. For every cell
/// the set of cells within interaction range (itself included) is precomputed and stored
/// as runs of consecutive flat cell indices; because cell contents are contiguous in
/// `entries`, each run ("stripe") maps to a single contiguous slice of sites.
///
/// Cell membership is kept exact: a site that crosses a cell boundary is relocated in
/// place, shifting at most one entry per intervening cell.
#[derive(Debug, Clone)]
pub struct CellList {
    dims: [usize; 3],
    edges: Vector3<f64>,
    cutoff: f64,
    ratio: f64,
    cell_ptr: Vec<usize>,
    entries: Vec<SiteId>,
    stripe_ptr: Vec<usize>,
    stripes: Vec<(usize, usize)>,
    location: SecondaryMap<SiteId, (usize, usize)>,
}

impl CellList {
    /// Creates an empty cell list with grid and stripes generated for `geometry`.
    pub fn new(geometry: &SimulationBox, cutoff: f64, ratio: f64) -> Self {
        let mut list = Self {
            dims: [1; 3],
            edges: Vector3::zeros(),
            cutoff,
            ratio,
            cell_ptr: vec![0, 0],
            entries: Vec::new(),
            stripe_ptr: vec![0, 0],
            stripes: Vec::new(),
            location: SecondaryMap::new(),
        };
        list.generate(geometry, cutoff, ratio);
        list
    }

    /// Regenerates the grid and the per-cell stripe masks.
    ///
    /// Site buckets are cleared; callers must follow with [`CellList::rebuild`].
    pub fn generate(&mut self, geometry: &SimulationBox, cutoff: f64, ratio: f64) {
        self.cutoff = cutoff;
        self.ratio = ratio;

        let widths = geometry.widths();
        let min_edge = ratio * cutoff;
        for k in 0..3 {
            self.dims[k] = ((widths[k] / min_edge).floor() as usize).max(1);
            self.edges[k] = widths[k] / self.dims[k] as f64;
        }

        let periodic = geometry.periodic();
        let offsets = self.offsets_in_range(periodic, geometry.is_orthorhombic());

        let cell_count = self.cell_count();
        self.stripe_ptr = Vec::with_capacity(cell_count + 1);
        self.stripes.clear();
        self.stripe_ptr.push(0);

        let mut targets = Vec::with_capacity(offsets.len());
        for m in 0..cell_count {
            let origin = self.unflatten(m);
            targets.clear();
            for offset in &offsets {
                if let Some(target) = self.shifted(origin, *offset, periodic) {
                    targets.push(target);
                }
            }
            targets.sort_unstable();
            targets.dedup();

            let mut iter = targets.iter().copied();
            if let Some(first) = iter.next() {
                let (mut start, mut end) = (first, first + 1);
                for t in iter {
                    if t == end {
                        end += 1;
                    } else {
                        self.stripes.push((start, end));
                        start = t;
                        end = t + 1;
                    }
                }
                self.stripes.push((start, end));
            }
            self.stripe_ptr.push(self.stripes.len());
        }

        self.cell_ptr = vec![0; cell_count + 1];
        self.entries.clear();
        self.location.clear();

        trace!(
            dims = ?self.dims,
            offsets = offsets.len(),
            stripes = self.stripes.len(),
            "Generated cell grid"
        );
    }

    /// Cell offsets whose closest points lie within the cutoff.
    ///
    /// For rectangular boxes the per-axis gaps combine in quadrature; for sheared boxes only
    /// the largest per-axis gap is a guaranteed lower bound on the distance.
    fn offsets_in_range(&self, periodic: [bool; 3], orthorhombic: bool) -> Vec<[i64; 3]> {
        let reach: [i64; 3] =
            std::array::from_fn(|k| (self.cutoff / self.edges[k]).ceil().max(1.0) as i64);
        let cutoff_sq = self.cutoff * self.cutoff;

        iproduct!(
            -reach[0]..=reach[0],
            -reach[1]..=reach[1],
            -reach[2]..=reach[2]
        )
        .map(|(dx, dy, dz)| [dx, dy, dz])
        .filter(|d| {
            let gaps: [f64; 3] = std::array::from_fn(|k| {
                let n = self.dims[k] as i64;
                let dn = if periodic[k] {
                    let a = d[k].rem_euclid(n);
                    a.min(n - a)
                } else {
                    d[k].abs()
                };
                (dn.max(1) - 1) as f64 * self.edges[k]
            });
            let bound = if orthorhombic {
                gaps.iter().map(|g| g * g).sum::<f64>()
            } else {
                gaps.iter().fold(0.0_f64, |acc, g| acc.max(g * g))
            };
            bound <= cutoff_sq
        })
        .collect()
    }

    fn shifted(&self, origin: [usize; 3], offset: [i64; 3], periodic: [bool; 3]) -> Option<usize> {
        let mut target = [0usize; 3];
        for k in 0..3 {
            let n = self.dims[k] as i64;
            let t = origin[k] as i64 + offset[k];
            target[k] = if periodic[k] {
                t.rem_euclid(n) as usize
            } else if (0..n).contains(&t) {
                t as usize
            } else {
                return None;
            };
        }
        Some(self.flatten(target))
    }

    #[inline]
    fn flatten(&self, c: [usize; 3]) -> usize {
        c[0] + self.dims[0] * (c[1] + self.dims[1] * c[2])
    }

    #[inline]
    fn unflatten(&self, m: usize) -> [usize; 3] {
        let nx = self.dims[0];
        let ny = self.dims[1];
        [m % nx, (m / nx) % ny, m / (nx * ny)]
    }

    /// Rebuilds every site bucket from scratch.
    pub fn rebuild<'a, I>(&mut self, geometry: &SimulationBox, sites: I)
    where
        I: IntoIterator<Item = (SiteId, &'a Point3<f64>)>,
    {
        let cell_count = self.cell_count();
        let assigned: Vec<(SiteId, usize)> = sites
            .into_iter()
            .map(|(id, pos)| (id, self.cell_index(geometry, pos)))
            .collect();

        let mut counts = vec![0usize; cell_count + 1];
        for &(_, m) in &assigned {
            counts[m + 1] += 1;
        }
        for m in 0..cell_count {
            counts[m + 1] += counts[m];
        }
        self.cell_ptr = counts;

        let mut fill = self.cell_ptr.clone();
        self.entries.clear();
        self.entries.resize(assigned.len(), SiteId::default());
        self.location.clear();
        for (id, m) in assigned {
            let slot = fill[m];
            fill[m] += 1;
            self.entries[slot] = id;
            self.location.insert(id, (m, slot));
        }
    }

    /// Maps a position to its flat cell index in `[0, Nx·Ny·Nz)`.
    ///
    /// Positions are folded into the primary cell first; on non-periodic axes they are
    /// clamped to the boundary cells.
    pub fn cell_index(&self, geometry: &SimulationBox, position: &Point3<f64>) -> usize {
        let s = geometry.to_fractional(&geometry.wrap(position));
        let c: [usize; 3] = std::array::from_fn(|k| {
            let n = self.dims[k];
            let raw = (s[k] * n as f64).floor();
            if raw <= 0.0 {
                0
            } else {
                (raw as usize).min(n - 1)
            }
        });
        self.flatten(c)
    }

    /// Re-files `id` after its position changed.
    ///
    /// # Return
    ///
    /// `true` if the site moved to a different cell.
    pub fn update(&mut self, geometry: &SimulationBox, id: SiteId, position: &Point3<f64>) -> bool {
        let target = self.cell_index(geometry, position);
        match self.location.get(id).copied() {
            Some((cell, _)) if cell == target => false,
            Some((cell, slot)) => {
                if cell < target {
                    self.relocate_up(id, cell, slot, target);
                } else {
                    self.relocate_down(id, cell, slot, target);
                }
                true
            }
            None => false,
        }
    }

    fn place(&mut self, slot: usize, id: SiteId, cell: usize) {
        self.entries[slot] = id;
        self.location.insert(id, (cell, slot));
    }

    fn fill_hole(&mut self, hole: usize, from: usize) {
        if hole != from {
            let moved = self.entries[from];
            self.entries[hole] = moved;
            if let Some(loc) = self.location.get_mut(moved) {
                loc.1 = hole;
            }
        }
    }

    fn relocate_up(&mut self, id: SiteId, from: usize, slot: usize, to: usize) {
        let last = self.cell_ptr[from + 1] - 1;
        self.fill_hole(slot, last);
        let mut hole = last;
        for c in from + 1..=to {
            self.cell_ptr[c] -= 1;
            if c == to {
                break;
            }
            let last = self.cell_ptr[c + 1] - 1;
            self.fill_hole(hole, last);
            hole = last;
        }
        self.place(hole, id, to);
    }

    fn relocate_down(&mut self, id: SiteId, from: usize, slot: usize, to: usize) {
        let first = self.cell_ptr[from];
        self.fill_hole(slot, first);
        let mut hole = first;
        for c in (to + 1..=from).rev() {
            self.cell_ptr[c] += 1;
            if c - 1 == to {
                break;
            }
            let first = self.cell_ptr[c - 1];
            self.fill_hole(hole, first);
            hole = first;
        }
        self.place(hole, id, to);
    }

    /// Cell currently holding `id`.
    pub fn cell_of(&self, id: SiteId) -> Option<usize> {
        self.location.get(id).map(|&(cell, _)| cell)
    }

    /// Sites filed under cell `m`.
    pub fn cell_sites(&self, m: usize) -> &[SiteId] {
        &self.entries[self.cell_ptr[m]..self.cell_ptr[m + 1]]
    }

    /// Stripes of neighbor cells for cell `m`, as half-open ranges of flat cell indices.
    pub fn stripes(&self, m: usize) -> &[(usize, usize)] {
        &self.stripes[self.stripe_ptr[m]..self.stripe_ptr[m + 1]]
    }

    /// Every cell within interaction range of cell `m`, including `m` itself.
    pub fn neighbor_cells(&self, m: usize) -> impl Iterator<Item = usize> + '_ {
        self.stripes(m).iter().flat_map(|&(start, end)| start..end)
    }

    /// Candidate interaction partners of `id`: every site in the stripes of its cell,
    /// `id` itself included.
    pub fn neighbors(&self, id: SiteId) -> impl Iterator<Item = SiteId> + '_ {
        self.cell_of(id).into_iter().flat_map(move |m| {
            self.stripes(m).iter().flat_map(move |&(start, end)| {
                self.entries[self.cell_ptr[start]..self.cell_ptr[end]]
                    .iter()
                    .copied()
            })
        })
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    pub fn cell_count(&self) -> usize {
        self.dims[0] * self.dims[1] * self.dims[2]
    }

    /// Edge widths of a single cell.
    pub fn edges(&self) -> Vector3<f64> {
        self.edges
    }

    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Flat site array followed by the `M + 1` cell pointers.
    pub fn raw(&self) -> (&[SiteId], &[usize]) {
        (&self.entries, &self.cell_ptr)
    }
}
