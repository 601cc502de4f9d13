//! Quadtree meshes of axis-aligned square cells.
//!
//! A cell is addressed by its refinement level and its integer position on
//! that level, so refining and coarsening never need to store connectivity.
//! Vertices are addressed on the lattice of the finest representable level,
//! which makes coincident vertices of differently refined cells compare equal.

pub mod marking;

use std::collections::{BTreeMap, BTreeSet};

use crate::prelude::*;

/// Finest representable refinement level
pub const MAX_LEVEL: u8 = 24;

/// Integer vertex coordinates on the lattice of level `MAX_LEVEL`
pub type VertexKey = [u32; 2];

//------------------------------------------------------------------------------
// Cells
//------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId {
    pub level: u8,
    pub i: u32,
    pub j: u32,
}

impl CellId {
    pub const ROOT: CellId = CellId {
        level: 0,
        i: 0,
        j: 0,
    };

    pub fn new(level: u8, i: u32, j: u32) -> Self {
        CellId { level, i, j }
    }

    pub fn parent(&self) -> Option<CellId> {
        (self.level > 0).then(|| CellId::new(self.level - 1, self.i / 2, self.j / 2))
    }

    /// Children in local vertex order: the k-th child holds the k-th vertex
    pub fn children(&self) -> [CellId; 4] {
        let (i, j) = (2 * self.i, 2 * self.j);
        [0, 1, 2, 3].map(|k| CellId::new(self.level + 1, i + k % 2, j + k / 2))
    }

    /// Cells of the same parent, including self
    pub fn siblings(&self) -> Option<[CellId; 4]> {
        self.parent().map(|p| p.children())
    }

    /// Same-level cell across a face, if inside the domain
    pub fn neighbor(&self, face: Face) -> Option<CellId> {
        let n = 1u32 << self.level;
        let (i, j) = (self.i, self.j);
        match face {
            Face::Left => (i > 0).then(|| CellId::new(self.level, i - 1, j)),
            Face::Right => (i + 1 < n).then(|| CellId::new(self.level, i + 1, j)),
            Face::Bottom => (j > 0).then(|| CellId::new(self.level, i, j - 1)),
            Face::Top => (j + 1 < n).then(|| CellId::new(self.level, i, j + 1)),
        }
    }

    /// True if other is self or one of its descendants
    pub fn contains(&self, other: &CellId) -> bool {
        other.level >= self.level
            && other.i >> (other.level - self.level) == self.i
            && other.j >> (other.level - self.level) == self.j
    }

    /// Lattice coordinates of local vertex k (x index fastest)
    pub fn vertex(&self, k: usize) -> VertexKey {
        let shift = MAX_LEVEL - self.level;
        [
            (self.i + (k % 2) as u32) << shift,
            (self.j + (k / 2) as u32) << shift,
        ]
    }

    pub fn vertices(&self) -> [VertexKey; 4] {
        [0, 1, 2, 3].map(|k| self.vertex(k))
    }

    /// Lattice coordinates of the midpoint of a face
    pub fn face_midpoint(&self, face: Face) -> VertexKey {
        let [a, b] = face.vertices().map(|k| self.vertex(k));
        [(a[0] + b[0]) / 2, (a[1] + b[1]) / 2]
    }
}

//------------------------------------------------------------------------------
// Faces
//------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Face {
    Left,
    Right,
    Bottom,
    Top,
}

impl Face {
    pub const ALL: [Face; 4] = [Face::Left, Face::Right, Face::Bottom, Face::Top];

    /// Local vertices on this face, ordered along the face
    pub fn vertices(self) -> [usize; 2] {
        match self {
            Face::Left => [0, 2],
            Face::Right => [1, 3],
            Face::Bottom => [0, 1],
            Face::Top => [2, 3],
        }
    }

    pub fn opposite(self) -> Face {
        match self {
            Face::Left => Face::Right,
            Face::Right => Face::Left,
            Face::Bottom => Face::Top,
            Face::Top => Face::Bottom,
        }
    }

    /// Outward unit normal
    pub fn normal(self) -> Vector2 {
        match self {
            Face::Left => Vector2::new(-1., 0.),
            Face::Right => Vector2::new(1., 0.),
            Face::Bottom => Vector2::new(0., -1.),
            Face::Top => Vector2::new(0., 1.),
        }
    }
}

/// Active cells across a face of an active cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Neighbor {
    Boundary,
    /// Neighbor on the same or a coarser level
    Cell(CellId),
    /// Two neighbors one level finer, ordered along the face
    Children([CellId; 2]),
}

//------------------------------------------------------------------------------
// Geometry
//------------------------------------------------------------------------------

/// Affine map from the reference square [-1, 1]^2 onto a cell
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellGeometry {
    pub lower: Point2,
    pub h: f64,
}

impl CellGeometry {
    pub fn to_physical(&self, xi: &Point2) -> Point2 {
        self.lower + (xi.coords.add_scalar(1.)) * (self.h / 2.)
    }

    pub fn to_reference(&self, p: &Point2) -> Point2 {
        Point2::from((p - self.lower) * (2. / self.h)).map(|x| x - 1.)
    }

    /// Determinant of the reference-to-physical Jacobian
    pub fn jacobian(&self) -> f64 {
        self.h * self.h / 4.
    }

    /// Scaling from reference to physical gradients
    pub fn gradient_scale(&self) -> f64 {
        2. / self.h
    }

    pub fn diameter(&self) -> f64 {
        self.h * std::f64::consts::SQRT_2
    }

    pub fn center(&self) -> Point2 {
        self.lower + Vector2::repeat(self.h / 2.)
    }
}

//------------------------------------------------------------------------------
// Mesh
//------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefinementFlag {
    Refine,
    Coarsen,
}

/// Active cells of a quadtree over the square [lower, upper]^2
#[derive(Debug, Clone)]
pub struct Mesh {
    lower: f64,
    upper: f64,
    active: BTreeSet<CellId>,
    flags: BTreeMap<CellId, RefinementFlag>,
}

impl Mesh {
    /// Single cell covering [lower, upper]^2
    pub fn hyper_cube(lower: f64, upper: f64) -> Self {
        Mesh {
            lower,
            upper,
            active: BTreeSet::from([CellId::ROOT]),
            flags: BTreeMap::new(),
        }
    }

    /// Split every active cell `times` times; cells at `MAX_LEVEL` stay as they are
    pub fn refine_global(&mut self, times: usize) {
        for _ in 0..times {
            self.active = self
                .active
                .iter()
                .flat_map(|c| {
                    if c.level < MAX_LEVEL {
                        c.children().to_vec()
                    } else {
                        vec![*c]
                    }
                })
                .collect();
        }
        self.flags.clear();
    }

    pub fn n_active_cells(&self) -> usize {
        self.active.len()
    }

    /// Active cells in ascending (level, i, j) order
    pub fn active_cells(&self) -> impl Iterator<Item = CellId> + '_ {
        self.active.iter().copied()
    }

    /// Number of levels in use, i.e. finest active level + 1
    pub fn n_levels(&self) -> usize {
        self.active.iter().map(|c| c.level as usize + 1).max().unwrap_or(0)
    }

    pub fn is_active(&self, id: &CellId) -> bool {
        self.active.contains(id)
    }

    /// The active cell equal to or containing `id`
    pub fn active_ancestor(&self, id: &CellId) -> Option<CellId> {
        let mut cell = Some(*id);
        while let Some(c) = cell {
            if self.active.contains(&c) {
                return Some(c);
            }
            cell = c.parent();
        }
        None
    }

    /// Active cells across a face; assumes the 2:1 balance of a prepared mesh
    pub fn neighbor(&self, id: &CellId, face: Face) -> Neighbor {
        let Some(n) = id.neighbor(face) else {
            return Neighbor::Boundary;
        };
        match self.active_ancestor(&n) {
            Some(cell) => Neighbor::Cell(cell),
            None => {
                let children = n.children();
                Neighbor::Children(face.opposite().vertices().map(|k| children[k]))
            }
        }
    }

    pub fn cell_geometry(&self, id: &CellId) -> CellGeometry {
        let h = (self.upper - self.lower) / (1u64 << id.level) as f64;
        CellGeometry {
            lower: Point2::new(
                self.lower + id.i as f64 * h,
                self.lower + id.j as f64 * h,
            ),
            h,
        }
    }

    pub fn vertex_position(&self, key: &VertexKey) -> Point2 {
        let scale = (self.upper - self.lower) / (1u64 << MAX_LEVEL) as f64;
        Point2::new(
            self.lower + key[0] as f64 * scale,
            self.lower + key[1] as f64 * scale,
        )
    }

    pub fn is_boundary_vertex(&self, key: &VertexKey) -> bool {
        let n = 1u32 << MAX_LEVEL;
        key.iter().any(|&x| x == 0 || x == n)
    }

    //--------------------------------------------------------------------------
    // Flags
    //--------------------------------------------------------------------------

    pub fn flag(&self, id: &CellId) -> Option<RefinementFlag> {
        self.flags.get(id).copied()
    }

    pub fn set_refine_flag(&mut self, id: CellId) {
        if id.level < MAX_LEVEL {
            self.flags.insert(id, RefinementFlag::Refine);
        }
    }

    pub fn set_coarsen_flag(&mut self, id: CellId) {
        self.flags.insert(id, RefinementFlag::Coarsen);
    }

    pub fn clear_refine_flag(&mut self, id: &CellId) {
        if self.flag(id) == Some(RefinementFlag::Refine) {
            self.flags.remove(id);
        }
    }

    pub fn clear_coarsen_flag(&mut self, id: &CellId) {
        if self.flag(id) == Some(RefinementFlag::Coarsen) {
            self.flags.remove(id);
        }
    }

    pub fn clear_flags(&mut self) {
        self.flags.clear();
    }

    pub fn n_refine_flags(&self) -> usize {
        self.flags
            .values()
            .filter(|&&f| f == RefinementFlag::Refine)
            .count()
    }

    pub fn n_coarsen_flags(&self) -> usize {
        self.flags
            .values()
            .filter(|&&f| f == RefinementFlag::Coarsen)
            .count()
    }

    /// Level a cell will have after the flagged adaptation
    fn target_level(&self, id: &CellId) -> i32 {
        match self.flag(id) {
            Some(RefinementFlag::Refine) => id.level as i32 + 1,
            Some(RefinementFlag::Coarsen) => id.level as i32 - 1,
            None => id.level as i32,
        }
    }

    fn cancel_coarsening(&mut self, id: &CellId) {
        if let Some(siblings) = id.siblings() {
            for s in siblings.iter() {
                self.clear_coarsen_flag(s);
            }
        }
    }

    /// Make the flags executable: coarsening only for complete sibling groups,
    /// and at most one level difference between face neighbors afterwards.
    pub fn prepare_coarsening_and_refinement(&mut self) {
        let active = &self.active;
        self.flags.retain(|id, _| active.contains(id));

        // Coarsening needs all four siblings active and flagged
        let coarsen = self
            .flags
            .iter()
            .filter(|(_, &f)| f == RefinementFlag::Coarsen)
            .map(|(&id, _)| id)
            .collect_vec();
        for id in coarsen {
            let complete = id.siblings().is_some_and(|siblings| {
                siblings.iter().all(|s| {
                    self.is_active(s) && self.flag(s) == Some(RefinementFlag::Coarsen)
                })
            });
            if !complete {
                self.cancel_coarsening(&id);
            }
        }

        // Balance: finer cells pull too-coarse neighbors up
        let cells = self.active.iter().copied().collect_vec();
        let mut sweeps = 0;
        loop {
            let mut changed = false;
            for cell in cells.iter() {
                let target = self.target_level(cell);
                for face in Face::ALL {
                    let Some(n) = cell.neighbor(face) else {
                        continue;
                    };
                    let Some(other) = self.active_ancestor(&n) else {
                        continue;
                    };
                    if self.target_level(&other) + 1 >= target {
                        continue;
                    }
                    if self.flag(&other) == Some(RefinementFlag::Coarsen) {
                        self.cancel_coarsening(&other);
                    } else {
                        self.set_refine_flag(other);
                    }
                    changed = true;
                }
            }
            sweeps += 1;
            if !changed {
                break;
            }
        }
        log::debug!(
            "prepared adaptation in {} sweeps: {} cells to refine, {} to coarsen",
            sweeps,
            self.n_refine_flags(),
            self.n_coarsen_flags()
        );
    }

    /// Apply the prepared flags, producing the new set of active cells
    pub fn execute_coarsening_and_refinement(&mut self) {
        let flags = std::mem::take(&mut self.flags);
        for (id, flag) in flags.iter() {
            match flag {
                RefinementFlag::Refine => {
                    if self.active.remove(id) {
                        self.active.extend(id.children());
                    }
                }
                RefinementFlag::Coarsen => {
                    let Some(parent) = id.parent() else {
                        continue;
                    };
                    let siblings = parent.children();
                    let complete = siblings.iter().all(|s| {
                        self.active.contains(s) && flags.get(s) == Some(&RefinementFlag::Coarsen)
                    });
                    if complete {
                        for s in siblings.iter() {
                            self.active.remove(s);
                        }
                        self.active.insert(parent);
                    }
                }
            }
        }
    }

    /// Largest level difference between face-adjacent active cells
    pub fn max_level_jump(&self) -> u8 {
        self.active
            .iter()
            .flat_map(|c| {
                Face::ALL.into_iter().filter_map(move |f| {
                    let n = c.neighbor(f)?;
                    self.active_ancestor(&n).map(|a| c.level - a.level)
                })
            })
            .max()
            .unwrap_or(0)
    }
}
