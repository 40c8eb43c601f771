//! Barnes-Hut quadtree over node positions
//!
//! The tree is rebuilt from scratch every simulation step. Regions live in a
//! pool addressed by index; `before_update` rewinds the pool and reuses the
//! slots of the previous step, `after_update` drops the slots the new tree no
//! longer needs. Once the pool has grown to the size of the graph, a rebuild
//! performs no allocation.
//!
//! A region holds either exactly one node (a leaf) or up to four child
//! regions, never both. The only exception is a leaf at `MAX_DEPTH`: nodes
//! that still share it (coincident positions) are kept in an overflow list
//! instead of splitting forever.

use crate::vec2::Vec2;

/// Index of the root region in the pool
pub const ROOT: usize = 0;

/// Depth at which leaves stop splitting
pub const MAX_DEPTH: u32 = 32;

/// Anything that can be inserted into the tree
pub trait Body {
    fn position(&self) -> Vec2;
    fn mass(&self) -> f32;
}

/// Axis-aligned bounding box `[min_x, min_y, max_x, max_y]`
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Bounds {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

impl Bounds {
    pub fn new(min_x: f32, min_y: f32, max_x: f32, max_y: f32) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Smallest box containing every point; all zeros when there are none
    pub fn from_points(points: impl IntoIterator<Item = Vec2>) -> Self {
        let mut points = points.into_iter();
        let Some(first) = points.next() else {
            return Self::default();
        };
        let mut bounds = Self::new(first.x, first.y, first.x, first.y);
        for p in points {
            bounds.min_x = bounds.min_x.min(p.x);
            bounds.min_y = bounds.min_y.min(p.y);
            bounds.max_x = bounds.max_x.max(p.x);
            bounds.max_y = bounds.max_y.max(p.y);
        }
        bounds
    }

    pub fn contains(&self, x: f32, y: f32) -> bool {
        self.min_x <= x && self.max_x >= x && self.min_y <= y && self.max_y >= y
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new(
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    /// Mean side length, used as the Barnes-Hut size scale
    pub fn size(&self) -> f32 {
        (self.max_x - self.min_x + self.max_y - self.min_y) / 2.0
    }

    /// The quadrant of this box that `p` falls in (2x2 split at the midpoint)
    fn quadrant_of(&self, p: Vec2) -> Bounds {
        let c = self.center();
        let w = (self.max_x - self.min_x) / 2.0;
        let h = (self.max_y - self.min_y) / 2.0;
        let xi = if p.x >= c.x { 1.0 } else { 0.0 };
        let yi = if p.y >= c.y { 1.0 } else { 0.0 };
        Bounds::new(
            self.min_x + xi * w,
            self.min_y + yi * h,
            self.min_x + (xi + 1.0) * w,
            self.min_y + (yi + 1.0) * h,
        )
    }
}

/// One quadtree cell
#[derive(Debug, Clone, Default)]
pub struct Region {
    pub bbox: Bounds,
    /// Cached `bbox.size()`
    pub size: f32,
    /// Total mass of every node beneath this region
    pub mass: f32,
    pub center_of_mass: Vec2,
    /// Leaf payload; `None` once the region has been split
    pub node: Option<usize>,
    sub_regions: [usize; 4],
    n_sub_regions: usize,
    overflow: Vec<usize>,
    depth: u32,
}

impl Region {
    fn reset(&mut self, bbox: Bounds, depth: u32) {
        self.bbox = bbox;
        self.size = bbox.size();
        self.mass = 0.0;
        self.center_of_mass = Vec2::ZERO;
        self.node = None;
        self.n_sub_regions = 0;
        self.overflow.clear();
        self.depth = depth;
    }

    pub fn is_leaf(&self) -> bool {
        self.n_sub_regions == 0
    }

    /// Pool indices of the children actually in use
    pub fn sub_regions(&self) -> &[usize] {
        &self.sub_regions[..self.n_sub_regions]
    }

    /// Coincident nodes sharing this leaf past `MAX_DEPTH`
    pub fn overflow(&self) -> &[usize] {
        &self.overflow
    }
}

/// Pooled Barnes-Hut quadtree
#[derive(Debug, Default)]
pub struct QuadTree {
    regions: Vec<Region>,
    len: usize,
}

impl QuadTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rewind the pool and install an empty root covering `bbox`
    pub fn before_update(&mut self, bbox: Bounds) {
        self.len = 0;
        self.alloc(bbox, 0);
    }

    /// Drop pool slots left over from a larger previous tree
    pub fn after_update(&mut self) {
        self.regions.truncate(self.len);
    }

    /// Rebuild the whole tree over `bodies`
    pub fn rebuild<B: Body>(&mut self, bbox: Bounds, bodies: &[B]) {
        self.before_update(bbox);
        for i in 0..bodies.len() {
            self.add_node(i, bodies);
        }
        self.after_update();
    }

    /// Insert `bodies[index]` below the root
    pub fn add_node<B: Body>(&mut self, index: usize, bodies: &[B]) {
        self.insert(ROOT, index, bodies);
    }

    pub fn root(&self) -> &Region {
        &self.regions[ROOT]
    }

    pub fn region(&self, index: usize) -> &Region {
        &self.regions[index]
    }

    /// Number of live regions
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The child of `region` whose box contains `(x, y)`
    pub fn find_sub_region(&self, region: usize, x: f32, y: f32) -> Option<usize> {
        self.regions[region]
            .sub_regions()
            .iter()
            .copied()
            .find(|&s| self.regions[s].bbox.contains(x, y))
    }

    fn alloc(&mut self, bbox: Bounds, depth: u32) -> usize {
        let index = self.len;
        if index < self.regions.len() {
            self.regions[index].reset(bbox, depth);
        } else {
            let mut region = Region::default();
            region.reset(bbox, depth);
            self.regions.push(region);
        }
        self.len += 1;
        index
    }

    fn insert<B: Body>(&mut self, r: usize, index: usize, bodies: &[B]) {
        let body = &bodies[index];
        self.update_center_of_mass(r, body.position(), body.mass());

        let region = &mut self.regions[r];
        if region.is_leaf() {
            let held = region.node;
            match held {
                None => {
                    region.node = Some(index);
                    return;
                }
                Some(_) if region.depth >= MAX_DEPTH => {
                    region.overflow.push(index);
                    return;
                }
                Some(existing) => {
                    region.node = None;
                    self.add_to_sub_region(r, existing, bodies);
                }
            }
        }
        self.add_to_sub_region(r, index, bodies);
    }

    fn add_to_sub_region<B: Body>(&mut self, r: usize, index: usize, bodies: &[B]) {
        let p = bodies[index].position();
        let sub = match self.find_sub_region(r, p.x, p.y) {
            Some(sub) => sub,
            None if self.regions[r].n_sub_regions == 4 => {
                // Only reachable with non-finite coordinates
                self.regions[r].sub_regions[0]
            }
            None => {
                let parent = &self.regions[r];
                let bbox = parent.bbox.quadrant_of(p);
                let depth = parent.depth + 1;
                let sub = self.alloc(bbox, depth);
                let parent = &mut self.regions[r];
                parent.sub_regions[parent.n_sub_regions] = sub;
                parent.n_sub_regions += 1;
                sub
            }
        };
        self.insert(sub, index, bodies);
    }

    fn update_center_of_mass(&mut self, r: usize, p: Vec2, mass: f32) {
        let region = &mut self.regions[r];
        let total = region.mass + mass;
        if total > 0.0 {
            region.center_of_mass = region
                .center_of_mass
                .scale(region.mass)
                .scale_and_add(p, mass)
                .scale(1.0 / total);
        }
        region.mass = total;
    }

    /// Walk the tree on behalf of a node at `query`.
    ///
    /// Leaves call `leaf` once per node they hold. A split region far enough
    /// away (`d² > θ²·size²` to its center of mass) is handed to `far` as a
    /// single pseudo-node; closer ones are opened. A larger `theta` opens
    /// more regions. Regions containing `query`, and zero-size regions, are
    /// always opened.
    pub fn walk<L, F>(&self, query: Vec2, theta: f32, mut leaf: L, mut far: F)
    where
        L: FnMut(usize),
        F: FnMut(&Region),
    {
        if self.is_empty() {
            return;
        }
        self.walk_region(ROOT, query, theta * theta, &mut leaf, &mut far);
    }

    fn walk_region<L, F>(&self, r: usize, query: Vec2, theta2: f32, leaf: &mut L, far: &mut F)
    where
        L: FnMut(usize),
        F: FnMut(&Region),
    {
        let region = &self.regions[r];
        if region.is_leaf() {
            if let Some(node) = region.node {
                leaf(node);
            }
            for &node in &region.overflow {
                leaf(node);
            }
            return;
        }

        // A region around the query point holds the query node itself
        let d2 = query.sub(region.center_of_mass).length_squared();
        let outside = region.size > 0.0 && !region.bbox.contains(query.x, query.y);
        if outside && d2 > theta2 * region.size * region.size {
            far(region);
        } else {
            for &sub in region.sub_regions() {
                self.walk_region(sub, query, theta2, leaf, far);
            }
        }
    }
}
