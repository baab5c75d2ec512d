/// Multi-way bounding volume hierarchy over a mesh's triangles
///
/// Layout:
/// - Nodes live in one flat array and reference children by index
/// - Nodes are appended post-order, so every child index is smaller than its
///   parent's and the root is always the last element
/// - A side table maps each source triangle to its leaf for O(1) lookup
///
/// World-space boxes are computed once by `build`. Screen-space boxes are
/// refreshed every frame: the caller writes the leaves, then
/// `update_viewport_data` propagates them upwards and reorders children so a
/// front-to-back walk visits likely-visible, likely-near geometry first.
use crate::geometry::Aabb;
use crate::meshing::Mesh;
use anyhow::{ensure, Result};
use glam::Vec3;
use rayon::prelude::*;
use std::time::Instant;

/// Maximum number of children of an interior node.
pub const BVH_FAN_OUT: usize = 4;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BvhNodeKind {
    /// Covers exactly one triangle of the source mesh.
    Leaf { triangle: u32 },
    /// `children[..len]` are valid node indices.
    Interior {
        children: [u32; BVH_FAN_OUT],
        len: u8,
    },
}

#[derive(Copy, Clone, Debug)]
pub struct BvhNode {
    pub kind: BvhNodeKind,
    /// World-space bounds, static for rigid geometry.
    pub aabb: Aabb,
    /// Screen-space bounds (x, y in pixels, z in NDC depth) for the current frame.
    pub viewport_aabb: Aabb,
    /// Number of leaves in this subtree.
    pub leaf_count: u32,
    /// Set when the subtree was rejected by occlusion culling last frame.
    pub culled_last_frame: bool,
    pub parent: Option<u32>,
}

impl BvhNode {
    fn leaf(triangle: u32, aabb: Aabb) -> Self {
        Self {
            kind: BvhNodeKind::Leaf { triangle },
            aabb,
            viewport_aabb: Aabb::EMPTY,
            leaf_count: 1,
            culled_last_frame: false,
            parent: None,
        }
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, BvhNodeKind::Leaf { .. })
    }

    /// Source triangle of a leaf.
    #[inline]
    pub fn triangle(&self) -> Option<u32> {
        match self.kind {
            BvhNodeKind::Leaf { triangle } => Some(triangle),
            BvhNodeKind::Interior { .. } => None,
        }
    }

    /// Child node indices; empty for leaves.
    #[inline]
    pub fn children(&self) -> &[u32] {
        match &self.kind {
            BvhNodeKind::Leaf { .. } => &[],
            BvhNodeKind::Interior { children, len } => &children[..*len as usize],
        }
    }
}

/// Statistics of one `Bvh::build` call.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct BuildStats {
    pub node_count: usize,
    pub leaf_count: usize,
    /// Edges on the longest root-to-leaf path.
    pub max_depth: u32,
}

#[derive(Clone, Copy)]
struct LeafInput {
    triangle: u32,
    aabb: Aabb,
    centroid: Vec3,
}

#[derive(Clone, Debug, Default)]
pub struct Bvh {
    nodes: Vec<BvhNode>,
    leaf_of_triangle: Vec<u32>,
    max_depth: u32,
}

impl Bvh {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience for `Bvh::new()` followed by `build`.
    pub fn from_mesh(mesh: &Mesh) -> Result<Self> {
        let mut bvh = Self::new();
        bvh.build(mesh)?;
        Ok(bvh)
    }

    /// Build the hierarchy over every triangle of `mesh`.
    ///
    /// An empty mesh leaves the tree empty. Building over a tree that was
    /// already built is an error; call [`Bvh::reset`] first.
    pub fn build(&mut self, mesh: &Mesh) -> Result<BuildStats> {
        ensure!(
            self.nodes.is_empty(),
            "Bvh::build called on a tree that still holds {} nodes; reset() it first",
            self.nodes.len()
        );

        let start = Instant::now();
        let triangle_count = mesh.triangle_count();
        ensure!(
            triangle_count <= u32::MAX as usize,
            "mesh has {} triangles, more than a BVH can index",
            triangle_count
        );
        log::info!("Start BVH build [{} triangles]", triangle_count);

        let mut leaves: Vec<LeafInput> = (0..triangle_count)
            .into_par_iter()
            .filter_map(|tri| {
                let [a, b, c] = mesh.triangle_positions(tri)?;
                Some(LeafInput {
                    triangle: tri as u32,
                    aabb: Aabb::from_points([a, b, c]),
                    centroid: (a + b + c) / 3.0,
                })
            })
            .collect();

        if leaves.is_empty() {
            return Ok(BuildStats::default());
        }

        self.nodes.reserve(leaves.len() * 2);
        let mut max_depth = 0;
        build_recursive(&mut leaves, &mut self.nodes, 0, &mut max_depth);
        self.max_depth = max_depth;

        self.leaf_of_triangle = vec![u32::MAX; triangle_count];
        for (index, node) in self.nodes.iter().enumerate() {
            if let BvhNodeKind::Leaf { triangle } = node.kind {
                self.leaf_of_triangle[triangle as usize] = index as u32;
            }
        }

        let stats = BuildStats {
            node_count: self.nodes.len(),
            leaf_count: self.root().map_or(0, |root| root.leaf_count as usize),
            max_depth,
        };
        log::info!(
            "BVH build: nodes={}, depth={}, leaves={} in {:.2}ms",
            stats.node_count,
            stats.max_depth,
            stats.leaf_count,
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(stats)
    }

    /// Drop every node. The tree can then be rebuilt.
    pub fn reset(&mut self) {
        self.nodes.clear();
        self.leaf_of_triangle.clear();
        self.max_depth = 0;
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Depth of the deepest leaf (0 for a single-leaf tree).
    #[inline]
    pub fn depth(&self) -> u32 {
        self.max_depth
    }

    #[inline]
    pub fn nodes(&self) -> &[BvhNode] {
        &self.nodes
    }

    #[inline]
    pub fn root_index(&self) -> Option<u32> {
        self.nodes.len().checked_sub(1).map(|i| i as u32)
    }

    #[inline]
    pub fn root(&self) -> Option<&BvhNode> {
        self.nodes.last()
    }

    #[inline]
    pub fn node(&self, index: u32) -> Option<&BvhNode> {
        self.nodes.get(index as usize)
    }

    #[inline]
    pub fn node_mut(&mut self, index: u32) -> Option<&mut BvhNode> {
        self.nodes.get_mut(index as usize)
    }

    /// Index of the leaf covering source triangle `triangle`.
    #[inline]
    pub fn leaf_index_of(&self, triangle: u32) -> Option<u32> {
        self.leaf_of_triangle.get(triangle as usize).copied()
    }

    #[inline]
    pub fn leaf_by_triangle(&self, triangle: u32) -> Option<&BvhNode> {
        self.leaf_index_of(triangle).and_then(|i| self.node(i))
    }

    #[inline]
    pub fn leaf_by_triangle_mut(&mut self, triangle: u32) -> Option<&mut BvhNode> {
        let index = self.leaf_index_of(triangle)?;
        self.node_mut(index)
    }

    /// Propagate leaf screen-space boxes to the root and reorder every node's
    /// children: not-culled-last-frame first, then by ascending nearest depth.
    pub fn update_viewport_data(&mut self) {
        if let Some(root) = self.root_index() {
            refresh_viewport(&mut self.nodes, root as usize);
        }
    }

    /// Depth-first walk in stored child order (front-to-back after
    /// `update_viewport_data`). `visit` returns whether to descend into the
    /// node's children.
    pub fn traverse<F>(&mut self, mut visit: F)
    where
        F: FnMut(u32, &mut BvhNode) -> bool,
    {
        let Some(root) = self.root_index() else {
            return;
        };
        let mut stack = vec![root];
        while let Some(index) = stack.pop() {
            let node = &mut self.nodes[index as usize];
            if visit(index, node) {
                stack.extend(node.children().iter().rev());
            }
        }
    }
}

fn build_recursive(
    leaves: &mut [LeafInput],
    nodes: &mut Vec<BvhNode>,
    depth: u32,
    max_depth: &mut u32,
) -> u32 {
    *max_depth = (*max_depth).max(depth);

    if let [single] = leaves {
        let index = nodes.len() as u32;
        nodes.push(BvhNode::leaf(single.triangle, single.aabb));
        return index;
    }

    let axis = (depth % 3) as usize;
    leaves.sort_unstable_by(|a, b| a.centroid[axis].total_cmp(&b.centroid[axis]));

    let n = leaves.len();
    let groups = n.min(BVH_FAN_OUT);
    let (base, extra) = (n / groups, n % groups);

    let mut children = [0u32; BVH_FAN_OUT];
    let mut aabb = Aabb::EMPTY;
    let mut leaf_count = 0;
    let mut rest = leaves;
    for (g, slot) in children.iter_mut().enumerate().take(groups) {
        let size = base + usize::from(g < extra);
        let (head, tail) = std::mem::take(&mut rest).split_at_mut(size);
        let child = build_recursive(head, nodes, depth + 1, max_depth);
        aabb |= nodes[child as usize].aabb;
        leaf_count += nodes[child as usize].leaf_count;
        *slot = child;
        rest = tail;
    }

    let index = nodes.len() as u32;
    for &child in &children[..groups] {
        nodes[child as usize].parent = Some(index);
    }
    nodes.push(BvhNode {
        kind: BvhNodeKind::Interior {
            children,
            len: groups as u8,
        },
        aabb,
        viewport_aabb: Aabb::EMPTY,
        leaf_count,
        culled_last_frame: false,
        parent: None,
    });
    index
}

fn refresh_viewport(nodes: &mut [BvhNode], index: usize) -> Aabb {
    let (mut children, len) = match nodes[index].kind {
        BvhNodeKind::Leaf { .. } => return nodes[index].viewport_aabb,
        BvhNodeKind::Interior { children, len } => (children, len),
    };

    let mut bounds = Aabb::EMPTY;
    for &child in &children[..len as usize] {
        bounds |= refresh_viewport(nodes, child as usize);
    }

    children[..len as usize].sort_by(|&a, &b| {
        let (a, b) = (&nodes[a as usize], &nodes[b as usize]);
        a.culled_last_frame
            .cmp(&b.culled_last_frame)
            .then(a.viewport_aabb.min.z.total_cmp(&b.viewport_aabb.min.z))
    });

    let node = &mut nodes[index];
    node.viewport_aabb = bounds;
    node.kind = BvhNodeKind::Interior { children, len };
    bounds
}
