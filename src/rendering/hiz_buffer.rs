/// Hierarchical Z-buffer (max-depth mip pyramid) for conservative occlusion culling
///
/// Key Design Principles:
/// 1. Level 0 is the caller's depth surface itself; only levels 1.. are owned here
/// 2. Each coarser level is half the size (rounded up) of the one below
/// 3. Conservative depth: every texel stores the FARTHEST depth of its 2×2 footprint,
///    so "farther than the pyramid" means "farther than every covered pixel"
/// 4. Incremental upkeep: after a triangle is written only the texels above its
///    screen rectangle are recomputed
use super::framebuffer::DEPTH_CLEAR;
use super::surface::{DepthSurface, PixelRect, Surface};

/// A query stops descending once a level would need more texels than this.
/// Finer levels only touch more.
pub const HIZ_TEXEL_BUDGET: usize = 64;

#[derive(Clone, Debug, Default)]
pub struct HiZPyramid {
    base_width: usize,
    base_height: usize,
    /// `levels[i]` is mip level `i + 1`.
    levels: Vec<Surface<f32>>,
    stale: bool,
}

impl HiZPyramid {
    pub fn new() -> Self {
        Self {
            stale: true,
            ..Self::default()
        }
    }

    /// Number of levels including the base depth surface.
    #[inline]
    pub fn level_count(&self) -> usize {
        self.levels.len() + 1
    }

    /// Owned mip level `level` (>= 1).
    #[inline]
    pub fn level(&self, level: usize) -> Option<&Surface<f32>> {
        level.checked_sub(1).and_then(|i| self.levels.get(i))
    }

    #[inline]
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Force a full re-seed from the base surface before the next query.
    #[inline]
    pub fn mark_stale(&mut self) {
        self.stale = true;
    }

    /// Make the pyramid consistent with `depth`: reallocate the levels when the
    /// base dimensions changed, and re-seed every level if stale.
    pub fn prepare(&mut self, depth: &DepthSurface) {
        if depth.dimensions() != (self.base_width, self.base_height) {
            self.allocate(depth.width(), depth.height());
        }
        if self.stale {
            self.rebuild(depth);
            self.stale = false;
        }
    }

    fn allocate(&mut self, width: usize, height: usize) {
        self.base_width = width;
        self.base_height = height;
        self.levels.clear();

        let (mut w, mut h) = (width, height);
        while w > 1 || h > 1 {
            w = (w + 1) / 2;
            h = (h + 1) / 2;
            self.levels.push(Surface::new(w, h, DEPTH_CLEAR));
        }
        self.stale = true;

        log::debug!(
            "Hi-Z pyramid allocated for {}x{} ({} levels)",
            width,
            height,
            self.level_count()
        );
    }

    /// Recompute every owned level from `depth`.
    pub fn rebuild(&mut self, depth: &DepthSurface) {
        if depth.width() == 0 || depth.height() == 0 {
            return;
        }
        let full = PixelRect {
            x0: 0,
            y0: 0,
            x1: depth.width() - 1,
            y1: depth.height() - 1,
        };
        self.update_region(depth, full);
    }

    #[inline]
    fn level_surface<'a>(&'a self, depth: &'a DepthSurface, level: usize) -> &'a Surface<f32> {
        if level == 0 {
            depth
        } else {
            &self.levels[level - 1]
        }
    }

    /// Farthest stored depth over `rect` (base-level pixels) at mip `level`.
    pub fn farthest_depth(&self, depth: &DepthSurface, rect: PixelRect, level: usize) -> f32 {
        let surface = self.level_surface(depth, level);
        let r = rect.at_level(level);
        let mut farthest = f32::NEG_INFINITY;
        for y in r.y0..=r.y1.min(surface.height().saturating_sub(1)) {
            let row = surface.row(y);
            for &d in &row[r.x0..=r.x1.min(surface.width().saturating_sub(1))] {
                farthest = farthest.max(d);
            }
        }
        farthest
    }

    /// True if every pixel of `rect` already holds a depth strictly nearer
    /// than `near_depth`, i.e. anything at or beyond `near_depth` is hidden.
    ///
    /// Walks from the coarsest level down to the base surface; returns as
    /// soon as one level proves occlusion.
    pub fn is_occluded(&self, depth: &DepthSurface, rect: PixelRect, near_depth: f32) -> bool {
        debug_assert!(!self.stale, "Hi-Z queried before prepare()");
        if depth.dimensions() != (self.base_width, self.base_height) {
            return false;
        }
        for level in (0..self.level_count()).rev() {
            if rect.at_level(level).area() > HIZ_TEXEL_BUDGET {
                break;
            }
            if self.farthest_depth(depth, rect, level) < near_depth {
                return true;
            }
        }
        false
    }

    /// Down-top refresh of every owned level above `rect` after the base
    /// surface changed inside it.
    pub fn update_region(&mut self, depth: &DepthSurface, rect: PixelRect) {
        if depth.dimensions() != (self.base_width, self.base_height) {
            self.stale = true;
            return;
        }
        if self.base_width == 0 || self.base_height == 0 {
            return;
        }
        for level in 1..self.level_count() {
            let (below, above) = self.levels.split_at_mut(level - 1);
            let src: &Surface<f32> = if level == 1 { depth } else { &below[level - 2] };
            let dst = &mut above[0];
            downsample_region(src, dst, rect.at_level(level));
        }
    }
}

/// dst(x, y) = max of the (up to) 2×2 src texels below it, for texels in `r`.
fn downsample_region(src: &Surface<f32>, dst: &mut Surface<f32>, r: PixelRect) {
    let (sw, sh) = src.dimensions();
    let x1 = r.x1.min(dst.width().saturating_sub(1));
    let y1 = r.y1.min(dst.height().saturating_sub(1));
    for y in r.y0..=y1 {
        let sy0 = y * 2;
        let sy1 = (sy0 + 1).min(sh - 1);
        for x in r.x0..=x1 {
            let sx0 = x * 2;
            let sx1 = (sx0 + 1).min(sw - 1);
            let farthest = src
                .fetch(sx0, sy0)
                .max(src.fetch(sx1, sy0))
                .max(src.fetch(sx0, sy1))
                .max(src.fetch(sx1, sy1));
            *dst.fetch_mut(x, y) = farthest;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x0: usize, y0: usize, x1: usize, y1: usize) -> PixelRect {
        PixelRect { x0, y0, x1, y1 }
    }

    #[test]
    fn level_sizes_round_up() {
        let depth = Surface::new(5, 3, DEPTH_CLEAR);
        let mut hiz = HiZPyramid::new();
        hiz.prepare(&depth);

        assert_eq!(hiz.level_count(), 4);
        assert_eq!(hiz.level(1).unwrap().dimensions(), (3, 2));
        assert_eq!(hiz.level(2).unwrap().dimensions(), (2, 1));
        assert_eq!(hiz.level(3).unwrap().dimensions(), (1, 1));
        assert!(hiz.level(0).is_none());
        assert!(!hiz.is_stale());
    }

    #[test]
    fn texels_hold_farthest_depth() {
        let mut depth = Surface::new(4, 4, 0.2f32);
        depth.set(3, 3, 0.9);
        let mut hiz = HiZPyramid::new();
        hiz.prepare(&depth);

        assert_eq!(hiz.level(1).unwrap().get(0, 0), Some(0.2));
        assert_eq!(hiz.level(1).unwrap().get(1, 1), Some(0.9));
        assert_eq!(hiz.level(2).unwrap().get(0, 0), Some(0.9));
    }

    #[test]
    fn occlusion_requires_every_pixel_nearer() {
        let mut depth = Surface::new(64, 64, DEPTH_CLEAR);
        let mut hiz = HiZPyramid::new();
        hiz.prepare(&depth);

        let occluder = rect(0, 0, 31, 31);
        assert!(!hiz.is_occluded(&depth, occluder, 0.7));

        for y in 0..32 {
            for x in 0..32 {
                depth.set(x, y, 0.5);
            }
        }
        hiz.update_region(&depth, occluder);

        assert!(hiz.is_occluded(&depth, rect(4, 4, 20, 20), 0.7));
        assert!(!hiz.is_occluded(&depth, rect(4, 4, 20, 20), 0.3));
        assert!(!hiz.is_occluded(&depth, rect(4, 4, 20, 20), 0.5), "equal depth is not occluded");
        assert!(!hiz.is_occluded(&depth, rect(20, 20, 40, 40), 0.7), "partially uncovered");
    }

    #[test]
    fn incremental_update_matches_rebuild() {
        let mut depth = Surface::new(37, 23, DEPTH_CLEAR);
        let mut incremental = HiZPyramid::new();
        incremental.prepare(&depth);

        let touched = rect(5, 3, 17, 11);
        for y in touched.y0..=touched.y1 {
            for x in touched.x0..=touched.x1 {
                depth.set(x, y, (x + y) as f32 / 100.0);
            }
        }
        incremental.update_region(&depth, touched);

        let mut full = HiZPyramid::new();
        full.prepare(&depth);
        for level in 1..full.level_count() {
            assert_eq!(incremental.level(level), full.level(level), "level {}", level);
        }
    }

    #[test]
    fn resize_reallocates_and_marks_stale() {
        let mut hiz = HiZPyramid::new();
        hiz.prepare(&Surface::new(8, 8, DEPTH_CLEAR));
        assert_eq!(hiz.level_count(), 4);

        let bigger = Surface::new(16, 4, 0.5);
        hiz.prepare(&bigger);
        assert_eq!(hiz.level_count(), 5);
        assert_eq!(hiz.level(4).unwrap().get(0, 0), Some(0.5));
    }
}
