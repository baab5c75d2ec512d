/// Caller-owned render targets
/// Stores color and depth information
///
/// The pipeline reads and writes the two surfaces in place but never
/// creates or resizes them. Both surfaces always share the same dimensions.
use super::surface::{ColorSurface, DepthSurface, Surface};
use anyhow::{ensure, Result};
use glam::Vec4;
use rayon::prelude::*;

/// Depth value of a cleared depth surface (the far plane).
pub const DEPTH_CLEAR: f32 = 1.0;

/// View into a contiguous set of rows in the framebuffer.
/// Used for multi-core rasterization where each worker owns a disjoint slice.
pub struct FrameSlice<'a> {
    pub width: usize,
    pub y0: usize,
    pub height: usize,
    pub color: &'a mut [Vec4],
    pub depth: &'a mut [f32],
}

impl<'a> FrameSlice<'a> {
    /// Mutable (depth, color) texels of pixel (x, y_global), or `None` if the
    /// pixel lies outside this slice.
    #[inline]
    pub fn texels_mut(&mut self, x: usize, y_global: usize) -> Option<(&mut f32, &mut Vec4)> {
        if x >= self.width || y_global < self.y0 || y_global - self.y0 >= self.height {
            return None;
        }
        let index = (y_global - self.y0) * self.width + x;
        Some((&mut self.depth[index], &mut self.color[index]))
    }

    /// Global rows covered by this slice.
    #[inline]
    pub fn rows(&self) -> std::ops::Range<usize> {
        self.y0..self.y0 + self.height
    }
}

#[derive(Clone, Debug)]
pub struct Framebuffer {
    color: ColorSurface,
    depth: DepthSurface,
}

impl Framebuffer {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            color: Surface::new(width, height, Vec4::ZERO),
            depth: Surface::new(width, height, DEPTH_CLEAR),
        }
    }

    /// Wrap existing surfaces. They must have identical dimensions.
    pub fn from_surfaces(color: ColorSurface, depth: DepthSurface) -> Result<Self> {
        ensure!(
            color.dimensions() == depth.dimensions(),
            "color surface is {:?} but depth surface is {:?}",
            color.dimensions(),
            depth.dimensions()
        );
        Ok(Self { color, depth })
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.color.width()
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.color.height()
    }

    #[inline]
    pub fn color(&self) -> &ColorSurface {
        &self.color
    }

    #[inline]
    pub fn depth(&self) -> &DepthSurface {
        &self.depth
    }

    #[inline]
    pub fn color_mut(&mut self) -> &mut ColorSurface {
        &mut self.color
    }

    #[inline]
    pub fn depth_mut(&mut self) -> &mut DepthSurface {
        &mut self.depth
    }

    /// Both surfaces at once, for passes that test depth and write color.
    #[inline]
    pub fn surfaces_mut(&mut self) -> (&mut ColorSurface, &mut DepthSurface) {
        (&mut self.color, &mut self.depth)
    }

    /// Clear color and depth buffers
    pub fn clear(&mut self, clear_color: Vec4, clear_depth: f32) {
        self.color.clear(clear_color);
        self.depth.clear(clear_depth);
    }

    /// Resize framebuffer. Contents are reset.
    pub fn resize(&mut self, width: usize, height: usize) {
        self.color.resize(width, height, Vec4::ZERO);
        self.depth.resize(width, height, DEPTH_CLEAR);
    }

    /// Split rows `y0..y1` into horizontal stripes of `rows_per_stripe` rows.
    /// Each stripe owns a disjoint subset of rows, so they can be rendered in parallel.
    pub fn par_stripes(
        &mut self,
        y0: usize,
        y1: usize,
        rows_per_stripe: usize,
    ) -> impl IndexedParallelIterator<Item = FrameSlice<'_>> {
        let width = self.width();
        let y1 = y1.min(self.height()).max(y0);
        let chunk = rows_per_stripe.max(1) * width.max(1);

        self.color
            .rows_mut(y0, y1)
            .par_chunks_mut(chunk)
            .zip(self.depth.rows_mut(y0, y1).par_chunks_mut(chunk))
            .enumerate()
            .map(move |(i, (color, depth))| FrameSlice {
                width,
                y0: y0 + i * rows_per_stripe.max(1),
                height: color.len() / width.max(1),
                color,
                depth,
            })
    }

    /// Count of color texels that differ from `clear_color`.
    pub fn covered_pixel_count(&self, clear_color: Vec4) -> usize {
        self.color
            .as_slice()
            .par_iter()
            .filter(|&&c| c != clear_color)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stripes_partition_requested_rows() {
        let mut fb = Framebuffer::new(5, 10);
        let rows: Vec<(usize, usize)> = fb.par_stripes(2, 9, 3).map(|s| (s.y0, s.height)).collect();
        assert_eq!(rows, vec![(2, 3), (5, 3), (8, 1)]);
    }

    #[test]
    fn stripe_writes_land_in_global_rows() {
        let mut fb = Framebuffer::new(4, 4);
        fb.par_stripes(0, 4, 1).for_each(|mut slice| {
            let y = slice.y0;
            if let Some((depth, color)) = slice.texels_mut(1, y) {
                *depth = 0.25;
                *color = Vec4::splat(y as f32);
            }
            assert!(slice.texels_mut(0, y + 1).is_none());
        });
        assert_eq!(fb.color().get(1, 3), Some(Vec4::splat(3.0)));
        assert_eq!(fb.depth().get(1, 2), Some(0.25));
        assert_eq!(fb.depth().get(0, 2), Some(DEPTH_CLEAR));
    }

    #[test]
    fn mismatched_surfaces_are_rejected() {
        let color = Surface::new(2, 2, Vec4::ZERO);
        let depth = Surface::new(2, 3, DEPTH_CLEAR);
        assert!(Framebuffer::from_surfaces(color, depth).is_err());
    }
}
