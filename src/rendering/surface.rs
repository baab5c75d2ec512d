/// Dense 2D texel storage used for the depth target, the color target and
/// every Hi-Z mip level
///
/// Row-major, addressed by integer (x, y) with (0, 0) at the top-left.
use glam::{Vec2, Vec4};

#[derive(Clone, Debug, PartialEq)]
pub struct Surface<T> {
    width: usize,
    height: usize,
    texels: Vec<T>,
}

/// Single float channel, smaller is closer.
pub type DepthSurface = Surface<f32>;
/// Four float channels (RGBA).
pub type ColorSurface = Surface<Vec4>;

impl<T: Copy> Surface<T> {
    pub fn new(width: usize, height: usize, fill: T) -> Self {
        Self {
            width,
            height,
            texels: vec![fill; width * height],
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    #[inline]
    pub fn clear(&mut self, value: T) {
        self.texels.fill(value);
    }

    /// Reallocate to new dimensions; every texel is reset to `fill`.
    pub fn resize(&mut self, width: usize, height: usize, fill: T) {
        self.width = width;
        self.height = height;
        self.texels.clear();
        self.texels.resize(width * height, fill);
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> Option<T> {
        if x < self.width && y < self.height {
            Some(self.texels[y * self.width + x])
        } else {
            None
        }
    }

    /// Write one texel. Returns false when (x, y) is outside the surface.
    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: T) -> bool {
        if x < self.width && y < self.height {
            self.texels[y * self.width + x] = value;
            true
        } else {
            false
        }
    }

    /// Texel at (x, y). Panics when out of bounds.
    #[inline]
    pub fn fetch(&self, x: usize, y: usize) -> T {
        debug_assert!(x < self.width && y < self.height);
        self.texels[y * self.width + x]
    }

    /// Mutable texel at (x, y). Panics when out of bounds.
    #[inline]
    pub fn fetch_mut(&mut self, x: usize, y: usize) -> &mut T {
        debug_assert!(x < self.width && y < self.height);
        &mut self.texels[y * self.width + x]
    }

    #[inline]
    pub fn row(&self, y: usize) -> &[T] {
        let start = y * self.width;
        &self.texels[start..start + self.width]
    }

    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.texels
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.texels
    }

    /// Texels of rows `y0..y1`, contiguous.
    #[inline]
    pub(crate) fn rows_mut(&mut self, y0: usize, y1: usize) -> &mut [T] {
        &mut self.texels[y0 * self.width..y1 * self.width]
    }

    /// Iterate `(x, y, texel)` in row-major order.
    pub fn iter_texels(&self) -> impl Iterator<Item = (usize, usize, T)> + '_ {
        let width = self.width.max(1);
        self.texels
            .iter()
            .enumerate()
            .map(move |(i, &t)| (i % width, i / width, t))
    }
}

/// Inclusive pixel rectangle, already clamped to a surface.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PixelRect {
    pub x0: usize,
    pub y0: usize,
    pub x1: usize,
    pub y1: usize,
}

impl PixelRect {
    /// Pixels whose centers may fall inside the continuous box
    /// `[min, max]`, clamped to a `width` x `height` surface.
    /// Returns `None` when nothing remains on screen.
    pub fn covering(min: Vec2, max: Vec2, width: usize, height: usize) -> Option<Self> {
        if width == 0 || height == 0 || !(min.x <= max.x && min.y <= max.y) {
            return None;
        }
        let x0 = min.x.floor().max(0.0);
        let y0 = min.y.floor().max(0.0);
        let x1 = max.x.ceil().min(width as f32 - 1.0);
        let y1 = max.y.ceil().min(height as f32 - 1.0);
        if x0 > x1 || y0 > y1 {
            return None;
        }
        Some(Self {
            x0: x0 as usize,
            y0: y0 as usize,
            x1: x1 as usize,
            y1: y1 as usize,
        })
    }

    /// The same rectangle at mip `level` (each level halves both axes).
    #[inline]
    pub fn at_level(&self, level: usize) -> Self {
        Self {
            x0: self.x0 >> level,
            y0: self.y0 >> level,
            x1: self.x1 >> level,
            y1: self.y1 >> level,
        }
    }

    #[inline]
    pub fn area(&self) -> usize {
        (self.x1 - self.x0 + 1) * (self.y1 - self.y0 + 1)
    }

    #[inline]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_and_set_are_bounds_checked() {
        let mut s = Surface::new(4, 3, 0u8);
        assert!(s.set(3, 2, 7));
        assert!(!s.set(4, 0, 1));
        assert_eq!(s.get(3, 2), Some(7));
        assert_eq!(s.get(0, 3), None);
        assert_eq!(s.row(2), &[0, 0, 0, 7]);
    }

    #[test]
    fn covering_rect_is_clamped_and_conservative() {
        let r = PixelRect::covering(Vec2::new(-3.0, 2.4), Vec2::new(5.2, 7.9), 6, 6).unwrap();
        assert_eq!(r, PixelRect { x0: 0, y0: 2, x1: 5, y1: 5 });
        assert_eq!(r.at_level(1), PixelRect { x0: 0, y0: 1, x1: 2, y1: 2 });
        assert!(PixelRect::covering(Vec2::new(7.0, 0.0), Vec2::new(9.0, 1.0), 6, 6).is_none());
        assert!(PixelRect::covering(Vec2::NAN, Vec2::ONE, 6, 6).is_none());
    }
}
