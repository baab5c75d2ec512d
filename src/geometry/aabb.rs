/// Axis-aligned bounding box algebra
/// Pure value type shared by the BVH and the Hi-Z occlusion tests
use glam::Vec3;
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign};

/// Axis-aligned bounding box described by its min/max corners.
///
/// A box is empty when `min > max` on any axis. The canonical empty box is
/// [`Aabb::EMPTY`] (`min = +inf`, `max = -inf`), which is the identity of
/// [`Aabb::include`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl Aabb {
    pub const EMPTY: Self = Self {
        min: Vec3::INFINITY,
        max: Vec3::NEG_INFINITY,
    };

    /// Box covering all of space. Used for geometry whose screen-space
    /// footprint cannot be bounded (vertices behind the eye).
    pub const EVERYTHING: Self = Self {
        min: Vec3::NEG_INFINITY,
        max: Vec3::INFINITY,
    };

    #[inline]
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Degenerate box containing a single point.
    #[inline]
    pub const fn from_point(p: Vec3) -> Self {
        Self { min: p, max: p }
    }

    /// Smallest box containing every point of the iterator.
    pub fn from_points<I: IntoIterator<Item = Vec3>>(points: I) -> Self {
        points
            .into_iter()
            .fold(Self::EMPTY, |aabb, p| aabb.include_point(p))
    }

    #[inline]
    #[must_use]
    pub fn include_point(&self, p: Vec3) -> Self {
        Self {
            min: self.min.min(p),
            max: self.max.max(p),
        }
    }

    #[inline]
    #[must_use]
    pub fn include(&self, other: &Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Overlap of two boxes. The result may be empty; check [`Aabb::is_empty`].
    #[inline]
    #[must_use]
    pub fn intersect(&self, other: &Self) -> Self {
        Self {
            min: self.min.max(other.min),
            max: self.max.min(other.max),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    #[inline]
    pub fn diagonal(&self) -> Vec3 {
        self.max - self.min
    }

    /// Point containment, inclusive on all six faces.
    #[inline]
    pub fn contains_point(&self, p: Vec3) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    /// True if `other` lies entirely inside this box. Every box contains
    /// the empty box.
    #[inline]
    pub fn contains(&self, other: &Self) -> bool {
        other.is_empty() || (self.contains_point(other.min) && self.contains_point(other.max))
    }

    /// Corner `i` of the box, `i` in `0..8`.
    /// Bit 0 selects max x, bit 1 max y, bit 2 max z.
    #[inline]
    pub fn corner(&self, i: usize) -> Vec3 {
        Vec3::new(
            if i & 1 != 0 { self.max.x } else { self.min.x },
            if i & 2 != 0 { self.max.y } else { self.min.y },
            if i & 4 != 0 { self.max.z } else { self.min.z },
        )
    }

    /// The 8 corners in bit order (see [`Aabb::corner`]).
    pub fn corners(&self) -> impl Iterator<Item = Vec3> + '_ {
        (0..8).map(move |i| self.corner(i))
    }
}

impl From<Vec3> for Aabb {
    fn from(p: Vec3) -> Self {
        Self::from_point(p)
    }
}

impl BitOr for Aabb {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        self.include(&rhs)
    }
}

impl BitOr<Vec3> for Aabb {
    type Output = Self;
    fn bitor(self, rhs: Vec3) -> Self {
        self.include_point(rhs)
    }
}

impl BitOrAssign for Aabb {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = self.include(&rhs);
    }
}

impl BitOrAssign<Vec3> for Aabb {
    fn bitor_assign(&mut self, rhs: Vec3) {
        *self = self.include_point(rhs);
    }
}

impl BitAnd for Aabb {
    type Output = Self;
    fn bitand(self, rhs: Self) -> Self {
        self.intersect(&rhs)
    }
}

impl BitAndAssign for Aabb {
    fn bitand_assign(&mut self, rhs: Self) {
        *self = self.intersect(&rhs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit() -> Aabb {
        Aabb::new(Vec3::ZERO, Vec3::ONE)
    }

    #[test]
    fn empty_is_identity_of_union() {
        let b = Aabb::new(Vec3::new(-1.0, 2.0, 0.5), Vec3::new(3.0, 4.0, 0.75));
        assert_eq!(Aabb::EMPTY | b, b);
        assert_eq!(b | Aabb::EMPTY, b);
        assert!(Aabb::EMPTY.is_empty());
        assert!(Aabb::default().is_empty());
    }

    #[test]
    fn include_point_grows_box() {
        let b = Aabb::from_point(Vec3::ZERO) | Vec3::new(2.0, -1.0, 3.0);
        assert_eq!(b.min, Vec3::new(0.0, -1.0, 0.0));
        assert_eq!(b.max, Vec3::new(2.0, 0.0, 3.0));
        assert_eq!(b.center(), Vec3::new(1.0, -0.5, 1.5));
        assert_eq!(b.diagonal(), Vec3::new(2.0, 1.0, 3.0));
    }

    #[test]
    fn disjoint_intersection_is_empty() {
        let a = unit();
        let b = Aabb::new(Vec3::new(2.0, 0.0, 0.0), Vec3::new(3.0, 1.0, 1.0));
        assert!((a & b).is_empty());

        let mut c = unit();
        c &= Aabb::new(Vec3::splat(0.5), Vec3::splat(2.0));
        assert_eq!(c, Aabb::new(Vec3::splat(0.5), Vec3::ONE));
    }

    #[test]
    fn containment_is_inclusive() {
        let a = unit();
        assert!(a.contains_point(Vec3::ZERO));
        assert!(a.contains_point(Vec3::ONE));
        assert!(a.contains_point(Vec3::new(1.0, 0.0, 0.5)));
        assert!(!a.contains_point(Vec3::new(1.0001, 0.5, 0.5)));
        assert!(a.contains(&Aabb::new(Vec3::splat(0.25), Vec3::splat(0.75))));
        assert!(a.contains(&Aabb::EMPTY));
        assert!(!a.contains(&Aabb::new(Vec3::splat(0.5), Vec3::splat(1.5))));
    }

    #[test]
    fn corners_follow_bit_order() {
        let b = Aabb::new(Vec3::new(0.0, 1.0, 2.0), Vec3::new(10.0, 11.0, 12.0));
        let corners: Vec<Vec3> = b.corners().collect();
        assert_eq!(corners.len(), 8);
        assert_eq!(corners[0], b.min);
        assert_eq!(corners[1], Vec3::new(10.0, 1.0, 2.0));
        assert_eq!(corners[2], Vec3::new(0.0, 11.0, 2.0));
        assert_eq!(corners[4], Vec3::new(0.0, 1.0, 12.0));
        assert_eq!(corners[7], b.max);
        assert_eq!(Aabb::from_points(corners), b);
    }
}
