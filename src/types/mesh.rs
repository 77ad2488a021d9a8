//! Mesh grid geometry.

/// Size of the leveling mesh as reported by the printer.
///
/// `Unknown` is kept distinct from an empty grid: firmware may report `0,0`
/// before bed leveling is initialized, which must not count as an answer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MeshGeometry {
    /// No usable mesh report received in this session.
    #[default]
    Unknown,
    /// Grid size along both axes. Both counts are non-zero.
    Known { count_x: u32, count_y: u32 },
}

impl MeshGeometry {
    /// Builds a known geometry from reported counts.
    ///
    /// Returns `None` for an empty grid or a point count that overflows.
    #[must_use]
    pub fn from_counts(count_x: u32, count_y: u32) -> Option<Self> {
        match count_x.checked_mul(count_y) {
            Some(total) if total > 0 => Some(Self::Known { count_x, count_y }),
            _ => None,
        }
    }

    /// Returns true once the grid size has been reported.
    #[must_use]
    pub const fn is_known(&self) -> bool {
        matches!(self, Self::Known { .. })
    }

    /// Total number of mesh points, if known.
    #[must_use]
    pub const fn total_points(&self) -> Option<u32> {
        match *self {
            Self::Unknown => None,
            Self::Known { count_x, count_y } => Some(count_x * count_y),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_counts() {
        let mesh = MeshGeometry::from_counts(3, 3).unwrap();
        assert!(mesh.is_known());
        assert_eq!(mesh.total_points(), Some(9));

        assert_eq!(
            MeshGeometry::from_counts(4, 2).and_then(|m| m.total_points()),
            Some(8)
        );
    }

    #[test]
    fn test_empty_grid_stays_unknown() {
        assert_eq!(MeshGeometry::from_counts(0, 0), None);
        assert_eq!(MeshGeometry::from_counts(3, 0), None);
        assert_eq!(MeshGeometry::from_counts(u32::MAX, 2), None);
        assert_eq!(MeshGeometry::default().total_points(), None);
    }
}
