use serde::{Deserialize, Serialize};

use crate::digest::Digester;
use crate::rng::{derive_floats, DropSeeds};

/// Extra floats derived per drop beyond one per row. Never read by the
/// slot decision; renderers may use them for cosmetic jitter.
pub const HEADROOM_FLOATS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Left,
    Right,
}

impl Direction {
    pub fn from_float(value: f64) -> Self {
        if value >= 0.5 {
            Direction::Right
        } else {
            Direction::Left
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub rows: u8,
    /// One decision per pin row, top to bottom.
    pub path: Vec<Direction>,
    /// Number of right bounces, in `0..=rows`.
    pub slot: usize,
    pub headroom: Vec<f64>,
}

pub fn resolve(digester: &dyn Digester, seeds: &DropSeeds, rows: u8) -> Resolution {
    let rows_n = usize::from(rows);
    let floats = derive_floats(digester, seeds, rows_n + HEADROOM_FLOATS);
    let (decisions, headroom) = floats.split_at(rows_n);

    let path: Vec<Direction> = decisions.iter().copied().map(Direction::from_float).collect();
    let slot = path.iter().filter(|d| **d == Direction::Right).count();

    Resolution {
        rows,
        path,
        slot,
        headroom: headroom.to_vec(),
    }
}

pub fn resolve_slot(digester: &dyn Digester, seeds: &DropSeeds, rows: u8) -> usize {
    resolve(digester, seeds, rows).slot
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::{AcceleratedDigester, SoftwareDigester};
    use Direction::{Left, Right};

    #[test]
    fn test_pinned_example() {
        let seeds = DropSeeds::new("s", "c", 0, 0);
        let res = resolve(&SoftwareDigester, &seeds, 8);
        assert_eq!(res.slot, 5);
        assert_eq!(
            res.path,
            vec![Right, Left, Right, Right, Left, Right, Right, Left]
        );
        assert_eq!(res.headroom.len(), HEADROOM_FLOATS);
        assert_eq!(resolve_slot(&AcceleratedDigester, &seeds, 8), 5);
    }

    #[test]
    fn test_threshold() {
        assert_eq!(Direction::from_float(0.5), Right);
        assert_eq!(Direction::from_float(0.499_999_999), Left);
        assert_eq!(Direction::from_float(0.0), Left);
    }

    #[test]
    fn test_headroom_does_not_change_slot() {
        // The first `rows` floats decide the slot; extras only trail them.
        let seeds = DropSeeds::new("server", "client", 11, 42);
        let res = resolve(&AcceleratedDigester, &seeds, 16);
        let floats = derive_floats(&AcceleratedDigester, &seeds, 16);
        let expected = floats.iter().filter(|v| **v >= 0.5).count();
        assert_eq!(res.slot, expected);
    }

    #[test]
    fn test_zero_rows() {
        let seeds = DropSeeds::new("a", "b", 0, 0);
        let res = resolve(&AcceleratedDigester, &seeds, 0);
        assert_eq!(res.slot, 0);
        assert!(res.path.is_empty());
    }
}
