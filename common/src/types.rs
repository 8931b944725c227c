//! Core types shared across the chain follower

use crate::hash::BlockHash;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ledger era, numbered by its hard-fork-combinator index
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Era {
    Byron = 0,
    Shelley = 1,
    Allegra = 2,
    Mary = 3,
    Alonzo = 4,
    Babbage = 5,
    Conway = 6,
}

impl Era {
    /// All eras in historical order
    pub const ALL: [Era; 7] = [
        Era::Byron,
        Era::Shelley,
        Era::Allegra,
        Era::Mary,
        Era::Alonzo,
        Era::Babbage,
        Era::Conway,
    ];
}

impl TryFrom<u8> for Era {
    type Error = UnknownEra;

    fn try_from(index: u8) -> Result<Self, Self::Error> {
        Era::ALL.get(index as usize).copied().ok_or(UnknownEra(index))
    }
}

impl fmt::Display for Era {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Era::Byron => "byron",
            Era::Shelley => "shelley",
            Era::Allegra => "allegra",
            Era::Mary => "mary",
            Era::Alonzo => "alonzo",
            Era::Babbage => "babbage",
            Era::Conway => "conway",
        };
        f.write_str(name)
    }
}

/// An era index outside the known range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownEra(pub u8);

impl fmt::Display for UnknownEra {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown era index {}", self.0)
    }
}

impl std::error::Error for UnknownEra {}

/// Position of a real block on a chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RealPoint {
    pub slot: u64,
    pub hash: BlockHash,
}

impl RealPoint {
    pub fn new(slot: u64, hash: BlockHash) -> Self {
        Self { slot, hash }
    }
}

impl fmt::Display for RealPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.slot, self.hash)
    }
}

/// Position on a chain: before the first block, or a real block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Point {
    Origin,
    Specific {
        slot: u64,
        hash: BlockHash,
    },
}

impl Point {
    pub fn hash(&self) -> Option<&BlockHash> {
        match self {
            Point::Origin => None,
            Point::Specific { hash, .. } => Some(hash),
        }
    }

    pub fn as_real(&self) -> Option<RealPoint> {
        match self {
            Point::Origin => None,
            Point::Specific { slot, hash } => Some(RealPoint::new(*slot, *hash)),
        }
    }
}

impl From<RealPoint> for Point {
    fn from(point: RealPoint) -> Self {
        Point::Specific {
            slot: point.slot,
            hash: point.hash,
        }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Point::Origin => f.write_str("origin"),
            Point::Specific { slot, hash } => write!(f, "{slot}.{hash}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(n: u8) -> BlockHash {
        BlockHash::new([n; 32])
    }

    #[test]
    fn era_from_index() {
        assert_eq!(Era::try_from(0).unwrap(), Era::Byron);
        assert_eq!(Era::try_from(6).unwrap(), Era::Conway);
        assert_eq!(Era::try_from(7), Err(UnknownEra(7)));
        assert!(Era::Alonzo < Era::Babbage);
    }

    #[test]
    fn points_compare_by_slot_and_hash() {
        assert_eq!(Point::Origin, Point::Origin);
        let a: Point = RealPoint::new(10, hash(1)).into();
        assert_eq!(a, RealPoint::new(10, hash(1)).into());
        assert_ne!(a, RealPoint::new(11, hash(1)).into());
        assert_ne!(a, RealPoint::new(10, hash(2)).into());
        assert_ne!(a, Point::Origin);
    }

    #[test]
    fn real_point_round_trip() {
        let real = RealPoint::new(42, hash(7));
        assert_eq!(Point::from(real).as_real(), Some(real));
        assert_eq!(Point::Origin.as_real(), None);
        assert_eq!(Point::from(real).to_string(), real.to_string());
    }
}
