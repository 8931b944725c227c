use follower_codec::MultiEraHeader;
use follower_common::{Point, RealPoint};

/// A competing chain diverging from main after `intersection`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainFork {
    pub intersection: Point,
    pub fragment: Vec<RealPoint>,
}

impl ChainFork {
    pub fn new(intersection: Point, fragment: Vec<RealPoint>) -> Self {
        Self {
            intersection,
            fragment,
        }
    }

    pub fn tip(&self) -> Option<&RealPoint> {
        self.fragment.last()
    }

    pub fn len(&self) -> usize {
        self.fragment.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragment.is_empty()
    }
}

/// A fork as reported by a peer, with full headers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForkHeaders {
    pub intersection: Point,
    pub headers: Vec<MultiEraHeader>,
}

impl ForkHeaders {
    pub fn to_fork(&self) -> ChainFork {
        ChainFork::new(
            self.intersection,
            self.headers.iter().map(MultiEraHeader::point).collect(),
        )
    }
}
