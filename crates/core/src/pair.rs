use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::node::NodeId;

/// Canonical identity for an unordered pair of distinct endpoints.
///
/// `(a, b)` and `(b, a)` produce the same key, so measurements reported from
/// either side of a link land in the same table slot. Internally the lower
/// address is stored first; [`PairKey::first`] tells a caller which side of
/// the stored record holds its "forward" fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PairKey {
    a: NodeId,
    b: NodeId,
}

impl PairKey {
    /// Canonicalizes `(x, y)` into a pair key.
    ///
    /// Pure and order-independent: `new(x, y)` and `new(y, x)` yield equal
    /// keys. Fails on identical endpoints or the unspecified sentinel.
    pub fn new(x: NodeId, y: NodeId) -> Result<Self, PairError> {
        if x.is_unspecified() || y.is_unspecified() {
            return Err(PairError::UnspecifiedEndpoint);
        }
        if x == y {
            return Err(PairError::IdenticalEndpoints(x));
        }
        if x < y {
            Ok(PairKey { a: x, b: y })
        } else {
            Ok(PairKey { a: y, b: x })
        }
    }

    /// True iff `x` is the canonical first endpoint of this pair.
    pub fn first(&self, x: NodeId) -> bool {
        self.a == x
    }

    /// The canonical first endpoint.
    pub fn a(&self) -> NodeId {
        self.a
    }

    /// The canonical second endpoint.
    pub fn b(&self) -> NodeId {
        self.b
    }
}

impl Display for PairKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} <-> {}", self.a, self.b)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PairError {
    #[error("link endpoints are identical: {0}")]
    IdenticalEndpoints(NodeId),
    #[error("link endpoint is the unspecified address")]
    UnspecifiedEndpoint,
}
