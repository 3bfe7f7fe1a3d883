//! Estimated transmission time (ETT) link metric for wireless mesh routing.
//!
//! An external link prober periodically measures, for each neighbor pair, the
//! small-probe delivery fraction and the unicast delivery fraction at each of
//! the four 802.11b bitrates, in both directions. This crate turns those raw
//! fractions into a single directional cost per link (lower is better): it
//! picks the bitrate maximizing estimated throughput, inverts throughput into
//! an ETT-style cost, and keeps the result in a table keyed by unordered node
//! pair so the routing layer can query either direction of any link.

/// Bitrate weights and the two-way metric toggle.
pub mod config;

/// Rate selection and throughput-to-cost conversion.
pub mod estimator;

/// Endpoint identifiers.
pub mod node;

/// Canonical unordered endpoint pairs.
pub mod pair;

/// The link measurement table and its collaborator seams.
pub mod store;

pub use config::MetricConfig;
pub use estimator::{DeliveryRates, RateChoice};
pub use node::{LinkAddr, NodeId};
pub use pair::{PairError, PairKey};
pub use store::{LinkCostSink, LinkInfo, LinkMetricStore, LinkProber};

/// Cost assigned to a direction with zero estimated throughput, and returned
/// for missing or expired measurements. Effectively "unreachable".
pub const UNREACHABLE_COST: u32 = 7777;

/// Age at which a stored measurement stops being trusted by reads. Expiry is
/// a read-time predicate; records are never evicted.
pub const STALENESS_WINDOW: std::time::Duration = std::time::Duration::from_secs(30);
