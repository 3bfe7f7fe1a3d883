use serde::{Deserialize, Serialize};

use crate::config::MetricConfig;
use crate::UNREACHABLE_COST;

/// Delivery measurements for one direction of a link, percent scale (0-100).
///
/// `small` is the broadcast small-probe delivery fraction, a base reliability
/// signal independent of bitrate; the remaining fields are unicast delivery
/// fractions at the four 802.11b rates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRates {
    pub small: u32,
    pub rate_1: u32,
    pub rate_2: u32,
    pub rate_5: u32,
    pub rate_11: u32,
}

/// Outcome of the bitrate search: the transmit rate to use and the expected
/// throughput at that rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateChoice {
    pub rate: u32,
    pub throughput: u32,
}

/// Picks the transmit bitrate maximizing expected throughput for the forward
/// direction of a link.
///
/// Each candidate multiplies the forward data-delivery fraction at that rate
/// by the reverse small-probe fraction (acks travel the reverse path) and the
/// rate's configured airtime weight. A later candidate wins only on strict
/// improvement, so ties resolve to the lower rate, and all-zero input keeps
/// the initial choice of rate 1 with throughput 0.
///
/// With `two_way_metrics` disabled the throughput is replaced by the
/// symmetric product of the two 1 Mbit/s fractions; the chosen rate is not
/// recomputed and keeps the value the search produced.
pub fn estimate(config: &MetricConfig, fwd: &DeliveryRates, rev: &DeliveryRates) -> RateChoice {
    let candidates = [
        (1, rev.small * fwd.rate_1 * config.weight_1 / 100),
        (2, rev.small * fwd.rate_2 * config.weight_2 / 100),
        (5, rev.small * fwd.rate_5 * config.weight_5 / 100),
        (11, rev.small * fwd.rate_11 * config.weight_11 / 100),
    ];

    let (mut rate, mut throughput) = candidates[0];
    for &(candidate_rate, candidate_throughput) in &candidates[1..] {
        if throughput < candidate_throughput {
            throughput = candidate_throughput;
            rate = candidate_rate;
        }
    }

    if !config.two_way_metrics {
        throughput = fwd.rate_1 * rev.rate_1;
    }

    RateChoice { rate, throughput }
}

/// Inverts an estimated throughput into an ETT cost, lower is better.
///
/// Zero throughput maps to [`UNREACHABLE_COST`]. Truncating integer division
/// throughout; consumers compare these costs bit-for-bit.
pub fn cost_of_throughput(throughput: u32) -> u32 {
    if throughput == 0 {
        UNREACHABLE_COST
    } else {
        (100 * 100 * 100) / throughput
    }
}
