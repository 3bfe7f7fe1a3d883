use std::fmt::Write;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::config::MetricConfig;
use crate::estimator::{self, DeliveryRates};
use crate::node::{LinkAddr, NodeId};
use crate::pair::{PairError, PairKey};
use crate::{STALENESS_WINDOW, UNREACHABLE_COST};

/// Source of raw delivery measurements (the link prober).
///
/// `refresh` is best-effort: an implementation typically schedules a new
/// probe round for the neighbor, and the caller reads whatever is currently
/// stored. Cost getters on [`LinkMetricStore`] follow a refresh-then-read
/// contract built on this.
pub trait LinkProber {
    /// Nodes the prober currently has measurements for.
    fn neighbors(&self) -> Vec<NodeId>;

    /// Maps a link-layer address to the node it belongs to, if known.
    fn resolve_link_address(&self, addr: LinkAddr) -> Option<NodeId>;

    /// Asks the prober to re-measure the link to `node`.
    fn refresh(&self, node: NodeId);
}

/// Consumer of computed directional costs (the routing layer's link table).
pub trait LinkCostSink {
    /// Records the cost of the directed edge `from -> to`. Returns `false`
    /// if the edge was rejected; the store logs but does not fail on that.
    fn update_link(&self, from: NodeId, to: NodeId, cost: u32) -> bool;
}

/// Measurement state for one unordered pair of nodes.
///
/// `fwd` holds the samples for the canonical-first-to-second direction and
/// `rev` the opposite one. Raw samples and the costs derived from them are
/// written together under the table lock, so a reader never sees raw fields
/// newer than the costs.
#[derive(Debug, Clone)]
pub struct LinkInfo {
    pub fwd: DeliveryRates,
    pub rev: DeliveryRates,
    pub fwd_cost: u32,
    pub rev_cost: u32,
    pub fwd_rate: u32,
    pub rev_rate: u32,
    last_updated: Instant,
}

impl LinkInfo {
    /// Whether this record is younger than [`STALENESS_WINDOW`] at `now`.
    pub fn is_fresh(&self, now: Instant) -> bool {
        self.age(now) < STALENESS_WINDOW
    }

    /// Time since the last successful update.
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_updated)
    }
}

/// The link measurement table.
///
/// Maps each unordered node pair to its latest bidirectional measurement and
/// the ETT costs derived from it. Records are created lazily on first update
/// and never evicted; a record older than [`STALENESS_WINDOW`] is treated as
/// absent by every read, so queries degrade to defaults instead of failing.
/// A single lock guards the table: an update must write raw and derived
/// fields atomically, while reads are plain lookups. Pairs are independent,
/// so the lock is held only for the table access itself.
pub struct LinkMetricStore<P, S> {
    self_id: NodeId,
    config: MetricConfig,
    prober: P,
    sink: S,
    links: Mutex<IndexMap<PairKey, LinkInfo>>,
}

impl<P, S> LinkMetricStore<P, S>
where
    P: LinkProber,
    S: LinkCostSink,
{
    pub fn new(self_id: NodeId, config: MetricConfig, prober: P, sink: S) -> Self {
        LinkMetricStore {
            self_id,
            config,
            prober,
            sink,
            links: Mutex::new(IndexMap::new()),
        }
    }

    /// Identity of the node this store belongs to; the "self" side of every
    /// cost query.
    pub fn self_id(&self) -> NodeId {
        self.self_id
    }

    /// Number of pairs ever recorded, stale ones included.
    pub fn len(&self) -> usize {
        self.links.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.lock().is_empty()
    }

    /// Records a fresh measurement for the link between `from` and `to`,
    /// sampled at the current instant.
    pub fn update_link(
        &self,
        from: NodeId,
        to: NodeId,
        fwd: DeliveryRates,
        rev: DeliveryRates,
    ) -> Result<(), PairError> {
        self.update_link_at_time(from, to, fwd, rev, Instant::now())
    }

    /// Records a fresh measurement for the link between `from` and `to`.
    ///
    /// The arguments may arrive from either side of the link: the pair is
    /// canonicalized and, when `from` is not the canonical first endpoint,
    /// the call re-issues itself with the roles swapped so both sides
    /// converge on one record. Both directional costs are recomputed and
    /// written together with the raw samples and the timestamp, then pushed
    /// to the cost sink. A push the sink rejects is logged and does not undo
    /// the local write.
    ///
    /// Invalid endpoints (identical, or the unspecified sentinel) leave the
    /// store untouched and never reach the sink.
    pub fn update_link_at_time(
        &self,
        from: NodeId,
        to: NodeId,
        fwd: DeliveryRates,
        rev: DeliveryRates,
        now: Instant,
    ) -> Result<(), PairError> {
        let pair = match PairKey::new(from, to) {
            Ok(pair) => pair,
            Err(err) => {
                tracing::warn!(%from, %to, %err, "rejecting link update");
                return Err(err);
            }
        };
        if !pair.first(from) {
            return self.update_link_at_time(to, from, rev, fwd, now);
        }

        let fwd_choice = estimator::estimate(&self.config, &fwd, &rev);
        let rev_choice = estimator::estimate(&self.config, &rev, &fwd);

        let info = LinkInfo {
            fwd,
            rev,
            fwd_cost: estimator::cost_of_throughput(fwd_choice.throughput),
            rev_cost: estimator::cost_of_throughput(rev_choice.throughput),
            fwd_rate: fwd_choice.rate,
            rev_rate: rev_choice.rate,
            last_updated: now,
        };
        let propagate = info.is_fresh(now);
        let (fwd_cost, rev_cost) = (info.fwd_cost, info.rev_cost);
        self.links.lock().insert(pair, info);

        tracing::debug!(%pair, fwd_cost, rev_cost, "updated link metrics");

        if propagate {
            if !self.sink.update_link(from, to, fwd_cost) {
                tracing::warn!(%from, %to, cost = fwd_cost, "cost sink rejected forward update");
            }
            if !self.sink.update_link(to, from, rev_cost) {
                tracing::warn!(from = %to, to = %from, cost = rev_cost, "cost sink rejected reverse update");
            }
        }
        Ok(())
    }

    /// Cost of the directed link from this node to `to`, sampled now.
    pub fn forward_cost(&self, to: NodeId) -> u32 {
        self.forward_cost_at_time(to, Instant::now())
    }

    /// Cost of the directed link from this node to `to`, or
    /// [`UNREACHABLE_COST`] when nothing fresh is stored.
    ///
    /// Refresh-then-read: the prober is asked to re-measure the neighbor
    /// first, then the currently stored value is returned. The refresh is
    /// best-effort and does not block or alter the read.
    pub fn forward_cost_at_time(&self, to: NodeId, now: Instant) -> u32 {
        self.prober.refresh(to);
        let Ok(pair) = PairKey::new(self.self_id, to) else {
            return UNREACHABLE_COST;
        };
        match self.links.lock().get(&pair) {
            Some(info) if info.is_fresh(now) => {
                if pair.first(self.self_id) {
                    info.fwd_cost
                } else {
                    info.rev_cost
                }
            }
            _ => UNREACHABLE_COST,
        }
    }

    /// Cost of the directed link from `from` back to this node, sampled now.
    pub fn reverse_cost(&self, from: NodeId) -> u32 {
        self.reverse_cost_at_time(from, Instant::now())
    }

    /// Counterpart of [`Self::forward_cost_at_time`] for the incoming
    /// direction, with the same freshness and refresh rules.
    pub fn reverse_cost_at_time(&self, from: NodeId, now: Instant) -> u32 {
        self.prober.refresh(from);
        let Ok(pair) = PairKey::new(self.self_id, from) else {
            return UNREACHABLE_COST;
        };
        match self.links.lock().get(&pair) {
            Some(info) if info.is_fresh(now) => {
                if pair.first(self.self_id) {
                    info.rev_cost
                } else {
                    info.fwd_cost
                }
            }
            _ => UNREACHABLE_COST,
        }
    }

    /// Raw stored delivery fraction for `rate` on the directed link
    /// `from -> to`, sampled now.
    pub fn delivery_rate(&self, rate: u32, from: NodeId, to: NodeId) -> u32 {
        self.delivery_rate_at_time(rate, from, to, Instant::now())
    }

    /// Raw stored delivery fraction for `rate` on the directed link
    /// `from -> to`.
    ///
    /// `rate` 0 selects the small probe; 1, 2, 5 and 11 select the unicast
    /// rates. Unrecognized rates, missing records and stale records all yield
    /// 0.
    pub fn delivery_rate_at_time(&self, rate: u32, from: NodeId, to: NodeId, now: Instant) -> u32 {
        let Ok(pair) = PairKey::new(from, to) else {
            return 0;
        };
        match self.links.lock().get(&pair) {
            Some(info) if info.is_fresh(now) => {
                let direction = if pair.first(from) { &info.fwd } else { &info.rev };
                match rate {
                    0 => direction.small,
                    1 => direction.rate_1,
                    2 => direction.rate_2,
                    5 => direction.rate_5,
                    11 => direction.rate_11,
                    _ => 0,
                }
            }
            _ => 0,
        }
    }

    /// Best transmit bitrate toward the interface at `addr`, sampled now.
    pub fn link_rate(&self, addr: LinkAddr) -> u32 {
        self.link_rate_at_time(addr, Instant::now())
    }

    /// Best transmit bitrate toward the node owning the link-layer address
    /// `addr`.
    ///
    /// The address is resolved to a node through the prober, which is also
    /// asked to re-measure the link. Defaults to rate 1 when the address is
    /// unknown or no fresh measurement exists.
    pub fn link_rate_at_time(&self, addr: LinkAddr, now: Instant) -> u32 {
        let Some(peer) = self.prober.resolve_link_address(addr) else {
            return 1;
        };
        self.prober.refresh(peer);
        let Ok(pair) = PairKey::new(self.self_id, peer) else {
            return 1;
        };
        match self.links.lock().get(&pair) {
            Some(info) if info.is_fresh(now) => {
                if pair.first(self.self_id) {
                    info.fwd_rate
                } else {
                    info.rev_rate
                }
            }
            _ => 1,
        }
    }

    /// Neighbors the prober currently tracks.
    pub fn neighbors(&self) -> Vec<NodeId> {
        self.prober.neighbors()
    }

    /// Human-readable table dump, one line per stored pair, sampled now.
    pub fn dump_stats(&self) -> String {
        self.dump_stats_at_time(Instant::now())
    }

    /// Human-readable table dump in insertion order: endpoints, directional
    /// costs and rates, and seconds since the last update. Stale pairs are
    /// listed too, with their age; staleness only gates the metric getters.
    pub fn dump_stats_at_time(&self, now: Instant) -> String {
        let links = self.links.lock();
        let mut out = String::new();
        for (pair, info) in links.iter() {
            let _ = writeln!(
                out,
                "{} {} fwd {} fwd_rate {} rev {} rev_rate {} last {}",
                pair.a(),
                pair.b(),
                info.fwd_cost,
                info.fwd_rate,
                info.rev_cost,
                info.rev_rate,
                info.age(now).as_secs(),
            );
        }
        out
    }

    /// Snapshot of a pair's record, stale or not. Mostly useful for tests
    /// and debugging; metric consumers should use the cost getters.
    pub fn link_info(&self, a: NodeId, b: NodeId) -> Option<LinkInfo> {
        let pair = PairKey::new(a, b).ok()?;
        self.links.lock().get(&pair).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct RecordingSink {
        calls: Arc<Mutex<Vec<(NodeId, NodeId, u32)>>>,
        reject: Arc<AtomicBool>,
    }

    impl RecordingSink {
        fn calls(&self) -> Vec<(NodeId, NodeId, u32)> {
            self.calls.lock().clone()
        }

        fn reject_all(&self) {
            self.reject.store(true, Ordering::SeqCst);
        }
    }

    impl LinkCostSink for RecordingSink {
        fn update_link(&self, from: NodeId, to: NodeId, cost: u32) -> bool {
            self.calls.lock().push((from, to, cost));
            !self.reject.load(Ordering::SeqCst)
        }
    }

    #[derive(Clone, Default)]
    struct StaticProber {
        neighbors: Vec<NodeId>,
        link_addrs: HashMap<LinkAddr, NodeId>,
        refreshed: Arc<Mutex<Vec<NodeId>>>,
    }

    impl LinkProber for StaticProber {
        fn neighbors(&self) -> Vec<NodeId> {
            self.neighbors.clone()
        }

        fn resolve_link_address(&self, addr: LinkAddr) -> Option<NodeId> {
            self.link_addrs.get(&addr).copied()
        }

        fn refresh(&self, node: NodeId) {
            self.refreshed.lock().push(node);
        }
    }

    const A: NodeId = NodeId::new(std::net::Ipv4Addr::new(10, 0, 0, 1));
    const B: NodeId = NodeId::new(std::net::Ipv4Addr::new(10, 0, 0, 2));

    fn sample(small: u32, r1: u32, r2: u32, r5: u32, r11: u32) -> DeliveryRates {
        DeliveryRates {
            small,
            rate_1: r1,
            rate_2: r2,
            rate_5: r5,
            rate_11: r11,
        }
    }

    fn store_at(
        self_id: NodeId,
    ) -> (
        LinkMetricStore<StaticProber, RecordingSink>,
        StaticProber,
        RecordingSink,
    ) {
        let prober = StaticProber {
            neighbors: vec![A, B],
            ..StaticProber::default()
        };
        let sink = RecordingSink::default();
        let store = LinkMetricStore::new(
            self_id,
            MetricConfig::default(),
            prober.clone(),
            sink.clone(),
        );
        (store, prober, sink)
    }

    #[test]
    fn update_then_query_forward_cost() {
        let (store, _, sink) = store_at(A);
        let t0 = Instant::now();

        store
            .update_link_at_time(A, B, sample(90, 90, 80, 60, 40), sample(90, 90, 0, 0, 0), t0)
            .unwrap();

        assert_eq!(store.forward_cost_at_time(B, t0 + Duration::from_secs(10)), 46);
        assert_eq!(sink.calls(), vec![(A, B, 46), (B, A, 123)]);
    }

    #[test]
    fn staleness_window_boundary() {
        let (store, _, _) = store_at(A);
        let t0 = Instant::now();

        store
            .update_link_at_time(A, B, sample(90, 90, 80, 60, 40), sample(90, 90, 0, 0, 0), t0)
            .unwrap();

        assert_eq!(store.forward_cost_at_time(B, t0 + Duration::from_secs(29)), 46);
        assert_eq!(
            store.forward_cost_at_time(B, t0 + Duration::from_secs(30)),
            UNREACHABLE_COST
        );
        assert_eq!(
            store.forward_cost_at_time(B, t0 + Duration::from_secs(31)),
            UNREACHABLE_COST
        );
        // The record survives expiry; a later update revives the same slot.
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn perspective_flips_with_the_querying_node() {
        // B is the canonical second endpoint, so its forward direction is
        // the record's reverse one.
        let (store, _, _) = store_at(B);
        let t0 = Instant::now();

        store
            .update_link_at_time(A, B, sample(90, 90, 80, 60, 40), sample(90, 90, 0, 0, 0), t0)
            .unwrap();

        assert_eq!(store.forward_cost_at_time(A, t0), 123);
        assert_eq!(store.reverse_cost_at_time(A, t0), 46);
    }

    #[test]
    fn swapped_arguments_store_the_same_record() {
        let (store_ab, _, sink_ab) = store_at(A);
        let (store_ba, _, sink_ba) = store_at(A);
        let t0 = Instant::now();

        let fwd = sample(90, 90, 80, 60, 40);
        let rev = sample(90, 90, 0, 0, 0);
        store_ab.update_link_at_time(A, B, fwd, rev, t0).unwrap();
        store_ba.update_link_at_time(B, A, rev, fwd, t0).unwrap();

        assert_eq!(
            store_ab.dump_stats_at_time(t0),
            store_ba.dump_stats_at_time(t0)
        );
        assert_eq!(sink_ab.calls(), sink_ba.calls());
    }

    #[test_log::test]
    fn invalid_updates_leave_no_trace() {
        let (store, _, sink) = store_at(A);
        let unspecified = NodeId::from([0, 0, 0, 0]);

        assert_eq!(
            store.update_link(A, A, sample(90, 90, 0, 0, 0), sample(90, 90, 0, 0, 0)),
            Err(PairError::IdenticalEndpoints(A))
        );
        assert_eq!(
            store.update_link(unspecified, B, DeliveryRates::default(), DeliveryRates::default()),
            Err(PairError::UnspecifiedEndpoint)
        );

        assert!(store.is_empty());
        assert!(sink.calls().is_empty());
    }

    #[test]
    fn all_zero_measurement_is_unreachable_both_ways() {
        let (store, _, sink) = store_at(A);
        let t0 = Instant::now();

        store
            .update_link_at_time(A, B, DeliveryRates::default(), DeliveryRates::default(), t0)
            .unwrap();

        let info = store.link_info(A, B).unwrap();
        assert_eq!(info.fwd_cost, UNREACHABLE_COST);
        assert_eq!(info.rev_cost, UNREACHABLE_COST);
        assert_eq!(info.fwd_rate, 1);
        assert_eq!(info.rev_rate, 1);
        assert_eq!(
            sink.calls(),
            vec![(A, B, UNREACHABLE_COST), (B, A, UNREACHABLE_COST)]
        );
    }

    #[test_log::test]
    fn sink_rejection_does_not_undo_the_local_write() {
        let (store, _, sink) = store_at(A);
        sink.reject_all();
        let t0 = Instant::now();

        store
            .update_link_at_time(A, B, sample(90, 90, 80, 60, 40), sample(90, 90, 0, 0, 0), t0)
            .unwrap();

        // Both pushes were attempted and refused, the record still stands.
        assert_eq!(sink.calls().len(), 2);
        assert_eq!(store.forward_cost_at_time(B, t0), 46);
        assert_eq!(store.reverse_cost_at_time(B, t0), 123);
    }

    #[test]
    fn cost_getters_refresh_the_neighbor_first() {
        let (store, prober, _) = store_at(A);

        store.forward_cost(B);
        store.reverse_cost(B);

        assert_eq!(prober.refreshed.lock().as_slice(), &[B, B]);
    }

    #[test]
    fn delivery_rate_selects_rate_and_direction() {
        let (store, _, _) = store_at(A);
        let t0 = Instant::now();

        store
            .update_link_at_time(A, B, sample(95, 90, 80, 60, 40), sample(85, 70, 50, 30, 10), t0)
            .unwrap();

        assert_eq!(store.delivery_rate_at_time(0, A, B, t0), 95);
        assert_eq!(store.delivery_rate_at_time(11, A, B, t0), 40);
        assert_eq!(store.delivery_rate_at_time(0, B, A, t0), 85);
        assert_eq!(store.delivery_rate_at_time(5, B, A, t0), 30);
        // Unrecognized rate, then stale record.
        assert_eq!(store.delivery_rate_at_time(3, A, B, t0), 0);
        assert_eq!(
            store.delivery_rate_at_time(1, A, B, t0 + Duration::from_secs(31)),
            0
        );
    }

    #[test]
    fn link_rate_resolves_through_the_prober() {
        let addr = LinkAddr::new([0, 0x1c, 0xb3, 9, 0x85, 0x15]);
        let prober = StaticProber {
            neighbors: vec![B],
            link_addrs: HashMap::from([(addr, B)]),
            ..StaticProber::default()
        };
        let sink = RecordingSink::default();
        let store = LinkMetricStore::new(A, MetricConfig::default(), prober, sink);
        let t0 = Instant::now();

        store
            .update_link_at_time(A, B, sample(90, 90, 80, 60, 40), sample(90, 90, 0, 0, 0), t0)
            .unwrap();

        assert_eq!(store.link_rate_at_time(addr, t0), 11);
        // Stale measurement falls back to rate 1.
        assert_eq!(store.link_rate_at_time(addr, t0 + Duration::from_secs(31)), 1);
        // Unknown address falls back to rate 1 without touching the table.
        assert_eq!(store.link_rate_at_time(LinkAddr::new([0xff; 6]), t0), 1);
    }

    #[test]
    fn dump_stats_lists_pairs_in_insertion_order() {
        let c = NodeId::from([10, 0, 0, 3]);
        let (store, _, _) = store_at(A);
        let t0 = Instant::now();

        store
            .update_link_at_time(A, c, sample(90, 90, 80, 60, 40), sample(90, 90, 0, 0, 0), t0)
            .unwrap();
        store
            .update_link_at_time(
                A,
                B,
                DeliveryRates::default(),
                DeliveryRates::default(),
                t0 + Duration::from_secs(5),
            )
            .unwrap();

        let dump = store.dump_stats_at_time(t0 + Duration::from_secs(40));
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 2);
        // Stale pairs are still listed, oldest insertion first.
        assert_eq!(
            lines[0],
            "10.0.0.1 10.0.0.3 fwd 46 fwd_rate 11 rev 123 rev_rate 1 last 40"
        );
        assert_eq!(
            lines[1],
            "10.0.0.1 10.0.0.2 fwd 7777 fwd_rate 1 rev 7777 rev_rate 1 last 35"
        );
    }
}
