//! Points of interest: composite entries over overlapping same-direction zones
//!
//! Two zones belong together when their bands overlap by at least
//! `overlap_ratio` of the narrower band, or are disjoint by no more than
//! `gap_atr * ATR`. Groups are the connected components of that relation
//! (union-find), with a sorted sweep bounding the candidate pairs. Member
//! zones are left untouched.

use super::{stable_id, DetectionContext, Provenance, Zone, ZoneDetector, ZoneKind, ZoneStatus};
use crate::config::PoiConfig;
use crate::error::Degraded;
use crate::types::{Direction, Role};

pub struct PoiDetector;

impl ZoneDetector for PoiDetector {
    fn kind(&self) -> ZoneKind {
        ZoneKind::Poi
    }

    fn detect(&self, ctx: &DetectionContext<'_>) -> Result<Vec<Zone>, Degraded> {
        let atr = ctx.require_atr("zones.poi")?;
        let mut pois = Vec::new();

        for direction in [Direction::Bullish, Direction::Bearish] {
            let mut members: Vec<&Zone> = ctx
                .prior
                .iter()
                .filter(|z| z.direction == direction && z.kind != ZoneKind::Poi && z.status.is_live())
                .collect();
            members.sort_by(|a, b| a.low.total_cmp(&b.low).then(a.high.total_cmp(&b.high)));

            for group in merge_groups(&members, atr, &ctx.config.poi) {
                if group.len() < 2 {
                    continue;
                }
                let zones: Vec<&Zone> = group.iter().map(|&i| members[i]).collect();
                pois.push(composite(&zones, direction, ctx));
            }
        }

        Ok(pois)
    }
}

/// Whether two bands should be presented as one
pub fn should_merge(a: &Zone, b: &Zone, atr: f64, config: &PoiConfig) -> bool {
    let gap = a.low.max(b.low) - a.high.min(b.high);
    if gap > 0.0 {
        return gap <= config.gap_atr * atr;
    }

    let overlap = -gap;
    let narrower = a.span().min(b.span());
    if narrower <= 0.0 {
        return true;
    }
    overlap / narrower >= config.overlap_ratio
}

/// Connected components over `zones` (sorted by `low`)
fn merge_groups(zones: &[&Zone], atr: f64, config: &PoiConfig) -> Vec<Vec<usize>> {
    let mut sets = DisjointSet::new(zones.len());
    let reach = config.gap_atr * atr;

    for i in 0..zones.len() {
        for j in i + 1..zones.len() {
            // Sorted by low: once j starts beyond i's reach, later ones do too
            if zones[j].low - zones[i].high > reach {
                break;
            }
            if should_merge(zones[i], zones[j], atr, config) {
                sets.union(i, j);
            }
        }
    }

    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut root_slot: Vec<Option<usize>> = vec![None; zones.len()];
    for i in 0..zones.len() {
        let root = sets.find(i);
        match root_slot[root] {
            Some(slot) => groups[slot].push(i),
            None => {
                root_slot[root] = Some(groups.len());
                groups.push(vec![i]);
            }
        }
    }
    groups
}

fn composite(zones: &[&Zone], direction: Direction, ctx: &DetectionContext<'_>) -> Zone {
    let low = zones.iter().map(|z| z.low).fold(f64::MAX, f64::min);
    let high = zones.iter().map(|z| z.high).fold(f64::MIN, f64::max);
    let strength = zones.iter().map(|z| z.strength).fold(0.0, f64::max);

    let mut ids: Vec<String> = zones.iter().map(|z| z.id.to_string()).collect();
    ids.sort();

    let latest = zones
        .iter()
        .max_by_key(|z| (z.origin_index, z.origin_time));
    let (origin_time, origin_index) = latest
        .map(|z| (z.origin_time, z.origin_index))
        .unwrap_or((zones[0].origin_time, zones[0].origin_index));

    let status = if zones.iter().any(|z| z.status == ZoneStatus::Active) {
        ZoneStatus::Active
    } else {
        ZoneStatus::Mitigated
    };

    Zone {
        id: stable_id(ZoneKind::Poi, ctx.timeframe, &ids.join(",")),
        kind: ZoneKind::Poi,
        timeframe: ctx.timeframe.clone(),
        low,
        high,
        origin_time,
        origin_index,
        direction,
        role: Role::relative(direction, ctx.structure.bias),
        strength,
        status,
        fill_pct: 0.0,
        provenance: zones
            .iter()
            .map(|z| Provenance::Zone { id: z.id, kind: z.kind })
            .collect(),
    }
}

/// Union-find with path halving
struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            // Lower index stays root so group order is deterministic
            let (root, child) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[child] = root;
        }
    }
}
