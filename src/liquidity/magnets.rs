//! Magnet aggregation: nearby pools merged into one price band

use serde::Serialize;

use super::pools::{LiquidityPool, PoolKind};
use super::sweep_clusters;
use crate::types::{Direction, Role};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiquidityMagnet {
    pub low: f64,
    pub high: f64,
    /// Strength-weighted center of the member pools
    pub price: f64,
    pub kind: PoolKind,
    pub direction: Direction,
    pub role: Role,
    /// Combined strength `1 - prod(1 - s)`
    pub strength: f64,
    pub pool_count: usize,
    pub primary: bool,
}

impl LiquidityMagnet {
    pub fn contains(&self, price: f64) -> bool {
        price >= self.low && price <= self.high
    }
}

/// Cluster pools by price, then mark the strongest primary-role magnets
pub fn aggregate_magnets(
    pools: &[LiquidityPool],
    tolerance_pct: f64,
    max_primary: usize,
) -> Vec<LiquidityMagnet> {
    let refs: Vec<&LiquidityPool> = pools.iter().collect();
    let mut magnets: Vec<LiquidityMagnet> = sweep_clusters(refs, |p| p.price, tolerance_pct)
        .into_iter()
        .filter_map(|cluster| build_magnet(&cluster))
        .collect();

    let mut candidates: Vec<usize> = magnets
        .iter()
        .enumerate()
        .filter(|(_, m)| m.role == Role::Primary)
        .map(|(i, _)| i)
        .collect();
    candidates.sort_by(|&a, &b| {
        magnets[b]
            .strength
            .total_cmp(&magnets[a].strength)
            .then(magnets[a].price.total_cmp(&magnets[b].price))
    });
    for i in candidates.into_iter().take(max_primary) {
        magnets[i].primary = true;
    }

    magnets
}

fn build_magnet(cluster: &[&LiquidityPool]) -> Option<LiquidityMagnet> {
    let dominant = cluster
        .iter()
        .min_by(|a, b| {
            a.kind
                .priority()
                .cmp(&b.kind.priority())
                .then(b.strength.total_cmp(&a.strength))
        })?;

    let low = cluster.iter().map(|p| p.price).fold(f64::MAX, f64::min);
    let high = cluster.iter().map(|p| p.price).fold(f64::MIN, f64::max);
    let weight: f64 = cluster.iter().map(|p| p.strength).sum();
    let price = if weight > 0.0 {
        cluster.iter().map(|p| p.price * p.strength).sum::<f64>() / weight
    } else {
        (low + high) / 2.0
    };
    let strength = 1.0 - cluster.iter().map(|p| 1.0 - p.strength.clamp(0.0, 1.0)).product::<f64>();

    Some(LiquidityMagnet {
        low,
        high,
        price,
        kind: dominant.kind,
        direction: dominant.direction,
        role: dominant_role(cluster),
        strength,
        pool_count: cluster.len(),
        primary: false,
    })
}

/// Role carrying the most pool strength; ties resolve Primary, Countertrend, Neutral
fn dominant_role(cluster: &[&LiquidityPool]) -> Role {
    let weight = |role: Role| -> f64 {
        cluster
            .iter()
            .filter(|p| p.role == role)
            .map(|p| p.strength)
            .sum()
    };

    [Role::Primary, Role::Countertrend, Role::Neutral]
        .into_iter()
        .map(|role| (role, weight(role)))
        .fold((Role::Neutral, f64::MIN), |best, cur| {
            if cur.1 > best.1 {
                cur
            } else {
                best
            }
        })
        .0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ts;

    fn pool(kind: PoolKind, price: f64, role: Role, strength: f64) -> LiquidityPool {
        LiquidityPool {
            kind,
            price,
            direction: Direction::Bullish,
            role,
            strength,
            touches: 2,
            first_touch: ts(0),
            last_touch: ts(1),
            first_index: 0,
            last_index: 1,
            session: None,
        }
    }

    #[test]
    fn test_nearby_pools_merge() {
        let pools = vec![
            pool(PoolKind::EqualHighs, 100.0, Role::Primary, 0.5),
            pool(PoolKind::RangeExtreme, 100.05, Role::Primary, 0.8),
            pool(PoolKind::EqualHighs, 110.0, Role::Primary, 0.5),
        ];
        let magnets = aggregate_magnets(&pools, 0.001, 3);

        assert_eq!(magnets.len(), 2);
        assert_eq!(magnets[0].kind, PoolKind::RangeExtreme);
        assert_eq!(magnets[0].pool_count, 2);
        assert!((magnets[0].strength - 0.9).abs() < 1e-9);
        assert_eq!(magnets[0].low, 100.0);
        assert_eq!(magnets[0].high, 100.05);
    }

    #[test]
    fn test_primary_limit() {
        let pools = vec![
            pool(PoolKind::EqualHighs, 100.0, Role::Primary, 0.3),
            pool(PoolKind::EqualHighs, 110.0, Role::Primary, 0.9),
            pool(PoolKind::EqualHighs, 120.0, Role::Primary, 0.6),
            pool(PoolKind::EqualHighs, 130.0, Role::Countertrend, 1.0),
        ];
        let magnets = aggregate_magnets(&pools, 0.001, 2);

        let primary: Vec<f64> = magnets.iter().filter(|m| m.primary).map(|m| m.price).collect();
        assert_eq!(primary, vec![110.0, 120.0]);
    }

    #[test]
    fn test_dominant_role_by_strength() {
        let pools = vec![
            pool(PoolKind::EqualHighs, 100.0, Role::Countertrend, 0.2),
            pool(PoolKind::WickCluster, 100.01, Role::Primary, 0.6),
        ];
        let magnets = aggregate_magnets(&pools, 0.001, 3);
        assert_eq!(magnets[0].role, Role::Primary);
        assert_eq!(magnets[0].kind, PoolKind::EqualHighs);
    }
}
