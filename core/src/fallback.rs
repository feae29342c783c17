//! Nearest-neighbour fallback for scene objects whose identity key found no
//! exact match in the saved records.
//!
//! RULE: The matcher is stateless. Callers own the claimed set and must
//! mark a returned record claimed before the next lookup.

use crate::{snapshot::SceneObjectRecord, types::Vec3};
use std::collections::BTreeSet;

/// Index of the candidate nearest to `target` by squared distance, never
/// farther than `max_radius`. Ties keep the first candidate encountered.
/// A negative or NaN radius only admits candidates at `target` itself.
pub fn find_nearest<I>(candidates: I, target: Vec3, max_radius: f32) -> Option<usize>
where
    I: IntoIterator<Item = (usize, Vec3)>,
{
    let radius = max_radius.max(0.0);
    let max_sq = radius * radius;
    let mut best: Option<(usize, f32)> = None;
    for (index, position) in candidates {
        let d = position.distance_squared(target);
        if d.is_nan() || d > max_sq {
            continue;
        }
        if best.map_or(true, |(_, best_d)| d < best_d) {
            best = Some((index, d));
        }
    }
    best.map(|(index, _)| index)
}

/// Pick an unclaimed record for an entity at `target` carrying capability
/// types `type_names`. Records written by the same capability types are
/// preferred; any unclaimed record within range is the second choice.
pub fn match_record(
    records:    &[&SceneObjectRecord],
    claimed:    &[bool],
    target:     Vec3,
    type_names: &BTreeSet<&str>,
    max_radius: f32,
) -> Option<usize> {
    let unclaimed = || {
        records
            .iter()
            .enumerate()
            .filter(move |(i, _)| !claimed.get(*i).copied().unwrap_or(false))
    };

    let same_type = unclaimed()
        .filter(|(_, r)| !r.type_names().is_disjoint(type_names))
        .map(|(i, r)| (i, r.position));
    if let Some(i) = find_nearest(same_type, target, max_radius) {
        return Some(i);
    }

    find_nearest(unclaimed().map(|(i, r)| (i, r.position)), target, max_radius)
}
