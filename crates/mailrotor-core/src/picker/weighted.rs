//! Weighted random selection over operator-assigned probabilities
//!
//! Each server carries a 0-100 weight. A draw lands in one of the
//! cumulative buckets, so a server with weight 80 next to one with
//! weight 20 wins roughly four times out of five. Servers with weight 0
//! are only eligible when every candidate has weight 0, in which case
//! the draw degenerates to uniform.

use mailrotor_storage::models::DeliveryServer;
use rand::Rng;

/// Pick one server from `candidates` by weight. Returns the index into
/// the slice, or `None` when it is empty.
pub fn weighted_index<R: Rng>(candidates: &[DeliveryServer], rng: &mut R) -> Option<usize> {
    if candidates.is_empty() {
        return None;
    }
    if candidates.len() == 1 {
        return Some(0);
    }

    let total: i64 = candidates
        .iter()
        .map(|s| i64::from(s.probability.max(0)))
        .sum();
    if total == 0 {
        return Some(rng.gen_range(0..candidates.len()));
    }

    let draw = rng.gen_range(0..total);
    let mut cumulative = 0i64;
    for (index, server) in candidates.iter().enumerate() {
        cumulative += i64::from(server.probability.max(0));
        if draw < cumulative {
            return Some(index);
        }
    }

    // Unreachable while total > 0, but the fallback keeps this total.
    Some(candidates.len() - 1)
}

/// Pick one server by weight, consuming the candidate list.
pub fn weighted_pick<R: Rng>(
    mut candidates: Vec<DeliveryServer>,
    rng: &mut R,
) -> Option<DeliveryServer> {
    weighted_index(&candidates, rng).map(|index| candidates.swap_remove(index))
}
