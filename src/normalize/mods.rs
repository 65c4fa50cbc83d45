//! Lane mods: mirror, random and explicit rearrangement.

use crate::models::chart::NoteInfo;
use crate::models::settings::SessionConfig;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// Flips lanes left to right.
pub fn mirror(notes: &mut [NoteInfo], key_count: usize) {
    for note in notes.iter_mut() {
        note.lane = key_count - 1 - note.lane;
    }
}

/// Applies `permutation[lane] = new_lane` to every note.
///
/// Returns false and leaves the notes untouched if the permutation is not
/// a bijection over `0..key_count`.
pub fn rearrange(notes: &mut [NoteInfo], key_count: usize, permutation: &[usize]) -> bool {
    if !is_permutation(permutation, key_count) {
        log::warn!("CHART: ignoring invalid lane permutation {:?}", permutation);
        return false;
    }
    for note in notes.iter_mut() {
        note.lane = permutation[note.lane];
    }
    true
}

/// Builds a random lane permutation, seeded when `seed` is given.
pub fn random_permutation(key_count: usize, seed: Option<u64>) -> Vec<usize> {
    let mut lanes: Vec<usize> = (0..key_count).collect();
    match seed {
        Some(seed) => lanes.shuffle(&mut StdRng::seed_from_u64(seed)),
        None => lanes.shuffle(&mut rand::rng()),
    }
    lanes
}

fn is_permutation(permutation: &[usize], key_count: usize) -> bool {
    if permutation.len() != key_count {
        return false;
    }
    let mut seen = vec![false; key_count];
    for &lane in permutation {
        match seen.get_mut(lane) {
            Some(slot) if !*slot => *slot = true,
            _ => return false,
        }
    }
    true
}

/// Applies the lane mods selected in `config`.
pub fn apply(notes: &mut [NoteInfo], key_count: usize, config: &SessionConfig) {
    if let Some(permutation) = &config.rearrange {
        rearrange(notes, key_count, permutation);
    } else if config.random {
        let permutation = random_permutation(key_count, config.random_seed);
        log::info!("CHART: random lanes {:?}", permutation);
        rearrange(notes, key_count, &permutation);
    }

    if config.mirror {
        mirror(notes, key_count);
    }
}
