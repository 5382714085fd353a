use crate::error::Result;
use crate::models::{Interaction, UserId};
use crate::utils::validation::validate_split_fraction;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeMap;

/// Per-user temporal split.
///
/// Each user's interactions are ordered by timestamp and the most recent
/// `ceil(n * validation_fraction)` of them (at least one) are held out. A user
/// with two or more interactions always keeps at least one in train. Equal
/// timestamps are ordered by a shuffle seeded with `seed`, so the split is
/// reproducible.
pub fn split(
    interactions: &[Interaction],
    validation_fraction: f64,
    seed: u64,
) -> Result<(Vec<Interaction>, Vec<Interaction>)> {
    validate_split_fraction(validation_fraction)?;

    let mut by_user: BTreeMap<UserId, Vec<Interaction>> = BTreeMap::new();
    for interaction in interactions {
        by_user
            .entry(interaction.user_id)
            .or_default()
            .push(interaction.clone());
    }

    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(interactions.len());
    let mut validation = Vec::new();

    for (_, mut history) in by_user {
        history.shuffle(&mut rng);
        history.sort_by_key(|i| i.timestamp);

        let n = history.len();
        let held_out = holdout_count(n, validation_fraction);
        let cut = n - held_out;

        validation.extend(history.drain(cut..));
        train.extend(history);
    }

    Ok((train, validation))
}

fn holdout_count(n: usize, validation_fraction: f64) -> usize {
    if n == 0 {
        return 0;
    }
    let wanted = ((n as f64) * validation_fraction).ceil() as usize;
    let wanted = wanted.max(1);
    if n >= 2 {
        wanted.min(n - 1)
    } else {
        wanted
    }
}
