//! In-memory interaction store and the aggregation step that turns raw
//! interactions into per-pair training targets.

pub mod loader;
pub mod split;
pub mod synthetic;

use crate::models::{Interaction, Item, ItemId, MatrixShape, User, UserId};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

pub use split::split;

#[derive(Debug, Clone)]
pub struct InteractionStore {
    users: Vec<User>,
    items: Vec<Item>,
    interactions: Vec<Interaction>,
    dropped: usize,
}

impl InteractionStore {
    /// Builds the store, dropping interactions whose user or item is not in
    /// the catalog.
    pub fn new(users: Vec<User>, items: Vec<Item>, interactions: Vec<Interaction>) -> Self {
        let known_users: BTreeSet<UserId> = users.iter().map(|u| u.user_id).collect();
        let known_items: BTreeSet<ItemId> = items.iter().map(|i| i.item_id).collect();

        let total = interactions.len();
        let interactions: Vec<Interaction> = interactions
            .into_iter()
            .filter(|i| known_users.contains(&i.user_id) && known_items.contains(&i.item_id))
            .collect();
        let dropped = total - interactions.len();

        if dropped > 0 {
            warn!(
                "Dropped {} of {} interactions referencing unknown users or items",
                dropped, total
            );
        }
        info!(
            "Interaction store ready: {} users, {} items, {} interactions",
            users.len(),
            items.len(),
            interactions.len()
        );

        Self {
            users,
            items,
            interactions,
            dropped,
        }
    }

    /// Store whose catalog is inferred from the interactions themselves.
    pub fn from_interactions(interactions: Vec<Interaction>) -> Self {
        let users = interactions
            .iter()
            .map(|i| i.user_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(|user_id| User { user_id })
            .collect();
        let items = interactions
            .iter()
            .map(|i| i.item_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(|item_id| Item {
                item_id,
                category: None,
                price: None,
            })
            .collect();
        Self::new(users, items, interactions)
    }

    pub fn users(&self) -> &[User] {
        &self.users
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn interactions(&self) -> &[Interaction] {
        &self.interactions
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn is_empty(&self) -> bool {
        self.interactions.is_empty()
    }

    /// Matrix bounds covering every catalog id, not only ids that interacted.
    pub fn shape(&self) -> MatrixShape {
        MatrixShape::new(
            self.users.iter().map(|u| u.user_id).max().unwrap_or(0),
            self.items.iter().map(|i| i.item_id).max().unwrap_or(0),
        )
    }
}

/// Sums the weights of repeated (user, item) pairs into a single interaction.
/// The aggregate keeps the latest timestamp of the pair. Output is ordered by
/// (user, item).
pub fn aggregate(interactions: &[Interaction]) -> Vec<Interaction> {
    let mut pairs: BTreeMap<(UserId, ItemId), (f32, i64)> = BTreeMap::new();
    for interaction in interactions {
        let entry = pairs
            .entry((interaction.user_id, interaction.item_id))
            .or_insert((0.0, i64::MIN));
        entry.0 += interaction.weight;
        entry.1 = entry.1.max(interaction.timestamp);
    }

    pairs
        .into_iter()
        .map(|((user_id, item_id), (weight, timestamp))| {
            Interaction::new(user_id, item_id, weight, timestamp)
        })
        .collect()
}

/// Distinct held-out items per user.
pub fn ground_truth(interactions: &[Interaction]) -> BTreeMap<UserId, BTreeSet<ItemId>> {
    let mut truth: BTreeMap<UserId, BTreeSet<ItemId>> = BTreeMap::new();
    for interaction in interactions {
        truth
            .entry(interaction.user_id)
            .or_default()
            .insert(interaction.item_id);
    }
    truth
}
