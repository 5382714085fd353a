use super::InteractionStore;
use crate::error::{RecError, Result};
use crate::models::{Interaction, InteractionKind, Item, User};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::path::Path;
use tracing::info;

const CATEGORIES: [&str; 5] = ["electronics", "clothing", "home", "toys", "sports"];
const KIND_MIX: [(InteractionKind, u32); 4] = [
    (InteractionKind::View, 50),
    (InteractionKind::Click, 30),
    (InteractionKind::CartAdd, 15),
    (InteractionKind::Purchase, 5),
];
/// One year of history ending at this Unix time.
const HISTORY_END: i64 = 1_735_689_600;
const HISTORY_SPAN: i64 = 365 * 24 * 3600;

#[derive(Debug, Clone)]
pub struct SyntheticSpec {
    pub num_users: usize,
    pub num_items: usize,
    pub item_id_base: usize,
    pub num_interactions: usize,
    pub seed: u64,
}

impl Default for SyntheticSpec {
    fn default() -> Self {
        Self {
            num_users: 100,
            num_items: 50,
            item_id_base: 1000,
            num_interactions: 5000,
            seed: 42,
        }
    }
}

/// Users numbered from 1, items from `item_id_base + 1`, interactions with a
/// view-heavy type mix, sorted by time.
pub fn generate(spec: &SyntheticSpec) -> InteractionStore {
    let mut rng = rand::rngs::StdRng::seed_from_u64(spec.seed);

    let users: Vec<User> = (1..=spec.num_users).map(|user_id| User { user_id }).collect();
    let items: Vec<Item> = (1..=spec.num_items)
        .map(|i| Item {
            item_id: spec.item_id_base + i,
            category: CATEGORIES.choose(&mut rng).map(|c| c.to_string()),
            price: Some((rng.gen_range(5.99..500.99) * 100.0_f64).round() / 100.0),
        })
        .collect();

    let mut interactions: Vec<Interaction> = Vec::with_capacity(spec.num_interactions);
    if !users.is_empty() && !items.is_empty() {
        for _ in 0..spec.num_interactions {
            let user = rng.gen_range(1..=spec.num_users);
            let item = spec.item_id_base + rng.gen_range(1..=spec.num_items);
            let kind = sample_kind(&mut rng);
            let timestamp = HISTORY_END - rng.gen_range(0..HISTORY_SPAN);
            interactions.push(Interaction::from_kind(user, item, kind, timestamp));
        }
    }
    interactions.sort_by_key(|i| i.timestamp);

    InteractionStore::new(users, items, interactions)
}

fn sample_kind<R: Rng>(rng: &mut R) -> InteractionKind {
    let total: u32 = KIND_MIX.iter().map(|(_, w)| w).sum();
    let mut roll = rng.gen_range(0..total);
    for (kind, weight) in KIND_MIX {
        if roll < weight {
            return kind;
        }
        roll -= weight;
    }
    InteractionKind::View
}

/// Writes `users.csv`, `items.csv` and `interactions.csv` into `dir`.
pub fn write_csv(store: &InteractionStore, dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|source| RecError::Storage {
        path: dir.to_path_buf(),
        source,
    })?;

    let users_path = dir.join("users.csv");
    let mut writer = csv_writer(&users_path)?;
    write_record(&mut writer, &users_path, ["user_id"])?;
    for user in store.users() {
        write_record(&mut writer, &users_path, [user.user_id.to_string()])?;
    }
    flush(writer, &users_path)?;

    let items_path = dir.join("items.csv");
    let mut writer = csv_writer(&items_path)?;
    write_record(&mut writer, &items_path, ["item_id", "category", "price"])?;
    for item in store.items() {
        write_record(
            &mut writer,
            &items_path,
            [
                item.item_id.to_string(),
                item.category.clone().unwrap_or_default(),
                item.price.map(|p| format!("{:.2}", p)).unwrap_or_default(),
            ],
        )?;
    }
    flush(writer, &items_path)?;

    let interactions_path = dir.join("interactions.csv");
    let mut writer = csv_writer(&interactions_path)?;
    write_record(
        &mut writer,
        &interactions_path,
        ["user_id", "item_id", "timestamp", "weight"],
    )?;
    for interaction in store.interactions() {
        write_record(
            &mut writer,
            &interactions_path,
            [
                interaction.user_id.to_string(),
                interaction.item_id.to_string(),
                interaction.timestamp.to_string(),
                interaction.weight.to_string(),
            ],
        )?;
    }
    flush(writer, &interactions_path)?;

    info!(
        "Wrote synthetic dataset to {} ({} interactions)",
        dir.display(),
        store.interactions().len()
    );
    Ok(())
}

fn csv_writer(path: &Path) -> Result<csv::Writer<std::fs::File>> {
    csv::Writer::from_path(path).map_err(|e| write_error(path, e))
}

fn write_record<I, T>(writer: &mut csv::Writer<std::fs::File>, path: &Path, record: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    writer.write_record(record).map_err(|e| write_error(path, e))
}

fn flush(mut writer: csv::Writer<std::fs::File>, path: &Path) -> Result<()> {
    writer.flush().map_err(|source| RecError::Storage {
        path: path.to_path_buf(),
        source,
    })
}

fn write_error(path: &Path, err: csv::Error) -> RecError {
    RecError::Storage {
        path: path.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::Other, err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_is_reproducible() {
        let spec = SyntheticSpec {
            num_interactions: 300,
            ..SyntheticSpec::default()
        };
        let a = generate(&spec);
        let b = generate(&spec);
        assert_eq!(a.interactions(), b.interactions());
        assert_eq!(a.items(), b.items());
        assert_eq!(a.dropped(), 0);
    }

    #[test]
    fn test_generate_catalog_layout() {
        let store = generate(&SyntheticSpec::default());
        assert_eq!(store.users().len(), 100);
        assert_eq!(store.items().len(), 50);
        assert_eq!(store.items()[0].item_id, 1001);
        assert_eq!(store.shape().item_rows(), 1051);
        assert!(store
            .interactions()
            .windows(2)
            .all(|w| w[0].timestamp <= w[1].timestamp));
        assert!(store
            .interactions()
            .iter()
            .all(|i| (1.0..=4.0).contains(&i.weight)));
    }

    #[test]
    fn test_write_csv_round_trips_through_loader() {
        let dir = std::env::temp_dir().join(format!("towerec-synth-{}", uuid::Uuid::new_v4()));
        let store = generate(&SyntheticSpec {
            num_users: 5,
            num_items: 4,
            num_interactions: 20,
            ..SyntheticSpec::default()
        });
        write_csv(&store, &dir).unwrap();

        let config = crate::config::DataConfig {
            data_dir: dir.clone(),
            users_file: "users.csv".to_string(),
            items_file: "items.csv".to_string(),
            interactions_file: "interactions.csv".to_string(),
        };
        let loaded = crate::data::loader::load_store(&config).unwrap();
        assert_eq!(loaded.interactions().len(), 20);
        assert_eq!(loaded.users().len(), 5);

        std::fs::remove_dir_all(dir).ok();
    }
}
