use super::InteractionStore;
use crate::config::DataConfig;
use crate::error::{RecError, Result};
use crate::models::{Interaction, InteractionKind, Item, User};
use crate::utils::validation::validate_interaction;
use chrono::{DateTime, NaiveDateTime};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

#[derive(Debug, Deserialize)]
struct UserRow {
    user_id: usize,
}

#[derive(Debug, Deserialize)]
struct ItemRow {
    #[serde(alias = "product_id", alias = "producto_id")]
    item_id: usize,
    #[serde(default, alias = "categoria")]
    category: Option<String>,
    #[serde(default, alias = "precio")]
    price: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct InteractionRow {
    #[serde(alias = "usuario_id")]
    user_id: usize,
    #[serde(alias = "product_id", alias = "producto_id")]
    item_id: usize,
    timestamp: String,
    #[serde(default, alias = "rating", alias = "puntuacion")]
    weight: Option<f32>,
    #[serde(default, alias = "tipo_interaccion")]
    interaction_type: Option<String>,
}

/// Checks that every input table exists before any of them is read.
pub fn check_inputs(config: &DataConfig) -> Result<()> {
    for path in [config.users_path(), config.items_path(), config.interactions_path()] {
        if !path.exists() {
            return Err(RecError::MissingInput { path });
        }
    }
    Ok(())
}

pub fn load_store(config: &DataConfig) -> Result<InteractionStore> {
    check_inputs(config)?;

    let users = load_users(&config.users_path())?;
    let items = load_items(&config.items_path())?;
    let interactions = load_interactions(&config.interactions_path())?;

    info!(
        "Loaded {} users, {} items, {} interactions from {}",
        users.len(),
        items.len(),
        interactions.len(),
        config.data_dir.display()
    );

    Ok(InteractionStore::new(users, items, interactions))
}

pub fn load_users(path: &Path) -> Result<Vec<User>> {
    Ok(read_rows::<UserRow>(path)?
        .into_iter()
        .map(|row| User { user_id: row.user_id })
        .collect())
}

pub fn load_items(path: &Path) -> Result<Vec<Item>> {
    Ok(read_rows::<ItemRow>(path)?
        .into_iter()
        .map(|row| Item {
            item_id: row.item_id,
            category: row.category.filter(|c| !c.is_empty()),
            price: row.price,
        })
        .collect())
}

pub fn load_interactions(path: &Path) -> Result<Vec<Interaction>> {
    read_rows::<InteractionRow>(path)?
        .into_iter()
        .enumerate()
        .map(|(line, row)| -> Result<Interaction> {
            let malformed = |message: String| RecError::MalformedData {
                path: path.to_path_buf(),
                message: format!("row {}: {}", line + 1, message),
            };

            let weight = match (row.weight, row.interaction_type.as_deref()) {
                (Some(weight), _) => weight,
                (None, Some(kind)) => InteractionKind::parse(kind)
                    .map(|k| k.weight())
                    .ok_or_else(|| malformed(format!("unknown interaction type '{}'", kind)))?,
                (None, None) => {
                    return Err(malformed(
                        "needs a weight/rating or an interaction_type column".to_string(),
                    ))
                }
            };
            let timestamp = parse_timestamp(&row.timestamp)
                .ok_or_else(|| malformed(format!("unparseable timestamp '{}'", row.timestamp)))?;

            let interaction = Interaction::new(row.user_id, row.item_id, weight, timestamp);
            validate_interaction(&interaction).map_err(malformed)?;
            Ok(interaction)
        })
        .collect()
}

/// Accepts Unix seconds, RFC 3339, or `YYYY-MM-DD HH:MM:SS[.fff]`.
pub fn parse_timestamp(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(seconds) = raw.parse::<i64>() {
        return Some(seconds);
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.timestamp());
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc().timestamp())
}

fn read_rows<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| csv_error(path, e))?;
    reader
        .deserialize::<T>()
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| csv_error(path, e))
}

fn csv_error(path: &Path, err: csv::Error) -> RecError {
    let message = err.to_string();
    match err.into_kind() {
        csv::ErrorKind::Io(source) => RecError::Storage {
            path: path.to_path_buf(),
            source,
        },
        _ => RecError::MalformedData {
            path: path.to_path_buf(),
            message,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn temp_dir() -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("towerec-loader-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn data_config(dir: &Path) -> DataConfig {
        DataConfig {
            data_dir: dir.to_path_buf(),
            users_file: "users.csv".to_string(),
            items_file: "items.csv".to_string(),
            interactions_file: "interactions.csv".to_string(),
        }
    }

    #[test]
    fn test_parse_timestamp() {
        assert_eq!(parse_timestamp("1700000000"), Some(1_700_000_000));
        assert_eq!(parse_timestamp("1970-01-01T00:01:00Z"), Some(60));
        assert_eq!(parse_timestamp("1970-01-01 00:00:10"), Some(10));
        assert_eq!(parse_timestamp("1970-01-01 00:00:10.250"), Some(10));
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_load_store_with_types_and_unknown_ids() {
        let dir = temp_dir();
        fs::write(dir.join("users.csv"), "user_id,name\n1,Ana\n2,Luis\n").unwrap();
        fs::write(
            dir.join("items.csv"),
            "product_id,categoria,precio\n1001,Hogar,10.5\n1002,Ropa,20.0\n",
        )
        .unwrap();
        fs::write(
            dir.join("interactions.csv"),
            "user_id,product_id,timestamp,tipo_interaccion\n\
             1,1001,2024-01-01 10:00:00,compra\n\
             2,1002,2024-01-02 10:00:00,visto\n\
             9,1001,2024-01-03 10:00:00,clic\n",
        )
        .unwrap();

        let store = load_store(&data_config(&dir)).unwrap();
        assert_eq!(store.interactions().len(), 2);
        assert_eq!(store.dropped(), 1);
        assert_eq!(store.interactions()[0].weight, 4.0);
        assert_eq!(store.items()[0].category.as_deref(), Some("Hogar"));

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_missing_file_is_fatal() {
        let dir = temp_dir();
        fs::write(dir.join("users.csv"), "user_id\n1\n").unwrap();
        let err = load_store(&data_config(&dir)).unwrap_err();
        assert!(matches!(err, RecError::MissingInput { .. }));
        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_row_without_weight_or_type_is_malformed() {
        let dir = temp_dir();
        let path = dir.join("interactions.csv");
        fs::write(&path, "user_id,item_id,timestamp\n1,1001,5\n").unwrap();
        let err = load_interactions(&path).unwrap_err();
        assert!(matches!(err, RecError::MalformedData { .. }));
        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_explicit_rating_column() {
        let dir = temp_dir();
        let path = dir.join("interactions.csv");
        fs::write(&path, "user_id,item_id,timestamp,rating\n1,1001,5,3.5\n").unwrap();
        let interactions = load_interactions(&path).unwrap();
        assert_eq!(interactions, vec![Interaction::new(1, 1001, 3.5, 5)]);
        fs::remove_dir_all(dir).ok();
    }
}
