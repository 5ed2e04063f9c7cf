pub mod afford;
pub mod budget;
pub mod report;
pub mod scenarios;
pub mod schema;
pub mod stats;
pub mod tax;

use proptax::core::{read_sales_csv, MunicipalityRegistry, SaleRecord};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use std::sync::Arc;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

/// Municipality table from a JSON config, or the built-in Westchester table
pub fn load_registry(config: Option<&Path>) -> anyhow::Result<Arc<MunicipalityRegistry>> {
    let registry = match config {
        Some(path) => {
            let file = File::open(path)?;
            let registry = MunicipalityRegistry::from_json_reader(BufReader::new(file))?;
            log::debug!("loaded {} municipalities from {}", registry.len(), path.display());
            registry
        }
        None => MunicipalityRegistry::westchester(),
    };
    Ok(Arc::new(registry))
}

/// Read sale records from a CSV file (or stdin with "-")
pub fn read_sales(path: &Path) -> anyhow::Result<Vec<SaleRecord>> {
    if path.as_os_str() == "-" {
        let mut buffer = Vec::new();
        BufReader::new(io::stdin().lock()).read_to_end(&mut buffer)?;
        if buffer.is_empty() {
            anyhow::bail!("No input received. Provide a file or pipe data to stdin.");
        }
        Ok(read_sales_csv(io::Cursor::new(buffer)).into_records())
    } else {
        let file = File::open(path)?;
        Ok(read_sales_csv(BufReader::new(file)).into_records())
    }
}

/// `None` when no keys were given, meaning "all"
pub fn key_filter(keys: &[String]) -> Option<Vec<&str>> {
    if keys.is_empty() {
        None
    } else {
        Some(keys.iter().map(String::as_str).collect())
    }
}

pub fn print_table<T: Tabled>(rows: impl IntoIterator<Item = T>) {
    let table = Table::new(rows)
        .with(Style::rounded())
        .with(Modify::new(Rows::new(1..)).with(Alignment::right()))
        .to_string();
    println!("{}", table);
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_key_list_means_all() {
        assert_eq!(key_filter(&[]), None);
        let keys = vec!["bronxville".to_string()];
        assert_eq!(key_filter(&keys), Some(vec!["bronxville"]));
    }

    #[test]
    fn registry_defaults_to_westchester() {
        let registry = load_registry(None).unwrap();
        assert_eq!(registry.len(), 10);
        assert!(load_registry(Some(Path::new("does/not/exist.json"))).is_err());
    }
}
