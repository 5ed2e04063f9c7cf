//! Afford command - home value an annual tax budget buys in each municipality

use super::{print_json, print_table, read_sales};
use clap::Args;
use proptax::core::{Affordability, ComparisonEngine, MunicipalityRegistry};
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::sync::Arc;
use tabled::Tabled;

#[derive(Args, Debug)]
pub struct AffordCommand {
    /// Annual property tax budget in dollars
    budget: Decimal,

    /// Sales CSV used to translate values into typical square footage
    #[arg(short, long)]
    sales: Option<PathBuf>,

    /// Output as JSON instead of formatted table
    #[arg(long)]
    json: bool,
}

#[derive(Tabled)]
struct AffordRow {
    #[tabled(rename = "Municipality")]
    name: String,
    #[tabled(rename = "Affordable Value")]
    value: String,
    #[tabled(rename = "Median $/sqft")]
    value_per_sqft: String,
    #[tabled(rename = "Sqft")]
    sqft: String,
}

impl From<&Affordability> for AffordRow {
    fn from(a: &Affordability) -> Self {
        AffordRow {
            name: a.name.clone(),
            value: format!("${:.0}", a.affordable_value),
            value_per_sqft: a
                .typical_value_per_sqft
                .map_or("-".to_string(), |v| format!("${:.0}", v)),
            sqft: a.affordable_sqft.map_or("-".to_string(), |v| format!("{:.0}", v)),
        }
    }
}

impl AffordCommand {
    pub fn exec(&self, registry: Arc<MunicipalityRegistry>) -> anyhow::Result<()> {
        let mut engine = ComparisonEngine::new(registry);
        if let Some(path) = &self.sales {
            engine.load_data(read_sales(path)?);
            engine.calculate_all_metrics(None)?;
        }

        let rows = engine.value_for_tax_analysis(self.budget);
        if self.json {
            return print_json(&rows);
        }

        println!();
        println!("WHAT ${:.0}/YEAR IN PROPERTY TAX BUYS", self.budget);
        println!();
        print_table(rows.iter().map(AffordRow::from));
        Ok(())
    }
}
