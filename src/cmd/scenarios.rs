//! Scenarios command - one hypothetical home taxed in every municipality with sales

use super::{key_filter, print_json, print_table, read_sales};
use clap::Args;
use proptax::core::{ComparisonEngine, MunicipalityRegistry, TaxScenario, REFERENCE_SQFT};
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::sync::Arc;
use tabled::Tabled;

#[derive(Args, Debug)]
pub struct ScenariosCommand {
    /// Sales CSV file. Reads from stdin if not specified.
    #[arg(default_value = "-")]
    file: PathBuf,

    /// Market value of the hypothetical home
    #[arg(short, long)]
    value: Decimal,

    /// Square footage of the hypothetical home
    #[arg(short, long, default_value_t = REFERENCE_SQFT)]
    sqft: Decimal,

    /// Municipality key to include, repeatable (default: all with sales)
    #[arg(short, long = "municipality")]
    municipalities: Vec<String>,

    /// Output as JSON instead of formatted table
    #[arg(long)]
    json: bool,
}

#[derive(Tabled)]
struct ScenarioRow {
    #[tabled(rename = "Municipality")]
    municipality: String,
    #[tabled(rename = "Annual Tax")]
    annual: String,
    #[tabled(rename = "Monthly")]
    monthly: String,
    #[tabled(rename = "Tax/sqft")]
    per_sqft: String,
    #[tabled(rename = "Eff. Rate")]
    rate: String,
    #[tabled(rename = "School %")]
    school: String,
}

impl From<&TaxScenario> for ScenarioRow {
    fn from(s: &TaxScenario) -> Self {
        ScenarioRow {
            municipality: s.municipality.clone(),
            annual: format!("${:.0}", s.annual_tax),
            monthly: format!("${:.0}", s.monthly_tax),
            per_sqft: format!("${:.2}", s.tax_per_sqft),
            rate: format!("{:.2}%", s.effective_rate),
            school: format!("{:.1}%", s.school_percentage),
        }
    }
}

impl ScenariosCommand {
    pub fn exec(&self, registry: Arc<MunicipalityRegistry>) -> anyhow::Result<()> {
        let mut engine = ComparisonEngine::new(registry);
        engine.load_data(read_sales(&self.file)?);
        let filter = key_filter(&self.municipalities);
        engine.calculate_all_metrics(filter.as_deref())?;

        let scenarios = engine.compare_tax_scenarios(self.value, self.sqft)?;
        if self.json {
            return print_json(&scenarios);
        }

        println!();
        println!(
            "TAX SCENARIOS (${:.0} home, {} sqft)",
            self.value, self.sqft
        );
        println!();
        if scenarios.is_empty() {
            println!("No municipalities with sales data");
        } else {
            print_table(scenarios.iter().map(ScenarioRow::from));
        }
        Ok(())
    }
}
