//! Report command - cross-municipality comparison from a sales CSV

use super::{key_filter, print_json, print_table, read_sales};
use clap::Args;
use proptax::core::{
    AreaFocus, ComparisonEngine, ComparisonReport, MunicipalityMetrics, MunicipalityRegistry,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tabled::Tabled;

#[derive(Args, Debug)]
pub struct ReportCommand {
    /// Sales CSV file. Reads from stdin if not specified.
    #[arg(default_value = "-")]
    file: PathBuf,

    /// Municipality key to include, repeatable (default: all with sales)
    #[arg(short, long = "municipality")]
    municipalities: Vec<String>,

    /// Municipality the area comparison is measured against
    #[arg(long, default_value = "eastchester_unincorp")]
    base: String,

    /// Premium municipality for the area comparison
    #[arg(long, default_value = "bronxville")]
    premium: String,

    /// Neighbouring municipality for the area comparison, repeatable
    #[arg(long = "neighbor", default_values_t = vec!["tuckahoe".to_string()])]
    neighbors: Vec<String>,

    /// Show full metrics for each municipality
    #[arg(short, long)]
    detailed: bool,

    /// Output as JSON instead of formatted text
    #[arg(long)]
    json: bool,
}

#[derive(Tabled)]
struct MetricsRow {
    #[tabled(rename = "Municipality")]
    municipality: String,
    #[tabled(rename = "Sales")]
    sales: usize,
    #[tabled(rename = "Median $/sqft")]
    value_per_sqft: String,
    #[tabled(rename = "Range")]
    range: String,
    #[tabled(rename = "Median Tax/sqft")]
    tax_per_sqft: String,
    #[tabled(rename = "Eff. Rate")]
    effective_rate: String,
    #[tabled(rename = "Efficiency")]
    efficiency: String,
    #[tabled(rename = "Taxes")]
    tax_source: String,
}

impl From<&MunicipalityMetrics> for MetricsRow {
    fn from(m: &MunicipalityMetrics) -> Self {
        MetricsRow {
            municipality: m.municipality.clone(),
            sales: m.sample_size,
            value_per_sqft: format!("${:.0}", m.value_per_sqft_median),
            range: m.value_range(),
            tax_per_sqft: format!("${:.2}", m.tax_per_sqft_median),
            effective_rate: format!("{:.2}%", m.effective_rate_median),
            efficiency: format!("{:.2}", m.tax_efficiency_ratio),
            tax_source: format!("{:?}", m.tax_source),
        }
    }
}

#[derive(Serialize)]
struct ReportOutput<'a> {
    #[serde(flatten)]
    report: &'a ComparisonReport,
    population_weighted_value_per_sqft: Option<f64>,
}

impl ReportCommand {
    pub fn exec(&self, registry: Arc<MunicipalityRegistry>) -> anyhow::Result<()> {
        let sales = read_sales(&self.file)?;
        let focus = AreaFocus {
            base: self.base.clone(),
            premium: self.premium.clone(),
            neighbors: self.neighbors.clone(),
        };

        let mut engine = ComparisonEngine::new(registry).with_focus(focus);
        engine.load_data(sales);
        let filter = key_filter(&self.municipalities);
        let report = engine.generate_full_report(filter.as_deref())?;
        let weighted = engine.population_weighted_value_per_sqft();

        if self.json {
            return print_json(&ReportOutput {
                report: &report,
                population_weighted_value_per_sqft: weighted,
            });
        }

        if !report.metrics.is_empty() {
            println!();
            print_table(report.metrics.values().map(MetricsRow::from));
        }
        println!();
        println!("{}", report);

        if let Some(weighted) = weighted {
            println!();
            println!("Population-weighted median value: ${:.0}/sqft", weighted);
        }

        if self.detailed {
            for metrics in report.metrics.values() {
                println!();
                println!("{}", metrics);
            }
        }
        Ok(())
    }
}
