//! Tax command - itemised bills for one home value across municipalities

use super::{print_json, print_table};
use clap::Args;
use proptax::core::{
    MunicipalityRegistry, StarExemption, TaxBreakdown, TaxBreakdownRecord, TaxCalculator,
};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tabled::Tabled;

#[derive(Args, Debug)]
pub struct TaxCommand {
    /// Market value of the home (assessed value with --assessed)
    value: Decimal,

    /// Municipality key to include, repeatable (default: all)
    #[arg(short, long = "municipality")]
    municipalities: Vec<String>,

    /// Treat VALUE as an assessed value from a tax bill
    #[arg(long)]
    assessed: bool,

    /// Include Basic STAR exemption savings
    #[arg(long)]
    star: bool,

    /// Output as JSON instead of formatted table
    #[arg(long)]
    json: bool,
}

#[derive(Tabled)]
struct TaxRow {
    #[tabled(rename = "Municipality")]
    municipality: String,
    #[tabled(rename = "Assessed")]
    assessed: String,
    #[tabled(rename = "County")]
    county: String,
    #[tabled(rename = "Town")]
    town: String,
    #[tabled(rename = "Village")]
    village: String,
    #[tabled(rename = "School")]
    school: String,
    #[tabled(rename = "Fire")]
    fire: String,
    #[tabled(rename = "Library")]
    library: String,
    #[tabled(rename = "Special")]
    special: String,
    #[tabled(rename = "Total")]
    total: String,
    #[tabled(rename = "Monthly")]
    monthly: String,
    #[tabled(rename = "Rate")]
    rate: String,
    #[tabled(rename = "STAR")]
    star: String,
}

impl TaxRow {
    fn new(breakdown: &TaxBreakdown, star: Option<&StarExemption>) -> Self {
        TaxRow {
            municipality: breakdown.municipality.clone(),
            assessed: format!("${:.0}", breakdown.assessed_value),
            county: format!("${:.0}", breakdown.county_tax),
            town: format!("${:.0}", breakdown.town_tax),
            village: format!("${:.0}", breakdown.village_tax),
            school: format!("${:.0}", breakdown.school_tax),
            fire: format!("${:.0}", breakdown.fire_district_tax),
            library: format!("${:.0}", breakdown.library_tax),
            special: format!("${:.0}", breakdown.special_district_tax),
            total: format!("${:.0}", breakdown.total()),
            monthly: format!("${:.0}", breakdown.total() / Decimal::from(12)),
            rate: format!("{:.2}%", breakdown.effective_rate()),
            star: star.map_or("-".to_string(), |s| format!("${:.0}", s.school_tax_savings)),
        }
    }
}

#[derive(Serialize)]
struct TaxEntry {
    key: String,
    #[serde(flatten)]
    breakdown: TaxBreakdownRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    star: Option<StarExemption>,
}

#[derive(Serialize)]
struct TaxOutput {
    value: Decimal,
    assessed: bool,
    lowest: Option<String>,
    municipalities: Vec<TaxEntry>,
}

impl TaxCommand {
    pub fn exec(&self, registry: Arc<MunicipalityRegistry>) -> anyhow::Result<()> {
        let calc = TaxCalculator::new(registry);
        let keys: Vec<String> = if self.municipalities.is_empty() {
            calc.registry().keys().map(str::to_string).collect()
        } else {
            self.municipalities.clone()
        };

        let mut bills = Vec::new();
        for key in &keys {
            let breakdown = if self.assessed {
                calc.calculate_from_assessed_value(self.value, key)?
            } else {
                calc.calculate_from_market_value(self.value, key)?
            };
            let star = if self.star {
                Some(calc.basic_star_exemption(key)?)
            } else {
                None
            };
            bills.push((key.clone(), breakdown, star));
        }

        let lowest = if self.assessed {
            // min_by_key keeps the first of equal totals
            bills
                .iter()
                .min_by_key(|(_, breakdown, _)| breakdown.total())
                .map(|(key, _, _)| key.clone())
        } else {
            let key_refs: Vec<&str> = keys.iter().map(String::as_str).collect();
            calc.find_lowest_tax(self.value, Some(&key_refs))?
                .map(|(key, _)| key)
        };

        if self.json {
            let output = TaxOutput {
                value: self.value,
                assessed: self.assessed,
                lowest,
                municipalities: bills
                    .into_iter()
                    .map(|(key, breakdown, star)| TaxEntry {
                        key,
                        breakdown: breakdown.record(),
                        star,
                    })
                    .collect(),
            };
            return print_json(&output);
        }

        let kind = if self.assessed { "assessed" } else { "market" };
        println!();
        println!("PROPERTY TAX ({} value ${:.0})", kind, self.value);
        println!();
        print_table(bills.iter().map(|(_, b, s)| TaxRow::new(b, s.as_ref())));

        if let Some((_, breakdown, _)) = lowest
            .as_ref()
            .and_then(|key| bills.iter().find(|(k, _, _)| k == key))
        {
            println!();
            println!("Lowest: {} (${:.0}/year)", breakdown.municipality, breakdown.total());
        }

        if bills.len() == 1 && !self.assessed {
            let impact = calc.tax_impact_analysis(self.value, &bills[0].0)?;
            println!(
                "vs average of all municipalities: ${:+.0} ({:+.1}%)",
                impact.vs_average, impact.vs_average_pct
            );
            println!("Tax per sqft (2000 sqft home): ${:.2}", impact.per_sqft_2000);
        }
        Ok(())
    }
}
