use super::descriptive::to_f64;
use super::metrics::{MetricsCalculator, MunicipalityMetrics};
use super::municipality::{ConfigError, MunicipalityRegistry, EASTCHESTER_AREA};
use super::sale::{SaleDataset, SaleRecord};
use super::tax::{TaxCalculator, REFERENCE_SQFT};
use chrono::{Local, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// A municipality whose median value is this far above the average gets its own insight
const PREMIUM_INSIGHT_THRESHOLD_PCT: f64 = 20.0;

pub const NO_DATA_INSIGHT: &str = "No valid sales data available";

/// Municipalities singled out for the area sub-comparison.
///
/// `premium` and each of `neighbors` are compared against `base`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AreaFocus {
    pub base: String,
    pub premium: String,
    pub neighbors: Vec<String>,
}

impl Default for AreaFocus {
    fn default() -> Self {
        AreaFocus {
            base: "eastchester_unincorp".to_string(),
            premium: "bronxville".to_string(),
            neighbors: vec!["tuckahoe".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ComparisonReport {
    pub generated_date: NaiveDate,
    pub municipalities_compared: Vec<String>,
    pub total_sales_analyzed: usize,
    pub metrics: BTreeMap<String, MunicipalityMetrics>,
    /// Highest median value per sqft first
    pub value_ranking: Vec<(String, f64)>,
    /// Lowest median tax per sqft first
    pub tax_ranking: Vec<(String, f64)>,
    /// Lowest efficiency ratio first, unknown ratios omitted
    pub efficiency_ranking: Vec<(String, f64)>,
    pub insights: Vec<String>,
    pub area_comparison: BTreeMap<String, String>,
}

impl ComparisonReport {
    fn no_data(generated_date: NaiveDate) -> Self {
        ComparisonReport {
            generated_date,
            municipalities_compared: Vec::new(),
            total_sales_analyzed: 0,
            metrics: BTreeMap::new(),
            value_ranking: Vec::new(),
            tax_ranking: Vec::new(),
            efficiency_ranking: Vec::new(),
            insights: vec![NO_DATA_INSIGHT.to_string()],
            area_comparison: BTreeMap::new(),
        }
    }

    pub fn summary(&self) -> String {
        let rule = "-".repeat(50);
        let mut lines = vec![
            "=".repeat(70),
            "WESTCHESTER PROPERTY TAX & VALUE COMPARISON REPORT".to_string(),
            format!("Generated: {}", self.generated_date),
            format!("Municipalities: {}", self.municipalities_compared.len()),
            format!("Total Sales Analyzed: {}", self.total_sales_analyzed),
            "=".repeat(70),
            String::new(),
            "VALUE PER SQFT RANKING (Highest to Lowest):".to_string(),
            rule.clone(),
        ];
        for (i, (muni, value)) in self.value_ranking.iter().enumerate() {
            lines.push(format!("  {}. {:<25} {}/sqft", i + 1, muni, dollars(*value, 0, false)));
        }

        lines.push(String::new());
        lines.push("TAX PER SQFT RANKING (Lowest to Highest):".to_string());
        lines.push(rule.clone());
        for (i, (muni, tax)) in self.tax_ranking.iter().enumerate() {
            lines.push(format!("  {}. {:<25} {}/sqft", i + 1, muni, dollars(*tax, 2, false)));
        }

        lines.push(String::new());
        lines.push("TAX EFFICIENCY RANKING (Best to Worst):".to_string());
        lines.push("(Lower ratio = more value for your tax dollar)".to_string());
        lines.push(rule.clone());
        for (i, (muni, ratio)) in self.efficiency_ranking.iter().enumerate() {
            lines.push(format!("  {}. {:<25} {:.2}", i + 1, muni, ratio));
        }

        if !self.insights.is_empty() {
            lines.push(String::new());
            lines.push("KEY INSIGHTS:".to_string());
            lines.push(rule.clone());
            for insight in &self.insights {
                lines.push(format!("  * {}", insight));
            }
        }

        if !self.area_comparison.is_empty() {
            lines.push(String::new());
            lines.push("AREA ANALYSIS:".to_string());
            lines.push(rule);
            for (key, value) in &self.area_comparison {
                lines.push(format!("  {}: {}", key, value));
            }
        }

        lines.join("\n")
    }
}

impl std::fmt::Display for ComparisonReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.summary())
    }
}

/// Taxes on one hypothetical home in one municipality
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaxScenario {
    pub municipality: String,
    pub annual_tax: Decimal,
    pub monthly_tax: Decimal,
    pub tax_per_sqft: Decimal,
    pub effective_rate: Decimal,
    pub school_percentage: Decimal,
}

/// Home value a tax budget buys in one municipality
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Affordability {
    pub municipality: String,
    pub name: String,
    pub affordable_value: Decimal,
    /// Median $/sqft from loaded sales, when metrics are cached
    pub typical_value_per_sqft: Option<f64>,
    pub affordable_sqft: Option<f64>,
}

/// Cross-municipality comparisons over a loaded set of sales.
///
/// Metrics are memoised per municipality until the next [`load_data`].
///
/// [`load_data`]: ComparisonEngine::load_data
#[derive(Debug)]
pub struct ComparisonEngine {
    tax_calc: TaxCalculator,
    metrics_calc: MetricsCalculator,
    focus: AreaFocus,
    sales: Vec<SaleRecord>,
    cache: BTreeMap<String, MunicipalityMetrics>,
}

impl ComparisonEngine {
    pub fn new(registry: Arc<MunicipalityRegistry>) -> Self {
        let tax_calc = TaxCalculator::new(registry);
        ComparisonEngine {
            metrics_calc: MetricsCalculator::new(tax_calc.clone()),
            tax_calc,
            focus: AreaFocus::default(),
            sales: Vec::new(),
            cache: BTreeMap::new(),
        }
    }

    pub fn with_focus(mut self, focus: AreaFocus) -> Self {
        self.focus = focus;
        self
    }

    pub fn tax_calculator(&self) -> &TaxCalculator {
        &self.tax_calc
    }

    pub fn metrics_calculator(&self) -> &MetricsCalculator {
        &self.metrics_calc
    }

    pub fn sales(&self) -> &[SaleRecord] {
        &self.sales
    }

    /// Replace the loaded sales, discarding every cached metric
    pub fn load_data(&mut self, sales: Vec<SaleRecord>) {
        log::info!("Loaded {} sales records", sales.len());
        self.sales = sales;
        self.cache.clear();
    }

    pub fn load_dataset(&mut self, dataset: SaleDataset) {
        self.load_data(dataset.into_records())
    }

    /// Keys with cached metrics, in key order
    pub fn cached_municipalities(&self) -> impl Iterator<Item = &str> {
        self.cache.keys().map(String::as_str)
    }

    pub fn get_metrics(&mut self, municipality: &str) -> Result<&MunicipalityMetrics, ConfigError> {
        match self.cache.entry(municipality.to_string()) {
            Entry::Occupied(entry) => {
                log::debug!("metrics cache hit: {}", municipality);
                Ok(entry.into_mut())
            }
            Entry::Vacant(entry) => {
                log::debug!("metrics cache miss: {}", municipality);
                let metrics = self
                    .metrics_calc
                    .calculate_municipality_metrics(&self.sales, municipality)?;
                Ok(entry.insert(metrics))
            }
        }
    }

    /// Metrics for the given municipalities, or for every municipality
    /// present in the loaded sales
    pub fn calculate_all_metrics(
        &mut self,
        municipalities: Option<&[&str]>,
    ) -> Result<BTreeMap<String, MunicipalityMetrics>, ConfigError> {
        let keys: Vec<String> = match municipalities {
            Some(keys) => keys.iter().map(|k| k.to_string()).collect(),
            None => self
                .sales
                .iter()
                .map(SaleRecord::municipality)
                .collect::<BTreeSet<_>>()
                .into_iter()
                .map(str::to_string)
                .collect(),
        };

        let mut all = BTreeMap::new();
        for key in keys {
            let metrics = self.get_metrics(&key)?.clone();
            all.insert(key, metrics);
        }
        Ok(all)
    }

    /// Full comparison of the requested municipalities (default: all with sales).
    ///
    /// Municipalities without sales are dropped before ranking. If none
    /// remain the report is empty apart from a single no-data insight.
    pub fn generate_full_report(
        &mut self,
        municipalities: Option<&[&str]>,
    ) -> Result<ComparisonReport, ConfigError> {
        let generated_date = Local::now().date_naive();
        let metrics: BTreeMap<String, MunicipalityMetrics> = self
            .calculate_all_metrics(municipalities)?
            .into_iter()
            .filter(|(_, m)| m.has_data())
            .collect();

        if metrics.is_empty() {
            log::debug!("no municipality has sales, returning empty report");
            return Ok(ComparisonReport::no_data(generated_date));
        }

        let mut value_ranking: Vec<(String, f64)> = metrics
            .iter()
            .map(|(k, m)| (k.clone(), m.value_per_sqft_median))
            .collect();
        value_ranking.sort_by(|a, b| b.1.total_cmp(&a.1));

        let mut tax_ranking: Vec<(String, f64)> = metrics
            .iter()
            .map(|(k, m)| (k.clone(), m.tax_per_sqft_median))
            .collect();
        tax_ranking.sort_by(|a, b| a.1.total_cmp(&b.1));

        let efficiency_ranking = self.metrics_calc.rank_by_tax_efficiency(&metrics);

        let insights = self.insights(&metrics, &value_ranking, &tax_ranking, &efficiency_ranking);
        let area_comparison = self.area_comparison(&metrics);

        Ok(ComparisonReport {
            generated_date,
            municipalities_compared: metrics.keys().cloned().collect(),
            total_sales_analyzed: metrics.values().map(|m| m.sample_size).sum(),
            metrics,
            value_ranking,
            tax_ranking,
            efficiency_ranking,
            insights,
            area_comparison,
        })
    }

    fn insights(
        &self,
        metrics: &BTreeMap<String, MunicipalityMetrics>,
        value_ranking: &[(String, f64)],
        tax_ranking: &[(String, f64)],
        efficiency_ranking: &[(String, f64)],
    ) -> Vec<String> {
        let mut insights = Vec::new();

        let (Some(highest), Some(lowest)) = (value_ranking.first(), value_ranking.last()) else {
            return vec!["Insufficient data for insights".to_string()];
        };
        insights.push(format!(
            "{} has the highest home values at {}/sqft, while {} is lowest at {}/sqft",
            highest.0,
            dollars(highest.1, 0, false),
            lowest.0,
            dollars(lowest.1, 0, false)
        ));

        if value_ranking.len() >= 2 && lowest.1 > 0.0 {
            let premium = (highest.1 / lowest.1 - 1.0) * 100.0;
            insights.push(format!(
                "Premium of {:.0}% between highest and lowest value municipalities",
                premium
            ));
        }

        if let (Some(best), Some(worst)) = (efficiency_ranking.first(), efficiency_ranking.last()) {
            insights.push(format!(
                "{} offers best tax efficiency ({:.1} tax/value ratio), while {} is least efficient ({:.1})",
                best.0, best.1, worst.0, worst.1
            ));
        }

        if let (Some(lowest_tax), Some(highest_tax)) = (tax_ranking.first(), tax_ranking.last()) {
            if highest_tax.1 > 0.0 && lowest_tax.1 > 0.0 {
                let difference = highest_tax.1 - lowest_tax.1;
                let annual = difference * to_f64(REFERENCE_SQFT);
                insights.push(format!(
                    "Tax difference: {}/sqft between {} and {}. For a 2,000 sqft home, that's {}/year",
                    dollars(difference, 2, false),
                    highest_tax.0,
                    lowest_tax.0,
                    dollars(annual, 0, false)
                ));
            }
        }

        if let Some(premium) = metrics.get(&self.focus.premium).filter(|m| m.has_data()) {
            let average = metrics.values().map(|m| m.value_per_sqft_median).sum::<f64>()
                / metrics.len() as f64;
            if average > 0.0 {
                let premium_pct = (premium.value_per_sqft_median / average - 1.0) * 100.0;
                if premium_pct > PREMIUM_INSIGHT_THRESHOLD_PCT {
                    insights.push(format!(
                        "{} commands a {:.0}% premium over area average, likely due to its highly-rated school district",
                        self.display_name(&self.focus.premium),
                        premium_pct
                    ));
                }
            }
        }

        insights
    }

    fn area_comparison(
        &self,
        metrics: &BTreeMap<String, MunicipalityMetrics>,
    ) -> BTreeMap<String, String> {
        let mut analysis = BTreeMap::new();
        let with_data = |key: &str| metrics.get(key).filter(|m| m.has_data());

        let Some(base) = with_data(self.focus.base.as_str()) else {
            return analysis;
        };
        let base_name = self.display_name(&self.focus.base);

        if let Some(premium) = with_data(self.focus.premium.as_str()) {
            let premium_name = self.display_name(&self.focus.premium);
            let value_premium = premium.value_per_sqft_median - base.value_per_sqft_median;
            let value_premium_pct = if base.value_per_sqft_median > 0.0 {
                (premium.value_per_sqft_median / base.value_per_sqft_median - 1.0) * 100.0
            } else {
                0.0
            };
            analysis.insert(
                format!("{} Premium vs {}", premium_name, base_name),
                format!(
                    "{}/sqft ({:.0}%)",
                    dollars(value_premium, 0, false),
                    value_premium_pct
                ),
            );

            if premium.tax_per_sqft_median > 0.0 && base.tax_per_sqft_median > 0.0 {
                let tax_diff = premium.tax_per_sqft_median - base.tax_per_sqft_median;
                analysis.insert(
                    format!("Tax Difference ({} - {})", premium_name, base_name),
                    format!("{}/sqft/year", dollars(tax_diff, 2, false)),
                );
            }

            // same county and town levies, so the gap is mostly schools and village services
            analysis.insert(
                "Estimated School District Premium".to_string(),
                format!("~{}/sqft", dollars(value_premium, 0, false)),
            );
        }

        for neighbor in &self.focus.neighbors {
            if let Some(m) = with_data(neighbor.as_str()) {
                let diff = m.value_per_sqft_median - base.value_per_sqft_median;
                analysis.insert(
                    format!("{} vs {} Value", self.display_name(neighbor), base_name),
                    format!("{}/sqft", dollars(diff, 0, true)),
                );
            }
        }

        analysis
    }

    fn display_name(&self, key: &str) -> String {
        self.tax_calc
            .get_municipality(key)
            .map(|m| m.name.clone())
            .unwrap_or_else(|_| key.to_string())
    }

    /// Taxes on a hypothetical home in every municipality with cached
    /// metrics, lowest annual tax first
    pub fn compare_tax_scenarios(
        &self,
        market_value: Decimal,
        sqft: Decimal,
    ) -> Result<Vec<TaxScenario>, ConfigError> {
        let mut scenarios = Vec::new();
        for key in self.cache.keys() {
            let breakdown = self.tax_calc.calculate_from_market_value(market_value, key)?;
            let annual_tax = breakdown.total();
            scenarios.push(TaxScenario {
                municipality: key.clone(),
                annual_tax,
                monthly_tax: annual_tax / dec!(12),
                tax_per_sqft: if sqft > Decimal::ZERO {
                    annual_tax / sqft
                } else {
                    Decimal::ZERO
                },
                effective_rate: breakdown.effective_rate(),
                school_percentage: breakdown.school_percentage(),
            });
        }
        scenarios.sort_by_key(|s| s.annual_tax);
        Ok(scenarios)
    }

    /// Market value an annual tax budget buys in each registered municipality,
    /// highest first. Municipalities without any tax rate are skipped.
    pub fn value_for_tax_analysis(&self, annual_tax_budget: Decimal) -> Vec<Affordability> {
        let mut rows: Vec<Affordability> = self
            .tax_calc
            .registry()
            .iter()
            .filter_map(|muni| {
                let total_rate = muni.tax_rates.total();
                let divisor = muni.assessment_ratio * total_rate;
                if total_rate.is_zero() || divisor.is_zero() {
                    return None;
                }
                let affordable_value = annual_tax_budget * dec!(1000) / divisor;

                let typical = self.cache.get(&muni.key).map(|m| m.value_per_sqft_median);
                let affordable_sqft = typical
                    .filter(|v| *v > 0.0)
                    .map(|v| to_f64(affordable_value) / v);

                Some(Affordability {
                    municipality: muni.key.clone(),
                    name: muni.name.clone(),
                    affordable_value,
                    typical_value_per_sqft: typical,
                    affordable_sqft,
                })
            })
            .collect();
        rows.sort_by(|a, b| b.affordable_value.cmp(&a.affordable_value));
        rows
    }

    /// Average median $/sqft over cached municipalities with sales, weighted
    /// by population. Municipalities without a population are left out.
    pub fn population_weighted_value_per_sqft(&self) -> Option<f64> {
        let mut weighted = 0.0;
        let mut total_population = 0.0;
        for (key, metrics) in self.cache.iter().filter(|(_, m)| m.has_data()) {
            let population = self
                .tax_calc
                .get_municipality(key)
                .ok()
                .and_then(|m| m.population);
            if let Some(population) = population {
                weighted += metrics.value_per_sqft_median * f64::from(population);
                total_population += f64::from(population);
            }
        }
        if total_population > 0.0 {
            Some(weighted / total_population)
        } else {
            None
        }
    }
}

/// Dollar amount with thousands separators, e.g. `$16,000` or `$+1,250.50`
fn dollars(amount: f64, decimals: usize, signed: bool) -> String {
    let text = format!("{:.*}", decimals, amount.abs());
    let (whole, fraction) = match text.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (text.as_str(), None),
    };
    let mut grouped = String::with_capacity(text.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    if let Some(fraction) = fraction {
        grouped.push('.');
        grouped.push_str(fraction);
    }
    let sign = if amount < 0.0 {
        "-"
    } else if signed {
        "+"
    } else {
        ""
    };
    format!("${}{}", sign, grouped)
}

/// Load sales into a fresh engine over `registry` and build the full report
pub fn quick_compare(
    registry: Arc<MunicipalityRegistry>,
    sales: Vec<SaleRecord>,
    municipalities: Option<&[&str]>,
) -> Result<ComparisonReport, ConfigError> {
    let mut engine = ComparisonEngine::new(registry);
    engine.load_data(sales);
    engine.generate_full_report(municipalities)
}

/// Full report restricted to the Eastchester area
pub fn compare_eastchester_area(
    registry: Arc<MunicipalityRegistry>,
    sales: Vec<SaleRecord>,
) -> Result<ComparisonReport, ConfigError> {
    quick_compare(registry, sales, Some(EASTCHESTER_AREA))
}
