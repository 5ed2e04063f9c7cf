use super::descriptive::{self, to_f64};
use super::municipality::ConfigError;
use super::sale::SaleRecord;
use super::tax::TaxCalculator;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Where the tax figures in a [`MunicipalityMetrics`] came from
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxSource {
    /// No sales, so no tax figures
    #[default]
    None,
    /// Taxes actually paid, from records with positive `annual_taxes`
    Measured,
    /// Modelled with the tax calculator because no record carried taxes
    Estimated,
}

/// Aggregate statistics for one municipality over a set of sales.
///
/// All numeric fields are 0 when `sample_size` is 0.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct MunicipalityMetrics {
    pub municipality: String,
    pub sample_size: usize,

    pub value_per_sqft_mean: f64,
    pub value_per_sqft_median: f64,
    pub value_per_sqft_std: f64,
    pub value_per_sqft_min: f64,
    pub value_per_sqft_max: f64,

    pub tax_per_sqft_mean: f64,
    pub tax_per_sqft_median: f64,
    pub tax_per_sqft_std: f64,

    pub effective_rate_mean: f64,
    pub effective_rate_median: f64,

    pub sale_price_mean: f64,
    pub sale_price_median: f64,
    pub sqft_mean: f64,
    pub sqft_median: f64,

    /// Tax dollars per $1,000 of value per sqft, lower is better value
    pub tax_efficiency_ratio: f64,
    pub tax_source: TaxSource,
}

impl MunicipalityMetrics {
    pub fn empty(municipality: &str) -> Self {
        MunicipalityMetrics {
            municipality: municipality.to_string(),
            ..Default::default()
        }
    }

    pub fn has_data(&self) -> bool {
        self.sample_size > 0
    }

    pub fn value_range(&self) -> String {
        format!(
            "${:.0} - ${:.0}/sqft",
            self.value_per_sqft_min, self.value_per_sqft_max
        )
    }

    /// Monthly tax on a median-priced home at the median effective rate
    pub fn monthly_tax_typical(&self) -> f64 {
        self.sale_price_median * self.effective_rate_median / 100.0 / 12.0
    }
}

impl std::fmt::Display for MunicipalityMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Municipality Metrics: {}", self.municipality)?;
        writeln!(f, "{}", "=".repeat(50))?;
        writeln!(f, "Sample Size: {} sales", self.sample_size)?;
        writeln!(f)?;
        writeln!(f, "VALUE PER SQFT:")?;
        writeln!(f, "  Mean:    ${:.0}", self.value_per_sqft_mean)?;
        writeln!(f, "  Median:  ${:.0}", self.value_per_sqft_median)?;
        writeln!(f, "  Range:   {}", self.value_range())?;
        writeln!(f, "  Std Dev: ${:.0}", self.value_per_sqft_std)?;
        writeln!(f)?;
        writeln!(f, "TAX PER SQFT ({:?}):", self.tax_source)?;
        writeln!(f, "  Mean:    ${:.2}", self.tax_per_sqft_mean)?;
        writeln!(f, "  Median:  ${:.2}", self.tax_per_sqft_median)?;
        writeln!(f)?;
        writeln!(f, "EFFECTIVE TAX RATE:")?;
        writeln!(f, "  Mean:    {:.2}%", self.effective_rate_mean)?;
        writeln!(f, "  Median:  {:.2}%", self.effective_rate_median)?;
        writeln!(f)?;
        writeln!(f, "SALE PRICES:")?;
        writeln!(f, "  Mean:    ${:.0}", self.sale_price_mean)?;
        writeln!(f, "  Median:  ${:.0}", self.sale_price_median)?;
        writeln!(f)?;
        writeln!(f, "TAX EFFICIENCY:")?;
        writeln!(f, "  Ratio: {:.2} (lower is better)", self.tax_efficiency_ratio)?;
        write!(f, "  Typical Monthly Tax: ${:.0}", self.monthly_tax_typical())
    }
}

/// Modelled tax figures for a single sale
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropertyMetrics {
    pub municipality: String,
    pub address: String,
    pub market_value: Decimal,
    pub sqft: Decimal,
    pub value_per_sqft: Decimal,
    pub total_annual_tax: Decimal,
    pub tax_per_sqft: Decimal,
    pub effective_tax_rate: Decimal,
    pub county_tax: Decimal,
    pub town_tax: Decimal,
    pub village_tax: Decimal,
    pub school_tax: Decimal,
    /// Fire, library and special district levies
    pub other_tax: Decimal,
}

impl PropertyMetrics {
    pub fn tax_efficiency_ratio(&self) -> Decimal {
        if self.value_per_sqft.is_zero() {
            return Decimal::ZERO;
        }
        self.tax_per_sqft / self.value_per_sqft * dec!(1000)
    }

    pub fn school_tax_percentage(&self) -> Decimal {
        if self.total_annual_tax.is_zero() {
            return Decimal::ZERO;
        }
        self.school_tax / self.total_annual_tax * dec!(100)
    }
}

/// Relationship between value and tax burden across municipalities
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueTaxAnalysis {
    /// Pearson correlation of median value/sqft against median tax/sqft
    pub correlation: Option<f64>,
    pub interpretation: String,
    /// Highest value per tax dollar
    pub best_value_municipality: Option<String>,
    pub best_value_ratio: f64,
    pub average_value_per_sqft: f64,
    pub municipalities_above_average: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct MetricsCalculator {
    tax_calc: TaxCalculator,
}

impl MetricsCalculator {
    pub fn new(tax_calc: TaxCalculator) -> Self {
        MetricsCalculator { tax_calc }
    }

    pub fn tax_calculator(&self) -> &TaxCalculator {
        &self.tax_calc
    }

    /// Aggregate the sales whose municipality exactly matches `municipality`.
    ///
    /// Uses taxes actually paid when at least one sale has positive taxes,
    /// otherwise estimates every sale's taxes from its price. Only the
    /// estimation path consults the registry, so an unknown key fails only
    /// when estimation is needed.
    pub fn calculate_municipality_metrics(
        &self,
        records: &[SaleRecord],
        municipality: &str,
    ) -> Result<MunicipalityMetrics, ConfigError> {
        let filtered: Vec<&SaleRecord> = records
            .iter()
            .filter(|r| r.municipality() == municipality)
            .collect();

        if filtered.is_empty() {
            log::debug!("{}: no sales", municipality);
            return Ok(MunicipalityMetrics::empty(municipality));
        }

        let values_per_sqft: Vec<f64> =
            filtered.iter().map(|r| to_f64(r.price_per_sqft())).collect();
        let prices: Vec<f64> = filtered.iter().map(|r| to_f64(r.sale_price())).collect();
        let sqfts: Vec<f64> = filtered.iter().map(|r| to_f64(r.sqft())).collect();

        let mut taxes_per_sqft = Vec::new();
        let mut effective_rates = Vec::new();
        for r in filtered.iter().filter(|r| r.has_taxes()) {
            taxes_per_sqft.push(to_f64(r.tax_per_sqft()));
            effective_rates.push(to_f64(r.effective_tax_rate()));
        }

        let tax_source = if taxes_per_sqft.is_empty() {
            log::warn!(
                "{}: no recorded taxes in {} sales, estimating from sale prices",
                municipality,
                filtered.len()
            );
            for r in &filtered {
                let breakdown = self
                    .tax_calc
                    .calculate_from_market_value(r.sale_price(), municipality)?;
                taxes_per_sqft.push(to_f64(breakdown.total()) / to_f64(r.sqft()));
                effective_rates.push(to_f64(breakdown.effective_rate()));
            }
            TaxSource::Estimated
        } else {
            TaxSource::Measured
        };

        let value_per_sqft_median = descriptive::median(&values_per_sqft);
        let tax_per_sqft_median = descriptive::median(&taxes_per_sqft);
        let tax_efficiency_ratio = if value_per_sqft_median > 0.0 {
            tax_per_sqft_median / value_per_sqft_median * 1000.0
        } else {
            0.0
        };

        log::debug!(
            "{}: {} sales, median ${:.0}/sqft, median tax ${:.2}/sqft ({:?})",
            municipality,
            filtered.len(),
            value_per_sqft_median,
            tax_per_sqft_median,
            tax_source
        );

        Ok(MunicipalityMetrics {
            municipality: municipality.to_string(),
            sample_size: filtered.len(),
            value_per_sqft_mean: descriptive::mean(&values_per_sqft),
            value_per_sqft_median,
            value_per_sqft_std: descriptive::sample_std(&values_per_sqft),
            value_per_sqft_min: descriptive::min(&values_per_sqft),
            value_per_sqft_max: descriptive::max(&values_per_sqft),
            tax_per_sqft_mean: descriptive::mean(&taxes_per_sqft),
            tax_per_sqft_median,
            tax_per_sqft_std: descriptive::sample_std(&taxes_per_sqft),
            effective_rate_mean: descriptive::mean(&effective_rates),
            effective_rate_median: descriptive::median(&effective_rates),
            sale_price_mean: descriptive::mean(&prices),
            sale_price_median: descriptive::median(&prices),
            sqft_mean: descriptive::mean(&sqfts),
            sqft_median: descriptive::median(&sqfts),
            tax_efficiency_ratio,
            tax_source,
        })
    }

    /// Metrics for each requested municipality.
    ///
    /// `None` uses the distinct municipalities present in `records`, so
    /// municipalities without sales only appear when asked for.
    pub fn calculate_all_metrics(
        &self,
        records: &[SaleRecord],
        municipalities: Option<&[&str]>,
    ) -> Result<BTreeMap<String, MunicipalityMetrics>, ConfigError> {
        let keys: BTreeSet<&str> = match municipalities {
            Some(keys) => keys.iter().copied().collect(),
            None => records.iter().map(SaleRecord::municipality).collect(),
        };

        let mut all = BTreeMap::new();
        for key in keys {
            let metrics = self.calculate_municipality_metrics(records, key)?;
            all.insert(key.to_string(), metrics);
        }
        Ok(all)
    }

    /// Municipalities with a known efficiency ratio, best (lowest) first
    pub fn rank_by_tax_efficiency(
        &self,
        metrics: &BTreeMap<String, MunicipalityMetrics>,
    ) -> Vec<(String, f64)> {
        let mut rankings: Vec<(String, f64)> = metrics
            .iter()
            .filter(|(_, m)| m.tax_efficiency_ratio > 0.0)
            .map(|(key, m)| (key.clone(), m.tax_efficiency_ratio))
            .collect();
        rankings.sort_by(|a, b| a.1.total_cmp(&b.1));
        rankings
    }

    /// Relationship between value and tax burden. `None` with fewer than two
    /// municipalities holding sales.
    pub fn value_vs_tax_analysis(
        &self,
        metrics: &BTreeMap<String, MunicipalityMetrics>,
    ) -> Option<ValueTaxAnalysis> {
        let with_data: Vec<(&String, &MunicipalityMetrics)> =
            metrics.iter().filter(|(_, m)| m.has_data()).collect();
        if with_data.len() < 2 {
            return None;
        }

        let values: Vec<f64> = with_data.iter().map(|(_, m)| m.value_per_sqft_median).collect();
        let taxes: Vec<f64> = with_data.iter().map(|(_, m)| m.tax_per_sqft_median).collect();
        let correlation = descriptive::pearson(&values, &taxes);

        let interpretation = match correlation {
            Some(r) if r > 0.0 => {
                "Positive correlation means higher-value areas have higher taxes per sqft"
            }
            Some(_) => "Negative correlation means higher-value areas have lower taxes per sqft",
            None => "Correlation undefined: values or taxes do not vary",
        }
        .to_string();

        let value_per_tax: Vec<f64> = values
            .iter()
            .zip(&taxes)
            .map(|(v, t)| if *t > 0.0 { v / t } else { f64::NEG_INFINITY })
            .collect();
        let best = descriptive::argmax(&value_per_tax).filter(|i| value_per_tax[*i].is_finite());

        let average_value_per_sqft = descriptive::mean(&values);
        let municipalities_above_average = with_data
            .iter()
            .filter(|(_, m)| m.value_per_sqft_median > average_value_per_sqft)
            .map(|(key, _)| (*key).clone())
            .collect();

        Some(ValueTaxAnalysis {
            correlation,
            interpretation,
            best_value_municipality: best.map(|i| with_data[i].0.clone()),
            best_value_ratio: best.map(|i| value_per_tax[i]).unwrap_or(0.0),
            average_value_per_sqft,
            municipalities_above_average,
        })
    }

    /// Modelled tax breakdown for a single sale at its sale price
    pub fn property_metrics(&self, sale: &SaleRecord) -> Result<PropertyMetrics, ConfigError> {
        let breakdown = self
            .tax_calc
            .calculate_from_market_value(sale.sale_price(), sale.municipality())?;
        let total = breakdown.total();

        Ok(PropertyMetrics {
            municipality: sale.municipality().to_string(),
            address: sale.address().to_string(),
            market_value: sale.sale_price(),
            sqft: sale.sqft(),
            value_per_sqft: sale.price_per_sqft(),
            total_annual_tax: total,
            tax_per_sqft: total / sale.sqft(),
            effective_tax_rate: breakdown.effective_rate(),
            county_tax: breakdown.county_tax,
            town_tax: breakdown.town_tax,
            village_tax: breakdown.village_tax,
            school_tax: breakdown.school_tax,
            other_tax: breakdown.fire_district_tax
                + breakdown.library_tax
                + breakdown.special_district_tax,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::municipality::MunicipalityRegistry;
    use crate::core::sale::tests::sale;
    use proptest::prelude::*;
    use std::sync::Arc;

    pub(crate) fn calculator() -> MetricsCalculator {
        MetricsCalculator::new(TaxCalculator::new(Arc::new(
            MunicipalityRegistry::westchester(),
        )))
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn three_sales_median_mean_std() {
        let records = vec![
            sale("x", dec!(1000), dec!(100000), dec!(2000)),
            sale("x", dec!(1000), dec!(200000), dec!(4000)),
            sale("x", dec!(1000), dec!(300000), dec!(6000)),
            sale("y", dec!(1000), dec!(900000), dec!(1000)),
        ];
        let m = calculator().calculate_municipality_metrics(&records, "x").unwrap();

        assert_eq!(m.sample_size, 3);
        assert!(approx(m.value_per_sqft_median, 200.0));
        assert!(approx(m.value_per_sqft_mean, 200.0));
        assert!(approx(m.value_per_sqft_std, 100.0));
        assert!(approx(m.value_per_sqft_min, 100.0));
        assert!(approx(m.value_per_sqft_max, 300.0));
        assert!(approx(m.tax_per_sqft_median, 4.0));
        assert!(approx(m.effective_rate_median, 2.0));
        // 4 / 200 * 1000
        assert!(approx(m.tax_efficiency_ratio, 20.0));
        assert_eq!(m.tax_source, TaxSource::Measured);
        assert_eq!(m.value_range(), "$100 - $300/sqft");
        // 200,000 * 2% / 12
        assert!(approx(m.monthly_tax_typical(), 333.333333333));
    }

    #[test]
    fn no_sales_is_an_empty_result() {
        let records = vec![sale("x", dec!(1000), dec!(100000), dec!(2000))];
        let m = calculator()
            .calculate_municipality_metrics(&records, "bronxville")
            .unwrap();
        assert_eq!(m, MunicipalityMetrics::empty("bronxville"));
        assert_eq!(m.tax_efficiency_ratio, 0.0);
        assert_eq!(m.tax_source, TaxSource::None);
        assert!(!m.has_data());

        let m = calculator().calculate_municipality_metrics(&[], "x").unwrap();
        assert_eq!(m.sample_size, 0);
    }

    #[test]
    fn match_is_case_sensitive() {
        let records = vec![sale("Bronxville", dec!(1000), dec!(1000000), dec!(2000))];
        let m = calculator()
            .calculate_municipality_metrics(&records, "bronxville")
            .unwrap();
        assert_eq!(m.sample_size, 0);
    }

    #[test]
    fn only_taxed_sales_feed_measured_tax_figures() {
        let records = vec![
            sale("x", dec!(1000), dec!(100000), dec!(2000)),
            sale("x", dec!(1000), dec!(200000), Decimal::ZERO),
        ];
        let m = calculator().calculate_municipality_metrics(&records, "x").unwrap();
        assert_eq!(m.sample_size, 2);
        assert!(approx(m.tax_per_sqft_median, 2.0));
        assert_eq!(m.tax_per_sqft_std, 0.0);
        assert_eq!(m.tax_source, TaxSource::Measured);
    }

    #[test]
    fn missing_taxes_are_estimated() {
        let records = vec![
            sale("bronxville", dec!(2000), dec!(1000000), Decimal::ZERO),
            sale("bronxville", dec!(2000), dec!(1000000), Decimal::ZERO),
        ];
        let m = calculator()
            .calculate_municipality_metrics(&records, "bronxville")
            .unwrap();
        assert_eq!(m.tax_source, TaxSource::Estimated);
        // 28,800 / 2,000
        assert!(approx(m.tax_per_sqft_median, 14.4));
        assert!(approx(m.effective_rate_mean, 2.88));
    }

    #[test]
    fn estimation_for_unknown_municipality_fails() {
        let records = vec![sale("atlantis", dec!(1000), dec!(500000), Decimal::ZERO)];
        let err = calculator()
            .calculate_municipality_metrics(&records, "atlantis")
            .unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));

        // measured taxes need no registry entry
        let records = vec![sale("atlantis", dec!(1000), dec!(500000), dec!(100))];
        assert!(calculator().calculate_municipality_metrics(&records, "atlantis").is_ok());
    }

    #[test]
    fn all_metrics_default_to_observed_keys() {
        let records = vec![
            sale("b", dec!(1000), dec!(100000), dec!(1000)),
            sale("a", dec!(1000), dec!(100000), dec!(1000)),
            sale("b", dec!(1000), dec!(100000), dec!(1000)),
        ];
        let calc = calculator();
        let all = calc.calculate_all_metrics(&records, None).unwrap();
        assert_eq!(all.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(all["b"].sample_size, 2);

        let requested = calc.calculate_all_metrics(&records, Some(&["a", "c"])).unwrap();
        assert_eq!(requested.len(), 2);
        assert_eq!(requested["c"].sample_size, 0);
    }

    #[test]
    fn efficiency_ranking_skips_unknown_ratios() {
        let records = vec![
            sale("c", dec!(1000), dec!(100000), dec!(3000)),
            sale("a", dec!(1000), dec!(100000), dec!(1000)),
            sale("b", dec!(1000), dec!(100000), dec!(1000)),
        ];
        let calc = calculator();
        let all = calc
            .calculate_all_metrics(&records, Some(&["a", "b", "c", "d"]))
            .unwrap();
        let ranking = calc.rank_by_tax_efficiency(&all);
        let keys: Vec<&str> = ranking.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn value_versus_tax() {
        let records = vec![
            sale("cheap", dec!(1000), dec!(400000), dec!(12000)),
            sale("mid", dec!(1000), dec!(600000), dec!(13000)),
            sale("premium", dec!(1000), dec!(1100000), dec!(20000)),
        ];
        let calc = calculator();
        let all = calc.calculate_all_metrics(&records, None).unwrap();
        let analysis = calc.value_vs_tax_analysis(&all).unwrap();

        assert!(analysis.correlation.unwrap() > 0.9);
        assert!(analysis.interpretation.starts_with("Positive"));
        // 1100/20 = 55 beats 600/13 and 400/12
        assert_eq!(analysis.best_value_municipality.as_deref(), Some("premium"));
        assert!(approx(analysis.best_value_ratio, 55.0));
        assert!(approx(analysis.average_value_per_sqft, 700.0));
        assert_eq!(analysis.municipalities_above_average, vec!["premium".to_string()]);

        let single = calc
            .calculate_all_metrics(&records, Some(&["cheap", "nowhere"]))
            .unwrap();
        assert!(calc.value_vs_tax_analysis(&single).is_none());
    }

    #[test]
    fn single_property_breakdown() {
        let record = sale("bronxville", dec!(2000), dec!(1000000), Decimal::ZERO);
        let pm = calculator().property_metrics(&record).unwrap();
        assert_eq!(pm.total_annual_tax, dec!(28800));
        assert_eq!(pm.tax_per_sqft, dec!(14.4));
        assert_eq!(pm.value_per_sqft, dec!(500));
        assert_eq!(pm.other_tax, dec!(800));
        assert_eq!(pm.tax_efficiency_ratio(), dec!(28.8));
    }

    proptest! {
        #[test]
        fn sample_size_counts_matching_records(
            munis in proptest::collection::vec(prop_oneof![Just("x"), Just("y"), Just("z")], 0..40)
        ) {
            let records: Vec<SaleRecord> = munis
                .iter()
                .enumerate()
                .map(|(i, m)| {
                    let price = Decimal::from(100_000 + i as i64 * 1000);
                    sale(m, dec!(1500), price, dec!(5000))
                })
                .collect();
            let calc = calculator();
            for key in ["x", "y", "z"] {
                let m = calc.calculate_municipality_metrics(&records, key).unwrap();
                let expected = munis.iter().filter(|k| **k == key).count();
                prop_assert_eq!(m.sample_size, expected);
                prop_assert!(m.tax_efficiency_ratio >= 0.0);
                prop_assert!(!m.value_per_sqft_std.is_nan());
            }
        }
    }
}
