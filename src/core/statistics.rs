use super::descriptive::{self, to_f64};
use super::distribution;
use super::sale::SaleRecord;
use serde::Serialize;
use std::collections::BTreeMap;
use std::str::FromStr;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StatisticsError {
    #[error("column {name} not found. Available: {}", .available.join(", "))]
    UnknownColumn { name: String, available: Vec<String> },
}

/// Numeric column of the flattened sale table
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    SalePrice,
    Sqft,
    PricePerSqft,
    AssessedValue,
    AnnualTaxes,
    TaxPerSqft,
    EffectiveTaxRate,
    Bedrooms,
    Bathrooms,
    LotSqft,
    YearBuilt,
}

impl Column {
    pub const ALL: [Column; 11] = [
        Column::SalePrice,
        Column::Sqft,
        Column::PricePerSqft,
        Column::AssessedValue,
        Column::AnnualTaxes,
        Column::TaxPerSqft,
        Column::EffectiveTaxRate,
        Column::Bedrooms,
        Column::Bathrooms,
        Column::LotSqft,
        Column::YearBuilt,
    ];

    /// Columns included in the correlation matrix
    pub const CORRELATED: [Column; 8] = [
        Column::SalePrice,
        Column::Sqft,
        Column::PricePerSqft,
        Column::AnnualTaxes,
        Column::TaxPerSqft,
        Column::EffectiveTaxRate,
        Column::Bedrooms,
        Column::Bathrooms,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Column::SalePrice => "sale_price",
            Column::Sqft => "sqft",
            Column::PricePerSqft => "price_per_sqft",
            Column::AssessedValue => "assessed_value",
            Column::AnnualTaxes => "annual_taxes",
            Column::TaxPerSqft => "tax_per_sqft",
            Column::EffectiveTaxRate => "effective_tax_rate",
            Column::Bedrooms => "bedrooms",
            Column::Bathrooms => "bathrooms",
            Column::LotSqft => "lot_sqft",
            Column::YearBuilt => "year_built",
        }
    }

    /// Value for one record, `None` where the record has no such value
    pub fn value(&self, record: &SaleRecord) -> Option<f64> {
        let value = match self {
            Column::SalePrice => to_f64(record.sale_price()),
            Column::Sqft => to_f64(record.sqft()),
            Column::PricePerSqft => to_f64(record.price_per_sqft()),
            Column::AssessedValue => to_f64(record.assessed_value()),
            Column::AnnualTaxes => to_f64(record.annual_taxes()),
            Column::TaxPerSqft => to_f64(record.tax_per_sqft()),
            Column::EffectiveTaxRate => to_f64(record.effective_tax_rate()),
            Column::Bedrooms => f64::from(record.bedrooms()),
            Column::Bathrooms => to_f64(record.bathrooms()),
            Column::LotSqft => to_f64(record.lot_sqft()?),
            Column::YearBuilt => f64::from(record.year_built()?),
        };
        Some(value)
    }
}

impl std::fmt::Display for Column {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Column {
    type Err = StatisticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Column::ALL
            .iter()
            .find(|c| c.name() == s)
            .copied()
            .ok_or_else(|| StatisticsError::UnknownColumn {
                name: s.to_string(),
                available: Column::ALL.iter().map(|c| c.name().to_string()).collect(),
            })
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct StatisticalSummary {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    /// 25th percentile
    pub q1: f64,
    /// 75th percentile
    pub q3: f64,
    pub iqr: f64,
}

impl StatisticalSummary {
    /// All zeros for an empty sample
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return StatisticalSummary::default();
        }
        let q1 = descriptive::percentile(values, 0.25);
        let q3 = descriptive::percentile(values, 0.75);
        StatisticalSummary {
            count: values.len(),
            mean: descriptive::mean(values),
            median: descriptive::median(values),
            std: descriptive::sample_std(values),
            min: descriptive::min(values),
            max: descriptive::max(values),
            q1,
            q3,
            iqr: q3 - q1,
        }
    }

    /// Coefficient of variation (std / mean), 0 for a zero mean
    pub fn cv(&self) -> f64 {
        if self.mean == 0.0 {
            0.0
        } else {
            self.std / self.mean
        }
    }
}

impl std::fmt::Display for StatisticalSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "n={}, mean={:.2}, median={:.2}, std={:.2}, range=[{:.2}, {:.2}]",
            self.count, self.mean, self.median, self.std, self.min, self.max
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DistributionAnalysis {
    pub column: Column,
    pub overall: StatisticalSummary,
    /// Only municipalities with at least one value
    pub by_municipality: BTreeMap<String, StatisticalSummary>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationStrength {
    Weak,
    Moderate,
    Strong,
}

impl CorrelationStrength {
    pub fn from_coefficient(r: f64) -> Self {
        let r = r.abs();
        if r < 0.3 {
            CorrelationStrength::Weak
        } else if r < 0.7 {
            CorrelationStrength::Moderate
        } else {
            CorrelationStrength::Strong
        }
    }

    fn label(&self) -> &'static str {
        match self {
            CorrelationStrength::Weak => "Weak",
            CorrelationStrength::Moderate => "Moderate",
            CorrelationStrength::Strong => "Strong",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationResult {
    /// 0 when there is not enough data
    pub coefficient: f64,
    /// `None` when there is not enough data
    pub strength: Option<CorrelationStrength>,
    pub interpretation: String,
}

impl CorrelationResult {
    fn insufficient() -> Self {
        CorrelationResult {
            coefficient: 0.0,
            strength: None,
            interpretation: "Insufficient data".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CorrelationMatrix {
    pub columns: Vec<Column>,
    /// Row-major; `None` where a column does not vary
    pub values: Vec<Vec<Option<f64>>>,
}

impl CorrelationMatrix {
    pub fn get(&self, a: Column, b: Column) -> Option<f64> {
        let i = self.columns.iter().position(|c| *c == a)?;
        let j = self.columns.iter().position(|c| *c == b)?;
        self.values[i][j]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum OutlierMethod {
    /// Outside `[q1 - k * iqr, q3 + k * iqr]`
    Iqr(f64),
    /// `|z|` above the threshold
    ZScore(f64),
}

impl Default for OutlierMethod {
    fn default() -> Self {
        OutlierMethod::Iqr(1.5)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectSize {
    Small,
    Medium,
    Large,
}

impl EffectSize {
    pub fn from_cohens_d(d: f64) -> Self {
        let d = d.abs();
        if d < 0.5 {
            EffectSize::Small
        } else if d < 0.8 {
            EffectSize::Medium
        } else {
            EffectSize::Large
        }
    }
}

/// Welch's two-sample t-test between two municipalities
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TTestResult {
    pub first: String,
    pub second: String,
    pub column: Column,
    pub first_mean: f64,
    pub second_mean: f64,
    pub first_n: usize,
    pub second_n: usize,
    pub difference: f64,
    pub t_statistic: f64,
    pub degrees_of_freedom: f64,
    pub p_value: f64,
    pub significant_05: bool,
    pub significant_01: bool,
    pub cohens_d: f64,
    pub effect_size: EffectSize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TTestOutcome {
    /// Either group has fewer than two values
    InsufficientData { first_n: usize, second_n: usize },
    Completed(TTestResult),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegressionResult {
    pub x: Column,
    pub y: Column,
    pub n: usize,
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
    pub p_value: f64,
    /// Standard error of the slope
    pub std_error: f64,
    pub interpretation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RegressionOutcome {
    /// Fewer than three complete pairs, or no variation in x
    InsufficientData { n: usize },
    Completed(RegressionResult),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnovaResult {
    pub column: Column,
    pub municipalities_compared: Vec<String>,
    pub f_statistic: f64,
    pub p_value: f64,
    pub significant_05: bool,
    pub significant_01: bool,
    pub interpretation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnovaOutcome {
    /// Fewer than two municipalities with at least two values each
    InsufficientData { groups: usize },
    Completed(AnovaResult),
}

impl AnovaOutcome {
    pub fn interpretation(&self) -> &str {
        match self {
            AnovaOutcome::InsufficientData { .. } => {
                "Need at least 2 municipalities with sufficient data"
            }
            AnovaOutcome::Completed(result) => &result.interpretation,
        }
    }
}

/// Statistical tests over a set of sales.
///
/// Too little data is reported through the `InsufficientData` variants,
/// never as an error.
#[derive(Debug, Clone, Copy)]
pub struct StatisticalAnalyzer<'a> {
    records: &'a [SaleRecord],
}

impl<'a> StatisticalAnalyzer<'a> {
    pub fn new(records: &'a [SaleRecord]) -> Self {
        StatisticalAnalyzer { records }
    }

    fn values(&self, column: Column) -> Vec<f64> {
        self.records.iter().filter_map(|r| column.value(r)).collect()
    }

    fn grouped(&self, column: Column) -> BTreeMap<&'a str, Vec<f64>> {
        let mut groups: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
        for record in self.records {
            if let Some(v) = column.value(record) {
                groups.entry(record.municipality()).or_default().push(v);
            }
        }
        groups
    }

    fn municipality_values(&self, municipality: &str, column: Column) -> Vec<f64> {
        self.records
            .iter()
            .filter(|r| r.municipality() == municipality)
            .filter_map(|r| column.value(r))
            .collect()
    }

    pub fn summary(&self, column: Column) -> StatisticalSummary {
        StatisticalSummary::from_values(&self.values(column))
    }

    pub fn analyze_distribution(&self, column: Column) -> DistributionAnalysis {
        DistributionAnalysis {
            column,
            overall: self.summary(column),
            by_municipality: self
                .grouped(column)
                .into_iter()
                .map(|(muni, values)| (muni.to_string(), StatisticalSummary::from_values(&values)))
                .collect(),
        }
    }

    /// Pearson correlation of price/sqft against tax/sqft over sales with
    /// both positive; needs at least three such sales
    pub fn price_tax_correlation(&self) -> CorrelationResult {
        let (prices, taxes): (Vec<f64>, Vec<f64>) = self
            .records
            .iter()
            .map(|r| (to_f64(r.price_per_sqft()), to_f64(r.tax_per_sqft())))
            .filter(|(p, t)| *p > 0.0 && *t > 0.0)
            .unzip();

        if prices.len() < 3 {
            return CorrelationResult::insufficient();
        }
        let Some(r) = descriptive::pearson(&prices, &taxes) else {
            return CorrelationResult::insufficient();
        };

        let strength = CorrelationStrength::from_coefficient(r);
        let (direction, tendency) = if r > 0.0 {
            ("positive", "Higher-value homes tend to have higher taxes per sqft.")
        } else {
            ("negative", "Higher-value homes tend to have lower taxes per sqft.")
        };

        CorrelationResult {
            coefficient: r,
            strength: Some(strength),
            interpretation: format!(
                "{} {} correlation ({:.3}). {}",
                strength.label(),
                direction,
                r,
                tendency
            ),
        }
    }

    pub fn correlation_matrix(&self) -> CorrelationMatrix {
        let columns = Column::CORRELATED.to_vec();
        let data: Vec<Vec<f64>> = columns.iter().map(|c| self.values(*c)).collect();
        let values = data
            .iter()
            .map(|a| data.iter().map(|b| descriptive::pearson(a, b)).collect())
            .collect();
        CorrelationMatrix { columns, values }
    }

    pub fn detect_outliers(&self, column: Column, method: OutlierMethod) -> Vec<&'a SaleRecord> {
        let values = self.values(column);
        if values.is_empty() {
            return Vec::new();
        }

        let (lower, upper) = match method {
            OutlierMethod::Iqr(k) => {
                let q1 = descriptive::percentile(&values, 0.25);
                let q3 = descriptive::percentile(&values, 0.75);
                let iqr = q3 - q1;
                (q1 - k * iqr, q3 + k * iqr)
            }
            OutlierMethod::ZScore(threshold) => {
                let mean = descriptive::mean(&values);
                let std = descriptive::sample_std(&values);
                if std == 0.0 {
                    return Vec::new();
                }
                (mean - threshold * std, mean + threshold * std)
            }
        };

        self.records
            .iter()
            .filter(|r| column.value(r).map_or(false, |v| v < lower || v > upper))
            .collect()
    }

    /// Welch's t-test with Cohen's d between two municipalities
    pub fn municipality_comparison_test(
        &self,
        first: &str,
        second: &str,
        column: Column,
    ) -> TTestOutcome {
        let a = self.municipality_values(first, column);
        let b = self.municipality_values(second, column);
        if a.len() < 2 || b.len() < 2 {
            return TTestOutcome::InsufficientData {
                first_n: a.len(),
                second_n: b.len(),
            };
        }

        let (n1, n2) = (a.len() as f64, b.len() as f64);
        let (mean1, mean2) = (descriptive::mean(&a), descriptive::mean(&b));
        let (var1, var2) = (descriptive::sample_variance(&a), descriptive::sample_variance(&b));
        let difference = mean1 - mean2;

        let (se1, se2) = (var1 / n1, var2 / n2);
        let se = (se1 + se2).sqrt();
        let (t_statistic, degrees_of_freedom, p_value) = if se > 0.0 {
            let t = difference / se;
            let df = (se1 + se2).powi(2) / (se1.powi(2) / (n1 - 1.0) + se2.powi(2) / (n2 - 1.0));
            (t, df, distribution::t_two_sided_p(t, df))
        } else {
            // neither group varies
            let df = n1 + n2 - 2.0;
            if difference == 0.0 {
                (0.0, df, 1.0)
            } else {
                (difference.signum() * f64::INFINITY, df, 0.0)
            }
        };

        let pooled_std = ((var1 + var2) / 2.0).sqrt();
        let cohens_d = if pooled_std > 0.0 {
            difference / pooled_std
        } else {
            0.0
        };

        TTestOutcome::Completed(TTestResult {
            first: first.to_string(),
            second: second.to_string(),
            column,
            first_mean: mean1,
            second_mean: mean2,
            first_n: a.len(),
            second_n: b.len(),
            difference,
            t_statistic,
            degrees_of_freedom,
            p_value,
            significant_05: p_value < 0.05,
            significant_01: p_value < 0.01,
            cohens_d,
            effect_size: EffectSize::from_cohens_d(cohens_d),
        })
    }

    /// Ordinary least squares fit of `y` on `x`
    pub fn regression_analysis(&self, x: Column, y: Column) -> RegressionOutcome {
        let (xs, ys): (Vec<f64>, Vec<f64>) = self
            .records
            .iter()
            .filter_map(|r| Some((x.value(r)?, y.value(r)?)))
            .unzip();
        let n = xs.len();
        if n < 3 {
            return RegressionOutcome::InsufficientData { n };
        }

        let (mx, my) = (descriptive::mean(&xs), descriptive::mean(&ys));
        let mut ssxx = 0.0;
        let mut ssyy = 0.0;
        let mut ssxy = 0.0;
        for (xi, yi) in xs.iter().zip(&ys) {
            ssxx += (xi - mx).powi(2);
            ssyy += (yi - my).powi(2);
            ssxy += (xi - mx) * (yi - my);
        }
        if ssxx == 0.0 {
            return RegressionOutcome::InsufficientData { n };
        }

        let slope = ssxy / ssxx;
        let intercept = my - slope * mx;
        let r_squared = if ssyy == 0.0 {
            0.0
        } else {
            (ssxy * ssxy / (ssxx * ssyy)).min(1.0)
        };

        let df = (n - 2) as f64;
        let unexplained = 1.0 - r_squared;
        let std_error = (unexplained * ssyy / ssxx / df).sqrt();
        let p_value = if ssyy == 0.0 {
            1.0
        } else if unexplained <= 0.0 {
            0.0
        } else {
            let t = r_squared.sqrt() * (df / unexplained).sqrt();
            distribution::t_two_sided_p(t, df)
        };

        RegressionOutcome::Completed(RegressionResult {
            x,
            y,
            n,
            slope,
            intercept,
            r_squared,
            p_value,
            std_error,
            interpretation: format!(
                "For each additional {} unit, {} increases by ${:.2} (R² = {:.3})",
                x, y, slope, r_squared
            ),
        })
    }

    /// One-way ANOVA across municipalities with at least two values each
    pub fn anova_municipalities(&self, column: Column) -> AnovaOutcome {
        let groups: Vec<(&str, Vec<f64>)> = self
            .grouped(column)
            .into_iter()
            .filter(|(_, values)| values.len() >= 2)
            .collect();
        if groups.len() < 2 {
            return AnovaOutcome::InsufficientData {
                groups: groups.len(),
            };
        }

        let all: Vec<f64> = groups.iter().flat_map(|(_, v)| v.iter().copied()).collect();
        let grand_mean = descriptive::mean(&all);
        let k = groups.len() as f64;
        let n = all.len() as f64;

        let mut ss_between = 0.0;
        let mut ss_within = 0.0;
        for (_, values) in &groups {
            let m = descriptive::mean(values);
            ss_between += values.len() as f64 * (m - grand_mean).powi(2);
            ss_within += values.iter().map(|v| (v - m).powi(2)).sum::<f64>();
        }

        let (df_between, df_within) = (k - 1.0, n - k);
        let f_statistic = (ss_between / df_between) / (ss_within / df_within);
        let p_value = distribution::f_survival(f_statistic, df_between, df_within);
        let significant_05 = p_value < 0.05;

        AnovaOutcome::Completed(AnovaResult {
            column,
            municipalities_compared: groups.iter().map(|(m, _)| m.to_string()).collect(),
            f_statistic,
            p_value,
            significant_05,
            significant_01: p_value < 0.01,
            interpretation: format!(
                "There {} a statistically significant difference in {} between municipalities (p={:.4})",
                if significant_05 { "is" } else { "is NOT" },
                column,
                p_value
            ),
        })
    }

    pub fn generate_report(&self) -> String {
        let mut lines = vec![
            "=".repeat(70),
            "STATISTICAL ANALYSIS REPORT".to_string(),
            "=".repeat(70),
            String::new(),
            "DISTRIBUTION ANALYSIS".to_string(),
            "-".repeat(50),
        ];

        for column in [Column::PricePerSqft, Column::TaxPerSqft, Column::EffectiveTaxRate] {
            let dist = self.analyze_distribution(column);
            lines.push(format!("\n{}:", column));
            lines.push(format!("  Overall: {}", dist.overall));
        }

        lines.push(format!("\n{}", "=".repeat(50)));
        lines.push("CORRELATION ANALYSIS".to_string());
        lines.push("-".repeat(50));
        lines.push(format!(
            "Price/Tax Correlation: {}",
            self.price_tax_correlation().interpretation
        ));

        lines.push(format!("\n{}", "=".repeat(50)));
        lines.push("ANOVA: Do municipalities differ significantly?".to_string());
        lines.push("-".repeat(50));
        lines.push(
            self.anova_municipalities(Column::PricePerSqft)
                .interpretation()
                .to_string(),
        );

        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::sale::tests::sale;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() < tol
    }

    /// One sale per value with 1 sqft, so price_per_sqft equals the value
    fn priced(municipality: &str, values: &[i64]) -> Vec<SaleRecord> {
        values
            .iter()
            .map(|v| sale(municipality, dec!(1), Decimal::from(*v), Decimal::ZERO))
            .collect()
    }

    #[test]
    fn column_names_parse() {
        assert_eq!("price_per_sqft".parse::<Column>().unwrap(), Column::PricePerSqft);
        let err = "price".parse::<Column>().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("column price not found"));
        assert!(message.contains("tax_per_sqft"));
    }

    #[test]
    fn summary_of_four_values() {
        let summary = StatisticalSummary::from_values(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(summary.count, 4);
        assert!(close(summary.q1, 1.75, 1e-12));
        assert!(close(summary.q3, 3.25, 1e-12));
        assert!(close(summary.iqr, 1.5, 1e-12));
        assert!(close(summary.median, 2.5, 1e-12));
        assert!(close(summary.cv(), summary.std / 2.5, 1e-12));

        let empty = StatisticalSummary::from_values(&[]);
        assert_eq!(empty, StatisticalSummary::default());
        assert_eq!(empty.cv(), 0.0);
    }

    #[test]
    fn distribution_split_by_municipality() {
        let mut records = priced("a", &[100, 200, 300]);
        records.extend(priced("b", &[500]));
        let analyzer = StatisticalAnalyzer::new(&records);
        let dist = analyzer.analyze_distribution(Column::PricePerSqft);
        assert_eq!(dist.overall.count, 4);
        assert!(close(dist.by_municipality["a"].median, 200.0, 1e-9));
        assert_eq!(dist.by_municipality["b"].std, 0.0);

        // lot size is optional and absent everywhere
        let lots = analyzer.analyze_distribution(Column::LotSqft);
        assert_eq!(lots.overall.count, 0);
        assert!(lots.by_municipality.is_empty());
    }

    #[test]
    fn price_tax_correlation_labels() {
        let records = vec![
            sale("x", dec!(1000), dec!(400000), dec!(8000)),
            sale("x", dec!(1000), dec!(600000), dec!(12500)),
            sale("x", dec!(1000), dec!(800000), dec!(15500)),
            sale("x", dec!(1000), dec!(900000), Decimal::ZERO),
        ];
        let result = StatisticalAnalyzer::new(&records).price_tax_correlation();
        assert!(result.coefficient > 0.99);
        assert_eq!(result.strength, Some(CorrelationStrength::Strong));
        assert!(result.interpretation.starts_with("Strong positive correlation"));

        let result = StatisticalAnalyzer::new(&records[..2]).price_tax_correlation();
        assert_eq!(result.interpretation, "Insufficient data");
        assert_eq!(result.coefficient, 0.0);
    }

    #[test]
    fn correlation_strength_bands() {
        assert_eq!(CorrelationStrength::from_coefficient(0.29), CorrelationStrength::Weak);
        assert_eq!(CorrelationStrength::from_coefficient(-0.5), CorrelationStrength::Moderate);
        assert_eq!(CorrelationStrength::from_coefficient(0.7), CorrelationStrength::Strong);
    }

    #[test]
    fn correlation_matrix_diagonal() {
        let records = vec![
            sale("x", dec!(1000), dec!(400000), dec!(8000)).with_rooms(2, dec!(1)),
            sale("x", dec!(2000), dec!(700000), dec!(12000)).with_rooms(3, dec!(2)),
            sale("x", dec!(3000), dec!(900000), dec!(20000)).with_rooms(4, dec!(3)),
        ];
        let matrix = StatisticalAnalyzer::new(&records).correlation_matrix();
        assert_eq!(matrix.columns.len(), 8);
        assert!(close(matrix.get(Column::Sqft, Column::Sqft).unwrap(), 1.0, 1e-12));
        assert!(close(matrix.get(Column::Sqft, Column::Bedrooms).unwrap(), 1.0, 1e-12));
        assert!(matrix.get(Column::SalePrice, Column::LotSqft).is_none());
    }

    #[test]
    fn iqr_outliers() {
        let records = priced("x", &[10, 11, 12, 13, 100]);
        let analyzer = StatisticalAnalyzer::new(&records);
        let outliers = analyzer.detect_outliers(Column::PricePerSqft, OutlierMethod::default());
        assert_eq!(outliers.len(), 1);
        assert_eq!(outliers[0].sale_price(), dec!(100));
    }

    #[test]
    fn zscore_outliers() {
        let records = priced("x", &[10, 10, 10, 10, 10, 10, 10, 10, 10, 50]);
        let analyzer = StatisticalAnalyzer::new(&records);
        let outliers = analyzer.detect_outliers(Column::PricePerSqft, OutlierMethod::ZScore(2.0));
        assert_eq!(outliers.len(), 1);

        let flat = priced("x", &[10, 10, 10]);
        let analyzer = StatisticalAnalyzer::new(&flat);
        assert!(analyzer
            .detect_outliers(Column::PricePerSqft, OutlierMethod::ZScore(1.0))
            .is_empty());
    }

    #[test]
    fn welch_t_test() {
        let mut records = priced("a", &[1, 2, 3, 4, 5]);
        records.extend(priced("b", &[6, 7, 8, 9, 10]));
        let analyzer = StatisticalAnalyzer::new(&records);

        let TTestOutcome::Completed(result) =
            analyzer.municipality_comparison_test("a", "b", Column::PricePerSqft)
        else {
            panic!("expected a completed test");
        };
        assert!(close(result.t_statistic, -5.0, 1e-9));
        assert!(close(result.degrees_of_freedom, 8.0, 1e-9));
        assert!(close(result.p_value, 0.00105, 1e-4));
        assert!(result.significant_05);
        assert!(result.significant_01);
        assert!(close(result.cohens_d, -3.1623, 1e-3));
        assert_eq!(result.effect_size, EffectSize::Large);
        assert!(close(result.difference, -5.0, 1e-9));
    }

    #[test]
    fn t_test_with_single_samples_is_insufficient() {
        let mut records = priced("a", &[100]);
        records.extend(priced("b", &[200]));
        let outcome = StatisticalAnalyzer::new(&records).municipality_comparison_test(
            "a",
            "b",
            Column::PricePerSqft,
        );
        assert_eq!(
            outcome,
            TTestOutcome::InsufficientData {
                first_n: 1,
                second_n: 1
            }
        );
    }

    #[test]
    fn perfect_linear_regression() {
        // sale_price = 2 * sqft + 1
        let records: Vec<SaleRecord> = (1..=5i64)
            .map(|x| sale("x", Decimal::from(x), Decimal::from(2 * x + 1), Decimal::ZERO))
            .collect();
        let RegressionOutcome::Completed(fit) =
            StatisticalAnalyzer::new(&records).regression_analysis(Column::Sqft, Column::SalePrice)
        else {
            panic!("expected a fit");
        };
        assert!(close(fit.slope, 2.0, 1e-9));
        assert!(close(fit.intercept, 1.0, 1e-9));
        assert!(close(fit.r_squared, 1.0, 1e-9));
        assert!(fit.p_value < 1e-9);
        assert!(fit
            .interpretation
            .starts_with("For each additional sqft unit, sale_price increases by $2.00"));
    }

    #[test]
    fn noisy_regression() {
        let ys = [2, 4, 5, 4, 5];
        let records: Vec<SaleRecord> = ys
            .iter()
            .enumerate()
            .map(|(i, y)| sale("x", Decimal::from(i as i64 + 1), Decimal::from(*y), Decimal::ZERO))
            .collect();
        let RegressionOutcome::Completed(fit) =
            StatisticalAnalyzer::new(&records).regression_analysis(Column::Sqft, Column::SalePrice)
        else {
            panic!("expected a fit");
        };
        assert!(close(fit.slope, 0.6, 1e-9));
        assert!(close(fit.intercept, 2.2, 1e-9));
        assert!(close(fit.r_squared, 0.6, 1e-9));
        assert!(close(fit.std_error, 0.08f64.sqrt(), 1e-9));
        assert!(close(fit.p_value, 0.124, 1e-3));
    }

    #[test]
    fn regression_needs_three_points() {
        let records = priced("x", &[1, 2]);
        assert_eq!(
            StatisticalAnalyzer::new(&records).regression_analysis(Column::Sqft, Column::SalePrice),
            RegressionOutcome::InsufficientData { n: 2 }
        );
    }

    #[test]
    fn one_way_anova() {
        let mut records = priced("a", &[1, 2, 3]);
        records.extend(priced("b", &[4, 5, 6]));
        records.extend(priced("c", &[7, 8, 9]));
        // a single sale cannot form a group
        records.extend(priced("d", &[1000]));

        let outcome = StatisticalAnalyzer::new(&records).anova_municipalities(Column::PricePerSqft);
        let AnovaOutcome::Completed(result) = &outcome else {
            panic!("expected a completed ANOVA");
        };
        assert_eq!(result.municipalities_compared, vec!["a", "b", "c"]);
        assert!(close(result.f_statistic, 27.0, 1e-9));
        assert!(result.p_value < 0.01);
        assert!(result.significant_01);
        assert!(outcome.interpretation().starts_with("There is a statistically significant"));
    }

    #[test]
    fn anova_needs_two_groups() {
        let mut records = priced("a", &[1, 2, 3]);
        records.extend(priced("b", &[4]));
        let outcome = StatisticalAnalyzer::new(&records).anova_municipalities(Column::PricePerSqft);
        assert_eq!(outcome, AnovaOutcome::InsufficientData { groups: 1 });
    }

    #[test]
    fn report_renders_with_little_data() {
        let records = priced("a", &[100]);
        let report = StatisticalAnalyzer::new(&records).generate_report();
        assert!(report.contains("STATISTICAL ANALYSIS REPORT"));
        assert!(report.contains("Price/Tax Correlation: Insufficient data"));
        assert!(report.contains("Need at least 2 municipalities"));
    }
}
