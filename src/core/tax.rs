use super::municipality::{ConfigError, Municipality, MunicipalityRegistry};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Reference home size used for per-square-foot comparisons
pub const REFERENCE_SQFT: Decimal = dec!(2000);

/// Market-value equivalent of the Basic STAR exemption
const BASIC_STAR_MARKET_EXEMPTION: Decimal = dec!(30000);

/// Itemised annual tax bill for one property in one municipality
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaxBreakdown {
    pub municipality: String,
    pub assessed_value: Decimal,
    pub market_value: Decimal,
    pub county_tax: Decimal,
    pub town_tax: Decimal,
    pub village_tax: Decimal,
    pub school_tax: Decimal,
    pub fire_district_tax: Decimal,
    pub library_tax: Decimal,
    pub special_district_tax: Decimal,
}

impl TaxBreakdown {
    /// Total annual property tax
    pub fn total(&self) -> Decimal {
        self.county_tax
            + self.town_tax
            + self.village_tax
            + self.school_tax
            + self.fire_district_tax
            + self.library_tax
            + self.special_district_tax
    }

    /// Effective tax rate as a percentage of market value, 0 for a zero market value
    pub fn effective_rate(&self) -> Decimal {
        if self.market_value.is_zero() {
            return Decimal::ZERO;
        }
        self.total() / self.market_value * dec!(100)
    }

    /// School tax as a percentage of the total
    pub fn school_percentage(&self) -> Decimal {
        percentage_of(self.school_tax, self.total())
    }

    /// Town + village tax as a percentage of the total
    pub fn municipal_percentage(&self) -> Decimal {
        percentage_of(self.town_tax + self.village_tax, self.total())
    }

    /// Flat projection including the derived figures, for CSV/JSON output
    pub fn record(&self) -> TaxBreakdownRecord {
        TaxBreakdownRecord {
            municipality: self.municipality.clone(),
            assessed_value: self.assessed_value,
            market_value: self.market_value,
            county_tax: self.county_tax,
            town_tax: self.town_tax,
            village_tax: self.village_tax,
            school_tax: self.school_tax,
            fire_district_tax: self.fire_district_tax,
            library_tax: self.library_tax,
            special_district_tax: self.special_district_tax,
            total_tax: self.total(),
            effective_rate: self.effective_rate(),
            school_percentage: self.school_percentage(),
            municipal_percentage: self.municipal_percentage(),
        }
    }
}

impl std::fmt::Display for TaxBreakdown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Tax Breakdown for {}", self.municipality)?;
        writeln!(f, "{}", "=".repeat(50))?;
        writeln!(f, "Market Value:     ${:>15.2}", self.market_value)?;
        writeln!(f, "Assessed Value:   ${:>15.2}", self.assessed_value)?;
        writeln!(f)?;
        writeln!(f, "Tax Components:")?;
        writeln!(f, "  County:         ${:>15.2}", self.county_tax)?;
        writeln!(f, "  Town:           ${:>15.2}", self.town_tax)?;
        writeln!(f, "  Village:        ${:>15.2}", self.village_tax)?;
        writeln!(f, "  School:         ${:>15.2}", self.school_tax)?;
        writeln!(f, "  Fire District:  ${:>15.2}", self.fire_district_tax)?;
        writeln!(f, "  Library:        ${:>15.2}", self.library_tax)?;
        writeln!(f, "  Special Dist:   ${:>15.2}", self.special_district_tax)?;
        writeln!(f, "  {}", "-".repeat(35))?;
        writeln!(f, "  TOTAL:          ${:>15.2}", self.total())?;
        writeln!(f)?;
        writeln!(f, "Effective Rate:   {:>15.2}%", self.effective_rate())?;
        write!(f, "School % of Tax:  {:>15.1}%", self.school_percentage())
    }
}

/// Serializable view of a [`TaxBreakdown`]
#[derive(Debug, Clone, Serialize)]
pub struct TaxBreakdownRecord {
    pub municipality: String,
    pub assessed_value: Decimal,
    pub market_value: Decimal,
    pub county_tax: Decimal,
    pub town_tax: Decimal,
    pub village_tax: Decimal,
    pub school_tax: Decimal,
    pub fire_district_tax: Decimal,
    pub library_tax: Decimal,
    pub special_district_tax: Decimal,
    pub total_tax: Decimal,
    pub effective_rate: Decimal,
    pub school_percentage: Decimal,
    pub municipal_percentage: Decimal,
}

/// One municipality's bill placed against the cross-municipality average
#[derive(Debug, Clone)]
pub struct TaxImpact {
    pub breakdown: TaxBreakdown,
    pub monthly: Decimal,
    /// Tax per sqft assuming a 2,000 sqft home
    pub per_sqft_2000: Decimal,
    pub vs_average: Decimal,
    pub vs_average_pct: Decimal,
}

/// STAR (School Tax Relief) exemption estimate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StarExemption {
    /// Reduction in assessed value
    pub exemption_amount: Decimal,
    /// Resulting school tax saving in dollars
    pub school_tax_savings: Decimal,
}

/// Property tax calculator over a shared municipality registry.
///
/// Tax for each levy is `(assessed_value / 1000) * rate`. The village levy is
/// only charged where the municipality has `has_village_tax` set.
#[derive(Debug, Clone)]
pub struct TaxCalculator {
    registry: Arc<MunicipalityRegistry>,
}

impl TaxCalculator {
    pub fn new(registry: Arc<MunicipalityRegistry>) -> Self {
        TaxCalculator { registry }
    }

    pub fn registry(&self) -> &MunicipalityRegistry {
        &self.registry
    }

    pub fn get_municipality(&self, key: &str) -> Result<&Municipality, ConfigError> {
        self.registry.get(key)
    }

    /// Calculate taxes from a market value (e.g. a sale price)
    pub fn calculate_from_market_value(
        &self,
        market_value: Decimal,
        municipality_key: &str,
    ) -> Result<TaxBreakdown, ConfigError> {
        let muni = self.registry.get(municipality_key)?;
        let assessed_value = muni.market_to_assessed(market_value);
        Ok(calculate(assessed_value, market_value, muni))
    }

    /// Calculate taxes from an assessed value (e.g. from a tax bill)
    pub fn calculate_from_assessed_value(
        &self,
        assessed_value: Decimal,
        municipality_key: &str,
    ) -> Result<TaxBreakdown, ConfigError> {
        let muni = self.registry.get(municipality_key)?;
        let market_value = muni.assessed_to_market(assessed_value)?;
        Ok(calculate(assessed_value, market_value, muni))
    }

    /// Monthly tax payment for escrow estimates
    pub fn estimate_monthly_tax(
        &self,
        market_value: Decimal,
        municipality_key: &str,
    ) -> Result<Decimal, ConfigError> {
        let breakdown = self.calculate_from_market_value(market_value, municipality_key)?;
        Ok(breakdown.total() / dec!(12))
    }

    /// Annual tax per square foot; 0 for a non-positive sqft
    pub fn tax_per_sqft(
        &self,
        market_value: Decimal,
        sqft: Decimal,
        municipality_key: &str,
    ) -> Result<Decimal, ConfigError> {
        let breakdown = self.calculate_from_market_value(market_value, municipality_key)?;
        if sqft <= Decimal::ZERO {
            return Ok(Decimal::ZERO);
        }
        Ok(breakdown.total() / sqft)
    }

    /// Apply the same market value to several municipalities.
    ///
    /// `None` compares every registered municipality.
    pub fn compare_municipalities(
        &self,
        market_value: Decimal,
        municipality_keys: Option<&[&str]>,
    ) -> Result<BTreeMap<String, TaxBreakdown>, ConfigError> {
        let keys: Vec<&str> = match municipality_keys {
            Some(keys) => keys.to_vec(),
            None => self.registry.keys().collect(),
        };

        let mut comparisons = BTreeMap::new();
        for key in keys {
            let breakdown = self.calculate_from_market_value(market_value, key)?;
            comparisons.insert(key.to_string(), breakdown);
        }
        Ok(comparisons)
    }

    /// Municipality with the lowest total tax for a market value.
    ///
    /// Equal totals resolve to the lexicographically first key. Returns
    /// `None` when the key list is empty.
    pub fn find_lowest_tax(
        &self,
        market_value: Decimal,
        municipality_keys: Option<&[&str]>,
    ) -> Result<Option<(String, TaxBreakdown)>, ConfigError> {
        let comparisons = self.compare_municipalities(market_value, municipality_keys)?;
        let mut lowest: Option<(String, TaxBreakdown)> = None;
        for (key, breakdown) in comparisons {
            let replace = match &lowest {
                Some((_, current)) => breakdown.total() < current.total(),
                None => true,
            };
            if replace {
                lowest = Some((key, breakdown));
            }
        }
        Ok(lowest)
    }

    /// Contextualise one municipality's bill against the mean across all
    /// registered municipalities
    pub fn tax_impact_analysis(
        &self,
        market_value: Decimal,
        municipality_key: &str,
    ) -> Result<TaxImpact, ConfigError> {
        let breakdown = self.calculate_from_market_value(market_value, municipality_key)?;
        let all = self.compare_municipalities(market_value, None)?;

        let average = if all.is_empty() {
            Decimal::ZERO
        } else {
            all.values().map(TaxBreakdown::total).sum::<Decimal>() / Decimal::from(all.len())
        };

        let total = breakdown.total();
        let vs_average_pct = if average > Decimal::ZERO {
            (total / average - Decimal::ONE) * dec!(100)
        } else {
            Decimal::ZERO
        };

        Ok(TaxImpact {
            monthly: total / dec!(12),
            per_sqft_2000: total / REFERENCE_SQFT,
            vs_average: total - average,
            vs_average_pct,
            breakdown,
        })
    }

    /// Basic STAR exemption for an owner-occupied primary residence
    pub fn basic_star_exemption(
        &self,
        municipality_key: &str,
    ) -> Result<StarExemption, ConfigError> {
        let muni = self.registry.get(municipality_key)?;
        let exemption_amount = muni.market_to_assessed(BASIC_STAR_MARKET_EXEMPTION);
        let school_tax_savings = exemption_amount / dec!(1000) * muni.tax_rates.school;
        Ok(StarExemption {
            exemption_amount,
            school_tax_savings,
        })
    }
}

fn calculate(assessed_value: Decimal, market_value: Decimal, muni: &Municipality) -> TaxBreakdown {
    let rates = &muni.tax_rates;
    let base = assessed_value / dec!(1000);

    let village_tax = if muni.has_village_tax {
        base * rates.village
    } else {
        Decimal::ZERO
    };

    log::debug!(
        "{}: assessed={} market={} total rate={}",
        muni.key,
        assessed_value,
        market_value,
        rates.total()
    );

    TaxBreakdown {
        municipality: muni.name.clone(),
        assessed_value,
        market_value,
        county_tax: base * rates.county,
        town_tax: base * rates.town,
        village_tax,
        school_tax: base * rates.school,
        fire_district_tax: base * rates.fire_district,
        library_tax: base * rates.library,
        special_district_tax: base * rates.special_districts,
    }
}

fn percentage_of(part: Decimal, total: Decimal) -> Decimal {
    if total.is_zero() {
        Decimal::ZERO
    } else {
        part / total * dec!(100)
    }
}
