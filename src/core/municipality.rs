use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::Read;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown municipality: {key}. Valid keys: {}", .valid_keys.join(", "))]
    NotFound { key: String, valid_keys: Vec<String> },
    #[error("invalid municipality configuration: {0}")]
    InvalidConfiguration(String),
    #[error("failed to parse municipality configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Type of municipal entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MunicipalityKind {
    Town,
    Village,
    City,
}

/// School districts in the analysis area
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SchoolDistrict {
    Eastchester,
    Bronxville,
    Tuckahoe,
    Scarsdale,
    Mamaroneck,
    Pelham,
    NewRochelle,
    Rye,
    RyeNeck,
}

impl SchoolDistrict {
    pub fn display(&self) -> &'static str {
        match self {
            SchoolDistrict::Eastchester => "Eastchester UFSD",
            SchoolDistrict::Bronxville => "Bronxville UFSD",
            SchoolDistrict::Tuckahoe => "Tuckahoe UFSD",
            SchoolDistrict::Scarsdale => "Scarsdale UFSD",
            SchoolDistrict::Mamaroneck => "Mamaroneck UFSD",
            SchoolDistrict::Pelham => "Pelham UFSD",
            SchoolDistrict::NewRochelle => "New Rochelle City SD",
            SchoolDistrict::Rye => "Rye City SD",
            SchoolDistrict::RyeNeck => "Rye Neck UFSD",
        }
    }
}

impl std::fmt::Display for SchoolDistrict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}

/// Tax rates per $1,000 of assessed value, one per levy
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TaxRates {
    #[serde(default)]
    #[schemars(with = "f64")]
    pub county: Decimal,
    #[serde(default)]
    #[schemars(with = "f64")]
    pub town: Decimal,
    #[serde(default)]
    #[schemars(with = "f64")]
    pub village: Decimal,
    #[serde(default)]
    #[schemars(with = "f64")]
    pub school: Decimal,
    #[serde(default)]
    #[schemars(with = "f64")]
    pub fire_district: Decimal,
    #[serde(default)]
    #[schemars(with = "f64")]
    pub library: Decimal,
    #[serde(default)]
    #[schemars(with = "f64")]
    pub special_districts: Decimal,
}

impl TaxRates {
    /// Total rate per $1,000 assessed
    pub fn total(&self) -> Decimal {
        self.components().iter().sum()
    }

    fn components(&self) -> [Decimal; 7] {
        [
            self.county,
            self.town,
            self.village,
            self.school,
            self.fire_district,
            self.library,
            self.special_districts,
        ]
    }

    fn has_negative(&self) -> bool {
        self.components().iter().any(|r| *r < Decimal::ZERO)
    }
}

/// Static configuration for one municipality
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Municipality {
    /// Display name
    pub name: String,
    /// Unique identifier, referenced by sale records
    pub key: String,
    /// Residential assessment ratio as a fraction (1.0 = assessed at full market value)
    #[schemars(with = "f64")]
    pub assessment_ratio: Decimal,
    pub kind: MunicipalityKind,
    pub school_district: SchoolDistrict,
    /// For villages, the containing town
    #[serde(default)]
    pub parent_town: Option<String>,
    /// Whether the village levy applies
    #[serde(default)]
    pub has_village_tax: bool,
    #[serde(default)]
    pub tax_rates: TaxRates,
    /// Approximate resident population, used for weighted averages
    #[serde(default)]
    pub population: Option<u32>,
}

impl Municipality {
    pub fn market_to_assessed(&self, market_value: Decimal) -> Decimal {
        market_value * self.assessment_ratio
    }

    pub fn assessed_to_market(&self, assessed_value: Decimal) -> Result<Decimal, ConfigError> {
        if self.assessment_ratio.is_zero() {
            return Err(ConfigError::InvalidConfiguration(format!(
                "assessment ratio not set for {}",
                self.name
            )));
        }
        Ok(assessed_value / self.assessment_ratio)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.key.trim().is_empty() {
            return Err(ConfigError::InvalidConfiguration(format!(
                "municipality '{}' has an empty key",
                self.name
            )));
        }
        if self.assessment_ratio <= Decimal::ZERO || self.assessment_ratio > Decimal::ONE {
            return Err(ConfigError::InvalidConfiguration(format!(
                "assessment ratio for {} must be in (0, 1], got {}",
                self.key, self.assessment_ratio
            )));
        }
        if self.tax_rates.has_negative() {
            return Err(ConfigError::InvalidConfiguration(format!(
                "negative tax rate configured for {}",
                self.key
            )));
        }
        Ok(())
    }
}

/// Eastchester-area municipalities
pub const EASTCHESTER_AREA: &[&str] = &["eastchester_unincorp", "bronxville", "tuckahoe"];

/// Comparable towns outside the Eastchester area
pub const COMPARISON_TOWNS: &[&str] = &[
    "scarsdale",
    "larchmont",
    "mamaroneck_village",
    "pelham",
    "pelham_manor",
];

/// Root of a municipality configuration file
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RegistryInput {
    pub municipalities: Vec<Municipality>,
}

/// Immutable lookup table of municipalities, kept in table order
#[derive(Debug, Clone)]
pub struct MunicipalityRegistry {
    municipalities: Vec<Municipality>,
}

impl MunicipalityRegistry {
    pub fn new(municipalities: Vec<Municipality>) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        for muni in &municipalities {
            muni.validate()?;
            if !seen.insert(muni.key.as_str()) {
                return Err(ConfigError::InvalidConfiguration(format!(
                    "duplicate municipality key: {}",
                    muni.key
                )));
            }
        }
        Ok(MunicipalityRegistry { municipalities })
    }

    /// Load a registry from JSON (`{"municipalities": [...]}`)
    pub fn from_json_reader<R: Read>(reader: R) -> Result<Self, ConfigError> {
        let input: RegistryInput = serde_json::from_reader(reader)?;
        let registry = Self::new(input.municipalities)?;
        log::debug!("Loaded {} municipalities from config", registry.len());
        Ok(registry)
    }

    pub fn get(&self, key: &str) -> Result<&Municipality, ConfigError> {
        self.municipalities
            .iter()
            .find(|m| m.key == key)
            .ok_or_else(|| ConfigError::NotFound {
                key: key.to_string(),
                valid_keys: self.keys().map(str::to_string).collect(),
            })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.municipalities.iter().any(|m| m.key == key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.municipalities.iter().map(|m| m.key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Municipality> {
        self.municipalities.iter()
    }

    pub fn len(&self) -> usize {
        self.municipalities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.municipalities.is_empty()
    }

    /// Built-in Westchester County table.
    ///
    /// Rates are approximate 2024-25 figures and should be refreshed from
    /// municipal sources each fiscal year. Ratios follow NY ORPTS RAR values.
    pub fn westchester() -> Self {
        let municipalities = vec![
            Municipality {
                name: "Eastchester (Unincorporated)".to_string(),
                key: "eastchester_unincorp".to_string(),
                assessment_ratio: dec!(0.0088),
                kind: MunicipalityKind::Town,
                school_district: SchoolDistrict::Eastchester,
                parent_town: None,
                has_village_tax: false,
                tax_rates: TaxRates {
                    county: dec!(2.5),
                    // town-outside rate, no village services
                    town: dec!(320.04),
                    school: dec!(850.0),
                    fire_district: dec!(45.0),
                    library: dec!(8.0),
                    ..TaxRates::default()
                },
                population: Some(20_000),
            },
            Municipality {
                name: "Bronxville".to_string(),
                key: "bronxville".to_string(),
                assessment_ratio: dec!(1.0),
                kind: MunicipalityKind::Village,
                school_district: SchoolDistrict::Bronxville,
                parent_town: Some("eastchester".to_string()),
                has_village_tax: true,
                tax_rates: TaxRates {
                    county: dec!(2.8),
                    town: dec!(1.5),
                    village: dec!(5.2),
                    school: dec!(18.5),
                    fire_district: dec!(0.5),
                    library: dec!(0.3),
                    ..TaxRates::default()
                },
                population: Some(6_656),
            },
            Municipality {
                name: "Tuckahoe".to_string(),
                key: "tuckahoe".to_string(),
                assessment_ratio: dec!(0.0098),
                kind: MunicipalityKind::Village,
                school_district: SchoolDistrict::Tuckahoe,
                parent_town: Some("eastchester".to_string()),
                has_village_tax: true,
                tax_rates: TaxRates {
                    county: dec!(2.5),
                    town: dec!(35.0),
                    village: dec!(85.0),
                    school: dec!(650.0),
                    fire_district: dec!(40.0),
                    library: dec!(7.0),
                    ..TaxRates::default()
                },
                population: Some(6_965),
            },
            Municipality {
                name: "Scarsdale".to_string(),
                key: "scarsdale".to_string(),
                assessment_ratio: dec!(0.6973),
                kind: MunicipalityKind::Village,
                school_district: SchoolDistrict::Scarsdale,
                // coterminous town/village
                parent_town: Some("scarsdale".to_string()),
                has_village_tax: true,
                tax_rates: TaxRates {
                    county: dec!(4.0),
                    village: dec!(4.5),
                    school: dec!(25.0),
                    fire_district: dec!(0.8),
                    library: dec!(0.4),
                    ..TaxRates::default()
                },
                population: Some(18_253),
            },
            Municipality {
                name: "Larchmont".to_string(),
                key: "larchmont".to_string(),
                assessment_ratio: dec!(1.0),
                kind: MunicipalityKind::Village,
                school_district: SchoolDistrict::Mamaroneck,
                parent_town: Some("mamaroneck".to_string()),
                has_village_tax: true,
                tax_rates: TaxRates {
                    county: dec!(4.27),
                    village: dec!(4.70),
                    school: dec!(12.64),
                    fire_district: dec!(0.4),
                    library: dec!(0.3),
                    ..TaxRates::default()
                },
                population: Some(6_630),
            },
            Municipality {
                name: "Mamaroneck (Village)".to_string(),
                key: "mamaroneck_village".to_string(),
                assessment_ratio: dec!(1.0),
                kind: MunicipalityKind::Village,
                school_district: SchoolDistrict::Mamaroneck,
                parent_town: Some("mamaroneck".to_string()),
                has_village_tax: true,
                tax_rates: TaxRates {
                    county: dec!(3.86),
                    village: dec!(6.34),
                    school: dec!(12.64),
                    fire_district: dec!(0.4),
                    library: dec!(0.3),
                    ..TaxRates::default()
                },
                population: Some(20_151),
            },
            Municipality {
                name: "Mamaroneck (Town/Unincorporated)".to_string(),
                key: "mamaroneck_town".to_string(),
                assessment_ratio: dec!(1.0),
                kind: MunicipalityKind::Town,
                school_district: SchoolDistrict::Mamaroneck,
                parent_town: None,
                has_village_tax: false,
                tax_rates: TaxRates {
                    county: dec!(8.76),
                    school: dec!(12.64),
                    fire_district: dec!(0.5),
                    library: dec!(0.3),
                    ..TaxRates::default()
                },
                population: None,
            },
            Municipality {
                name: "Pelham (Village)".to_string(),
                key: "pelham".to_string(),
                assessment_ratio: dec!(0.025),
                kind: MunicipalityKind::Village,
                school_district: SchoolDistrict::Pelham,
                parent_town: Some("pelham".to_string()),
                has_village_tax: true,
                tax_rates: TaxRates {
                    county: dec!(15.0),
                    town: dec!(8.0),
                    village: dec!(45.0),
                    school: dec!(280.0),
                    fire_district: dec!(12.0),
                    library: dec!(3.0),
                    ..TaxRates::default()
                },
                population: Some(7_292),
            },
            Municipality {
                name: "Pelham Manor".to_string(),
                key: "pelham_manor".to_string(),
                assessment_ratio: dec!(0.025),
                kind: MunicipalityKind::Village,
                school_district: SchoolDistrict::Pelham,
                parent_town: Some("pelham".to_string()),
                has_village_tax: true,
                tax_rates: TaxRates {
                    county: dec!(15.0),
                    town: dec!(8.0),
                    village: dec!(50.0),
                    school: dec!(280.0),
                    fire_district: dec!(12.0),
                    library: dec!(3.0),
                    ..TaxRates::default()
                },
                population: Some(5_730),
            },
            Municipality {
                name: "Rye (City)".to_string(),
                key: "rye_city".to_string(),
                assessment_ratio: dec!(0.0274),
                kind: MunicipalityKind::City,
                school_district: SchoolDistrict::Rye,
                parent_town: None,
                // cities levy no village tax; the fire department is city-run
                has_village_tax: false,
                tax_rates: TaxRates {
                    county: dec!(12.0),
                    school: dec!(320.0),
                    library: dec!(4.0),
                    ..TaxRates::default()
                },
                population: Some(16_592),
            },
        ];

        MunicipalityRegistry { municipalities }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn municipality(key: &str, ratio: Decimal, rates: TaxRates) -> Municipality {
        Municipality {
            name: key.to_uppercase(),
            key: key.to_string(),
            assessment_ratio: ratio,
            kind: MunicipalityKind::Village,
            school_district: SchoolDistrict::Eastchester,
            parent_town: None,
            has_village_tax: true,
            tax_rates: rates,
            population: None,
        }
    }

    #[test]
    fn tax_rates_total_sums_all_levies() {
        let rates = TaxRates {
            county: dec!(1),
            town: dec!(2),
            village: dec!(3),
            school: dec!(4),
            fire_district: dec!(5),
            library: dec!(6),
            special_districts: dec!(7),
        };
        assert_eq!(rates.total(), dec!(28));
    }

    #[test]
    fn built_in_table_is_valid() {
        let table = MunicipalityRegistry::westchester();
        let rebuilt = MunicipalityRegistry::new(table.iter().cloned().collect()).unwrap();
        assert_eq!(rebuilt.len(), 10);
        for key in EASTCHESTER_AREA.iter().chain(COMPARISON_TOWNS) {
            assert!(table.contains(key), "missing {key}");
        }
    }

    #[test]
    fn get_unknown_key_lists_valid_keys() {
        let registry = MunicipalityRegistry::westchester();
        let err = registry.get("yonkers").unwrap_err();
        let message = err.to_string();
        assert!(matches!(err, ConfigError::NotFound { .. }));
        assert!(message.contains("yonkers"));
        assert!(message.contains("bronxville"));
        assert!(message.contains("rye_city"));
    }

    #[test]
    fn market_and_assessed_conversions() {
        let registry = MunicipalityRegistry::westchester();
        let eastchester = registry.get("eastchester_unincorp").unwrap();
        assert_eq!(eastchester.market_to_assessed(dec!(1000000)), dec!(8800));
        assert_eq!(eastchester.assessed_to_market(dec!(8800)).unwrap(), dec!(1000000));
    }

    #[test]
    fn assessed_to_market_rejects_zero_ratio() {
        let muni = municipality("zero", Decimal::ZERO, TaxRates::default());
        let err = muni.assessed_to_market(dec!(1000)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidConfiguration(_)));
    }

    #[test]
    fn registry_rejects_invalid_tables() {
        let zero = municipality("zero", Decimal::ZERO, TaxRates::default());
        assert!(MunicipalityRegistry::new(vec![zero]).is_err());

        let above_one = municipality("big", dec!(1.5), TaxRates::default());
        assert!(MunicipalityRegistry::new(vec![above_one]).is_err());

        let negative = municipality(
            "neg",
            dec!(1),
            TaxRates {
                school: dec!(-1),
                ..TaxRates::default()
            },
        );
        assert!(MunicipalityRegistry::new(vec![negative]).is_err());

        let a = municipality("dup", dec!(1), TaxRates::default());
        let b = municipality("dup", dec!(0.5), TaxRates::default());
        let err = MunicipalityRegistry::new(vec![a, b]).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn registry_from_json() {
        let json = r#"{
            "municipalities": [
                {
                    "name": "Test Village",
                    "key": "test_village",
                    "assessment_ratio": 0.5,
                    "kind": "village",
                    "school_district": "scarsdale",
                    "has_village_tax": true,
                    "tax_rates": { "county": 2.0, "village": 3.5, "school": 20 },
                    "population": 1200
                }
            ]
        }"#;
        let registry = MunicipalityRegistry::from_json_reader(json.as_bytes()).unwrap();
        let muni = registry.get("test_village").unwrap();
        assert_eq!(muni.assessment_ratio, dec!(0.5));
        assert_eq!(muni.tax_rates.total(), dec!(25.5));
        assert_eq!(muni.population, Some(1200));
        assert_eq!(muni.parent_town, None);
    }

    #[test]
    fn registry_from_malformed_json() {
        let err = MunicipalityRegistry::from_json_reader("{".as_bytes()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
