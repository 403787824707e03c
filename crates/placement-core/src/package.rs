use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::PlacementError;

const RUPEES_PER_LAKH: f64 = 100_000.0;
const LAKHS_PER_CRORE: f64 = 100.0;
/// Bare numbers at or above this are read as absolute rupees, below as lakhs.
const BARE_RUPEE_THRESHOLD: f64 = 1_000.0;
/// Packages are rupee figures; no conversion is attempted for these.
const FOREIGN_CURRENCY_MARKERS: [&str; 6] = ["$", "usd", "€", "eur", "£", "gbp"];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PackageUnit {
    Lakhs,
    Crores,
    Rupees,
}

impl PackageUnit {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lakhs => "lakhs",
            Self::Crores => "crores",
            Self::Rupees => "rupees",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "lakhs" => Some(Self::Lakhs),
            "crores" => Some(Self::Crores),
            "rupees" => Some(Self::Rupees),
            _ => None,
        }
    }
}

/// An annual compensation figure parsed once from free-form text.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Package {
    pub amount: f64,
    pub unit: PackageUnit,
}

impl Package {
    /// Parses strings such as `12 LPA`, `₹6,50,000`, `1.2 Cr` or `₹850k`.
    ///
    /// # Errors
    /// Returns [`PlacementError::Validation`] when no non-negative number can
    /// be read, the unit suffix is not recognized, or the figure is quoted in a
    /// foreign currency such as `$85k`.
    pub fn parse(raw: &str) -> Result<Self, PlacementError> {
        let invalid = || PlacementError::Validation(format!("unrecognized package '{raw}'"));

        let mut text = raw.trim().to_lowercase();
        if let Some(marker) = FOREIGN_CURRENCY_MARKERS
            .iter()
            .find(|marker| text.contains(**marker))
        {
            return Err(PlacementError::Validation(format!(
                "package '{raw}' is quoted in {marker}; record it in rupees"
            )));
        }
        for marker in ["₹", "inr", "rs.", "rs"] {
            if let Some(rest) = text.strip_prefix(marker) {
                text = rest.trim_start().to_string();
            }
        }
        let compact: String = text
            .chars()
            .filter(|ch| !matches!(ch, ',' | '_') && !ch.is_whitespace())
            .collect();

        let split = compact
            .find(|ch: char| !(ch.is_ascii_digit() || ch == '.'))
            .unwrap_or(compact.len());
        let (number, suffix) = compact.split_at(split);
        if number.is_empty() {
            return Err(invalid());
        }
        let value: f64 = number.parse().map_err(|_| invalid())?;
        if !value.is_finite() || value < 0.0 {
            return Err(invalid());
        }

        let suffix = suffix
            .trim_end_matches("/-")
            .trim_end_matches("perannum")
            .trim_end_matches("p.a.")
            .trim_end_matches("/annum");

        let package = match suffix {
            "" if value < BARE_RUPEE_THRESHOLD => Self {
                amount: value,
                unit: PackageUnit::Lakhs,
            },
            "" | "rupees" | "inr" => Self {
                amount: value,
                unit: PackageUnit::Rupees,
            },
            "lpa" | "l" | "lac" | "lacs" | "lakh" | "lakhs" => Self {
                amount: value,
                unit: PackageUnit::Lakhs,
            },
            "cr" | "cpa" | "crore" | "crores" => Self {
                amount: value,
                unit: PackageUnit::Crores,
            },
            "k" => Self {
                amount: value * 1_000.0,
                unit: PackageUnit::Rupees,
            },
            _ => return Err(invalid()),
        };

        Ok(package)
    }

    /// Normalized value in lakhs per annum.
    #[must_use]
    pub fn lakhs(&self) -> f64 {
        match self.unit {
            PackageUnit::Lakhs => self.amount,
            PackageUnit::Crores => self.amount * LAKHS_PER_CRORE,
            PackageUnit::Rupees => self.amount / RUPEES_PER_LAKH,
        }
    }
}

impl FromStr for Package {
    type Err = PlacementError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl Display for Package {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.unit {
            PackageUnit::Lakhs => write!(f, "{} LPA", self.amount),
            PackageUnit::Crores => write!(f, "{} Cr", self.amount),
            PackageUnit::Rupees => write!(f, "₹{}", self.amount),
        }
    }
}
