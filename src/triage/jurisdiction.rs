use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Postcode areas that belong to Scotland.
const SCOTTISH_AREAS: &[&str] = &[
    "AB", "DD", "DG", "EH", "FK", "G", "HS", "IV", "KA", "KW", "KY", "ML", "PA", "PH", "TD", "ZE",
];

const NORTHERN_IRISH_AREA: &str = "BT";

static LEADING_LETTERS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]+").expect("valid leading letters regex"));

/// One of the three UK legal regimes for registering a death and
/// administering an estate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Jurisdiction {
    EnglandWales,
    Scotland,
    NorthernIreland,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown jurisdiction '{0}'")]
pub struct UnknownJurisdiction(pub String);

impl Jurisdiction {
    /// The literal downstream consumers key on.
    pub fn as_str(&self) -> &'static str {
        match self {
            Jurisdiction::EnglandWales => "england-wales",
            Jurisdiction::Scotland => "scotland",
            Jurisdiction::NorthernIreland => "northern-ireland",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Jurisdiction::EnglandWales => "England & Wales",
            Jurisdiction::Scotland => "Scotland",
            Jurisdiction::NorthernIreland => "Northern Ireland",
        }
    }

    /// Statutory deadline for registering the death.
    pub fn registration_deadline_days(&self) -> u32 {
        match self {
            Jurisdiction::Scotland => 8,
            Jurisdiction::EnglandWales | Jurisdiction::NorthernIreland => 5,
        }
    }

    /// What the estate administration process is called.
    pub fn estate_process_term(&self) -> &'static str {
        match self {
            Jurisdiction::Scotland => "Confirmation",
            Jurisdiction::EnglandWales | Jurisdiction::NorthernIreland => "Probate",
        }
    }

    pub fn tell_us_once_available(&self) -> bool {
        !matches!(self, Jurisdiction::NorthernIreland)
    }
}

impl fmt::Display for Jurisdiction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Jurisdiction {
    type Err = UnknownJurisdiction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "england-wales" => Ok(Jurisdiction::EnglandWales),
            "scotland" => Ok(Jurisdiction::Scotland),
            "northern-ireland" => Ok(Jurisdiction::NorthernIreland),
            other => Err(UnknownJurisdiction(other.to_string())),
        }
    }
}

/// The postcode area: leading alphabetic run of the normalized postcode
/// ("EH" for "eh1 1re", "G" for "G1 1XQ").
pub fn postcode_area(postcode: &str) -> String {
    let normalized = normalize(postcode);
    LEADING_LETTERS
        .find(&normalized)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

/// Map a postcode to its jurisdiction. Anything that is not recognisably
/// Scottish or Northern Irish, including malformed input, is England & Wales.
pub fn derive_jurisdiction(postcode: &str) -> Jurisdiction {
    let area = postcode_area(postcode);
    if area.starts_with(NORTHERN_IRISH_AREA) {
        Jurisdiction::NorthernIreland
    } else if SCOTTISH_AREAS.contains(&area.as_str()) {
        Jurisdiction::Scotland
    } else {
        Jurisdiction::EnglandWales
    }
}

fn normalize(postcode: &str) -> String {
    postcode
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase()
}
