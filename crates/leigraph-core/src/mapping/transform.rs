use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Value transforms applied, in order, to every mapped source value.
///
/// Values are always trimmed first, so `trim` is only needed for clarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transform {
    Trim,
    Lowercase,
    Uppercase,
    /// Collapses runs of internal whitespace into one space.
    Collapse,
    /// ISO 8601 timestamp or date to `YYYY-MM-DD`.
    Date,
    /// ISO 3166-1 alpha-2 code (or a subdivision code such as `US-DE`) to a
    /// lowercase country code.
    Country,
}

impl Transform {
    pub fn apply(&self, value: &str) -> Result<String, String> {
        let value = value.trim();
        match self {
            Transform::Trim => Ok(value.to_string()),
            Transform::Lowercase => Ok(value.to_lowercase()),
            Transform::Uppercase => Ok(value.to_uppercase()),
            Transform::Collapse => Ok(value.split_whitespace().collect::<Vec<_>>().join(" ")),
            Transform::Date => normalize_date(value),
            Transform::Country => country_code(value),
        }
    }
}

fn normalize_date(value: &str) -> Result<String, String> {
    let date_part = value
        .split(['T', ' '])
        .next()
        .unwrap_or(value);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .map(|date| date.format("%Y-%m-%d").to_string())
        .map_err(|err| format!("not an ISO date: {err}"))
}

fn country_code(value: &str) -> Result<String, String> {
    let upper = value.to_ascii_uppercase();
    let code = upper.split('-').next().unwrap_or(&upper);
    if code.len() == 2 && ISO_COUNTRIES.binary_search(&code).is_ok() {
        Ok(code.to_ascii_lowercase())
    } else {
        Err("unknown country code".to_string())
    }
}

/// ISO 3166-1 alpha-2, plus XK which the registry uses for Kosovo. Sorted.
const ISO_COUNTRIES: &[&str] = &[
    "AD", "AE", "AF", "AG", "AI", "AL", "AM", "AO", "AQ", "AR", "AS", "AT", "AU", "AW", "AX", "AZ",
    "BA", "BB", "BD", "BE", "BF", "BG", "BH", "BI", "BJ", "BL", "BM", "BN", "BO", "BQ", "BR", "BS",
    "BT", "BV", "BW", "BY", "BZ", "CA", "CC", "CD", "CF", "CG", "CH", "CI", "CK", "CL", "CM", "CN",
    "CO", "CR", "CU", "CV", "CW", "CX", "CY", "CZ", "DE", "DJ", "DK", "DM", "DO", "DZ", "EC", "EE",
    "EG", "EH", "ER", "ES", "ET", "FI", "FJ", "FK", "FM", "FO", "FR", "GA", "GB", "GD", "GE", "GF",
    "GG", "GH", "GI", "GL", "GM", "GN", "GP", "GQ", "GR", "GS", "GT", "GU", "GW", "GY", "HK", "HM",
    "HN", "HR", "HT", "HU", "ID", "IE", "IL", "IM", "IN", "IO", "IQ", "IR", "IS", "IT", "JE", "JM",
    "JO", "JP", "KE", "KG", "KH", "KI", "KM", "KN", "KP", "KR", "KW", "KY", "KZ", "LA", "LB", "LC",
    "LI", "LK", "LR", "LS", "LT", "LU", "LV", "LY", "MA", "MC", "MD", "ME", "MF", "MG", "MH", "MK",
    "ML", "MM", "MN", "MO", "MP", "MQ", "MR", "MS", "MT", "MU", "MV", "MW", "MX", "MY", "MZ", "NA",
    "NC", "NE", "NF", "NG", "NI", "NL", "NO", "NP", "NR", "NU", "NZ", "OM", "PA", "PE", "PF", "PG",
    "PH", "PK", "PL", "PM", "PN", "PR", "PS", "PT", "PW", "PY", "QA", "RE", "RO", "RS", "RU", "RW",
    "SA", "SB", "SC", "SD", "SE", "SG", "SH", "SI", "SJ", "SK", "SL", "SM", "SN", "SO", "SR", "SS",
    "ST", "SV", "SX", "SY", "SZ", "TC", "TD", "TF", "TG", "TH", "TJ", "TK", "TL", "TM", "TN", "TO",
    "TR", "TT", "TV", "TW", "TZ", "UA", "UG", "UM", "US", "UY", "UZ", "VA", "VC", "VE", "VG", "VI",
    "VN", "VU", "WF", "WS", "XK", "YE", "YT", "ZA", "ZM", "ZW",
];
