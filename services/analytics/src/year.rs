//! Reporting year resolution from source identifiers
//!
//! A source identifier (usually an uploaded file name) is scanned for year
//! tokens. The token list is ordered and the first token found in the
//! identifier wins, so `"final"` listed before `"2021"` maps
//! `"report_2021_final"` to the year of `"final"`. Keep the list ordered;
//! never turn it into a map.
//!
//! A token that starts or ends with a digit only matches where that edge is
//! not next to another digit: `"21"` is found in `mon_21.csv` but not inside
//! `2021`, and `"20"` never matches `monitoring_2019.csv`.

use serde::{Deserialize, Serialize};

/// Year used when no token matches and no table is configured.
pub const DEFAULT_FALLBACK_YEAR: i32 = 2022;

/// A single (token, year) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearToken {
    pub token: String,
    pub year: i32,
}

/// Ordered token table plus the fallback year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearTable {
    pub tokens: Vec<YearToken>,
    pub default_year: i32,
}

impl Default for YearTable {
    /// Monitoring uploads cover 2015, 2020, 2021 and 2022. Full years come
    /// first so that short forms only catch identifiers like `mon_21.xlsx`.
    fn default() -> Self {
        Self::from_pairs(
            &[
                ("2015", 2015),
                ("2020", 2020),
                ("2021", 2021),
                ("2022", 2022),
                ("15", 2015),
                ("20", 2020),
                ("21", 2021),
                ("22", 2022),
            ],
            DEFAULT_FALLBACK_YEAR,
        )
    }
}

impl YearTable {
    pub fn from_pairs(pairs: &[(&str, i32)], default_year: i32) -> Self {
        Self {
            tokens: pairs
                .iter()
                .map(|(token, year)| YearToken {
                    token: token.to_string(),
                    year: *year,
                })
                .collect(),
            default_year,
        }
    }

    /// Parse a table from JSON:
    /// `{"tokens": [{"token": "2021", "year": 2021}], "default_year": 2022}`
    pub fn from_json_str(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Canonical year for a source identifier.
    pub fn resolve(&self, source_id: &str) -> i32 {
        self.lookup(source_id).unwrap_or(self.default_year)
    }

    /// Like [`resolve`](Self::resolve) but reports when the fallback was used.
    pub fn lookup(&self, source_id: &str) -> Option<i32> {
        self.tokens
            .iter()
            .find(|t| !t.token.is_empty() && contains_token(source_id, &t.token))
            .map(|t| t.year)
    }
}

/// Substring match that refuses to split a run of digits.
fn contains_token(source_id: &str, token: &str) -> bool {
    let digit_start = token.starts_with(|c: char| c.is_ascii_digit());
    let digit_end = token.ends_with(|c: char| c.is_ascii_digit());
    source_id.match_indices(token).any(|(start, _)| {
        let before = source_id[..start].chars().next_back();
        let after = source_id[start + token.len()..].chars().next();
        !(digit_start && before.is_some_and(|c| c.is_ascii_digit()))
            && !(digit_end && after.is_some_and(|c| c.is_ascii_digit()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table_full_years() {
        let table = YearTable::default();
        assert_eq!(table.resolve("monitoring_2015.xlsx"), 2015);
        assert_eq!(table.resolve("monitoring_2020.xlsx"), 2020);
        assert_eq!(table.resolve("report_2021_final"), 2021);
        assert_eq!(table.resolve("Мониторинг 2022.csv"), 2022);
    }

    #[test]
    fn test_default_table_short_forms() {
        let table = YearTable::default();
        assert_eq!(table.resolve("mon_21.csv"), 2021);
        assert_eq!(table.resolve("mon-15"), 2015);
    }

    #[test]
    fn test_first_token_in_list_order_wins() {
        // Both tokens occur in the identifier; list order decides.
        let table = YearTable::from_pairs(&[("final", 2023), ("2021", 2021)], 2000);
        assert_eq!(table.resolve("report_2021_final"), 2023);

        let reversed = YearTable::from_pairs(&[("2021", 2021), ("final", 2023)], 2000);
        assert_eq!(reversed.resolve("report_2021_final"), 2021);
    }

    #[test]
    fn test_short_forms_do_not_split_full_years() {
        let table = YearTable::default();
        assert_eq!(table.lookup("monitoring_2019.csv"), None);
        assert_eq!(table.lookup("monitoring_2023.csv"), None);
        assert_eq!(table.lookup("monitoring_2016.csv"), None);
        assert_eq!(table.resolve("monitoring_2019.csv"), DEFAULT_FALLBACK_YEAR);
        assert_eq!(table.lookup("mon_20-v2.xlsx"), Some(2020));
        assert_eq!(table.lookup("21мониторинг"), Some(2021));
    }

    #[test]
    fn test_text_tokens_match_anywhere() {
        let table = YearTable::from_pairs(&[("v", 2030)], 2000);
        assert_eq!(table.resolve("2021v2"), 2030);
    }

    #[test]
    fn test_not_numerically_latest() {
        let table = YearTable::from_pairs(&[("2021", 2021), ("final", 2023)], 2000);
        assert_eq!(table.resolve("report_2021_final"), 2021);
    }

    #[test]
    fn test_fallback_year() {
        let table = YearTable::default();
        assert_eq!(table.lookup("no-year-here.csv"), None);
        assert_eq!(table.resolve("no-year-here.csv"), DEFAULT_FALLBACK_YEAR);
    }

    #[test]
    fn test_empty_token_never_matches() {
        let table = YearTable::from_pairs(&[("", 1999), ("2020", 2020)], 2000);
        assert_eq!(table.resolve("data_2020"), 2020);
        assert_eq!(table.resolve("data"), 2000);
    }

    #[test]
    fn test_from_json_preserves_order() {
        let json = r#"{
            "tokens": [
                {"token": "19", "year": 2019},
                {"token": "2019", "year": 1900}
            ],
            "default_year": 2018
        }"#;
        let table = YearTable::from_json_str(json).unwrap();
        assert_eq!(table.tokens[0].token, "19");
        assert_eq!(table.resolve("x_19"), 2019);
        assert_eq!(table.resolve("x_2019"), 1900);
        assert_eq!(table.resolve("x"), 2018);
    }
}
