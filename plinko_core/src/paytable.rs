use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{PlinkoError, PlinkoResult};

pub const MIN_ROWS: u8 = 8;
pub const MAX_ROWS: u8 = 16;

#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    #[default]
    Medium,
    High,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 3] = [RiskLevel::Low, RiskLevel::Medium, RiskLevel::High];

    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = PlinkoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            other => Err(PlinkoError::Validation(format!("unknown risk level '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaytableEntry {
    pub risk: RiskLevel,
    pub rows: u8,
    /// `rows + 1` multipliers, slot 0 (far left) first.
    pub multipliers: Vec<f64>,
}

impl PaytableEntry {
    /// Length, finiteness and mirror symmetry.
    pub fn validate(&self) -> PlinkoResult<()> {
        let expected = usize::from(self.rows) + 1;
        if self.multipliers.len() != expected {
            return Err(PlinkoError::Configuration(format!(
                "{}/{} table has {} slots, expected {expected}",
                self.risk,
                self.rows,
                self.multipliers.len()
            )));
        }
        if let Some(bad) = self.multipliers.iter().find(|m| !m.is_finite() || **m < 0.0) {
            return Err(PlinkoError::Configuration(format!(
                "{}/{} table has invalid multiplier {bad}",
                self.risk, self.rows
            )));
        }
        let n = self.multipliers.len();
        for i in 0..n / 2 {
            if self.multipliers[i] != self.multipliers[n - 1 - i] {
                return Err(PlinkoError::Configuration(format!(
                    "{}/{} table is not symmetric at slot {i}",
                    self.risk, self.rows
                )));
            }
        }
        Ok(())
    }
}

/// Validated multiplier tables keyed by (risk, rows). Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<PaytableEntry>", into = "Vec<PaytableEntry>")]
pub struct Paytable {
    tables: BTreeMap<(RiskLevel, u8), Vec<f64>>,
}

impl Paytable {
    pub fn from_entries(entries: Vec<PaytableEntry>) -> PlinkoResult<Self> {
        let mut tables = BTreeMap::new();
        for entry in entries {
            entry.validate()?;
            let key = (entry.risk, entry.rows);
            if tables.insert(key, entry.multipliers).is_some() {
                return Err(PlinkoError::Configuration(format!(
                    "duplicate table for {}/{}",
                    key.0, key.1
                )));
            }
        }
        if tables.is_empty() {
            return Err(PlinkoError::Configuration("no payout tables".into()));
        }
        Ok(Self { tables })
    }

    /// The built-in tables, 3 risk levels x rows 8..=16.
    pub fn standard() -> PlinkoResult<Self> {
        let entries = STANDARD
            .iter()
            .map(|(risk, rows, multipliers)| PaytableEntry {
                risk: *risk,
                rows: *rows,
                multipliers: multipliers.to_vec(),
            })
            .collect();
        Self::from_entries(entries)
    }

    pub fn from_json(json: &str) -> PlinkoResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| PlinkoError::Configuration(format!("payout tables: {e}")))
    }

    pub fn table(&self, risk: RiskLevel, rows: u8) -> PlinkoResult<&[f64]> {
        self.tables
            .get(&(risk, rows))
            .map(Vec::as_slice)
            .ok_or_else(|| {
                PlinkoError::Configuration(format!("no payout table for {risk} risk with {rows} rows"))
            })
    }

    pub fn has_table(&self, risk: RiskLevel, rows: u8) -> bool {
        self.tables.contains_key(&(risk, rows))
    }

    pub fn payout(&self, risk: RiskLevel, rows: u8, slot: usize) -> PlinkoResult<f64> {
        let table = self.table(risk, rows)?;
        table.get(slot).copied().ok_or_else(|| {
            PlinkoError::Validation(format!(
                "slot {slot} out of range 0..={} for {risk}/{rows}",
                table.len() - 1
            ))
        })
    }

    pub fn rows_for(&self, risk: RiskLevel) -> Vec<u8> {
        self.tables
            .keys()
            .filter(|(r, _)| *r == risk)
            .map(|(_, rows)| *rows)
            .collect()
    }

    /// Expected multiplier under Binomial(rows, 1/2) slot probabilities.
    pub fn expected_return(&self, risk: RiskLevel, rows: u8) -> PlinkoResult<f64> {
        let table = self.table(risk, rows)?;
        let n = u32::from(rows);
        let total = 2f64.powi(n as i32);
        let mut coefficient = 1f64;
        let mut sum = 0.0;
        for (k, multiplier) in table.iter().enumerate() {
            sum += coefficient * multiplier;
            let k = k as f64;
            coefficient = coefficient * (f64::from(n) - k) / (k + 1.0);
        }
        Ok(sum / total)
    }

    pub fn entries(&self) -> Vec<PaytableEntry> {
        self.tables
            .iter()
            .map(|((risk, rows), multipliers)| PaytableEntry {
                risk: *risk,
                rows: *rows,
                multipliers: multipliers.clone(),
            })
            .collect()
    }
}

impl TryFrom<Vec<PaytableEntry>> for Paytable {
    type Error = PlinkoError;

    fn try_from(entries: Vec<PaytableEntry>) -> Result<Self, Self::Error> {
        Self::from_entries(entries)
    }
}

impl From<Paytable> for Vec<PaytableEntry> {
    fn from(table: Paytable) -> Self {
        table.entries()
    }
}

type StandardRow = (RiskLevel, u8, &'static [f64]);

#[rustfmt::skip]
const STANDARD: &[StandardRow] = &[
    (RiskLevel::Low, 8, &[5.6, 2.1, 1.1, 1.0, 0.5, 1.0, 1.1, 2.1, 5.6]),
    (RiskLevel::Low, 9, &[5.6, 2.0, 1.6, 1.0, 0.7, 0.7, 1.0, 1.6, 2.0, 5.6]),
    (RiskLevel::Low, 10, &[8.9, 3.0, 1.4, 1.1, 1.0, 0.5, 1.0, 1.1, 1.4, 3.0, 8.9]),
    (RiskLevel::Low, 11, &[8.4, 3.0, 1.9, 1.3, 1.0, 0.7, 0.7, 1.0, 1.3, 1.9, 3.0, 8.4]),
    (RiskLevel::Low, 12, &[10.0, 3.0, 1.6, 1.4, 1.1, 1.0, 0.5, 1.0, 1.1, 1.4, 1.6, 3.0, 10.0]),
    (RiskLevel::Low, 13, &[8.1, 4.0, 3.0, 1.9, 1.2, 0.9, 0.7, 0.7, 0.9, 1.2, 1.9, 3.0, 4.0, 8.1]),
    (RiskLevel::Low, 14, &[7.1, 4.0, 1.9, 1.4, 1.3, 1.1, 1.0, 0.5, 1.0, 1.1, 1.3, 1.4, 1.9, 4.0, 7.1]),
    (RiskLevel::Low, 15, &[15.0, 8.0, 3.0, 2.0, 1.5, 1.1, 1.0, 0.7, 0.7, 1.0, 1.1, 1.5, 2.0, 3.0, 8.0, 15.0]),
    (RiskLevel::Low, 16, &[16.0, 9.0, 2.0, 1.4, 1.4, 1.2, 1.1, 1.0, 0.5, 1.0, 1.1, 1.2, 1.4, 1.4, 2.0, 9.0, 16.0]),
    (RiskLevel::Medium, 8, &[13.0, 3.0, 1.3, 0.7, 0.4, 0.7, 1.3, 3.0, 13.0]),
    (RiskLevel::Medium, 9, &[18.0, 4.0, 1.7, 0.9, 0.5, 0.5, 0.9, 1.7, 4.0, 18.0]),
    (RiskLevel::Medium, 10, &[22.0, 5.0, 2.0, 1.4, 0.6, 0.4, 0.6, 1.4, 2.0, 5.0, 22.0]),
    (RiskLevel::Medium, 11, &[24.0, 6.0, 3.0, 1.8, 0.7, 0.5, 0.5, 0.7, 1.8, 3.0, 6.0, 24.0]),
    (RiskLevel::Medium, 12, &[33.0, 11.0, 4.0, 2.0, 1.1, 0.6, 0.3, 0.6, 1.1, 2.0, 4.0, 11.0, 33.0]),
    (RiskLevel::Medium, 13, &[43.0, 13.0, 6.0, 3.0, 1.3, 0.7, 0.4, 0.4, 0.7, 1.3, 3.0, 6.0, 13.0, 43.0]),
    (RiskLevel::Medium, 14, &[58.0, 15.0, 7.0, 4.0, 1.9, 1.0, 0.5, 0.2, 0.5, 1.0, 1.9, 4.0, 7.0, 15.0, 58.0]),
    (RiskLevel::Medium, 15, &[88.0, 18.0, 11.0, 5.0, 3.0, 1.3, 0.5, 0.3, 0.3, 0.5, 1.3, 3.0, 5.0, 11.0, 18.0, 88.0]),
    (RiskLevel::Medium, 16, &[110.0, 41.0, 10.0, 5.0, 3.0, 1.5, 1.0, 0.5, 0.3, 0.5, 1.0, 1.5, 3.0, 5.0, 10.0, 41.0, 110.0]),
    (RiskLevel::High, 8, &[29.0, 4.0, 1.5, 0.3, 0.2, 0.3, 1.5, 4.0, 29.0]),
    (RiskLevel::High, 9, &[43.0, 7.0, 2.0, 0.6, 0.2, 0.2, 0.6, 2.0, 7.0, 43.0]),
    (RiskLevel::High, 10, &[76.0, 10.0, 3.0, 0.9, 0.3, 0.2, 0.3, 0.9, 3.0, 10.0, 76.0]),
    (RiskLevel::High, 11, &[120.0, 14.0, 5.2, 1.4, 0.4, 0.2, 0.2, 0.4, 1.4, 5.2, 14.0, 120.0]),
    (RiskLevel::High, 12, &[170.0, 24.0, 8.1, 2.0, 0.7, 0.2, 0.2, 0.2, 0.7, 2.0, 8.1, 24.0, 170.0]),
    (RiskLevel::High, 13, &[260.0, 37.0, 11.0, 4.0, 1.0, 0.2, 0.2, 0.2, 0.2, 1.0, 4.0, 11.0, 37.0, 260.0]),
    (RiskLevel::High, 14, &[420.0, 56.0, 18.0, 5.0, 1.9, 0.3, 0.2, 0.2, 0.2, 0.3, 1.9, 5.0, 18.0, 56.0, 420.0]),
    (RiskLevel::High, 15, &[620.0, 83.0, 27.0, 8.0, 3.0, 0.5, 0.2, 0.2, 0.2, 0.2, 0.5, 3.0, 8.0, 27.0, 83.0, 620.0]),
    (RiskLevel::High, 16, &[1000.0, 130.0, 26.0, 9.0, 4.0, 2.0, 0.2, 0.2, 0.2, 0.2, 0.2, 2.0, 4.0, 9.0, 26.0, 130.0, 1000.0]),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_covers_all_rows() {
        let table = Paytable::standard().unwrap();
        for risk in RiskLevel::ALL {
            assert_eq!(table.rows_for(risk), (MIN_ROWS..=MAX_ROWS).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_standard_symmetric() {
        let table = Paytable::standard().unwrap();
        for entry in table.entries() {
            let m = &entry.multipliers;
            for i in 0..m.len() {
                assert_eq!(m[i], m[m.len() - 1 - i], "{}/{}", entry.risk, entry.rows);
            }
        }
    }

    #[test]
    fn test_payout_lookup() {
        let table = Paytable::standard().unwrap();
        assert_eq!(table.payout(RiskLevel::High, 16, 0).unwrap(), 1000.0);
        assert_eq!(table.payout(RiskLevel::Low, 8, 4).unwrap(), 0.5);
        assert!(matches!(
            table.payout(RiskLevel::Low, 8, 9),
            Err(PlinkoError::Validation(_))
        ));
        assert!(matches!(
            table.payout(RiskLevel::Low, 7, 0),
            Err(PlinkoError::Configuration(_))
        ));
    }

    #[test]
    fn test_rejects_asymmetric_table() {
        let err = Paytable::from_entries(vec![PaytableEntry {
            risk: RiskLevel::Low,
            rows: 2,
            multipliers: vec![2.0, 0.5, 1.9],
        }])
        .unwrap_err();
        assert!(matches!(err, PlinkoError::Configuration(_)));
    }

    #[test]
    fn test_rejects_wrong_length_and_duplicates() {
        let short = PaytableEntry {
            risk: RiskLevel::Low,
            rows: 3,
            multipliers: vec![2.0, 0.5, 2.0],
        };
        assert!(Paytable::from_entries(vec![short]).is_err());

        let ok = PaytableEntry {
            risk: RiskLevel::Low,
            rows: 2,
            multipliers: vec![2.0, 0.5, 2.0],
        };
        assert!(Paytable::from_entries(vec![ok.clone(), ok]).is_err());
    }

    #[test]
    fn test_json_goes_through_validation() {
        let json = r#"[{"risk":"high","rows":2,"multipliers":[3.0,0.1,3.0]}]"#;
        let table = Paytable::from_json(json).unwrap();
        assert_eq!(table.payout(RiskLevel::High, 2, 1).unwrap(), 0.1);

        let bad = r#"[{"risk":"high","rows":2,"multipliers":[3.0,0.1,2.0]}]"#;
        assert!(matches!(
            Paytable::from_json(bad),
            Err(PlinkoError::Configuration(_))
        ));
    }

    #[test]
    fn test_expected_return_below_one() {
        let table = Paytable::standard().unwrap();
        for risk in RiskLevel::ALL {
            for rows in MIN_ROWS..=MAX_ROWS {
                let rtp = table.expected_return(risk, rows).unwrap();
                assert!(rtp > 0.9 && rtp < 1.0, "{risk}/{rows} rtp {rtp}");
            }
        }
    }
}
