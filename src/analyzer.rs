//! Post-interval statistical outlier detection over the attempt log.
//!
//! Best-effort heuristic: false positives are accepted. Dispatches on the
//! `module` field of the first record, mirroring the three result shapes in
//! [`crate::attempt_log`].

use crate::attempt_log::{AttemptRecord, RecordShape};
use std::collections::{HashMap, HashSet};

/// Status strings that indicate the credential itself is valid, even though the
/// account cannot currently log in (e.g. it's disabled or must change password).
const SMB_POSITIVE_STATUSES: &[&str] = &[
    "STATUS_SUCCESS",
    "STATUS_ACCOUNT_DISABLED",
    "STATUS_PASSWORD_EXPIRED",
    "STATUS_PASSWORD_MUST_CHANGE",
];

/// Below this many surviving (non-timeout) HTTP responses, status-code-outlier
/// detection is suppressed: frequency-based outlier detection misfires on small
/// samples (spec.md §9 Open Question). Length-outlier detection is unaffected.
const MIN_SAMPLE_FOR_CODE_OUTLIERS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisResult {
    pub hit_count: usize,
    pub hits: HashSet<String>,
    /// True iff `hit_count` grew relative to the previous analysis — the sole
    /// trigger for emitting `CREDS_FOUND`.
    pub creds_found: bool,
}

pub struct Analyzer;

impl Analyzer {
    pub fn analyze(records: &[AttemptRecord], previous_hit_count: usize) -> AnalysisResult {
        let (hit_count, hits) = match records.first() {
            None => (0, HashSet::new()),
            Some(first) => match first.module.as_str() {
                "Office365" => Self::analyze_o365(records),
                "SMB" => Self::analyze_smb(records),
                _ => Self::analyze_http(records),
            },
        };

        AnalysisResult {
            hit_count,
            hits,
            creds_found: hit_count > previous_hit_count,
        }
    }

    fn analyze_o365(records: &[AttemptRecord]) -> (usize, HashSet<String>) {
        let mut hits = HashSet::new();
        for record in records {
            if let RecordShape::O365(fields) = &record.shape {
                if fields.result == "Success" {
                    hits.insert(record.username.clone());
                }
            }
        }
        (hits.len(), hits)
    }

    fn analyze_smb(records: &[AttemptRecord]) -> (usize, HashSet<String>) {
        let mut hits = HashSet::new();
        for record in records {
            if let RecordShape::Smb(fields) = &record.shape {
                if SMB_POSITIVE_STATUSES.contains(&fields.smb_login.as_str()) {
                    hits.insert(record.username.clone());
                }
            }
        }
        (hits.len(), hits)
    }

    fn analyze_http(records: &[AttemptRecord]) -> (usize, HashSet<String>) {
        let survivors: Vec<&AttemptRecord> = records
            .iter()
            .filter_map(|r| match &r.shape {
                RecordShape::Http(fields)
                    if !fields.response_code.is_timeout() && !fields.response_length.is_timeout() =>
                {
                    Some(r)
                }
                _ => None,
            })
            .collect();

        if survivors.is_empty() {
            return (0, HashSet::new());
        }

        let lengths: Vec<f64> = survivors
            .iter()
            .filter_map(|r| match &r.shape {
                RecordShape::Http(f) => f.response_length.as_value().map(|v| v as f64),
                _ => None,
            })
            .collect();

        let mean = lengths.iter().sum::<f64>() / lengths.len() as f64;
        let variance = lengths.iter().map(|l| (l - mean).powi(2)).sum::<f64>() / lengths.len() as f64;
        let stddev = variance.sqrt();

        let mut code_counts: HashMap<i64, usize> = HashMap::new();
        for r in &survivors {
            if let RecordShape::Http(f) = &r.shape {
                if let Some(code) = f.response_code.as_value() {
                    *code_counts.entry(code).or_insert(0) += 1;
                }
            }
        }
        let total = survivors.len();
        let suppress_code_outliers = total < MIN_SAMPLE_FOR_CODE_OUTLIERS;

        let mut hits = HashSet::new();
        for r in &survivors {
            let RecordShape::Http(f) = &r.shape else {
                continue;
            };
            let Some(length) = f.response_length.as_value() else {
                continue;
            };
            let Some(code) = f.response_code.as_value() else {
                continue;
            };

            let length_is_outlier = ((length as f64) - mean).abs() > 2.0 * stddev;
            let code_is_outlier = !suppress_code_outliers
                && (code_counts.get(&code).copied().unwrap_or(0) as f64 / total as f64) < 0.10;

            if length_is_outlier || code_is_outlier {
                hits.insert(r.username.clone());
            }
        }

        (hits.len(), hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attempt_log::{HttpFields, IntOrTimeout, O365Fields};

    fn http_record(user: &str, code: i64, length: i64) -> AttemptRecord {
        AttemptRecord::now(
            "ADFS",
            user,
            "pw",
            RecordShape::Http(HttpFields {
                response_code: IntOrTimeout::Value(code),
                response_length: IntOrTimeout::Value(length),
            }),
        )
    }

    #[test]
    fn http_length_outlier_flagged_and_creds_found_on_first_growth() {
        let mut records = Vec::new();
        for i in 0..15 {
            records.push(http_record(&format!("user{i}"), 200, 1000));
        }
        records.push(http_record("outlier1", 200, 100_000));
        records.push(http_record("outlier2", 200, 100_000));

        let result = Analyzer::analyze(&records, 0);
        assert_eq!(result.hit_count, 2);
        assert!(result.hits.contains("outlier1"));
        assert!(result.hits.contains("outlier2"));
        assert!(result.creds_found);
    }

    #[test]
    fn creds_found_only_when_hit_count_grows() {
        let mut records = Vec::new();
        for i in 0..15 {
            records.push(http_record(&format!("user{i}"), 200, 1000));
        }
        records.push(http_record("outlier1", 200, 100_000));
        records.push(http_record("outlier2", 200, 100_000));

        let result = Analyzer::analyze(&records, 2);
        assert_eq!(result.hit_count, 2);
        assert!(!result.creds_found);
    }

    #[test]
    fn timeouts_are_dropped_before_analysis() {
        let mut records = vec![http_record("a", 200, 1000)];
        records.push(AttemptRecord::now(
            "ADFS",
            "b",
            "pw",
            RecordShape::Http(HttpFields {
                response_code: IntOrTimeout::timeout(),
                response_length: IntOrTimeout::timeout(),
            }),
        ));
        let result = Analyzer::analyze(&records, 0);
        assert_eq!(result.hit_count, 0);
    }

    #[test]
    fn all_timeouts_yields_empty_result() {
        let records = vec![AttemptRecord::now(
            "ADFS",
            "a",
            "pw",
            RecordShape::Http(HttpFields {
                response_code: IntOrTimeout::timeout(),
                response_length: IntOrTimeout::timeout(),
            }),
        )];
        let result = Analyzer::analyze(&records, 0);
        assert_eq!(result.hit_count, 0);
        assert!(result.hits.is_empty());
    }

    #[test]
    fn o365_success_detection() {
        let records = vec![AttemptRecord::now(
            "Office365",
            "alice",
            "pw",
            RecordShape::O365(O365Fields {
                result: "Success".to_string(),
                message: "Valid login; no MFA".to_string(),
                response_code: IntOrTimeout::Value(200),
                response_length: IntOrTimeout::Value(50),
            }),
        )];
        let result = Analyzer::analyze(&records, 0);
        assert_eq!(result.hit_count, 1);
        assert!(result.hits.contains("alice"));
    }

    #[test]
    fn smb_status_table_flags_four_positive_codes() {
        for status in SMB_POSITIVE_STATUSES {
            let records = vec![AttemptRecord::now(
                "SMB",
                "alice",
                "pw",
                RecordShape::Smb(crate::attempt_log::SmbFields {
                    smb_login: status.to_string(),
                }),
            )];
            let result = Analyzer::analyze(&records, 0);
            assert_eq!(result.hit_count, 1, "status {status} should be a hit");
        }
    }

    #[test]
    fn small_sample_suppresses_code_outliers_but_not_length_outliers() {
        // 5 responses, one with a rare status code but unremarkable length: should NOT
        // be flagged since the sample is below the suppression threshold.
        let mut records = Vec::new();
        for _ in 0..4 {
            records.push(http_record("common", 200, 1000));
        }
        records.push(http_record("rare_code", 403, 1000));

        let result = Analyzer::analyze(&records, 0);
        assert_eq!(result.hit_count, 0);
    }
}
