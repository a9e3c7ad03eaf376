// Confusion Example Corpus
//
// Concept: Curated historical misclassifications fed into the escalation
// prompt. The corpus is a typed, validated artifact loaded once at startup:
// a built-in set ships with the binary, and an operator TOML file may
// replace it. A file that fails validation is a startup error, not a silent
// empty corpus.

use crate::spine::types::{DocType, LEGACY_TRAILING_TWELVE};
use serde::{Deserialize, Serialize};
use std::path::Path;
use udx_common::{Error, Result};

/// One historical misclassification worth warning the model about
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfusionExample {
    /// Short representative excerpt of the misread document
    pub snippet: String,
    /// The label it was wrongly given (free text; legacy labels allowed here)
    pub wrong_type: String,
    /// The label it should have received (must be a valid type)
    pub correct_type: String,
    /// Why the confusion happens
    pub note: String,
}

#[derive(Debug, Deserialize)]
struct CorpusFile {
    #[serde(default)]
    example: Vec<ConfusionExample>,
}

/// The validated example corpus
#[derive(Debug)]
pub struct ExampleCorpus {
    examples: Vec<ConfusionExample>,
}

impl Default for ExampleCorpus {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ExampleCorpus {
    /// The built-in curated set
    pub fn builtin() -> Self {
        let examples = vec![
            ConfusionExample {
                snippet: "T12 Operating Statement - Riverside Apartments".to_string(),
                wrong_type: "T12".to_string(),
                correct_type: "INCOME_STATEMENT".to_string(),
                note: "trailing-twelve operating statements are income statements".to_string(),
            },
            ConfusionExample {
                snippet: "Schedule K-1 (Form 1065) Partner's Share of Income".to_string(),
                wrong_type: "IRS_PARTNERSHIP".to_string(),
                correct_type: "SCHEDULE_K1".to_string(),
                note: "a K-1 cites its parent return's form number".to_string(),
            },
            ConfusionExample {
                snippet: "Personal Financial Statement / Total Assets / Net Worth".to_string(),
                wrong_type: "BALANCE_SHEET".to_string(),
                correct_type: "PERSONAL_FINANCIAL_STATEMENT".to_string(),
                note: "individual assets and net worth, not a business balance sheet".to_string(),
            },
            ConfusionExample {
                snippet: "Rent Roll / Unit 101 / Monthly Rent 1,200".to_string(),
                wrong_type: "INCOME_STATEMENT".to_string(),
                correct_type: "RENT_ROLL".to_string(),
                note: "per-unit listings are rent rolls even when totals appear".to_string(),
            },
            ConfusionExample {
                snippet: "Account Statement / Beginning Balance / Deposits".to_string(),
                wrong_type: "INCOME_STATEMENT".to_string(),
                correct_type: "BANK_STATEMENT".to_string(),
                note: "transaction logs with running balances are bank statements".to_string(),
            },
        ];

        Self { examples }
    }

    /// Load an operator-provided corpus, replacing the built-in set
    ///
    /// Any read, parse, or validation failure is returned as a configuration
    /// error naming the file.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "failed to read confusion example corpus at {}: {}",
                path.display(),
                e
            ))
        })?;

        let file: CorpusFile = toml::from_str(&raw).map_err(|e| {
            Error::Config(format!(
                "malformed confusion example corpus at {}: {}",
                path.display(),
                e
            ))
        })?;

        validate(&file.example).map_err(|e| {
            Error::Config(format!(
                "invalid confusion example corpus at {}: {}",
                path.display(),
                e
            ))
        })?;

        Ok(Self {
            examples: file.example,
        })
    }

    pub fn examples(&self) -> &[ConfusionExample] {
        &self.examples
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }
}

/// Entry-level validation; returns a plain message, callers add file context
fn validate(examples: &[ConfusionExample]) -> std::result::Result<(), String> {
    for (idx, ex) in examples.iter().enumerate() {
        if ex.snippet.trim().is_empty() {
            return Err(format!("example {} has an empty snippet", idx));
        }
        let correct = ex.correct_type.trim().to_uppercase();
        if correct == LEGACY_TRAILING_TWELVE {
            return Err(format!(
                "example {} uses the banned legacy label {} as correct_type",
                idx, LEGACY_TRAILING_TWELVE
            ));
        }
        if DocType::parse(&correct).is_none() {
            return Err(format!(
                "example {} has unrecognized correct_type \"{}\"",
                idx, ex.correct_type
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_builtin_corpus_is_valid_and_nonempty() {
        let corpus = ExampleCorpus::builtin();
        assert!(!corpus.is_empty());
        assert!(validate(corpus.examples()).is_ok());
    }

    #[test]
    fn test_operator_file_round_trip() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[[example]]
snippet = "Debt Schedule / Creditor / Monthly Payment"
wrong_type = "BALANCE_SHEET"
correct_type = "DEBT_SCHEDULE"
note = "per-creditor listings are debt schedules"
"#
        )
        .unwrap();

        let corpus = ExampleCorpus::from_toml_file(file.path()).unwrap();
        assert_eq!(corpus.len(), 1);
        assert_eq!(corpus.examples()[0].correct_type, "DEBT_SCHEDULE");
    }

    #[test]
    fn test_unrecognized_correct_type_is_loud() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[[example]]
snippet = "something"
wrong_type = "OTHER"
correct_type = "NOT_A_TYPE"
note = "n"
"#
        )
        .unwrap();

        let err = ExampleCorpus::from_toml_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("NOT_A_TYPE"));
    }

    #[test]
    fn test_banned_label_rejected_as_correct_type() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[[example]]
snippet = "T12 statement"
wrong_type = "OTHER"
correct_type = "T12"
note = "n"
"#
        )
        .unwrap();

        let err = ExampleCorpus::from_toml_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("banned"));
    }

    #[test]
    fn test_missing_file_is_loud() {
        let err =
            ExampleCorpus::from_toml_file(Path::new("/nonexistent/corpus.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/corpus.toml"));
    }
}
