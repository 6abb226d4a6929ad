// crates/server/src/fasta.rs
//! RNA FASTA loading and sequence validation.
//!
//! Thin input glue in front of the pipelines: no state, no concurrency.
//! Validation reports are also served directly by the API.

use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FastaError {
    #[error("FASTA file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no sequences found in {path}")]
    Empty { path: PathBuf },
}

/// One named sequence from a FASTA file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastaSequence {
    pub name: String,
    pub sequence: String,
}

/// Validation report for one RNA sequence.
#[derive(Debug, Clone, Serialize)]
pub struct SequenceReport {
    pub name: String,
    pub length: usize,
    pub valid: bool,
    pub issues: Vec<String>,
    /// GC fraction over the valid bases, `0.0` for empty sequences.
    pub gc_content: f64,
}

/// Load and parse a FASTA file.
pub async fn load_fasta(path: &Path) -> Result<Vec<FastaSequence>, FastaError> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(FastaError::NotFound {
                path: path.to_path_buf(),
            })
        }
        Err(e) => {
            return Err(FastaError::Io {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };

    let sequences = parse_fasta(&contents);
    if sequences.is_empty() {
        return Err(FastaError::Empty {
            path: path.to_path_buf(),
        });
    }
    Ok(sequences)
}

/// Parse FASTA text. Headers start with `>`; sequence lines accumulate
/// until the next header. Leading sequence data without a header gets a
/// placeholder name.
pub fn parse_fasta(text: &str) -> Vec<FastaSequence> {
    let mut sequences = Vec::new();
    let mut name: Option<String> = None;
    let mut current = String::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(header) = line.strip_prefix('>') {
            // Close out the previous entry, if it accumulated anything.
            // A header with no sequence lines is dropped.
            if !current.is_empty() {
                sequences.push(FastaSequence {
                    name: name.take().unwrap_or_else(|| "unnamed".into()),
                    sequence: std::mem::take(&mut current),
                });
            }
            name = Some(header.trim().to_string());
        } else {
            current.push_str(&line.to_uppercase());
        }
    }
    if !current.is_empty() {
        sequences.push(FastaSequence {
            name: name.unwrap_or_else(|| "unnamed".into()),
            sequence: current,
        });
    }
    sequences
}

/// Validate an RNA sequence: alphabet check, DNA-style thymine warning,
/// and basic statistics.
pub fn validate_sequence(name: &str, sequence: &str) -> SequenceReport {
    let mut issues = Vec::new();

    if sequence.is_empty() {
        issues.push("sequence is empty".to_string());
    }

    let mut gc = 0usize;
    let mut thymine = 0usize;
    let mut invalid = Vec::new();
    for c in sequence.chars() {
        match c {
            'A' | 'U' => {}
            'G' | 'C' => gc += 1,
            'T' => thymine += 1,
            other => {
                if !invalid.contains(&other) {
                    invalid.push(other);
                }
            }
        }
    }

    if thymine > 0 {
        issues.push(format!(
            "contains {thymine} thymine base(s); looks like DNA, expected RNA (use U instead of T)"
        ));
    }
    if !invalid.is_empty() {
        let chars: String = invalid.iter().collect();
        issues.push(format!("invalid characters for RNA: {chars:?}"));
    }

    let gc_content = if sequence.is_empty() {
        0.0
    } else {
        gc as f64 / sequence.len() as f64
    };

    SequenceReport {
        name: name.to_string(),
        length: sequence.len(),
        valid: issues.is_empty(),
        issues,
        gc_content,
    }
}
