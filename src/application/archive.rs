//! Audit Archive
//!
//! Append-only record of every audited candidate, partitioned into a pass
//! file and a fail file. Each line is the candidate's wire record with the
//! verdict populated, so downstream consumers read the same shape the
//! discovery feed speaks.

use std::fs::{create_dir_all, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use crate::domain::candidate::{Candidate, CandidateRecord};

pub const PASS_FILE: &str = "audit_pass.jsonl";
pub const FAIL_FILE: &str = "audit_fail.jsonl";

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("failed to write archive record: {0}")]
    Write(#[from] std::io::Error),

    #[error("failed to serialize archive record: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Pass/fail audit archive rooted at a directory
pub struct AuditArchive {
    dir: PathBuf,
}

impl AuditArchive {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, ArchiveError> {
        let dir = dir.as_ref().to_path_buf();
        create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Append the candidate's wire record to the partition matching its
    /// verdict. A candidate without a verdict lands in the fail file.
    pub async fn record(&self, candidate: &Candidate) -> Result<(), ArchiveError> {
        let record = candidate.to_record().await;
        let success = record
            .verdict
            .as_ref()
            .map(|verdict| verdict.success)
            .unwrap_or(false);
        let file = if success { PASS_FILE } else { FAIL_FILE };
        let path = self.dir.join(file);
        let mut handle = OpenOptions::new().create(true).append(true).open(&path)?;
        serde_json::to_writer(&mut handle, &record)?;
        handle.write_all(b"\n")?;
        info!(id = %record.id, success, "audit outcome archived");
        Ok(())
    }

    /// Read back one partition, skipping lines that fail to parse.
    pub fn load(&self, passed: bool) -> Result<Vec<CandidateRecord>, ArchiveError> {
        let path = self.dir.join(if passed { PASS_FILE } else { FAIL_FILE });
        if !path.exists() {
            return Ok(Vec::new());
        }
        let contents = std::fs::read_to_string(path)?;
        Ok(contents
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::candidate::CandidateConfig;
    use crate::domain::verdict::{AuditVerdict, DeepScanOutcome, HeuristicOutcome};
    use ethers::types::Address;

    fn addr(byte: u8) -> Address {
        Address::from([byte; 20])
    }

    fn candidate(token: u8, verdict: Option<AuditVerdict>) -> Candidate {
        let mut candidate = Candidate::from_config(CandidateConfig {
            id: None,
            chain_id: 8453,
            new_token: addr(token),
            base_token: addr(0x22),
            pair_address: addr(0x33),
            v3: false,
            fee_tier: None,
            target_gain_bps: 2_500,
            rug_floor_thousandths: 1,
        });
        candidate.verdict = verdict;
        candidate
    }

    fn passing_verdict() -> AuditVerdict {
        AuditVerdict::combined(
            HeuristicOutcome {
                success: true,
                reputation: None,
                security: None,
                reason: None,
            },
            DeepScanOutcome::clean(),
        )
    }

    #[tokio::test]
    async fn test_records_partition_by_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let archive = AuditArchive::new(dir.path()).unwrap();

        archive
            .record(&candidate(1, Some(passing_verdict())))
            .await
            .unwrap();
        archive
            .record(&candidate(
                2,
                Some(AuditVerdict::short_circuit(HeuristicOutcome::failed(
                    "tax too high",
                ))),
            ))
            .await
            .unwrap();

        let passed = archive.load(true).unwrap();
        let failed = archive.load(false).unwrap();
        assert_eq!(passed.len(), 1);
        assert_eq!(failed.len(), 1);
        assert!(passed[0].verdict.as_ref().unwrap().success);
        assert_eq!(
            failed[0].verdict.as_ref().unwrap().reason.as_deref(),
            Some("tax too high")
        );
    }

    #[tokio::test]
    async fn test_appends_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        {
            let archive = AuditArchive::new(dir.path()).unwrap();
            archive
                .record(&candidate(1, Some(passing_verdict())))
                .await
                .unwrap();
        }
        let archive = AuditArchive::new(dir.path()).unwrap();
        archive
            .record(&candidate(2, Some(passing_verdict())))
            .await
            .unwrap();

        assert_eq!(archive.load(true).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_verdictless_candidate_counts_as_failed() {
        let dir = tempfile::tempdir().unwrap();
        let archive = AuditArchive::new(dir.path()).unwrap();

        archive.record(&candidate(1, None)).await.unwrap();

        assert!(archive.load(true).unwrap().is_empty());
        assert_eq!(archive.load(false).unwrap().len(), 1);
    }

    #[test]
    fn test_empty_archive_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let archive = AuditArchive::new(dir.path()).unwrap();
        assert!(archive.load(true).unwrap().is_empty());
        assert!(archive.load(false).unwrap().is_empty());
    }
}
