//! Verify command implementation.

use super::open_journal;
use jfile_core::{IntegrityPolicy, Journal, ReaderConfig};
use jfile_storage::ByteSource;
use std::path::Path;
use tracing::{info, warn};

/// Verification result.
#[derive(Debug, Default)]
pub struct VerifyResult {
    /// Number of entries checked.
    pub entries_checked: usize,
    /// Entries with no integrity issue.
    pub clean_entries: usize,
    /// Integrity issues, one line each.
    pub issues: Vec<String>,
    /// Structural errors, one line each.
    pub errors: Vec<String>,
}

impl VerifyResult {
    fn is_ok(&self) -> bool {
        self.issues.is_empty() && self.errors.is_empty()
    }
}

/// Runs the verify command.
pub fn run(path: &Path, strict: bool) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying journal at {}", path.display());
    println!();

    let policy = if strict {
        IntegrityPolicy::Strict
    } else {
        IntegrityPolicy::Report
    };
    let journal = open_journal(path, ReaderConfig::new().integrity(policy))?;
    let result = verify(&journal);
    print_result(&result);

    println!();
    if result.is_ok() {
        println!("✓ Journal verification passed");
        Ok(())
    } else {
        println!("✗ Journal verification failed");
        Err("Verification failed".into())
    }
}

/// Scans every object, checks the header counters, then walks every entry.
///
/// Under a strict policy the entry walk stops at the first failure.
pub fn verify<S: ByteSource>(journal: &Journal<S>) -> VerifyResult {
    let mut result = VerifyResult::default();

    match journal.stats() {
        Ok(stats) if !stats.matches_header() => result.errors.push(format!(
            "header counters disagree with scan: {} objects / {} entries in header, {} / {} found",
            stats.header_objects,
            stats.header_entries,
            stats.total() + stats.skipped_unknown,
            stats.count(jfile_core::ObjectType::Entry)
        )),
        Ok(_) => {}
        Err(e) => result.errors.push(format!("object scan: {}", e)),
    }
    info!(errors = result.errors.len(), "object scan checked");

    let strict = journal.config().is_strict();
    for record in journal.records() {
        result.entries_checked += 1;
        match record {
            Ok(record) if record.is_clean() => result.clean_entries += 1,
            Ok(record) => result.issues.extend(record.issues.iter().map(ToString::to_string)),
            Err(e) => {
                warn!(entry = result.entries_checked, error = %e, "entry walk failed");
                result.errors.push(e.to_string());
                if strict {
                    break;
                }
            }
        }
    }

    info!(
        entries = result.entries_checked,
        clean = result.clean_entries,
        issues = result.issues.len(),
        "entry walk finished"
    );
    result
}

fn print_result(result: &VerifyResult) {
    println!("  Entries checked: {}", result.entries_checked);
    println!("  Clean entries:   {}", result.clean_entries);

    if !result.issues.is_empty() {
        println!("  Integrity issues:");
        for issue in &result.issues {
            println!("    - {}", issue);
        }
    }

    if !result.errors.is_empty() {
        println!("  Errors:");
        for error in &result.errors {
            println!("    - {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jfile_testkit::{corrupt, open_memory, sample_journal};

    #[test]
    fn clean_journal_passes() {
        let journal = open_memory(sample_journal().bytes, ReaderConfig::default()).unwrap();
        let result = verify(&journal);
        assert!(result.is_ok());
        assert_eq!(result.entries_checked, 6);
        assert_eq!(result.clean_entries, 6);
    }

    #[test]
    fn reports_issues_and_errors() {
        let built = sample_journal();
        let mut bytes = built.bytes;
        corrupt::corrupt_entry_xor(&mut bytes, built.layout.entries[3]);
        let pages = &built.layout.entry_arrays;
        corrupt::link_entry_array(&mut bytes, pages[pages.len() - 1], pages[0]);

        let journal = open_memory(bytes.clone(), ReaderConfig::default()).unwrap();
        let result = verify(&journal);
        assert!(!result.is_ok());
        assert!(!result.issues.is_empty());
        assert!(result.errors.iter().any(|e| e.contains("cyclic link")));

        let strict = open_memory(bytes, ReaderConfig::new().strict()).unwrap();
        let result = verify(&strict);
        assert_eq!(result.entries_checked, 4);
        assert_eq!(result.clean_entries, 3);
        assert_eq!(result.errors.len(), 1);
    }

    #[derive(Clone, Default)]
    struct SharedBuf(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn progress_is_traced() {
        let buf = SharedBuf::default();
        let writer = buf.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        let journal = open_memory(sample_journal().bytes, ReaderConfig::default()).unwrap();
        tracing::subscriber::with_default(subscriber, || verify(&journal));

        let logs = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        assert!(logs.contains("entry walk finished"));
        assert!(logs.contains("entries=6"));
    }
}
