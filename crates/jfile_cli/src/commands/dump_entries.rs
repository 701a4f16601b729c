//! Dump entries command implementation.

use super::open_journal;
use jfile_core::{Journal, LogRecord, ReaderConfig};
use jfile_storage::ByteSource;
use serde::Serialize;
use std::path::Path;
use tracing::warn;

/// One entry, for output.
#[derive(Debug, Serialize)]
pub struct EntryInfo {
    /// Offset of the ENTRY object.
    pub offset: u64,
    /// Sequence number.
    pub seqnum: u64,
    /// Wall-clock timestamp in microseconds.
    pub realtime: u64,
    /// Monotonic timestamp in microseconds.
    pub monotonic: u64,
    /// Boot identifier.
    pub boot_id: String,
    /// Fields in item order.
    pub fields: Vec<FieldInfo>,
    /// Integrity issues found while assembling.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<String>,
}

/// One field of an entry.
#[derive(Debug, Serialize)]
pub struct FieldInfo {
    /// Field name.
    pub name: String,
    /// Value, lossily decoded as UTF-8.
    pub value: String,
}

impl From<&LogRecord> for EntryInfo {
    fn from(record: &LogRecord) -> Self {
        Self {
            offset: record.offset,
            seqnum: record.seqnum,
            realtime: record.realtime,
            monotonic: record.monotonic,
            boot_id: record.boot_id.simple().to_string(),
            fields: record
                .fields
                .iter()
                .map(|f| FieldInfo {
                    name: f.name.clone(),
                    value: f.value_lossy().into_owned(),
                })
                .collect(),
            issues: record.issues.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Entries read, plus errors for entries that could not be decoded.
#[derive(Debug, Default, Serialize)]
pub struct EntryDump {
    /// Decoded entries.
    pub entries: Vec<EntryInfo>,
    /// Entry-level decode errors.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

/// Runs the dump-entries command.
pub fn run(
    path: &Path,
    limit: Option<usize>,
    strict: bool,
    verify_xor: bool,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = ReaderConfig::new().verify_xor(verify_xor);
    if strict {
        config = config.strict();
    }
    let journal = open_journal(path, config)?;
    let dump = collect_entries(&journal, limit, strict)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&dump)?);
        }
        _ => {
            print_text_output(&dump);
        }
    }

    Ok(())
}

/// Reads up to `limit` entries in entry-array order.
///
/// With `strict`, the first error is returned. Otherwise errors are
/// collected and the walk continues for as long as the entry-array chain
/// allows.
pub fn collect_entries<S: ByteSource>(
    journal: &Journal<S>,
    limit: Option<usize>,
    strict: bool,
) -> Result<EntryDump, Box<dyn std::error::Error>> {
    let mut dump = EntryDump::default();
    for record in journal.records().take(limit.unwrap_or(usize::MAX)) {
        match record {
            Ok(record) => dump.entries.push(EntryInfo::from(&record)),
            Err(e) if strict => return Err(e.into()),
            Err(e) => {
                warn!(error = %e, "entry could not be read");
                dump.errors.push(e.to_string());
            }
        }
    }
    Ok(dump)
}

fn print_text_output(dump: &EntryDump) {
    println!("Entries ({} total)", dump.entries.len());
    println!("================");

    for entry in &dump.entries {
        println!();
        println!(
            "[{:010}] seqnum={} realtime={} monotonic={} boot={}",
            entry.offset, entry.seqnum, entry.realtime, entry.monotonic, entry.boot_id
        );
        for field in &entry.fields {
            println!("    {}={}", field.name, field.value);
        }
        for issue in &entry.issues {
            println!("    ! {}", issue);
        }
    }

    if !dump.errors.is_empty() {
        println!();
        println!("Errors:");
        for error in &dump.errors {
            println!("  ✗ {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jfile_testkit::{corrupt, open_memory, sample_journal};

    #[test]
    fn dumps_fields_in_order() {
        let journal = open_memory(sample_journal().bytes, ReaderConfig::default()).unwrap();
        let dump = collect_entries(&journal, Some(2), false).unwrap();

        assert_eq!(dump.entries.len(), 2);
        assert!(dump.errors.is_empty());
        let first = &dump.entries[0];
        assert_eq!(first.seqnum, 1);
        assert_eq!(first.fields[0].name, "MESSAGE");
        assert_eq!(first.fields[0].value, "Started Daemon");
        assert_eq!(first.boot_id.len(), 32);
    }

    #[test]
    fn issues_follow_the_policy() {
        let built = sample_journal();
        let mut bytes = built.bytes;
        corrupt::corrupt_entry_xor(&mut bytes, built.layout.entries[0]);

        let lenient = open_memory(bytes.clone(), ReaderConfig::default()).unwrap();
        let dump = collect_entries(&lenient, None, false).unwrap();
        assert_eq!(dump.entries.len(), 6);
        assert_eq!(dump.entries[0].issues.len(), 1);

        let json = serde_json::to_value(&dump).unwrap();
        assert!(json["entries"][1].get("issues").is_none());

        let strict = open_memory(bytes, ReaderConfig::new().strict()).unwrap();
        let err = collect_entries(&strict, None, true).unwrap_err();
        assert!(err.to_string().contains("xor hash"));
    }
}
