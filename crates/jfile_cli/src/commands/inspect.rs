//! Inspect command implementation.

use super::open_journal;
use jfile_core::{Journal, ObjectType, ReaderConfig, UnknownObjectPolicy};
use jfile_storage::ByteSource;
use serde::Serialize;
use std::path::Path;
use tracing::{debug, warn};

/// Journal inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Journal path.
    pub path: String,
    /// File size in bytes.
    pub file_size: u64,
    /// Header fields.
    pub header: HeaderInfo,
    /// Object scan results.
    pub objects: ObjectCounts,
}

/// Header fields worth showing.
#[derive(Debug, Serialize)]
pub struct HeaderInfo {
    /// Lifecycle state.
    pub state: String,
    /// Compatible flag bits.
    pub compatible_flags: u32,
    /// Incompatible flag bits.
    pub incompatible_flags: u32,
    /// Whether the file carries TAG objects.
    pub sealed: bool,
    /// File identifier.
    pub file_id: String,
    /// Machine identifier.
    pub machine_id: String,
    /// Boot identifier.
    pub boot_id: String,
    /// Sequence number namespace.
    pub seqnum_id: String,
    /// Declared header size.
    pub header_size: u64,
    /// Arena size.
    pub arena_size: u64,
    /// Number of objects.
    pub n_objects: u64,
    /// Number of entries.
    pub n_entries: u64,
    /// First entry sequence number.
    pub head_entry_seqnum: u64,
    /// Last entry sequence number.
    pub tail_entry_seqnum: u64,
    /// First entry realtime timestamp.
    pub head_entry_realtime: u64,
    /// Last entry realtime timestamp.
    pub tail_entry_realtime: u64,
    /// DATA count, absent for headers that predate it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n_data: Option<u64>,
    /// FIELD count, absent for headers that predate it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n_fields: Option<u64>,
    /// TAG count, absent for headers that predate it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n_tags: Option<u64>,
    /// ENTRY_ARRAY count, absent for headers that predate it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n_entry_arrays: Option<u64>,
}

/// Object counts from a linear scan.
#[derive(Debug, Serialize)]
pub struct ObjectCounts {
    /// Objects per type, in type-tag order.
    pub by_type: Vec<TypeCount>,
    /// Objects of unknown type stepped over.
    pub skipped_unknown: u64,
    /// Bytes covered by objects.
    pub bytes_used: u64,
    /// Whether the scan agrees with `n_objects` and `n_entries`.
    pub matches_header: bool,
    /// Scan error, if the scan stopped early.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Count for one object type.
#[derive(Debug, Serialize)]
pub struct TypeCount {
    /// Type name.
    pub object_type: String,
    /// Number of objects.
    pub count: u64,
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = ReaderConfig::new()
        .unknown_objects(UnknownObjectPolicy::Skip)
        .cache_objects(false);
    let journal = open_journal(path, config)?;
    let result = inspect(&journal, &path.display().to_string());

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

/// Collects header fields and object counts.
pub fn inspect<S: ByteSource>(journal: &Journal<S>, path: &str) -> InspectResult {
    let h = journal.header();
    let optional = |present: bool, value: u64| present.then_some(value);

    let header = HeaderInfo {
        state: h.state.to_string(),
        compatible_flags: h.compatible_flags.bits(),
        incompatible_flags: h.incompatible_flags.bits(),
        sealed: h.is_sealed(),
        file_id: h.file_id.simple().to_string(),
        machine_id: h.machine_id.simple().to_string(),
        boot_id: h.boot_id.simple().to_string(),
        seqnum_id: h.seqnum_id.simple().to_string(),
        header_size: h.header_size,
        arena_size: h.arena_size,
        n_objects: h.n_objects,
        n_entries: h.n_entries,
        head_entry_seqnum: h.head_entry_seqnum,
        tail_entry_seqnum: h.tail_entry_seqnum,
        head_entry_realtime: h.head_entry_realtime,
        tail_entry_realtime: h.tail_entry_realtime,
        n_data: optional(h.header_size > 208, h.n_data),
        n_fields: optional(h.header_size > 208, h.n_fields),
        n_tags: optional(h.header_size > 224, h.n_tags),
        n_entry_arrays: optional(h.header_size > 224, h.n_entry_arrays),
    };

    let objects = match journal.stats() {
        Ok(stats) => {
            if stats.skipped_unknown > 0 {
                debug!(skipped = stats.skipped_unknown, "stepped over unknown objects");
            }
            ObjectCounts {
                by_type: ObjectType::ALL
                    .iter()
                    .map(|&t| TypeCount {
                        object_type: t.to_string(),
                        count: stats.count(t),
                    })
                    .collect(),
                skipped_unknown: stats.skipped_unknown,
                bytes_used: stats.bytes_used,
                matches_header: stats.matches_header(),
                error: None,
            }
        }
        Err(e) => {
            warn!(error = %e, "object scan failed");
            ObjectCounts {
                by_type: Vec::new(),
                skipped_unknown: 0,
                bytes_used: 0,
                matches_header: false,
                error: Some(e.to_string()),
            }
        }
    };

    InspectResult {
        path: path.to_string(),
        file_size: journal.source_size(),
        header,
        objects,
    }
}

fn print_text_output(result: &InspectResult) {
    let h = &result.header;
    println!("Journal File Inspection");
    println!("=======================");
    println!();
    println!("Path:      {}", result.path);
    println!("File size: {}", format_size(result.file_size));
    println!();
    println!("Header:");
    println!("  State:              {}", h.state);
    println!("  Compatible flags:   {:#010x}", h.compatible_flags);
    println!("  Incompatible flags: {:#010x}", h.incompatible_flags);
    println!("  Sealed:             {}", if h.sealed { "yes" } else { "no" });
    println!("  File ID:            {}", h.file_id);
    println!("  Machine ID:         {}", h.machine_id);
    println!("  Boot ID:            {}", h.boot_id);
    println!("  Seqnum ID:          {}", h.seqnum_id);
    println!("  Header size:        {}", h.header_size);
    println!("  Arena size:         {}", h.arena_size);
    println!("  Objects:            {}", h.n_objects);
    println!("  Entries:            {}", h.n_entries);
    println!(
        "  Seqnums:            {} .. {}",
        h.head_entry_seqnum, h.tail_entry_seqnum
    );
    println!(
        "  Realtime:           {} .. {}",
        h.head_entry_realtime, h.tail_entry_realtime
    );
    for (label, value) in [
        ("Data objects:      ", h.n_data),
        ("Field objects:     ", h.n_fields),
        ("Tags:              ", h.n_tags),
        ("Entry arrays:      ", h.n_entry_arrays),
    ] {
        if let Some(value) = value {
            println!("  {label} {value}");
        }
    }

    println!();
    println!("Objects:");
    let o = &result.objects;
    if let Some(error) = &o.error {
        println!("  scan failed: {error}");
        return;
    }
    for count in &o.by_type {
        println!("  {:<18} {}", count.object_type, count.count);
    }
    if o.skipped_unknown > 0 {
        println!("  {:<18} {}", "(unknown)", o.skipped_unknown);
    }
    println!("  Bytes used:        {}", format_size(o.bytes_used));
    println!(
        "  Header counters:   {}",
        if o.matches_header { "consistent" } else { "MISMATCH" }
    );
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} bytes", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
