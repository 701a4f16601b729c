//! Dump objects command implementation.

use super::open_journal;
use jfile_core::{DecodedObject, Journal, Object, ReaderConfig, UnknownObjectPolicy};
use jfile_storage::ByteSource;
use serde::Serialize;
use std::path::Path;
use tracing::{debug, warn};

/// One physical object, for output.
#[derive(Debug, Serialize)]
pub struct ObjectInfo {
    /// Offset of the object header.
    pub offset: u64,
    /// Type name.
    pub object_type: String,
    /// Compression of a DATA payload, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compression: Option<String>,
    /// Declared size.
    pub size: u64,
    /// Bytes occupied, padding included.
    pub footprint: u64,
    /// Type-specific summary.
    pub detail: String,
}

impl ObjectInfo {
    fn from_decoded(decoded: &DecodedObject) -> Self {
        Self {
            offset: decoded.offset,
            object_type: decoded.object.object_type().to_string(),
            compression: decoded.header.flags.compression().map(|c| c.to_string()),
            size: decoded.header.size,
            footprint: decoded.footprint(),
            detail: describe(&decoded.object),
        }
    }
}

/// Runs the dump-objects command.
pub fn run(
    path: &Path,
    limit: Option<usize>,
    skip_unknown: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let policy = if skip_unknown {
        UnknownObjectPolicy::Skip
    } else {
        UnknownObjectPolicy::Abort
    };
    let config = ReaderConfig::new()
        .unknown_objects(policy)
        .cache_objects(false);
    let journal = open_journal(path, config)?;

    let (objects, error) = collect_objects(&journal, limit);
    println!("Objects ({} listed)", objects.len());
    println!("================");
    println!();
    for object in &objects {
        print!(
            "[{:010}] {:<16} size={:<6}",
            object.offset, object.object_type, object.size
        );
        if let Some(compression) = &object.compression {
            print!(" {}", compression);
        }
        println!(" {}", object.detail);
    }

    match error {
        Some(error) => {
            println!();
            println!("✗ Scan stopped: {}", error);
            Err("Object scan failed".into())
        }
        None => Ok(()),
    }
}

/// Scans objects in file order, up to `limit`. Returns the objects read and
/// the error that stopped the scan, if any.
pub fn collect_objects<S: ByteSource>(
    journal: &Journal<S>,
    limit: Option<usize>,
) -> (Vec<ObjectInfo>, Option<String>) {
    let mut objects = Vec::new();
    for decoded in journal.objects().take(limit.unwrap_or(usize::MAX)) {
        match decoded {
            Ok(decoded) => objects.push(ObjectInfo::from_decoded(&decoded)),
            Err(e) => {
                warn!(listed = objects.len(), error = %e, "object scan stopped");
                return (objects, Some(e.to_string()));
            }
        }
    }
    debug!(listed = objects.len(), "object scan finished");
    (objects, None)
}

fn describe(object: &Object) -> String {
    match object {
        Object::Unused { payload } => format!("len={}", payload.len()),
        Object::Data(d) => format!(
            "hash={:016x} entries={} payload={}",
            d.hash,
            d.n_entries,
            preview(&d.payload)
        ),
        Object::Field(f) => format!("hash={:016x} name={}", f.hash, preview(&f.payload)),
        Object::Entry(e) => format!(
            "seqnum={} realtime={} items={} xor={:016x}",
            e.seqnum,
            e.realtime,
            e.items.len(),
            e.xor_hash
        ),
        Object::DataHashTable(t) | Object::FieldHashTable(t) => {
            let used = t.items.iter().filter(|i| i.head_hash_offset != 0).count();
            format!("buckets={} used={}", t.items.len(), used)
        }
        Object::EntryArray(a) => {
            let used = a.items.iter().filter(|&&i| i != 0).count();
            format!(
                "items={}/{} next={}",
                used,
                a.items.len(),
                a.next_entry_array_offset
            )
        }
        Object::Tag(t) => format!("seqnum={} epoch={}", t.seqnum, t.epoch),
    }
}

fn preview(bytes: &[u8]) -> String {
    const MAX: usize = 48;
    let text = String::from_utf8_lossy(&bytes[..bytes.len().min(MAX)]).into_owned();
    if bytes.len() > MAX {
        format!("{text:?}...")
    } else {
        format!("{text:?}")
    }
}
