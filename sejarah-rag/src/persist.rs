//! On-disk layout of a persisted [`VectorIndex`](crate::VectorIndex).
//!
//! An index lives in its own directory. Each write produces a new generation
//! subdirectory holding two artifacts that share the base name `index`, and
//! a `CURRENT` file names the live generation:
//!
//! ```text
//! vector_db/
//!   CURRENT              "gen-<uuid>"
//!   gen-<uuid>/index.vec binary header followed by little-endian f32 rows
//!   gen-<uuid>/index.json model id, dimension, count and chunks in index order
//! ```
//!
//! A generation directory is complete and fsynced before `CURRENT` is
//! replaced by a rename, and is never modified afterwards. Readers resolve
//! `CURRENT` once and open both artifacts from that one directory, so they
//! see a whole generation and never a mix. Superseded generations are
//! pruned after the switch; a reader whose generation was pruned under it
//! resolves `CURRENT` again.
//!
//! Header of `index.vec` (all integers little-endian):
//!
//! ```text
//! magic "SJVI" | version u32 | dimension u32 | count u64 | generation [u8; 16]
//! ```

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::document::Chunk;
use crate::embedding::is_unit;
use crate::error::{RagError, Result};
use crate::flat::FlatIndex;
use crate::store::ChunkStore;

/// File name of the binary vector artifact.
pub const VECTOR_FILE: &str = "index.vec";

/// File name of the structured metadata artifact.
pub const METADATA_FILE: &str = "index.json";

/// File naming the live generation directory.
pub const POINTER_FILE: &str = "CURRENT";

const GENERATION_PREFIX: &str = "gen-";
const MAGIC: &[u8; 4] = b"SJVI";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 4 + 8 + 16;
const INDEX_TYPE: &str = "flat-inner-product";

/// How many times a reader re-resolves `CURRENT` after losing its
/// generation to a concurrent write.
const MAX_READ_ATTEMPTS: usize = 8;

/// Contents of `index.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexMetadata {
    /// Layout version, currently 1.
    pub format_version: u32,
    /// Shared with the header of `index.vec` and the directory name.
    pub generation: Uuid,
    /// Embedding model the vectors were produced with.
    pub model: String,
    /// Components per vector.
    pub dimension: usize,
    /// Number of chunks and vectors.
    pub count: usize,
    /// Search structure the vectors are meant for.
    pub index_type: String,
    /// When the artifacts were written.
    pub created_at: DateTime<Utc>,
    /// Chunks in index order.
    pub chunks: Vec<Chunk>,
}

/// Serialized artifacts ready to be written.
#[derive(Debug)]
pub(crate) struct Artifacts {
    generation: Uuid,
    vectors: Vec<u8>,
    metadata: Vec<u8>,
}

/// A validated index read back from disk.
#[derive(Debug)]
pub(crate) struct Restored {
    pub model: String,
    pub chunks: ChunkStore,
    pub vectors: FlatIndex,
}

/// Serialize chunks and vectors into the two artifacts.
pub(crate) fn encode(model: &str, vectors: &FlatIndex, chunks: &[Chunk]) -> Result<Artifacts> {
    let generation = Uuid::new_v4();
    let count = chunks.len();
    let dimension = u32::try_from(vectors.dimension()).map_err(|_| {
        RagError::ConfigError(format!("dimension {} does not fit the index format", vectors.dimension()))
    })?;

    let mut vector_bytes = Vec::with_capacity(HEADER_LEN + std::mem::size_of_val(vectors.as_raw()));
    vector_bytes.extend_from_slice(MAGIC);
    vector_bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    vector_bytes.extend_from_slice(&dimension.to_le_bytes());
    vector_bytes.extend_from_slice(&(count as u64).to_le_bytes());
    vector_bytes.extend_from_slice(generation.as_bytes());
    for &value in vectors.as_raw() {
        vector_bytes.extend_from_slice(&value.to_le_bytes());
    }

    let metadata = IndexMetadata {
        format_version: FORMAT_VERSION,
        generation,
        model: model.to_string(),
        dimension: vectors.dimension(),
        count,
        index_type: INDEX_TYPE.to_string(),
        created_at: Utc::now(),
        chunks: chunks.to_vec(),
    };
    let metadata = serde_json::to_vec_pretty(&metadata)
        .map_err(|e| RagError::ConfigError(format!("failed to serialize index metadata: {e}")))?;

    Ok(Artifacts { generation, vectors: vector_bytes, metadata })
}

fn generation_name(generation: Uuid) -> String {
    format!("{GENERATION_PREFIX}{}", generation.simple())
}

/// Write `artifacts` as a new generation of the index at `target` and make
/// it the live one.
///
/// Assumes one writer per directory at a time. Blocking; call from
/// `spawn_blocking` in async code.
pub(crate) fn write_atomic(target: &Path, artifacts: &Artifacts) -> Result<()> {
    fs::create_dir_all(target).map_err(|e| RagError::io(target, e))?;

    let name = generation_name(artifacts.generation);
    let generation_dir = target.join(&name);
    fs::create_dir(&generation_dir).map_err(|e| RagError::io(&generation_dir, e))?;

    if let Err(e) = stage(&generation_dir, artifacts).and_then(|()| publish(target, &name)) {
        if let Err(cleanup) = fs::remove_dir_all(&generation_dir) {
            warn!(path = %generation_dir.display(), error = %cleanup, "failed to clean up unpublished generation");
        }
        return Err(e);
    }

    prune(target, &name);
    Ok(())
}

fn stage(generation_dir: &Path, artifacts: &Artifacts) -> Result<()> {
    write_synced(&generation_dir.join(VECTOR_FILE), &artifacts.vectors)?;
    write_synced(&generation_dir.join(METADATA_FILE), &artifacts.metadata)?;
    sync_dir(generation_dir);
    Ok(())
}

/// Point `CURRENT` at `name`. The rename is the commit point.
fn publish(target: &Path, name: &str) -> Result<()> {
    let pending = target.join(format!(".{POINTER_FILE}.{name}"));
    let pointer = target.join(POINTER_FILE);

    let result = write_synced(&pending, format!("{name}\n").as_bytes())
        .and_then(|()| fs::rename(&pending, &pointer).map_err(|e| RagError::io(&pointer, e)));
    if result.is_err() && pending.exists() {
        if let Err(e) = fs::remove_file(&pending) {
            warn!(path = %pending.display(), error = %e, "failed to remove pending pointer");
        }
    }
    result?;
    sync_dir(target);
    Ok(())
}

/// Remove generations other than `live` and pointer files left by
/// interrupted writes.
fn prune(target: &Path, live: &str) {
    let entries = match fs::read_dir(target) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(path = %target.display(), error = %e, "cannot list index directory for pruning");
            return;
        }
    };
    let pending_prefix = format!(".{POINTER_FILE}.");

    for entry in entries.flatten() {
        let file_name = entry.file_name();
        let file_name = file_name.to_string_lossy();
        let stale_generation = file_name.starts_with(GENERATION_PREFIX) && file_name != live;
        if !stale_generation && !file_name.starts_with(&pending_prefix) {
            continue;
        }

        let path = entry.path();
        let removed = if path.is_dir() { fs::remove_dir_all(&path) } else { fs::remove_file(&path) };
        match removed {
            Ok(()) => debug!(path = %path.display(), "pruned stale index entry"),
            Err(e) => warn!(path = %path.display(), error = %e, "failed to prune stale index entry"),
        }
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = fs::File::create(path).map_err(|e| RagError::io(path, e))?;
    file.write_all(bytes).map_err(|e| RagError::io(path, e))?;
    file.sync_all().map_err(|e| RagError::io(path, e))
}

#[cfg(unix)]
fn sync_dir(dir: &Path) {
    if let Err(e) = fs::File::open(dir).and_then(|d| d.sync_all()) {
        debug!(path = %dir.display(), error = %e, "directory fsync failed");
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}

/// Resolve the live generation directory of the index at `dir`.
///
/// # Errors
///
/// - [`RagError::NotFound`] if `dir` or its `CURRENT` file does not exist
/// - [`RagError::Corrupt`] if `CURRENT` does not name a generation
pub fn current_generation(dir: &Path) -> Result<PathBuf> {
    let pointer = dir.join(POINTER_FILE);
    let contents = match fs::read_to_string(&pointer) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(RagError::NotFound { path: dir.to_path_buf() });
        }
        Err(e) => return Err(RagError::corrupt(&pointer, format!("unreadable pointer: {e}"))),
    };

    let name = contents.trim();
    let valid = name
        .strip_prefix(GENERATION_PREFIX)
        .is_some_and(|id| id.len() == 32 && Uuid::try_parse(id).is_ok());
    if !valid {
        return Err(RagError::corrupt(&pointer, format!("'{name}' is not a generation name")));
    }
    Ok(dir.join(name))
}

/// Open an artifact, mapping "absent" to `None`.
fn open_artifact(path: &Path) -> Result<Option<fs::File>> {
    match fs::File::open(path) {
        Ok(file) => Ok(Some(file)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(RagError::corrupt(path, format!("unreadable artifact: {e}"))),
    }
}

fn read_open(path: &Path, mut file: fs::File) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)
        .map_err(|e| RagError::corrupt(path, format!("unreadable artifact: {e}")))?;
    Ok(bytes)
}

/// Read and validate the live generation of the index at `dir`.
///
/// Blocking; call from `spawn_blocking` in async code.
pub(crate) fn read(dir: &Path) -> Result<Restored> {
    let mut attempt = 1;
    loop {
        let generation_dir = current_generation(dir)?;
        let vector_path = generation_dir.join(VECTOR_FILE);
        let metadata_path = generation_dir.join(METADATA_FILE);

        // Both handles are opened before either is read, so pruning the
        // directory afterwards does not affect this read.
        let missing = match (open_artifact(&vector_path)?, open_artifact(&metadata_path)?) {
            (Some(vectors), Some(metadata)) => {
                let vector_bytes = read_open(&vector_path, vectors)?;
                let metadata_bytes = read_open(&metadata_path, metadata)?;
                return decode(&generation_dir, &vector_path, &vector_bytes, &metadata_path, &metadata_bytes);
            }
            (None, None) => RagError::corrupt(&generation_dir, "live generation has no artifacts"),
            (None, Some(_)) => RagError::corrupt(&vector_path, "vector artifact is missing"),
            (Some(_), None) => RagError::corrupt(&metadata_path, "metadata artifact is missing"),
        };

        if attempt < MAX_READ_ATTEMPTS && current_generation(dir)? != generation_dir {
            debug!(path = %dir.display(), attempt, "generation replaced during read, retrying");
            attempt += 1;
            continue;
        }
        return Err(missing);
    }
}

fn decode(
    generation_dir: &Path,
    vector_path: &Path,
    vector_bytes: &[u8],
    metadata_path: &Path,
    metadata_bytes: &[u8],
) -> Result<Restored> {
    let metadata: IndexMetadata = serde_json::from_slice(metadata_bytes)
        .map_err(|e| RagError::corrupt(metadata_path, format!("malformed metadata: {e}")))?;
    if metadata.format_version != FORMAT_VERSION {
        return Err(RagError::corrupt(
            metadata_path,
            format!("unsupported format version {}", metadata.format_version),
        ));
    }

    let header = decode_header(vector_path, vector_bytes)?;
    if header.generation != metadata.generation {
        return Err(RagError::corrupt(generation_dir, "artifacts belong to different generations"));
    }
    if header.dimension != metadata.dimension {
        return Err(RagError::corrupt(
            generation_dir,
            format!("dimension mismatch: vectors {} vs metadata {}", header.dimension, metadata.dimension),
        ));
    }
    if header.count != metadata.count || metadata.count != metadata.chunks.len() {
        return Err(RagError::corrupt(
            generation_dir,
            format!(
                "count mismatch: vectors {}, metadata {}, chunks {}",
                header.count,
                metadata.count,
                metadata.chunks.len()
            ),
        ));
    }
    if metadata.count == 0 || metadata.dimension == 0 {
        return Err(RagError::corrupt(generation_dir, "index holds no vectors"));
    }

    let vectors = decode_rows(vector_path, &vector_bytes[HEADER_LEN..], header.dimension, header.count)?;
    let chunks = ChunkStore::from_chunks(metadata.chunks)
        .map_err(|e| RagError::corrupt(metadata_path, format!("invalid chunk: {e}")))?;

    Ok(Restored { model: metadata.model, chunks, vectors })
}

struct Header {
    dimension: usize,
    count: usize,
    generation: Uuid,
}

fn decode_header(path: &Path, bytes: &[u8]) -> Result<Header> {
    if bytes.len() < HEADER_LEN {
        return Err(RagError::corrupt(path, "vector artifact is truncated"));
    }
    if &bytes[0..4] != MAGIC {
        return Err(RagError::corrupt(path, "not a vector index file"));
    }
    let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    if version != FORMAT_VERSION {
        return Err(RagError::corrupt(path, format!("unsupported format version {version}")));
    }
    let dimension = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
    let mut count_bytes = [0u8; 8];
    count_bytes.copy_from_slice(&bytes[12..20]);
    let count = usize::try_from(u64::from_le_bytes(count_bytes))
        .map_err(|_| RagError::corrupt(path, "vector count overflows"))?;
    let mut generation = [0u8; 16];
    generation.copy_from_slice(&bytes[20..36]);

    Ok(Header { dimension, count, generation: Uuid::from_bytes(generation) })
}

fn decode_rows(path: &Path, body: &[u8], dimension: usize, count: usize) -> Result<FlatIndex> {
    let expected = count
        .checked_mul(dimension)
        .and_then(|n| n.checked_mul(std::mem::size_of::<f32>()))
        .ok_or_else(|| RagError::corrupt(path, "vector body length overflows"))?;
    if body.len() != expected {
        return Err(RagError::corrupt(
            path,
            format!("vector body is {} bytes, expected {expected}", body.len()),
        ));
    }

    let data: Vec<f32> = body
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    let vectors = FlatIndex::from_raw(dimension, data)
        .map_err(|e| RagError::corrupt(path, e.to_string()))?;

    if let Some(position) = vectors.rows().position(|row| !row.iter().all(|x| x.is_finite()) || !is_unit(row)) {
        return Err(RagError::corrupt(path, format!("vector {position} is not a finite unit vector")));
    }
    Ok(vectors)
}
