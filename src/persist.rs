//! Binary container for a built graph.
//!
//! Layout (little endian): magic, version, then a checksummed payload holding
//! the bincode-encoded [`GraphConfig`], dimension, vector count, entry point,
//! vectors, labels and every node's base and robust lists, followed by the
//! CRC32 of the payload.

use std::convert::TryFrom;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crc32fast::Hasher;
use tracing::info;

use crate::config::GraphConfig;
use crate::graph::{AcornIndex, Node};
use crate::store::VectorStore;
use crate::AcornError;

const PERSIST_MAGIC: [u8; 4] = *b"ACG1";
const PERSIST_VERSION: u32 = 1;

/// Upper bound on speculative pre-allocation while decoding untrusted sizes.
const MAX_PREALLOC: usize = 1 << 20;

/// Largest vector dimension accepted from a persisted header.
const MAX_DIM: usize = 1 << 16;

fn write_u32<W: Write>(writer: &mut W, value: u32, hasher: Option<&mut Hasher>) -> io::Result<()> {
    let bytes = value.to_le_bytes();
    if let Some(h) = hasher {
        h.update(&bytes);
    }
    writer.write_all(&bytes)
}

fn write_u64<W: Write>(writer: &mut W, value: u64, hasher: Option<&mut Hasher>) -> io::Result<()> {
    let bytes = value.to_le_bytes();
    if let Some(h) = hasher {
        h.update(&bytes);
    }
    writer.write_all(&bytes)
}

fn write_hashed<W: Write>(writer: &mut W, bytes: &[u8], hasher: &mut Hasher) -> io::Result<()> {
    hasher.update(bytes);
    writer.write_all(bytes)
}

fn read_u32<R: Read>(reader: &mut R, hasher: Option<&mut Hasher>) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    if let Some(h) = hasher {
        h.update(&buf);
    }
    Ok(u32::from_le_bytes(buf))
}

fn read_u64<R: Read>(reader: &mut R, hasher: Option<&mut Hasher>) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    if let Some(h) = hasher {
        h.update(&buf);
    }
    Ok(u64::from_le_bytes(buf))
}

fn read_hashed<R: Read>(reader: &mut R, buf: &mut [u8], hasher: &mut Hasher) -> io::Result<()> {
    reader.read_exact(buf)?;
    hasher.update(buf);
    Ok(())
}

fn usize_from_u64(value: u64) -> Result<usize, AcornError> {
    usize::try_from(value)
        .map_err(|_| AcornError::InvalidPersistence("value exceeds platform limits"))
}

fn u32_from_usize(value: usize, what: &'static str) -> Result<u32, AcornError> {
    u32::try_from(value).map_err(|_| AcornError::InvalidPersistence(what))
}

fn write_id_list<W: Write>(
    writer: &mut W,
    ids: &[u32],
    hasher: &mut Hasher,
) -> Result<(), AcornError> {
    let len = u32_from_usize(ids.len(), "neighbor list exceeds persistence limits")?;
    write_u32(writer, len, Some(&mut *hasher))?;
    for &id in ids {
        write_u32(writer, id, Some(&mut *hasher))?;
    }
    Ok(())
}

fn read_id_list<R: Read>(
    reader: &mut R,
    bound: usize,
    hasher: &mut Hasher,
) -> Result<Vec<u32>, AcornError> {
    let len = read_u32(reader, Some(&mut *hasher))? as usize;
    if len > bound {
        return Err(AcornError::InvalidPersistence(
            "neighbor list exceeds degree bound",
        ));
    }
    let mut ids = Vec::with_capacity(len);
    for _ in 0..len {
        ids.push(read_u32(reader, Some(&mut *hasher))?);
    }
    Ok(ids)
}

/// `<path>.tmp`, the staging file replaced into `path` on success.
fn staging_path(path: &Path) -> PathBuf {
    let mut staged: OsString = path.as_os_str().to_owned();
    staged.push(".tmp");
    PathBuf::from(staged)
}

fn validate_node(node: &Node, id: usize, count: usize) -> Result<(), AcornError> {
    for &neighbor in node.base.iter().chain(node.robust.iter()) {
        let neighbor = neighbor as usize;
        if neighbor >= count {
            return Err(AcornError::InvalidPersistence(
                "neighbor identifier out of range",
            ));
        }
        if neighbor == id {
            return Err(AcornError::InvalidPersistence("node links to itself"));
        }
    }
    if node.base.iter().any(|id| node.robust.contains(id)) {
        return Err(AcornError::InvalidPersistence(
            "base and robust lists overlap",
        ));
    }
    Ok(())
}

impl AcornIndex {
    /// Persist the index to `path`.
    ///
    /// Bytes go to `<path>.tmp` first and are renamed over `path` once fully
    /// written, so a failed save leaves any previous file untouched.
    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<(), AcornError> {
        let path = path.as_ref();
        let staged = staging_path(path);
        if let Err(err) = self.write_staged(&staged) {
            let _ = fs::remove_file(&staged);
            return Err(err);
        }
        fs::rename(&staged, path)?;
        info!(path = %path.display(), vectors = self.len(), "saved index");
        Ok(())
    }

    fn write_staged(&self, staged: &Path) -> Result<(), AcornError> {
        let mut file = File::create(staged)?;
        self.save_to_writer(&mut file)?;
        file.sync_all()?;
        Ok(())
    }

    /// Persist the index using the supplied writer.
    pub fn save_to_writer<W: Write>(&self, writer: W) -> Result<(), AcornError> {
        let mut writer = BufWriter::new(writer);
        writer.write_all(&PERSIST_MAGIC)?;
        write_u32(&mut writer, PERSIST_VERSION, None)?;

        let mut hasher = Hasher::new();

        let config_bytes = bincode::serialize(self.config())
            .map_err(|_| AcornError::InvalidPersistence("failed to encode graph configuration"))?;
        write_u64(&mut writer, config_bytes.len() as u64, Some(&mut hasher))?;
        write_hashed(&mut writer, &config_bytes, &mut hasher)?;

        let dim = u32_from_usize(self.dim(), "dimension exceeds persistence limits")?;
        write_u32(&mut writer, dim, Some(&mut hasher))?;
        write_u64(&mut writer, self.len() as u64, Some(&mut hasher))?;
        write_u32(&mut writer, self.entry_point() as u32, Some(&mut hasher))?;

        let store = self.store();
        for value in store.raw_data() {
            write_hashed(&mut writer, &value.to_le_bytes(), &mut hasher)?;
        }
        for &label in store.labels() {
            write_u32(&mut writer, label, Some(&mut hasher))?;
        }

        for node in self.nodes() {
            write_id_list(&mut writer, &node.base, &mut hasher)?;
            write_id_list(&mut writer, &node.robust, &mut hasher)?;
        }

        let checksum = hasher.finalize();
        write_u32(&mut writer, checksum, None)?;

        writer.flush()?;
        Ok(())
    }

    /// Load an index from the provided filesystem path.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, AcornError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let index = Self::load_from_reader(BufReader::new(file))?;
        info!(
            path = %path.display(),
            vectors = index.len(),
            dim = index.dim(),
            "loaded index"
        );
        Ok(index)
    }

    /// Load an index from a persisted byte stream.
    pub fn load_from_reader<R: Read>(reader: R) -> Result<Self, AcornError> {
        let mut reader = BufReader::new(reader);
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if magic != PERSIST_MAGIC {
            return Err(AcornError::InvalidPersistence("unrecognized file header"));
        }

        let version = read_u32(&mut reader, None)?;
        if version != PERSIST_VERSION {
            return Err(AcornError::InvalidPersistence(
                "unsupported index format version",
            ));
        }

        let mut hasher = Hasher::new();

        let config_len = usize_from_u64(read_u64(&mut reader, Some(&mut hasher))?)?;
        if config_len > MAX_PREALLOC {
            return Err(AcornError::InvalidPersistence(
                "graph configuration block too large",
            ));
        }
        let mut config_bytes = vec![0u8; config_len];
        read_hashed(&mut reader, &mut config_bytes, &mut hasher)?;
        let config: GraphConfig = bincode::deserialize(&config_bytes)
            .map_err(|_| AcornError::InvalidPersistence("failed to decode graph configuration"))?;
        config
            .validate()
            .map_err(|_| AcornError::InvalidPersistence("invalid graph configuration"))?;

        let dim = read_u32(&mut reader, Some(&mut hasher))? as usize;
        if dim == 0 {
            return Err(AcornError::InvalidPersistence("dimension must be positive"));
        }
        if dim > MAX_DIM {
            return Err(AcornError::InvalidPersistence(
                "dimension exceeds supported maximum",
            ));
        }
        let count = usize_from_u64(read_u64(&mut reader, Some(&mut hasher))?)?;
        if count == 0 {
            return Err(AcornError::InvalidPersistence("index holds no vectors"));
        }
        if count > u32::MAX as usize {
            return Err(AcornError::InvalidPersistence(
                "vector count exceeds identifier space",
            ));
        }
        let entry_point = read_u32(&mut reader, Some(&mut hasher))?;
        if entry_point as usize >= count {
            return Err(AcornError::InvalidPersistence("entry point out of range"));
        }

        let total = count
            .checked_mul(dim)
            .ok_or(AcornError::InvalidPersistence("vector data size overflow"))?;
        let mut data = Vec::with_capacity(total.min(MAX_PREALLOC));
        let mut row = vec![0u8; dim * 4];
        for _ in 0..count {
            read_hashed(&mut reader, &mut row, &mut hasher)?;
            data.extend(
                row.chunks_exact(4)
                    .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])),
            );
        }

        let mut labels = Vec::with_capacity(count.min(MAX_PREALLOC));
        for _ in 0..count {
            labels.push(read_u32(&mut reader, Some(&mut hasher))?);
        }

        let mut nodes = Vec::with_capacity(count.min(MAX_PREALLOC));
        for id in 0..count {
            let base = read_id_list(&mut reader, config.m, &mut hasher)?;
            let robust = read_id_list(&mut reader, config.m_beta, &mut hasher)?;
            let node = Node { base, robust };
            validate_node(&node, id, count)?;
            nodes.push(node);
        }

        let computed_checksum = hasher.finalize();
        let stored_checksum = read_u32(&mut reader, None)?;
        if computed_checksum != stored_checksum {
            return Err(AcornError::InvalidPersistence("checksum mismatch"));
        }

        let store = VectorStore::from_flat(dim, data, labels)
            .map_err(|_| AcornError::InvalidPersistence("inconsistent vector data"))?;

        Ok(AcornIndex::from_parts(
            config,
            store,
            nodes,
            entry_point,
            None,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staging_path_appends_suffix() {
        assert_eq!(
            staging_path(Path::new("/data/index.acorn")),
            PathBuf::from("/data/index.acorn.tmp")
        );
    }

    #[test]
    fn rejects_foreign_header_and_version() {
        let err = AcornIndex::load_from_reader(&b"RBF1\x01\0\0\0"[..]).unwrap_err();
        assert!(matches!(err, AcornError::InvalidPersistence(_)));

        let err = AcornIndex::load_from_reader(&b"ACG1\x09\0\0\0"[..]).unwrap_err();
        assert!(matches!(
            err,
            AcornError::InvalidPersistence("unsupported index format version")
        ));
    }

    #[test]
    fn truncated_stream_is_an_io_error() {
        let err = AcornIndex::load_from_reader(&b"ACG1\x01\0\0\0\x10"[..]).unwrap_err();
        assert!(matches!(err, AcornError::Io(_)));
    }

    #[test]
    fn rejects_oversized_dimension_before_reading_vectors() {
        let store = VectorStore::new(
            vec![vec![0.0, 0.0], vec![1.0, 0.0], vec![0.0, 1.0]],
            vec![0, 1, 0],
        )
        .unwrap();
        let index = AcornIndex::build(store, GraphConfig::new(2, 1, 2)).unwrap();
        let mut bytes = Vec::new();
        index.save_to_writer(&mut bytes).unwrap();

        let mut len = [0u8; 8];
        len.copy_from_slice(&bytes[8..16]);
        let dim_offset = 16 + u64::from_le_bytes(len) as usize;
        bytes[dim_offset..dim_offset + 4].copy_from_slice(&u32::MAX.to_le_bytes());

        let err = AcornIndex::load_from_reader(bytes.as_slice()).unwrap_err();
        assert!(matches!(
            err,
            AcornError::InvalidPersistence("dimension exceeds supported maximum")
        ));
    }

    #[test]
    fn node_validation() {
        let ok = Node {
            base: vec![1, 2],
            robust: vec![3],
        };
        assert!(validate_node(&ok, 0, 4).is_ok());
        assert!(validate_node(&ok, 1, 4).is_err());
        assert!(validate_node(&ok, 0, 3).is_err());
        let overlap = Node {
            base: vec![1],
            robust: vec![1],
        };
        assert!(validate_node(&overlap, 0, 4).is_err());
    }
}
