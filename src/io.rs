//! Dataset readers for the benchmark formats.
//!
//! * `.fvecs` / `.ivecs`: every record is an `i32` dimension followed by that
//!   many 4-byte values.
//! * `.fbin`: a `u32` count and a `u32` dimension, then `count * dim` `f32`s.
//! * label files are `.ivecs` with exactly one value per row.

use std::fs::File;
use std::io::{self, BufReader, ErrorKind, Read};
use std::path::Path;

use crate::store::Label;

fn invalid_data(message: String) -> io::Error {
    io::Error::new(ErrorKind::InvalidData, message)
}

fn read_vecs_from_reader<R, T, F>(
    mut reader: R,
    limit: Option<usize>,
    convert: F,
) -> io::Result<Vec<Vec<T>>>
where
    R: Read,
    F: Fn([u8; 4]) -> T,
{
    let mut rows = Vec::new();
    let mut buffer = Vec::new();

    while limit.map_or(true, |max| rows.len() < max) {
        let mut dim_buf = [0u8; 4];
        match reader.read_exact(&mut dim_buf) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::UnexpectedEof => break,
            Err(err) => return Err(err),
        }
        let dim = i32::from_le_bytes(dim_buf);
        if dim < 0 {
            return Err(invalid_data(format!(
                "negative dimension {dim} in record {}",
                rows.len()
            )));
        }

        buffer.resize(dim as usize * 4, 0);
        reader.read_exact(&mut buffer)?;
        rows.push(
            buffer
                .chunks_exact(4)
                .map(|b| convert([b[0], b[1], b[2], b[3]]))
                .collect(),
        );
    }

    Ok(rows)
}

pub fn read_fvecs_from_reader<R: Read>(
    reader: R,
    limit: Option<usize>,
) -> io::Result<Vec<Vec<f32>>> {
    read_vecs_from_reader(reader, limit, f32::from_le_bytes)
}

pub fn read_ivecs_from_reader<R: Read>(
    reader: R,
    limit: Option<usize>,
) -> io::Result<Vec<Vec<i32>>> {
    read_vecs_from_reader(reader, limit, i32::from_le_bytes)
}

pub fn read_fvecs<P: AsRef<Path>>(path: P, limit: Option<usize>) -> io::Result<Vec<Vec<f32>>> {
    let file = File::open(path)?;
    read_fvecs_from_reader(BufReader::new(file), limit)
}

pub fn read_ivecs<P: AsRef<Path>>(path: P, limit: Option<usize>) -> io::Result<Vec<Vec<i32>>> {
    let file = File::open(path)?;
    read_ivecs_from_reader(BufReader::new(file), limit)
}

/// Read a header-prefixed `.fbin` matrix, keeping at most `limit` rows.
pub fn read_fbin_from_reader<R: Read>(
    mut reader: R,
    limit: Option<usize>,
) -> io::Result<Vec<Vec<f32>>> {
    let mut header = [0u8; 8];
    reader.read_exact(&mut header)?;
    let count = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
    let dim = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;
    if dim == 0 && count > 0 {
        return Err(invalid_data("fbin header declares zero dimension".into()));
    }

    let rows = limit.map_or(count, |max| max.min(count));
    let mut vectors = Vec::with_capacity(rows.min(1 << 20));
    let mut buffer = vec![0u8; dim * 4];
    for row in 0..rows {
        reader.read_exact(&mut buffer).map_err(|err| {
            if err.kind() == ErrorKind::UnexpectedEof {
                invalid_data(format!("fbin payload ends at row {row} of {count}"))
            } else {
                err
            }
        })?;
        vectors.push(
            buffer
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect(),
        );
    }
    Ok(vectors)
}

pub fn read_fbin<P: AsRef<Path>>(path: P, limit: Option<usize>) -> io::Result<Vec<Vec<f32>>> {
    let file = File::open(path)?;
    read_fbin_from_reader(BufReader::new(file), limit)
}

/// Read vectors, choosing the format from the file extension.
///
/// `.fbin` and `.bin` are read as header-prefixed matrices, anything else as
/// `.fvecs`.
pub fn read_vectors<P: AsRef<Path>>(path: P, limit: Option<usize>) -> io::Result<Vec<Vec<f32>>> {
    let path = path.as_ref();
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("fbin") | Some("bin") => read_fbin(path, limit),
        _ => read_fvecs(path, limit),
    }
}

pub fn read_labels_from_reader<R: Read>(reader: R, limit: Option<usize>) -> io::Result<Vec<Label>> {
    let rows = read_ivecs_from_reader(reader, limit)?;
    convert_labels(rows)
}

/// Read one non-negative label per `.ivecs` row.
pub fn read_labels<P: AsRef<Path>>(path: P, limit: Option<usize>) -> io::Result<Vec<Label>> {
    let file = File::open(path)?;
    read_labels_from_reader(BufReader::new(file), limit)
}

pub fn read_groundtruth_from_reader<R: Read>(
    reader: R,
    limit: Option<usize>,
) -> io::Result<Vec<Vec<usize>>> {
    let rows = read_ivecs_from_reader(reader, limit)?;
    convert_rows(rows)
}

pub fn read_groundtruth<P: AsRef<Path>>(
    path: P,
    limit: Option<usize>,
) -> io::Result<Vec<Vec<usize>>> {
    let file = File::open(path)?;
    read_groundtruth_from_reader(BufReader::new(file), limit)
}

fn convert_labels(rows: Vec<Vec<i32>>) -> io::Result<Vec<Label>> {
    let mut labels = Vec::with_capacity(rows.len());
    for (idx, row) in rows.into_iter().enumerate() {
        let value = match row.as_slice() {
            [value] => *value,
            _ => {
                return Err(invalid_data(format!(
                    "label row {idx} has {} elements, expected exactly 1",
                    row.len()
                )))
            }
        };
        if value < 0 {
            return Err(invalid_data(format!(
                "label {value} at row {idx} is negative"
            )));
        }
        labels.push(value as Label);
    }
    Ok(labels)
}

fn convert_rows(rows: Vec<Vec<i32>>) -> io::Result<Vec<Vec<usize>>> {
    let mut converted = Vec::with_capacity(rows.len());
    for (row_idx, row) in rows.into_iter().enumerate() {
        let mut converted_row = Vec::with_capacity(row.len());
        for value in row {
            if value < 0 {
                return Err(invalid_data(format!(
                    "ground truth entry {value} in row {row_idx} is negative"
                )));
            }
            converted_row.push(value as usize);
        }
        converted.push(converted_row);
    }
    Ok(converted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(values: &[[u8; 4]]) -> Vec<u8> {
        let mut bytes = (values.len() as i32).to_le_bytes().to_vec();
        for value in values {
            bytes.extend_from_slice(value);
        }
        bytes
    }

    #[test]
    fn fvecs_respects_limit() {
        let mut bytes = record(&[1.0f32.to_le_bytes(), 2.0f32.to_le_bytes()]);
        bytes.extend(record(&[3.0f32.to_le_bytes(), 4.0f32.to_le_bytes()]));
        let all = read_fvecs_from_reader(bytes.as_slice(), None).unwrap();
        assert_eq!(all, vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
        let first = read_fvecs_from_reader(bytes.as_slice(), Some(1)).unwrap();
        assert_eq!(first, vec![vec![1.0, 2.0]]);
    }

    #[test]
    fn fvecs_rejects_negative_dimension() {
        let bytes = (-1i32).to_le_bytes();
        let err = read_fvecs_from_reader(&bytes[..], None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }

    #[test]
    fn fbin_reads_header_and_rows() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&3u32.to_le_bytes());
        bytes.extend_from_slice(&2u32.to_le_bytes());
        for value in [0.5f32, 1.5, 2.5, 3.5, 4.5, 5.5] {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        let rows = read_fbin_from_reader(bytes.as_slice(), None).unwrap();
        assert_eq!(rows, vec![vec![0.5, 1.5], vec![2.5, 3.5], vec![4.5, 5.5]]);
        let rows = read_fbin_from_reader(bytes.as_slice(), Some(2)).unwrap();
        assert_eq!(rows.len(), 2);

        let truncated = &bytes[..bytes.len() - 4];
        let err = read_fbin_from_reader(truncated, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }

    #[test]
    fn labels_need_one_non_negative_value_per_row() {
        let mut bytes = record(&[7i32.to_le_bytes()]);
        bytes.extend(record(&[0i32.to_le_bytes()]));
        assert_eq!(
            read_labels_from_reader(bytes.as_slice(), None).unwrap(),
            vec![7, 0]
        );

        let wide = record(&[1i32.to_le_bytes(), 2i32.to_le_bytes()]);
        assert!(read_labels_from_reader(wide.as_slice(), None).is_err());
        let negative = record(&[(-3i32).to_le_bytes()]);
        assert!(read_labels_from_reader(negative.as_slice(), None).is_err());
    }
}
