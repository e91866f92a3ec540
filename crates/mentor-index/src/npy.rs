//! Minimal NPY v1.0 reader and writer for little-endian `f32` matrices.
//!
//! Only what the snapshot needs: C-order, `<f4`, two-dimensional arrays.

use std::io::{Read, Write};

use mentor_core::MentorError;

const NPY_MAGIC: &[u8; 6] = b"\x93NUMPY";
const PREAMBLE_LEN: usize = 10;
const ALIGNMENT: usize = 64;

/// A dense row-major `f32` matrix as stored in an `.npy` file.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<f32>,
}

impl Matrix {
    /// Row `i` of the matrix.
    pub fn row(&self, i: usize) -> Option<&[f32]> {
        if i >= self.rows {
            return None;
        }
        Some(&self.data[i * self.cols..(i + 1) * self.cols])
    }
}

fn header_dict(rows: usize, cols: usize) -> String {
    format!("{{'descr': '<f4', 'fortran_order': False, 'shape': ({rows}, {cols}), }}")
}

/// Write `rows` as an `(N, D)` float32 array.
///
/// Every row must have length `cols`. The header is space-padded so the data
/// starts on a 64-byte boundary.
///
/// # Errors
///
/// Returns [`MentorError::Index`] on a ragged row, or [`MentorError::Io`] on
/// write failure.
pub fn write_f32_matrix<W: Write>(
    out: &mut W,
    rows: &[Vec<f32>],
    cols: usize,
) -> Result<(), MentorError> {
    if let Some(bad) = rows.iter().position(|r| r.len() != cols) {
        return Err(MentorError::Index(format!(
            "row {bad} has {} values, expected {cols}",
            rows[bad].len()
        )));
    }

    let mut header = header_dict(rows.len(), cols);
    let unpadded = PREAMBLE_LEN + header.len() + 1;
    let padding = (ALIGNMENT - unpadded % ALIGNMENT) % ALIGNMENT;
    header.push_str(&" ".repeat(padding));
    header.push('\n');
    let header_len = u16::try_from(header.len())
        .map_err(|_| MentorError::Index("npy header too long".into()))?;

    out.write_all(NPY_MAGIC)?;
    out.write_all(&[1, 0])?;
    out.write_all(&header_len.to_le_bytes())?;
    out.write_all(header.as_bytes())?;
    for row in rows {
        for value in row {
            out.write_all(&value.to_le_bytes())?;
        }
    }
    Ok(())
}

/// Read a two-dimensional `<f4` array.
///
/// # Errors
///
/// Returns [`MentorError::Index`] if the file is not NPY, uses another dtype
/// or Fortran order, is not two-dimensional, or is truncated.
pub fn read_f32_matrix<R: Read>(input: &mut R) -> Result<Matrix, MentorError> {
    let mut preamble = [0u8; PREAMBLE_LEN];
    input
        .read_exact(&mut preamble)
        .map_err(|_| MentorError::Index("npy file truncated".into()))?;
    if &preamble[..6] != NPY_MAGIC {
        return Err(MentorError::Index("not an npy file".into()));
    }
    if preamble[6] != 1 {
        return Err(MentorError::Index(format!(
            "unsupported npy version {}.{}",
            preamble[6], preamble[7]
        )));
    }
    let header_len = u16::from_le_bytes([preamble[8], preamble[9]]) as usize;
    let mut header = vec![0u8; header_len];
    input
        .read_exact(&mut header)
        .map_err(|_| MentorError::Index("npy header truncated".into()))?;
    let header = String::from_utf8_lossy(&header);

    if !header.contains("'descr': '<f4'") {
        return Err(MentorError::Index("npy dtype is not <f4".into()));
    }
    if !header.contains("'fortran_order': False") {
        return Err(MentorError::Index("fortran-ordered npy is not supported".into()));
    }
    let (rows, cols) = parse_shape(&header)?;

    let mut bytes = Vec::new();
    input.read_to_end(&mut bytes)?;
    if bytes.len() != rows * cols * 4 {
        return Err(MentorError::Index(format!(
            "npy data holds {} bytes, shape ({rows}, {cols}) needs {}",
            bytes.len(),
            rows * cols * 4
        )));
    }
    let data = bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    Ok(Matrix { rows, cols, data })
}

fn parse_shape(header: &str) -> Result<(usize, usize), MentorError> {
    let bad_shape = || MentorError::Index(format!("cannot parse npy shape from {header:?}"));
    let start = header.find("'shape':").ok_or_else(bad_shape)?;
    let rest = &header[start..];
    let open = rest.find('(').ok_or_else(bad_shape)?;
    let close = rest.find(')').ok_or_else(bad_shape)?;
    let dims: Vec<usize> = rest[open + 1..close]
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<usize>().map_err(|_| bad_shape()))
        .collect::<Result<_, _>>()?;
    match dims.as_slice() {
        [rows, cols] => Ok((*rows, *cols)),
        _ => Err(MentorError::Index(format!(
            "expected a 2-d npy array, got {} dimensions",
            dims.len()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_aligned_and_newline_terminated() {
        let rows = vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]];
        let mut bytes = Vec::new();
        write_f32_matrix(&mut bytes, &rows, 3).unwrap();

        assert_eq!(&bytes[..6], b"\x93NUMPY");
        assert_eq!(bytes[6], 1);
        let header_len = u16::from_le_bytes([bytes[8], bytes[9]]) as usize;
        assert_eq!((10 + header_len) % 64, 0);
        assert_eq!(bytes[10 + header_len - 1], b'\n');
        assert_eq!(bytes.len(), 10 + header_len + 6 * 4);

        let header = std::str::from_utf8(&bytes[10..10 + header_len]).unwrap();
        assert!(header.contains("'shape': (2, 3)"));
    }

    #[test]
    fn read_returns_written_rows() {
        let rows = vec![vec![0.5, -1.0], vec![2.25, 0.0], vec![1.0, 1.0]];
        let mut bytes = Vec::new();
        write_f32_matrix(&mut bytes, &rows, 2).unwrap();

        let matrix = read_f32_matrix(&mut bytes.as_slice()).unwrap();
        assert_eq!((matrix.rows, matrix.cols), (3, 2));
        assert_eq!(matrix.row(1), Some(&[2.25f32, 0.0][..]));
        assert_eq!(matrix.row(3), None);
    }

    #[test]
    fn empty_matrix() {
        let mut bytes = Vec::new();
        write_f32_matrix(&mut bytes, &[], 0).unwrap();
        let matrix = read_f32_matrix(&mut bytes.as_slice()).unwrap();
        assert_eq!((matrix.rows, matrix.cols), (0, 0));
        assert!(matrix.data.is_empty());
    }

    #[test]
    fn ragged_rows_rejected() {
        let rows = vec![vec![1.0, 2.0], vec![3.0]];
        let err = write_f32_matrix(&mut Vec::new(), &rows, 2).unwrap_err();
        assert!(matches!(err, MentorError::Index(_)));
    }

    #[test]
    fn other_dtype_rejected() {
        let header = "{'descr': '<f8', 'fortran_order': False, 'shape': (1, 1), }\n";
        let mut bytes = b"\x93NUMPY\x01\x00".to_vec();
        bytes.extend_from_slice(&(header.len() as u16).to_le_bytes());
        bytes.extend_from_slice(header.as_bytes());
        bytes.extend_from_slice(&[0u8; 8]);
        let err = read_f32_matrix(&mut bytes.as_slice()).unwrap_err();
        assert!(err.to_string().contains("<f4"));
    }

    #[test]
    fn shape_parsing() {
        assert_eq!(parse_shape("{'shape': (12, 1024), }").unwrap(), (12, 1024));
        assert!(parse_shape("{'shape': (12,), }").is_err());
    }
}
