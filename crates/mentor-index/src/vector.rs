//! Exact inner-product vector index and its on-disk form.
//!
//! Layout of `doc_index.flatip` (all integers little-endian):
//!
//! | bytes | field                          |
//! |-------|--------------------------------|
//! | 8     | magic `MNTRFLAT`               |
//! | 4     | format version (`u32`, = 1)    |
//! | 1     | metric (`0` = inner product)   |
//! | 4     | dimensions (`u32`)             |
//! | 8     | vector count (`u64`)           |
//! | 4·D·N | row-major `f32` data           |

use std::io::{Read, Write};

use mentor_core::MentorError;

const MAGIC: &[u8; 8] = b"MNTRFLAT";
const FORMAT_VERSION: u32 = 1;
const METRIC_INNER_PRODUCT: u8 = 0;

/// Brute-force inner-product index over equal-length vectors.
///
/// Positions are assigned in insertion order starting at 0, and position `i`
/// corresponds to line `i` of the snapshot metadata.
///
/// # Examples
///
/// ```
/// use mentor_index::vector::FlatIpIndex;
///
/// let mut index = FlatIpIndex::new(2);
/// index.add(&[1.0, 0.0]).unwrap();
/// index.add(&[0.0, 1.0]).unwrap();
///
/// let hits = index.search(&[0.9, 0.1], 1).unwrap();
/// assert_eq!(hits[0].0, 0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIpIndex {
    dims: usize,
    data: Vec<f32>,
}

impl FlatIpIndex {
    /// Create an empty index for vectors of length `dims`.
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            data: Vec::new(),
        }
    }

    /// Append one vector at position [`len`](Self::len).
    ///
    /// # Errors
    ///
    /// Returns [`MentorError::Index`] if the vector length differs from the
    /// index dimensionality.
    pub fn add(&mut self, vector: &[f32]) -> Result<(), MentorError> {
        if vector.len() != self.dims {
            return Err(MentorError::Index(format!(
                "vector has {} dimensions, index expects {}",
                vector.len(),
                self.dims
            )));
        }
        self.data.extend_from_slice(vector);
        Ok(())
    }

    /// Number of stored vectors.
    pub fn len(&self) -> usize {
        if self.dims == 0 {
            0
        } else {
            self.data.len() / self.dims
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    /// The vector stored at `position`, if any.
    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        if position >= self.len() {
            return None;
        }
        let start = position * self.dims;
        Some(&self.data[start..start + self.dims])
    }

    /// Return up to `k` `(position, score)` pairs by descending inner product.
    ///
    /// Equal scores keep ascending position order. `k` larger than the index
    /// is clamped; an empty index yields no hits for any query.
    ///
    /// # Errors
    ///
    /// Returns [`MentorError::Index`] if the query length differs from the
    /// index dimensionality.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>, MentorError> {
        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.dims {
            return Err(MentorError::Index(format!(
                "query has {} dimensions, index expects {}",
                query.len(),
                self.dims
            )));
        }

        let mut scored: Vec<(usize, f32)> = self
            .data
            .chunks_exact(self.dims)
            .enumerate()
            .map(|(i, row)| (i, row.iter().zip(query).map(|(a, b)| a * b).sum()))
            .collect();
        scored.sort_by(|a, b| sort_key(b.1).total_cmp(&sort_key(a.1)));
        scored.truncate(k.min(scored.len()));
        Ok(scored)
    }

    /// Serialize the index in the `.flatip` format.
    ///
    /// # Errors
    ///
    /// Returns [`MentorError::Io`] on write failure.
    pub fn write_to<W: Write>(&self, out: &mut W) -> Result<(), MentorError> {
        let dims = u32::try_from(self.dims)
            .map_err(|_| MentorError::Index(format!("dimension {} too large", self.dims)))?;
        out.write_all(MAGIC)?;
        out.write_all(&FORMAT_VERSION.to_le_bytes())?;
        out.write_all(&[METRIC_INNER_PRODUCT])?;
        out.write_all(&dims.to_le_bytes())?;
        out.write_all(&(self.len() as u64).to_le_bytes())?;
        for value in &self.data {
            out.write_all(&value.to_le_bytes())?;
        }
        Ok(())
    }

    /// Deserialize an index written by [`write_to`](Self::write_to).
    ///
    /// # Errors
    ///
    /// Returns [`MentorError::Index`] for a bad magic, unsupported version or
    /// metric, or truncated data.
    pub fn read_from<R: Read>(input: &mut R) -> Result<Self, MentorError> {
        let mut magic = [0u8; 8];
        read_header(input, &mut magic)?;
        if &magic != MAGIC {
            return Err(MentorError::Index("not a mentor flat index file".into()));
        }

        let mut u32_buf = [0u8; 4];
        read_header(input, &mut u32_buf)?;
        let version = u32::from_le_bytes(u32_buf);
        if version != FORMAT_VERSION {
            return Err(MentorError::Index(format!(
                "unsupported index format version {version}"
            )));
        }

        let mut metric = [0u8; 1];
        read_header(input, &mut metric)?;
        if metric[0] != METRIC_INNER_PRODUCT {
            return Err(MentorError::Index(format!(
                "unsupported index metric {}",
                metric[0]
            )));
        }

        read_header(input, &mut u32_buf)?;
        let dims = u32::from_le_bytes(u32_buf) as usize;
        let mut u64_buf = [0u8; 8];
        read_header(input, &mut u64_buf)?;
        let count = u64::from_le_bytes(u64_buf) as usize;

        let values = dims
            .checked_mul(count)
            .ok_or_else(|| MentorError::Index("index size overflows".into()))?;
        let mut bytes = Vec::new();
        input.read_to_end(&mut bytes)?;
        if bytes.len() != values * 4 {
            return Err(MentorError::Index(format!(
                "index data holds {} bytes, header declares {} vectors of {} dimensions",
                bytes.len(),
                count,
                dims
            )));
        }
        let data = bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        Ok(Self { dims, data })
    }
}

fn read_header<R: Read>(input: &mut R, buf: &mut [u8]) -> Result<(), MentorError> {
    input.read_exact(buf).map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => MentorError::Index("index header truncated".into()),
        _ => MentorError::Io(e),
    })
}

/// NaN scores rank below every finite score.
fn sort_key(score: f32) -> f32 {
    if score.is_nan() {
        f32::NEG_INFINITY
    } else {
        score
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FlatIpIndex {
        let mut index = FlatIpIndex::new(3);
        index.add(&[1.0, 0.0, 0.0]).unwrap();
        index.add(&[0.0, 1.0, 0.0]).unwrap();
        index.add(&[0.6, 0.8, 0.0]).unwrap();
        index
    }

    #[test]
    fn search_orders_by_descending_score() {
        let hits = sample().search(&[0.0, 1.0, 0.0], 3).unwrap();
        let positions: Vec<usize> = hits.iter().map(|h| h.0).collect();
        assert_eq!(positions, vec![1, 2, 0]);
        assert!((hits[0].1 - 1.0).abs() < 1e-6);
    }

    #[test]
    fn ties_keep_insertion_order() {
        let mut index = FlatIpIndex::new(2);
        for _ in 0..4 {
            index.add(&[1.0, 0.0]).unwrap();
        }
        let hits = index.search(&[1.0, 0.0], 4).unwrap();
        let positions: Vec<usize> = hits.iter().map(|h| h.0).collect();
        assert_eq!(positions, vec![0, 1, 2, 3]);
    }

    #[test]
    fn nan_rows_do_not_disturb_finite_order() {
        let mut index = FlatIpIndex::new(1);
        for i in 0..200 {
            let value = if i % 3 == 0 { f32::NAN } else { (i % 17) as f32 };
            index.add(&[value]).unwrap();
        }
        let hits = index.search(&[1.0], 200).unwrap();
        assert_eq!(hits.len(), 200);

        let finite: Vec<f32> = hits.iter().map(|h| h.1).filter(|s| !s.is_nan()).collect();
        assert!(finite.windows(2).all(|w| w[0] >= w[1]));
        let first_nan = hits.iter().position(|h| h.1.is_nan()).unwrap();
        assert!(hits[first_nan..].iter().all(|h| h.1.is_nan()));
    }

    #[test]
    fn k_is_clamped_to_index_size() {
        let hits = sample().search(&[1.0, 0.0, 0.0], 50).unwrap();
        assert_eq!(hits.len(), 3);
    }

    #[test]
    fn empty_index_returns_nothing() {
        let index = FlatIpIndex::new(0);
        assert!(index.search(&[1.0, 2.0], 5).unwrap().is_empty());
        let index = FlatIpIndex::new(4);
        assert!(index.search(&[1.0], 5).unwrap().is_empty());
    }

    #[test]
    fn dimension_mismatch_is_an_error() {
        let mut index = sample();
        assert!(matches!(index.add(&[1.0]), Err(MentorError::Index(_))));
        assert!(matches!(
            index.search(&[1.0, 0.0], 1),
            Err(MentorError::Index(_))
        ));
    }

    #[test]
    fn vector_lookup() {
        let index = sample();
        assert_eq!(index.vector(2), Some(&[0.6f32, 0.8, 0.0][..]));
        assert_eq!(index.vector(3), None);
    }

    #[test]
    fn disk_format_preserves_vectors() {
        let index = sample();
        let mut bytes = Vec::new();
        index.write_to(&mut bytes).unwrap();
        assert_eq!(&bytes[..8], b"MNTRFLAT");
        assert_eq!(bytes.len(), 8 + 4 + 1 + 4 + 8 + 3 * 3 * 4);

        let back = FlatIpIndex::read_from(&mut bytes.as_slice()).unwrap();
        assert_eq!(back, index);
    }

    #[test]
    fn truncated_file_is_rejected() {
        let mut bytes = Vec::new();
        sample().write_to(&mut bytes).unwrap();
        bytes.truncate(bytes.len() - 2);
        let err = FlatIpIndex::read_from(&mut bytes.as_slice()).unwrap_err();
        assert!(matches!(err, MentorError::Index(_)));

        let err = FlatIpIndex::read_from(&mut &b"MNTR"[..]).unwrap_err();
        assert!(err.to_string().contains("truncated"));
    }

    #[test]
    fn wrong_magic_is_rejected() {
        let err = FlatIpIndex::read_from(&mut &b"NOTANIDXxxxxxxxxxxxxxxxxx"[..]).unwrap_err();
        assert!(matches!(err, MentorError::Index(_)));
    }
}
