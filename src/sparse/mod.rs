//! Compressed sparse row storage for encoded corpora.
//!
//! Quantized documents are mostly zeros once a short string is padded out
//! to the fixed input width, so rows are kept in CSR form and only
//! expanded to dense vectors when a batch is fed to the network.
//!
//! # Memory Layout
//! For a matrix with `nnz` non-zeros and `nrows` rows:
//! - `values`: \[nnz\] - Non-zero values in row-major order
//! - `col_indices`: \[nnz\] - Column index for each value, ascending per row
//! - `row_ptrs`: \[nrows + 1\] - Start index in `values/col_indices` for each row
//!
//! ```text
//! Dense:     [[1, 0, 2],    CSR:
//!             [0, 0, 3],    values: [1, 2, 3, 4]
//!             [4, 0, 0]]    col_indices: [0, 2, 2, 0]
//!                           row_ptrs: [0, 2, 3, 4]
//! ```

use std::fmt::Debug;

use crate::error::{CharCnnError, Result};

/// Element type storable in a [`CsrMatrix`].
///
/// The zero element is `Default::default()`.
pub trait SparseValue: Copy + Default + PartialEq + Debug + Send + Sync + 'static {
    /// Whether this value is the implicit zero.
    fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

impl SparseValue for u8 {}
impl SparseValue for u16 {}
impl SparseValue for u32 {}
impl SparseValue for u64 {}
impl SparseValue for i16 {}
impl SparseValue for i32 {}
impl SparseValue for i64 {}
impl SparseValue for f32 {}

/// Compressed Sparse Row (CSR) matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct CsrMatrix<T: SparseValue> {
    values: Vec<T>,
    col_indices: Vec<usize>,
    row_ptrs: Vec<usize>,
    nrows: usize,
    ncols: usize,
}

impl<T: SparseValue> CsrMatrix<T> {
    /// Create a CSR matrix from raw components.
    ///
    /// # Errors
    ///
    /// Returns [`CharCnnError::DimensionMismatch`] when the component
    /// arrays are inconsistent with each other or with the shape.
    pub fn new(
        values: Vec<T>,
        col_indices: Vec<usize>,
        row_ptrs: Vec<usize>,
        nrows: usize,
        ncols: usize,
    ) -> Result<Self> {
        if values.len() != col_indices.len() {
            return Err(CharCnnError::dimension_mismatch(
                "col_indices",
                values.len(),
                col_indices.len(),
            ));
        }

        if row_ptrs.len() != nrows + 1 {
            return Err(CharCnnError::dimension_mismatch(
                "row_ptrs",
                nrows + 1,
                row_ptrs.len(),
            ));
        }

        if row_ptrs.first().copied() != Some(0) || row_ptrs.last().copied() != Some(values.len()) {
            return Err(CharCnnError::DimensionMismatch {
                expected: format!("row_ptrs spanning 0..{}", values.len()),
                actual: format!("{:?}..{:?}", row_ptrs.first(), row_ptrs.last()),
            });
        }

        for row in 0..nrows {
            let (start, end) = (row_ptrs[row], row_ptrs[row + 1]);
            if end < start {
                return Err(CharCnnError::DimensionMismatch {
                    expected: "monotonic row_ptrs".to_string(),
                    actual: format!("row {row}: {end} < {start}"),
                });
            }
            let cols = &col_indices[start..end];
            if cols.windows(2).any(|w| w[0] >= w[1]) {
                return Err(CharCnnError::DimensionMismatch {
                    expected: "strictly ascending column indices per row".to_string(),
                    actual: format!("row {row}: {cols:?}"),
                });
            }
            if let Some(&col) = cols.last() {
                if col >= ncols {
                    return Err(CharCnnError::dimension_mismatch("ncols", ncols, col + 1));
                }
            }
        }

        Ok(Self {
            values,
            col_indices,
            row_ptrs,
            nrows,
            ncols,
        })
    }

    /// Assemble from components already known to be consistent.
    pub(crate) fn from_parts(
        values: Vec<T>,
        col_indices: Vec<usize>,
        row_ptrs: Vec<usize>,
        nrows: usize,
        ncols: usize,
    ) -> Self {
        debug_assert_eq!(values.len(), col_indices.len());
        debug_assert_eq!(row_ptrs.len(), nrows + 1);
        Self {
            values,
            col_indices,
            row_ptrs,
            nrows,
            ncols,
        }
    }

    /// An all-zero matrix.
    #[must_use]
    pub fn zeros(nrows: usize, ncols: usize) -> Self {
        Self {
            values: Vec::new(),
            col_indices: Vec::new(),
            row_ptrs: vec![0; nrows + 1],
            nrows,
            ncols,
        }
    }

    /// Build from dense rows, each exactly `ncols` wide.
    ///
    /// # Errors
    ///
    /// Returns [`CharCnnError::DimensionMismatch`] if a row has the wrong width.
    pub fn from_dense_rows<R: AsRef<[T]>>(rows: &[R], ncols: usize) -> Result<Self> {
        let mut values = Vec::new();
        let mut col_indices = Vec::new();
        let mut row_ptrs = Vec::with_capacity(rows.len() + 1);
        row_ptrs.push(0);

        for row in rows {
            let row = row.as_ref();
            if row.len() != ncols {
                return Err(CharCnnError::dimension_mismatch("row width", ncols, row.len()));
            }
            for (col, &val) in row.iter().enumerate() {
                if !val.is_zero() {
                    values.push(val);
                    col_indices.push(col);
                }
            }
            row_ptrs.push(values.len());
        }

        Ok(Self {
            values,
            col_indices,
            row_ptrs,
            nrows: rows.len(),
            ncols,
        })
    }

    /// Number of stored (non-zero) elements.
    #[must_use]
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Shape as `[rows, cols]`.
    #[must_use]
    pub fn shape(&self) -> [usize; 2] {
        [self.nrows, self.ncols]
    }

    /// Number of rows.
    #[must_use]
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    /// Number of columns.
    #[must_use]
    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// Non-zero values in row-major order.
    #[must_use]
    pub fn values(&self) -> &[T] {
        &self.values
    }

    /// Column index of each stored value.
    #[must_use]
    pub fn col_indices(&self) -> &[usize] {
        &self.col_indices
    }

    /// Row pointer array (`nrows + 1` entries).
    #[must_use]
    pub fn row_ptrs(&self) -> &[usize] {
        &self.row_ptrs
    }

    /// Fraction of implicit zeros.
    #[must_use]
    pub fn sparsity(&self) -> f32 {
        let total = self.nrows * self.ncols;
        if total == 0 {
            return 0.0;
        }
        1.0 - (self.nnz() as f32 / total as f32)
    }

    /// Value at (row, col), or zero if not stored or out of bounds.
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> T {
        if row >= self.nrows || col >= self.ncols {
            return T::default();
        }
        let (cols, vals) = self.row_entries(row);
        match cols.binary_search(&col) {
            Ok(pos) => vals[pos],
            Err(_) => T::default(),
        }
    }

    /// Stored column indices and values of one row.
    ///
    /// # Panics
    ///
    /// Panics if `row >= nrows`.
    #[must_use]
    pub fn row_entries(&self, row: usize) -> (&[usize], &[T]) {
        let (start, end) = (self.row_ptrs[row], self.row_ptrs[row + 1]);
        (&self.col_indices[start..end], &self.values[start..end])
    }

    /// Dense copy of one row.
    ///
    /// # Panics
    ///
    /// Panics if `row >= nrows`.
    #[must_use]
    pub fn row_dense(&self, row: usize) -> Vec<T> {
        let mut dense = vec![T::default(); self.ncols];
        let (cols, vals) = self.row_entries(row);
        for (&col, &val) in cols.iter().zip(vals) {
            dense[col] = val;
        }
        dense
    }

    /// Expand to dense rows.
    #[must_use]
    pub fn to_dense(&self) -> Vec<Vec<T>> {
        (0..self.nrows).map(|row| self.row_dense(row)).collect()
    }

    /// New matrix holding the given rows in the given order.
    ///
    /// # Errors
    ///
    /// Returns [`CharCnnError::DimensionMismatch`] if an index is out of range.
    pub fn select_rows(&self, rows: &[usize]) -> Result<Self> {
        let mut values = Vec::new();
        let mut col_indices = Vec::new();
        let mut row_ptrs = Vec::with_capacity(rows.len() + 1);
        row_ptrs.push(0);

        for &row in rows {
            if row >= self.nrows {
                return Err(CharCnnError::dimension_mismatch("row index <", self.nrows, row));
            }
            let (cols, vals) = self.row_entries(row);
            col_indices.extend_from_slice(cols);
            values.extend_from_slice(vals);
            row_ptrs.push(values.len());
        }

        Ok(Self {
            values,
            col_indices,
            row_ptrs,
            nrows: rows.len(),
            ncols: self.ncols,
        })
    }

    /// Approximate heap usage in bytes.
    #[must_use]
    pub fn memory_bytes(&self) -> usize {
        self.values.len() * size_of::<T>()
            + self.col_indices.len() * size_of::<usize>()
            + self.row_ptrs.len() * size_of::<usize>()
    }

    /// Heap usage of the equivalent dense matrix.
    #[must_use]
    pub fn dense_memory_bytes(&self) -> usize {
        self.nrows * self.ncols * size_of::<T>()
    }
}
