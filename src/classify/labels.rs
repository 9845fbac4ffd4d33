//! Ordered class labels and one-hot targets.
//!
//! The position of a label is its integer encoding, so the order written to
//! `classes.json` must match the order the model was trained with.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CharCnnError, Result};
use crate::nn::Tensor;

/// File name of the persisted label list.
pub const CLASSES_FILE: &str = "classes.json";

/// Resource type written for each label.
const CLASS_TYPE: &str = "class";

#[derive(Debug, Serialize, Deserialize)]
struct ClassDocument {
    data: Vec<ClassResource>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ClassResource {
    #[serde(rename = "type")]
    kind: String,
    id: String,
}

/// Class identifiers in encoding order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassLabels {
    labels: Vec<String>,
    index: HashMap<String, usize>,
}

impl ClassLabels {
    /// Labels in the given order.
    ///
    /// # Errors
    ///
    /// Returns [`CharCnnError::InvalidHyperparameter`] if a label repeats.
    pub fn new<I, S>(labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        let mut index = HashMap::with_capacity(labels.len());
        for (i, label) in labels.iter().enumerate() {
            if index.insert(label.clone(), i).is_some() {
                return Err(CharCnnError::InvalidHyperparameter {
                    param: "labels".to_string(),
                    value: label.clone(),
                    constraint: "unique class labels".to_string(),
                });
            }
        }
        Ok(Self { labels, index })
    }

    /// Distinct labels seen in `observations`, sorted.
    #[must_use]
    pub fn from_observed<I, S>(observations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let unique: BTreeSet<String> = observations
            .into_iter()
            .map(|s| s.as_ref().to_string())
            .collect();
        let labels: Vec<String> = unique.into_iter().collect();
        let index = labels
            .iter()
            .enumerate()
            .map(|(i, l)| (l.clone(), i))
            .collect();
        Self { labels, index }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Label at encoding `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    #[must_use]
    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.index.get(label).copied()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.labels
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }

    /// Integer encoding of each label.
    ///
    /// # Errors
    ///
    /// Returns [`CharCnnError::UnknownLabel`] for a label not in the list.
    pub fn encode<S: AsRef<str>>(&self, labels: &[S]) -> Result<Vec<usize>> {
        labels
            .iter()
            .map(|l| {
                self.index_of(l.as_ref())
                    .ok_or_else(|| CharCnnError::UnknownLabel(l.as_ref().to_string()))
            })
            .collect()
    }

    /// One-hot targets for `labels`.
    ///
    /// # Errors
    ///
    /// Returns [`CharCnnError::UnknownLabel`] for a label not in the list.
    pub fn one_hot<S: AsRef<str>>(&self, labels: &[S]) -> Result<OneHot> {
        OneHot::from_indices(self.encode(labels)?, self.len())
    }

    /// Write `classes.json` into `dir`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an I/O or serialization error if writing fails.
    pub fn save<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let document = ClassDocument {
            data: self
                .labels
                .iter()
                .map(|id| ClassResource {
                    kind: CLASS_TYPE.to_string(),
                    id: id.clone(),
                })
                .collect(),
        };
        let path = dir.join(CLASSES_FILE);
        fs::write(&path, serde_json::to_string_pretty(&document)?)?;
        debug!(path = %path.display(), n_classes = self.len(), "wrote class labels");
        Ok(())
    }

    /// Read `classes.json` from `dir`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read and
    /// [`CharCnnError::FormatError`] unless it holds a collection of
    /// resources with unique ids.
    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let path = dir.as_ref().join(CLASSES_FILE);
        let text = fs::read_to_string(&path)?;
        let document: ClassDocument =
            serde_json::from_str(&text).map_err(|e| CharCnnError::FormatError {
                path: path.clone(),
                message: format!("unable to read classes: {e}"),
            })?;
        Self::new(document.data.into_iter().map(|r| r.id)).map_err(|e| {
            CharCnnError::FormatError {
                path,
                message: e.to_string(),
            }
        })
    }
}

/// One-hot training targets, stored as class indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OneHot {
    indices: Vec<usize>,
    n_classes: usize,
}

impl OneHot {
    /// Targets from class indices.
    ///
    /// # Errors
    ///
    /// Returns [`CharCnnError::DimensionMismatch`] if an index is not below
    /// `n_classes`.
    pub fn from_indices(indices: Vec<usize>, n_classes: usize) -> Result<Self> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= n_classes) {
            return Err(CharCnnError::dimension_mismatch("class index <", n_classes, bad));
        }
        Ok(Self { indices, n_classes })
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Row width.
    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    #[must_use]
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Dense row `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i >= len()`.
    #[must_use]
    pub fn row(&self, i: usize) -> Vec<f32> {
        let mut row = vec![0.0; self.n_classes];
        row[self.indices[i]] = 1.0;
        row
    }

    #[must_use]
    pub fn to_dense(&self) -> Vec<Vec<f32>> {
        (0..self.len()).map(|i| self.row(i)).collect()
    }

    /// Dense `(rows.len(), n_classes)` batch of the selected rows.
    pub(crate) fn batch(&self, rows: &[usize]) -> Tensor {
        let mut data = vec![0.0; rows.len() * self.n_classes];
        for (r, &row) in rows.iter().enumerate() {
            data[r * self.n_classes + self.indices[row]] = 1.0;
        }
        Tensor::from_raw(data, vec![rows.len(), self.n_classes])
    }
}
