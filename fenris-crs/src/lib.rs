//! Append-only compressed row storage.
//!
//! A [`Crs`] stores a sequence of variable-length rows in a single contiguous buffer.
//! Capacities for both the number of rows and the total number of elements are declared
//! up front, so that no reallocation takes place while rows are appended.
use serde::de::Error as DeserializeError;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use std::fmt::{Debug, Display};
use std::ops::Range;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CrsError {
    /// Appending a row would exceed the declared row or element capacity.
    CapacityExceeded {
        row_capacity: usize,
        element_capacity: usize,
        requested_rows: usize,
        requested_elements: usize,
    },
    /// The requested row has not been populated.
    IndexOutOfRange { index: usize, len: usize },
}

impl Display for CrsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrsError::CapacityExceeded {
                row_capacity,
                element_capacity,
                requested_rows,
                requested_elements,
            } => write!(
                f,
                "Capacity exceeded: requested {} rows and {} elements, but capacity is {} rows and {} elements.",
                requested_rows, requested_elements, row_capacity, element_capacity
            ),
            CrsError::IndexOutOfRange { index, len } => {
                write!(f, "Row index {} out of range for storage with {} rows.", index, len)
            }
        }
    }
}

impl Error for CrsError {}

#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct Crs<T> {
    data: Vec<T>,
    /// Always holds `len() + 1` monotonically nondecreasing entries.
    row_offsets: Vec<usize>,
    row_capacity: usize,
    element_capacity: usize,
}

/// Serialized fields of a [`Crs`], checked before they are trusted.
#[derive(Deserialize)]
struct CrsFields<T> {
    data: Vec<T>,
    row_offsets: Vec<usize>,
    row_capacity: usize,
    element_capacity: usize,
}

impl<T> CrsFields<T> {
    fn validate(self) -> Result<Crs<T>, String> {
        let offsets = &self.row_offsets;
        if offsets.first() != Some(&0) {
            return Err("row offsets must start at zero".to_string());
        }
        if offsets.windows(2).any(|pair| pair[0] > pair[1]) {
            return Err("row offsets must be nondecreasing".to_string());
        }
        if offsets.last() != Some(&self.data.len()) {
            return Err(format!(
                "last row offset must equal the number of elements {}",
                self.data.len()
            ));
        }
        if offsets.len() - 1 > self.row_capacity || self.data.len() > self.element_capacity {
            return Err("stored rows or elements exceed the declared capacity".to_string());
        }
        Ok(Crs {
            data: self.data,
            row_offsets: self.row_offsets,
            row_capacity: self.row_capacity,
            element_capacity: self.element_capacity,
        })
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Crs<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        CrsFields::deserialize(deserializer)?
            .validate()
            .map_err(D::Error::custom)
    }
}

impl<T: Debug> Debug for Crs<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<T: Display> Display for Crs<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, row) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "[")?;
            for (j, element) in row.iter().enumerate() {
                if j > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", element)?;
            }
            write!(f, "]")?;
        }
        write!(f, "]")
    }
}

impl<T> Crs<T> {
    pub fn with_capacity(row_capacity: usize, element_capacity: usize) -> Self {
        let mut row_offsets = Vec::with_capacity(row_capacity + 1);
        row_offsets.push(0);
        Self {
            data: Vec::with_capacity(element_capacity),
            row_offsets,
            row_capacity,
            element_capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.row_offsets.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of elements stored across all rows.
    pub fn num_elements(&self) -> usize {
        self.data.len()
    }

    pub fn row_capacity(&self) -> usize {
        self.row_capacity
    }

    pub fn element_capacity(&self) -> usize {
        self.element_capacity
    }

    pub fn row(&self, index: usize) -> Result<&[T], CrsError> {
        let range = self.row_range(index)?;
        Ok(&self.data[range])
    }

    fn row_range(&self, index: usize) -> Result<Range<usize>, CrsError> {
        if index >= self.len() {
            return Err(CrsError::IndexOutOfRange { index, len: self.len() });
        }
        Ok(self.row_offsets[index]..self.row_offsets[index + 1])
    }

    pub fn iter<'a>(&'a self) -> impl 'a + ExactSizeIterator<Item = &'a [T]> {
        self.row_offsets
            .windows(2)
            .map(move |offsets| &self.data[offsets[0]..offsets[1]])
    }

    /// Returns an iterator over all elements inside all rows.
    pub fn iter_elements<'a>(&'a self) -> impl 'a + Iterator<Item = &'a T> {
        self.data.iter()
    }

    fn check_capacity(&self, num_new_elements: usize) -> Result<(), CrsError> {
        let requested_rows = self.len() + 1;
        let requested_elements = self.data.len() + num_new_elements;
        if requested_rows > self.row_capacity || requested_elements > self.element_capacity {
            Err(CrsError::CapacityExceeded {
                row_capacity: self.row_capacity,
                element_capacity: self.element_capacity,
                requested_rows,
                requested_elements,
            })
        } else {
            Ok(())
        }
    }
}

impl<T: Clone> Crs<T> {
    /// Appends a new row after all existing rows.
    ///
    /// Rows can never be modified or removed once appended.
    pub fn push_row(&mut self, elements: &[T]) -> Result<(), CrsError> {
        self.check_capacity(elements.len())?;
        self.data.extend_from_slice(elements);
        self.row_offsets.push(self.data.len());
        Ok(())
    }

    /// Creates storage with one single-element row per list entry.
    pub fn from_list(elements: &[T]) -> Self {
        let n = elements.len();
        let mut crs = Self::with_capacity(n, n);
        for element in elements {
            crs.data.push(element.clone());
            crs.row_offsets.push(crs.data.len());
        }
        crs
    }

    /// Creates storage holding exactly the given rows, with capacities matching their sizes.
    pub fn from_rows<R>(rows: impl IntoIterator<Item = R>) -> Self
    where
        R: AsRef<[T]>,
    {
        let rows: Vec<R> = rows.into_iter().collect();
        let num_elements = rows.iter().map(|row| row.as_ref().len()).sum();
        let mut crs = Self::with_capacity(rows.len(), num_elements);
        for row in &rows {
            crs.data.extend_from_slice(row.as_ref());
            crs.row_offsets.push(crs.data.len());
        }
        crs
    }

    /// Creates storage with `num_rows` rows, where row `i` is taken from the map
    /// if present and is empty otherwise.
    pub fn from_row_map(
        rows: &BTreeMap<usize, Vec<T>>,
        num_rows: usize,
        element_capacity: usize,
    ) -> Result<Self, CrsError> {
        let mut crs = Self::with_capacity(num_rows, element_capacity);
        for i in 0..num_rows {
            let row = rows.get(&i).map(Vec::as_slice).unwrap_or(&[]);
            crs.push_row(row)?;
        }
        Ok(crs)
    }
}

impl<'a, T: Clone> From<&'a Crs<T>> for Vec<Vec<T>> {
    fn from(crs: &Crs<T>) -> Self {
        crs.iter().map(|row| row.to_vec()).collect()
    }
}

impl<T: Clone> From<Vec<Vec<T>>> for Crs<T> {
    fn from(rows: Vec<Vec<T>>) -> Self {
        Self::from_rows(rows)
    }
}
