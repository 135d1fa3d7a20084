use crate::error::{RecommenderError, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Dense ratings table: rows are items, columns are users.
///
/// Missing cells are stored as NaN and surface as `None`; they are never
/// zero-filled.
#[derive(Debug, Clone)]
pub struct RatingsTable {
    items: Vec<String>,
    columns: Vec<String>,
    column_index: HashMap<String, usize>,
    cells: Array2<f64>,
}

/// Plain row-major view for serialisation by the outer layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableView {
    pub columns: Vec<String>,
    pub items: Vec<String>,
    pub data: Vec<Vec<Option<f64>>>,
}

impl RatingsTable {
    /// Build from numeric cells, `None` meaning "not rated".
    pub fn new(
        items: Vec<String>,
        columns: Vec<String>,
        rows: Vec<Vec<Option<f64>>>,
    ) -> Result<Self> {
        let width = columns.len();
        let column_index = Self::index_columns(&columns)?;

        if rows.len() != items.len() {
            return Err(RecommenderError::InvalidInput(format!(
                "table has {} item labels but {} rows",
                items.len(),
                rows.len()
            )));
        }

        let mut cells = Array2::from_elem((items.len(), width), f64::NAN);
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != width {
                return Err(RecommenderError::InvalidInput(format!(
                    "row {} has {} cells, expected {}",
                    i,
                    row.len(),
                    width
                )));
            }
            for (j, cell) in row.into_iter().enumerate() {
                // Non-finite input is treated as a missing observation
                if let Some(value) = cell.filter(|v| v.is_finite()) {
                    cells[[i, j]] = value;
                }
            }
        }

        Ok(Self {
            items,
            columns,
            column_index,
            cells,
        })
    }

    /// Build from raw text cells. Cells that do not parse as a number are
    /// missing, not an error.
    pub fn from_raw(
        items: Vec<String>,
        columns: Vec<String>,
        rows: Vec<Vec<String>>,
    ) -> Result<Self> {
        let numeric = rows
            .into_iter()
            .map(|row| row.iter().map(|cell| coerce_numeric(cell)).collect())
            .collect();
        Self::new(items, columns, numeric)
    }

    fn index_columns(columns: &[String]) -> Result<HashMap<String, usize>> {
        let mut index = HashMap::with_capacity(columns.len());
        for (j, name) in columns.iter().enumerate() {
            if index.insert(name.clone(), j).is_some() {
                return Err(RecommenderError::InvalidInput(format!(
                    "duplicate column '{}'",
                    name
                )));
            }
        }
        Ok(index)
    }

    pub fn items(&self) -> &[String] {
        &self.items
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn n_items(&self) -> usize {
        self.items.len()
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.column_index.get(name).copied()
    }

    /// Column position or `UnknownColumn`.
    pub fn require_column(&self, name: &str) -> Result<usize> {
        self.column_position(name)
            .ok_or_else(|| RecommenderError::UnknownColumn(name.to_string()))
    }

    /// Contiguous copy of a column, NaN for missing cells.
    pub fn column_values(&self, position: usize) -> Vec<f64> {
        self.cells.column(position).to_vec()
    }

    pub fn cell(&self, item: usize, column: usize) -> Option<f64> {
        self.cells
            .get((item, column))
            .copied()
            .filter(|v| !v.is_nan())
    }

    pub fn view(&self) -> TableView {
        let data = self
            .cells
            .rows()
            .into_iter()
            .map(|row| {
                row.iter()
                    .map(|v| if v.is_nan() { None } else { Some(*v) })
                    .collect()
            })
            .collect();

        TableView {
            columns: self.columns.clone(),
            items: self.items.clone(),
            data,
        }
    }
}

fn coerce_numeric(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_new_keeps_missing_cells() {
        let table = RatingsTable::new(
            labels(&["I1", "I2"]),
            labels(&["A", "B"]),
            vec![vec![Some(5.0), None], vec![Some(0.0), Some(3.0)]],
        )
        .unwrap();

        assert_eq!(table.cell(0, 1), None);
        assert_eq!(table.cell(1, 0), Some(0.0));
        assert!(table.column_values(1)[0].is_nan());
    }

    #[test]
    fn test_from_raw_coerces_bad_cells_to_missing() {
        let table = RatingsTable::from_raw(
            labels(&["I1", "I2", "I3"]),
            labels(&["A"]),
            vec![
                vec!["4.5".to_string()],
                vec!["n/a".to_string()],
                vec!["".to_string()],
            ],
        )
        .unwrap();

        assert_eq!(table.cell(0, 0), Some(4.5));
        assert_eq!(table.cell(1, 0), None);
        assert_eq!(table.cell(2, 0), None);
    }

    #[test]
    fn test_rejects_ragged_rows() {
        let result = RatingsTable::new(
            labels(&["I1"]),
            labels(&["A", "B"]),
            vec![vec![Some(1.0)]],
        );
        assert!(matches!(result, Err(RecommenderError::InvalidInput(_))));
    }

    #[test]
    fn test_rejects_duplicate_columns() {
        let result = RatingsTable::new(
            labels(&["I1"]),
            labels(&["A", "A"]),
            vec![vec![Some(1.0), Some(2.0)]],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_view_round_trips_missing() {
        let table = RatingsTable::new(
            labels(&["I1"]),
            labels(&["A", "B"]),
            vec![vec![Some(2.0), Some(f64::INFINITY)]],
        )
        .unwrap();

        let view = table.view();
        assert_eq!(view.columns, labels(&["A", "B"]));
        assert_eq!(view.data, vec![vec![Some(2.0), None]]);
    }

    #[test]
    fn test_require_column() {
        let table =
            RatingsTable::new(labels(&["I1"]), labels(&["A"]), vec![vec![Some(1.0)]]).unwrap();
        assert_eq!(table.require_column("A").unwrap(), 0);
        assert!(matches!(
            table.require_column("Z"),
            Err(RecommenderError::UnknownColumn(_))
        ));
    }
}
