use anyhow::{Result, anyhow};

/// Row-major numeric feature matrix. Missing values are NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    columns: Vec<String>,
    values: Vec<f64>,
}

impl FeatureMatrix {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            values: Vec::new(),
        }
    }

    pub fn from_rows(columns: Vec<String>, rows: &[Vec<f64>]) -> Result<Self> {
        let mut matrix = Self::new(columns);
        for row in rows {
            matrix.push_row(row)?;
        }
        Ok(matrix)
    }

    pub fn push_row(&mut self, row: &[f64]) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(anyhow!(
                "row has {} values, matrix has {} columns",
                row.len(),
                self.columns.len()
            ));
        }
        self.values.extend_from_slice(row);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn n_rows(&self) -> usize {
        if self.columns.is_empty() {
            0
        } else {
            self.values.len() / self.columns.len()
        }
    }

    pub fn row(&self, idx: usize) -> &[f64] {
        let n = self.columns.len();
        &self.values[idx * n..(idx + 1) * n]
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.values[row * self.columns.len() + col]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_must_match_column_count() {
        let mut m = FeatureMatrix::new(vec!["a".into(), "b".into()]);
        m.push_row(&[1.0, f64::NAN]).unwrap();
        m.push_row(&[3.0, 4.0]).unwrap();
        assert!(m.push_row(&[1.0]).is_err());
        assert_eq!(m.n_rows(), 2);
        assert_eq!(m.get(1, 0), 3.0);
        assert!(m.row(0)[1].is_nan());
    }
}
