use crate::common::*;

use fnv::FnvHashSet as HashSet;
use topo_graph::common_io::{read_lines, write_lines};

/// A named numeric table: row names down the first column, feature
/// names across the header. Column order is semantic-free but must
/// survive the pipeline unchanged.
#[derive(Debug, Clone)]
pub struct DataTable {
    pub values: Mat,
    /// feature names, one per column
    pub columns: Vec<Box<str>>,
    /// row names (samples or nodes)
    pub rows: Vec<Box<str>>,
}

fn delimiter_for(file: &str) -> char {
    let stem = file.strip_suffix(".gz").unwrap_or(file);
    if stem.ends_with(".csv") {
        ','
    } else {
        '\t'
    }
}

impl DataTable {
    pub fn nrows(&self) -> usize {
        self.values.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.values.ncols()
    }

    /// Parse a delimited text file with a header line. The delimiter
    /// follows the extension (`.csv` vs anything else), `.gz` handled
    /// transparently.
    pub fn from_file(data_file: &str) -> anyhow::Result<DataTable> {
        let delim = delimiter_for(data_file);
        let lines = read_lines(data_file)?;

        if lines.len() < 2 {
            anyhow::bail!("{}: no data rows under the header", data_file);
        }

        let mut header = lines[0].split(delim);
        header.next(); // row name column
        let columns: Vec<Box<str>> = header.map(|w| w.trim().into()).collect();

        if columns.is_empty() {
            anyhow::bail!("{}: header names no feature columns", data_file);
        }

        let mut rows = Vec::with_capacity(lines.len() - 1);
        let mut values = Vec::with_capacity((lines.len() - 1) * columns.len());

        for line in lines[1..].iter() {
            let mut words = line.split(delim);
            let name = words
                .next()
                .ok_or_else(|| anyhow::anyhow!("{}: empty line", data_file))?;
            rows.push(name.trim().into());

            let mut parsed = 0_usize;
            for w in words {
                values.push(w.trim().parse::<f64>()?);
                parsed += 1;
            }
            if parsed != columns.len() {
                anyhow::bail!(
                    "{}: row {} has {} values for {} columns",
                    data_file,
                    name,
                    parsed,
                    columns.len()
                );
            }
        }

        let values = Mat::from_shape_vec((rows.len(), columns.len()), values)?;

        info!(
            "read {}: {} rows x {} columns",
            data_file,
            rows.len(),
            columns.len()
        );

        Ok(DataTable {
            values,
            columns,
            rows,
        })
    }

    /// Write the table back out, delimiter chosen by extension
    pub fn to_file(&self, data_file: &str) -> anyhow::Result<()> {
        let delim = delimiter_for(data_file).to_string();

        let mut lines: Vec<Box<str>> = Vec::with_capacity(self.nrows() + 1);
        let mut header = vec!["name".to_string()];
        header.extend(self.columns.iter().map(|c| c.to_string()));
        lines.push(header.join(&delim).into_boxed_str());

        for (i, name) in self.rows.iter().enumerate() {
            let mut fields = vec![name.to_string()];
            fields.extend(self.values.row(i).iter().map(|v| format!("{}", v)));
            lines.push(fields.join(&delim).into_boxed_str());
        }

        write_lines(&lines, data_file)
    }

    /// Merge tables column-wise. All tables must agree on row count;
    /// row names follow the first table.
    pub fn concat_columns(tables: Vec<DataTable>) -> anyhow::Result<DataTable> {
        let Some(first) = tables.first() else {
            anyhow::bail!("no tables to merge");
        };

        let nrows = first.nrows();
        if let Some(bad) = tables.iter().find(|t| t.nrows() != nrows) {
            anyhow::bail!(
                "row count mismatch across metadata files: {} vs {}",
                nrows,
                bad.nrows()
            );
        }

        let rows = first.rows.clone();
        let mut columns = Vec::new();
        let ncols: usize = tables.iter().map(|t| t.ncols()).sum();
        let mut values = Mat::zeros((nrows, ncols));

        let mut at = 0_usize;
        for table in tables.into_iter() {
            let width = table.ncols();
            values
                .slice_mut(ndarray::s![.., at..at + width])
                .assign(&table.values);
            columns.extend(table.columns);
            at += width;
        }

        let seen: HashSet<&Box<str>> = columns.iter().collect();
        if seen.len() != columns.len() {
            warn!("duplicated feature names after merging metadata files");
        }

        Ok(DataTable {
            values,
            columns,
            rows,
        })
    }

    /// Restrict to the named columns, preserving their given order
    pub fn select_columns(&self, names: &[Box<str>]) -> anyhow::Result<DataTable> {
        let mut picks = Vec::with_capacity(names.len());
        for name in names.iter() {
            let j = self
                .columns
                .iter()
                .position(|c| c == name)
                .ok_or_else(|| anyhow::anyhow!("unknown feature column: {}", name))?;
            picks.push(j);
        }

        let mut values = Mat::zeros((self.nrows(), picks.len()));
        for (out_j, &j) in picks.iter().enumerate() {
            values.column_mut(out_j).assign(&self.values.column(j));
        }

        Ok(DataTable {
            values,
            columns: names.to_vec(),
            rows: self.rows.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(rows: usize, cols: &[&str]) -> DataTable {
        let columns: Vec<Box<str>> = cols.iter().map(|&c| c.into()).collect();
        let values = Mat::from_shape_fn((rows, columns.len()), |(i, j)| {
            (i * 10 + j) as f64
        });
        DataTable {
            values,
            columns,
            rows: (0..rows).map(|i| format!("r{}", i).into()).collect(),
        }
    }

    #[test]
    fn concat_keeps_column_order() {
        let merged =
            DataTable::concat_columns(vec![table(3, &["a", "b"]), table(3, &["c"])])
                .unwrap();
        let names: Vec<&str> = merged.columns.iter().map(|c| c.as_ref()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(merged.values[(1, 2)], 10.0);
    }

    #[test]
    fn concat_rejects_mismatched_rows() {
        let out = DataTable::concat_columns(vec![table(3, &["a"]), table(4, &["b"])]);
        assert!(out.is_err());
    }

    #[test]
    fn select_columns_reorders() {
        let t = table(2, &["a", "b", "c"]);
        let picked = t.select_columns(&["c".into(), "a".into()]).unwrap();
        assert_eq!(picked.values[(0, 0)], 2.0);
        assert_eq!(picked.values[(0, 1)], 0.0);
    }

    #[test]
    fn file_round_trip() -> anyhow::Result<()> {
        let t = table(3, &["alpha", "beta"]);
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("meta.tsv").to_string_lossy().to_string();
        t.to_file(&path)?;
        let t2 = DataTable::from_file(&path)?;
        assert_eq!(t.columns, t2.columns);
        assert_eq!(t.rows, t2.rows);
        assert_eq!(t.values, t2.values);
        Ok(())
    }
}
