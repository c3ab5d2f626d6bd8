//! Minimal CSV sample-table loader so `CsvSource` has a real table to play
//! back, kept deliberately free of quoting/escaping edge cases a full CSV
//! crate would handle.

use std::io::BufRead;
use std::path::Path;

#[derive(Clone, Debug, Default)]
pub struct CsvPlaylist {
    rows: Vec<Vec<f64>>,
}

impl CsvPlaylist {
    pub fn from_reader(reader: impl BufRead) -> std::io::Result<Self> {
        let mut rows = Vec::new();
        for line in reader.lines() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let row: Vec<f64> = trimmed.split(',').map(|field| field.trim().parse::<f64>().unwrap_or(0.0)).collect();
            rows.push(row);
        }
        Ok(CsvPlaylist { rows })
    }

    pub fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn value(&self, row: usize, column: usize) -> Option<f64> {
        self.rows.get(row)?.get(column).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rows_and_columns() {
        let csv = "1.0,2.0\n3.5,4.25\n";
        let playlist = CsvPlaylist::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(playlist.row_count(), 2);
        assert_eq!(playlist.value(0, 0), Some(1.0));
        assert_eq!(playlist.value(1, 1), Some(4.25));
    }

    #[test]
    fn skips_blank_lines() {
        let csv = "1.0,2.0\n\n3.0,4.0\n";
        let playlist = CsvPlaylist::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(playlist.row_count(), 2);
    }
}
