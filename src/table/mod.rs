use anyhow::{bail, Context, Result};
use std::io::{Read, Write};

/// Marker carried by column names that a previous serialization pass synthesized
pub const UNNAMED_MARKER: &str = "Unnamed";

/// Returns true when a column name looks like an auto-generated index column.
///
/// This is a case-sensitive substring test, so `Unnamed: 0` and `old Unnamed`
/// both match while `unnamed` does not.
pub fn is_unnamed_column(name: &str) -> bool {
    name.contains(UNNAMED_MARKER)
}

/// Name given to a blank header cell at `index`
fn unnamed_header(index: usize) -> String {
    format!("{}: {}", UNNAMED_MARKER, index)
}

/// In-memory CSV table with named columns and ordered rows
///
/// Cells are kept as the exact text read from the file, so a table written back
/// out reproduces every value of the columns it still holds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Parse CSV text with a header row.
    ///
    /// Blank header cells are named `Unnamed: <position>`. Short rows are padded
    /// with empty cells; rows with more fields than the header are rejected.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers: Vec<String> = reader
            .headers()
            .context("Failed to read CSV header")?
            .iter()
            .enumerate()
            .map(|(idx, name)| {
                if name.is_empty() {
                    unnamed_header(idx)
                } else {
                    name.to_string()
                }
            })
            .collect();

        if headers.is_empty() {
            bail!("No columns to parse from file");
        }

        let width = headers.len();
        let mut rows = Vec::new();
        for (row_idx, result) in reader.records().enumerate() {
            let record =
                result.with_context(|| format!("Failed to parse CSV data row {}", row_idx + 1))?;
            if record.len() > width {
                bail!(
                    "Expected {} fields in data row {}, saw {}",
                    width,
                    row_idx + 1,
                    record.len()
                );
            }

            let mut row: Vec<String> = record.iter().map(str::to_string).collect();
            row.resize(width, String::new());
            rows.push(row);
        }

        Ok(Self { headers, rows })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn column_count(&self) -> usize {
        self.headers.len()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Keep only the columns whose name satisfies `keep`, preserving order.
    /// Returns the names of the removed columns.
    pub fn retain_columns<F>(&mut self, keep: F) -> Vec<String>
    where
        F: Fn(&str) -> bool,
    {
        let mask: Vec<bool> = self.headers.iter().map(|h| keep(h)).collect();
        if mask.iter().all(|k| *k) {
            return Vec::new();
        }

        let headers = std::mem::take(&mut self.headers);
        let mut removed = Vec::new();
        for (name, keep) in headers.into_iter().zip(&mask) {
            if *keep {
                self.headers.push(name);
            } else {
                removed.push(name);
            }
        }

        for row in &mut self.rows {
            *row = std::mem::take(row)
                .into_iter()
                .zip(&mask)
                .filter_map(|(cell, keep)| keep.then_some(cell))
                .collect();
        }

        removed
    }

    /// Remove every column whose name contains `Unnamed`
    pub fn drop_unnamed_columns(&mut self) -> Vec<String> {
        self.retain_columns(|name| !is_unnamed_column(name))
    }

    /// Serialize the table as CSV.
    ///
    /// With `with_index`, a leading column with a blank header holding the
    /// zero-based row position is written first. That column is read back as
    /// `Unnamed: 0`.
    pub fn write_csv<W: Write>(&self, writer: W, with_index: bool) -> Result<()> {
        let mut writer = csv::Writer::from_writer(writer);

        if with_index {
            writer.write_record(
                std::iter::once("").chain(self.headers.iter().map(String::as_str)),
            )?;
            for (idx, row) in self.rows.iter().enumerate() {
                let position = idx.to_string();
                writer.write_record(
                    std::iter::once(position.as_str()).chain(row.iter().map(String::as_str)),
                )?;
            }
        } else {
            writer.write_record(&self.headers)?;
            for row in &self.rows {
                writer.write_record(row)?;
            }
        }

        writer.flush().context("Failed to flush CSV output")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Table {
        Table::from_reader(text.as_bytes()).unwrap()
    }

    fn csv_string(table: &Table, with_index: bool) -> String {
        let mut buf = Vec::new();
        table.write_csv(&mut buf, with_index).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_unnamed_match_is_case_sensitive_substring() {
        assert!(is_unnamed_column("Unnamed: 0"));
        assert!(is_unnamed_column("Unnamed: 12"));
        assert!(is_unnamed_column("legacy Unnamed col"));
        assert!(!is_unnamed_column("unnamed"));
        assert!(!is_unnamed_column("UNNAMED"));
        assert!(!is_unnamed_column("name"));
    }

    #[test]
    fn test_parse_keeps_cells_verbatim() {
        let table = parse("id,price,note\n007,1.50,\"a, b\"\n");
        assert_eq!(table.headers(), ["id", "price", "note"]);
        assert_eq!(table.rows()[0], ["007", "1.50", "a, b"]);
    }

    #[test]
    fn test_blank_headers_become_unnamed() {
        let table = parse(",name,,value\n0,alice,x,1\n");
        assert_eq!(
            table.headers(),
            ["Unnamed: 0", "name", "Unnamed: 2", "value"]
        );
    }

    #[test]
    fn test_short_rows_are_padded() {
        let table = parse("a,b,c\n1,2\n");
        assert_eq!(table.rows()[0], ["1", "2", ""]);
    }

    #[test]
    fn test_long_rows_are_rejected() {
        let err = Table::from_reader("a,b\n1,2,3\n".as_bytes()).unwrap_err();
        assert!(err.to_string().contains("Expected 2 fields"));
    }

    #[test]
    fn test_empty_input_is_rejected() {
        assert!(Table::from_reader("".as_bytes()).is_err());
    }

    #[test]
    fn test_header_only_table() {
        let table = parse("Unnamed: 0,name\n");
        assert_eq!(table.row_count(), 0);
        assert_eq!(table.column_count(), 2);
    }

    #[test]
    fn test_drop_unnamed_preserves_order_and_rows() {
        let mut table = parse("Unnamed: 0,name,Unnamed: 0.1,value,unnamed\n0,alice,0,1,x\n1,bob,1,2,y\n");
        let removed = table.drop_unnamed_columns();

        assert_eq!(removed, ["Unnamed: 0", "Unnamed: 0.1"]);
        assert_eq!(table.headers(), ["name", "value", "unnamed"]);
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.rows()[0], ["alice", "1", "x"]);
        assert_eq!(table.rows()[1], ["bob", "2", "y"]);
    }

    #[test]
    fn test_drop_unnamed_without_matches_is_noop() {
        let mut table = parse("name,value\nalice,1\n");
        let before = table.clone();
        assert!(table.drop_unnamed_columns().is_empty());
        assert_eq!(table, before);
    }

    #[test]
    fn test_write_csv_plain() {
        let mut table = parse("Unnamed: 0,name,value\n0,alice,1\n1,bob,2\n");
        table.drop_unnamed_columns();
        assert_eq!(csv_string(&table, false), "name,value\nalice,1\nbob,2\n");
    }

    #[test]
    fn test_write_csv_quotes_when_needed() {
        let table = parse("note\n\"a, \"\"b\"\"\"\n");
        assert_eq!(table.rows()[0], ["a, \"b\""]);
        assert_eq!(csv_string(&table, false), "note\n\"a, \"\"b\"\"\"\n");
    }

    #[test]
    fn test_index_artifact_is_stripped_on_next_read() {
        let table = parse("name,value\nalice,1\nbob,2\n");
        let written = csv_string(&table, true);
        assert_eq!(written, ",name,value\n0,alice,1\n1,bob,2\n");

        let mut reread = parse(&written);
        assert_eq!(reread.headers()[0], "Unnamed: 0");
        assert_eq!(reread.drop_unnamed_columns(), ["Unnamed: 0"]);
        assert_eq!(reread, table);
    }
}
