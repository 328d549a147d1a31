#[derive(Debug)]
pub struct RawTable {
    /// Name of the archive member the rows came from, without directories.
    pub member_name: String,
    /// Every CSV record as-is, metadata block and header row included.
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn cell(&self, row: usize, col: usize) -> Option<&str> {
        self.rows.get(row)?.get(col).map(String::as_str)
    }
}
