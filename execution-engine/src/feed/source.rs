use anyhow::{Context, Result};
use log::warn;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;
use trading::{DataSource, MarketRecord};

/// Reads one JSON `MarketRecord` per line. Blank lines and malformed lines are skipped.
pub struct JsonLinesSource {
    lines: Lines<BufReader<File>>,
    line_no: usize,
}

impl JsonLinesSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("failed to open market data file {}", path.display()))?;
        Ok(Self {
            lines: BufReader::new(file).lines(),
            line_no: 0,
        })
    }
}

impl DataSource for JsonLinesSource {
    fn next_record(&mut self) -> Option<MarketRecord> {
        loop {
            self.line_no += 1;
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => {
                    warn!("stopping market data read at line {}: {}", self.line_no, e);
                    return None;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(record) => return Some(record),
                Err(e) => warn!("line {}: unparseable market record: {}", self.line_no, e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn skips_blank_and_broken_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"kind":"bar","instrument":"X","timestamp":1,"open":1,"high":1,"low":1,"close":1}}"#
        )
        .unwrap();
        writeln!(file).unwrap();
        writeln!(file, "not json").unwrap();
        writeln!(
            file,
            r#"{{"kind":"tick","instrument":"X","timestamp":2,"bid":1,"ask":1,"last":1}}"#
        )
        .unwrap();

        let mut source = JsonLinesSource::open(file.path()).unwrap();
        assert_eq!(source.next_record().map(|r| r.timestamp()), Some(1));
        assert_eq!(source.next_record().map(|r| r.timestamp()), Some(2));
        assert!(source.next_record().is_none());
    }

    #[test]
    fn missing_file_has_context() {
        let err = JsonLinesSource::open("/definitely/not/here.jsonl")
            .err()
            .unwrap();
        assert!(err.to_string().contains("failed to open market data file"));
    }
}
