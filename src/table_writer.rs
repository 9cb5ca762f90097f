use crate::error::{ContprepError, Result};
use csv::{QuoteStyle, WriterBuilder};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Header of every frequency table
pub const FREQ_HEADER: [&str; 3] = ["Chrom", "Pos", "AF"];

/// Where each group's tables live
#[derive(Debug, Clone)]
pub struct OutputLayout {
    out_dir: PathBuf,
}

impl OutputLayout {
    pub fn new<P: AsRef<Path>>(out_dir: P) -> Self {
        Self {
            out_dir: out_dir.as_ref().to_path_buf(),
        }
    }

    /// `<dir>/<group>.output`
    pub fn frequency_path(&self, group: &str) -> PathBuf {
        self.out_dir.join(format!("{}.output", group))
    }

    /// `<dir>/<group>_<id1>_<id2>....reads`
    pub fn merged_path(&self, group: &str, individuals: &[String]) -> PathBuf {
        let mut stem = group.to_string();
        for id in individuals {
            stem.push('_');
            stem.push_str(id);
        }
        self.out_dir.join(format!("{}.reads", stem))
    }

    pub fn ensure_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.out_dir)?;
        Ok(())
    }
}

/// Tab-delimited table sink. Rows are written whole or not at all.
pub struct TableWriter<W: Write> {
    writer: csv::Writer<W>,
    rows_written: usize,
}

impl TableWriter<BufWriter<File>> {
    pub fn create<P: AsRef<Path>>(file_path: P) -> Result<Self> {
        let file = File::create(file_path.as_ref())?;
        log::debug!("Writing table to {}", file_path.as_ref().display());
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> TableWriter<W> {
    pub fn new(inner: W) -> Self {
        let writer = WriterBuilder::new()
            .delimiter(b'\t')
            .quote_style(QuoteStyle::Never)
            .has_headers(false)
            .from_writer(inner);
        Self {
            writer,
            rows_written: 0,
        }
    }

    pub fn write_header<I, T>(&mut self, header: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        self.writer.write_record(header)?;
        Ok(())
    }

    pub fn write_row<I, T>(&mut self, row: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        self.writer.write_record(row)?;
        self.rows_written += 1;
        Ok(())
    }

    /// Data rows written so far (header excluded)
    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    pub fn finish(mut self) -> Result<W> {
        self.writer.flush()?;
        self.writer.into_inner().map_err(|e| {
            ContprepError::Io(std::io::Error::new(e.error().kind(), e.error().to_string()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    type TestResult = std::result::Result<(), Box<dyn Error>>;

    #[test]
    fn test_output_naming() {
        let layout = OutputLayout::new("out");
        assert_eq!(layout.frequency_path("ASW"), Path::new("out/ASW.output"));
        assert_eq!(
            layout.merged_path("ASW", &["HRR051935".to_string(), "HRR051936".to_string()]),
            Path::new("out/ASW_HRR051935_HRR051936.reads")
        );
    }

    #[test]
    fn test_rows_are_tab_delimited() -> TestResult {
        let mut writer = TableWriter::new(Vec::new());
        writer.write_header(FREQ_HEADER)?;
        writer.write_row(["1", "752566", "0.25"])?;
        assert_eq!(writer.rows_written(), 1);

        let bytes = writer.finish()?;
        assert_eq!(String::from_utf8(bytes)?, "Chrom\tPos\tAF\n1\t752566\t0.25\n");
        Ok(())
    }
}
