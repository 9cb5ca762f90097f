use crate::data_io;
use crate::error::{ContprepError, Result};
use crate::table_writer::TableWriter;
use csv::ReaderBuilder;
use std::io::{BufRead, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Column positions of the requested ancient individuals, resolved once
/// from the reads header.
#[derive(Debug, Clone, PartialEq)]
pub struct AncientColumns {
    /// Offset of each individual's `_der` column; `_anc` and `_other` follow it
    pub offsets: Vec<usize>,
    /// Header labels for the selected triplets, in output order
    pub labels: Vec<String>,
}

impl AncientColumns {
    pub fn resolve(header: &[String], individuals: &[String]) -> Result<Self> {
        let mut offsets = Vec::with_capacity(individuals.len());
        let mut labels = Vec::with_capacity(individuals.len() * 3);

        for id in individuals {
            let der = format!("{}_der", id);
            let offset = header
                .iter()
                .position(|column| *column == der)
                .ok_or_else(|| ContprepError::MissingIndividual { id: id.clone() })?;

            if offset + 2 >= header.len() {
                return Err(ContprepError::malformed(
                    "ancient reads header",
                    1,
                    format!("'{}' is not followed by its anc/other columns", der),
                ));
            }

            labels.extend(header[offset..offset + 3].iter().cloned());
            offsets.push(offset);
        }

        Ok(Self { offsets, labels })
    }

    /// Last column any selected individual needs
    fn max_column(&self) -> usize {
        self.offsets.iter().map(|&o| o + 2).max().unwrap_or(1)
    }
}

#[derive(Debug, Clone)]
pub struct MergeReport {
    pub offsets: Vec<usize>,
    pub n_merged: usize,
    /// Ancient rows passed over without a matching frequency row
    pub n_skipped: usize,
    pub output: Option<PathBuf>,
}

/// Forward-only cursor over whitespace-delimited ancient read rows
struct AncientCursor<R: BufRead> {
    lines: std::io::Lines<R>,
    line_num: usize,
}

impl<R: BufRead> AncientCursor<R> {
    fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_num: 0,
        }
    }

    /// Next non-blank row as tokens, `None` once the stream is exhausted
    fn advance(&mut self) -> Result<Option<Vec<String>>> {
        for line in self.lines.by_ref() {
            let line = line?;
            self.line_num += 1;

            let tokens: Vec<String> = line.split_whitespace().map(str::to_string).collect();
            match tokens.len() {
                0 => continue,
                1 => {
                    return Err(ContprepError::malformed(
                        "ancient reads",
                        self.line_num,
                        "expected chromosome and position",
                    ))
                }
                _ => return Ok(Some(tokens)),
            }
        }
        Ok(None)
    }
}

/// Sorted merge-join of a group's frequency table with ancient read counts.
///
/// Both inputs must be ordered the same way (the order of the source
/// `.snp` file), and every frequency row must have an ancient row at or
/// after the cursor. Rows are matched on the verbatim chromosome and
/// position strings.
pub struct ReadsMerger {
    individuals: Vec<String>,
}

impl ReadsMerger {
    pub fn new(individuals: Vec<String>) -> Self {
        Self { individuals }
    }

    pub fn individuals(&self) -> &[String] {
        &self.individuals
    }

    /// Merge the frequency table at `freq_path` with `ancient_path` into `out_path`
    pub fn merge_file(
        &self,
        group: &str,
        freq_path: &Path,
        ancient_path: &Path,
        out_path: &Path,
    ) -> Result<MergeReport> {
        log::info!(
            "Merging '{}' frequencies with ancient reads for {}",
            group,
            self.individuals.join(", ")
        );

        let freq = data_io::open_input(freq_path)?;
        let ancient = data_io::open_input(ancient_path)?;
        let mut writer = TableWriter::create(out_path)?;

        let mut report = self.merge(freq, ancient, &mut writer)?;
        writer.finish()?;

        log::info!("Merged table written to {}", out_path.display());
        report.output = Some(out_path.to_path_buf());
        Ok(report)
    }

    pub fn merge<F: Read, A: BufRead, W: Write>(
        &self,
        freq: F,
        ancient: A,
        writer: &mut TableWriter<W>,
    ) -> Result<MergeReport> {
        let start_time = Instant::now();

        let mut cursor = AncientCursor::new(ancient);
        let header = cursor.advance()?.ok_or_else(|| {
            ContprepError::malformed("ancient reads", 1, "missing header line")
        })?;
        let columns = AncientColumns::resolve(&header, &self.individuals)?;
        let min_len = columns.max_column() + 1;
        log::debug!("Resolved ancient columns {:?}", columns.offsets);

        let mut freq_reader = ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .flexible(true)
            .from_reader(freq);

        let mut out_header: Vec<String> =
            freq_reader.headers()?.iter().map(str::to_string).collect();
        out_header.extend(columns.labels.iter().cloned());
        writer.write_header(&out_header)?;

        let mut n_merged = 0;
        let mut n_skipped = 0;
        let mut current = cursor.advance()?;

        for (idx, record) in freq_reader.records().enumerate() {
            let record = record?;
            if record.len() < 3 {
                return Err(ContprepError::malformed(
                    "frequency table",
                    idx + 2,
                    format!("expected 3 fields, found {}", record.len()),
                ));
            }
            let (chrom, pos, af) = (&record[0], &record[1], &record[2]);

            let ancient_row = loop {
                match current.take() {
                    None => {
                        return Err(ContprepError::UnmatchedPosition {
                            chrom: chrom.to_string(),
                            pos: pos.to_string(),
                        })
                    }
                    Some(tokens) if tokens[0] == chrom && tokens[1] == pos => break tokens,
                    Some(_) => {
                        n_skipped += 1;
                        current = cursor.advance()?;
                    }
                }
            };

            if ancient_row.len() < min_len {
                return Err(ContprepError::malformed(
                    "ancient reads",
                    cursor.line_num,
                    format!("expected at least {} fields, found {}", min_len, ancient_row.len()),
                ));
            }

            let mut row: Vec<&str> = Vec::with_capacity(3 + columns.offsets.len() * 3);
            row.extend([chrom, pos, af]);
            for &offset in &columns.offsets {
                row.extend(ancient_row[offset..offset + 3].iter().map(String::as_str));
            }
            writer.write_row(&row)?;
            n_merged += 1;

            current = cursor.advance()?;
        }

        let report = MergeReport {
            offsets: columns.offsets,
            n_merged,
            n_skipped,
            output: None,
        };

        log::info!(
            "Merged {} variants in {:.2} seconds ({} ancient rows without frequency)",
            report.n_merged,
            start_time.elapsed().as_secs_f64(),
            report.n_skipped
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    type TestResult = std::result::Result<(), Box<dyn Error>>;

    const READS: &str = "\
Chrom\tPos\tIND1_der\tIND1_anc\tIND1_other\tIND2_der\tIND2_anc\tIND2_other
1\t100\t1\t2\t0\t0\t3\t0
1\t200\t0\t0\t0\t4\t0\t1
1\t300\t2\t2\t1\t1\t1\t0
2\t150\t0\t5\t0\t2\t2\t2
";

    fn header(cols: &[&str]) -> Vec<String> {
        cols.iter().map(|s| s.to_string()).collect()
    }

    fn ids(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn merge(freq: &str, reads: &str, individuals: &[&str]) -> Result<(MergeReport, String)> {
        let mut writer = TableWriter::new(Vec::new());
        let report = ReadsMerger::new(ids(individuals)).merge(
            freq.as_bytes(),
            reads.as_bytes(),
            &mut writer,
        )?;
        let out = String::from_utf8(writer.finish()?).expect("utf8 output");
        Ok((report, out))
    }

    #[test]
    fn test_resolve_single_individual() -> TestResult {
        let columns = AncientColumns::resolve(
            &header(&["Chrom", "Pos", "IND1_der", "IND1_anc", "IND1_other"]),
            &ids(&["IND1"]),
        )?;
        assert_eq!(columns.offsets, vec![2]);
        assert_eq!(columns.labels, vec!["IND1_der", "IND1_anc", "IND1_other"]);
        assert_eq!(columns.max_column(), 4);
        Ok(())
    }

    #[test]
    fn test_resolve_unknown_individual() {
        let err = AncientColumns::resolve(
            &header(&["Chrom", "Pos", "IND1_der", "IND1_anc", "IND1_other"]),
            &ids(&["IND9"]),
        )
        .unwrap_err();
        assert!(matches!(err, ContprepError::MissingIndividual { id } if id == "IND9"));
    }

    #[test]
    fn test_resolve_truncated_triplet() {
        let err = AncientColumns::resolve(
            &header(&["Chrom", "Pos", "IND1_der", "IND1_anc"]),
            &ids(&["IND1"]),
        )
        .unwrap_err();
        assert!(matches!(err, ContprepError::MalformedLine { .. }));
    }

    #[test]
    fn test_merge_skips_ancient_rows_without_frequency() -> TestResult {
        let freq = "Chrom\tPos\tAF\n1\t100\t0.25\n1\t300\t0.5\n";
        let (report, out) = merge(freq, READS, &["IND2"])?;

        assert_eq!(
            out,
            "Chrom\tPos\tAF\tIND2_der\tIND2_anc\tIND2_other\n\
             1\t100\t0.25\t0\t3\t0\n\
             1\t300\t0.5\t1\t1\t0\n"
        );
        assert_eq!(report.offsets, vec![5]);
        assert_eq!(report.n_merged, 2);
        assert_eq!(report.n_skipped, 1);
        Ok(())
    }

    #[test]
    fn test_merge_follows_requested_individual_order() -> TestResult {
        let freq = "Chrom\tPos\tAF\n2\t150\t0.1\n";
        let (report, out) = merge(freq, READS, &["IND2", "IND1"])?;

        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(
            lines[0],
            "Chrom\tPos\tAF\tIND2_der\tIND2_anc\tIND2_other\tIND1_der\tIND1_anc\tIND1_other"
        );
        assert_eq!(lines[1], "2\t150\t0.1\t2\t2\t2\t0\t5\t0");
        assert_eq!(report.offsets, vec![5, 2]);
        Ok(())
    }

    #[test]
    fn test_merge_preserves_frequency_order() -> TestResult {
        let freq = "Chrom\tPos\tAF\n1\t100\t0.1\n1\t200\t0.2\n1\t300\t0.3\n2\t150\t0.4\n";
        let (report, out) = merge(freq, READS, &["IND1"])?;

        let positions: Vec<&str> = out
            .lines()
            .skip(1)
            .map(|l| l.split('\t').nth(1).unwrap())
            .collect();
        assert_eq!(positions, vec!["100", "200", "300", "150"]);
        assert_eq!(report.n_skipped, 0);
        Ok(())
    }

    #[test]
    fn test_whitespace_delimited_reads() -> TestResult {
        let reads = "Chrom Pos A_der A_anc A_other\n1   100  3 4 0\n";
        let (_, out) = merge("Chrom\tPos\tAF\n1\t100\t0.5\n", reads, &["A"])?;
        assert_eq!(out.lines().nth(1), Some("1\t100\t0.5\t3\t4\t0"));
        Ok(())
    }

    #[test]
    fn test_missing_position_is_an_alignment_error() {
        let freq = "Chrom\tPos\tAF\n1\t12345\t0.3\n";
        let err = merge(freq, READS, &["IND1"]).unwrap_err();
        assert!(matches!(
            err,
            ContprepError::UnmatchedPosition { chrom, pos } if chrom == "1" && pos == "12345"
        ));
    }

    #[test]
    fn test_out_of_order_position_is_an_alignment_error() {
        // 1:100 was already passed when looking for 1:300
        let freq = "Chrom\tPos\tAF\n1\t300\t0.3\n1\t100\t0.1\n";
        let err = merge(freq, READS, &["IND1"]).unwrap_err();
        assert!(matches!(err, ContprepError::UnmatchedPosition { pos, .. } if pos == "100"));
    }

    #[test]
    fn test_matched_row_too_short() {
        let reads = "Chrom\tPos\tA_der\tA_anc\tA_other\n1\t100\t3\n";
        let err = merge("Chrom\tPos\tAF\n1\t100\t0.5\n", reads, &["A"]).unwrap_err();
        assert!(matches!(err, ContprepError::MalformedLine { line: 2, .. }));
    }

    #[test]
    fn test_empty_reads_stream() {
        let err = merge("Chrom\tPos\tAF\n", "", &["A"]).unwrap_err();
        assert!(matches!(err, ContprepError::MalformedLine { line: 1, .. }));
    }

    #[test]
    fn test_empty_frequency_table_writes_header_only() -> TestResult {
        let (report, out) = merge("Chrom\tPos\tAF\n", READS, &["IND1"])?;
        assert_eq!(out, "Chrom\tPos\tAF\tIND1_der\tIND1_anc\tIND1_other\n");
        assert_eq!(report.n_merged, 0);
        Ok(())
    }
}
