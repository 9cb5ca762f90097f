use crate::data_io::{self, SnpReader};
use crate::error::{ContprepError, Result};
use crate::table_writer::{TableWriter, FREQ_HEADER};
use indicatif::{ProgressBar, ProgressStyle};
use ndarray::Array1;
use std::io::{BufRead, Write};
use std::path::Path;
use std::time::Instant;

const MISSING_CALL: u8 = b'9';

/// Derived allele frequencies of one population, streamed row by row
/// from an Eigenstrat `.geno` / `.snp` pair.
pub struct FrequencyCalculator {
    show_progress: bool,
}

#[derive(Debug, Clone)]
pub struct FrequencyReport {
    /// Population label the frequencies were computed for
    pub group: String,
    /// Raw per-row frequency; NaN where every selected call was missing
    pub frequencies: Array1<f64>,
    pub n_retained: usize,
    pub n_all_missing: usize,
    pub n_monomorphic: usize,
}

/// Outcome of a single genotype row
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RowFrequency {
    /// No selected individual had a call
    Missing,
    /// Frequency of exactly 0 or 1
    Monomorphic(f64),
    Informative(f64),
}

impl RowFrequency {
    pub fn value(&self) -> f64 {
        match *self {
            RowFrequency::Missing => f64::NAN,
            RowFrequency::Monomorphic(f) | RowFrequency::Informative(f) => f,
        }
    }
}

/// Derived allele frequency of one `.geno` row over the selected columns.
///
/// Calls count copies of the reference allele, so the derived frequency is
/// `1 - sum / (2 * called)`. Missing calls (`9`) are left out of both terms.
pub fn row_frequency(row: &[u8], indices: &[usize], line_num: usize) -> Result<RowFrequency> {
    let mut sum: u64 = 0;
    let mut allele_total: u64 = 0;

    for &idx in indices {
        let call = *row.get(idx).ok_or_else(|| {
            ContprepError::malformed(
                "geno file",
                line_num,
                format!("row has {} columns, individual index {} requested", row.len(), idx),
            )
        })?;

        match call {
            MISSING_CALL => continue,
            b'0' | b'1' | b'2' => {
                sum += u64::from(call - b'0');
                allele_total += 2;
            }
            other => {
                return Err(ContprepError::malformed(
                    "geno file",
                    line_num,
                    format!("invalid genotype call '{}' at column {}", other as char, idx),
                ))
            }
        }
    }

    if allele_total == 0 {
        return Ok(RowFrequency::Missing);
    }

    let freq = 1.0 - (sum as f64 / allele_total as f64);
    if freq == 0.0 || freq == 1.0 {
        Ok(RowFrequency::Monomorphic(freq))
    } else {
        Ok(RowFrequency::Informative(freq))
    }
}

impl FrequencyCalculator {
    pub fn new(show_progress: bool) -> Self {
        Self { show_progress }
    }

    /// Compute frequencies for `group` from files and write `out_path`.
    /// The `.geno` file is line-counted first to presize the frequency array.
    pub fn calculate_file(
        &self,
        geno_path: &Path,
        snp_path: &Path,
        indices: &[usize],
        group: &str,
        out_path: &Path,
    ) -> Result<FrequencyReport> {
        if indices.is_empty() {
            return Err(ContprepError::EmptyPopulation {
                label: group.to_string(),
            });
        }

        let n_rows = data_io::count_lines(geno_path)?;
        log::info!(
            "Computing derived allele frequencies for '{}' over {} variants",
            group,
            n_rows
        );

        let geno = data_io::open_input(geno_path)?;
        let snp = data_io::open_input(snp_path)?;
        let mut writer = TableWriter::create(out_path)?;

        let report = self.calculate(geno, snp, indices, group, Some(n_rows), &mut writer)?;
        let n_written = writer.rows_written();
        writer.finish()?;

        log::info!("Frequency table written to {} ({} rows)", out_path.display(), n_written);
        Ok(report)
    }

    /// Stream `geno` and `snp` in lockstep, writing retained variants to `writer`.
    ///
    /// `expected_rows` presizes the frequency array; without it the array
    /// grows as rows arrive.
    pub fn calculate<G: BufRead, S: BufRead, W: Write>(
        &self,
        mut geno: G,
        snp: S,
        indices: &[usize],
        group: &str,
        expected_rows: Option<usize>,
        writer: &mut TableWriter<W>,
    ) -> Result<FrequencyReport> {
        if indices.is_empty() {
            return Err(ContprepError::EmptyPopulation {
                label: group.to_string(),
            });
        }

        let start_time = Instant::now();
        let mut snp = SnpReader::new(snp);
        let mut frequencies = Vec::with_capacity(expected_rows.unwrap_or(0));
        let mut n_retained = 0;
        let mut n_all_missing = 0;
        let mut n_monomorphic = 0;

        let pb = self.progress_bar(expected_rows);
        writer.write_header(FREQ_HEADER)?;

        let mut line = Vec::new();
        let mut line_num = 0;
        let mut geno_rows = 0;
        loop {
            line.clear();
            if geno.read_until(b'\n', &mut line)? == 0 {
                break;
            }
            line_num += 1;
            if data_io::is_blank(&line) {
                continue;
            }
            geno_rows += 1;

            // One .snp row per .geno row, whether or not the variant is kept
            let snp_record = snp.next_record()?.ok_or(ContprepError::Desynchronized {
                geno_rows,
                snp_rows: snp.rows_read(),
            })?;

            let row = trim_line_end(&line);
            let outcome = row_frequency(row, indices, line_num)?;
            frequencies.push(outcome.value());

            match outcome {
                RowFrequency::Missing => n_all_missing += 1,
                RowFrequency::Monomorphic(freq) => {
                    log::trace!(
                        "Dropping {} ({}:{}, {} cM, {}>{}), derived AF {}",
                        snp_record.rs_id,
                        snp_record.chrom,
                        snp_record.physical_pos,
                        snp_record.genetic_pos,
                        snp_record.ref_allele.as_deref().unwrap_or("?"),
                        snp_record.alt_allele.as_deref().unwrap_or("?"),
                        freq
                    );
                    n_monomorphic += 1;
                }
                RowFrequency::Informative(freq) => {
                    writer.write_row([
                        snp_record.chrom.as_str(),
                        snp_record.physical_pos.as_str(),
                        freq.to_string().as_str(),
                    ])?;
                    n_retained += 1;
                }
            }

            if geno_rows % 10_000 == 0 {
                pb.set_position(geno_rows as u64);
            }
        }

        if snp.next_record()?.is_some() {
            return Err(ContprepError::Desynchronized {
                geno_rows,
                snp_rows: snp.rows_read(),
            });
        }
        if let Some(expected) = expected_rows {
            if expected != geno_rows {
                log::warn!(
                    "Expected {} genotype rows but read {}; input changed during the run?",
                    expected,
                    geno_rows
                );
            }
        }

        pb.finish_with_message(format!("{}: {} variants retained", group, n_retained));

        let report = FrequencyReport {
            group: group.to_string(),
            frequencies: Array1::from_vec(frequencies),
            n_retained,
            n_all_missing,
            n_monomorphic,
        };

        log::info!(
            "Frequency calculation for '{}' completed in {:.2} seconds",
            group,
            start_time.elapsed().as_secs_f64()
        );
        report.log_summary();

        if n_retained == 0 {
            log::warn!("No informative variants for '{}' (all monomorphic or missing)", group);
        }

        Ok(report)
    }

    fn progress_bar(&self, expected_rows: Option<usize>) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        match expected_rows {
            Some(n) => {
                let pb = ProgressBar::new(n as u64);
                let template = "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] \
                                {pos}/{len} ({percent}%) {msg}";
                if let Ok(style) = ProgressStyle::default_bar().template(template) {
                    pb.set_style(style.progress_chars("#>-"));
                }
                pb
            }
            None => {
                let pb = ProgressBar::new_spinner();
                if let Ok(style) = ProgressStyle::default_spinner()
                    .template("{spinner:.green} [{elapsed_precise}] {pos} rows {msg}")
                {
                    pb.set_style(style.tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ "));
                }
                pb
            }
        }
    }
}

fn trim_line_end(line: &[u8]) -> &[u8] {
    let mut end = line.len();
    while end > 0 && (line[end - 1] == b'\n' || line[end - 1] == b'\r') {
        end -= 1;
    }
    &line[..end]
}

impl FrequencyReport {
    pub fn n_variants(&self) -> usize {
        self.frequencies.len()
    }

    /// Mean, min and max over retained frequencies
    pub fn retained_stats(&self) -> Option<(f64, f64, f64)> {
        let retained: Vec<f64> = self
            .frequencies
            .iter()
            .copied()
            .filter(|&f| f > 0.0 && f < 1.0)
            .collect();
        if retained.is_empty() {
            return None;
        }

        let mean = retained.iter().sum::<f64>() / retained.len() as f64;
        let min = retained.iter().fold(f64::INFINITY, |a, &b| a.min(b));
        let max = retained.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
        Some((mean, min, max))
    }

    pub fn log_summary(&self) {
        log::info!("Frequency summary for '{}':", self.group);
        log::info!("  Variants read: {}", self.n_variants());
        log::info!("  Retained: {}", self.n_retained);
        log::info!("  Dropped (monomorphic): {}", self.n_monomorphic);
        log::info!("  Dropped (all missing): {}", self.n_all_missing);
        if let Some((mean, min, max)) = self.retained_stats() {
            log::info!("  Derived AF mean/min/max: {:.4} / {:.4} / {:.4}", mean, min, max);
        }
    }
}
