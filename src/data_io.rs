use crate::error::{ContprepError, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::time::Instant;

/// Open an input table, reporting a missing path as `FileNotFound`
pub fn open_input<P: AsRef<Path>>(file_path: P) -> Result<BufReader<File>> {
    let file_path = file_path.as_ref();

    if !file_path.exists() {
        return Err(ContprepError::FileNotFound {
            path: file_path.display().to_string(),
        });
    }

    let file_size = std::fs::metadata(file_path)?.len();
    log::debug!(
        "Opening {} ({:.2} MB)",
        file_path.display(),
        file_size as f64 / (1024.0 * 1024.0)
    );

    Ok(BufReader::new(File::open(file_path)?))
}

/// Zero-based line indices of the individuals whose `.ind` line contains `label`.
///
/// Matching is a case-sensitive substring search over the whole line, so a
/// label such as `CHB` also selects `CHB2`. An empty label selects everyone.
pub fn read_population_indices<R: BufRead>(reader: R, label: &str) -> Result<Vec<usize>> {
    let mut indices = Vec::new();

    for (line_num, line) in reader.lines().enumerate() {
        if line?.contains(label) {
            indices.push(line_num);
        }
    }

    Ok(indices)
}

/// Load population indices from an individual metadata file
pub fn load_population_indices<P: AsRef<Path>>(ind_path: P, label: &str) -> Result<Vec<usize>> {
    let ind_path = ind_path.as_ref();
    let indices = read_population_indices(open_input(ind_path)?, label)?;

    log::info!(
        "Population '{}': {} individuals selected from {}",
        label,
        indices.len(),
        ind_path.display()
    );
    if indices.is_empty() {
        log::warn!("Label '{}' matched no line in {}", label, ind_path.display());
    }

    Ok(indices)
}

/// Count the non-blank lines of a file without holding more than one line at a time
pub fn count_lines<P: AsRef<Path>>(file_path: P) -> Result<usize> {
    let start_time = Instant::now();
    let mut reader = open_input(&file_path)?;
    let mut buf = Vec::with_capacity(4096);
    let mut n_lines = 0;

    while reader.read_until(b'\n', &mut buf)? > 0 {
        if !is_blank(&buf) {
            n_lines += 1;
        }
        buf.clear();
    }

    log::debug!(
        "Counted {} lines in {} ({:.2} s)",
        n_lines,
        file_path.as_ref().display(),
        start_time.elapsed().as_secs_f64()
    );
    Ok(n_lines)
}

/// True for lines holding nothing but whitespace
pub fn is_blank(line: &[u8]) -> bool {
    line.iter().all(|b| b.is_ascii_whitespace())
}

/// One row of an Eigenstrat `.snp` file
#[derive(Debug, Clone, PartialEq)]
pub struct SnpRecord {
    pub rs_id: String,
    pub chrom: String,
    pub genetic_pos: String,
    /// Physical position, kept verbatim for positional joins
    pub physical_pos: String,
    pub ref_allele: Option<String>,
    pub alt_allele: Option<String>,
}

impl SnpRecord {
    pub fn parse(line: &str, line_num: usize) -> Result<Self> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 4 {
            return Err(ContprepError::malformed(
                "snp file",
                line_num,
                format!("expected at least 4 fields, found {}", tokens.len()),
            ));
        }

        Ok(SnpRecord {
            rs_id: tokens[0].to_string(),
            chrom: tokens[1].to_string(),
            genetic_pos: tokens[2].to_string(),
            physical_pos: tokens[3].to_string(),
            ref_allele: tokens.get(4).map(|s| s.to_string()),
            alt_allele: tokens.get(5).map(|s| s.to_string()),
        })
    }
}

/// Sequential reader over `.snp` rows, counting how many it has handed out.
/// Blank lines are skipped and do not count as rows.
pub struct SnpReader<R: BufRead> {
    lines: std::io::Lines<R>,
    line_num: usize,
    rows_read: usize,
}

impl<R: BufRead> SnpReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_num: 0,
            rows_read: 0,
        }
    }

    /// Next SNP record, or `None` at end of stream
    pub fn next_record(&mut self) -> Result<Option<SnpRecord>> {
        for line in self.lines.by_ref() {
            let line = line?;
            self.line_num += 1;
            if is_blank(line.as_bytes()) {
                continue;
            }

            self.rows_read += 1;
            return SnpRecord::parse(&line, self.line_num).map(Some);
        }
        Ok(None)
    }

    pub fn rows_read(&self) -> usize {
        self.rows_read
    }
}
