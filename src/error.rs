use thiserror::Error;

#[derive(Error, Debug)]
pub enum ContprepError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("No individuals matched population label '{label}'")]
    EmptyPopulation { label: String },

    #[error("Ancient individual '{id}' has no '{id}_der' column in the reads header")]
    MissingIndividual { id: String },

    #[error("Unmatched position: {chrom}:{pos} not found in ancient reads before end of file")]
    UnmatchedPosition { chrom: String, pos: String },

    #[error("Malformed line {line} in {source_name}: {reason}")]
    MalformedLine {
        source_name: String,
        line: usize,
        reason: String,
    },

    #[error("Genotype and SNP streams out of sync: {geno_rows} genotype rows, {snp_rows} SNP rows")]
    Desynchronized { geno_rows: usize, snp_rows: usize },

    #[error("File not found: {path}")]
    FileNotFound { path: String },
}

impl ContprepError {
    pub fn malformed(source_name: &str, line: usize, reason: impl Into<String>) -> Self {
        ContprepError::MalformedLine {
            source_name: source_name.to_string(),
            line,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ContprepError>;
