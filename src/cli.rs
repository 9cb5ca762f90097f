use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "contprep",
    version = "0.1.0",
    about = "Prepare derived allele frequencies and ancient read counts for continuity tests",
    long_about = r#"
contprep - population continuity input preparation

Computes derived allele frequencies for reference populations from Eigenstrat
files and joins them with per-position read counts of ancient individuals.

Inputs:
  - .ind  : one individual per line; a population label is matched as a
            case-sensitive substring of the line
  - .geno : one line per SNP, one character per individual (0, 1, 2, 9=missing)
  - .snp  : one line per SNP (rsID, chrom, genetic pos, physical pos, ...)
  - ancient reads: header "Chrom Pos <id>_der <id>_anc <id>_other ...",
            rows in the same order as the .snp file

Outputs (in --out-dir):
  - <group>.output               : Chrom, Pos, AF
  - <group>_<id1>_<id2>....reads : Chrom, Pos, AF and each individual's counts

Example:
  contprep run --ind v42.ind --geno v42.geno --snp v42.snp \
      --ancient AncientReads.output --group ASW --group YRI \
      --individual HRR051935 --individual HRR051936 --threads 2
"#
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Number of threads; groups are processed in parallel
    #[arg(
        short = 't',
        long = "threads",
        value_name = "N",
        default_value = "1",
        global = true,
        help = "Number of groups processed in parallel"
    )]
    pub threads: usize,

    /// Hide the progress bar
    #[arg(long = "no-progress", global = true)]
    pub no_progress: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Compute derived allele frequency tables
    Freq(FreqArgs),
    /// Merge existing frequency tables with ancient read counts
    Merge(MergeArgs),
    /// Compute frequencies, then merge
    Run(RunArgs),
}

#[derive(ClapArgs, Debug, Clone)]
pub struct GroupArgs {
    /// Population labels searched for in the .ind file
    #[arg(
        short = 'g',
        long = "group",
        value_name = "LABEL",
        required = true,
        help = "Population label (repeatable), e.g. --group ASW --group YRI"
    )]
    pub groups: Vec<String>,

    /// Directory holding the .output and .reads tables
    #[arg(
        short = 'o',
        long = "out-dir",
        value_name = "DIR",
        default_value = ".",
        help = "Directory for frequency and merged tables"
    )]
    pub out_dir: PathBuf,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct EigenstratArgs {
    #[arg(long = "ind", value_name = "FILE", help = "Eigenstrat .ind file")]
    pub ind: PathBuf,

    #[arg(long = "geno", value_name = "FILE", help = "Eigenstrat .geno file")]
    pub geno: PathBuf,

    #[arg(long = "snp", value_name = "FILE", help = "Eigenstrat .snp file")]
    pub snp: PathBuf,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct AncientArgs {
    #[arg(
        short = 'a',
        long = "ancient",
        value_name = "FILE",
        help = "Ancient read count table"
    )]
    pub ancient: PathBuf,

    /// Ancient individuals, in output column order
    #[arg(
        short = 'i',
        long = "individual",
        value_name = "ID",
        required = true,
        help = "Ancient individual id (repeatable); must match an <id>_der column"
    )]
    pub individuals: Vec<String>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct FreqArgs {
    #[command(flatten)]
    pub eigenstrat: EigenstratArgs,

    #[command(flatten)]
    pub groups: GroupArgs,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct MergeArgs {
    #[command(flatten)]
    pub ancient: AncientArgs,

    #[command(flatten)]
    pub groups: GroupArgs,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub eigenstrat: EigenstratArgs,

    #[command(flatten)]
    pub ancient: AncientArgs,

    #[command(flatten)]
    pub groups: GroupArgs,
}
