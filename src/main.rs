use anyhow::{Context, Result};
use clap::Parser;
use rayon::prelude::*;

mod cli;
mod data_io;
mod error;
mod freq_calculator;
mod reads_merger;
mod table_writer;

use cli::{AncientArgs, Args, Command, EigenstratArgs};
use freq_calculator::{FrequencyCalculator, FrequencyReport};
use reads_merger::{MergeReport, ReadsMerger};
use table_writer::OutputLayout;

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();

    log::info!("=== contprep: continuity test input preparation ===");
    log::info!("Threads: {}", args.threads);

    rayon::ThreadPoolBuilder::new()
        .num_threads(args.threads)
        .build_global()
        .context("Failed to initialize thread pool")?;

    let progress_flags = ProgressFlags {
        no_progress: args.no_progress,
        threads: args.threads,
    };

    match args.command {
        Command::Freq(freq) => {
            let show_progress = progress_enabled(&progress_flags, freq.groups.groups.len());
            let layout = OutputLayout::new(&freq.groups.out_dir);
            layout.ensure_dir()?;
            for_each_group(&freq.groups.groups, |group| {
                compute_frequencies(&freq.eigenstrat, &layout, group, show_progress).map(|_| ())
            })?;
        }
        Command::Merge(merge) => {
            let layout = OutputLayout::new(&merge.groups.out_dir);
            let merger = ReadsMerger::new(merge.ancient.individuals.clone());
            for_each_group(&merge.groups.groups, |group| {
                merge_reads(&merge.ancient, &merger, &layout, group).map(|_| ())
            })?;
        }
        Command::Run(run) => {
            let show_progress = progress_enabled(&progress_flags, run.groups.groups.len());
            let layout = OutputLayout::new(&run.groups.out_dir);
            layout.ensure_dir()?;
            let merger = ReadsMerger::new(run.ancient.individuals.clone());
            for_each_group(&run.groups.groups, |group| {
                compute_frequencies(&run.eigenstrat, &layout, group, show_progress)?;
                merge_reads(&run.ancient, &merger, &layout, group).map(|_| ())
            })?;
        }
    }

    log::info!("=== SUCCESS ===");
    Ok(())
}

struct ProgressFlags {
    no_progress: bool,
    threads: usize,
}

/// Concurrent bars would interleave on the terminal
fn progress_enabled(flags: &ProgressFlags, n_groups: usize) -> bool {
    !flags.no_progress && (flags.threads == 1 || n_groups == 1)
}

/// Groups are independent; each one's stages stay sequential
fn for_each_group<F>(groups: &[String], job: F) -> Result<()>
where
    F: Fn(&str) -> Result<()> + Sync,
{
    groups
        .par_iter()
        .try_for_each(|group| job(group).with_context(|| format!("Processing group '{}'", group)))
}

fn compute_frequencies(
    eigenstrat: &EigenstratArgs,
    layout: &OutputLayout,
    group: &str,
    show_progress: bool,
) -> Result<FrequencyReport> {
    let indices = data_io::load_population_indices(&eigenstrat.ind, group)?;

    let calculator = FrequencyCalculator::new(show_progress);
    let report = calculator.calculate_file(
        &eigenstrat.geno,
        &eigenstrat.snp,
        &indices,
        group,
        &layout.frequency_path(group),
    )?;
    Ok(report)
}

fn merge_reads(
    ancient: &AncientArgs,
    merger: &ReadsMerger,
    layout: &OutputLayout,
    group: &str,
) -> Result<MergeReport> {
    let report = merger.merge_file(
        group,
        &layout.frequency_path(group),
        &ancient.ancient,
        &layout.merged_path(group, merger.individuals()),
    )?;

    if let Some(output) = &report.output {
        log::info!(
            "'{}': {} merged variants in {}, ancient columns at {:?}",
            group,
            report.n_merged,
            output.display(),
            report.offsets
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(no_progress: bool, threads: usize) -> ProgressFlags {
        ProgressFlags { no_progress, threads }
    }

    #[test]
    fn test_single_group_keeps_progress_with_many_threads() {
        assert!(progress_enabled(&flags(false, 8), 1));
        assert!(progress_enabled(&flags(false, 1), 3));
    }

    #[test]
    fn test_parallel_groups_hide_progress() {
        assert!(!progress_enabled(&flags(false, 4), 2));
    }

    #[test]
    fn test_no_progress_flag_wins() {
        assert!(!progress_enabled(&flags(true, 1), 1));
    }
}
