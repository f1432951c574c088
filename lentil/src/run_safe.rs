use crate::common::*;
use crate::history::SafeHistory;
use crate::input::DataTable;
use crate::safe::{safe_batch, NodeScores, SafeConfig, SafeMode, ShuffleBy};
use crate::summary::{safe_summary, summary_details, summary_to_lines};

use clap::Args;
use indicatif::ProgressBar;
use std::io::Write as _;
use topo_graph::common_io::write_lines;
use topo_graph::graph::{AggMode, TopoGraph};
use topo_graph::io::read_graph;

#[derive(Args, Debug, Clone)]
pub struct SafeArgs {
    /// serialized graph (`.json` or `.json.gz`) with nodes, sample
    /// membership, and weighted edges
    #[arg(short, long, required = true)]
    graph: Box<str>,

    /// metadata files (comma-separated), merged by column; all files
    /// must agree on row count
    #[arg(short, long, value_delimiter(','), required = true)]
    metadata: Vec<Box<str>>,

    /// number of permutation trials
    #[arg(short = 'i', long, default_value_t = 1000)]
    n_iter: usize,

    /// p-value cutoff for significant nodes in the summary
    #[arg(short, long, default_value_t = 0.05)]
    pvalue: f64,

    /// neighborhood cutoff as a quantile of pairwise graph distances,
    /// in [0,1]
    #[arg(long, default_value_t = 0.5)]
    nr_threshold: f64,

    /// axis the permutation shuffles over
    #[arg(long, value_enum, default_value = "node")]
    shuffle_by: ShuffleBy,

    /// score enrichment, decline, or both
    #[arg(long, value_enum, default_value = "enrich")]
    mode: SafeMode,

    /// reduction over each neighborhood
    #[arg(long, value_enum, default_value = "sum")]
    agg_mode: AggMode,

    /// random seed for the permutation engine
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// additionally write one summary per input metadata file,
    /// restricted to that file's columns
    #[arg(long)]
    split: bool,

    /// write the summary as a JSON detail structure instead of a table
    #[arg(long)]
    output_details: bool,

    /// output prefix
    #[arg(short, long, required = true)]
    out: Box<str>,

    /// verbosity
    #[arg(long, short)]
    verbose: bool,
}

/// Run the full SAFE pipeline: score, record, summarize, write.
pub fn run_safe(args: SafeArgs) -> anyhow::Result<()> {
    if args.verbose {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    if args.n_iter == 0 {
        anyhow::bail!("need at least one permutation trial");
    }

    info!("loading graph from {}", args.graph);
    let graph = read_graph(&args.graph)?;

    let tables = args
        .metadata
        .iter()
        .map(|f| DataTable::from_file(f))
        .collect::<anyhow::Result<Vec<_>>>()?;

    // per-file column bookkeeping for --split output
    let file_columns: Vec<(Box<str>, Vec<Box<str>>)> = args
        .metadata
        .iter()
        .zip(tables.iter())
        .map(|(f, t)| (f.clone(), t.columns.clone()))
        .collect();

    let row_counts: Vec<usize> = tables.iter().map(|t| t.nrows()).collect();
    if row_counts.windows(2).any(|w| w[0] != w[1]) {
        warn!(
            "metadata files disagree on row count ({:?}); nothing computed",
            row_counts
        );
        return Ok(());
    }

    let metadata = DataTable::concat_columns(tables)?;

    let config = SafeConfig {
        n_iter: args.n_iter,
        nr_threshold: args.nr_threshold,
        shuffle_by: args.shuffle_by,
        agg_mode: args.agg_mode,
        mode: args.mode,
        seed: args.seed,
    };

    let pb = ProgressBar::new(args.n_iter as u64);
    let batch = safe_batch(&graph, &metadata, &config, &|| pb.inc(1))?;
    pb.finish_and_clear();

    let mut history = SafeHistory::new();
    history.extend(batch.records.iter().cloned());
    let n_iter = history.last_n_iter()?;

    if let Some(scores) = batch.enrich.as_ref() {
        write_mode_output(
            &graph,
            &metadata,
            scores,
            &args,
            &file_columns,
            n_iter,
            SafeMode::Enrich.tag(),
        )?;
    }
    if let Some(scores) = batch.decline.as_ref() {
        write_mode_output(
            &graph,
            &metadata,
            scores,
            &args,
            &file_columns,
            n_iter,
            SafeMode::Decline.tag(),
        )?;
    }

    info!("done");
    Ok(())
}

fn write_mode_output(
    graph: &TopoGraph,
    metadata: &DataTable,
    scores: &NodeScores,
    args: &SafeArgs,
    file_columns: &[(Box<str>, Vec<Box<str>>)],
    n_iter: usize,
    tag: &str,
) -> anyhow::Result<()> {
    let score_file = format!("{}.safe.{}.tsv.gz", args.out, tag);
    scores.to_table(graph).to_file(&score_file)?;
    info!("wrote {}", score_file);

    let feature_major = scores.to_feature_major();

    if args.output_details {
        let details = summary_details(
            graph,
            &feature_major,
            args.pvalue,
            args.nr_threshold,
            n_iter,
        )?;
        let detail_file = format!("{}.summary.{}.json", args.out, tag);
        let mut buf = topo_graph::common_io::open_buf_writer(&detail_file)?;
        serde_json::to_writer_pretty(&mut buf, &details)?;
        buf.flush()?;
        info!("wrote {}", detail_file);
        return Ok(());
    }

    let rows = safe_summary(
        graph,
        metadata,
        &feature_major,
        args.pvalue,
        args.nr_threshold,
        n_iter,
    )?;

    let summary_file = format!("{}.summary.{}.tsv", args.out, tag);
    write_lines(&summary_to_lines(&rows), &summary_file)?;
    info!("wrote {}", summary_file);

    if args.split && file_columns.len() > 1 {
        for (file, columns) in file_columns.iter() {
            let base = file
                .rsplit('/')
                .next()
                .unwrap_or(file.as_ref())
                .trim_end_matches(".gz")
                .trim_end_matches(".tsv")
                .trim_end_matches(".csv");
            let subset: Vec<_> = rows
                .iter()
                .filter(|r| columns.contains(&r.name))
                .cloned()
                .collect();
            let split_file = format!("{}.summary.{}.{}.tsv", args.out, tag, base);
            write_lines(&summary_to_lines(&subset), &split_file)?;
            info!("wrote {}", split_file);
        }
    }

    Ok(())
}
