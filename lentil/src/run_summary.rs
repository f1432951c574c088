use crate::common::*;
use crate::error::SafeError;
use crate::input::DataTable;
use crate::safe::{FeatureScores, NodeScores};
use crate::summary::{safe_summary, summary_details, summary_to_lines};

use clap::Args;
use std::io::Write as _;
use topo_graph::common_io::write_lines;
use topo_graph::graph::TopoGraph;
use topo_graph::io::read_graph;

#[derive(Args, Debug, Clone)]
pub struct SummaryArgs {
    /// serialized graph (`.json` or `.json.gz`)
    #[arg(short, long, required = true)]
    graph: Box<str>,

    /// metadata files (comma-separated) the scores were computed from
    #[arg(short, long, value_delimiter(','), required = true)]
    metadata: Vec<Box<str>>,

    /// previously written SAFE score table (nodes x features)
    #[arg(short, long, required = true)]
    scores: Box<str>,

    /// trial count of the run that produced the scores; no history
    /// survives across processes, so it must be explicit here
    #[arg(short = 'i', long, required = true)]
    n_iter: usize,

    /// p-value cutoff for significant nodes
    #[arg(short, long, default_value_t = 0.05)]
    pvalue: f64,

    /// neighborhood cutoff as a quantile of pairwise graph distances,
    /// in [0,1]
    #[arg(long, default_value_t = 0.5)]
    nr_threshold: f64,

    /// write the summary as a JSON detail structure instead of a table
    #[arg(long)]
    output_details: bool,

    /// output file
    #[arg(short, long, required = true)]
    out: Box<str>,

    /// verbosity
    #[arg(long, short)]
    verbose: bool,
}

/// Resolve a score table against the graph once, at the boundary.
/// Node-major wins when both orientations fit (square case).
fn resolve_scores(graph: &TopoGraph, table: DataTable) -> anyhow::Result<FeatureScores> {
    let nn = graph.n_nodes();

    if table.nrows() == nn {
        let node_major = NodeScores {
            scores: table.values,
            features: table.columns,
        };
        return Ok(node_major.to_feature_major());
    }

    if table.ncols() == nn {
        return Ok(FeatureScores {
            scores: table.values,
            features: table.rows,
        });
    }

    Err(SafeError::UnresolvedOrientation {
        nrows: table.nrows(),
        ncols: table.ncols(),
    }
    .into())
}

/// Recompute an enrichment summary from saved SAFE scores.
pub fn run_summary(args: SummaryArgs) -> anyhow::Result<()> {
    if args.verbose {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    info!("loading graph from {}", args.graph);
    let graph = read_graph(&args.graph)?;

    let tables = args
        .metadata
        .iter()
        .map(|f| DataTable::from_file(f))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let row_counts: Vec<usize> = tables.iter().map(|t| t.nrows()).collect();
    if row_counts.windows(2).any(|w| w[0] != w[1]) {
        warn!(
            "metadata files disagree on row count ({:?}); nothing computed",
            row_counts
        );
        return Ok(());
    }

    let metadata = DataTable::concat_columns(tables)?;
    let scores = resolve_scores(&graph, DataTable::from_file(&args.scores)?)?;

    if args.output_details {
        let details = summary_details(
            &graph,
            &scores,
            args.pvalue,
            args.nr_threshold,
            args.n_iter,
        )?;
        let mut buf = topo_graph::common_io::open_buf_writer(&args.out)?;
        serde_json::to_writer_pretty(&mut buf, &details)?;
        buf.flush()?;
        info!("wrote {}", args.out);
        return Ok(());
    }

    let rows = safe_summary(
        &graph,
        &metadata,
        &scores,
        args.pvalue,
        args.nr_threshold,
        args.n_iter,
    )?;

    write_lines(&summary_to_lines(&rows), &args.out)?;
    info!("wrote {}", args.out);
    Ok(())
}
