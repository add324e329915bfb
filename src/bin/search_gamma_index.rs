use std::path::PathBuf;
use std::process;
use std::time::Instant;

use acorn_rs::config::DEFAULT_EF_SEARCH;
use acorn_rs::io::{read_groundtruth, read_labels, read_vectors};
use acorn_rs::{groundtruth, recall_at_k, AcornIndex, Label, Predicate, SearchParams, SearchResult};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(
    name = "search_gamma_index",
    about = "Run filtered queries against a saved graph and report recall and QPS"
)]
struct Args {
    /// Index written by build_gamma_index
    #[arg(long)]
    index: PathBuf,

    /// Query vectors (.fvecs or .fbin)
    #[arg(long)]
    queries: PathBuf,

    /// Required label per query (.ivecs); queries are unfiltered when omitted
    #[arg(long)]
    query_labels: Option<PathBuf>,

    /// Precomputed neighbor ids per query (.ivecs); exact search is used when omitted
    #[arg(long)]
    groundtruth: Option<PathBuf>,

    #[arg(long)]
    max_queries: Option<usize>,

    #[arg(short, long, default_value_t = 10)]
    k: usize,

    /// Comma-separated efSearch values to sweep
    #[arg(long, value_delimiter = ',', default_values_t = vec![DEFAULT_EF_SEARCH])]
    ef: Vec<usize>,

    /// Disable looking through non-matching neighbors
    #[arg(long, default_value_t = false)]
    no_two_hop: bool,
}

/// Per-query filter: either no constraint or one required label.
#[derive(Debug, Clone, Copy)]
enum QueryFilter {
    Any,
    Label(Label),
}

impl Predicate for QueryFilter {
    fn matches(&self, label: Label) -> bool {
        match self {
            QueryFilter::Any => true,
            QueryFilter::Label(required) => *required == label,
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("acorn_rs=info,search_gamma_index=info")),
        )
        .init();

    let args = Args::parse();
    if let Err(err) = run(args) {
        eprintln!("Error: {err}");
        let mut source = err.source();
        while let Some(inner) = source {
            eprintln!("  caused by: {inner}");
            source = inner.source();
        }
        process::exit(1);
    }
}

fn run(args: Args) -> CliResult<()> {
    let index = AcornIndex::load_from_path(&args.index)?;
    println!(
        "Index loaded ({} vectors, dim {}, M={}, M_beta={}, gamma={})",
        index.len(),
        index.dim(),
        index.config().m,
        index.config().m_beta,
        index.config().gamma
    );

    let queries = read_vectors(&args.queries, args.max_queries)?;
    let filters: Vec<QueryFilter> = match &args.query_labels {
        Some(path) => read_labels(path, args.max_queries)?
            .into_iter()
            .map(QueryFilter::Label)
            .collect(),
        None => vec![QueryFilter::Any; queries.len()],
    };
    if filters.len() != queries.len() {
        return Err(format!(
            "{} queries but {} query labels",
            queries.len(),
            filters.len()
        )
        .into());
    }
    println!("Loaded {} queries", queries.len());

    let truth = load_truth(&args, &index, &queries, &filters)?;

    println!("\n{:<10} {:<12} {:<10}", "efSearch", "QPS", "recall");
    println!("{}", "-".repeat(35));
    for &ef in &args.ef {
        let params = SearchParams::new(args.k, ef.max(args.k)).with_two_hop(!args.no_two_hop);
        let start = Instant::now();
        let results = index.search_batch(&queries, &filters, &params)?;
        let elapsed = start.elapsed();

        let recall = results
            .iter()
            .zip(&truth)
            .map(|(found, expected)| recall_at_k(found, expected, args.k))
            .sum::<f32>()
            / queries.len().max(1) as f32;
        let qps = queries.len() as f64 / elapsed.as_secs_f64().max(f64::EPSILON);
        info!(ef, recall, qps, "sweep point");
        println!("{:<10} {:<12.2} {:<10.4}", params.ef_search, qps, recall);
    }
    Ok(())
}

fn load_truth(
    args: &Args,
    index: &AcornIndex,
    queries: &[Vec<f32>],
    filters: &[QueryFilter],
) -> CliResult<Vec<Vec<SearchResult>>> {
    match &args.groundtruth {
        Some(path) => {
            let rows = read_groundtruth(path, args.max_queries)?;
            if rows.len() != queries.len() {
                return Err(format!(
                    "{} queries but {} ground truth rows",
                    queries.len(),
                    rows.len()
                )
                .into());
            }
            Ok(rows
                .into_iter()
                .map(|row| {
                    row.into_iter()
                        .map(|id| SearchResult { id, distance: 0.0 })
                        .collect()
                })
                .collect())
        }
        None => {
            println!("Computing exact ground truth...");
            let start = Instant::now();
            let truth = groundtruth(
                index.store(),
                index.config().metric,
                queries,
                filters,
                args.k,
            )?;
            println!("Ground truth ready in {:.2?}", start.elapsed());
            Ok(truth)
        }
    }
}
