use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Instant;

use acorn_rs::config::DEFAULT_EF_CONSTRUCTION;
use acorn_rs::io::{read_labels, read_vectors};
use acorn_rs::{AcornIndex, GraphConfig, Metric, VectorStore};
use clap::{Parser, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum MetricArg {
    L2,
    Cosine,
}

impl From<MetricArg> for Metric {
    fn from(arg: MetricArg) -> Self {
        match arg {
            MetricArg::L2 => Metric::L2,
            MetricArg::Cosine => Metric::Cosine,
        }
    }
}

#[derive(Parser)]
#[command(
    name = "build_gamma_index",
    about = "Build a predicate-aware proximity graph and record its construction time"
)]
struct Args {
    /// Number of base vectors to index
    #[arg(long)]
    n: usize,

    /// Neighbor list expansion factor (1 disables robust edges)
    #[arg(long)]
    gamma: usize,

    /// Base vectors (.fvecs, or .fbin/.bin with a count and dimension header)
    #[arg(long)]
    base: PathBuf,

    /// Degree bound of the base lists
    #[arg(long)]
    m: usize,

    /// Degree bound of the robust lists
    #[arg(long)]
    m_beta: usize,

    /// Directory receiving <dataset>/hybrid_M=..._Mb=..._gamma=....acorn
    #[arg(long)]
    output_dir: PathBuf,

    /// Dataset name used for output sub-directories
    #[arg(long)]
    dataset: String,

    /// One label per base vector (.ivecs); every label is 0 when omitted
    #[arg(long)]
    labels: Option<PathBuf>,

    /// Candidate width of each insertion search
    #[arg(long, default_value_t = DEFAULT_EF_CONSTRUCTION)]
    ef_construction: usize,

    #[arg(long, value_enum, default_value_t = MetricArg::L2)]
    metric: MetricArg,

    /// Insert vectors concurrently (non-deterministic edge sets)
    #[arg(long, default_value_t = false)]
    parallel: bool,

    /// Directory receiving <dataset>/M=..._Mb=..._gamma=....time
    #[arg(long, default_value = "../data/construction_times")]
    time_dir: PathBuf,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("acorn_rs=info,build_gamma_index=info")),
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
    info!(
        n = args.n,
        gamma = args.gamma,
        m = args.m,
        m_beta = args.m_beta,
        dataset = %args.dataset,
        "index parameters"
    );

    let base = read_vectors(&args.base, Some(args.n))?;
    if base.len() < args.n {
        return Err(format!(
            "{} holds {} vectors, {} requested",
            args.base.display(),
            base.len(),
            args.n
        )
        .into());
    }
    info!(
        vectors = base.len(),
        dim = base.first().map_or(0, Vec::len),
        "loaded base vectors"
    );

    let store = match &args.labels {
        Some(path) => VectorStore::new(base, read_labels(path, Some(args.n))?)?,
        None => VectorStore::with_default_labels(base)?,
    };
    let config = GraphConfig::new(args.m, args.m_beta, args.gamma)
        .with_ef_construction(args.ef_construction)
        .with_metric(args.metric.into());

    let start = Instant::now();
    let index = if args.parallel {
        AcornIndex::build_parallel(store, config)?
    } else {
        AcornIndex::build(store, config)?
    };
    let elapsed = index
        .build_stats()
        .map_or_else(|| start.elapsed(), |stats| stats.elapsed);
    info!("Create gamma index in time: {:.6}", elapsed.as_secs_f64());

    let suffix = format!("M={}_Mb={}_gamma={}", args.m, args.m_beta, args.gamma);
    let index_dir = args.output_dir.join(&args.dataset);
    fs::create_dir_all(&index_dir)?;
    let index_path = index_dir.join(format!("hybrid_{suffix}.acorn"));
    index.save_to_path(&index_path)?;

    let time_path = args.time_dir.join(&args.dataset).join(format!("{suffix}.time"));
    if let Err(err) = write_construction_time(&time_path, elapsed.as_secs_f64()) {
        warn!(path = %time_path.display(), error = %err, "unable to record construction time");
    }

    println!("Index: {}", index_path.display());
    println!("Vectors: {}", index.len());
    if let Some(stats) = index.build_stats() {
        println!("Base edges: {}", stats.base_edges);
        println!("Robust edges: {}", stats.robust_edges);
    }
    println!("Construction time: {:.6} s", elapsed.as_secs_f64());
    Ok(())
}

fn write_construction_time(path: &Path, seconds: f64) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, format!("{seconds:.6}\n"))
}
