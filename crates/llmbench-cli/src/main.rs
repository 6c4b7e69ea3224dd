use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use llmbench_common::config::BenchConfig;
use llmbench_common::model::{BenchmarkRequest, BenchmarkRun, GenerationParams, ProcessingMode};
use llmbench_core::BenchmarkRunner;
use llmbench_store::{model_stats, JsonlStore, RunStore, DEFAULT_HISTORY_LIMIT};

#[derive(Parser, Debug)]
#[command(name = "llmbench", version, about = "Benchmark LLM backends side by side")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the REST API
    Serve {
        #[arg(long)]
        bind: Option<String>,
    },
    /// Benchmark one prompt against one or more models
    Run(RunArgs),
    /// List stored runs, most recent first
    History {
        #[arg(short, long, default_value_t = DEFAULT_HISTORY_LIMIT)]
        limit: usize,
    },
    /// Print one stored run as JSON
    Show { id: String },
    /// List the models each configured provider offers
    Models,
    /// Host resources and per-model averages over stored runs
    Stats,
    Version,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[arg(short, long)]
    prompt: String,
    /// Model to benchmark, `provider:model` to pick a provider; repeatable
    #[arg(short = 'm', long = "model")]
    models: Vec<String>,
    #[arg(long)]
    sequential: bool,
    #[arg(long)]
    no_stream: bool,
    #[arg(short, long)]
    temperature: Option<f32>,
    #[arg(short = 'n', long)]
    max_tokens: Option<u32>,
    #[arg(long)]
    system: Option<String>,
    /// Print the whole run as JSON
    #[arg(long)]
    json: bool,
    #[arg(long)]
    no_save: bool,
}

impl RunArgs {
    fn request(&self) -> BenchmarkRequest {
        let mode = if self.sequential { ProcessingMode::Sequential } else { ProcessingMode::Parallel };
        let mut request = BenchmarkRequest::new(self.prompt.clone(), self.models.clone()).with_mode(mode);
        request.parameters = GenerationParams {
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            system: self.system.clone(),
            stream: !self.no_stream,
            ..GenerationParams::default()
        };
        request
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    llmbench_obs::init_tracing();

    let cli = Cli::parse();
    if let Commands::Version = cli.command {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }
    let cfg = BenchConfig::load().context("loading configuration")?;
    match cli.command {
        Commands::Serve { bind } => serve(cfg, bind).await,
        Commands::Run(args) => run(cfg, args).await,
        Commands::History { limit } => history(cfg, limit).await,
        Commands::Show { id } => show(cfg, &id).await,
        Commands::Models => models(cfg).await,
        Commands::Stats => stats(cfg).await,
        Commands::Version => Ok(()),
    }
}

async fn serve(cfg: BenchConfig, bind: Option<String>) -> anyhow::Result<()> {
    let bind = bind.unwrap_or_else(|| cfg.bind.clone());
    let app = llmbench_api::app(&cfg).await?;
    let listener = tokio::net::TcpListener::bind(bind.as_str()).await.with_context(|| format!("binding {bind}"))?;
    tracing::info!("listening on http://{bind}");
    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received");
    };
    axum::serve(listener, app).with_graceful_shutdown(shutdown).await?;
    Ok(())
}

fn runner(cfg: &BenchConfig) -> anyhow::Result<BenchmarkRunner> {
    let backends = llmbench_backend_http::registry_from_config(cfg)?;
    Ok(BenchmarkRunner::from_config(backends, cfg))
}

async fn run(cfg: BenchConfig, args: RunArgs) -> anyhow::Result<()> {
    let run = runner(&cfg)?.run(&args.request()).await?;
    if !args.no_save {
        let store = JsonlStore::open(&cfg.store_path).await?;
        store.save(&run).await.context("saving run")?;
    }
    if args.json {
        println!("{}", serde_json::to_string_pretty(&run)?);
    } else {
        print_run(&run);
    }
    Ok(())
}

fn secs(v: Option<f64>) -> String { v.map(|s| format!("{s:.2}s")).unwrap_or_else(|| "-".into()) }

fn rate(v: Option<f64>) -> String { v.map(|r| format!("{r:.1}")).unwrap_or_else(|| "-".into()) }

fn clip(s: &str, max: usize) -> String {
    let flat = s.replace('\n', " ");
    if flat.chars().count() <= max { return flat; }
    let mut out: String = flat.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

fn print_run(run: &BenchmarkRun) {
    println!("run {} ({}, {:.2}s wall)", run.id, run.mode, run.wall_time);
    println!("{:<28} {:<6} {:>8} {:>8} {:>7} {:>10} {:>8}", "MODEL", "STATUS", "TTFT", "TOTAL", "CHUNKS", "BYTES/S", "TOK/S");
    for r in &run.results {
        println!(
            "{:<28} {:<6} {:>8} {:>8} {:>7} {:>10.1} {:>8}",
            clip(&r.model, 28),
            if r.success { "ok" } else { "FAIL" },
            secs(r.timing.time_to_first_token),
            secs(Some(r.timing.total_time)),
            r.throughput.total_chunks,
            r.throughput.bytes_per_second,
            rate(r.throughput.tokens_per_second),
        );
    }
    for r in run.results.iter().filter(|r| !r.success) {
        println!("{}: {}", r.model, r.error.as_deref().unwrap_or("unknown error"));
    }
}

async fn history(cfg: BenchConfig, limit: usize) -> anyhow::Result<()> {
    let store = JsonlStore::open(&cfg.store_path).await?;
    let runs = store.list(limit).await?;
    if runs.is_empty() {
        println!("no stored runs in {}", store.path().display());
        return Ok(());
    }
    for s in runs {
        println!(
            "{}  {}  {:<10} {:>2} ok {:>2} failed  {}",
            s.id,
            s.timestamp.format("%Y-%m-%d %H:%M:%S"),
            s.mode,
            s.succeeded,
            s.failed,
            clip(&s.prompt, 48)
        );
    }
    Ok(())
}

async fn show(cfg: BenchConfig, id: &str) -> anyhow::Result<()> {
    let store = JsonlStore::open(&cfg.store_path).await?;
    let run = store.get(id).await?.with_context(|| format!("run {id} not found"))?;
    println!("{}", serde_json::to_string_pretty(&run)?);
    Ok(())
}

async fn models(cfg: BenchConfig) -> anyhow::Result<()> {
    for p in runner(&cfg)?.available_models().await {
        match p.error {
            Some(e) => println!("{}: unavailable ({e})", p.provider),
            None => {
                println!("{}:", p.provider);
                for m in p.models {
                    println!("  - {m}");
                }
            }
        }
    }
    Ok(())
}

async fn stats(cfg: BenchConfig) -> anyhow::Result<()> {
    let info = tokio::task::spawn_blocking(llmbench_obs::system_info).await?;
    println!("host: {} ({} {})", info.host_name, info.os, info.os_version);
    println!("cpu: {} x{} @ {} MHz", info.cpu_brand, info.logical_cores, info.cpu_frequency_mhz);
    println!(
        "memory: {} / {} MiB used",
        info.memory_used_bytes / 1024 / 1024,
        info.memory_total_bytes / 1024 / 1024
    );
    for gpu in info.gpu.iter().flatten() {
        println!("gpu: {}", gpu.name);
    }

    let store = JsonlStore::open(&cfg.store_path).await?;
    let stats = model_stats(&store.recent_runs(usize::MAX).await?);
    if stats.is_empty() {
        return Ok(());
    }
    println!();
    println!("{:<28} {:>8} {:>7} {:>8} {:>8} {:>10} {:>8}", "MODEL", "ATTEMPTS", "OK%", "TTFT", "TOTAL", "BYTES/S", "TOK/S");
    for s in stats {
        println!(
            "{:<28} {:>8} {:>6.0}% {:>8} {:>8} {:>10} {:>8}",
            clip(&s.model, 28),
            s.attempts,
            s.success_rate() * 100.0,
            secs(s.avg_ttft),
            secs(s.avg_total_time),
            rate(s.avg_bytes_per_second),
            rate(s.avg_tokens_per_second),
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_args_build_request() {
        let cli = Cli::try_parse_from([
            "llmbench", "run", "-p", "hi", "-m", "llama3.2:latest", "-m", "openai:gpt-4o-mini", "--sequential", "--no-stream", "-n", "64",
        ])
        .unwrap();
        let Commands::Run(args) = cli.command else { panic!("expected run") };
        let req = args.request();
        assert_eq!(req.models, ["llama3.2:latest", "openai:gpt-4o-mini"]);
        assert_eq!(req.effective_mode(), ProcessingMode::Sequential);
        assert!(!req.parameters.stream);
        assert_eq!(req.parameters.max_tokens, Some(64));
        assert_eq!(req.parameters.temperature, None);
    }

    #[test]
    fn history_limit_defaults() {
        let cli = Cli::try_parse_from(["llmbench", "history"]).unwrap();
        assert!(matches!(cli.command, Commands::History { limit } if limit == DEFAULT_HISTORY_LIMIT));
    }

    #[test]
    fn clip_is_char_safe() {
        assert_eq!(clip("short", 10), "short");
        assert_eq!(clip("héllo wörld", 6), "héllo…");
        assert_eq!(clip("a\nb", 5), "a b");
    }
}
