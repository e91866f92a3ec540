use std::io::{IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use miette::{Context, IntoDiagnostic, Result};
use tracing_subscriber::EnvFilter;

use mentor_core::{DocSnippet, MentorConfig, OutputFormat};
use mentor_index::{embedding, verify_snapshot, IndexBuilder};
use mentor_retrieval::{QueryContext, RetrievalEngine};

const CONFIG_FILE: &str = ".mentor.toml";

#[derive(Parser)]
#[command(
    name = "mentor",
    version,
    about = "Documentation retrieval for coding mentors",
    long_about = "mentor turns library documentation into a searchable snapshot and answers\n\
                   questions with the most relevant passages, boosted by the APIs your code uses.\n\n\
                   Examples:\n  \
                     mentor init                                   Create a .mentor.toml config file\n  \
                     mentor fetch                                  Download and chunk the configured pages\n  \
                     mentor build                                  Embed chunks and write the snapshot\n  \
                     mentor search 'fit a linear model'            Search the snapshot\n  \
                     mentor search 'why NaN?' --code train.py      Boost docs for APIs used in train.py\n  \
                     mentor doctor                                 Check setup and snapshot health"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (default: .mentor.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        global = true,
        default_value = "text",
        long_help = "Output format for command results.\n\n\
                       Formats:\n  \
                         text      Human-readable summaries (default)\n  \
                         json      Machine-readable JSON\n  \
                         markdown  GitHub-flavored Markdown"
    )]
    format: OutputFormat,

    /// Log pipeline progress (RUST_LOG overrides)
    #[arg(long, short, global = true)]
    verbose: bool,

    /// When to use colors
    #[arg(long, global = true, default_value = "auto")]
    color: ColorChoice,
}

#[derive(Subcommand)]
enum Command {
    /// Download, clean, and chunk the configured documentation pages
    #[command(long_about = "Download, clean, and chunk the configured documentation pages.\n\n\
        Pages are cached in data/raw/cache.db and only downloaded once. Use --refresh\n\
        to download them again and replace cached pages that changed. Chunks are\n\
        written to data/text/doc_chunks.jsonl.\n\n\
        Examples:\n  mentor fetch\n  mentor fetch --refresh\n  mentor fetch --format json")]
    Fetch {
        /// Download every page again, replacing changed cache entries
        #[arg(long)]
        refresh: bool,
    },
    /// Embed the chunks file and write the vector snapshot
    #[command(long_about = "Embed the chunks file and write the vector snapshot.\n\n\
        Requires an embedding provider API key unless [embedding] provider = \"hash\".\n\
        The snapshot replaces any previous one only after every file is written.\n\n\
        Examples:\n  mentor build\n  mentor build --input chunks.jsonl --output snapshot/")]
    Build {
        /// Chunks file (default: <data_dir>/text/doc_chunks.jsonl)
        #[arg(long)]
        input: Option<PathBuf>,

        /// Snapshot directory (default: <data_dir>/vectorstore)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Search the snapshot with an optional code context
    #[command(long_about = "Search the snapshot with an optional code context.\n\n\
        Results are ranked by semantic similarity. When --code is given, chunks that\n\
        mention APIs used in the code are boosted.\n\n\
        Examples:\n  mentor search 'cross validation'\n  \
        mentor search 'scale features' --code model.py --limit 3\n  \
        cat model.py | mentor search 'why does fit fail' --code -")]
    Search {
        /// Natural language query
        query: String,

        /// Code file whose API calls boost matching docs ("-" reads stdin)
        #[arg(long)]
        code: Option<PathBuf>,

        /// Maximum results (default: [retrieval] default_top_k)
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Create a default .mentor.toml configuration file
    #[command(long_about = "Create a default .mentor.toml configuration file.\n\n\
        Generates a commented-out template with all available options.\n\
        Fails if .mentor.toml already exists.")]
    Init,
    /// Check configuration, API keys, and snapshot consistency
    #[command(long_about = "Check configuration, API keys, and snapshot consistency.\n\n\
        Reads every snapshot artifact and compares counts, dimensions, and the\n\
        metadata checksum recorded at build time. Use --format json for\n\
        machine-readable output.")]
    Doctor,
    /// Generate shell completion scripts
    #[command(hide = true)]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Clone, PartialEq, Eq, ValueEnum)]
enum ColorChoice {
    /// Auto-detect based on terminal
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

fn print_welcome(use_color: bool) {
    let version = env!("CARGO_PKG_VERSION");

    if use_color {
        println!("\x1b[1mmentor\x1b[0m v{version}: documentation retrieval for coding mentors\n");

        println!("Quick start:");
        println!("  \x1b[36mmentor init\x1b[0m            Create a .mentor.toml config file");
        println!("  \x1b[36mmentor fetch\x1b[0m           Download and chunk documentation");
        println!("  \x1b[36mmentor build\x1b[0m           Build the vector snapshot");
        println!("  \x1b[36mmentor search <q>\x1b[0m      Search the docs\n");

        println!("All commands:");
        println!("  \x1b[32mfetch\x1b[0m     Fetch, clean, and chunk pages");
        println!("  \x1b[32mbuild\x1b[0m     Embed chunks and persist the snapshot");
        println!("  \x1b[32msearch\x1b[0m    Hybrid semantic + API-token search");
        println!("  \x1b[32mdoctor\x1b[0m    Check your setup and snapshot");
        println!("  \x1b[32minit\x1b[0m      Create default configuration\n");
    } else {
        println!("mentor v{version}: documentation retrieval for coding mentors\n");

        println!("Quick start:");
        println!("  mentor init            Create a .mentor.toml config file");
        println!("  mentor fetch           Download and chunk documentation");
        println!("  mentor build           Build the vector snapshot");
        println!("  mentor search <q>      Search the docs\n");

        println!("All commands:");
        println!("  fetch     Fetch, clean, and chunk pages");
        println!("  build     Embed chunks and persist the snapshot");
        println!("  search    Hybrid semantic + API-token search");
        println!("  doctor    Check your setup and snapshot");
        println!("  init      Create default configuration\n");
    }

    println!("Run 'mentor <command> --help' for details.");
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("info")
        } else {
            EnvFilter::new("warn")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<MentorConfig> {
    let config = match path {
        Some(path) => MentorConfig::from_file(path)
            .wrap_err_with(|| format!("loading {}", path.display()))?,
        None => {
            let default_path = Path::new(CONFIG_FILE);
            if default_path.exists() {
                MentorConfig::from_file(default_path).wrap_err("loading .mentor.toml")?
            } else {
                MentorConfig::default()
            }
        }
    };
    Ok(config)
}

fn read_code_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut input = String::new();
        std::io::stdin()
            .read_to_string(&mut input)
            .into_diagnostic()
            .wrap_err("reading stdin")?;
        return Ok(input);
    }
    std::fs::read_to_string(path)
        .into_diagnostic()
        .wrap_err(format!("reading {}", path.display()))
}

fn spinner(message: &'static str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner} {msg} {elapsed}")
            .into_diagnostic()?,
    );
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}

fn check_embedding_key(config: &MentorConfig) -> Result<()> {
    let Some(env_var) = config.embedding.api_key_env_var() else {
        return Ok(());
    };
    if config.embedding.api_key.is_none() && std::env::var(env_var).is_err() {
        miette::bail!(miette::miette!(
            help = "Set {env_var}, add api_key under [embedding] in .mentor.toml, or use provider = \"hash\" for offline builds",
            "No API key configured for embedding provider '{}'",
            config.embedding.provider
        ));
    }
    Ok(())
}

/// Model name a fresh build with `config` would record in its manifest.
fn configured_model_name(config: &MentorConfig) -> String {
    if config.embedding.provider == "hash" {
        format!("hash-{}", config.embedding.dimensions)
    } else {
        config.embedding.model.clone()
    }
}

fn print_snippets(results: &[DocSnippet], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(results).into_diagnostic()?
            );
        }
        OutputFormat::Markdown => {
            if results.is_empty() {
                println!("No results found.");
                return Ok(());
            }
            println!("# Search Results\n");
            for (i, r) in results.iter().enumerate() {
                match &r.url {
                    Some(url) => println!("## {}. [{}]({url}) (score: {:.4})\n", i + 1, r.title, r.score),
                    None => println!("## {}. {} (score: {:.4})\n", i + 1, r.title, r.score),
                }
                println!("{}\n", r.text);
            }
        }
        OutputFormat::Text => {
            if results.is_empty() {
                println!("No results found.");
                return Ok(());
            }
            for (i, r) in results.iter().enumerate() {
                println!("{}. {} (score: {:.4})", i + 1, r.title, r.score);
                if let Some(url) = &r.url {
                    println!("   {url}");
                }
                let preview: String = r
                    .text
                    .lines()
                    .filter(|l| !l.trim().is_empty())
                    .take(3)
                    .map(|l| format!("   {l}"))
                    .collect::<Vec<_>>()
                    .join("\n");
                println!("{preview}\n");
            }
        }
    }
    Ok(())
}

#[derive(serde::Serialize)]
struct CheckResult {
    name: &'static str,
    status: &'static str,
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
}

impl CheckResult {
    fn pass(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: "pass",
            detail: detail.into(),
            hint: None,
        }
    }

    fn fail(name: &'static str, detail: impl Into<String>, hint: impl Into<String>) -> Self {
        Self {
            name,
            status: "fail",
            detail: detail.into(),
            hint: Some(hint.into()),
        }
    }

    fn info(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: "info",
            detail: detail.into(),
            hint: None,
        }
    }

    fn symbol(&self) -> &'static str {
        match self.status {
            "pass" => "\u{2713}",
            "fail" => "\u{2717}",
            _ => "~",
        }
    }

    fn colored_symbol(&self) -> String {
        match self.status {
            "pass" => "\x1b[32m\u{2713}\x1b[0m".into(),
            "fail" => "\x1b[31m\u{2717}\x1b[0m".into(),
            _ => "\x1b[33m~\x1b[0m".into(),
        }
    }
}

fn run_doctor(
    config: &MentorConfig,
    config_path: &Path,
    format: OutputFormat,
    use_color: bool,
) -> Result<()> {
    let mut checks: Vec<CheckResult> = Vec::new();

    // 1. Config file
    if config_path.exists() {
        checks.push(CheckResult::pass(
            "config_file",
            format!("{} found", config_path.display()),
        ));
    } else {
        checks.push(CheckResult::fail(
            "config_file",
            format!("{} not found, using defaults", config_path.display()),
            "run 'mentor init' to create a default config",
        ));
    }

    // 2. Chunking parameters
    match mentor_ingest::chunker::ChunkParams::from_config(&config.ingestion) {
        Ok(params) => checks.push(CheckResult::pass(
            "chunking",
            format!(
                "max_chars {}, overlap {}, {} source URLs",
                params.max_chars(),
                params.overlap(),
                config.ingestion.urls.len()
            ),
        )),
        Err(e) => checks.push(CheckResult::fail(
            "chunking",
            e.to_string(),
            "set [ingestion] overlap smaller than max_chars",
        )),
    }

    // 3. Embedding provider + API key
    let provider = &config.embedding.provider;
    checks.push(CheckResult::pass(
        "embedding_provider",
        format!("{provider} (model: {})", configured_model_name(config)),
    ));
    match config.embedding.api_key_env_var() {
        None => checks.push(CheckResult::info(
            "embedding_api_key",
            "not required for the hash provider",
        )),
        Some(env_var) => {
            if config.embedding.api_key.is_some() || std::env::var(env_var).is_ok() {
                checks.push(CheckResult::pass("embedding_api_key", "configured"));
            } else {
                checks.push(CheckResult::fail(
                    "embedding_api_key",
                    format!("{env_var} not set"),
                    format!("export {env_var}=... or set api_key under [embedding]"),
                ));
            }
        }
    }

    // 4. Raw page cache
    let cache_path = config.paths.raw_cache_db();
    if cache_path.exists() {
        match mentor_ingest::cache::DocCache::open(&cache_path).and_then(|c| c.stats()) {
            Ok(stats) => checks.push(CheckResult::pass(
                "page_cache",
                format!("{} pages, {} bytes", stats.documents, stats.total_bytes),
            )),
            Err(e) => checks.push(CheckResult::fail(
                "page_cache",
                e.to_string(),
                format!("delete {} and run 'mentor fetch'", cache_path.display()),
            )),
        }
    } else {
        checks.push(CheckResult::info("page_cache", "no pages cached yet"));
    }

    // 5. Chunks file
    let chunks_path = config.paths.chunks_file();
    if chunks_path.exists() {
        match mentor_core::jsonl::read_jsonl::<mentor_core::TextChunk>(&chunks_path) {
            Ok(chunks) => checks.push(CheckResult::pass(
                "chunks_file",
                format!("{} chunks in {}", chunks.len(), chunks_path.display()),
            )),
            Err(e) => checks.push(CheckResult::fail(
                "chunks_file",
                e.to_string(),
                "run 'mentor fetch' to rewrite it",
            )),
        }
    } else {
        checks.push(CheckResult::fail(
            "chunks_file",
            format!("{} not found", chunks_path.display()),
            "run 'mentor fetch'",
        ));
    }

    // 6. Snapshot
    let snapshot_dir = config.paths.vectorstore_dir();
    match verify_snapshot(&snapshot_dir) {
        Ok(report) if report.is_consistent() => {
            checks.push(CheckResult::pass(
                "snapshot",
                format!(
                    "{} vectors x {} dimensions in {}",
                    report.index,
                    report.dimensions,
                    snapshot_dir.display()
                ),
            ));
            match &report.manifest {
                Some(manifest) if manifest.model != configured_model_name(config) => {
                    checks.push(CheckResult::fail(
                        "snapshot_model",
                        format!(
                            "built with '{}', config uses '{}'",
                            manifest.model,
                            configured_model_name(config)
                        ),
                        "run 'mentor build' so queries and documents share a model",
                    ))
                }
                Some(manifest) => checks.push(CheckResult::pass(
                    "snapshot_model",
                    format!("{} (built {})", manifest.model, manifest.built_at),
                )),
                None => checks.push(CheckResult::info(
                    "snapshot_model",
                    "no manifest; model unknown",
                )),
            }
        }
        Ok(report) => checks.push(CheckResult::fail(
            "snapshot",
            format!(
                "inconsistent: {} embeddings, {} index vectors, {} metadata rows{}",
                report.embeddings,
                report.index,
                report.metadata,
                if report.metadata_hash_ok {
                    ""
                } else {
                    ", metadata checksum mismatch"
                }
            ),
            "run 'mentor build' to rewrite the snapshot",
        )),
        Err(e) => checks.push(CheckResult::fail(
            "snapshot",
            e.to_string(),
            "run 'mentor build'",
        )),
    }

    // Output
    match format {
        OutputFormat::Json => {
            let version = env!("CARGO_PKG_VERSION");
            let json = serde_json::json!({
                "version": version,
                "checks": checks,
            });
            println!("{}", serde_json::to_string_pretty(&json).into_diagnostic()?);
        }
        _ => {
            let version = env!("CARGO_PKG_VERSION");
            println!("mentor v{version}: environment check\n");

            for check in &checks {
                let sym = if use_color {
                    check.colored_symbol()
                } else {
                    check.symbol().to_string()
                };
                let label = check.name.replace('_', " ");
                println!("  {sym} {label:<20} {}", check.detail);
                if let Some(hint) = &check.hint {
                    println!("    hint: {hint}");
                }
            }

            let passed = checks.iter().filter(|c| c.status == "pass").count();
            let failed = checks.iter().filter(|c| c.status == "fail").count();
            let info = checks.iter().filter(|c| c.status == "info").count();
            println!("\n{passed} checks passed, {failed} failed, {info} info");
        }
    }

    Ok(())
}

const DEFAULT_CONFIG: &str = r#"# mentor configuration

[ingestion]
# urls = [
#     "https://scikit-learn.org/stable/user_guide.html",
#     "https://scikit-learn.org/stable/api/index.html",
# ]
# max_chars = 1200
# overlap = 200
# timeout_secs = 30

[embedding]
# provider = "voyage"        # voyage, openai, or hash (offline)
# model = "voyage-3"
# base_url = "https://api.voyageai.com/v1"
# dimensions = 1024          # bucket count for the hash provider
# batch_size = 32
# timeout_secs = 60

[retrieval]
# default_top_k = 5
# semantic_weight = 0.75
# keyword_weight = 0.20
# url_weight = 0.05
# keyword_hit_score = 0.05
# url_hit_score = 0.10
# overfetch_factor = 3
# min_candidates = 10

[paths]
# data_dir = "data"
"#;

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))
    .expect("miette handler");
    human_panic::setup_panic!();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE));
    let use_color = match cli.color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => std::io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    };

    // Commands that must work without a readable config.
    match cli.command {
        None => {
            print_welcome(use_color);
            return Ok(());
        }
        Some(Command::Init) => {
            if config_path.exists() {
                miette::bail!("{} already exists", config_path.display());
            }
            std::fs::write(&config_path, DEFAULT_CONFIG).into_diagnostic()?;
            println!("Created {} with default configuration", config_path.display());
            return Ok(());
        }
        Some(Command::Completions { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "mentor", &mut std::io::stdout());
            return Ok(());
        }
        _ => {}
    }

    let config = load_config(cli.config.as_deref())?;
    tracing::debug!(
        provider = %config.embedding.provider,
        data_dir = %config.paths.data_dir.display(),
        "configuration loaded"
    );

    match cli.command {
        Some(Command::Fetch { refresh }) => {
            let pb = spinner("fetching documentation")?;
            let report = mentor_ingest::ingest(&config, refresh).await;
            pb.finish_and_clear();
            let report = report?;

            match cli.format {
                OutputFormat::Json => {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&report).into_diagnostic()?
                    );
                }
                _ => {
                    for source in &report.sources {
                        let origin = match (source.cached, source.changed) {
                            (true, _) => "cached",
                            (false, true) => "fetched",
                            (false, false) => "same",
                        };
                        println!("{:>5} chunks  {origin:<7}  {}", source.chunks, source.url);
                    }
                    println!(
                        "\nWrote {} chunks to {}",
                        report.total_chunks,
                        report.chunks_file.display()
                    );
                }
            }
        }
        Some(Command::Build { input, output }) => {
            let input = input.unwrap_or_else(|| config.paths.chunks_file());
            let output = output.unwrap_or_else(|| config.paths.vectorstore_dir());
            if !input.exists() {
                return Err(mentor_core::MentorError::InputNotFound(input).into());
            }
            check_embedding_key(&config)?;

            let model = embedding::from_config(&config.embedding)?;
            let pb = ProgressBar::new(0);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{msg} [{bar:40}] {pos}/{len} chunks")
                    .into_diagnostic()?,
            );
            pb.set_message("embedding");
            let progress = pb.clone();
            let builder = IndexBuilder::new(model)
                .with_batch_size(config.embedding.batch_size)
                .with_progress(move |done, total| {
                    progress.set_length(total as u64);
                    progress.set_position(done as u64);
                });

            let stats = builder.build_from_file(&input, &output).await;
            pb.finish_and_clear();
            let stats = stats?;

            match cli.format {
                OutputFormat::Json => {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&stats).into_diagnostic()?
                    );
                }
                _ => {
                    println!(
                        "Indexed {} chunks ({} dimensions, model {}) into {}",
                        stats.chunks,
                        stats.dimensions,
                        stats.manifest.model,
                        stats.output_dir.display()
                    );
                }
            }
        }
        Some(Command::Search {
            ref query,
            ref code,
            limit,
        }) => {
            check_embedding_key(&config)?;
            let code_text = match code {
                Some(path) => Some(read_code_input(path)?),
                None => None,
            };
            let top_k = limit.unwrap_or(config.retrieval.default_top_k);

            let engine = RetrievalEngine::from_config(&config)?;
            let mut ctx = QueryContext::new(query.as_str(), top_k);
            ctx.code_text = code_text;
            let results = engine.search_context(&ctx).await?;
            print_snippets(&results, cli.format)?;
        }
        Some(Command::Doctor) => {
            run_doctor(&config, &config_path, cli.format, use_color)?;
        }
        None | Some(Command::Init) | Some(Command::Completions { .. }) => {}
    }

    Ok(())
}
