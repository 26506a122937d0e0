//! `run` command: executes the stages of one mode under a pipeline run.
//!
//! The run row is created (or a failed one reopened with `--resume-run`)
//! before any work and finalized exactly once, with
//! per-stage stats on success or the error chain on failure. Each finished
//! stage refreshes the run's heartbeat so a crashed process leaves a run the
//! stale-run sweep can recognise.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, ValueEnum};
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::PgPool;
use topiclens_ai::{OpenAiClient, OpenAiConfig};
use topiclens_collect::{RedditClient, RedditCollectSettings, RedditConfig, SerpApiClient};
use topiclens_core::{AppConfig, RunMode};
use topiclens_pipeline::{BriefSettings, ClusterSettings, EmbedSettings, KeywordSettings};

/// Run id used by stages during a dry run; no row carries it.
pub(crate) const DRY_RUN_ID: i64 = 0;

const SERP_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Collect,
    IngestGsc,
    Analyze,
    Label,
    All,
}

impl From<ModeArg> for RunMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Collect => RunMode::Collect,
            ModeArg::IngestGsc => RunMode::IngestGsc,
            ModeArg::Analyze => RunMode::Analyze,
            ModeArg::Label => RunMode::Label,
            ModeArg::All => RunMode::All,
        }
    }
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Which stages to execute
    #[arg(long, value_enum)]
    pub mode: ModeArg,

    /// Read and compute without writing anything, logging samples instead
    #[arg(long)]
    pub dry_run: bool,

    /// Search Console export to ingest (required for `ingest-gsc`)
    #[arg(long, value_name = "PATH")]
    pub gsc_csv: Option<PathBuf>,

    /// Run whose clusters are labelled in `label` mode (defaults to the
    /// latest run with clusters)
    #[arg(long, value_name = "ID")]
    pub source_run: Option<i64>,

    /// Reopen a failed `analyze` or `label` run and reuse its id for every
    /// stage instead of starting a new run
    #[arg(long, value_name = "ID", conflicts_with = "dry_run")]
    pub resume_run: Option<i64>,
}

/// The run whose clusters the label stages work on, when it is known
/// without a lookup.
///
/// A real `all` run labels what it just clustered. Everything else uses
/// `--source-run`, and `None` means "latest clustered run".
pub(crate) fn fixed_label_source(
    mode: RunMode,
    dry_run: bool,
    source_run: Option<i64>,
    run_id: i64,
) -> Option<i64> {
    if mode == RunMode::All && !dry_run {
        Some(run_id)
    } else {
        source_run
    }
}

/// Only modes whose stages are idempotent per run id can be resumed.
pub(crate) fn check_resumable(mode: RunMode) -> anyhow::Result<()> {
    match mode {
        RunMode::Analyze | RunMode::Label => Ok(()),
        other => anyhow::bail!("--resume-run only applies to analyze and label, not {other}"),
    }
}

/// Reopen failed run `id`, which must have been started in `mode`.
pub(crate) async fn resume_run(
    pool: &PgPool,
    id: i64,
    mode: RunMode,
) -> anyhow::Result<topiclens_db::PipelineRunRow> {
    let existing = topiclens_db::get_pipeline_run(pool, id)
        .await
        .with_context(|| format!("cannot load run {id}"))?;
    if existing.run_type != mode.as_str() {
        anyhow::bail!(
            "run {id} is a {} run and cannot be resumed as {mode}",
            existing.run_type
        );
    }
    topiclens_db::resume_pipeline_run(pool, id)
        .await
        .with_context(|| format!("run {id} cannot be resumed"))
}

/// Accumulates per-stage stats into the run's metadata.
struct StageLog<'a> {
    pool: &'a PgPool,
    run_id: i64,
    dry_run: bool,
    metadata: Map<String, Value>,
}

impl<'a> StageLog<'a> {
    fn new(pool: &'a PgPool, run_id: i64, dry_run: bool) -> Self {
        Self {
            pool,
            run_id,
            dry_run,
            metadata: Map::new(),
        }
    }

    async fn record<T: Serialize>(&mut self, stage: &'static str, stats: &T) -> anyhow::Result<()> {
        let value = serde_json::to_value(stats)
            .with_context(|| format!("failed to serialize {stage} stats"))?;
        tracing::info!(run_id = self.run_id, stage, stats = %value, "stage complete");
        self.metadata.insert(stage.to_string(), value);

        if !self.dry_run {
            topiclens_db::touch_pipeline_run(self.pool, self.run_id)
                .await
                .with_context(|| format!("failed to refresh heartbeat after {stage}"))?;
        }
        Ok(())
    }
}

struct Clients {
    openai: Option<OpenAiClient>,
    reddit: Option<RedditClient>,
    serp: Option<SerpApiClient>,
}

/// Build every external client the mode needs before any stage runs, so
/// missing credentials fail the run up front.
async fn build_clients(config: &AppConfig, mode: RunMode, dry_run: bool) -> anyhow::Result<Clients> {
    let openai = if mode.analyzes() || mode.labels() {
        let openai_config =
            OpenAiConfig::from_app_config(config).context("OpenAI is not configured")?;
        Some(OpenAiClient::new(openai_config)?)
    } else {
        None
    };

    let (reddit, serp) = if mode.collects() && !dry_run {
        let reddit_config =
            RedditConfig::from_app_config(config).context("Reddit is not configured")?;
        let reddit = RedditClient::new(&reddit_config)
            .await
            .context("Reddit authentication failed")?;
        let key = config
            .serpapi_key
            .as_deref()
            .context("SERPAPI_KEY is not set")?;
        (Some(reddit), Some(SerpApiClient::new(key)?))
    } else {
        (None, None)
    };

    Ok(Clients {
        openai,
        reddit,
        serp,
    })
}

async fn execute(
    pool: &PgPool,
    config: &AppConfig,
    mode: RunMode,
    args: &RunArgs,
    log: &mut StageLog<'_>,
) -> anyhow::Result<()> {
    let run_id = log.run_id;
    let dry_run = args.dry_run;
    let clients = build_clients(config, mode, dry_run).await?;

    if mode.collects() {
        let topics = topiclens_core::load_topics(&config.topics_path)
            .with_context(|| format!("failed to load {}", config.topics_path.display()))?;

        let reddit = topiclens_collect::collect_reddit(
            pool,
            clients.reddit.as_ref(),
            &topics,
            run_id,
            &RedditCollectSettings::from_app_config(config, dry_run),
        )
        .await
        .context("Reddit collection failed")?;
        log.record("reddit", &reddit).await?;

        let serp = topiclens_collect::collect_serp_aio(
            pool,
            clients.serp.as_ref(),
            &topics,
            run_id,
            SERP_DELAY,
            dry_run,
        )
        .await
        .context("SERP AI Overview collection failed")?;
        log.record("serp_aio", &serp).await?;
    }

    if matches!(mode, RunMode::IngestGsc | RunMode::All) {
        match &args.gsc_csv {
            Some(path) => {
                let gsc = topiclens_collect::ingest_gsc_csv(pool, path, dry_run)
                    .await
                    .context("GSC ingestion failed")?;
                log.record("gsc", &gsc).await?;
            }
            None => tracing::info!(run_id, "no --gsc-csv given, skipping GSC ingestion"),
        }
    }

    if mode.analyzes() {
        let openai = clients
            .openai
            .as_ref()
            .context("OpenAI client is required for analysis")?;

        let (preprocess, accepted) = topiclens_pipeline::preprocess(pool, run_id, dry_run)
            .await
            .context("preprocessing failed")?;
        log.record("preprocess", &preprocess).await?;

        let embed = topiclens_pipeline::generate_embeddings(
            pool,
            openai,
            run_id,
            &accepted,
            &EmbedSettings::from_app_config(config, dry_run),
        )
        .await
        .context("embedding failed")?;
        log.record("embed", &embed).await?;

        let clusters = topiclens_pipeline::run_clustering_pipeline(
            pool,
            run_id,
            &ClusterSettings::from_app_config(config, dry_run),
        )
        .await
        .context("clustering failed")?;
        log.record("cluster", &clusters).await?;

        let keywords = topiclens_pipeline::extract_keywords(
            pool,
            run_id,
            &KeywordSettings::from_app_config(config, dry_run),
        )
        .await
        .context("keyword extraction failed")?;
        log.record("keywords", &keywords).await?;

        let timeseries = topiclens_pipeline::generate_timeseries(pool, run_id, dry_run)
            .await
            .context("timeseries aggregation failed")?;
        log.record("timeseries", &timeseries).await?;
    }

    if mode.labels() {
        let openai = clients
            .openai
            .as_ref()
            .context("OpenAI client is required for labelling")?;

        let source = match fixed_label_source(mode, dry_run, args.source_run, run_id) {
            Some(id) => id,
            None => topiclens_db::latest_clustered_run_id(pool)
                .await?
                .context("no clustered run found; run --mode analyze first")?,
        };
        tracing::info!(run_id, source_run = source, "labelling clusters");
        log.metadata.insert("source_run".to_string(), Value::from(source));

        let briefs = topiclens_pipeline::generate_briefs(
            pool,
            openai,
            source,
            &BriefSettings::from_app_config(config, dry_run),
        )
        .await
        .context("brief generation failed")?;
        log.record("briefs", &briefs).await?;

        let scores = topiclens_pipeline::calculate_scores(pool, source, dry_run)
            .await
            .context("scoring failed")?;
        log.record("scoring", &scores).await?;
    }

    Ok(())
}

async fn fail_run_best_effort(pool: &PgPool, run_id: i64, message: &str) {
    if let Err(mark_err) = topiclens_db::fail_pipeline_run(pool, run_id, message).await {
        tracing::error!(
            run_id,
            error = %mark_err,
            "failed to mark pipeline run as failed"
        );
    }
}

/// Sweep runs orphaned by a crashed process.
async fn reap_stale(pool: &PgPool, config: &AppConfig) -> anyhow::Result<()> {
    let max_age = i64::try_from(config.stale_run_max_age_secs).unwrap_or(i64::MAX);
    let reaped = topiclens_db::reap_stale_pipeline_runs(pool, max_age)
        .await
        .context("failed to reap stale runs")?;
    if !reaped.is_empty() {
        tracing::warn!(runs = ?reaped, "marked abandoned pipeline runs as failed");
    }
    Ok(())
}

/// Execute `args.mode` end to end.
///
/// # Errors
///
/// Returns an error if configuration for the mode is missing, the run row
/// cannot be created or finalized, or any stage fails. The run is marked
/// failed before the error is returned.
pub(crate) async fn run_pipeline(
    pool: &PgPool,
    config: &AppConfig,
    args: &RunArgs,
) -> anyhow::Result<()> {
    let mode = RunMode::from(args.mode);
    if mode == RunMode::IngestGsc && args.gsc_csv.is_none() {
        anyhow::bail!("--gsc-csv is required for --mode ingest-gsc");
    }
    if args.resume_run.is_some() {
        check_resumable(mode)?;
    }

    if args.dry_run {
        tracing::info!(dry_run = true, %mode, "dry run: nothing will be written");
        let mut log = StageLog::new(pool, DRY_RUN_ID, true);
        execute(pool, config, mode, args, &mut log).await?;
        println!("dry run of {mode} finished");
        return Ok(());
    }

    reap_stale(pool, config).await?;

    let run = match args.resume_run {
        Some(id) => {
            let run = resume_run(pool, id, mode).await?;
            tracing::info!(run_id = run.id, %mode, "pipeline run resumed");
            run
        }
        None => {
            let run = topiclens_db::create_pipeline_run(pool, mode)
                .await
                .context("failed to create pipeline run")?;
            tracing::info!(run_id = run.id, %mode, "pipeline run started");
            run
        }
    };

    let mut log = StageLog::new(pool, run.id, false);
    match execute(pool, config, mode, args, &mut log).await {
        Ok(()) => {
            let metadata = Value::Object(log.metadata);
            if let Err(err) = topiclens_db::complete_pipeline_run(pool, run.id, &metadata).await {
                fail_run_best_effort(pool, run.id, &format!("{err:#}")).await;
                return Err(err).context("failed to complete pipeline run");
            }
            tracing::info!(run_id = run.id, "pipeline run completed");
            println!("run {} ({mode}) completed", run.id);
            Ok(())
        }
        Err(err) => {
            tracing::error!(run_id = run.id, error = %format!("{err:#}"), "pipeline run failed");
            fail_run_best_effort(pool, run.id, &format!("{err:#}")).await;
            Err(err)
        }
    }
}
