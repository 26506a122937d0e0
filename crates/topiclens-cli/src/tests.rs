use super::*;
use crate::run::{check_resumable, fixed_label_source, resume_run, ModeArg, DRY_RUN_ID};
use topiclens_core::RunMode;

#[test]
fn parses_db_ping_command() {
    let cli = Cli::try_parse_from(["topiclens", "db", "ping"]).expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::Ping
        })
    ));
}

#[test]
fn no_command_is_none() {
    let cli = Cli::try_parse_from(["topiclens"]).expect("expected valid cli args");
    assert!(cli.command.is_none());
}

#[test]
fn parses_run_all() {
    let cli = Cli::try_parse_from(["topiclens", "run", "--mode", "all"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Run(RunArgs {
            mode: ModeArg::All,
            dry_run: false,
            gsc_csv: None,
            source_run: None,
            resume_run: None,
        }))
    ));
}

#[test]
fn parses_ingest_gsc_with_path() {
    let cli = Cli::try_parse_from([
        "topiclens",
        "run",
        "--mode",
        "ingest-gsc",
        "--gsc-csv",
        "data/gsc.csv",
    ])
    .unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Run(RunArgs {
            mode: ModeArg::IngestGsc,
            gsc_csv: Some(ref p),
            ..
        })) if p.to_str() == Some("data/gsc.csv")
    ));
}

#[test]
fn parses_label_dry_run_with_source() {
    let cli = Cli::try_parse_from([
        "topiclens",
        "run",
        "--mode",
        "label",
        "--dry-run",
        "--source-run",
        "42",
    ])
    .unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Run(RunArgs {
            mode: ModeArg::Label,
            dry_run: true,
            source_run: Some(42),
            ..
        }))
    ));
}

#[test]
fn run_requires_mode() {
    assert!(Cli::try_parse_from(["topiclens", "run"]).is_err());
}

#[test]
fn unknown_mode_is_rejected() {
    assert!(Cli::try_parse_from(["topiclens", "run", "--mode", "everything"]).is_err());
}

#[test]
fn runs_list_defaults_limit() {
    let cli = Cli::try_parse_from(["topiclens", "runs", "list"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Runs {
            command: RunsCommands::List { limit: 20 }
        })
    ));
}

#[test]
fn runs_list_accepts_limit() {
    let cli = Cli::try_parse_from(["topiclens", "runs", "list", "--limit", "5"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Runs {
            command: RunsCommands::List { limit: 5 }
        })
    ));
}

#[test]
fn parses_runs_reap() {
    let cli = Cli::try_parse_from(["topiclens", "runs", "reap"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Runs {
            command: RunsCommands::Reap
        })
    ));
}

#[test]
fn mode_args_map_to_run_modes() {
    assert_eq!(RunMode::from(ModeArg::Collect), RunMode::Collect);
    assert_eq!(RunMode::from(ModeArg::IngestGsc), RunMode::IngestGsc);
    assert_eq!(RunMode::from(ModeArg::Analyze), RunMode::Analyze);
    assert_eq!(RunMode::from(ModeArg::Label), RunMode::Label);
    assert_eq!(RunMode::from(ModeArg::All), RunMode::All);
}

#[test]
fn all_run_labels_its_own_clusters() {
    assert_eq!(fixed_label_source(RunMode::All, false, Some(3), 9), Some(9));
    assert_eq!(fixed_label_source(RunMode::All, false, None, 9), Some(9));
}

#[test]
fn label_run_uses_requested_source_or_lookup() {
    assert_eq!(fixed_label_source(RunMode::Label, false, Some(3), 9), Some(3));
    assert_eq!(fixed_label_source(RunMode::Label, false, None, 9), None);
}

#[test]
fn dry_all_run_falls_back_to_existing_clusters() {
    assert_eq!(
        fixed_label_source(RunMode::All, true, None, DRY_RUN_ID),
        None
    );
}

#[test]
fn parses_analyze_resume_run() {
    let cli = Cli::try_parse_from(["topiclens", "run", "--mode", "analyze", "--resume-run", "7"])
        .unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Run(RunArgs {
            mode: ModeArg::Analyze,
            resume_run: Some(7),
            dry_run: false,
            ..
        }))
    ));
}

#[test]
fn resume_run_conflicts_with_dry_run() {
    assert!(Cli::try_parse_from([
        "topiclens",
        "run",
        "--mode",
        "label",
        "--resume-run",
        "7",
        "--dry-run",
    ])
    .is_err());
}

#[test]
fn only_analyze_and_label_are_resumable() {
    assert!(check_resumable(RunMode::Analyze).is_ok());
    assert!(check_resumable(RunMode::Label).is_ok());
    assert!(check_resumable(RunMode::Collect).is_err());
    assert!(check_resumable(RunMode::IngestGsc).is_err());
    assert!(check_resumable(RunMode::All).is_err());
}

#[sqlx::test(migrations = "../../migrations")]
async fn resume_reopens_failed_run_of_same_mode(pool: sqlx::PgPool) {
    let run = topiclens_db::create_pipeline_run(&pool, RunMode::Analyze)
        .await
        .unwrap();
    topiclens_db::fail_pipeline_run(&pool, run.id, "embedding failed")
        .await
        .unwrap();

    assert!(resume_run(&pool, run.id, RunMode::Label).await.is_err());
    let still_failed = topiclens_db::get_pipeline_run(&pool, run.id).await.unwrap();
    assert_eq!(still_failed.status, "failed");

    let resumed = resume_run(&pool, run.id, RunMode::Analyze).await.unwrap();
    assert_eq!(resumed.id, run.id);
    assert_eq!(resumed.status, "running");

    topiclens_db::complete_pipeline_run(&pool, run.id, &serde_json::json!({}))
        .await
        .unwrap();
    assert!(resume_run(&pool, run.id, RunMode::Analyze).await.is_err());
    assert!(resume_run(&pool, 999_999, RunMode::Analyze).await.is_err());
}
