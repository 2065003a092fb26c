use gittensor_db::{
    parse_github_timestamp, Database, FileChange, FileStatus, Miner, MinerEvaluation,
    PullRequest, Repository,
};
use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

struct CliTestEnv {
    _temp_dir: TempDir,
    home: PathBuf,
    xdg_data: PathBuf,
    xdg_config: PathBuf,
    xdg_state: PathBuf,
}

impl CliTestEnv {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let base = temp_dir.path().to_path_buf();
        let home = base.join("home");
        let xdg_data = base.join("xdg-data");
        let xdg_config = base.join("xdg-config");
        let xdg_state = base.join("xdg-state");

        fs::create_dir_all(&home).expect("failed to create HOME");
        fs::create_dir_all(&xdg_data).expect("failed to create XDG_DATA_HOME");
        fs::create_dir_all(&xdg_config).expect("failed to create XDG_CONFIG_HOME");
        fs::create_dir_all(&xdg_state).expect("failed to create XDG_STATE_HOME");

        Self {
            _temp_dir: temp_dir,
            home,
            xdg_data,
            xdg_config,
            xdg_state,
        }
    }

    fn db_path(&self) -> PathBuf {
        self.xdg_data.join("gittensor-db/gittensor.db")
    }

    /// Store one repository, one miner, a PR with two file changes and an
    /// evaluation in the default database.
    fn seed(&self) {
        let db = Database::open(&self.db_path()).expect("failed to open db");
        db.migrate().expect("failed to migrate db");

        assert!(db
            .repositories()
            .set_repository(&Repository::new("octo", "widgets")));
        assert!(db.miners().set_miner(&Miner::new(5, "5DAAnrj7", "9001")));

        let pr = PullRequest {
            number: 7,
            repository_full_name: "octo/widgets".to_string(),
            uid: 5,
            hotkey: "5DAAnrj7".to_string(),
            github_id: "9001".to_string(),
            title: "Add retry budget".to_string(),
            author_login: "octocat".to_string(),
            merged_at: parse_github_timestamp("2024-04-02T10:00:00Z").unwrap(),
            created_at: parse_github_timestamp("2024-04-01T09:00:00Z").unwrap(),
            earned_score: 2.25,
            additions: 30,
            deletions: 4,
            commits: 3,
            merged_by_login: None,
            file_changes: None,
            issues: None,
        };
        assert!(db.pull_requests().set_pull_request(&pr));
        assert!(db.file_changes().set_file_changes_for_pr(
            7,
            "octo/widgets",
            &[
                FileChange::new(7, "octo/widgets", "src/retry.rs", 28, 0, FileStatus::Added),
                FileChange::new(7, "octo/widgets", "README.md", 2, 4, FileStatus::Modified),
            ],
        ));

        let mut evaluation = MinerEvaluation::new(5, "5DAAnrj7").with_github_id("9001");
        evaluation.pull_requests = vec![pr];
        evaluation.calculate_metric_totals();
        evaluation.calculate_score_total();
        assert!(db.miner_evaluations().set_miner_evaluation(&evaluation));
    }
}

fn run_bin(env: &CliTestEnv, args: &[&str]) -> Output {
    let bin_path = PathBuf::from(assert_cmd::cargo::cargo_bin!("gittensor-db"));

    Command::new(bin_path)
        .args(args)
        .env("HOME", &env.home)
        .env("XDG_DATA_HOME", &env.xdg_data)
        .env("XDG_CONFIG_HOME", &env.xdg_config)
        .env("XDG_STATE_HOME", &env.xdg_state)
        .env_remove("GITTENSOR_DB_PATH")
        .env_remove("GITTENSOR_DB_BUSY_TIMEOUT_MS")
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("failed to execute gittensor-db: {e}"))
}

fn assert_success(args: &[&str], output: &Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        panic!(
            "gittensor-db {} failed\nstatus: {}\nstdout:\n{}\nstderr:\n{}",
            args.join(" "),
            output.status,
            stdout,
            stderr
        );
    }
    stdout
}

#[test]
fn migrate_creates_database_and_is_idempotent() {
    let env = CliTestEnv::new();

    let first = assert_success(&["migrate"], &run_bin(&env, &["migrate"]));
    assert!(first.contains("Applied 6 migration(s):"), "got:\n{first}");
    assert!(first.contains("repositories.sql"));
    assert!(first.contains("file_changes.sql"));
    assert!(env.db_path().exists());

    let second = assert_success(&["migrate"], &run_bin(&env, &["migrate"]));
    assert!(second.contains("Schema up to date"), "got:\n{second}");
}

#[test]
fn check_reports_database_location() {
    let env = CliTestEnv::new();
    let stdout = assert_success(&["check"], &run_bin(&env, &["check"]));
    assert!(stdout.contains("Database OK:"));
    assert!(stdout.contains("gittensor.db"));

    let log_dir = env.xdg_state.join("gittensor-db");
    let expected = format!("Log files:   {}", log_dir.join("gittensor-db.*.log").display());
    assert!(stdout.contains(&expected), "got:\n{stdout}");

    let written: Vec<String> = fs::read_dir(&log_dir)
        .expect("log dir should exist")
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    assert!(
        written
            .iter()
            .any(|name| name.starts_with("gittensor-db.") && name.ends_with(".log")),
        "log files: {written:?}"
    );
}

#[test]
fn lists_seeded_rows_as_json() {
    let env = CliTestEnv::new();
    env.seed();

    let args = ["repos", "--format", "json"];
    let stdout = assert_success(&args, &run_bin(&env, &args));
    let repos: serde_json::Value = serde_json::from_str(&stdout).expect("repos should be JSON");
    assert_eq!(repos[0]["owner"], "octo");
    assert_eq!(repos[0]["name"], "widgets");

    let args = ["miners", "--format", "json"];
    let stdout = assert_success(&args, &run_bin(&env, &args));
    let miners: serde_json::Value = serde_json::from_str(&stdout).expect("miners should be JSON");
    assert_eq!(miners.as_array().map(Vec::len), Some(1));
    assert_eq!(miners[0]["github_id"], "9001");
}

#[test]
fn pr_shows_file_changes_when_asked() {
    let env = CliTestEnv::new();
    env.seed();

    let args = ["pr", "octo/widgets", "7", "--files"];
    let stdout = assert_success(&args, &run_bin(&env, &args));
    assert!(stdout.contains("https://github.com/octo/widgets/pull/7"), "got:\n{stdout}");
    assert!(stdout.contains("files:    2"));
    assert!(stdout.contains("src/retry.rs"));

    let args = ["pr", "octo/widgets", "7", "--format", "json"];
    let stdout = assert_success(&args, &run_bin(&env, &args));
    let pr: serde_json::Value = serde_json::from_str(&stdout).expect("pr should be JSON");
    assert_eq!(pr["number"], 7);
    assert!(pr["file_changes"].is_null());
}

#[test]
fn latest_eval_prints_summary_and_fails_when_missing() {
    let env = CliTestEnv::new();
    env.seed();

    let args = ["latest-eval", "5", "5DAAnrj7"];
    let stdout = assert_success(&args, &run_bin(&env, &args));
    assert!(stdout.contains("score:        2.2500"), "got:\n{stdout}");
    assert!(stdout.contains("prs:          1"));

    let missing = run_bin(&env, &["latest-eval", "6", "nobody"]);
    assert!(!missing.status.success());
    assert!(String::from_utf8_lossy(&missing.stderr).contains("No evaluation for uid 6"));
}

#[test]
fn db_flag_overrides_default_location() {
    let env = CliTestEnv::new();
    let custom = env.home.join("custom/validator.db");
    let custom_arg = custom.to_string_lossy().into_owned();

    let args = ["migrate", "--db", custom_arg.as_str()];
    assert_success(&args, &run_bin(&env, &args));
    assert!(custom.exists());
    assert!(!env.db_path().exists());
}
