//! auditchain: command-line front end for hash-chained audit logs.
//!
//! Every subcommand prints one machine-readable JSON summary line on stdout
//! (`{"tool": ..., ...}`); human-readable per-file lines and logs go to
//! stderr.
//!
//! Exit status:
//!   0  clean, or repairs applied without error
//!   1  issues remain, or an error occurred
//!   2  apply was attempted without explicit authorization
//!
//! Usage:
//!   auditchain verify logs/ [--repair|--check-only] [--auto-repair] [--strict]
//!   auditchain plan logs/
//!   auditchain apply --plan glow/audits/audit_repair_plan.json --apply
//!   auditchain converge logs/ [--max-iterations 5] [--no-apply]
//!   auditchain capture-baseline logs/ [--accept-manual]
//!   auditchain detect-drift logs/ --baseline glow/audits/baseline/audit_baseline.json

use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use auditchain_chain::ReceiptLedger;
use auditchain_contracts::{
    traits::Verifier, AuditConfig, AuditError, AuditResult, VerifyOptions, VerifyRun,
};
use auditchain_converge::{capture_baseline, detect_drift, write_report, Orchestrator};
use auditchain_repair::{artifacts, Authorization, RepairExecutor, RepairPlanner};
use auditchain_verify::{ChainVerifier, VerifyResultDoc};

const ENV_CONFIG: &str = "AUDITCHAIN_CONFIG";
const ENV_APPLY: &str = "AUDITCHAIN_APPLY_REPAIRS";
const ENV_FAIL_ON_DRIFT: &str = "AUDITCHAIN_FAIL_ON_DRIFT";
const ENV_STRICT: &str = "AUDITCHAIN_STRICT";

// ── CLI definition ────────────────────────────────────────────────────────────

/// Verify, repair and baseline append-only hash-chained audit logs.
#[derive(Parser)]
#[command(
    name = "auditchain",
    version,
    about = "Verify, repair and baseline hash-chained audit logs",
    long_about = "Replays each audit log's SHA-256 chain, plans deterministic repairs,\n\
                  applies only the safe ones on explicit request, and tracks drift\n\
                  against an accepted baseline."
)]
struct Cli {
    /// TOML configuration file (also read from AUDITCHAIN_CONFIG).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay every log's chain and report issues.
    Verify {
        /// Directory holding the audit logs.
        #[arg(default_value = "logs")]
        target: PathBuf,
        /// Salvage malformed lines and write them to `*.repairable`.
        #[arg(long, conflicts_with = "check_only")]
        repair: bool,
        /// Report only; no line salvage.
        #[arg(long)]
        check_only: bool,
        /// Plan and apply safe repairs, then verify again.
        #[arg(long)]
        auto_repair: bool,
        /// Fail if anything had to be salvaged or repaired.
        #[arg(long)]
        strict: bool,
    },
    /// Build a repair plan without touching the logs.
    Plan {
        #[arg(default_value = "logs")]
        target: PathBuf,
        /// Where to write the plan (defaults to the state directory).
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Apply the safe repairs of a plan.
    Apply {
        /// Plan to apply (defaults to the last plan written by `plan`).
        #[arg(long)]
        plan: Option<PathBuf>,
        /// Required: confirms that logs may be rewritten.
        #[arg(long)]
        apply: bool,
    },
    /// Repeat plan, apply and verify until nothing more can be fixed.
    Converge {
        #[arg(default_value = "logs")]
        target: PathBuf,
        #[arg(long)]
        max_iterations: Option<usize>,
        /// Plan only; never rewrite a log.
        #[arg(long)]
        no_apply: bool,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Snapshot the current state as the accepted baseline.
    CaptureBaseline {
        #[arg(default_value = "logs")]
        target: PathBuf,
        /// Accept remaining manual-required issues into the baseline.
        #[arg(long)]
        accept_manual: bool,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Compare the current state against a captured baseline.
    DetectDrift {
        #[arg(default_value = "logs")]
        target: PathBuf,
        #[arg(long)]
        baseline: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long, default_value_t = 1)]
        max_iterations: usize,
    },
    /// Replay the receipt ledger and report the first broken link.
    VerifyReceipts,
}

impl Command {
    fn tool(&self) -> &'static str {
        match self {
            Command::Verify { .. } => "verify_audits",
            Command::Plan { .. } => "plan_audit_repairs",
            Command::Apply { .. } => "apply_audit_repairs",
            Command::Converge { .. } => "converge_audits",
            Command::CaptureBaseline { .. } => "capture_audit_baseline",
            Command::DetectDrift { .. } => "detect_audit_drift",
            Command::VerifyReceipts => "verify_receipts",
        }
    }
}

/// What a subcommand reports: the stdout summary and the exit status.
struct Outcome {
    summary: Value,
    code: u8,
}

impl Outcome {
    fn new(summary: Value, failed: bool) -> Self {
        Self {
            summary,
            code: u8::from(failed),
        }
    }

    /// Map a subcommand's result onto the summary and exit status printed
    /// for it: unauthorized apply exits 2, every other error exits 1.
    fn finish(tool: &str, result: AuditResult<Outcome>) -> Self {
        match result {
            Ok(outcome) => outcome,
            Err(AuditError::ApplyNotAuthorized) => Self {
                summary: json!({
                    "tool": tool,
                    "status": "refused",
                    "reason": format!("pass --apply or set {ENV_APPLY}=1"),
                }),
                code: 2,
            },
            Err(e) => {
                eprintln!("{tool}: {e}");
                Self {
                    summary: json!({ "tool": tool, "status": "error", "reason": e.to_string() }),
                    code: 1,
                }
            }
        }
    }
}

/// Environment switches, read once at startup.
#[derive(Debug, Clone, Copy, Default)]
struct Switches {
    apply: bool,
    fail_on_drift: bool,
    strict: bool,
}

impl Switches {
    fn from_env() -> Self {
        Self {
            apply: env_flag(ENV_APPLY),
            fail_on_drift: env_flag(ENV_FAIL_ON_DRIFT),
            strict: env_flag(ENV_STRICT),
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> ExitCode {
    // Set RUST_LOG=debug for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();
    let tool = cli.command.tool();

    let switches = Switches::from_env();

    let result = load_config(cli.config).and_then(|config| run(cli.command, &config, switches));
    let outcome = Outcome::finish(tool, result);

    println!("{}", outcome.summary);
    ExitCode::from(outcome.code)
}

fn load_config(flag: Option<PathBuf>) -> AuditResult<AuditConfig> {
    match flag.or_else(|| env::var_os(ENV_CONFIG).map(PathBuf::from)) {
        Some(path) => {
            debug!(path = %path.display(), "loading configuration");
            AuditConfig::from_file(&path)
        }
        None => Ok(AuditConfig::default()),
    }
}

fn env_flag(name: &str) -> bool {
    env::var(name).map(|v| v == "1").unwrap_or(false)
}

fn run(command: Command, config: &AuditConfig, switches: Switches) -> AuditResult<Outcome> {
    match command {
        Command::Verify {
            target,
            repair,
            check_only,
            auto_repair,
            strict,
        } => verify(
            config,
            &target,
            repair && !check_only,
            auto_repair,
            strict || switches.strict,
        ),
        Command::Plan { target, output } => plan(config, &target, output),
        Command::Apply { plan, apply } => {
            let authorization = Authorization::from_flag(apply || switches.apply);
            apply_plan(config, plan, authorization)
        }
        Command::Converge {
            target,
            max_iterations,
            no_apply,
            output,
        } => converge(
            config,
            &target,
            max_iterations.unwrap_or(config.default_max_iterations),
            Authorization::from_flag(!no_apply),
            output,
        ),
        Command::CaptureBaseline {
            target,
            accept_manual,
            output,
        } => {
            let output = output.unwrap_or_else(|| config.baseline_path());
            let baseline = capture_baseline(config, &target, accept_manual, &output)?;
            Ok(Outcome::new(
                json!({
                    "tool": "capture_audit_baseline",
                    "ok": baseline.ok,
                    "manual_issues_accepted": baseline.manual_issues_accepted,
                    "fingerprint": baseline.baseline_fingerprint,
                    "output": output.display().to_string(),
                }),
                false,
            ))
        }
        Command::DetectDrift {
            target,
            baseline,
            output,
            max_iterations,
        } => {
            let baseline = baseline.unwrap_or_else(|| config.baseline_path());
            let output = output.unwrap_or_else(|| config.drift_report_path());
            let report = detect_drift(config, &target, &baseline, &output, max_iterations)?;
            Ok(Outcome::new(
                json!({
                    "tool": "detect_audit_drift",
                    "drifted": report.drifted,
                    "new_issues": report.new_issues.len(),
                    "resolved_issues": report.resolved_issues.len(),
                    "new_manual_required_count": report.new_manual_required_count,
                    "output": output.display().to_string(),
                }),
                report.drifted && switches.fail_on_drift,
            ))
        }
        Command::VerifyReceipts => {
            let ledger = ReceiptLedger::new(config.receipts_path());
            let receipts = ledger.read_all()?.len();
            let broken = ledger.verify()?;
            Ok(Outcome::new(
                json!({
                    "tool": "verify_receipts",
                    "ok": broken.is_none(),
                    "receipts": receipts,
                    "broken_line": broken.as_ref().map(|b| b.line),
                    "reason": broken.as_ref().map(|b| b.reason.clone()),
                }),
                broken.is_some(),
            ))
        }
    }
}

// ── Subcommands ───────────────────────────────────────────────────────────────

fn verify(
    config: &AuditConfig,
    target: &Path,
    repair: bool,
    auto_repair: bool,
    strict: bool,
) -> AuditResult<Outcome> {
    let verifier = ChainVerifier::new(config);
    let options = VerifyOptions {
        quarantine: true,
        repair,
    };

    let mut run = match verifier.verify_dir(target, options) {
        Ok(run) => run,
        Err(e) => {
            VerifyResultDoc::failed(e.to_string()).persist(&config.verify_result_path())?;
            return Err(e);
        }
    };

    let mut applied = 0;
    if auto_repair && !run.is_clean() {
        let ledger = ReceiptLedger::new(config.receipts_path());
        let planner = RepairPlanner::new(Box::new(verifier.clone()));
        let plan = planner.build_plan(target)?;
        artifacts::write_plan(&plan, &config.plan_path(), &ledger)?;
        let executor = RepairExecutor::new(config, Box::new(verifier.clone()));
        let result = executor.apply(&plan, Authorization::Granted)?;
        artifacts::write_result(&result, &config.apply_result_path(), &ledger)?;
        applied = result.applied.len();
        info!(applied, errors = result.errors.len(), "auto-repair finished");
        run = verifier.verify_dir(target, options)?;
    }

    print_file_lines(&run);
    let doc = VerifyResultDoc::from_run(&run, config);
    doc.persist(&config.verify_result_path())?;

    let strict_failure = strict && (run.stats.fixed > 0 || applied > 0);
    Ok(Outcome::new(
        json!({
            "tool": "verify_audits",
            "ok": doc.ok && !strict_failure,
            "issues_total": doc.issues_total,
            "percent_valid": doc.percent_valid,
            "fixed": run.stats.fixed,
            "quarantined": run.stats.quarantined,
            "auto_repaired": applied,
            "output": config.verify_result_path().display().to_string(),
        }),
        !doc.ok || strict_failure,
    ))
}

fn plan(config: &AuditConfig, target: &Path, output: Option<PathBuf>) -> AuditResult<Outcome> {
    let output = output.unwrap_or_else(|| config.plan_path());
    let planner = RepairPlanner::new(Box::new(ChainVerifier::new(config)));
    let plan = planner.build_plan(target)?;
    let receipt = artifacts::write_plan(&plan, &output, &ReceiptLedger::new(config.receipts_path()))?;

    for repair in &plan.repairs {
        eprintln!("{}  {}  {}", repair.action, repair.repair_id, repair.paths.join(", "));
    }
    Ok(Outcome::new(
        json!({
            "tool": "plan_audit_repairs",
            "ok_to_apply": plan.ok_to_apply,
            "issues": plan.issues.len(),
            "repairs": plan.repairs.len(),
            "safe_repairs": plan.safe_repairs().count(),
            "output": output.display().to_string(),
            "receipt_hash": receipt.receipt_hash,
        }),
        !plan.repairs.is_empty(),
    ))
}

fn apply_plan(
    config: &AuditConfig,
    plan_path: Option<PathBuf>,
    authorization: Authorization,
) -> AuditResult<Outcome> {
    if authorization != Authorization::Granted {
        return Err(AuditError::ApplyNotAuthorized);
    }
    let plan_path = plan_path.unwrap_or_else(|| config.plan_path());
    let plan = artifacts::read_plan(&plan_path)?;
    let executor = RepairExecutor::new(config, Box::new(ChainVerifier::new(config)));
    let result = executor.apply(&plan, authorization)?;
    let output = config.apply_result_path();
    artifacts::write_result(&result, &output, &ReceiptLedger::new(config.receipts_path()))?;

    for applied in &result.applied {
        eprintln!("applied  {}  fixed={}", applied.path, applied.fixed);
    }
    for failure in &result.errors {
        eprintln!("error    {}  {}", failure.path, failure.error);
    }
    Ok(Outcome::new(
        json!({
            "tool": "apply_audit_repairs",
            "status": if result.errors.is_empty() { "ok" } else { "errors" },
            "applied": result.applied.len(),
            "skipped": result.skipped.len(),
            "errors": result.errors.len(),
            "output": output.display().to_string(),
        }),
        !result.errors.is_empty(),
    ))
}

fn converge(
    config: &AuditConfig,
    target: &Path,
    max_iterations: usize,
    apply: Authorization,
    output: Option<PathBuf>,
) -> AuditResult<Outcome> {
    let output = output.unwrap_or_else(|| config.convergence_report_path());
    let report = Orchestrator::new(config).run(target, max_iterations, apply)?;
    write_report(&report, &output)?;

    for manual in &report.remaining_manual_issues {
        eprintln!("manual_required  {}  {}", manual.repair_id, manual.paths.join(", "));
    }
    Ok(Outcome::new(
        json!({
            "tool": "converge_audits",
            "ok": report.ok,
            "iterations": report.iterations.len(),
            "applied_repairs": report.applied_repairs,
            "remaining_manual_issues": report.remaining_manual_issues.len(),
            "output": output.display().to_string(),
        }),
        !report.ok,
    ))
}

fn print_file_lines(run: &VerifyRun) {
    for (path, issues) in &run.issues_by_path {
        if issues.is_empty() {
            eprintln!("ok       {path}");
        } else {
            eprintln!("issues   {path}  ({})", issues.len());
            for issue in issues {
                eprintln!("         {}  {}", issue.code, issue.details);
            }
        }
    }
    for (path, reason) in &run.errors {
        eprintln!("error    {path}  {reason}");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
