use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueHint};
use ergsync::{
    boundary_drift, default_output_path, parse_erg, parse_tcx, parse_zwo, reconcile,
    seconds_to_hhmmss, summarize, transitions, verify, write_pbintervals, ErgFile, Params,
    Profile, ReconciledInterval, VerifyReport, Workout,
};
use rayon::prelude::*;
use serde_json::json;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod chart;
mod discover;

use chart::{render_chart_guard, ChartKind};
use discover::WorkoutPair;

#[derive(Parser, Debug)]
#[command(author, version, about = "Convert TCX + ERG workouts to PB Intervals CSV", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose logging
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert one TCX/ERG pair to a PB Intervals CSV
    Convert(ConvertArgs),
    /// Convert the newest matching TCX/ERG pair found in a downloads folder
    Auto(AutoArgs),
    /// Report how far the ERG clock drifts from the TCX step boundaries
    Diagnose(DiagnoseArgs),
    /// Compare the reconciled intervals against a ZWO plan
    Verify(VerifyArgs),
}

#[derive(Args, Debug, Clone)]
struct ReconcileOpts {
    /// Functional threshold power in watts (else FTP= in .env, else the ERG header)
    #[arg(short, long)]
    ftp: Option<f64>,

    /// Start/end change (percent) below which an interval is shown as steady
    #[arg(long, default_value_t = 10.0)]
    steady_threshold: f64,

    /// Boundary match tolerance in seconds
    #[arg(long, default_value_t = 0.01)]
    epsilon: f64,
}

#[derive(Parser, Debug)]
struct ConvertArgs {
    /// TCX workout with step names and durations
    #[arg(value_hint = ValueHint::FilePath)]
    tcx: PathBuf,

    /// ERG course with the power profile
    #[arg(value_hint = ValueHint::FilePath)]
    erg: PathBuf,

    /// Output CSV path (`-` for stdout; defaults to <tcx>_pbintervals.csv)
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    output: Option<PathBuf>,

    /// Also dump the reconciled intervals as JSON
    #[arg(long, value_hint = ValueHint::FilePath)]
    json: Option<PathBuf>,

    /// Render the profile and intervals to a PNG
    #[arg(long, value_hint = ValueHint::FilePath)]
    png: Option<PathBuf>,

    /// Render the profile and intervals to an SVG
    #[arg(long, value_hint = ValueHint::FilePath)]
    svg: Option<PathBuf>,

    #[command(flatten)]
    opts: ReconcileOpts,
}

#[derive(Parser, Debug)]
struct AutoArgs {
    /// Folder to search (defaults to ~/Downloads)
    #[arg(long, value_hint = ValueHint::DirPath)]
    dir: Option<PathBuf>,

    /// Convert every matching pair instead of only the newest
    #[arg(long, action = ArgAction::SetTrue)]
    all: bool,

    /// Reveal the written CSV in Finder
    #[arg(long, action = ArgAction::SetTrue)]
    reveal: bool,

    #[command(flatten)]
    opts: ReconcileOpts,
}

#[derive(Parser, Debug)]
struct DiagnoseArgs {
    #[arg(value_hint = ValueHint::FilePath)]
    tcx: PathBuf,

    #[arg(value_hint = ValueHint::FilePath)]
    erg: PathBuf,

    /// Output report path (`-` for stdout)
    #[arg(short, long, default_value = "-", value_hint = ValueHint::FilePath)]
    output: PathBuf,
}

#[derive(Parser, Debug)]
struct VerifyArgs {
    #[arg(value_hint = ValueHint::FilePath)]
    tcx: PathBuf,

    #[arg(value_hint = ValueHint::FilePath)]
    erg: PathBuf,

    /// Zwift workout holding the intended plan
    #[arg(value_hint = ValueHint::FilePath)]
    zwo: PathBuf,

    /// Allowed difference between planned and reconciled watts
    #[arg(long, default_value_t = 2.0)]
    tolerance: f64,

    #[command(flatten)]
    opts: ReconcileOpts,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match cli.command {
        Command::Convert(args) => handle_convert(args),
        Command::Auto(args) => handle_auto(args),
        Command::Diagnose(args) => handle_diagnose(args),
        Command::Verify(args) => handle_verify(args),
    }
}

struct Inputs {
    workout: Workout,
    erg: ErgFile,
}

fn load_inputs(tcx: &Path, erg: &Path) -> Result<Inputs> {
    let tcx_text =
        fs::read_to_string(tcx).with_context(|| format!("failed to read {}", tcx.display()))?;
    let workout =
        parse_tcx(&tcx_text).with_context(|| format!("failed to parse {}", tcx.display()))?;
    let erg_bytes = fs::read(erg).with_context(|| format!("failed to read {}", erg.display()))?;
    let erg_file = parse_erg(&String::from_utf8_lossy(&erg_bytes))
        .with_context(|| format!("failed to parse {}", erg.display()))?;
    debug!(
        "Loaded '{}': {} steps, {} power samples",
        workout.name,
        workout.segments.len(),
        erg_file.samples.len()
    );
    Ok(Inputs {
        workout,
        erg: erg_file,
    })
}

fn build_params(opts: &ReconcileOpts, ftp: f64) -> Result<Params> {
    if !(opts.steady_threshold >= 0.0) {
        return Err(anyhow!("--steady-threshold must be >= 0"));
    }
    Ok(Params {
        steady_threshold: opts.steady_threshold / 100.0,
        match_epsilon_s: opts.epsilon,
        reference: Some(ftp),
    })
}

/// FTP from the flag, then a `.env` in the working directory, then the
/// ERG header.
fn resolve_ftp(cli_ftp: Option<f64>, erg: &ErgFile) -> Result<f64> {
    if let Some(ftp) = cli_ftp {
        return Ok(ftp);
    }
    if let Some(ftp) = load_ftp_from_env(Path::new(".env")) {
        debug!("Using FTP {} from .env", ftp);
        return Ok(ftp);
    }
    if let Some(ftp) = erg.header.ftp {
        info!("Using FTP {} from the ERG header", ftp);
        return Ok(ftp);
    }
    Err(anyhow!(
        "FTP value is required: create a .env file with FTP=YOUR_VALUE or pass --ftp"
    ))
}

fn load_ftp_from_env(path: &Path) -> Option<f64> {
    let text = fs::read_to_string(path).ok()?;
    parse_env_ftp(&text)
}

fn parse_env_ftp(text: &str) -> Option<f64> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .find(|(key, _)| key.trim() == "FTP")
        .and_then(|(_, value)| value.trim().parse::<f64>().ok())
        .filter(|ftp| *ftp > 0.0)
}

struct Conversion {
    inputs: Inputs,
    intervals: Vec<ReconciledInterval>,
}

fn run_conversion(tcx: &Path, erg: &Path, output: &Path, opts: &ReconcileOpts) -> Result<Conversion> {
    let inputs = load_inputs(tcx, erg)?;
    let ftp = resolve_ftp(opts.ftp, &inputs.erg)?;
    let params = build_params(opts, ftp)?;

    let t_reconcile = Instant::now();
    let intervals = reconcile(&inputs.workout.segments, &inputs.erg.samples, &params)?;
    debug!(
        "Reconcile stage: {:.2} ms",
        t_reconcile.elapsed().as_secs_f64() * 1000.0
    );
    for interval in intervals.iter().filter(|i| !i.is_steady) {
        debug!(
            "Ramp '{}' {:.0}-{:.0}W over {}",
            interval.name,
            interval.start_value,
            interval.end_value,
            seconds_to_hhmmss(interval.duration_s)
        );
    }

    if output.as_os_str() == "-" {
        let stdout = io::stdout();
        write_pbintervals(&inputs.workout.name, &intervals, stdout.lock())?;
    } else {
        let file = File::create(output)
            .with_context(|| format!("failed to create {}", output.display()))?;
        write_pbintervals(&inputs.workout.name, &intervals, BufWriter::new(file))
            .with_context(|| format!("failed to write {}", output.display()))?;
        info!("Created PB Intervals CSV: {}", output.display());
    }

    let summary = summarize(&intervals);
    info!(
        "Total intervals: {} ({} steady, {} ramps)",
        summary.intervals, summary.steady_count, summary.ramp_count
    );
    info!(
        "Total duration: {}",
        seconds_to_hhmmss(summary.total_duration_s)
    );

    Ok(Conversion { inputs, intervals })
}

fn handle_convert(args: ConvertArgs) -> Result<()> {
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&args.tcx));
    let conversion = run_conversion(&args.tcx, &args.erg, &output, &args.opts)?;

    if let Some(path) = args.json.as_ref() {
        write_json(&conversion, path)?;
        info!("Wrote interval JSON: {}", path.display());
    }

    for path in [args.png.as_ref(), args.svg.as_ref()].into_iter().flatten() {
        let kind = ChartKind::from_path(path);
        if let Err(err) = render_chart_guard(
            &conversion.intervals,
            &conversion.inputs.erg.samples,
            path,
            kind,
        ) {
            warn!("Skipping chart render ({}): {}", path.display(), err);
        } else {
            info!("Wrote chart: {}", path.display());
        }
    }
    Ok(())
}

fn write_json(conversion: &Conversion, path: &Path) -> Result<()> {
    let doc = json!({
        "workout": conversion.inputs.workout.name,
        "summary": summarize(&conversion.intervals),
        "intervals": conversion.intervals,
    });
    let text = serde_json::to_string_pretty(&doc)?;
    fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

fn handle_auto(args: AutoArgs) -> Result<()> {
    let dir = args.dir.clone().unwrap_or_else(discover::default_dir);
    let scan = discover::scan_dir(&dir)?;

    if scan.tcx_files.is_empty() {
        return Err(anyhow!("no .tcx files found in {}", dir.display()));
    }
    if scan.erg_files.is_empty() {
        return Err(anyhow!("no .erg files found in {}", dir.display()));
    }
    if scan.pairs.is_empty() {
        warn!("TCX files: {}", file_names(&scan.tcx_files));
        warn!("ERG files: {}", file_names(&scan.erg_files));
        return Err(anyhow!(
            "no matching .tcx/.erg pairs in {}; export both files from Xert with the same name \
             (e.g. 'VIRTUAL - Ellis.tcx' and 'VIRTUAL - Ellis.erg')",
            dir.display()
        ));
    }

    let pairs: Vec<WorkoutPair> = if args.all {
        scan.pairs
    } else {
        scan.pairs.into_iter().take(1).collect()
    };
    for pair in &pairs {
        info!(
            "Found workout: {} + {} (modified {})",
            pair.tcx.display(),
            pair.erg.display(),
            pair.modified_display()
        );
    }

    let results: Vec<(PathBuf, Result<Conversion>)> = pairs
        .par_iter()
        .map(|pair| {
            let output = pair.output_path();
            let result = run_conversion(&pair.tcx, &pair.erg, &output, &args.opts);
            (output, result)
        })
        .collect();

    let mut failures = 0usize;
    let mut last_written = None;
    for (output, result) in results {
        match result {
            Ok(_) => last_written = Some(output),
            Err(err) => {
                failures += 1;
                warn!("Conversion failed for {}: {:#}", output.display(), err);
            }
        }
    }

    if args.reveal {
        if let Some(path) = last_written.as_ref() {
            reveal_in_file_manager(path);
        }
    }

    if failures > 0 {
        return Err(anyhow!("{} of {} conversions failed", failures, pairs.len()));
    }
    Ok(())
}

fn file_names(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .take(5)
        .filter_map(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(target_os = "macos")]
fn reveal_in_file_manager(path: &Path) {
    match std::process::Command::new("open").arg("-R").arg(path).status() {
        Ok(status) if status.success() => info!("Revealed in Finder: {}", path.display()),
        Ok(status) => warn!("open -R exited with {}", status),
        Err(err) => warn!("Could not reveal {}: {}", path.display(), err),
    }
}

#[cfg(not(target_os = "macos"))]
fn reveal_in_file_manager(path: &Path) {
    warn!(
        "Reveal is only supported on macOS; output is at {}",
        path.display()
    );
}

fn handle_diagnose(args: DiagnoseArgs) -> Result<()> {
    let inputs = load_inputs(&args.tcx, &args.erg)?;
    let report = diagnose_report(&inputs)?;

    if args.output.as_os_str() == "-" {
        io::stdout().lock().write_all(report.as_bytes())?;
    } else {
        fs::write(&args.output, report)
            .with_context(|| format!("failed to write {}", args.output.display()))?;
        info!("Drift report written: {}", args.output.display());
    }
    Ok(())
}

fn diagnose_report(inputs: &Inputs) -> Result<String> {
    let profile = Profile::new(&inputs.erg.samples)?;
    let mut report = String::new();

    report.push_str(&format!("WORKOUT: {}\n", inputs.workout.name));
    if let Some(ftp) = inputs.erg.header.ftp {
        report.push_str(&format!("  erg_ftp: {:.0}W\n", ftp));
    }

    report.push_str("ERG transitions:\n");
    for sample in transitions(&profile) {
        report.push_str(&format!(
            "  {:7.1}s ({:6.2}min): {:6.1}W\n",
            sample.t,
            sample.t / 60.0,
            sample.value
        ));
    }

    report.push_str("TCX steps:\n");
    let mut cursor = 0.0;
    for (idx, segment) in inputs.workout.segments.iter().enumerate() {
        report.push_str(&format!(
            "  {:>3}. {} [{}] {:.0}s - {:.0}s\n",
            idx + 1,
            segment.name,
            seconds_to_hhmmss(segment.duration_s),
            cursor,
            cursor + segment.duration_s
        ));
        cursor += segment.duration_s;
    }

    report.push_str("Boundary drift (nearest ERG sample to each step end):\n");
    report.push_str(&format!(
        "  {:<10} {:<10} {:<10} {}\n",
        "tcx_end", "erg_time", "erg_power", "delta"
    ));
    let drift = boundary_drift(&inputs.workout.segments, &profile);
    for row in &drift {
        report.push_str(&format!(
            "  {:>8.1}s {:>8.1}s {:>8.1}W {:+6.2}s\n",
            row.boundary_s, row.sample_t, row.sample_value, row.delta_s
        ));
    }
    let worst = drift.iter().map(|d| d.delta_s.abs()).fold(0.0_f64, f64::max);
    report.push_str(&format!("  max |delta|: {:.2}s\n", worst));
    Ok(report)
}

fn handle_verify(args: VerifyArgs) -> Result<()> {
    let inputs = load_inputs(&args.tcx, &args.erg)?;
    let zwo_text = fs::read_to_string(&args.zwo)
        .with_context(|| format!("failed to read {}", args.zwo.display()))?;
    let plan =
        parse_zwo(&zwo_text).with_context(|| format!("failed to parse {}", args.zwo.display()))?;

    let ftp = match (args.opts.ftp, plan.ftp_override) {
        (Some(ftp), _) => ftp,
        (None, Some(ftp)) => ftp,
        (None, None) => resolve_ftp(None, &inputs.erg)?,
    };
    let params = build_params(&args.opts, ftp)?;
    let intervals = reconcile(&inputs.workout.segments, &inputs.erg.samples, &params)?;
    let report = verify(&intervals, &plan.steps, ftp, args.tolerance)?;

    print!("{}", format_verify_report(&report));
    if report.all_match() {
        info!("All {} intervals match the plan", report.rows.len());
        Ok(())
    } else {
        Err(anyhow!(
            "{} of {} intervals do not match the plan",
            report.mismatches(),
            report.rows.len()
        ))
    }
}

fn format_verify_report(report: &VerifyReport) -> String {
    let watts = |w: Option<i64>| w.map_or("-".to_string(), |w| format!("{}W", w));
    let duration = |d: Option<f64>| d.map_or("-".to_string(), seconds_to_hhmmss);

    let mut out = String::new();
    out.push_str(&format!(
        "{:<5} {:<24} {:>8} {:>10} {:>8} {:>10}  {}\n",
        "step", "name", "plan", "plan_dur", "actual", "actual_dur", "result"
    ));
    for row in &report.rows {
        let mut problems = Vec::new();
        if row.false_ramp {
            problems.push("RAMP");
        }
        if !row.power_ok {
            problems.push("power");
        }
        if !row.duration_ok {
            problems.push("duration");
        }
        let result = if problems.is_empty() {
            "ok".to_string()
        } else {
            problems.join(",")
        };
        out.push_str(&format!(
            "{:<5} {:<24} {:>8} {:>10} {:>8} {:>10}  {}\n",
            row.index + 1,
            row.name.as_deref().unwrap_or("-"),
            watts(row.planned_watts),
            duration(row.planned_duration_s),
            watts(row.actual_watts),
            duration(row.actual_duration_s),
            result
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_ftp_parsing() {
        assert_eq!(parse_env_ftp("FTP=277\n"), Some(277.0));
        assert_eq!(parse_env_ftp("# FTP=1\nNAME=x\n FTP = 250 \n"), Some(250.0));
        assert_eq!(parse_env_ftp("FTP=abc\n"), None);
        assert_eq!(parse_env_ftp("FTP=0\n"), None);
        assert_eq!(parse_env_ftp(""), None);
    }

    #[test]
    fn flag_wins_over_erg_header() {
        let mut erg = ErgFile::default();
        erg.header.ftp = Some(250.0);
        assert_eq!(resolve_ftp(Some(300.0), &erg).unwrap(), 300.0);
    }

    #[test]
    fn threshold_percent_becomes_fraction() {
        let opts = ReconcileOpts {
            ftp: None,
            steady_threshold: 12.5,
            epsilon: 0.02,
        };
        let params = build_params(&opts, 280.0).unwrap();
        assert_eq!(params.steady_threshold, 0.125);
        assert_eq!(params.match_epsilon_s, 0.02);
        assert_eq!(params.reference, Some(280.0));
    }

    #[test]
    fn convert_writes_csv_and_json() {
        let dir = tempfile::tempdir().unwrap();
        let tcx = dir.path().join("Ellis.tcx");
        let erg = dir.path().join("Ellis.erg");
        fs::write(
            &tcx,
            "<TrainingCenterDatabase><Workouts><Workout><Name>Ellis</Name>\
             <Step><Name>Warmup</Name><Duration><Seconds>600</Seconds></Duration></Step>\
             <Step><Name>Interval</Name><Duration><Seconds>300</Seconds></Duration></Step>\
             </Workout></Workouts></TrainingCenterDatabase>",
        )
        .unwrap();
        fs::write(
            &erg,
            "[COURSE DATA]\n0\t150\n10\t150\n10\t300\n15\t300\n[END COURSE DATA]\n",
        )
        .unwrap();
        let json_path = dir.path().join("Ellis.json");

        handle_convert(ConvertArgs {
            tcx: tcx.clone(),
            erg,
            output: None,
            json: Some(json_path.clone()),
            png: None,
            svg: None,
            opts: ReconcileOpts {
                ftp: Some(277.0),
                steady_threshold: 10.0,
                epsilon: 0.01,
            },
        })
        .unwrap();

        let csv = fs::read_to_string(dir.path().join("Ellis_pbintervals.csv")).unwrap();
        assert!(csv.contains("Warmup [150W],#00BFFF"));
        assert!(csv.contains("Interval [300W],#FF4500"));

        let doc: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(json_path).unwrap()).unwrap();
        assert_eq!(doc["workout"], "Ellis");
        assert_eq!(doc["intervals"].as_array().map(Vec::len), Some(2));
        assert_eq!(doc["summary"]["steady_count"], 2);
    }

    #[test]
    fn diagnose_reports_drift() {
        let inputs = Inputs {
            workout: Workout {
                name: "W".into(),
                segments: vec![ergsync::Segment::new("A", 60.0)],
            },
            erg: parse_erg("[COURSE DATA]\n0 100\n1.005 100\n").unwrap(),
        };
        let report = diagnose_report(&inputs).unwrap();
        assert!(report.contains("WORKOUT: W"));
        assert!(report.contains("+0.30s"));
    }
}
