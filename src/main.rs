use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use flamingo_review::api::{ArchiveUpload, HttpBackend, ReviewBackend};
use flamingo_review::app::{ReviewSession, SessionEvent, SessionSettings};
use flamingo_review::config::Config;
use flamingo_review::issues::{AnalysisResult, Issue, IssueId};
use flamingo_review::util::{plural, truncate};
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(
    name = "flamingo",
    about = "Friendly code review from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Upload a project archive and list its issues
    Analyze(AnalyzeArgs),
    /// Show the effective configuration
    Config,
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// Zip archive of the project
    archive: PathBuf,
    /// Fetch and print an explanation for every issue
    #[arg(long)]
    explain: bool,
    /// Download the analyzed workspace as a zip (default name if omitted)
    #[arg(long, num_args = 0..=1, value_name = "OUT")]
    export: Option<Option<PathBuf>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Analyze(args) => analyze(args).await,
        Commands::Config => {
            print_config(&Config::load());
            Ok(())
        }
    }
}

async fn analyze(args: AnalyzeArgs) -> Result<()> {
    let bytes = std::fs::read(&args.archive)
        .with_context(|| format!("Failed to read {}", args.archive.display()))?;
    let file_name = args
        .archive
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project.zip".to_string());

    let mut config = Config::load();
    let backend = HttpBackend::from_config(&config)?;
    let settings = SessionSettings::from_config(&mut config);
    let mut session = ReviewSession::new(backend, settings);

    eprintln!("🦩 Analyzing {}...", file_name);
    session.analyze_archive(ArchiveUpload { file_name, bytes });
    for event in run_until_idle(&mut session).await {
        if let SessionEvent::Alert(notice) = event {
            bail!(notice.message);
        }
    }
    if let Some(report) = session.analysis().and_then(failure_report) {
        bail!(report);
    }

    print_issues(&session);

    if args.explain {
        let ids: Vec<IssueId> = session.issues().ids().collect();
        for id in &ids {
            session.request_explanation(id);
        }
        run_until_idle(&mut session).await;
        print_explanations(&session, &ids);
    }

    if let Some(out) = args.export {
        let out = out.unwrap_or_else(default_export_path);
        session.export_project()?;
        for event in run_until_idle(&mut session).await {
            match event {
                SessionEvent::Exported(bytes) => {
                    write_export(&out, &bytes)?;
                    eprintln!("📦 Exported {} to {}", plural(bytes.len(), "byte"), out.display());
                }
                SessionEvent::Alert(notice) => bail!(notice.message),
                _ => {}
            }
        }
    }

    Ok(())
}

/// Error text for a failed primary analysis, with the linter's stderr
fn failure_report(analysis: &AnalysisResult) -> Option<String> {
    let error = analysis.primary_error()?;
    let mut report = format!("Analysis failed: {}", truncate(error, 400));
    if let Some(stderr) = analysis.primary_stderr() {
        report.push_str("\n\nLinter output:\n");
        report.push_str(&truncate(stderr.trim_end(), 2000));
    }
    Some(report)
}

/// Handle background messages until nothing is in flight
async fn run_until_idle<B: ReviewBackend>(session: &mut ReviewSession<B>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while session.has_pending_work() {
        let Some(msg) = session.next_message().await else {
            break;
        };
        events.extend(session.handle_message(msg, Instant::now()));
    }
    events
}

fn print_issues<B: ReviewBackend>(session: &ReviewSession<B>) {
    println!();
    println!("{}", session.summary());
    for group in session.issues().group_by_file() {
        println!();
        println!("{} ({})", group.file, plural(group.issues.len(), "issue"));
        for issue in group.issues {
            print_issue_line(issue);
        }
    }
    println!();
}

fn print_issue_line(issue: &Issue) {
    println!(
        "  {:>5}  {:<10} {:<12} {}",
        issue.line,
        issue.code,
        issue.category.label(),
        truncate(issue.display_message(), 100)
    );
}

fn print_explanations<B: ReviewBackend>(session: &ReviewSession<B>, ids: &[IssueId]) {
    for id in ids {
        let Some(issue) = session.issue(id) else {
            continue;
        };
        let Some(explanation) = &issue.explanation else {
            continue;
        };
        println!("{}:{} {}", issue.file, issue.line, issue.code);
        println!("  Why: {}", explanation.why);
        if !explanation.fix.trim().is_empty() {
            println!("  Fix: {}", explanation.fix);
        }
        if let Some(example) = &explanation.example {
            println!("  Example:");
            for line in example.lines() {
                println!("    {}", line);
            }
        }
        println!();
    }
}

fn default_export_path() -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    PathBuf::from(format!("flamingo-export-{}.zip", stamp))
}

fn write_export(path: &Path, bytes: &[u8]) -> Result<()> {
    std::fs::write(path, bytes).with_context(|| format!("Failed to write {}", path.display()))
}

fn print_config(config: &Config) {
    println!("Config file:        {}", Config::config_location());
    println!("Backend URL:        {}", config.backend_url());
    println!(
        "User id:            {}",
        config.user_id().unwrap_or_else(|| "(generated on first use)".to_string())
    );
    println!("Explanation level:  {}", config.explanation_level.as_str());
    println!("Re-analysis delay:  {} ms", config.reanalysis_quiet_ms);
    println!("Feedback reset:     {} ms", config.feedback_reset_ms);
    println!("Request timeout:    {} s", config.request_timeout_secs);
}

#[cfg(test)]
mod tests {
    use super::*;
    use flamingo_review::issues::{RawOutput, SubReport};

    #[test]
    fn test_failure_report_includes_linter_output() {
        let analysis = AnalysisResult {
            main_analysis: Some(SubReport {
                success: Some(false),
                issues: None,
                error: Some("Linter failed".to_string()),
                raw: Some(RawOutput {
                    stderr: Some("pylint: No module named 'app'\n".to_string()),
                }),
            }),
            ..AnalysisResult::default()
        };

        let report = failure_report(&analysis).unwrap();
        assert!(report.starts_with("Analysis failed: Linter failed"));
        assert!(report.ends_with("Linter output:\npylint: No module named 'app'"));
    }

    #[test]
    fn test_no_failure_report_without_error() {
        let analysis = AnalysisResult {
            main_analysis: Some(SubReport::with_issues(Vec::new())),
            ..AnalysisResult::default()
        };
        assert!(failure_report(&analysis).is_none());
    }
}
