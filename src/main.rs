use anyhow::{bail, Context, Result};
use clap::Parser;
use redmine2bugzilla::{export_bugs, scrape_bug, ExportConfig, HttpFetcher};
use std::fs::File;
use std::io::{self, BufRead, BufWriter, Write};

/// Export Redmine bugs to Bugzilla-importable XML.
#[derive(Parser, Debug)]
#[command(name = "redmine2bugzilla", version, about)]
struct Cli {
    /// Redmine base URL
    #[arg(
        long,
        env = "R2B_REDMINE_BASE",
        default_value = "http://redmine.example.com"
    )]
    redmine_base: String,

    /// Redmine server timezone (IANA name)
    #[arg(long, env = "R2B_REDMINE_TIMEZONE", default_value = "UTC")]
    redmine_timezone: String,

    /// Pattern ({} = old bug id) used for the searchable cross-reference id
    #[arg(
        long,
        env = "R2B_SEARCHABLE_ID_FORMULA",
        default_value = "example-bug-{}"
    )]
    searchable_id_formula: String,

    /// Bugzilla user for Redmine names missing from the lookup table
    #[arg(
        long,
        env = "R2B_BUGZILLA_DEFAULT_USER",
        default_value = "bugs@example.com"
    )]
    bugzilla_default_user: String,

    /// The default Bugzilla user's real name
    #[arg(
        long,
        env = "R2B_BUGZILLA_DEFAULT_USER_NAME",
        default_value = "Maintainers"
    )]
    bugzilla_default_user_name: String,

    /// Don't export; scrape and print data from these bug ids
    #[arg(short = 's', long = "scrape", value_name = "BUG_ID")]
    scrape: Vec<String>,

    /// Export this bug id (if '-', read bug ids one per line from stdin)
    #[arg(short = 'e', long = "export", value_name = "BUG_ID")]
    export: Vec<String>,

    /// Export to this file (if '-', stdout)
    #[arg(short = 'o', long, default_value = "-")]
    destination: String,

    /// Suppress progress output on stderr
    #[arg(short, long)]
    quiet: bool,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{}: {err:#}", env!("CARGO_PKG_NAME"));
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = build_config(&cli)?;
    let fetcher = HttpFetcher::new().context("building HTTP client")?;

    if !cli.scrape.is_empty() {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        for bug_id in &cli.scrape {
            writeln!(out, "Bug {bug_id}")?;
            writeln!(out, "----")?;
            let record = scrape_bug(bug_id, &config, &fetcher)
                .with_context(|| format!("scraping bug {bug_id}"))?;
            record.dump(&mut out)?;
            writeln!(out)?;
        }
        return Ok(());
    }

    let bug_ids = collect_export_ids(&cli.export)?;
    if bug_ids.is_empty() {
        bail!("no bug ids to export; pass --export or --scrape");
    }

    let mut stderr = io::stderr();
    let progress: Option<&mut dyn Write> = if cli.quiet { None } else { Some(&mut stderr) };

    let outcome = match cli.destination.as_str() {
        "-" => {
            let stdout = io::stdout();
            export_bugs(&bug_ids, &config, &fetcher, stdout.lock(), progress)?
        }
        path => {
            let file = File::create(path).with_context(|| format!("creating '{path}'"))?;
            export_bugs(&bug_ids, &config, &fetcher, BufWriter::new(file), progress)?
        }
    };

    if !outcome.failures.is_empty() {
        bail!(
            "{} of {} bug(s) failed to export",
            outcome.failures.len(),
            bug_ids.len()
        );
    }
    Ok(())
}

fn build_config(cli: &Cli) -> Result<ExportConfig> {
    let mut config = ExportConfig::default();
    config.redmine_base = ExportConfig::parse_base(&cli.redmine_base)?;
    config.timezone = ExportConfig::parse_timezone(&cli.redmine_timezone)?;
    config.searchable_id_formula = cli.searchable_id_formula.clone();
    config.default_user = cli.bugzilla_default_user.clone();
    config.default_user_name = cli.bugzilla_default_user_name.clone();
    Ok(config)
}

/// Expands `-` into ids read from stdin and keeps only all-digit ids.
fn collect_export_ids(args: &[String]) -> Result<Vec<String>> {
    let mut ids: Vec<String> = args.iter().filter(|id| is_bug_id(id)).cloned().collect();

    if args.iter().any(|arg| arg == "-") {
        for line in io::stdin().lock().lines() {
            let line = line.context("reading bug ids from stdin")?;
            let trimmed = line.trim();
            if is_bug_id(trimmed) {
                ids.push(trimmed.to_string());
            }
        }
    }
    Ok(ids)
}

fn is_bug_id(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_digit())
}
