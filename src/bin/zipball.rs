use std::path::PathBuf;
use std::process;
use std::time::Duration;

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use console::Style;
use indicatif::{ProgressBar, ProgressStyle};
use log::*;
use structopt::*;

use zipball::fetch::{self, FetchOptions};
use zipball::*;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "zipball",
    about = "Downloads a repository snapshot and unpacks it as it arrives"
)]
struct Opt {
    /// Pass multiple times for additional verbosity (info, debug, trace)
    #[structopt(short, long, parse(from_occurrences))]
    verbosity: usize,

    /// Extract into the given directory (created if needed) instead of the current one.
    #[structopt(long)]
    dir: Option<PathBuf>,

    /// Plain output: no colors, no spinner.
    #[structopt(long)]
    no_color: bool,

    /// The GitHub repository to fetch, as OWNER/REPO
    #[structopt(long, default_value = "xtremespb/heretic")]
    repo: Source,

    /// The branch, tag, or commit to fetch
    #[structopt(long = "ref", default_value = "master")]
    reference: String,

    /// Download from this URL instead of the repository's zipball URL.
    #[structopt(long)]
    url: Option<String>,
}

/// Everything the user sees on stdout
struct Printer {
    color: bool,
}

impl Printer {
    fn logo(&self, name: &str) {
        let spaced = name
            .to_uppercase()
            .chars()
            .map(String::from)
            .collect::<Vec<_>>()
            .join(" ");
        let blank = " ".repeat(spaced.chars().count() + 4);
        let title = format!("  {}  ", spaced);

        if self.color {
            let background = Style::new().on_green();
            let text = Style::new().on_green().white().bright().bold();
            println!(
                "{}\n{}\n{}\n",
                background.apply_to(&blank),
                text.apply_to(&title),
                background.apply_to(&blank)
            );
        } else {
            let rule = "═".repeat(blank.chars().count());
            println!("╔{rule}╗\n║{blank}║\n║{title}║\n║{blank}║\n╚{rule}╝\n");
        }
    }

    fn success(&self, message: &str) {
        if self.color {
            println!("{}", Style::new().green().bright().apply_to(message));
        } else {
            println!("{}", message);
        }
    }

    fn failure(&self, message: &str) {
        if self.color {
            println!("{}", Style::new().red().bright().apply_to(message));
        } else {
            println!("{}", message);
        }
    }
}

/// A spinner when we have colors, plain lines when we don't
enum Status {
    Spinner(ProgressBar),
    Lines,
}

impl Status {
    fn new(color: bool) -> Result<Self> {
        if !color {
            return Ok(Status::Lines);
        }
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
        spinner.enable_steady_tick(Duration::from_millis(100));
        Ok(Status::Spinner(spinner))
    }

    fn stage(&self, message: &str) {
        match self {
            Status::Spinner(spinner) => spinner.set_message(message.to_owned()),
            Status::Lines => println!("{}", message),
        }
    }

    fn finish(&self) {
        if let Status::Spinner(spinner) = self {
            spinner.finish_and_clear();
        }
    }
}

fn main() {
    let args = Opt::from_args();
    let printer = Printer {
        color: !args.no_color,
    };

    let mut errlog = stderrlog::new();
    errlog.verbosity(args.verbosity + 1);
    if args.no_color {
        errlog.color(stderrlog::ColorChoice::Never);
    }
    if let Err(e) = errlog.init() {
        eprintln!("Couldn't set up logging: {}", e);
    }

    if !printer.color {
        console::set_colors_enabled(false);
    }

    printer.logo(&args.repo.repo);
    let status = match Status::new(printer.color) {
        Ok(status) => status,
        Err(e) => {
            warn!("No spinner: {:#}", e);
            Status::Lines
        }
    };

    let outcome = run(&args, &status);
    status.finish();
    match outcome {
        Ok(report) => {
            info!(
                "{} directories, {} files, {} bytes",
                report.directories, report.files, report.bytes_written
            );
            printer.success("All done.");
            process::exit(0);
        }
        Err(e) => {
            printer.failure(&format!("{:#}", e));
            process::exit(1);
        }
    }
}

fn run(args: &Opt, status: &Status) -> Result<ExtractionReport> {
    let source = args.repo.clone().with_reference(args.reference.as_str());

    status.stage("Downloading archive headers...");
    let destination = destination(args.dir.as_ref())?;
    std::fs::create_dir_all(&destination)
        .with_context(|| format!("Couldn't create directory {}", destination))?;

    let url = args.url.clone().unwrap_or_else(|| source.zipball_url());
    info!("Fetching {} from {}", source, url);
    let response = fetch::open(&url, &FetchOptions::default())?;

    status.stage(&format!("Downloading and extracting {}...", title_case(&source.repo)));
    let prefix = source
        .synthetic_prefix()
        .with_context(|| format!("Couldn't match folder names for {}", source))?;
    let mut options = ExtractOptions::new().prefix(prefix);
    if let Status::Spinner(spinner) = status {
        let spinner = spinner.clone();
        let repo = title_case(&source.repo);
        options = options.on_entry(move |entry| {
            spinner.set_message(format!(
                "Downloading and extracting {}... {}",
                repo, entry.relative_path
            ));
        });
    }

    let report = extract(response, &destination, options)
        .with_context(|| format!("Couldn't extract {} into {}", url, destination))?;
    Ok(report)
}

/// `--dir`, or the current directory, made absolute
fn destination(dir: Option<&PathBuf>) -> Result<Utf8PathBuf> {
    let cwd = std::env::current_dir().context("Couldn't get the current directory")?;
    let absolute = match dir {
        Some(dir) => cwd.join(dir),
        None => cwd,
    };
    Utf8PathBuf::try_from(absolute).context("Destination isn't valid UTF-8")
}

fn title_case(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
