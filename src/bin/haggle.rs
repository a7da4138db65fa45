use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser, Subcommand};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use haggle::catalog::{AutoConfirm, CatalogOptions, ConfirmDir, KaggleDatasets};
use haggle::config::{CredentialsLoader, DEFAULT_MAX_PAGES, DEFAULT_START_PAGE};
use haggle::domain::{DatasetFilter, DatasetInfo, DatasetRef, FileType, License, SortBy};
use haggle::error::HaggleError;
use haggle::kaggle::{KaggleClient, KaggleHttpClient};
use haggle::output::{GetResult, JsonOutput, ListResult, OutputMode, RemoveResult, SearchResult};

#[derive(Parser)]
#[command(name = "haggle")]
#[command(about = "Kaggle datasets as a local key-value cache")]
#[command(version, author)]
struct Cli {
    /// Cache root (defaults to $HAGGLE_ROOTDIR, then ~/haggle)
    #[arg(long, global = true)]
    root: Option<Utf8PathBuf>,

    #[arg(long, global = true)]
    non_interactive: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Search the Kaggle catalog")]
    Search(SearchArgs),
    #[command(about = "Download a dataset archive (or read it from the cache)")]
    Get(RefArgs),
    #[command(about = "Show a dataset's metadata")]
    Info(RefArgs),
    #[command(about = "Remove a cached archive")]
    Rm(RefArgs),
    #[command(about = "List cached archives")]
    Ls,
}

#[derive(Args)]
struct SearchArgs {
    term: String,

    #[arg(long, default_value_t = DEFAULT_MAX_PAGES)]
    max_pages: u32,

    #[arg(long, default_value_t = DEFAULT_START_PAGE)]
    start_page: u32,

    #[arg(long)]
    sort_by: Option<SortBy>,

    #[arg(long)]
    file_type: Option<FileType>,

    #[arg(long)]
    license: Option<License>,

    #[arg(long)]
    user: Option<String>,

    /// Do not write the results to the metadata cache
    #[arg(long)]
    no_cache_meta: bool,
}

#[derive(Args)]
struct RefArgs {
    reference: String,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(haggle) = report.downcast_ref::<HaggleError>() {
            return ExitCode::from(map_exit_code(haggle));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &HaggleError) -> u8 {
    match error {
        HaggleError::DatasetNotFound(_)
        | HaggleError::NotFound(_)
        | HaggleError::InvalidReference(_)
        | HaggleError::MissingCredentials => 2,
        HaggleError::KaggleHttp(_)
        | HaggleError::KaggleStatus { .. }
        | HaggleError::Download { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    match cli.command {
        Commands::Search(args) => {
            let options = CatalogOptions {
                cache_metas_on_search: !args.no_cache_meta,
                start_page: args.start_page,
                max_pages: args.max_pages,
                warn_if_more: matches!(output_mode, OutputMode::Interactive),
            };
            let datasets = open(cli.root, online()?, options, output_mode)?;
            run_search(args, &datasets, output_mode)
        }
        Commands::Get(args) => {
            let datasets = open(cli.root, online()?, CatalogOptions::default(), output_mode)?;
            run_get(args, &datasets, output_mode)
        }
        Commands::Info(args) => {
            let datasets = open(cli.root, online()?, CatalogOptions::default(), output_mode)?;
            run_info(args, &datasets, output_mode)
        }
        Commands::Rm(args) => {
            let datasets = open(cli.root, Offline, CatalogOptions::default(), output_mode)?;
            run_rm(args, &datasets, output_mode)
        }
        Commands::Ls => {
            let datasets = open(cli.root, Offline, CatalogOptions::default(), output_mode)?;
            run_ls(&datasets, output_mode)
        }
    }
}

fn online() -> miette::Result<KaggleHttpClient> {
    let credentials = CredentialsLoader::resolve(None)?;
    Ok(KaggleHttpClient::new(credentials)?)
}

fn open<C: KaggleClient>(
    root: Option<Utf8PathBuf>,
    client: C,
    options: CatalogOptions,
    output_mode: OutputMode,
) -> miette::Result<KaggleDatasets<C>> {
    let confirm = confirm_for(output_mode, io::stdin().is_terminal());
    Ok(KaggleDatasets::open(root, client, options, confirm)?)
}

/// Only a terminal can answer the directory prompt; anything else auto-confirms.
fn confirm_for(output_mode: OutputMode, stdin_is_terminal: bool) -> &'static dyn ConfirmDir {
    match output_mode {
        OutputMode::Interactive if stdin_is_terminal => &prompt_create,
        _ => &AutoConfirm,
    }
}

fn run_search<C: KaggleClient>(
    args: SearchArgs,
    datasets: &KaggleDatasets<C>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let mut filter = DatasetFilter::search(args.term);
    filter.sort_by = args.sort_by;
    filter.file_type = args.file_type;
    filter.license = args.license;
    filter.user = args.user;

    let mut lister = datasets.search_with(filter)?;
    let count = lister.size()?;
    let max_pages_reached = lister.max_pages_reached().unwrap_or(false);
    let index = lister.index()?;
    let records: Vec<DatasetInfo> = index.indexed().cloned().collect();

    match output_mode {
        OutputMode::NonInteractive => {
            let result = SearchResult {
                count,
                pages: index.page_count(),
                max_pages_reached,
                datasets: records,
            };
            JsonOutput::print_search(&result).into_diagnostic()?;
        }
        OutputMode::Interactive => {
            for record in &records {
                let reference = record.reference().unwrap_or("?");
                match record.title() {
                    Some(title) => println!("{reference}  {title}"),
                    None => println!("{reference}"),
                }
            }
            println!("{count} datasets over {} pages", index.page_count());
            if max_pages_reached {
                println!("page cap reached, raise --max-pages to list more");
            }
        }
    }
    Ok(())
}

fn run_get<C: KaggleClient>(
    args: RefArgs,
    datasets: &KaggleDatasets<C>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let reference = args.reference.parse::<DatasetRef>()?;
    let cached = datasets.contains(&reference)?;
    let archive = datasets.get(&reference)?;
    match output_mode {
        OutputMode::NonInteractive => {
            let result = GetResult {
                reference,
                cached,
                size: archive.bytes().len(),
                files: archive.names().to_vec(),
            };
            JsonOutput::print_get(&result).into_diagnostic()?;
        }
        OutputMode::Interactive => {
            let source = if cached { "cache" } else { "Kaggle" };
            println!(
                "{reference}: {} files, {} bytes (from {source})",
                archive.len(),
                archive.bytes().len()
            );
            for name in archive.names() {
                println!("  {name}");
            }
        }
    }
    Ok(())
}

fn run_info<C: KaggleClient>(
    args: RefArgs,
    datasets: &KaggleDatasets<C>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let reference = args.reference.parse::<DatasetRef>()?;
    let record = datasets.info(&reference)?;
    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_info(&record).into_diagnostic()?,
        OutputMode::Interactive => {
            println!("{reference}");
            if let Some(title) = record.title() {
                println!("  title: {title}");
            }
            if let Some(url) = record.url() {
                println!("  url:   {url}");
            }
            if let Some(size) = record.total_bytes() {
                println!("  size:  {size} bytes");
            }
        }
    }
    Ok(())
}

fn run_rm<C: KaggleClient>(
    args: RefArgs,
    datasets: &KaggleDatasets<C>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let reference = args.reference.parse::<DatasetRef>()?;
    datasets.delete(&reference)?;
    match output_mode {
        OutputMode::NonInteractive => {
            let result = RemoveResult {
                reference,
                removed: true,
            };
            JsonOutput::print_remove(&result).into_diagnostic()?;
        }
        OutputMode::Interactive => println!("removed {reference}"),
    }
    Ok(())
}

fn run_ls<C: KaggleClient>(
    datasets: &KaggleDatasets<C>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let archives = datasets.cached()?;
    match output_mode {
        OutputMode::NonInteractive => {
            let result = ListResult {
                root: datasets.rootdir().to_string(),
                archives,
            };
            JsonOutput::print_list(&result).into_diagnostic()?;
        }
        OutputMode::Interactive => {
            for entry in &archives {
                println!(
                    "{}  {} bytes  {}",
                    entry.reference,
                    entry.size,
                    entry.modified.as_deref().unwrap_or("-")
                );
            }
            println!("{} archives in {}", archives.len(), datasets.zips_dir());
        }
    }
    Ok(())
}

fn prompt_create(path: &Utf8Path) -> bool {
    match ask_create(path, &mut io::stderr(), read_yes_no) {
        Ok(answer) => answer,
        Err(err) => {
            tracing::warn!(%err, "no answer to the directory prompt, not creating {path}");
            false
        }
    }
}

fn ask_create(
    path: &Utf8Path,
    out: &mut impl Write,
    read_answer: impl FnOnce() -> io::Result<bool>,
) -> io::Result<bool> {
    write!(
        out,
        "The directory {path} doesn't exist. Should I make that directory for you? ([Y]/n) "
    )?;
    out.flush()?;
    let answer = read_answer()?;
    writeln!(out, "{}", if answer { "y" } else { "n" })?;
    Ok(answer)
}

/// Single key press; Enter means yes.
fn read_yes_no() -> io::Result<bool> {
    enable_raw_mode()?;
    let answer = loop {
        match event::read() {
            Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => match key.code {
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    break Ok(false);
                }
                KeyCode::Enter | KeyCode::Char('y') | KeyCode::Char('Y') => break Ok(true),
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => break Ok(false),
                _ => {}
            },
            Ok(_) => {}
            Err(err) => break Err(err),
        }
    };
    disable_raw_mode()?;
    answer
}

/// Stand-in for commands that never reach Kaggle.
struct Offline;

impl KaggleClient for Offline {
    fn list(&self, _page: u32, _filter: &DatasetFilter) -> Result<Vec<DatasetInfo>, HaggleError> {
        Err(HaggleError::KaggleHttp("Kaggle client not configured".to_string()))
    }

    fn download(
        &self,
        _reference: &DatasetRef,
        _destination_dir: &Path,
    ) -> Result<PathBuf, HaggleError> {
        Err(HaggleError::KaggleHttp("Kaggle client not configured".to_string()))
    }

    fn metadata(&self, _reference: &DatasetRef) -> Result<DatasetInfo, HaggleError> {
        Err(HaggleError::KaggleHttp("Kaggle client not configured".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    struct FailingFlush(Vec<u8>);

    impl Write for FailingFlush {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "stderr closed"))
        }
    }

    #[test]
    fn piped_stdin_auto_confirms() {
        let path = Utf8Path::new("/tmp/haggle-root");
        assert!(confirm_for(OutputMode::Interactive, false).confirm_create(path));
        assert!(confirm_for(OutputMode::NonInteractive, false).confirm_create(path));
        assert!(confirm_for(OutputMode::NonInteractive, true).confirm_create(path));
    }

    #[test]
    fn prompt_echoes_the_answer() {
        let mut out = Vec::new();
        let answer = ask_create(Utf8Path::new("/tmp/root"), &mut out, || Ok(false)).unwrap();
        assert!(!answer);
        let shown = String::from_utf8(out).unwrap();
        assert!(shown.starts_with("The directory /tmp/root doesn't exist."), "{shown}");
        assert!(shown.ends_with("([Y]/n) n\n"), "{shown}");
    }

    #[test]
    fn prompt_errors_are_returned() {
        let mut out = FailingFlush(Vec::new());
        let result = ask_create(Utf8Path::new("/tmp/root"), &mut out, || {
            panic!("no key is read once the prompt cannot be shown")
        });
        assert_matches!(result, Err(err) if err.kind() == io::ErrorKind::BrokenPipe);

        let result = ask_create(Utf8Path::new("/tmp/root"), &mut Vec::new(), || {
            Err(io::Error::other("raw mode unavailable"))
        });
        assert!(result.is_err());
    }
}
