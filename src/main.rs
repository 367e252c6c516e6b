//! booksync - Turn a book into a sentence-level reading unit

use std::process::ExitCode;

use clap::Parser;
use log::debug;

use lib_booksync::{Book, IngestConfig, Ingestor, SegmenterConfig};

#[derive(Parser)]
#[command(name = "booksync")]
#[command(version, about = "Turn a book into a sentence-level reading unit", long_about = None)]
#[command(after_help = "EXAMPLES:
    booksync book.epub                       Print the reading unit of an EPUB as JSON
    booksync notes.txt --title Notes         Read plain text with an explicit title
    booksync book.epub --pretty > book.json  Write indented JSON to a file

Set RUST_LOG=debug to see what each stage of the pipeline did.")]
struct Cli {
    /// Input file (EPUB or plain text)
    #[arg(value_name = "INPUT")]
    input: String,

    /// Use this title instead of the one found in the book
    #[arg(short, long)]
    title: Option<String>,

    /// Use this author instead of the one found in the book
    #[arg(short, long)]
    author: Option<String>,

    /// Length of one sentence on the synthetic timeline, in seconds
    #[arg(short, long, value_name = "SECONDS", default_value_t = lib_booksync::config::DEFAULT_SENTENCE_DURATION)]
    sentence_duration: f64,

    /// Indent the JSON output
    #[arg(short, long)]
    pretty: bool,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), String> {
    if !(cli.sentence_duration.is_finite() && cli.sentence_duration > 0.0) {
        return Err(format!(
            "sentence duration must be a positive number of seconds, got {}",
            cli.sentence_duration
        ));
    }

    let segmenter = SegmenterConfig::default().with_sentence_duration(cli.sentence_duration);
    let ingestor = Ingestor::new(IngestConfig::default().with_segmenter(segmenter));

    let mut draft = ingestor.draft_file(&cli.input).map_err(|e| e.to_string())?;
    if let Some(title) = &cli.title {
        draft.title = title.clone();
    }
    if let Some(author) = &cli.author {
        draft.author = Some(author.clone());
    }
    debug!("Read \"{}\" from {}", draft.title, cli.input);

    let book = ingestor.build(draft).map_err(|e| e.to_string())?;
    print_book(&book, cli.pretty)
}

fn print_book(book: &Book, pretty: bool) -> Result<(), String> {
    let json = if pretty {
        serde_json::to_string_pretty(book)
    } else {
        serde_json::to_string(book)
    }
    .map_err(|e| e.to_string())?;

    println!("{json}");
    Ok(())
}
