use std::io::{self, BufRead, Write};
use std::time::Instant;

use anyhow::Result;
use clap::Parser;

use revgrep::engine::DEFAULT_MAX_HITS;
use revgrep::{Engine, GixBlobSource, Pattern, RegexPattern};

/// Interactive regex search over every text blob reachable from a set of
/// git revisions.
#[derive(Parser, Debug)]
#[clap(name = "revgrep")]
struct Args {
    /// Revision identifiers (full object hashes or symbolic refs) to ingest.
    revisions: Vec<String>,

    /// Path to the repository to open.
    #[clap(long, default_value = ".")]
    repo: String,

    /// Maximum number of distinct matching lines reported per query.
    #[clap(long, default_value_t = DEFAULT_MAX_HITS)]
    max_hits: usize,

    /// Increase log verbosity; may be repeated.
    #[clap(short, long, parse(from_occurrences))]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let source = GixBlobSource::open(&args.repo)?;
    let mut engine = Engine::new()?;

    for revision in &args.revisions {
        print!("Walking {}... ", revision);
        io::stdout().flush()?;
        let started = Instant::now();
        engine.ingest_revision(&source, revision)?;
        let elapsed = started.elapsed();
        println!("done in {}.{:06}s", elapsed.as_secs(), elapsed.subsec_micros());
    }

    let stats = engine.stats();
    println!("Bytes: {} (dedup: {})", stats.bytes, stats.dedup_bytes);
    println!("Lines: {} (dedup: {})", stats.lines, stats.dedup_lines);

    repl(&engine, args.max_hits)
}

fn repl(engine: &Engine, max_hits: usize) -> Result<()> {
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("regex> ");
        io::stdout().flush()?;

        let line = match lines.next() {
            Some(line) => line?,
            None => return Ok(()),
        };

        let pattern = match RegexPattern::compile(&line) {
            Ok(pattern) => pattern,
            Err(err) => {
                log::warn!("failed to compile pattern {:?}: {}", line, err);
                continue;
            }
        };

        run_query(engine, &pattern, max_hits);
    }
}

fn run_query(engine: &Engine, pattern: &dyn Pattern, max_hits: usize) {
    let started = Instant::now();

    let matched = engine.scan(pattern, max_hits, |text, attributions| {
        println!("{}", String::from_utf8_lossy(text));
        for (revision_label, path) in attributions {
            println!(" ({}:{})", revision_label, path);
        }
    });

    if !matched {
        println!("no match");
    }

    let elapsed = started.elapsed();
    println!(
        "Match completed in {}.{:06}s.",
        elapsed.as_secs(),
        elapsed.subsec_micros()
    );
}
