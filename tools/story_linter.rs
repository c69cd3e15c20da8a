/// Story Linter — structural checks for an authored story.
///
/// Usage: story_linter <story.ron|story.json> [--config <file>] [--json]
///
/// Exits with status 1 when the story has errors.
use std::path::Path;
use std::process;

use storyloom::config::StoryloomConfig;
use storyloom::core::validator::StoryValidator;
use storyloom::schema::story::Story;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        println!("Usage: story_linter <story.ron|story.json> [--config <file>] [--json]");
        process::exit(0);
    }

    let story_path = &args[1];
    let mut config_path = None;
    let mut as_json = false;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--config" if i + 1 < args.len() => {
                i += 1;
                config_path = Some(args[i].clone());
            }
            "--json" => as_json = true,
            other => {
                eprintln!("Unknown argument: {}", other);
                process::exit(1);
            }
        }
        i += 1;
    }

    let config = match config_path {
        Some(path) => match StoryloomConfig::load_from_ron(Path::new(&path)) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("ERROR: Failed to load config: {}", e);
                process::exit(1);
            }
        },
        None => StoryloomConfig::default(),
    };

    let story = match Story::load(Path::new(story_path)) {
        Ok(story) => story,
        Err(e) => {
            eprintln!("ERROR: Failed to load story: {}", e);
            process::exit(1);
        }
    };

    let report = StoryValidator::new(&story.nodes, &story.edges)
        .with_config(config.validator)
        .validate();

    if as_json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("ERROR: Failed to encode report: {}", e);
                process::exit(1);
            }
        }
    } else {
        let title = if story.title.is_empty() { story_path.as_str() } else { story.title.as_str() };
        println!(
            "Loaded \"{}\": {} nodes, {} edges",
            title,
            story.nodes.len(),
            story.edges.len()
        );
        println!("\n=== Story Lint Report ===\n");

        if report.errors.is_empty() && report.warnings.is_empty() {
            println!("All checks passed!");
        }
        for warning in report.warning_messages() {
            println!("WARNING: {}", warning);
        }
        for error in report.error_messages() {
            println!("ERROR: {}", error);
        }
        println!(
            "\nSummary: {} errors, {} warnings",
            report.errors.len(),
            report.warnings.len()
        );
    }

    if !report.valid {
        process::exit(1);
    }
}
