/// Story Layout — reposition a story's nodes and write the result.
///
/// Usage: story_layout <story.ron|story.json> [--mode hierarchical|radial]
///                     [--config <file>] [--out <file>]
///
/// The output format follows the `--out` extension (`.ron` or `.json`);
/// without `--out` the story is printed as JSON.
use std::path::Path;
use std::process;

use storyloom::config::StoryloomConfig;
use storyloom::core::layout::{layout_story, LayoutMode};
use storyloom::schema::story::Story;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage();
        return;
    }

    let story_path = &args[1];
    let mut mode = LayoutMode::default();
    let mut config_path = None;
    let mut out_path = None;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--mode" if i + 1 < args.len() => {
                i += 1;
                mode = match args[i].parse() {
                    Ok(mode) => mode,
                    Err(e) => {
                        eprintln!("ERROR: {}", e);
                        process::exit(1);
                    }
                };
            }
            "--config" if i + 1 < args.len() => {
                i += 1;
                config_path = Some(args[i].clone());
            }
            "--out" if i + 1 < args.len() => {
                i += 1;
                out_path = Some(args[i].clone());
            }
            other => {
                eprintln!("Unknown argument: {}", other);
                print_usage();
                process::exit(1);
            }
        }
        i += 1;
    }

    let config = match config_path {
        Some(path) => StoryloomConfig::load_from_ron(Path::new(&path)).unwrap_or_else(|e| {
            eprintln!("ERROR: Failed to load config: {}", e);
            process::exit(1);
        }),
        None => StoryloomConfig::default(),
    };

    let mut story = Story::load(Path::new(story_path)).unwrap_or_else(|e| {
        eprintln!("ERROR: Failed to load story: {}", e);
        process::exit(1);
    });

    story.nodes = layout_story(&story, mode, &config.hierarchical, &config.radial);
    eprintln!("Laid out {} nodes ({})", story.nodes.len(), mode);

    let encoded = match out_path.as_deref().map(Path::new) {
        Some(path) if path.extension().and_then(|e| e.to_str()) == Some("ron") => {
            ron::ser::to_string_pretty(&story, ron::ser::PrettyConfig::default()).map_err(|e| e.to_string())
        }
        _ => serde_json::to_string_pretty(&story).map_err(|e| e.to_string()),
    };
    let encoded = encoded.unwrap_or_else(|e| {
        eprintln!("ERROR: Failed to encode story: {}", e);
        process::exit(1);
    });

    match out_path {
        Some(path) => {
            if let Err(e) = std::fs::write(&path, encoded) {
                eprintln!("ERROR: Failed to write {}: {}", path, e);
                process::exit(1);
            }
            println!("Wrote {}", path);
        }
        None => println!("{}", encoded),
    }
}

fn print_usage() {
    println!("Usage: story_layout <story.ron|story.json> [--mode hierarchical|radial] [--config <file>] [--out <file>]");
}
