/// Play — terminal player for authored stories.
///
/// Usage: play <story.ron|story.json> [--seed <n>] [--config <file>]
///
/// Commands:
///   <number>       — take the numbered choice
///   back           — step back one node
///   jump <id>      — go straight to a node
///   save [path]    — save to the memory slot, or to a JSON file
///   load [path]    — load from the memory slot, or from a JSON file
///   restart        — start over from the start node
///   history        — list the nodes visited so far
///   vars           — show the story variables
///   help           — list commands
///   quit           — exit
use std::io::{self, BufRead, Write};
use std::path::Path;

use storyloom::config::StoryloomConfig;
use storyloom::core::engine::{CurrentNode, EngineError, TraversalEngine};
use storyloom::plugins::{variables, RuntimePlugin};
use storyloom::schema::save::SaveState;
use storyloom::schema::story::Story;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage();
        return;
    }

    let story_path = &args[1];
    let mut seed = None;
    let mut config_path = None;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--seed" if i + 1 < args.len() => {
                i += 1;
                seed = args[i].parse().ok();
            }
            "--config" if i + 1 < args.len() => {
                i += 1;
                config_path = Some(args[i].clone());
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let config = match config_path {
        Some(path) => match StoryloomConfig::load_from_ron(Path::new(&path)) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("ERROR: Failed to load config: {}", e);
                std::process::exit(1);
            }
        },
        None => StoryloomConfig::default(),
    };

    let story = match Story::load(Path::new(story_path)) {
        Ok(story) => story,
        Err(e) => {
            eprintln!("ERROR: Failed to load story: {}", e);
            std::process::exit(1);
        }
    };

    let mut runtime = config.runtime();
    let plugin = match seed {
        Some(seed) => RuntimePlugin::with_seed(seed),
        None => RuntimePlugin::new(),
    };
    if let Err(e) = runtime.register(Box::new(plugin)) {
        eprintln!("ERROR: {}", e);
        std::process::exit(1);
    }

    let mut engine = TraversalEngine::new(story, runtime);
    let mut node = match engine.start(None) {
        Ok(node) => node,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    };
    let mut slot: Option<SaveState> = None;

    if !engine.story().title.is_empty() {
        println!("=== {} ===", engine.story().title);
    }
    println!("Type 'help' for commands.\n");
    show(&node);

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("play> ");
        stdout.flush().ok();

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).is_err() || line.is_empty() {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        let cmd = parts[0].to_lowercase();

        let moved: Result<Option<CurrentNode>, EngineError> = match cmd.as_str() {
            "quit" | "exit" | "q" => {
                println!("Goodbye.");
                break;
            }
            "help" | "h" | "?" => {
                print_help();
                Ok(None)
            }
            "back" | "b" => match engine.go_back() {
                Ok(None) => {
                    println!("Already at the beginning.");
                    Ok(None)
                }
                other => other,
            },
            "jump" => match parts.get(1) {
                Some(id) => engine.jump_to_node(id).map(Some),
                None => {
                    println!("Usage: jump <node id>");
                    Ok(None)
                }
            },
            "restart" => engine.start(None).map(Some),
            "history" => {
                for (n, entry) in engine.history_entries().iter().enumerate() {
                    println!("  {:>3}. [{}] {}", n + 1, entry.id, entry.text);
                }
                Ok(None)
            }
            "vars" => {
                let vars = variables(engine.runtime().context());
                match serde_json::to_string_pretty(&vars) {
                    Ok(json) => println!("{}", json),
                    Err(e) => println!("ERROR: {}", e),
                }
                Ok(None)
            }
            "save" => {
                match engine.save() {
                    Ok(state) => match parts.get(1) {
                        Some(path) => write_save(path, &state),
                        None => {
                            slot = Some(state);
                            println!("Saved.");
                        }
                    },
                    Err(e) => println!("ERROR: {}", e),
                }
                Ok(None)
            }
            "load" => {
                let state = match parts.get(1) {
                    Some(path) => read_save(path),
                    None => slot.clone(),
                };
                match state {
                    Some(state) => engine.load(state).map(Some),
                    None => {
                        println!("Nothing to load.");
                        Ok(None)
                    }
                }
            }
            number => match number.parse::<usize>() {
                Ok(n) if n >= 1 && n <= node.choices.len() => {
                    let choice_id = node.choices[n - 1].id.clone();
                    engine.make_choice(&choice_id).map(Some)
                }
                Ok(_) => {
                    println!("No choice with that number.");
                    Ok(None)
                }
                Err(_) => {
                    println!("Unknown command: {}. Type 'help' for commands.", number);
                    Ok(None)
                }
            },
        };

        for event in engine.runtime_mut().drain_events() {
            tracing::debug!(event = %event.name, data = %event.data, "plugin event");
        }

        match moved {
            Ok(Some(next)) => {
                node = next;
                show(&node);
            }
            Ok(None) => {}
            Err(e) => println!("ERROR: {}", e),
        }
    }
}

fn show(node: &CurrentNode) {
    println!("\n{}\n", node.text);
    if node.is_ending() {
        println!("--- The End ---  (restart, back or quit)\n");
        return;
    }
    for (n, choice) in node.choices.iter().enumerate() {
        println!("  {}. {}", n + 1, choice.text);
    }
    println!();
}

fn write_save(path: &str, state: &SaveState) {
    match state.to_json() {
        Ok(json) => match std::fs::write(path, json) {
            Ok(()) => println!("Saved to {}.", path),
            Err(e) => println!("ERROR: Failed to write {}: {}", path, e),
        },
        Err(e) => println!("ERROR: {}", e),
    }
}

fn read_save(path: &str) -> Option<SaveState> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            println!("ERROR: Failed to read {}: {}", path, e);
            return None;
        }
    };
    match SaveState::from_json(&contents) {
        Ok(state) => Some(state),
        Err(e) => {
            println!("ERROR: Failed to parse {}: {}", path, e);
            None
        }
    }
}

fn print_usage() {
    println!("Usage: play <story.ron|story.json> [--seed <n>] [--config <file>]");
}

fn print_help() {
    println!("Commands:");
    println!("  <number>       take the numbered choice");
    println!("  back           step back one node");
    println!("  jump <id>      go straight to a node");
    println!("  save [path]    save to the memory slot, or to a JSON file");
    println!("  load [path]    load from the memory slot, or from a JSON file");
    println!("  restart        start over from the start node");
    println!("  history        list the nodes visited so far");
    println!("  vars           show the story variables");
    println!("  help           list commands");
    println!("  quit           exit");
}
