use anyhow::Result;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{info, Level};

use markov_hal::{Config, Direction, Model};

const FORGET_REFUSAL: &str = "There is no way that I am going to forget about that, sorry.";

fn parse_value_arg(args: &[String], flag: &str) -> Option<String> {
    let prefix = format!("{flag}=");
    let mut i = 0;
    while i < args.len() {
        let arg = &args[i];
        if arg == flag {
            if let Some(value) = args.get(i + 1) {
                return Some(value.clone());
            }
        } else if let Some(rest) = arg.strip_prefix(&prefix) {
            return Some(rest.to_string());
        }
        i += 1;
    }
    None
}

fn parse_number_arg<T: std::str::FromStr>(args: &[String], flag: &str) -> Result<Option<T>> {
    match parse_value_arg(args, flag) {
        Some(raw) => match raw.parse() {
            Ok(value) => Ok(Some(value)),
            Err(_) => anyhow::bail!("{} expects a number, got {:?}", flag, raw),
        },
        None => Ok(None),
    }
}

/// Defaults, then `--config <file>`, then `HAL_*` variables, then flags.
fn load_config(args: &[String]) -> Result<Config> {
    let base = match parse_value_arg(args, "--config") {
        Some(path) => Config::from_file(Path::new(&path))?,
        None => Config::default(),
    };
    let mut config = base.from_env();

    if let Some(name) = parse_value_arg(args, "--name") {
        config.name = name;
    }
    if let Some(dir) = parse_value_arg(args, "--resources") {
        config.resources_dir = PathBuf::from(dir);
    }
    if let Some(dir) = parse_value_arg(args, "--cache") {
        config.cache_dir = PathBuf::from(dir);
    }
    if let Some(order) = parse_number_arg(args, "--order")? {
        config.order = Some(order);
    }
    if let Some(ms) = parse_number_arg(args, "--timeout")? {
        config.timeout_ms = ms;
    }
    if let Some(words) = parse_number_arg(args, "--max-words")? {
        config.max_reply_words = words;
    }
    if let Some(nodes) = parse_number_arg(args, "--max-nodes")? {
        config.max_nodes = nodes;
    }
    if args.iter().any(|arg| arg == "--favor-rare") {
        config.favor_rare = true;
    }
    if args.iter().any(|arg| arg == "--no-learn") {
        config.learning = false;
    }
    Ok(config)
}

/// Words after the command, minus flags and their values.
fn positional(args: &[String]) -> Vec<String> {
    const VALUED: &[&str] = &[
        "--config",
        "--name",
        "--resources",
        "--cache",
        "--order",
        "--timeout",
        "--max-words",
        "--max-nodes",
    ];
    let mut out = Vec::new();
    let mut i = 2;
    while i < args.len() {
        let arg = &args[i];
        if VALUED.contains(&arg.as_str()) {
            i += 2;
            continue;
        }
        if !arg.starts_with("--") {
            out.push(arg.clone());
        }
        i += 1;
    }
    out
}

fn print_stats(model: &Model) {
    let stats = model.stats();
    println!("[◐] Order {} | {} words | {} phrases", stats.order, stats.words, stats.phrases);
    println!(
        "[◐] Nodes: {} forward + {} backward | {} sentence starts",
        stats.forward_nodes, stats.backward_nodes, stats.branches
    );
    println!("[◐] Using roughly {} bytes", stats.memory_estimate);
}

fn print_help() {
    println!("Commands:");
    println!("  /forget <sentence>    forget the closest learned sentence");
    println!("  /forgetword <word>    forget every sentence mentioning a word");
    println!("  /trim [nodes]         drop the oldest sentences down to a node budget");
    println!("  /order <1-5>          relearn everything at another context depth");
    println!("  /learnfile <path>     train on a corpus file (.gz allowed)");
    println!("  /learning on|off      learn from what you type");
    println!("  /treesize [forward|backward] [branch]");
    println!("  /viewbranch [branch] [forward|backward]");
    println!("  /stats  /save  /help  /exit");
}

/// Run one slash command. Returns `false` when the session should end.
fn handle_command(model: &mut Model, config: &mut Config, line: &str) -> Result<bool> {
    let (command, rest) = match line.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (line, ""),
    };
    match command {
        "/exit" | "/quit" => return Ok(false),
        "/help" => print_help(),
        "/forget" => match model.forget(rest) {
            Some(confirmation) => println!("{}", confirmation),
            None => println!("{}", FORGET_REFUSAL),
        },
        "/forgetword" => {
            if rest.is_empty() {
                println!("Forget which word?");
            } else {
                match model.forget_word(rest) {
                    0 => println!("I am not familiar with that word."),
                    n => println!(
                        "{} has been mentioned to me {} times in the past. But it's all forgotten now.",
                        markov_hal::word::capitalize(rest),
                        n
                    ),
                }
            }
        }
        "/trim" => {
            let budget = if rest.is_empty() { config.max_nodes } else { rest.parse()? };
            let deleted = model.trim(budget);
            println!("[✓] Trimmed {} sentences", deleted);
        }
        "/order" => {
            let order: usize = rest.parse()?;
            let kept = model.set_order(order)?;
            config.order = Some(order);
            println!("[✓] Order {} | relearned {} sentences", order, kept);
        }
        "/learnfile" => {
            let learned = model.train_file(Path::new(rest))?;
            println!("[✓] Learned {} sentences from {}", learned, rest);
        }
        "/learning" => {
            match rest {
                "on" => config.learning = true,
                "off" => config.learning = false,
                _ => {}
            }
            println!("[◐] Learning is {}", if config.learning { "on" } else { "off" });
        }
        "/save" => {
            model.save_personality(config)?;
            println!("[✓] Saved {}", config.brain_path().display());
        }
        "/stats" => print_stats(model),
        "/viewbranch" => {
            let mut direction = Direction::Forward;
            let mut branch = None;
            for part in rest.split_whitespace() {
                match part {
                    "forward" | "f" => direction = Direction::Forward,
                    "backward" | "b" => direction = Direction::Backward,
                    n => branch = Some(n.parse::<usize>()?),
                }
            }
            match model.view_branch(direction, branch) {
                Some(listing) => print!("{}", listing),
                None => println!("Branch is too big"),
            }
        }
        "/treesize" => {
            let mut direction = Direction::Forward;
            let mut branch = None;
            for part in rest.split_whitespace() {
                match part {
                    "forward" | "f" => direction = Direction::Forward,
                    "backward" | "b" => direction = Direction::Backward,
                    n => branch = Some(n.parse::<usize>()?),
                }
            }
            let size = model.tree_size(direction, branch);
            println!(
                "[◐] {:?}: {} branches, {} nodes, count {}, usage {}",
                direction, size.children, size.nodes, size.count, size.usage
            );
        }
        _ => println!("Unknown command: {} (try /help)", command),
    }
    Ok(true)
}

fn talk(model: &mut Model, config: &mut Config) -> Result<()> {
    println!("Talk mode. Type /help for commands, /exit to quit.");
    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if io::stdin().read_line(&mut line)? == 0 {
            break;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.starts_with('/') {
            match handle_command(model, config, trimmed) {
                Ok(true) => continue,
                Ok(false) => break,
                Err(err) => {
                    println!("[!] {}", err);
                    continue;
                }
            }
        }
        println!("{}", model.converse(trimmed, config.learning));
    }
    model.save_personality(config)?;
    println!("[✓] Saved {}", config.brain_path().display());
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_writer(io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <talk|reply|train|forget|stats> [options]", args[0]);
        eprintln!("Talk: {} talk [--no-learn]", args[0]);
        eprintln!("Reply once: {} reply <text>", args[0]);
        eprintln!("Train: {} train <corpus> [more corpora...]", args[0]);
        eprintln!("Forget: {} forget <sentence>", args[0]);
        eprintln!("Stats: {} stats", args[0]);
        eprintln!("--config <file.json>: load settings from JSON (HAL_* variables override it)");
        eprintln!("--name <name>: personality name (default hal)");
        eprintln!("--resources <dir>: corpus and word tables (default data/)");
        eprintln!("--cache <dir>: brain files (default brains/)");
        eprintln!("--order <1-5> --timeout <ms> --max-words <n> --max-nodes <n>");
        eprintln!("--favor-rare: score rare continuations higher");
        eprintln!("--no-learn: do not learn from input");
        std::process::exit(1);
    }

    let command = args[1].as_str();
    let mut config = load_config(&args)?;
    let words = positional(&args);
    let mut model = Model::load_personality(&config)?;
    info!("personality {} ready", config.name);

    match command {
        "talk" | "chat" => talk(&mut model, &mut config)?,
        "reply" | "r" => {
            if words.is_empty() {
                anyhow::bail!("Usage: {} reply <text>", args[0]);
            }
            let text = words.join(" ");
            println!("{}", model.converse(&text, config.learning));
            if config.learning {
                model.save_personality(&config)?;
            }
        }
        "train" | "t" => {
            if words.is_empty() {
                anyhow::bail!("Usage: {} train <corpus>", args[0]);
            }
            for file in &words {
                let path = Path::new(file);
                if !path.exists() {
                    anyhow::bail!("File not found: {}", path.display());
                }
                println!("[◐] Training from: {}", path.display());
                let learned = model.train_file(path)?;
                println!("[✓] Learned {} sentences", learned);
            }
            model.save_personality(&config)?;
            println!("[✓] Brain saved: {}", config.brain_path().display());
        }
        "forget" | "f" => {
            let text = words.join(" ");
            match model.forget(&text) {
                Some(confirmation) => {
                    println!("{}", confirmation);
                    model.save_personality(&config)?;
                }
                None => println!("{}", FORGET_REFUSAL),
            }
        }
        "stats" | "s" => print_stats(&model),
        _ => {
            eprintln!("Unknown command: {}", command);
            eprintln!("Available: talk, reply, train, forget, stats");
            std::process::exit(1);
        }
    }

    Ok(())
}
