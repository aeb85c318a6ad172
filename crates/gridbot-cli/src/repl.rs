//! REPL – Read-Eval-Print Loop for the gridbot operator console.
//!
//! Robot commands are parsed into [`OperatorCommand`]s and sent to the
//! control thread:
//!   explore | goal x,y | manual | left | right | drive
//!   pause | resume | step | show | save <name> | clear-blockages
//!   respond <answer> | quit | exit
//!
//! A few commands are handled locally:
//!   help          – show this list
//!   maps          – list maps saved in the database
//!   delete <name> – remove a saved map

use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::path::Path;

use gridbot_kernel::CancellationToken;
use gridbot_memory::MapStore;
use gridbot_middleware::OperatorLink;
use gridbot_types::OperatorCommand;
use tracing::warn;

/// What one input line asks for.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Nothing,
    Help,
    ListMaps,
    DeleteMap(String),
    Send(OperatorCommand),
}

/// Classify one input line. Errors are shown to the operator as-is.
pub fn parse_line(line: &str) -> Result<Action, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Action::Nothing);
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((w, r)) => (w, r.trim()),
        None => (line, ""),
    };
    match word.to_ascii_lowercase().as_str() {
        "help" | "?" => Ok(Action::Help),
        "maps" => Ok(Action::ListMaps),
        "delete" if !rest.is_empty() => Ok(Action::DeleteMap(rest.to_string())),
        "delete" => Err("delete needs a map name".to_string()),
        _ => line
            .parse::<OperatorCommand>()
            .map(Action::Send)
            .map_err(|e| e.to_string()),
    }
}

/// Entry point for the interactive REPL.
///
/// `cancel` is polled each iteration; when set the REPL exits. Consumes the
/// operator link so the control thread sees the operator leave.
pub fn run(link: OperatorLink, cancel: CancellationToken, database: &Path) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        if cancel.is_cancelled() {
            break;
        }

        print!("{} ", "gridbot>".bold().cyan());
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => {
                // EOF
                link.send(OperatorCommand::Quit).ok();
                break;
            }
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        }
        if cancel.is_cancelled() {
            break;
        }

        match parse_line(&line) {
            Ok(Action::Nothing) => {}
            Ok(Action::Help) => cmd_help(),
            Ok(Action::ListMaps) => cmd_maps(database),
            Ok(Action::DeleteMap(name)) => cmd_delete(database, &name),
            Ok(Action::Send(command)) => {
                let quitting = command == OperatorCommand::Quit;
                if let Err(e) = link.send(command) {
                    println!("{}: {}", "Robot offline".red(), e);
                    break;
                }
                if quitting {
                    println!("{}", "Goodbye.".green());
                    break;
                }
            }
            Err(e) => {
                println!(
                    "{} {}. Type {} for available commands.",
                    "Error:".red(),
                    e.yellow(),
                    "help".bold()
                );
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_help() {
    println!();
    println!("{}", "Driving".bold().underline());
    println!("  {}          – map every reachable road", "explore".bold().cyan());
    println!("  {}         – drive to an intersection", "goal x,y".bold().cyan());
    println!("  {}           – stop and take the wheel", "manual".bold().cyan());
    println!("  {}     – turn once (manual mode)", "left  right".bold().cyan());
    println!("  {}            – follow the line ahead (manual mode)", "drive".bold().cyan());
    println!("  {} – hold, continue, or advance one tick", "pause resume step".bold().cyan());
    println!("  {}  – forget every blockage", "clear-blockages".bold().cyan());
    println!("  {} – answer a repair question", "respond <answer>".bold().cyan());
    println!();
    println!("{}", "Maps".bold().underline());
    println!("  {}             – draw the current map", "show".bold().cyan());
    println!("  {}      – save the current map", "save <name>".bold().cyan());
    println!("  {}             – list saved maps", "maps".bold().cyan());
    println!("  {}    – remove a saved map", "delete <name>".bold().cyan());
    println!();
    println!("  {}      – stop the robot and exit", "quit  exit".bold().cyan());
    println!();
}

fn cmd_maps(database: &Path) {
    let store = match MapStore::open(database) {
        Ok(store) => store,
        Err(e) => {
            println!("{}: {}", "Map store unavailable".red(), e);
            return;
        }
    };
    match store.list() {
        Ok(maps) if maps.is_empty() => println!("  {}", "No saved maps.".dimmed()),
        Ok(maps) => {
            println!("{}", "Saved maps".bold().underline());
            for m in &maps {
                println!(
                    "  {}  {} intersections, {} roads  {}",
                    m.name.bold(),
                    m.intersections,
                    m.edges,
                    m.saved_at.format("%Y-%m-%d %H:%M").to_string().dimmed()
                );
            }
        }
        Err(e) => {
            warn!(error = %e, "listing saved maps failed");
            println!("{}: {}", "Error".red(), e);
        }
    }
}

fn cmd_delete(database: &Path, name: &str) {
    let result = MapStore::open(database).and_then(|store| store.delete(name));
    match result {
        Ok(true) => println!("{} {}", "✓ Deleted".green(), name.bold()),
        Ok(false) => println!("{} '{}'", "No saved map named".yellow(), name),
        Err(e) => println!("{}: {}", "Error".red(), e),
    }
}
