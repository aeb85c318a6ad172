//! `gridbot-cli` – gridbot operator console
//!
//! This binary drives a simulated line-following robot from the terminal.
//! It:
//!
//! 1. Checks for `~/.gridbot/config.toml`; runs a **First-Run Wizard** when
//!    the file is absent.
//! 2. Builds the simulated road grid and the navigator, optionally seeded
//!    with a map saved in an earlier session.
//! 3. Starts the control thread and a status printer that also writes saved
//!    maps to SQLite.
//! 4. Drops the operator into an **interactive REPL** (`help` lists the
//!    commands).
//! 5. Intercepts **Ctrl-C** to cancel the control thread and stop the robot.

mod config;
mod repl;
mod status;

use colored::Colorize;
use std::fs;
use std::thread;
use tracing::{error, info, warn};

use gridbot_hal::{SimRobot, SimWorld};
use gridbot_kernel::CancellationToken;
use gridbot_memory::MapStore;
use gridbot_middleware::bus::DEFAULT_CAPACITY;
use gridbot_middleware::control_link;
use gridbot_runtime::{ControlLoop, ExitReason, Navigator, init_tracing};
use gridbot_types::NavError;

fn main() {
    // Spans are flushed when the guard drops at the end of main.
    let _tracing = init_tracing("gridbot-cli");

    print_banner();

    // ── Configuration ─────────────────────────────────────────────────────
    let cfg = match config::load() {
        Ok(None) => run_first_run_wizard(),
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            config::Config::default()
        }
    };
    let database = cfg.database_path(&config::home_dir());
    if let Some(parent) = database.parent()
        && let Err(e) = fs::create_dir_all(parent)
    {
        warn!(error = %e, path = %parent.display(), "could not create map directory");
    }

    // ── Robot ─────────────────────────────────────────────────────────────
    let world = SimWorld::grid(cfg.world.width, cfg.world.height);
    println!(
        "  Simulated world: {}x{} grid, {} intersections, {} roads",
        cfg.world.width,
        cfg.world.height,
        world.intersection_count(),
        world.road_count()
    );
    let mut navigator = Navigator::new(SimRobot::new(world), cfg.navigator.clone());
    if let Some(name) = &cfg.storage.restore {
        match MapStore::open(&database).and_then(|store| store.load(name)) {
            Ok(graph) => {
                println!(
                    "  Restored map {} ({} intersections)",
                    name.bold(),
                    graph.len()
                );
                navigator = navigator.with_map(graph);
            }
            Err(e) => println!("{} {}: {}", "Could not restore".yellow(), name, e),
        }
    }

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let cancel = CancellationToken::new();
    let cancel_ctrlc = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping the robot …".yellow().bold());
        cancel_ctrlc.cancel();
        println!("{}", "  Press Enter to leave the console.".dimmed());
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; Ctrl-C will not stop the robot");
    }

    // ── Threads ───────────────────────────────────────────────────────────
    let (operator, control) = control_link(DEFAULT_CAPACITY);
    let status_rx = operator.subscribe();

    let control_loop = ControlLoop::new(navigator, control, cancel.clone());
    let control_thread = thread::Builder::new()
        .name("gridbot-control".into())
        .spawn(move || {
            let (nav, reason) = control_loop.run()?;
            let mapped = nav.graph().map(|g| (g.len(), g.edge_count()));
            Ok::<_, NavError>((mapped, reason))
        });
    let control_thread = match control_thread {
        Ok(handle) => handle,
        Err(e) => {
            error!(error = %e, "could not start the control thread");
            println!("{}: {}", "Startup failed".red(), e);
            return;
        }
    };

    let status_db = database.clone();
    let status_thread = thread::Builder::new()
        .name("gridbot-status".into())
        .spawn(move || status::run(status_rx, status_db));
    if let Err(e) = &status_thread {
        warn!(error = %e, "status printer not started");
    }

    println!();
    println!("  Type {} for a list of commands.\n", "help".bold().cyan());

    // ── Interactive REPL ──────────────────────────────────────────────────
    repl::run(operator, cancel, &database);

    match control_thread.join() {
        Ok(Ok((mapped, reason))) => {
            if let Some((intersections, roads)) = mapped {
                println!(
                    "  Session ended ({}) with {} intersections and {} roads mapped.",
                    describe(&reason),
                    intersections,
                    roads
                );
            }
            info!(?reason, "session ended");
        }
        Ok(Err(NavError::Cancelled)) => println!("{}", "  ✓ Robot stopped.".green()),
        Ok(Err(e)) => println!("{}: {}", "Robot stopped on error".red(), e),
        Err(_) => error!("control thread panicked"),
    }
    if let Ok(handle) = status_thread {
        handle.join().ok();
    }
}

fn describe(reason: &ExitReason) -> &'static str {
    match reason {
        ExitReason::Quit => "operator quit",
        ExitReason::OperatorGone => "console closed",
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// First-Run Wizard
// ─────────────────────────────────────────────────────────────────────────────

fn run_first_run_wizard() -> config::Config {
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().cyan());
    println!("{}", "  ║       gridbot First-Run Wizard       ║".bold().cyan());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().cyan());
    println!();
    println!("  No configuration found.  Let's set up gridbot.\n");

    let mut cfg = config::Config::default();

    // World size
    let width = prompt_line(
        &format!("  Simulated grid width [{}]: ", cfg.world.width),
        &cfg.world.width.to_string(),
    );
    if let Ok(w) = width.trim().parse::<i32>()
        && w > 0
    {
        cfg.world.width = w;
    }
    let height = prompt_line(
        &format!("  Simulated grid height [{}]: ", cfg.world.height),
        &cfg.world.height.to_string(),
    );
    if let Ok(h) = height.trim().parse::<i32>()
        && h > 0
    {
        cfg.world.height = h;
    }

    // Repair policy
    println!("  When the map and the sensors disagree:");
    println!("    1) Stop with an error  (default)");
    println!("    2) Ask me what happened");
    let choice = prompt_line("  Enter choice [1]: ", "1");
    if choice.trim() == "2" {
        cfg.navigator.repair_policy = gridbot_kernel::RepairPolicy::AskOperator;
    }

    let db = prompt_line(
        &format!("  Map database [{}]: ", cfg.storage.database),
        &cfg.storage.database,
    );
    cfg.storage.database = db;

    if let Err(e) = config::validate(&cfg) {
        println!("{}: {} – using defaults", "Invalid settings".red(), e);
        cfg = config::Config::default();
    }

    match config::save(&cfg) {
        Ok(()) => println!(
            "\n  {} Config saved to {}\n",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
    cfg
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   ____      _     _ _           _   "#.bold().cyan());
    println!("{}", r#"  / ___|_ __(_) __| | |__   ___ | |_ "#.bold().cyan());
    println!("{}", r#" | |  _| '__| |/ _` | '_ \ / _ \| __|"#.bold().cyan());
    println!("{}", r#" | |_| | |  | | (_| | |_) | (_) | |_ "#.bold().cyan());
    println!("{}", r#"  \____|_|  |_|\__,_|_.__/ \___/ \__|"#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "gridbot".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Line-following grid explorer");
    println!();
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn prompt_line(msg: &str, default: &str) -> String {
    use std::io::{BufRead, Write};
    print!("{}", msg);
    std::io::stdout().flush().ok();
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(_) => {
            let t = line.trim().to_string();
            if t.is_empty() { default.to_string() } else { t }
        }
        Err(_) => default.to_string(),
    }
}
