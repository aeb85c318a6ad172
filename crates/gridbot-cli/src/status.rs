//! Status printer – turns the control thread's status stream into console
//! output and writes saved maps to the database.

use colored::Colorize;
use std::collections::HashSet;
use std::path::PathBuf;

use gridbot_memory::MapStore;
use gridbot_middleware::StatusReceiver;
use gridbot_types::{Location, MapSnapshot, Pose, StatusEvent, StatusPayload};
use tracing::warn;

/// Print every status event until the control side goes away.
pub fn run(mut status: StatusReceiver, database: PathBuf) {
    let store = match MapStore::open(&database) {
        Ok(store) => Some(store),
        Err(e) => {
            warn!(error = %e, path = %database.display(), "map store unavailable, saving disabled");
            None
        }
    };
    let mut last_pose: Option<Pose> = None;

    while let Some(event) = status.blocking_recv() {
        print_event(&event, store.as_ref(), &mut last_pose);
    }
}

fn print_event(event: &StatusEvent, store: Option<&MapStore>, last_pose: &mut Option<Pose>) {
    let time = event.timestamp.format("%H:%M:%S").to_string();
    match &event.payload {
        StatusPayload::Message(text) => println!("  {} {}", time.dimmed(), text),
        StatusPayload::Pose(pose) => {
            // Only intersections are interesting; turns in place are not.
            if last_pose.is_some_and(|p| p.location == pose.location) {
                return;
            }
            *last_pose = Some(*pose);
            println!(
                "  {} {} {} facing {}",
                time.dimmed(),
                "at".dimmed(),
                pose.location.to_string().bold(),
                pose.heading
            );
        }
        StatusPayload::Snapshot(snapshot) => {
            println!(
                "  {} {} intersections, {} roads",
                time.dimmed(),
                snapshot.nodes.len(),
                snapshot.edges.len()
            );
            for line in render(snapshot) {
                println!("    {line}");
            }
        }
        StatusPayload::MapBlob { name, blob, .. } => match store {
            Some(store) => match store.save_blob(name, blob) {
                Ok(saved) => println!(
                    "  {} {} {} ({} intersections, {} roads)",
                    time.dimmed(),
                    "✓ Saved map".green(),
                    saved.name.bold(),
                    saved.intersections,
                    saved.edges
                ),
                Err(e) => println!("  {} {}: {}", time.dimmed(), "Save failed".red(), e),
            },
            None => println!(
                "  {} {}",
                time.dimmed(),
                "Save failed: map store unavailable".red()
            ),
        },
        StatusPayload::Prompt(question) => {
            println!("  {} {}", "?".yellow().bold(), question.yellow());
            println!("    answer with {}", "respond <answer>".bold());
        }
        StatusPayload::Halted { reason } => {
            println!("  {} {} {}", time.dimmed(), "Robot halted:".red().bold(), reason);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Map drawing
// ─────────────────────────────────────────────────────────────────────────────

/// Draw `snapshot` as text, north up.
///
/// `R` robot, `*` on the planned path, `o` explored, `?` still open.
/// Roads are `-`, `|`, `/` and `\`; crossing diagonals show as `X` and
/// blocked roads as `#`.
pub fn render(snapshot: &MapSnapshot) -> Vec<String> {
    let Some((min_x, max_x, min_y, max_y)) = bounds(snapshot) else {
        return vec!["(empty map)".to_string()];
    };
    let width = ((max_x - min_x) * 2 + 1) as usize;
    let height = ((max_y - min_y) * 2 + 1) as usize;
    let mut canvas = vec![vec![' '; width]; height];
    let cell = |loc: Location| -> (usize, usize) {
        (
            ((max_y - loc.y) * 2) as usize,
            ((loc.x - min_x) * 2) as usize,
        )
    };

    for edge in &snapshot.edges {
        let (ra, ca) = cell(edge.a);
        let (rb, cb) = cell(edge.b);
        let (r, c) = ((ra + rb) / 2, (ca + cb) / 2);
        let dx = edge.b.x - edge.a.x;
        let dy = edge.b.y - edge.a.y;
        let mark = if edge.blocked {
            '#'
        } else if dy == 0 {
            '-'
        } else if dx == 0 {
            '|'
        } else if dx * dy > 0 {
            '/'
        } else {
            '\\'
        };
        canvas[r][c] = match (canvas[r][c], mark) {
            ('/', '\\') | ('\\', '/') => 'X',
            (_, m) => m,
        };
    }

    let on_path: HashSet<Location> = snapshot.path.iter().copied().collect();
    let robot = snapshot.robot.map(|p| p.location);
    for node in &snapshot.nodes {
        let (r, c) = cell(node.location);
        canvas[r][c] = if robot == Some(node.location) {
            'R'
        } else if on_path.contains(&node.location) {
            '*'
        } else if node.explored {
            'o'
        } else {
            '?'
        };
    }

    canvas
        .into_iter()
        .map(|row| row.into_iter().collect::<String>().trim_end().to_string())
        .collect()
}

fn bounds(snapshot: &MapSnapshot) -> Option<(i32, i32, i32, i32)> {
    let mut locations = snapshot.nodes.iter().map(|n| n.location);
    let first = locations.next()?;
    Some(locations.fold(
        (first.x, first.x, first.y, first.y),
        |(lx, hx, ly, hy), l| (lx.min(l.x), hx.max(l.x), ly.min(l.y), hy.max(l.y)),
    ))
}
