use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table};
use mockable::{Clock, DefaultClock};

use crate::clock::FixedClock;
use crate::snapshot::Snapshot;
use crate::state::StateName;
use crate::storage::{save_path, SnapshotStore};

/// Resolves `--file`, falling back to the configured save path.
fn resolve(file: Option<PathBuf>) -> PathBuf {
    file.unwrap_or_else(save_path)
}

fn load(file: Option<PathBuf>) -> Result<(PathBuf, SnapshotStore)> {
    let path = resolve(file);
    if !path.exists() {
        bail!("No save file found at {}", path.display());
    }
    let store = SnapshotStore::open(&path)
        .with_context(|| format!("Failed to load save file {}", path.display()))?;
    Ok((path, store))
}

fn state_color(state: StateName) -> Color {
    match state {
        StateName::NotStarted => Color::Grey,
        StateName::InProgress => Color::Blue,
        StateName::Completed => Color::Green,
        StateName::Overdue => Color::Red,
    }
}

fn bold(text: &str) -> Cell {
    Cell::new(text).add_attribute(Attribute::Bold)
}

/// Lists the saved snapshots, oldest first.
pub fn cmd_history(file: Option<PathBuf>) -> Result<()> {
    let (_, store) = load(file)?;
    if store.is_empty() {
        println!("No snapshots saved.");
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            bold("Index"),
            bold("Taken"),
            bold("Description"),
            bold("Subjects"),
            bold("Tasks"),
            bold("Completed"),
        ]);

    for (i, snapshot) in store.iter().enumerate() {
        let completed = snapshot.tasks().iter().filter(|t| t.completed).count();
        table.add_row(vec![
            Cell::new(i),
            Cell::new(snapshot.timestamp().format("%Y-%m-%d %H:%M:%S")),
            Cell::new(snapshot.description()),
            Cell::new(snapshot.subjects().len()),
            Cell::new(snapshot.tasks().len()),
            Cell::new(format!("{}/{}", completed, snapshot.tasks().len())),
        ]);
    }

    println!("{table}");
    Ok(())
}

/// Prints one snapshot as tables, or as JSON.
pub fn cmd_show(file: Option<PathBuf>, index: usize, json: bool) -> Result<()> {
    let (_, store) = load(file)?;
    let Some(snapshot) = store.get(index) else {
        bail!("Snapshot {} not found ({} saved).", index, store.len());
    };

    if json {
        println!("{}", serde_json::to_string_pretty(snapshot)?);
        return Ok(());
    }

    println!(
        "Snapshot {} taken {}: {}",
        index,
        snapshot.timestamp().format("%Y-%m-%d %H:%M:%S"),
        snapshot.description()
    );
    println!("{}", subject_table(snapshot));
    println!("{}", task_table(snapshot));
    Ok(())
}

fn subject_table(snapshot: &Snapshot) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![bold("Code"), bold("Name"), bold("Description"), bold("Tasks")]);
    for subject in snapshot.subjects() {
        table.add_row(vec![
            Cell::new(&subject.code),
            Cell::new(&subject.name),
            Cell::new(&subject.description),
            Cell::new(subject.task_titles.join(", ")),
        ]);
    }
    table
}

/// Tasks of a snapshot, one row each, with the state coloured and described.
pub fn task_table(snapshot: &Snapshot) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            bold("Title"),
            bold("Subject"),
            bold("Deadline"),
            bold("State"),
            bold("Progress"),
            bold("Marks"),
            bold("Status"),
        ]);
    for task in snapshot.tasks() {
        let marks = if task.completed {
            task.marks.to_string()
        } else {
            "-".into()
        };
        table.add_row(vec![
            Cell::new(&task.title),
            Cell::new(task.subject_code.as_deref().unwrap_or("-")),
            Cell::new(task.deadline.format("%Y-%m-%d %H:%M")),
            Cell::new(task.state).fg(state_color(task.state)),
            Cell::new(format!("{:.1}%", task.progress)),
            Cell::new(marks),
            Cell::new(task.state.description()),
        ]);
    }
    table
}

/// Checks that the save file loads cleanly. Returns the snapshot count.
pub fn cmd_verify(file: Option<PathBuf>) -> Result<usize> {
    let (path, store) = load(file)?;
    println!(
        "{}: {} snapshot(s), format OK.",
        path.display(),
        store.len()
    );
    Ok(store.len())
}

/// Restores the latest snapshot, marks late tasks overdue, and appends the
/// result as a new snapshot. Returns how many tasks became overdue.
pub fn cmd_sweep(
    file: Option<PathBuf>,
    now: Option<String>,
    label: Option<String>,
    silent: bool,
) -> Result<usize> {
    match now {
        Some(raw) => {
            let at = DateTime::parse_from_rfc3339(&raw)
                .with_context(|| format!("Invalid --now '{}'. Use RFC 3339.", raw))?
                .with_timezone(&Utc);
            sweep_with(file, &FixedClock::new(at), label, silent)
        }
        None => sweep_with(file, &DefaultClock, label, silent),
    }
}

fn sweep_with(
    file: Option<PathBuf>,
    clock: &impl Clock,
    label: Option<String>,
    silent: bool,
) -> Result<usize> {
    let (path, mut store) = load(file)?;
    let Some(latest) = store.latest() else {
        bail!("No snapshots in {} to sweep.", path.display());
    };

    let mut registry = latest.rebuild();
    let overdue = registry.sweep_deadlines_with(clock);
    if !silent {
        for id in &overdue {
            if let Some(task) = registry.task(*id) {
                println!("Task '{}' is now overdue.", task.title());
            }
        }
    }

    let label = label.unwrap_or_else(|| "Deadline sweep".into());
    store.push(Snapshot::capture(&registry, label, clock));
    store
        .save_to(&path)
        .with_context(|| format!("Failed to save {}", path.display()))?;
    if !silent {
        println!(
            "Sweep finished: {} task(s) overdue, {} snapshot(s) saved.",
            overdue.len(),
            store.len()
        );
    }
    Ok(overdue.len())
}
