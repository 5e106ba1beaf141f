/// CLI argument parsing and command handling.
use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::{Args, Parser, Subcommand};

use crate::config::Overrides;
use crate::error::Error;
use crate::notify::{format_group, split_parts};
use crate::schedule::{DateRange, GroupKey, format_day, parse_day, today};
use crate::service::{CleanupReport, FeedingService, ReplaceResult};
use crate::types::{FeedingTimeEntry, Fish, NewFish};

#[derive(Parser)]
#[command(
    name = "aquafeed",
    version,
    about = "Aquafeed - feeding schedules for fish ponds"
)]
pub struct Cli {
    /// SQLite database file.
    #[arg(long, env = "AQUAFEED_DB", global = true)]
    pub db: Option<PathBuf>,
    /// Number of background write workers.
    #[arg(long, env = "AQUAFEED_WORKERS", global = true)]
    pub workers: Option<usize>,
    /// Log filter, e.g. `debug` or `aquafeed=trace`.
    #[arg(long, env = "AQUAFEED_LOG", global = true)]
    pub log: Option<String>,
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            database_path: self.db.clone(),
            write_workers: self.workers,
            log_filter: self.log.clone(),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Fish {
        #[command(subcommand)]
        command: FishCommand,
    },
    Schedule {
        #[command(subcommand)]
        command: ScheduleCommand,
    },
    /// Tell the feeder to dispense now.
    FeedNow { fish: String, amount: f64 },
    /// Feed due on one day (today by default).
    Daily {
        fish: String,
        #[arg(short = 'd', long = "date")]
        date: Option<String>,
    },
    /// Report what start-up cleanup removed.
    Cleanup,
    /// Delete every fish and schedule.
    Clear {
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum FishCommand {
    Add {
        name: String,
        #[arg(short = 'p', long = "phone")]
        phone: Option<String>,
        #[arg(short = 't', long = "total", default_value_t = 0)]
        total: u32,
        #[arg(long = "dead", default_value_t = 0)]
        dead: u32,
        #[arg(short = 'f', long = "feed-per-fish", default_value_t = 0.0)]
        feed_per_fish: f64,
        #[arg(short = 'n', long = "notes", default_value = "")]
        notes: String,
    },
    List,
    Show {
        name: String,
    },
    Update {
        name: String,
        #[command(flatten)]
        changes: FishChanges,
    },
}

#[derive(Args, Debug, Default)]
pub struct FishChanges {
    #[arg(long)]
    pub total: Option<u32>,
    #[arg(long)]
    pub alive: Option<u32>,
    #[arg(long)]
    pub dead: Option<u32>,
    #[arg(long)]
    pub length: Option<f64>,
    #[arg(long)]
    pub width: Option<f64>,
    #[arg(long)]
    pub weight: Option<f64>,
    #[arg(long = "feed-per-fish")]
    pub feed_per_fish: Option<f64>,
    /// Phone number; pass an empty string to remove it.
    #[arg(long)]
    pub phone: Option<String>,
    #[arg(long)]
    pub notes: Option<String>,
}

/// A schedule picked by name, optionally narrowed to one date range.
#[derive(Args, Debug)]
pub struct GroupSelector {
    pub fish: String,
    pub name: String,
    #[arg(short = 's', long = "start")]
    pub start: Option<String>,
    #[arg(short = 'e', long = "end")]
    pub end: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum ScheduleCommand {
    /// Create a schedule, or replace one with `--edit`.
    Set {
        fish: String,
        name: String,
        #[arg(short = 's', long = "start")]
        start: String,
        #[arg(short = 'e', long = "end")]
        end: String,
        /// Feeding time and grams per fish, e.g. "7:00 AM=30".
        #[arg(long = "feed", required = true, value_parser = parse_feed)]
        feed: Vec<FeedingTimeEntry>,
        #[arg(long)]
        edit: bool,
    },
    List {
        fish: String,
    },
    Delete {
        #[command(flatten)]
        group: GroupSelector,
    },
    /// Print the message a schedule would be sent as.
    Preview {
        #[command(flatten)]
        group: GroupSelector,
    },
    /// Send one schedule, or all of a fish's schedules when no name is given.
    Send {
        fish: String,
        name: Option<String>,
        #[arg(short = 's', long = "start")]
        start: Option<String>,
        #[arg(short = 'e', long = "end")]
        end: Option<String>,
    },
}

/// Execute a CLI command. Rejected input is reported, not returned.
pub fn run(command: Command, service: &FeedingService<'_>, startup: CleanupReport) -> Result<()> {
    match execute(command, service, startup) {
        Err(err) => match err.downcast_ref::<Error>() {
            Some(
                Error::Validation(_)
                | Error::Overlap { .. }
                | Error::NotFound(_)
                | Error::Integrity(_),
            ) => {
                println!("{err}");
                Ok(())
            }
            _ => Err(err),
        },
        done => done,
    }
}

fn execute(command: Command, service: &FeedingService<'_>, startup: CleanupReport) -> Result<()> {
    match command {
        Command::Fish { command } => match command {
            FishCommand::Add {
                name,
                phone,
                total,
                dead,
                feed_per_fish,
                notes,
            } => handle_fish_add(
                NewFish {
                    name,
                    total_count: total,
                    dead_count: dead,
                    feed_per_fish,
                    notes,
                    phone_number: phone,
                    ..NewFish::default()
                },
                service,
            )?,
            FishCommand::List => handle_fish_list(service)?,
            FishCommand::Show { name } => handle_fish_show(&name, service)?,
            FishCommand::Update { name, changes } => handle_fish_update(&name, changes, service)?,
        },
        Command::Schedule { command } => match command {
            ScheduleCommand::Set {
                fish,
                name,
                start,
                end,
                feed,
                edit,
            } => handle_schedule_set(&fish, &name, &start, &end, &feed, edit, service)?,
            ScheduleCommand::List { fish } => handle_schedule_list(&fish, service)?,
            ScheduleCommand::Delete { group } => handle_schedule_delete(group, service)?,
            ScheduleCommand::Preview { group } => handle_schedule_preview(group, service)?,
            ScheduleCommand::Send {
                fish,
                name,
                start,
                end,
            } => handle_schedule_send(fish, name, start, end, service)?,
        },
        Command::FeedNow { fish, amount } => {
            let fish = service.fish_named(&fish)?;
            let id = fish_id(&fish)?;
            println!("Feed now: {}", service.feed_now(id, amount)?);
        }
        Command::Daily { fish, date } => {
            let fish = service.fish_named(&fish)?;
            let day = match date {
                Some(date) => parse_day(&date)?,
                None => today(),
            };
            let due = service.daily_feed(fish_id(&fish)?, day)?;
            println!("{} on {}: {due}", fish.name, format_day(day));
        }
        Command::Cleanup => println!(
            "Removed {} entries without a fish and {} duplicate entries.",
            startup.invalid_fish_removed, startup.duplicates_removed
        ),
        Command::Clear { yes } => {
            if !yes {
                println!("This deletes every fish and schedule. Re-run with --yes to confirm.");
                return Ok(());
            }
            let (fish, entries) = service.clear_database().wait()?;
            println!("Deleted {fish} fish and {entries} schedule entries.");
        }
    }
    Ok(())
}

fn handle_fish_add(fish: NewFish, service: &FeedingService<'_>) -> Result<()> {
    let name = fish.name.trim().to_owned();
    let id = service.add_fish(fish).wait()?;
    println!("Added fish '{name}' (id {id}).");
    Ok(())
}

fn handle_fish_list(service: &FeedingService<'_>) -> Result<()> {
    let all = service.all_fish()?;
    if all.is_empty() {
        println!("No fish yet.");
        return Ok(());
    }
    println!(
        "{:>4}  {:<16} {:>6} {:>6} {:>10}  PHONE",
        "ID", "NAME", "ALIVE", "TOTAL", "FEED/FISH"
    );
    for fish in all {
        println!(
            "{:>4}  {:<16} {:>6} {:>6} {:>9.1}g  {}",
            fish.id.unwrap_or_default(),
            fish.name,
            fish.alive_count,
            fish.total_count,
            fish.feed_per_fish,
            fish.destination().unwrap_or("-")
        );
    }
    Ok(())
}

fn handle_fish_show(name: &str, service: &FeedingService<'_>) -> Result<()> {
    let fish = service.fish_named(name)?;
    println!("{} (id {})", fish.name, fish_id(&fish)?);
    println!(
        "  count:    {} alive, {} dead, {} total",
        fish.alive_count, fish.dead_count, fish.total_count
    );
    println!(
        "  average:  {:.1} length, {:.1} width, {:.1} weight",
        fish.average_length, fish.average_width, fish.average_weight
    );
    println!(
        "  feed:     {:.1}g per fish, {:.1}g per feeding",
        fish.feed_per_fish,
        fish.total_feed_amount()
    );
    println!("  phone:    {}", fish.destination().unwrap_or("-"));
    println!("  added:    {}", fish.date_added.format("%Y-%m-%d %H:%M"));
    println!("  updated:  {}", fish.last_updated.format("%Y-%m-%d %H:%M"));
    if !fish.notes.is_empty() {
        println!("  notes:    {}", fish.notes);
    }
    print_groups(&fish, service)
}

fn handle_fish_update(name: &str, changes: FishChanges, service: &FeedingService<'_>) -> Result<()> {
    let mut fish = service.fish_named(name)?;
    apply_changes(&mut fish, changes);
    service.update_fish(fish).wait()?;
    println!("Updated fish '{}'.", name.trim());
    Ok(())
}

fn apply_changes(fish: &mut Fish, changes: FishChanges) {
    if let Some(total) = changes.total {
        fish.total_count = total;
    }
    if let Some(dead) = changes.dead {
        fish.dead_count = dead;
    }
    match changes.alive {
        Some(alive) => fish.alive_count = alive,
        None if changes.total.is_some() || changes.dead.is_some() => {
            fish.alive_count = fish.total_count.saturating_sub(fish.dead_count);
        }
        None => {}
    }
    if let Some(length) = changes.length {
        fish.average_length = length;
    }
    if let Some(width) = changes.width {
        fish.average_width = width;
    }
    if let Some(weight) = changes.weight {
        fish.average_weight = weight;
    }
    if let Some(feed) = changes.feed_per_fish {
        fish.feed_per_fish = feed;
    }
    if let Some(phone) = changes.phone {
        fish.phone_number = Some(phone.trim().to_owned()).filter(|p| !p.is_empty());
    }
    if let Some(notes) = changes.notes {
        fish.notes = notes;
    }
}

fn handle_schedule_set(
    fish: &str,
    name: &str,
    start: &str,
    end: &str,
    feed: &[FeedingTimeEntry],
    edit: bool,
    service: &FeedingService<'_>,
) -> Result<()> {
    let fish = service.fish_named(fish)?;
    let range = DateRange::new(parse_day(start)?, parse_day(end)?);
    let pending = if edit {
        let key = GroupKey::new(fish_id(&fish)?, name.trim(), range.start, range.end);
        service.edit_schedule(key, feed)
    } else {
        service.create_schedule(fish_id(&fish)?, name, range, feed)
    };
    match pending.wait()? {
        ReplaceResult::Replaced {
            key,
            inserted,
            notification,
            ..
        } => {
            println!(
                "Saved schedule '{}' ({}) with {inserted} feeding times.",
                key.schedule_name,
                key.range()
            );
            println!("Notification: {notification}");
        }
        ReplaceResult::Failed { key, reason } => {
            bail!("could not save schedule '{}': {reason}", key.schedule_name)
        }
    }
    Ok(())
}

fn handle_schedule_list(fish: &str, service: &FeedingService<'_>) -> Result<()> {
    let fish = service.fish_named(fish)?;
    print_groups(&fish, service)
}

fn handle_schedule_delete(group: GroupSelector, service: &FeedingService<'_>) -> Result<()> {
    let key = resolve_group(&group, service)?;
    let deleted = service.delete_schedule(key.clone()).wait()?;
    println!(
        "Deleted schedule '{}' ({}), {deleted} feeding times.",
        key.schedule_name,
        key.range()
    );
    Ok(())
}

fn handle_schedule_preview(group: GroupSelector, service: &FeedingService<'_>) -> Result<()> {
    let fish = service.fish_named(&group.fish)?;
    let key = resolve_group(&group, service)?;
    let Some(found) = service
        .schedule_groups(key.fish_id)?
        .into_iter()
        .find(|g| g.key == key)
    else {
        bail!("schedule '{}' not found", key.schedule_name);
    };
    let parts = split_parts(&format_group(&fish.name, &found));
    for (i, part) in parts.iter().enumerate() {
        if parts.len() > 1 {
            println!("--- part {}/{} ---", i + 1, parts.len());
        }
        print!("{part}");
    }
    Ok(())
}

fn handle_schedule_send(
    fish: String,
    name: Option<String>,
    start: Option<String>,
    end: Option<String>,
    service: &FeedingService<'_>,
) -> Result<()> {
    match name {
        Some(name) => {
            let key = resolve_group(
                &GroupSelector {
                    fish,
                    name,
                    start,
                    end,
                },
                service,
            )?;
            let outcome = service.send_schedule(&key)?;
            println!("'{}' ({}): {outcome}", key.schedule_name, key.range());
        }
        None => {
            let fish = service.fish_named(&fish)?;
            let sent = service.send_all_schedules(fish_id(&fish)?)?;
            if sent.is_empty() {
                println!("{} has no schedules.", fish.name);
            }
            for (key, outcome) in sent {
                println!("'{}' ({}): {outcome}", key.schedule_name, key.range());
            }
        }
    }
    Ok(())
}

fn print_groups(fish: &Fish, service: &FeedingService<'_>) -> Result<()> {
    let groups = service.schedule_groups(fish_id(fish)?)?;
    if groups.is_empty() {
        println!("No schedules for {}.", fish.name);
        return Ok(());
    }
    for group in groups {
        println!(
            "{} ({}), {:.1}g per fish per day",
            group.key.schedule_name,
            group.key.range(),
            group.daily_quantity()
        );
        for entry in &group.entries {
            println!("    {:>8}  {:.1}g", entry.feeding_time, entry.feed_quantity);
        }
    }
    Ok(())
}

/// Find the group a selector points at. Dates may be left out when the
/// fish has only one schedule with that name.
fn resolve_group(selector: &GroupSelector, service: &FeedingService<'_>) -> Result<GroupKey> {
    let fish = service.fish_named(&selector.fish)?;
    let id = fish_id(&fish)?;
    if let (Some(start), Some(end)) = (&selector.start, &selector.end) {
        return Ok(GroupKey::new(
            id,
            selector.name.trim(),
            parse_day(start)?,
            parse_day(end)?,
        ));
    }
    let mut groups = service.groups_named(id, &selector.name)?;
    match groups.len() {
        0 => bail!("{} has no schedule named '{}'", fish.name, selector.name),
        1 => Ok(groups.remove(0).key),
        _ => {
            let ranges: Vec<String> = groups.iter().map(|g| g.key.range().to_string()).collect();
            bail!(
                "'{}' matches several date ranges ({}); pass --start and --end",
                selector.name,
                ranges.join("; ")
            )
        }
    }
}

fn fish_id(fish: &Fish) -> Result<i64> {
    match fish.id {
        Some(id) => Ok(id),
        None => bail!("fish '{}' has no id", fish.name),
    }
}

/// Parses `"<time>=<grams>"`, e.g. `"7:00 AM=30"`.
fn parse_feed(raw: &str) -> std::result::Result<FeedingTimeEntry, String> {
    let (time, quantity) = raw
        .rsplit_once('=')
        .ok_or_else(|| format!("expected TIME=GRAMS, got '{raw}'"))?;
    let quantity: f64 = quantity
        .trim()
        .parse()
        .map_err(|e| format!("invalid grams in '{raw}': {e}"))?;
    Ok(FeedingTimeEntry::new(time.trim(), quantity))
}
