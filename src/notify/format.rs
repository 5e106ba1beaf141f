//! Plain-text rendering of schedules for a text-message link.

use std::fmt::Write;

use chrono::NaiveDateTime;

use crate::schedule::{DateRange, ScheduleGroup};
use crate::types::FeedingScheduleEntry;

/// Characters that fit in a single message.
pub const SINGLE_PART_LIMIT: usize = 160;
/// Characters per part once a message is split; the rest goes to the
/// concatenation header.
pub const MULTIPART_LIMIT: usize = 153;

/// Render one schedule group, e.g.
///
/// ```text
/// New feeding schedule for Tilapia: Summer
/// Jun 01, 2024 - Jun 30, 2024
/// 7:00 AM - 30.0g
/// ```
///
/// `entries` are expected in chronological order. The result is ASCII only.
pub fn format_schedule(
    fish_name: &str,
    schedule_name: &str,
    range: DateRange,
    entries: &[FeedingScheduleEntry],
) -> String {
    let mut out = format!("New feeding schedule for {fish_name}: {schedule_name}\n{range}\n");
    for entry in entries {
        let _ = writeln!(out, "{} - {:.1}g", entry.feeding_time, entry.feed_quantity);
    }
    strip_non_ascii(&out)
}

pub fn format_group(fish_name: &str, group: &ScheduleGroup) -> String {
    let key = &group.key;
    format_schedule(fish_name, &key.schedule_name, key.range(), &group.entries)
}

/// Feeder command to dispense `amount` grams per fish, stamped with the
/// local time it was issued. The feeder reads it line by line.
pub fn format_feed_now(fish_name: &str, amount: f64, issued: NaiveDateTime) -> String {
    strip_non_ascii(&format!(
        "FEED NOW COMMAND\nFish: {fish_name}\nAmount: {amount:.1}g per fish\nTime: {}",
        issued.format("%I:%M %p, %b %d")
    ))
}

pub fn strip_non_ascii(text: &str) -> String {
    text.chars().filter(char::is_ascii).collect()
}

/// Split `message` into transport parts.
///
/// A message of at most [`SINGLE_PART_LIMIT`] characters is returned whole.
/// Longer messages are cut into parts of at most [`MULTIPART_LIMIT`]
/// characters, at line ends where possible. Concatenating the parts gives
/// back the input.
pub fn split_parts(message: &str) -> Vec<String> {
    if message.chars().count() <= SINGLE_PART_LIMIT {
        return vec![message.to_owned()];
    }

    let mut parts = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;
    for line in message.split_inclusive('\n') {
        let line_len = line.chars().count();
        if current_len + line_len > MULTIPART_LIMIT && !current.is_empty() {
            parts.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if line_len <= MULTIPART_LIMIT {
            current.push_str(line);
            current_len += line_len;
            continue;
        }
        // A single line longer than a part: hard-wrap it.
        for ch in line.chars() {
            if current_len == MULTIPART_LIMIT {
                parts.push(std::mem::take(&mut current));
                current_len = 0;
            }
            current.push(ch);
            current_len += 1;
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    const JUN_01_2024: i64 = 1_717_200_000_000;
    const JUN_30_2024: i64 = 1_719_705_600_000;

    fn entry(time: &str, qty: f64) -> FeedingScheduleEntry {
        FeedingScheduleEntry {
            id: None,
            fish_id: 2,
            schedule_name: "Summer".to_owned(),
            start_date: JUN_01_2024,
            end_date: JUN_30_2024,
            feeding_time: time.to_owned(),
            feed_quantity: qty,
        }
    }

    #[test]
    fn renders_header_range_and_times() {
        let text = format_schedule(
            "Tilapia",
            "Summer",
            DateRange::new(JUN_01_2024, JUN_30_2024),
            &[entry("7:00 AM", 30.0), entry("5:00 PM", 30.0)],
        );
        assert_eq!(
            text,
            "New feeding schedule for Tilapia: Summer\n\
             Jun 01, 2024 - Jun 30, 2024\n\
             7:00 AM - 30.0g\n\
             5:00 PM - 30.0g\n"
        );
        assert_eq!(split_parts(&text), [text.clone()]);
    }

    #[test]
    fn quantities_use_one_decimal() {
        let text = format_schedule(
            "Bangus",
            "S",
            DateRange::new(JUN_01_2024, JUN_01_2024),
            &[entry("6:00 AM", 12.345), entry("6:30 AM", 7.0)],
        );
        assert!(text.contains("6:00 AM - 12.3g\n"));
        assert!(text.contains("6:30 AM - 7.0g\n"));
        assert!(text.contains("Jun 01, 2024 - Jun 01, 2024\n"));
    }

    #[test]
    fn non_ascii_is_removed() {
        let text = format_schedule(
            "Tilápia",
            "Été",
            DateRange::new(JUN_01_2024, JUN_30_2024),
            &[entry("7:00 AM", 1.0)],
        );
        assert!(text.is_ascii());
        assert!(text.starts_with("New feeding schedule for Tilpia: t\n"));
    }

    #[test]
    fn feed_now_command_lines() {
        let issued = chrono::NaiveDate::from_ymd_opt(2024, 6, 3)
            .and_then(|d| d.and_hms_opt(7, 5, 0))
            .unwrap();
        assert_eq!(
            format_feed_now("Bangus", 2.0, issued),
            "FEED NOW COMMAND\nFish: Bangus\nAmount: 2.0g per fish\nTime: 07:05 AM, Jun 03"
        );
    }

    #[test]
    fn long_messages_split_on_line_boundaries() {
        let times: Vec<_> = (1..=12)
            .flat_map(|h| [format!("{h}:00 AM"), format!("{h}:30 PM")])
            .map(|t| entry(&t, 25.5))
            .collect();
        let text = format_schedule(
            "Tilapia",
            "Summer",
            DateRange::new(JUN_01_2024, JUN_30_2024),
            &times,
        );
        assert!(text.len() > SINGLE_PART_LIMIT);

        let parts = split_parts(&text);
        assert!(parts.len() > 1);
        assert!(parts.iter().all(|p| p.len() <= MULTIPART_LIMIT));
        assert!(parts.iter().all(|p| p.ends_with('\n')));
        assert_eq!(parts.concat(), text);
    }

    #[test]
    fn overlong_line_is_hard_wrapped() {
        let text = "x".repeat(400);
        let parts = split_parts(&text);
        assert_eq!(
            parts.iter().map(String::len).collect::<Vec<_>>(),
            [153, 153, 94]
        );
        assert_eq!(parts.concat(), text);
    }

    #[test]
    fn exactly_single_limit_stays_whole() {
        let text = "y".repeat(SINGLE_PART_LIMIT);
        assert_eq!(split_parts(&text).len(), 1);
    }
}
