use chrono::{DateTime, Local};

pub type FishId = i64;
pub type EntryId = i64;

/// Epoch milliseconds at UTC midnight of a calendar day.
pub type DayStamp = i64;

/// Fish id left behind by entries saved before a fish was selected.
pub const INVALID_FISH_ID: FishId = -1;

/// A tracked population of one kind of fish.
#[derive(Clone, Debug, PartialEq)]
pub struct Fish {
    pub id: Option<FishId>,
    pub name: String,
    pub total_count: u32,
    pub alive_count: u32,
    pub dead_count: u32,
    pub average_length: f64,
    pub average_width: f64,
    pub average_weight: f64,
    /// Grams per individual fish.
    pub feed_per_fish: f64,
    pub date_added: DateTime<Local>,
    pub last_updated: DateTime<Local>,
    pub notes: String,
    pub phone_number: Option<String>,
}

impl Fish {
    /// Total grams for one feeding of every live fish.
    pub fn total_feed_amount(&self) -> f64 {
        f64::from(self.alive_count) * self.feed_per_fish
    }

    /// Destination for outbound notifications, if one is set.
    pub fn destination(&self) -> Option<&str> {
        self.phone_number
            .as_deref()
            .map(str::trim)
            .filter(|phone| !phone.is_empty())
    }
}

/// Input for creating a fish. `alive_count` defaults to `total - dead`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NewFish {
    pub name: String,
    pub total_count: u32,
    pub alive_count: Option<u32>,
    pub dead_count: u32,
    pub average_length: f64,
    pub average_width: f64,
    pub average_weight: f64,
    pub feed_per_fish: f64,
    pub notes: String,
    pub phone_number: Option<String>,
}

pub enum FishQuery {
    All,
    ById(FishId),
    ByName(String),
}

/// One stored row of `feeding_schedules`.
#[derive(Clone, Debug, PartialEq)]
pub struct FeedingScheduleEntry {
    pub id: Option<EntryId>,
    pub fish_id: FishId,
    pub schedule_name: String,
    pub start_date: DayStamp,
    pub end_date: DayStamp,
    /// 12-hour clock time such as `"7:30 AM"`.
    pub feeding_time: String,
    /// Grams per individual fish.
    pub feed_quantity: f64,
}

/// A user-submitted (time, quantity) pair, before it is stamped into a group.
#[derive(Clone, Debug, PartialEq)]
pub struct FeedingTimeEntry {
    pub time: String,
    pub quantity: f64,
}

impl FeedingTimeEntry {
    pub fn new(time: impl Into<String>, quantity: f64) -> Self {
        Self {
            time: time.into(),
            quantity,
        }
    }
}

pub enum EntryQuery {
    All,
    ByFish(FishId),
    /// Entries whose range contains the given day.
    ForDate(FishId, DayStamp),
    /// Entries whose range intersects `[start, end]`.
    ForDateRange(FishId, DayStamp, DayStamp),
    ByName(FishId, String),
}
