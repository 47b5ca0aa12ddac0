use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use log::warn;
use serde_derive::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrayerKey {
    Imsak,
    Fajr,
    Sunrise,
    Dhuhr,
    Asr,
    Maghrib,
    Sunset,
    Isha,
    Midnight,
    FirstThird,
    LastThird,
}

impl PrayerKey {
    pub const ALL: [PrayerKey; 11] = [
        PrayerKey::Imsak,
        PrayerKey::Fajr,
        PrayerKey::Sunrise,
        PrayerKey::Dhuhr,
        PrayerKey::Asr,
        PrayerKey::Maghrib,
        PrayerKey::Sunset,
        PrayerKey::Isha,
        PrayerKey::Midnight,
        PrayerKey::FirstThird,
        PrayerKey::LastThird,
    ];

    /// The placeholder name, e.g. `fajr` or `firstthird`.
    pub fn name(self) -> &'static str {
        match self {
            PrayerKey::Imsak => "imsak",
            PrayerKey::Fajr => "fajr",
            PrayerKey::Sunrise => "sunrise",
            PrayerKey::Dhuhr => "dhuhr",
            PrayerKey::Asr => "asr",
            PrayerKey::Maghrib => "maghrib",
            PrayerKey::Sunset => "sunset",
            PrayerKey::Isha => "isha",
            PrayerKey::Midnight => "midnight",
            PrayerKey::FirstThird => "firstthird",
            PrayerKey::LastThird => "lastthird",
        }
    }

    /// The field name in the API response, which is also the display name.
    pub fn title(self) -> &'static str {
        match self {
            PrayerKey::Imsak => "Imsak",
            PrayerKey::Fajr => "Fajr",
            PrayerKey::Sunrise => "Sunrise",
            PrayerKey::Dhuhr => "Dhuhr",
            PrayerKey::Asr => "Asr",
            PrayerKey::Maghrib => "Maghrib",
            PrayerKey::Sunset => "Sunset",
            PrayerKey::Isha => "Isha",
            PrayerKey::Midnight => "Midnight",
            PrayerKey::FirstThird => "Firstthird",
            PrayerKey::LastThird => "Lastthird",
        }
    }

    /// The thirds of the night fall after midnight, so they belong to tomorrow.
    pub fn wraps_to_next_day(self) -> bool {
        matches!(self, PrayerKey::FirstThird | PrayerKey::LastThird)
    }
}

impl fmt::Display for PrayerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One day of prayer times as returned by the API.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrayerTimes {
    pub city: String,
    /// Raw `HH:MM` strings, possibly with a ` (TZ)` suffix.
    pub times: BTreeMap<PrayerKey, String>,
}

impl PrayerTimes {
    pub fn get(&self, key: PrayerKey) -> Option<&str> {
        self.times.get(&key).map(String::as_str)
    }
}

/// Strips a trailing parenthesised suffix such as ` (WIB)`.
pub fn display_time(raw: &str) -> &str {
    let trimmed = raw.trim();
    match trimmed.find('(') {
        Some(open) if trimmed.ends_with(')') => trimmed[..open].trim_end(),
        _ => trimmed,
    }
}

/// Anchors an `HH:MM` time on `date`.
///
/// Returns `None` for empty and `N/A` times, and for anything that isn't a
/// valid time of day.
pub fn parse_time(raw: &str, date: NaiveDate) -> Option<NaiveDateTime> {
    let time = display_time(raw);
    if time.is_empty() || time == "N/A" {
        return None;
    }

    let parsed = time.split_once(':').and_then(|(hours, minutes)| {
        let hours = hours.trim().parse().ok()?;
        let minutes = minutes.trim().parse().ok()?;
        NaiveTime::from_hms_opt(hours, minutes, 0)
    });
    if parsed.is_none() {
        warn!("Invalid prayer time {raw:?}");
    }
    parsed.map(|time| date.and_time(time))
}

/// The period after a prayer starts during which it is shown as active.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ActiveWindow {
    pub key: PrayerKey,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Countdown {
    pub key: PrayerKey,
    /// `"1h 5m"`, `"42m"`, or `"0m"` once the prayer is active.
    pub text: String,
    pub minutes_left: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LabelState {
    Normal,
    Soon,
    Active,
}

impl LabelState {
    /// The style class added to the label, if any.
    pub fn modifier(self) -> Option<&'static str> {
        match self {
            LabelState::Normal => None,
            LabelState::Soon => Some("prayer-time-soon"),
            LabelState::Active => Some("prayer-time-active"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RowState {
    Upcoming,
    Next,
    Active,
    Past,
}

impl RowState {
    pub fn class(self) -> &'static str {
        match self {
            RowState::Upcoming => "prayer-row",
            RowState::Next => "prayer-row prayer-row-next",
            RowState::Active => "prayer-row prayer-row-active",
            RowState::Past => "prayer-row prayer-row-past",
        }
    }
}

/// One line of the prayer card.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CardRow {
    pub key: PrayerKey,
    pub name: &'static str,
    pub time: String,
    pub state: RowState,
}

/// Decides which prayer comes next and when a prayer is active.
#[derive(Clone, Debug)]
pub struct Schedule {
    data: Option<PrayerTimes>,
    active: Option<ActiveWindow>,
    pre_prayer: Duration,
    post_prayer: Duration,
}

impl Schedule {
    pub fn new(pre_prayer: Duration, post_prayer: Duration) -> Schedule {
        Schedule {
            data: None,
            active: None,
            pre_prayer,
            post_prayer,
        }
    }

    pub fn data(&self) -> Option<&PrayerTimes> {
        self.data.as_ref()
    }

    pub fn set_data(&mut self, data: PrayerTimes) {
        self.data = Some(data);
    }

    /// The window of the active prayer, if it is still open at `now`.
    pub fn active_window(&self, now: NaiveDateTime) -> Option<ActiveWindow> {
        self.active.filter(|window| now < window.end)
    }

    pub fn resolve(&self, key: PrayerKey, today: NaiveDate) -> Option<NaiveDateTime> {
        let raw = self.data.as_ref()?.get(key)?;
        let date = if key.wraps_to_next_day() {
            today + Duration::days(1)
        } else {
            today
        };
        parse_time(raw, date)
    }

    /// Every prayer with a usable time, sorted by when it happens.
    pub fn ordered(&self, today: NaiveDate) -> Vec<(PrayerKey, NaiveDateTime)> {
        let mut prayers: Vec<_> = PrayerKey::ALL
            .iter()
            .filter_map(|&key| Some((key, self.resolve(key, today)?)))
            .collect();
        prayers.sort_by_key(|&(_, at)| at);
        prayers
    }

    pub fn next_prayer(&self, now: NaiveDateTime) -> Option<(PrayerKey, NaiveDateTime)> {
        if let Some(window) = self.active_window(now) {
            return Some((window.key, window.start));
        }

        let prayers = self.ordered(now.date());
        let &(first_key, first_at) = prayers.first()?;
        for (idx, &(key, at)) in prayers.iter().enumerate() {
            if at > now {
                // A prayer that has only just started still counts as next.
                if let Some(&(prev_key, prev_at)) = idx.checked_sub(1).and_then(|prev| prayers.get(prev)) {
                    if now - prev_at < self.post_prayer {
                        return Some((prev_key, prev_at));
                    }
                }
                return Some((key, at));
            }
        }

        let tomorrow = now.date() + Duration::days(1);
        Some((first_key, tomorrow.and_time(first_at.time())))
    }

    /// Time left until the next prayer.
    ///
    /// Opens the active window once the next prayer's time has been reached.
    pub fn countdown(&mut self, now: NaiveDateTime) -> Option<Countdown> {
        let (key, at) = self.next_prayer(now)?;
        let minutes_left = (at - now).num_milliseconds() as f64 / 60_000.0;
        let post_minutes = self.post_prayer.num_seconds() as f64 / 60.0;

        if -post_minutes < minutes_left && minutes_left <= 0.0 {
            self.active = Some(ActiveWindow {
                key,
                start: at,
                end: at + self.post_prayer,
            });
            return Some(Countdown {
                key,
                text: "0m".into(),
                minutes_left: 0.0,
            });
        }

        let whole = minutes_left.abs() as i64;
        let (hours, minutes) = (whole / 60, whole % 60);
        let text = if hours > 0 {
            format!("{hours}h {minutes}m")
        } else {
            format!("{minutes}m")
        };
        Some(Countdown {
            key,
            text,
            minutes_left,
        })
    }

    pub fn label_state(&self, now: NaiveDateTime, minutes_left: Option<f64>) -> LabelState {
        let pre_minutes = self.pre_prayer.num_seconds() as f64 / 60.0;
        if self.active_window(now).is_some() {
            LabelState::Active
        } else if minutes_left.map_or(false, |minutes| minutes <= pre_minutes) {
            LabelState::Soon
        } else {
            LabelState::Normal
        }
    }

    pub fn card_rows(&mut self, now: NaiveDateTime) -> Vec<CardRow> {
        let next = self.countdown(now).map(|countdown| countdown.key);
        let active = self.active_window(now).map(|window| window.key);
        let Some(data) = self.data.as_ref() else {
            return Vec::new();
        };

        self.ordered(now.date())
            .into_iter()
            .filter_map(|(key, at)| {
                let state = if active == Some(key) {
                    RowState::Active
                } else if next == Some(key) {
                    RowState::Next
                } else if at < now {
                    RowState::Past
                } else {
                    RowState::Upcoming
                };
                Some(CardRow {
                    key,
                    name: key.title(),
                    time: display_time(data.get(key)?).to_owned(),
                    state,
                })
            })
            .collect()
    }
}
