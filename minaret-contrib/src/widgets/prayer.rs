mod api;
mod cache;
mod schedule;

pub use api::{api_url, fetch, parse_response, Tune};
pub use cache::Cache;
pub use schedule::{
    display_time, parse_time, ActiveWindow, CardRow, Countdown, LabelState, PrayerKey, PrayerTimes, RowState,
    Schedule,
};

use crate::widgets::label::{format, Callback, Callbacks, LabelTemplate, Part, Styles, Values, View};
use anyhow::{bail, Context, Result};
use async_stream::stream;
use chrono::{Local, NaiveDate, NaiveDateTime};
use log::{debug, error, info, warn};
use minaret::text::{Attributes, Color, Text};
use minaret::widgets::{Event, MouseButton, Widget, WidgetEvents, WidgetStream};
use reqwest::{Client, Url};
use std::future;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

type FetchTask = JoinHandle<Result<PrayerTimes>>;

#[derive(Debug, Clone)]
pub struct PrayerConfig {
    pub label: String,
    pub label_alt: String,
    /// How often prayer times are re-fetched.
    pub update_interval: Duration,
    pub city: String,
    /// ISO 3166 country code or name.
    pub country: String,
    /// Calculation method id, see <https://aladhan.com/calculation-methods>.
    pub method: u8,
    pub tune: Tune,
    pub callbacks: Callbacks,
    /// Where fetched times are kept between runs. `None` disables the cache.
    pub cache_path: Option<PathBuf>,
    /// The label is marked as soon this many minutes before a prayer.
    pub pre_prayer_minutes: i64,
    /// A prayer stays active for this many minutes after it starts.
    pub post_prayer_minutes: i64,
    /// How often the countdown is redrawn.
    pub refresh_interval: Duration,
}

impl Default for PrayerConfig {
    fn default() -> Self {
        PrayerConfig {
            label: "<span class=\"icon\">\u{f0b8e}</span> {next_prayer} {time_until}".into(),
            label_alt: "{city}: {next_prayer} {time_until}".into(),
            update_interval: Duration::from_secs(3600),
            city: "Jakarta".into(),
            country: "ID".into(),
            method: 8,
            tune: Tune::default(),
            callbacks: Callbacks {
                on_left: Callback::ToggleLabel,
                on_middle: Callback::DoNothing,
                on_right: Callback::ToggleCard,
            },
            cache_path: cache::default_path(),
            pre_prayer_minutes: 5,
            post_prayer_minutes: 10,
            refresh_interval: Duration::from_secs(30),
        }
    }
}

impl PrayerConfig {
    pub fn validate(&self) -> Result<()> {
        let update = self.update_interval.as_secs();
        if !(60..=36_000_000).contains(&update) {
            bail!("update_interval must be between 60 and 36000000 seconds, got {update}");
        }
        if self.method > 99 {
            bail!("method must be between 0 and 99, got {}", self.method);
        }
        if self.city.trim().is_empty() || self.country.trim().is_empty() {
            bail!("city and country must not be empty");
        }
        if self.pre_prayer_minutes < 0 || self.post_prayer_minutes < 0 {
            bail!("pre_prayer_minutes and post_prayer_minutes must not be negative");
        }
        if self.refresh_interval.is_zero() {
            bail!("refresh_interval must be positive");
        }
        Ok(())
    }
}

/// Default classes for the prayer widget: label states and card rows.
pub fn default_styles(base: Attributes) -> Styles {
    Styles::new(base.clone())
        .with_class("prayer-time-soon", base.with_fg(Color::yellow()))
        .with_class("prayer-time-active", base.with_fg(Color::green()))
        .with_class("prayer-card-header", base.with_fg(Color::grey()))
        .with_class("prayer-row-past", base.with_fg(Color::grey()))
        .with_class("prayer-row-next", base.with_fg(Color::yellow()))
        .with_class("prayer-row-active", base.with_fg(Color::green()))
}

/// Counts down to the next prayer, with a card listing the whole day.
///
/// Times come from the [AlAdhan](https://aladhan.com) API and are cached on
/// disk, so the widget only needs the network once a day.
pub struct PrayerTime {
    styles: Styles,
    config: PrayerConfig,
    label: LabelTemplate,
    label_alt: LabelTemplate,
    url: Url,
    schedule: Schedule,
    last_fetch_date: Option<NaiveDate>,
    /// Day of the last fetch started, successful or not.
    last_fetch_attempt: Option<NaiveDate>,
    view: View,
}

enum Step {
    Refresh,
    Fetch,
    Fetched(Result<PrayerTimes>),
    Click(MouseButton),
}

impl PrayerTime {
    /// Creates a new [`PrayerTime`] widget.
    ///
    /// Arguments
    ///
    /// * `styles` - The attributes for each class. The label gets the
    /// `prayer-time-soon` / `prayer-time-active` classes as a prayer
    /// approaches or starts; card rows use `prayer-row-next`,
    /// `prayer-row-active` and `prayer-row-past`.
    ///
    /// * `config` - Location, calculation method and labels. Labels may use
    /// `{next_prayer}`, `{time_until}`, `{city}` and every prayer name
    /// (`{fajr}`, `{dhuhr}`, `{firstthird}`, ...).
    ///
    /// # Examples
    ///
    /// ```
    /// # use minaret::*;
    /// # use minaret::text::*;
    /// # use minaret_contrib::widgets::prayer::*;
    /// # use anyhow::Result;
    /// #
    /// # fn run() -> Result<()> {
    /// let attr = Attributes {
    ///     font: Font::new("SourceCodePro 21"),
    ///     fg_color: Color::white(),
    ///     bg_color: None,
    ///     padding: Padding::new(8.0, 8.0, 0.0, 0.0),
    /// };
    ///
    /// let mut minaret = Minaret::new(Position::Top);
    /// minaret.add_widget(PrayerTime::new(
    ///     default_styles(attr),
    ///     PrayerConfig {
    ///         city: "Istanbul".into(),
    ///         country: "TR".into(),
    ///         method: 13,
    ///         cache_path: None,
    ///         ..PrayerConfig::default()
    ///     },
    /// )?);
    /// # Ok(())
    /// # }
    /// # fn main() { run().unwrap(); }
    /// ```
    pub fn new(styles: Styles, config: PrayerConfig) -> Result<Self> {
        config.validate()?;
        let url = api_url(&config.city, &config.country, config.method, &config.tune)?;
        let mut widget = PrayerTime {
            label: LabelTemplate::parse(&config.label)?,
            label_alt: LabelTemplate::parse(&config.label_alt)?,
            url,
            schedule: Schedule::new(
                chrono::Duration::minutes(config.pre_prayer_minutes),
                chrono::Duration::minutes(config.post_prayer_minutes),
            ),
            last_fetch_date: None,
            last_fetch_attempt: None,
            view: View::default(),
            styles,
            config,
        };
        widget.load_cache();
        Ok(widget)
    }

    fn load_cache(&mut self) {
        let Some(path) = &self.config.cache_path else {
            return;
        };
        match Cache::load(path) {
            Ok(Some(cache)) => {
                debug!("Loaded prayer times from {} ({})", path.display(), cache.last_fetch_date);
                self.schedule.set_data(cache.prayer_time_data);
                self.last_fetch_date = Some(cache.last_fetch_date);
            }
            Ok(None) => (),
            Err(err) => warn!("Ignoring prayer times cache: {err:#}"),
        }
    }

    fn needs_fetch(&self, today: NaiveDate) -> bool {
        self.schedule.data().is_none() || self.last_fetch_date != Some(today)
    }

    /// The countdown tick only retries a missing day once. Failures after
    /// that wait for the update interval or a `FetchData` click.
    fn refresh_wants_fetch(&self, today: NaiveDate) -> bool {
        self.needs_fetch(today) && self.last_fetch_attempt != Some(today)
    }

    /// Spawns a fetch unless one is already in flight.
    fn start_fetch(&mut self, client: &Client, fetch: &mut Option<FetchTask>, today: NaiveDate) -> bool {
        if fetch.is_some() {
            return false;
        }
        let client = client.clone();
        let url = self.url.clone();
        *fetch = Some(tokio::spawn(async move { api::fetch(&client, &url).await }));
        self.last_fetch_attempt = Some(today);
        true
    }

    fn apply_fetch(&mut self, result: Result<PrayerTimes>, today: NaiveDate) {
        let times = match result {
            Ok(times) => times,
            Err(err) => {
                error!("Failed to fetch prayer times: {err:#}");
                return;
            }
        };
        info!("Fetched prayer times for {}", times.city);

        if let Some(path) = &self.config.cache_path {
            let cache = Cache {
                prayer_time_data: times.clone(),
                last_fetch_date: today,
            };
            if let Err(err) = cache.save(path) {
                warn!("Failed to save prayer times cache: {err:#}");
            }
        }
        self.schedule.set_data(times);
        self.last_fetch_date = Some(today);
    }

    fn values(&self, now: NaiveDateTime, countdown: Option<&Countdown>) -> Values {
        let (next_prayer, time_until) = match (self.schedule.active_window(now), countdown) {
            (Some(window), _) => (window.key.name(), String::new()),
            (None, Some(countdown)) => (countdown.key.name(), countdown.text.clone()),
            (None, None) => ("N/A", "N/A".to_owned()),
        };

        let mut values = Values::new()
            .with("next_prayer", next_prayer)
            .with("time_until", time_until);
        let data = self.schedule.data();
        values.insert("city", data.map_or(self.config.city.as_str(), |data| data.city.as_str()));
        for key in PrayerKey::ALL {
            values.insert(key.name(), data.and_then(|data| data.get(key)).unwrap_or("N/A"));
        }
        values
    }

    fn render(&mut self, now: NaiveDateTime) -> Result<Vec<Text>> {
        let countdown = self.schedule.countdown(now);
        let state = self
            .schedule
            .label_state(now, countdown.as_ref().map(|countdown| countdown.minutes_left));
        let values = self.values(now, countdown.as_ref());

        let template = self.view.pick(&self.label, &self.label_alt);
        let mut texts = template.render(&self.styles, state.modifier(), |part| match part {
            Part::Icon { content, .. } => Ok(content.clone()),
            // `{time_until}` is empty while a prayer is active.
            Part::Text(text) => format(text, &values).map(|text| text.trim().to_owned()),
        })?;

        if self.view.card {
            texts.extend(self.card(now));
        }
        Ok(texts)
    }

    fn card(&mut self, now: NaiveDateTime) -> Vec<Text> {
        let Some(data) = self.schedule.data() else {
            return Vec::new();
        };
        let header = format!("{}, {}", data.city, self.config.country);

        let mut texts = vec![Text::plain(self.styles.get("prayer-card-header").clone(), header)];
        for row in self.schedule.card_rows(now) {
            texts.push(Text::plain(
                self.styles.get(row.state.class()).clone(),
                format!("{} {}", row.name, row.time),
            ));
        }
        texts
    }

    fn on_click(&mut self, button: MouseButton, client: &Client, fetch: &mut Option<FetchTask>, today: NaiveDate) {
        match self.config.callbacks.for_button(button) {
            Callback::FetchData => {
                if !self.start_fetch(client, fetch, today) {
                    debug!("Prayer times fetch already in flight");
                }
            }
            Callback::ToggleCard if !self.view.card && self.schedule.data().is_none() => {
                warn!("Prayer times are not available yet");
            }
            callback => self.view.apply(callback),
        }
    }
}

async fn join_fetch(fetch: &mut Option<FetchTask>) -> Result<PrayerTimes> {
    match fetch {
        Some(task) => task.await.context("Prayer times fetch task failed")?,
        None => future::pending().await,
    }
}

impl Widget for PrayerTime {
    fn into_stream(mut self: Box<Self>, mut events: WidgetEvents) -> Result<WidgetStream> {
        let client = api::client()?;
        let period = self.config.update_interval;
        // The first fetch is decided by the cache, not by the interval.
        let mut update = time::interval_at(Instant::now() + period, period);
        let mut refresh = time::interval(self.config.refresh_interval);

        let stream = stream! {
            let mut fetch: Option<FetchTask> = None;
            let today = Local::now().date_naive();
            if self.needs_fetch(today) {
                self.start_fetch(&client, &mut fetch, today);
            }

            loop {
                let step = tokio::select! {
                    _ = refresh.tick() => Step::Refresh,
                    _ = update.tick() => Step::Fetch,
                    result = join_fetch(&mut fetch) => Step::Fetched(result),
                    Some(Event::Click(button)) = events.recv() => Step::Click(button),
                };

                let now = Local::now().naive_local();
                match step {
                    // Also catches the date rolling over.
                    Step::Refresh => {
                        if self.refresh_wants_fetch(now.date()) {
                            self.start_fetch(&client, &mut fetch, now.date());
                        }
                    }
                    Step::Fetch => {
                        self.start_fetch(&client, &mut fetch, now.date());
                    }
                    Step::Fetched(result) => {
                        fetch = None;
                        self.apply_fetch(result, now.date());
                    }
                    Step::Click(button) => self.on_click(button, &client, &mut fetch, now.date()),
                }

                yield self.render(now);
            }
        };

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use minaret::text::{Font, Padding};

    fn styles() -> Styles {
        default_styles(Attributes {
            font: Font::new("Sans 10"),
            fg_color: Color::white(),
            bg_color: None,
            padding: Padding::new(0.0, 0.0, 0.0, 0.0),
        })
    }

    fn at(hours: u32, minutes: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 15)
            .unwrap()
            .and_hms_opt(hours, minutes, 0)
            .unwrap()
    }

    fn times() -> PrayerTimes {
        let raw = [
            (PrayerKey::Imsak, "04:10"),
            (PrayerKey::Fajr, "04:20"),
            (PrayerKey::Sunrise, "05:35"),
            (PrayerKey::Dhuhr, "11:40"),
            (PrayerKey::Asr, "14:55"),
            (PrayerKey::Maghrib, "17:50"),
            (PrayerKey::Sunset, "17:48"),
            (PrayerKey::Isha, "19:00"),
            (PrayerKey::Midnight, "23:45"),
            (PrayerKey::FirstThird, "21:50"),
            (PrayerKey::LastThird, "01:40"),
        ];
        PrayerTimes {
            city: "Jakarta".into(),
            times: raw.iter().map(|&(key, time)| (key, time.to_owned())).collect(),
        }
    }

    fn widget(cache_path: Option<PathBuf>) -> PrayerTime {
        PrayerTime::new(
            styles(),
            PrayerConfig {
                label: "{next_prayer} {time_until}".into(),
                label_alt: "{city} {fajr}".into(),
                cache_path,
                ..PrayerConfig::default()
            },
        )
        .unwrap()
    }

    fn texts(texts: &[Text]) -> Vec<&str> {
        texts.iter().map(|text| text.text.as_str()).collect()
    }

    #[test]
    fn renders_placeholders_without_data() {
        let mut widget = widget(None);
        assert!(widget.needs_fetch(at(12, 0).date()));
        let rendered = widget.render(at(12, 0)).unwrap();
        assert_eq!(texts(&rendered), ["N/A N/A"]);
    }

    #[test]
    fn renders_the_countdown_and_state() {
        let mut widget = widget(None);
        widget.apply_fetch(Ok(times()), at(12, 0).date());
        assert!(!widget.needs_fetch(at(12, 0).date()));

        let rendered = widget.render(at(12, 0)).unwrap();
        assert_eq!(texts(&rendered), ["asr 2h 55m"]);
        assert_eq!(rendered[0].attr.fg_color, Color::white());

        let rendered = widget.render(at(14, 52)).unwrap();
        assert_eq!(texts(&rendered), ["asr 3m"]);
        assert_eq!(rendered[0].attr.fg_color, Color::yellow());

        let rendered = widget.render(at(14, 56)).unwrap();
        assert_eq!(texts(&rendered), ["asr"]);
        assert_eq!(rendered[0].attr.fg_color, Color::green());
    }

    #[test]
    fn clicks_toggle_the_label_and_card() {
        let client = Client::new();
        let mut fetch = None;
        let mut widget = widget(None);

        let today = at(12, 0).date();

        // No card without data.
        widget.on_click(MouseButton::Right, &client, &mut fetch, today);
        assert!(!widget.view.card);

        widget.apply_fetch(Ok(times()), today);
        widget.on_click(MouseButton::Left, &client, &mut fetch, today);
        widget.on_click(MouseButton::Right, &client, &mut fetch, today);
        assert!(fetch.is_none());

        let rendered = widget.render(at(12, 0)).unwrap();
        assert_eq!(rendered[0].text, "Jakarta 04:20");
        assert_eq!(rendered[1].text, "Jakarta, ID");
        assert_eq!(rendered[2].text, "Imsak 04:10");
        assert_eq!(rendered.len(), 2 + PrayerKey::ALL.len());
        let asr = rendered.iter().find(|text| text.text == "Asr 14:55").unwrap();
        assert_eq!(asr.attr.fg_color, Color::yellow());
    }

    #[test]
    fn failed_fetch_keeps_previous_data() {
        let mut widget = widget(None);
        widget.apply_fetch(Ok(times()), at(12, 0).date());
        widget.apply_fetch(Err(anyhow::anyhow!("offline")), at(12, 5).date());
        assert_eq!(widget.schedule.data(), Some(&times()));
    }

    #[tokio::test]
    async fn failed_fetch_is_not_retried_on_every_refresh() {
        let client = Client::new();
        let mut fetch = None;
        let mut widget = widget(None);
        let today = at(12, 0).date();

        assert!(widget.refresh_wants_fetch(today));
        assert!(widget.start_fetch(&client, &mut fetch, today));
        if let Some(task) = fetch.take() {
            task.abort();
        }
        widget.apply_fetch(Err(anyhow::anyhow!("offline")), today);

        assert!(widget.needs_fetch(today));
        assert!(!widget.refresh_wants_fetch(today));
        assert!(widget.refresh_wants_fetch(today.succ_opt().unwrap()));
    }

    #[tokio::test]
    async fn fetch_data_click_is_single_flight() {
        let client = Client::new();
        let mut widget = PrayerTime::new(
            styles(),
            PrayerConfig {
                callbacks: Callbacks {
                    on_middle: Callback::FetchData,
                    ..PrayerConfig::default().callbacks
                },
                cache_path: None,
                ..PrayerConfig::default()
            },
        )
        .unwrap();
        let today = at(12, 0).date();
        let mut fetch: Option<FetchTask> = Some(tokio::spawn(future::pending()));

        widget.on_click(MouseButton::Middle, &client, &mut fetch, today);
        assert_eq!(widget.last_fetch_attempt, None);
        let in_flight = fetch.take().unwrap();
        assert!(!in_flight.is_finished());
        in_flight.abort();

        widget.on_click(MouseButton::Middle, &client, &mut fetch, today);
        assert_eq!(widget.last_fetch_attempt, Some(today));
        if let Some(task) = fetch.take() {
            task.abort();
        }
    }

    #[test]
    fn fetched_times_are_cached_for_the_next_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prayer.json");

        let mut first = widget(Some(path.clone()));
        first.apply_fetch(Ok(times()), at(12, 0).date());

        let second = widget(Some(path));
        assert_eq!(second.schedule.data(), Some(&times()));
        assert!(!second.needs_fetch(at(12, 0).date()));
        assert!(second.needs_fetch(at(12, 0).date().succ_opt().unwrap()));
    }

    #[test]
    fn config_validation() {
        assert!(PrayerConfig::default().validate().is_ok());
        let config = PrayerConfig {
            update_interval: Duration::from_secs(59),
            ..PrayerConfig::default()
        };
        assert!(config.validate().is_err());
        let config = PrayerConfig {
            method: 100,
            ..PrayerConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
