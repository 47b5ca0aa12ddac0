use crate::widgets::label::{format, Callbacks, LabelTemplate, Part, Styles, Value, Values, View};
use anyhow::{bail, Context, Result};
use async_stream::stream;
use byte_unit::{Byte, ByteUnit};
use log::warn;
use minaret::text::{Attributes, Color, Text};
use minaret::widgets::{Event, Widget, WidgetEvents, WidgetStream};
use nix::sys::statvfs::statvfs;
use std::time::Duration;
use tokio::time;

const USAGE_BAR_CELLS: usize = 10;

/// Represent Information about the mounted filesystem
#[derive(Debug, Clone)]
pub struct DiskInfo {
    /// Total size of the filesystem
    pub total: Byte,
    /// Total used space of the filesystem
    pub used: Byte,
    /// Space available to unprivileged users
    pub free: Byte,
}

impl DiskInfo {
    pub fn new(path: &str) -> Result<Self> {
        let stat = statvfs(path).with_context(|| format!("statvfs({path}) failed"))?;
        let fragment_size = stat.fragment_size() as u64;
        let total = stat.blocks() as u64 * fragment_size;
        let used = (stat.blocks() as u64).saturating_sub(stat.blocks_free() as u64) * fragment_size;
        let free = stat.blocks_available() as u64 * fragment_size;

        Ok(DiskInfo::from_bytes(total, used, free))
    }

    pub fn from_bytes(total: u64, used: u64, free: u64) -> Self {
        DiskInfo {
            total: Byte::from_bytes(total as u128),
            used: Byte::from_bytes(used as u128),
            free: Byte::from_bytes(free as u128),
        }
    }

    pub fn used_percent(&self) -> f64 {
        let total = self.total.get_bytes();
        if total == 0 {
            0.0
        } else {
            self.used.get_bytes() as f64 / total as f64 * 100.0
        }
    }
}

/// One quantity in each display unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Figures {
    pub mb: String,
    pub gb: String,
    pub tb: String,
}

impl Figures {
    fn new(bytes: &Byte, decimals: usize) -> Figures {
        let scaled = |unit: ByteUnit, suffix: &str| {
            let value = bytes.get_adjusted_unit(unit).get_value();
            format!("{value:.decimals$}{suffix}")
        };
        Figures {
            mb: scaled(ByteUnit::MiB, "MB"),
            gb: scaled(ByteUnit::GiB, "GB"),
            tb: scaled(ByteUnit::TiB, "TB"),
        }
    }

    fn to_values(&self) -> Values {
        Values::new()
            .with("mb", self.mb.as_str())
            .with("gb", self.gb.as_str())
            .with("tb", self.tb.as_str())
    }
}

/// The `{space[...]}` placeholders for one filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskSpace {
    pub total: Figures,
    pub free: Figures,
    pub used: Figures,
    pub free_percent: String,
    pub used_percent: String,
}

impl DiskSpace {
    pub fn new(info: &DiskInfo, decimals: usize) -> DiskSpace {
        let used_percent = info.used_percent();
        DiskSpace {
            total: Figures::new(&info.total, decimals),
            free: Figures::new(&info.free, decimals),
            used: Figures::new(&info.used, decimals),
            free_percent: format!("{:.decimals$}%", 100.0 - used_percent),
            used_percent: format!("{used_percent:.decimals$}%"),
        }
    }

    pub fn to_values(&self) -> Values {
        Values::new()
            .with("total", self.total.to_values())
            .with("free", self.free.to_values().with("percent", self.free_percent.as_str()))
            .with("used", self.used.to_values().with("percent", self.used_percent.as_str()))
    }
}

/// `"{path}: {free} / {total}"`. Each figure switches to TB on its own once
/// it exceeds 1000 GB.
pub fn group_row(path: &str, info: &DiskInfo, decimals: usize) -> String {
    let figure = |bytes: &Byte| {
        let gib = bytes.get_adjusted_unit(ByteUnit::GiB).get_value();
        if gib > 1000.0 {
            let tib = bytes.get_adjusted_unit(ByteUnit::TiB).get_value();
            format!("{tib:.decimals$}TB")
        } else {
            format!("{gib:.decimals$}GB")
        }
    };
    format!("{path}: {} / {}", figure(&info.free), figure(&info.total))
}

/// A text progress bar for a percentage.
pub fn usage_bar(percent: f64) -> String {
    let filled = ((percent / 100.0 * USAGE_BAR_CELLS as f64).round() as usize).min(USAGE_BAR_CELLS);
    let mut bar = "█".repeat(filled);
    bar.push_str(&"░".repeat(USAGE_BAR_CELLS - filled));
    bar
}

#[derive(Debug, Clone)]
pub struct DiskUsageConfig {
    pub label: String,
    pub label_alt: String,
    /// Pathname of any file within the mounted filesystem.
    pub path: String,
    /// Shown as `{volume_label}`; defaults to the path.
    pub volume_label: Option<String>,
    pub decimal_display: usize,
    pub update_interval: Duration,
    /// Filesystems listed in the card.
    pub group_paths: Vec<String>,
    pub callbacks: Callbacks,
}

impl Default for DiskUsageConfig {
    fn default() -> Self {
        DiskUsageConfig {
            label: "<span class=\"icon\">\u{f02ca}</span> {space[used][percent]}".into(),
            label_alt: "{volume_label} {space[used][gb]} / {space[total][gb]}".into(),
            path: "/".into(),
            volume_label: None,
            decimal_display: 1,
            update_interval: Duration::from_secs(60),
            group_paths: Vec::new(),
            callbacks: Callbacks::default(),
        }
    }
}

impl DiskUsageConfig {
    pub fn validate(&self) -> Result<()> {
        if self.decimal_display > 3 {
            bail!("decimal_display must be between 0 and 3, got {}", self.decimal_display);
        }
        if self.update_interval.is_zero() {
            bail!("update_interval must be positive");
        }
        if self.path.is_empty() {
            bail!("path must not be empty");
        }
        Ok(())
    }
}

/// Default classes for the disk widget: the card rows and usage bars.
pub fn default_styles(base: Attributes) -> Styles {
    Styles::new(base.clone())
        .with_class("disk-group-label", base.with_fg(Color::grey()))
        .with_class("disk-group-label-bar", base.with_fg(Color::green()))
}

/// Disk usage widget to show total size and remaining free space
/// in the mounted filesystem.
pub struct DiskUsage {
    styles: Styles,
    config: DiskUsageConfig,
    label: LabelTemplate,
    label_alt: LabelTemplate,
    view: View,
}

impl DiskUsage {
    /// Creates a new [`DiskUsage`] widget.
    ///
    /// Arguments
    ///
    /// * `styles` - The attributes for each class used in the labels
    /// (`label`, span classes) and in the card.
    ///
    /// * `config` - Labels, the filesystem to watch and the group card.
    /// `label` and `label_alt` use the `{space[used|free|total][mb|gb|tb]}`,
    /// `{space[used|free][percent]}` and `{volume_label}` placeholders.
    ///
    /// # Examples
    ///
    /// ```
    /// # use minaret::*;
    /// # use minaret::text::*;
    /// # use minaret_contrib::widgets::disk_usage::*;
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
    /// minaret.add_widget(DiskUsage::new(
    ///     default_styles(attr),
    ///     DiskUsageConfig {
    ///         path: "/home".into(),
    ///         group_paths: vec!["/".into(), "/home".into()],
    ///         ..DiskUsageConfig::default()
    ///     },
    /// )?);
    /// # Ok(())
    /// # }
    /// # fn main() { run().unwrap(); }
    /// ```
    pub fn new(styles: Styles, config: DiskUsageConfig) -> Result<Self> {
        config.validate()?;
        Ok(DiskUsage {
            label: LabelTemplate::parse(&config.label)?,
            label_alt: LabelTemplate::parse(&config.label_alt)?,
            styles,
            config,
            view: View::default(),
        })
    }

    fn values(&self, info: &DiskInfo) -> Values {
        let volume_label = self.config.volume_label.as_deref().unwrap_or(&self.config.path);
        Values::new()
            .with("space", DiskSpace::new(info, self.config.decimal_display).to_values())
            .with("volume_label", Value::from(volume_label))
    }

    fn tick(&self) -> Result<Vec<Text>> {
        let values = match DiskInfo::new(&self.config.path) {
            Ok(info) => Some(self.values(&info)),
            Err(err) => {
                warn!("Can't read disk usage for {}: {err:#}", self.config.path);
                None
            }
        };

        let template = self.view.pick(&self.label, &self.label_alt);
        let mut texts = template.render(&self.styles, None, |part| match (part, &values) {
            (Part::Icon { content, .. }, _) => Ok(content.clone()),
            (Part::Text(text), Some(values)) => format(text, values),
            (Part::Text(text), None) => Ok(text.clone()),
        })?;

        if self.view.card {
            texts.extend(self.card());
        }
        Ok(texts)
    }

    fn card(&self) -> Vec<Text> {
        let decimals = self.config.decimal_display;
        let mut texts = Vec::new();
        for path in &self.config.group_paths {
            match DiskInfo::new(path) {
                Ok(info) => {
                    texts.push(Text::plain(
                        self.styles.get("disk-group-label").clone(),
                        group_row(path, &info, decimals),
                    ));
                    texts.push(Text::plain(
                        self.styles.get("disk-group-label-bar").clone(),
                        usage_bar(info.used_percent()),
                    ));
                }
                Err(err) => warn!("Skipping {path} in disk group: {err:#}"),
            }
        }
        texts
    }
}

impl Widget for DiskUsage {
    fn into_stream(mut self: Box<Self>, mut events: WidgetEvents) -> Result<WidgetStream> {
        let mut interval = time::interval(self.config.update_interval);
        let stream = stream! {
            loop {
                tokio::select! {
                    _ = interval.tick() => (),
                    Some(Event::Click(button)) = events.recv() => {
                        self.view.apply(self.config.callbacks.for_button(button));
                    }
                }
                yield self.tick();
            }
        };

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const GIB: u64 = 1024 * 1024 * 1024;

    #[test]
    fn space_values_use_binary_units() {
        let info = DiskInfo::from_bytes(100 * GIB, 25 * GIB, 75 * GIB);
        let space = DiskSpace::new(&info, 1);

        assert_eq!(space.total.gb, "100.0GB");
        assert_eq!(space.used.mb, "25600.0MB");
        assert_eq!(space.free.tb, "0.1TB");
        assert_eq!(space.used_percent, "25.0%");
        assert_eq!(space.free_percent, "75.0%");

        let values = Values::new().with("space", space.to_values());
        assert_eq!(
            format("{space[used][gb]} / {space[total][gb]}", &values).unwrap(),
            "25.0GB / 100.0GB"
        );
    }

    #[test]
    fn decimal_display_controls_digits() {
        let info = DiskInfo::from_bytes(3 * GIB, GIB, 2 * GIB);
        assert_eq!(DiskSpace::new(&info, 0).used_percent, "33%");
        assert_eq!(DiskSpace::new(&info, 3).used_percent, "33.333%");
    }

    #[test]
    fn empty_filesystem_is_zero_percent_used() {
        let info = DiskInfo::from_bytes(0, 0, 0);
        assert_eq!(info.used_percent(), 0.0);
        assert_eq!(DiskSpace::new(&info, 1).free_percent, "100.0%");
    }

    #[test]
    fn group_rows_switch_to_terabytes() {
        let small = DiskInfo::from_bytes(500 * GIB, 100 * GIB, 400 * GIB);
        assert_eq!(group_row("/", &small, 1), "/: 400.0GB / 500.0GB");

        let large = DiskInfo::from_bytes(4096 * GIB, 1024 * GIB, 3072 * GIB);
        assert_eq!(group_row("/data", &large, 1), "/data: 3.0TB / 4.0TB");

        let mostly_full = DiskInfo::from_bytes(1536 * GIB, 1336 * GIB, 200 * GIB);
        assert_eq!(group_row("/data", &mostly_full, 1), "/data: 200.0GB / 1.5TB");
    }

    #[test]
    fn usage_bar_fills_proportionally() {
        assert_eq!(usage_bar(0.0), "░░░░░░░░░░");
        assert_eq!(usage_bar(42.0), "████░░░░░░");
        assert_eq!(usage_bar(100.0), "██████████");
        assert_eq!(usage_bar(140.0), "██████████");
    }

    #[test]
    fn reads_the_root_filesystem() {
        let info = DiskInfo::new("/").unwrap();
        assert!(info.total.get_bytes() >= info.used.get_bytes());
        assert!(DiskInfo::new("/definitely/not/a/mount").is_err());
    }

    #[test]
    fn config_validation() {
        assert!(DiskUsageConfig::default().validate().is_ok());
        let config = DiskUsageConfig {
            decimal_display: 4,
            ..DiskUsageConfig::default()
        };
        assert!(config.validate().is_err());
        let config = DiskUsageConfig {
            update_interval: Duration::ZERO,
            ..DiskUsageConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
