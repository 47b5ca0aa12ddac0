use crate::widgets::label::{format, truncate, Callbacks, LabelTemplate, Part, Styles, Values, View};
use anyhow::{bail, Result};
#[cfg(feature = "bluetooth")]
use anyhow::Context;
use async_stream::stream;
use log::debug;
use minaret::text::{Attributes, Color, Text};
use minaret::widgets::{Event, Widget, WidgetEvents, WidgetStream};
use std::time::Duration;
use tokio::time;

#[cfg(feature = "bluetooth")]
mod bluez;

/// A stuck bluetoothd must not hold up the widget's click handling.
#[cfg(feature = "bluetooth")]
const READ_TIMEOUT: Duration = Duration::from_secs(2);

/// A Bluetooth device known to the adapter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Device {
    pub name: String,
    pub address: String,
    pub connected: bool,
    pub paired: bool,
    /// Battery level in percent, if the device reports one.
    pub battery: Option<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BluetoothStatus {
    /// No powered adapter, or BlueZ can't be reached.
    Disabled,
    NoDevices,
    /// The connected and paired devices.
    Connected(Vec<Device>),
}

impl BluetoothStatus {
    pub fn from_devices(powered: bool, devices: Vec<Device>) -> BluetoothStatus {
        if !powered {
            return BluetoothStatus::Disabled;
        }
        let connected: Vec<_> = devices
            .into_iter()
            .filter(|device| device.connected && device.paired)
            .collect();
        if connected.is_empty() {
            BluetoothStatus::NoDevices
        } else {
            BluetoothStatus::Connected(connected)
        }
    }

    pub fn devices(&self) -> &[Device] {
        match self {
            BluetoothStatus::Connected(devices) => devices,
            BluetoothStatus::Disabled | BluetoothStatus::NoDevices => &[],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BluetoothIcons {
    pub bluetooth_on: String,
    pub bluetooth_off: String,
    pub bluetooth_connected: String,
}

impl Default for BluetoothIcons {
    fn default() -> Self {
        BluetoothIcons {
            bluetooth_on: "\u{f00af}".into(),
            bluetooth_off: "\u{f00b2}".into(),
            bluetooth_connected: "\u{f00b1}".into(),
        }
    }
}

/// Shows `alias` instead of the device's own name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceAlias {
    pub name: String,
    pub alias: String,
}

#[derive(Clone, Debug)]
pub struct BluetoothConfig {
    pub label: String,
    pub label_alt: String,
    pub label_no_device: String,
    pub label_device_separator: String,
    /// Maximum characters of each text part.
    pub max_length: Option<usize>,
    pub max_length_ellipsis: String,
    pub icons: BluetoothIcons,
    pub device_aliases: Vec<DeviceAlias>,
    pub show_battery: bool,
    /// Appended to each device name; `{battery}` is the level.
    pub battery_format: String,
    pub battery_threshold_low: u8,
    pub battery_threshold_critical: u8,
    pub update_interval: Duration,
    pub callbacks: Callbacks,
}

impl Default for BluetoothConfig {
    fn default() -> Self {
        BluetoothConfig {
            label: "<span class=\"icon\">{icon}</span>".into(),
            label_alt: "<span class=\"icon\">{icon}</span> {device_name}".into(),
            label_no_device: "No devices connected".into(),
            label_device_separator: ", ".into(),
            max_length: None,
            max_length_ellipsis: "...".into(),
            icons: BluetoothIcons::default(),
            device_aliases: Vec::new(),
            show_battery: true,
            battery_format: " ({battery}%)".into(),
            battery_threshold_low: 20,
            battery_threshold_critical: 10,
            update_interval: Duration::from_millis(3000),
            callbacks: Callbacks::default(),
        }
    }
}

impl BluetoothConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_length == Some(0) {
            bail!("max_length must be at least 1");
        }
        if self.battery_threshold_low > 100 || self.battery_threshold_critical > 100 {
            bail!("battery thresholds must be between 0 and 100");
        }
        if self.update_interval.is_zero() {
            bail!("update_interval must be positive");
        }
        Ok(())
    }

    fn display_name<'a>(&'a self, device: &'a Device) -> &'a str {
        self.device_aliases
            .iter()
            .find(|alias| alias.name.trim() == device.name.trim())
            .map_or(device.name.as_str(), |alias| alias.alias.as_str())
    }

    /// The `{icon}`, `{device_name}`, `{device_count}` and `{battery}`
    /// placeholders.
    pub fn values(&self, status: &BluetoothStatus) -> Result<Values> {
        let icon = match status {
            BluetoothStatus::Disabled => &self.icons.bluetooth_off,
            BluetoothStatus::NoDevices => &self.icons.bluetooth_on,
            BluetoothStatus::Connected(_) => &self.icons.bluetooth_connected,
        };

        let devices = status.devices();
        let device_name = if devices.is_empty() {
            self.label_no_device.clone()
        } else {
            let names = devices
                .iter()
                .map(|device| {
                    let name = self.display_name(device);
                    match device.battery {
                        Some(level) if self.show_battery => {
                            let level = Values::new().with("battery", level.to_string());
                            Ok(format!("{name}{}", format(&self.battery_format, &level)?))
                        }
                        _ => Ok(name.to_owned()),
                    }
                })
                .collect::<Result<Vec<_>>>()?;
            names.join(&self.label_device_separator)
        };

        let battery = match devices.iter().find_map(|device| device.battery) {
            Some(level) => format!("{level}%"),
            None => devices.first().map(|device| device.name.clone()).unwrap_or_default(),
        };

        Ok(Values::new()
            .with("icon", icon.as_str())
            .with("device_name", device_name)
            .with("device_count", devices.len().to_string())
            .with("battery", battery))
    }

    /// `battery-critical` or `battery-low` from the lowest known level.
    pub fn battery_class(&self, status: &BluetoothStatus) -> Option<&'static str> {
        let lowest = status.devices().iter().filter_map(|device| device.battery).min()?;
        if lowest <= self.battery_threshold_critical {
            Some("battery-critical")
        } else if lowest <= self.battery_threshold_low {
            Some("battery-low")
        } else {
            None
        }
    }

    /// The device list shown in the card.
    pub fn card_lines(&self, status: &BluetoothStatus) -> Vec<String> {
        let devices = status.devices();
        if devices.is_empty() {
            return vec![self.label_no_device.clone()];
        }

        let mut lines = vec!["Connected devices".to_owned()];
        lines.extend(devices.iter().map(|device| {
            let name = self.display_name(device);
            match device.battery {
                Some(level) => format!(" {name} ({level}%)"),
                None => format!(" {name}"),
            }
        }));
        lines
    }
}

/// Default classes for the bluetooth widget: battery warnings and the card.
pub fn default_styles(base: Attributes) -> Styles {
    Styles::new(base.clone())
        .with_class("battery-low", base.with_fg(Color::yellow()))
        .with_class("battery-critical", base.with_fg(Color::red()))
        .with_class("bluetooth-card-header", base.with_fg(Color::grey()))
}

/// Shows whether Bluetooth is on and which devices are connected.
///
/// Reads BlueZ over the system D-Bus. Without the `bluetooth` feature the
/// widget always shows the adapter as disabled.
pub struct Bluetooth {
    styles: Styles,
    config: BluetoothConfig,
    label: LabelTemplate,
    label_alt: LabelTemplate,
    view: View,
}

impl Bluetooth {
    /// Creates a new [`Bluetooth`] widget.
    ///
    /// # Examples
    ///
    /// ```
    /// # use minaret::*;
    /// # use minaret::text::*;
    /// # use minaret_contrib::widgets::bluetooth::*;
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
    /// minaret.add_widget(Bluetooth::new(
    ///     default_styles(attr),
    ///     BluetoothConfig {
    ///         device_aliases: vec![DeviceAlias {
    ///             name: "WH-1000XM4".into(),
    ///             alias: "Headphones".into(),
    ///         }],
    ///         max_length: Some(24),
    ///         ..BluetoothConfig::default()
    ///     },
    /// )?);
    /// # Ok(())
    /// # }
    /// # fn main() { run().unwrap(); }
    /// ```
    pub fn new(styles: Styles, config: BluetoothConfig) -> Result<Self> {
        config.validate()?;
        Ok(Bluetooth {
            label: LabelTemplate::parse(&config.label)?,
            label_alt: LabelTemplate::parse(&config.label_alt)?,
            styles,
            config,
            view: View::default(),
        })
    }

    fn render(&self, status: &BluetoothStatus) -> Result<Vec<Text>> {
        let values = self.config.values(status)?;
        let template = self.view.pick(&self.label, &self.label_alt);
        let mut texts = template.render(&self.styles, self.config.battery_class(status), |part| match part {
            Part::Icon { content, .. } => format(content, &values),
            Part::Text(text) => {
                let text = format(text, &values)?;
                Ok(match self.config.max_length {
                    Some(max) => truncate(&text, max, &self.config.max_length_ellipsis),
                    None => text,
                })
            }
        })?;

        if self.view.card {
            let lines = self.config.card_lines(status);
            let mut lines = lines.into_iter();
            if let Some(header) = lines.next() {
                texts.push(Text::plain(self.styles.get("bluetooth-card-header").clone(), header));
            }
            texts.extend(lines.map(|line| Text::plain(self.styles.base().clone(), line)));
        }
        Ok(texts)
    }
}

/// Polls BlueZ, reconnecting to the system bus after failures.
#[derive(Default)]
struct Probe {
    #[cfg(feature = "bluetooth")]
    connection: Option<zbus::Connection>,
}

impl Probe {
    #[cfg(feature = "bluetooth")]
    async fn status(&mut self) -> BluetoothStatus {
        if self.connection.is_none() {
            match zbus::Connection::system().await {
                Ok(connection) => self.connection = Some(connection),
                Err(err) => {
                    debug!("Can't connect to the system bus: {err}");
                    return BluetoothStatus::Disabled;
                }
            }
        }
        let Some(connection) = self.connection.clone() else {
            return BluetoothStatus::Disabled;
        };

        match within(READ_TIMEOUT, bluez::read_status(&connection)).await {
            Ok(status) => status,
            Err(err) => {
                debug!("Can't read BlueZ state: {err:#}");
                self.connection = None;
                BluetoothStatus::Disabled
            }
        }
    }

    #[cfg(not(feature = "bluetooth"))]
    async fn status(&mut self) -> BluetoothStatus {
        debug!("Built without the bluetooth feature");
        BluetoothStatus::Disabled
    }
}

#[cfg(feature = "bluetooth")]
async fn within<T>(limit: Duration, read: impl std::future::Future<Output = Result<T>>) -> Result<T> {
    time::timeout(limit, read)
        .await
        .with_context(|| format!("No answer from BlueZ within {limit:?}"))?
}

impl Widget for Bluetooth {
    fn into_stream(mut self: Box<Self>, mut events: WidgetEvents) -> Result<WidgetStream> {
        let mut interval = time::interval(self.config.update_interval);
        let stream = stream! {
            let mut probe = Probe::default();
            let mut status = BluetoothStatus::Disabled;
            loop {
                tokio::select! {
                    _ = interval.tick() => status = probe.status().await,
                    Some(Event::Click(button)) = events.recv() => {
                        self.view.apply(self.config.callbacks.for_button(button));
                    }
                }
                yield self.render(&status);
            }
        };

        Ok(Box::pin(stream))
    }
}
