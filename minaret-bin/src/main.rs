use anyhow::Result;
use log::info;
use minaret::text::*;
use minaret::{Minaret, Position};
use minaret_contrib::widgets::bluetooth::{self, Bluetooth, BluetoothConfig};
use minaret_contrib::widgets::disk_usage::{self, DiskUsage, DiskUsageConfig};
use minaret_contrib::widgets::label::Callback;
use minaret_contrib::widgets::prayer::{self, PrayerConfig, PrayerTime};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("minaret=info,minaret_contrib=info"))
        .init();

    let attr = Attributes {
        font: Font::new("Ubuntu Mono Bold 14"),
        fg_color: Color::white(),
        bg_color: None,
        padding: Padding::new(8.0, 8.0, 0.0, 0.0),
    };

    let mut minaret = Minaret::new(Position::Bottom);

    let prayer_config = PrayerConfig {
        city: "Jakarta".into(),
        country: "ID".into(),
        method: 20,
        ..PrayerConfig::default()
    };
    info!("Prayer times for {}, {}", prayer_config.city, prayer_config.country);
    minaret.add_widget(PrayerTime::new(prayer::default_styles(attr.clone()), prayer_config)?);

    let disk_config = DiskUsageConfig {
        path: "/home".into(),
        volume_label: Some("home".into()),
        group_paths: vec!["/".into(), "/home".into()],
        ..DiskUsageConfig::default()
    };
    minaret.add_widget(DiskUsage::new(disk_usage::default_styles(attr.clone()), disk_config)?);

    let mut bluetooth_config = BluetoothConfig {
        max_length: Some(24),
        ..BluetoothConfig::default()
    };
    bluetooth_config.callbacks.on_middle = "update_label".parse::<Callback>()?;
    minaret.add_widget(Bluetooth::new(bluetooth::default_styles(attr), bluetooth_config)?);

    minaret.run()?;

    Ok(())
}
