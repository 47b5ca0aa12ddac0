use super::{BluetoothStatus, Device};
use anyhow::{Context, Result};
use std::collections::HashMap;
use zbus::fdo::ObjectManagerProxy;
use zbus::zvariant::{OwnedValue, Value};
use zbus::Connection;

const BLUEZ: &str = "org.bluez";
const ADAPTER: &str = "org.bluez.Adapter1";
const DEVICE: &str = "org.bluez.Device1";
const BATTERY: &str = "org.bluez.Battery1";

type Properties = HashMap<String, OwnedValue>;

pub(super) async fn read_status(connection: &Connection) -> Result<BluetoothStatus> {
    let manager = ObjectManagerProxy::builder(connection)
        .destination(BLUEZ)?
        .path("/")?
        .build()
        .await?;
    let objects = manager
        .get_managed_objects()
        .await
        .context("GetManagedObjects on org.bluez failed")?;

    let mut powered = false;
    let mut devices = Vec::new();
    for interfaces in objects.values() {
        let interface = |name: &str| {
            interfaces
                .iter()
                .find(|(interface, _)| interface.as_str() == name)
                .map(|(_, properties)| properties)
        };

        if let Some(adapter) = interface(ADAPTER) {
            powered |= bool_property(adapter, "Powered");
        }
        if let Some(properties) = interface(DEVICE) {
            devices.push(device(properties, interface(BATTERY)));
        }
    }
    devices.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(BluetoothStatus::from_devices(powered, devices))
}

/// A `Device1` object, with its `Battery1` interface if it has one.
fn device(properties: &Properties, battery: Option<&Properties>) -> Device {
    let address = str_property(properties, "Address").unwrap_or_default();
    let name = str_property(properties, "Name")
        .or_else(|| str_property(properties, "Alias"))
        .unwrap_or_else(|| address.clone());
    Device {
        name,
        address,
        connected: bool_property(properties, "Connected"),
        paired: bool_property(properties, "Paired"),
        battery: battery.and_then(|battery| u8_property(battery, "Percentage")),
    }
}

fn bool_property(properties: &Properties, name: &str) -> bool {
    matches!(properties.get(name).map(|value| &**value), Some(Value::Bool(true)))
}

fn u8_property(properties: &Properties, name: &str) -> Option<u8> {
    match properties.get(name).map(|value| &**value) {
        Some(Value::U8(level)) => Some(*level),
        _ => None,
    }
}

fn str_property(properties: &Properties, name: &str) -> Option<String> {
    match properties.get(name).map(|value| &**value) {
        Some(Value::Str(text)) => Some(text.as_str().to_owned()),
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn properties(entries: Vec<(&str, Value)>) -> Properties {
        entries
            .into_iter()
            .map(|(name, value)| (name.to_owned(), OwnedValue::try_from(value).unwrap()))
            .collect()
    }

    #[test]
    fn decodes_device_properties() {
        let headset = properties(vec![
            ("Address", Value::from("AA:BB:CC:DD:EE:FF")),
            ("Name", Value::from("WH-1000XM4")),
            ("Alias", Value::from("Headphones")),
            ("Connected", Value::from(true)),
            ("Paired", Value::from(true)),
        ]);
        let battery = properties(vec![("Percentage", Value::from(55u8))]);

        assert_eq!(
            device(&headset, Some(&battery)),
            Device {
                name: "WH-1000XM4".into(),
                address: "AA:BB:CC:DD:EE:FF".into(),
                connected: true,
                paired: true,
                battery: Some(55),
            }
        );
        assert_eq!(device(&headset, None).battery, None);
    }

    #[test]
    fn device_name_falls_back_to_alias_then_address() {
        let aliased = properties(vec![
            ("Address", Value::from("AA:BB:CC:DD:EE:FF")),
            ("Alias", Value::from("Buds")),
            ("Connected", Value::from(false)),
        ]);
        let device_alias = device(&aliased, None);
        assert_eq!(device_alias.name, "Buds");
        assert!(!device_alias.connected);
        assert!(!device_alias.paired);

        let bare = properties(vec![("Address", Value::from("AA:BB:CC:DD:EE:FF"))]);
        assert_eq!(device(&bare, None).name, "AA:BB:CC:DD:EE:FF");
    }

    #[test]
    fn mistyped_properties_are_ignored() {
        let odd = properties(vec![("Connected", Value::from("yes")), ("Percentage", Value::from(55u32))]);
        assert!(!bool_property(&odd, "Connected"));
        assert_eq!(u8_property(&odd, "Percentage"), None);
        assert_eq!(str_property(&odd, "Connected").as_deref(), Some("yes"));
    }
}
