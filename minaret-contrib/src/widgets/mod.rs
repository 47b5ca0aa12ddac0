/// Bluetooth widget to show the adapter state and connected devices
pub mod bluetooth;
/// Disk usage widget to show current usage and remaining free space
pub mod disk_usage;
/// Label templates, styles and click callbacks shared by the widgets
pub mod label;
/// Prayer time widget to count down to the next prayer
pub mod prayer;
