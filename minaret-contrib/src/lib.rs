//! Widgets for the minaret status bar.
//!
//! - [`widgets::bluetooth`] shows the adapter state and connected devices.
//! - [`widgets::disk_usage`] shows how full a filesystem is.
//! - [`widgets::prayer`] counts down to the next prayer time.
//!
//! Every widget renders its labels from a template (see
//! [`widgets::label`]) and reacts to clicks through configurable callbacks.

pub mod widgets;
