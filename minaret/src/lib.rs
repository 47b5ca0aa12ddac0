//! A small X11 status bar with clickable widgets.
//!
//! Minaret is a library for building your own status bar. Widgets are
//! asynchronous streams of text (driven by [`tokio`]) which the bar lays out
//! left to right. Clicking on a widget's text sends the widget an
//! [`Event`](crate::widgets::Event), which lets widgets toggle between
//! labels or expand a detail card in place.
//!
//! # How to use
//!
//! In normal usage, you will create a new binary project that relies on the
//! `minaret` and `minaret-contrib` crates, and customize it through options
//! passed to the main [`Minaret`] object and its widgets. The configuration
//! is done entirely in code.
//!
//! A simple example of a binary using Minaret is:
//!
//! ```no_run
//! use minaret::text::*;
//! use minaret::{Minaret, Position};
//! use anyhow::Result;
//!
//! fn main() -> Result<()> {
//!     let attr = Attributes {
//!         font: Font::new("Envy Code R 21"),
//!         fg_color: Color::white(),
//!         bg_color: None,
//!         padding: Padding::new(8.0, 8.0, 0.0, 0.0),
//!     };
//!
//!     let bar = Minaret::new(Position::Top);
//!     // bar.add_widget(...);
//!     bar.run()?;
//!
//!     Ok(())
//! }
//! ```
//!
//! A more complete example is given in [`minaret-bin/src/main.rs`].
//!
//! # Widgets
//!
//! The minaret-contrib crate contains the widgets:
//!
//! - **Bluetooth** - Shows the adapter state and connected devices (BlueZ).
//! - **Disk Usage** - Shows the usage of a mounted filesystem, with a card
//!   listing a group of filesystems.
//! - **Prayer** - Counts down to the next prayer time, with a card listing
//!   the whole day.
//!
//! # Dependencies
//!
//! In addition to the Rust dependencies in `Cargo.toml`, Minaret also depends
//! on these system libraries:
//!
//!  - `xcb-util`: `xcb-ewmh` / `xcb-icccm` / `xcb-keysyms`
//!  - `x11-xcb`
//!  - `pango`
//!  - `cairo`
//!  - `pangocairo`
//!
//! # Creating new widgets
//!
//! Implement the [`Widget`](crate::widgets::Widget) trait. The widgets in
//! [`minaret-contrib`] should give you some examples on which to base your
//! work.
//!
//! [`tokio`]: https://tokio.rs/
//! [`minaret-bin/src/main.rs`]: ../minaret-bin/src/main.rs
//! [`minaret-contrib`]: ../minaret-contrib

#![recursion_limit = "256"]

mod bar;
pub mod text;
pub mod widgets;
mod xcb;

use anyhow::Result;
use log::{debug, error};
use tokio::runtime::Runtime;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task;
use tokio_stream::{StreamExt, StreamMap};

use crate::bar::Bar;
use crate::widgets::{Event, Widget};
use crate::xcb::XcbEventStream;

pub use bar::Offset;
pub use bar::Position;

/// The main object, used to instantiate a bar.
///
/// Widgets can be added using the [`add_widget()`] method. Once configured,
/// the [`run()`] method will take ownership of the instance and run it until
/// the process is killed or an error occurs.
///
/// [`add_widget()`]: #method.add_widget
/// [`run()`]: #method.run
pub struct Minaret {
    /// The position of the bar
    position: Position,
    /// The list of widgets attached to the bar
    widgets: Vec<Box<dyn Widget>>,
    /// The (x,y) offset of the bar
    /// It can be used in order to run multiple bars in a multi-monitor setup
    offset: Offset,
    /// The (optional) width of the bar
    /// It can be used in order to run multiple bars in a multi-monitor setup
    width: Option<u16>,
}

impl Minaret {
    /// Creates a new `Minaret` instance.
    ///
    /// This creates a new bar at either the top or bottom of the screen,
    /// depending on the value of the [`Position`] enum.
    ///
    /// [`Position`]: enum.Position.html
    pub fn new(position: Position) -> Self {
        Self {
            position,
            widgets: Vec::new(),
            offset: Offset::default(),
            width: None,
        }
    }

    /// Returns a new instance of `Minaret` with the specified width.
    ///
    /// Together with [`with_offset()`] this allows a multiple bar setup.
    ///
    /// [`with_offset()`]: #method.with_offset
    pub fn with_width(self, width: Option<u16>) -> Self {
        Self { width, ..self }
    }

    /// Returns a new instance of `Minaret` with the specified offset.
    ///
    /// Together with [`with_width()`] this allows a multiple bar setup.
    ///
    /// [`with_width()`]: #method.with_width
    pub fn with_offset(self, x: i16, y: i16) -> Self {
        Self {
            offset: Offset { x, y },
            ..self
        }
    }

    /// Adds a widget to the bar.
    ///
    /// Takes ownership of the [`Widget`] and adds it to the right of any
    /// existing widgets.
    ///
    /// [`Widget`]: widgets/trait.Widget.html
    pub fn add_widget<W>(&mut self, widget: W)
    where
        W: Widget + 'static,
    {
        self.widgets.push(Box::new(widget));
    }

    /// Runs the bar.
    ///
    /// This method takes ownership of the instance and runs it until either
    /// the process is terminated, or an internal error is returned.
    pub fn run(self) -> Result<()> {
        // Widgets run on a LocalSet as their streams aren't Send. Network
        // fetches are spawned onto the runtime's worker threads.
        let rt = Runtime::new()?;
        let local = task::LocalSet::new();
        local.block_on(&rt, self.run_inner())?;
        Ok(())
    }

    async fn run_inner(self) -> Result<()> {
        let mut bar = Bar::new(self.position, self.width, self.offset)?;

        let mut widgets = StreamMap::with_capacity(self.widgets.len());
        let mut senders: Vec<UnboundedSender<Event>> = Vec::with_capacity(self.widgets.len());
        for widget in self.widgets {
            let idx = bar.add_content(Vec::new())?;
            let (tx, rx) = mpsc::unbounded_channel();
            senders.push(tx);
            widgets.insert(idx, widget.into_stream(rx)?);
        }

        let mut event_stream = XcbEventStream::new(bar.connection().clone())?;
        task::spawn_local(async move {
            loop {
                tokio::select! {
                    // Pass each XCB event to the Bar, forwarding clicks to
                    // the widget underneath the pointer.
                    Some(event) = event_stream.next() => {
                        match bar.process_event(event) {
                            Err(err) => error!("Error processing XCB event: {err}"),
                            Ok(Some((idx, button))) => dispatch(&senders, idx, Event::Click(button)),
                            Ok(None) => (),
                        }
                    },

                    // Each time a widget yields new values, pass to the bar.
                    // Ignore (but log) any errors from widgets.
                    Some((idx, result)) = widgets.next() => {
                        match result {
                            Err(err) => error!("Error from widget {idx}: {err:#}"),
                            Ok(texts) => {
                                if let Err(err) = bar.update_content(idx, texts) {
                                    error!("Error updating widget {idx}: {err:#}");
                                }
                            }
                        }
                    }
                }
            }
        })
        .await?;

        Ok(())
    }
}

fn dispatch(senders: &[UnboundedSender<Event>], idx: usize, event: Event) {
    match senders.get(idx) {
        Some(tx) => {
            if tx.send(event).is_err() {
                debug!("Widget {idx} ignores events; dropping {event:?}");
            }
        }
        None => debug!("No widget at index {idx} for {event:?}"),
    }
}

#[cfg(test)]
mod test {
    use super::dispatch;
    use crate::widgets::{Event, MouseButton};
    use tokio::sync::mpsc;

    #[test]
    fn dispatch_delivers_to_the_clicked_widget_only() {
        let (tx0, mut rx0) = mpsc::unbounded_channel();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let senders = vec![tx0, tx1];

        dispatch(&senders, 1, Event::Click(MouseButton::Right));

        assert!(rx0.try_recv().is_err());
        assert_eq!(rx1.try_recv().ok(), Some(Event::Click(MouseButton::Right)));
    }

    #[test]
    fn dispatch_tolerates_dropped_receivers_and_bad_indices() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let senders = vec![tx];

        dispatch(&senders, 0, Event::Click(MouseButton::Left));
        dispatch(&senders, 5, Event::Click(MouseButton::Left));
    }
}
