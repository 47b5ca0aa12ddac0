//! Types for creating new widgets.

use crate::text::Text;
use anyhow::Result;
use futures::stream::Stream;
use std::pin::Pin;
use tokio::sync::mpsc::UnboundedReceiver;

/// The stream of `Vec<Text>` returned by each widget.
///
/// This simple type alias makes referring to this stream a little easier. For
/// more information on the stream (and how widgets are structured), please
/// refer to the documentation on the [`Widget`] trait.
///
/// Any errors on the stream are logged but do not affect the runtime of the
/// main [`crate::Minaret`] instance.
pub type WidgetStream = Pin<Box<dyn Stream<Item = Result<Vec<Text>>>>>;

/// The receiving half of the channel that delivers [`Event`]s to a widget.
///
/// Widgets that don't react to input can simply drop it.
pub type WidgetEvents = UnboundedReceiver<Event>;

/// A mouse button, decoded from the X11 button number.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
    ScrollUp,
    ScrollDown,
    Other(u8),
}

impl From<u8> for MouseButton {
    fn from(detail: u8) -> Self {
        match detail {
            1 => MouseButton::Left,
            2 => MouseButton::Middle,
            3 => MouseButton::Right,
            4 => MouseButton::ScrollUp,
            5 => MouseButton::ScrollDown,
            n => MouseButton::Other(n),
        }
    }
}

/// Input delivered to a widget by the bar.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Event {
    /// One of the widget's texts was clicked.
    Click(MouseButton),
}

/// The main trait implemented by all widgets.
///
/// A widget is essentially just a [`futures::stream::Stream`] of texts, and
/// this trait is the standard way of accessing that stream. The bar hands
/// each widget the receiving end of its event channel, over which clicks on
/// the widget's texts arrive.
///
/// See the [`WidgetStream`] type alias for the exact type of stream that
/// should be returned.
pub trait Widget {
    fn into_stream(self: Box<Self>, events: WidgetEvents) -> Result<WidgetStream>;
}

#[cfg(test)]
mod test {
    use super::MouseButton;

    #[test]
    fn decodes_x11_buttons() {
        assert_eq!(MouseButton::from(1), MouseButton::Left);
        assert_eq!(MouseButton::from(2), MouseButton::Middle);
        assert_eq!(MouseButton::from(3), MouseButton::Right);
        assert_eq!(MouseButton::from(4), MouseButton::ScrollUp);
        assert_eq!(MouseButton::from(5), MouseButton::ScrollDown);
        assert_eq!(MouseButton::from(8), MouseButton::Other(8));
    }
}
