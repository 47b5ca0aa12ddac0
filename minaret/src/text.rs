//! Types to represent text to be displayed by widgets.
//!
//! This module is light on documentation. See the existing widget
//! implementations for inspiration.

use anyhow::Result;
use cairo::{Context, Surface};
use colors_transform::{Color as ColorTransform, Rgb};
use pango::{EllipsizeMode, FontDescription};
use std::fmt;

#[derive(Clone, Debug, PartialEq)]
pub struct Color {
    red: f64,
    green: f64,
    blue: f64,
}

macro_rules! color {
    ($name:ident,($r:expr, $g:expr, $b:expr)) => {
        #[allow(dead_code)]
        pub fn $name() -> Color {
            Color {
                red: $r,
                green: $g,
                blue: $b,
            }
        }
    };
}

impl Color {
    color!(red, (1.0, 0.0, 0.0));
    color!(green, (0.0, 1.0, 0.0));
    color!(blue, (0.0, 0.0, 1.0));
    color!(white, (1.0, 1.0, 1.0));
    color!(black, (0.0, 0.0, 0.0));
    color!(yellow, (1.0, 1.0, 0.0));
    color!(grey, (0.5, 0.5, 0.5));

    pub fn apply_to_context(&self, cr: &Context) {
        cr.set_source_rgb(self.red, self.green, self.blue);
    }

    pub fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        Self {
            red: r as f64 / 255.0,
            green: g as f64 / 255.0,
            blue: b as f64 / 255.0,
        }
    }

    /// Parse string as hex color
    /// # Example
    /// ```
    /// use minaret::text::Color;
    ///
    /// assert_eq!(Color::from_hex("#1e1e2e"), Color::from_rgb(30, 30, 46));
    /// assert_eq!(Color::from_hex("not hex"), Color::from_rgb(0, 0, 0));
    /// ```
    pub fn from_hex(hex: &str) -> Self {
        let rgb = match Rgb::from_hex_str(hex) {
            Ok(rgb) => rgb,
            Err(_) => Rgb::from(0.0, 0.0, 0.0),
        };

        Self {
            red: rgb.get_red() as f64 / 255.0,
            green: rgb.get_green() as f64 / 255.0,
            blue: rgb.get_blue() as f64 / 255.0,
        }
    }

    pub fn to_hex(&self) -> String {
        let channel = |value: f64| (value.clamp(0.0, 1.0) * 255.0).round() as u8;
        format!(
            "#{:02X}{:02X}{:02X}",
            channel(self.red),
            channel(self.green),
            channel(self.blue)
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Padding {
    left: f64,
    right: f64,
    top: f64,
    bottom: f64,
}

impl Padding {
    pub fn new(left: f64, right: f64, top: f64, bottom: f64) -> Padding {
        Padding {
            left,
            right,
            top,
            bottom,
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Font(FontDescription);

impl Font {
    pub fn new(name: &str) -> Font {
        Font(FontDescription::from_string(name))
    }
}

impl fmt::Debug for Font {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Attributes {
    pub font: Font,
    pub fg_color: Color,
    pub bg_color: Option<Color>,
    pub padding: Padding,
}

impl Attributes {
    /// Returns a copy of these attributes drawn in a different foreground color.
    pub fn with_fg(&self, fg_color: Color) -> Attributes {
        Attributes {
            fg_color,
            ..self.clone()
        }
    }

    /// Returns a copy of these attributes drawn on a different background.
    pub fn with_bg(&self, bg_color: Option<Color>) -> Attributes {
        Attributes {
            bg_color,
            ..self.clone()
        }
    }
}

fn create_pango_layout(cairo_context: &cairo::Context) -> pango::Layout {
    pangocairo::functions::create_layout(cairo_context)
}

fn show_pango_layout(cairo_context: &cairo::Context, layout: &pango::Layout) {
    pangocairo::functions::show_layout(cairo_context, layout);
}

#[derive(Clone, Debug, PartialEq)]
pub struct Text {
    pub attr: Attributes,
    pub text: String,
    pub stretch: bool,
    pub markup: bool,
}

impl Text {
    /// A plain (non-markup, non-stretching) piece of text.
    pub fn plain(attr: Attributes, text: impl Into<String>) -> Text {
        Text {
            attr,
            text: text.into(),
            stretch: false,
            markup: false,
        }
    }

    pub(crate) fn compute(self, surface: &Surface) -> Result<ComputedText> {
        let (width, height) = {
            let context = Context::new(surface)?;
            let layout = create_pango_layout(&context);
            if self.markup {
                layout.set_markup(&self.text);
            } else {
                layout.set_text(&self.text);
            }
            layout.set_font_description(Some(&self.attr.font.0));

            let padding = &self.attr.padding;
            let (text_width, text_height) = layout.pixel_size();
            let width = f64::from(text_width) + padding.left + padding.right;
            let height = f64::from(text_height) + padding.top + padding.bottom;
            (width, height)
        };

        Ok(ComputedText {
            attr: self.attr,
            text: self.text,
            stretch: self.stretch,
            x: 0.0,
            y: 0.0,
            width,
            height,
            markup: self.markup,
        })
    }
}

// This impl allows us to see whether a widget's text has changed without
// having to call the (relatively) expensive .compute().
impl PartialEq<ComputedText> for Text {
    fn eq(&self, other: &ComputedText) -> bool {
        self.attr == other.attr && self.text == other.text && self.stretch == other.stretch
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct ComputedText {
    pub attr: Attributes,
    pub text: String,
    pub stretch: bool,

    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub markup: bool,
}

impl ComputedText {
    /// Whether the horizontal bar coordinate `x` falls within this text.
    pub fn contains_x(&self, x: f64) -> bool {
        x >= self.x && x < self.x + self.width
    }

    pub fn render(&self, surface: &Surface) -> Result<()> {
        let context = Context::new(surface)?;
        let layout = create_pango_layout(&context);
        if self.markup {
            layout.set_markup(&self.text);
        } else {
            layout.set_text(&self.text);
        }
        layout.set_font_description(Some(&self.attr.font.0));

        context.translate(self.x, self.y);

        // Set the width/height on the Pango layout so that it word-wraps/ellipises.
        let padding = &self.attr.padding;
        let text_width = self.width - padding.left - padding.right;
        let text_height = self.height - padding.top - padding.bottom;
        layout.set_ellipsize(EllipsizeMode::End);
        layout.set_width(text_width as i32 * pango::SCALE);
        layout.set_height(text_height as i32 * pango::SCALE);

        let bg_color = &self.attr.bg_color.clone().unwrap_or_else(Color::black);
        bg_color.apply_to_context(&context);
        // `height` is the bar height: recompute_dimensions() stretches every
        // text to the tallest one.
        context.rectangle(0.0, 0.0, self.width, self.height);
        context.fill()?;

        self.attr.fg_color.apply_to_context(&context);
        context.translate(padding.left, padding.top);
        show_pango_layout(&context, &layout);

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::Color;

    #[test]
    fn hex_round_trips_through_rgb() {
        let color = Color::from_hex("#1e1e2e");
        assert_eq!(color, Color::from_rgb(30, 30, 46));
        assert_eq!(color.to_hex(), "#1E1E2E");
    }

    #[test]
    fn to_hex_saturates_channels() {
        assert_eq!(Color::white().to_hex(), "#FFFFFF");
        assert_eq!(Color::black().to_hex(), "#000000");
        assert_eq!(Color::grey().to_hex(), "#808080");
    }
}
