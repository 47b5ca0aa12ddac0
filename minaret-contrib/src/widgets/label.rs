use anyhow::{anyhow, bail, Context, Error, Result};
use minaret::text::{Attributes, Text};
use minaret::widgets::MouseButton;
use regex::Regex;
use std::collections::HashMap;
use std::str::FromStr;

/// One piece of a label template.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Part {
    /// A `<span class="...">...</span>` segment, usually an icon glyph.
    Icon { class: String, content: String },
    /// Everything between spans, trimmed.
    Text(String),
}

/// A label split into icon spans and text.
///
/// Labels are written like `<span class="icon">\u{f0b8e}</span> {next_prayer}`:
/// each span becomes its own [`Part::Icon`] (styled by its class) and the text
/// around the spans becomes [`Part::Text`] (styled as `label`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabelTemplate {
    parts: Vec<Part>,
}

impl LabelTemplate {
    pub fn parse(template: &str) -> Result<LabelTemplate> {
        let span = Regex::new(r"<span.*?>.*?</span>")
            .context("Failed to compile regex for label spans")?;
        let class_attr = Regex::new(r#"class=(?:"([^"]+)"|'([^']+)')"#)
            .context("Failed to compile regex for span classes")?;
        let tags = Regex::new(r"<span.*?>|</span>")
            .context("Failed to compile regex for span tags")?;

        let mut parts = Vec::new();
        let push_text = |text: &str, parts: &mut Vec<Part>| {
            let text = text.trim();
            if !text.is_empty() {
                parts.push(Part::Text(text.to_owned()));
            }
        };

        let mut last = 0;
        for mat in span.find_iter(template) {
            push_text(&template[last..mat.start()], &mut parts);
            let segment = mat.as_str();
            let class = class_attr
                .captures(segment)
                .and_then(|caps| caps.get(1).or_else(|| caps.get(2)))
                .map_or("icon", |m| m.as_str())
                .to_owned();
            let content = tags.replace_all(segment, "").trim().to_owned();
            parts.push(Part::Icon { class, content });
            last = mat.end();
        }
        push_text(&template[last..], &mut parts);

        Ok(LabelTemplate { parts })
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    /// Turns each part into a [`Text`].
    ///
    /// `text_for` produces the string for each part. Text parts are styled
    /// with the `label` class and icon parts with their own class; when a
    /// `modifier` is given (e.g. `prayer-time-soon`) it is appended to both,
    /// so a style registered for the modifier takes precedence.
    pub fn render<F>(&self, styles: &Styles, modifier: Option<&str>, mut text_for: F) -> Result<Vec<Text>>
    where
        F: FnMut(&Part) -> Result<String>,
    {
        self.parts
            .iter()
            .map(|part| {
                let base = match part {
                    Part::Icon { class, .. } => class.as_str(),
                    Part::Text(_) => "label",
                };
                let class = match modifier {
                    Some(modifier) => format!("{base} {modifier}"),
                    None => base.to_owned(),
                };
                Ok(Text::plain(styles.get(&class).clone(), text_for(part)?))
            })
            .collect()
    }
}

/// A placeholder value: either text, or a map indexed with `{name[key]}`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    Text(String),
    Map(Values),
}

impl From<String> for Value {
    fn from(text: String) -> Value {
        Value::Text(text)
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Value {
        Value::Text(text.to_owned())
    }
}

impl From<Values> for Value {
    fn from(values: Values) -> Value {
        Value::Map(values)
    }
}

/// Named values substituted into label templates by [`format`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Values(HashMap<String, Value>);

impl Values {
    pub fn new() -> Values {
        Values::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Values {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    fn lookup(&self, field: &str) -> Result<&str> {
        let (name, mut rest) = match field.find('[') {
            Some(idx) => (&field[..idx], &field[idx..]),
            None => (field, ""),
        };
        let mut value = self
            .get(name)
            .ok_or_else(|| anyhow!("Unknown placeholder {{{field}}}"))?;

        while !rest.is_empty() {
            let close = match (rest.starts_with('['), rest.find(']')) {
                (true, Some(close)) => close,
                _ => bail!("Malformed placeholder {{{field}}}"),
            };
            let key = &rest[1..close];
            rest = &rest[close + 1..];
            value = match value {
                Value::Map(map) => map
                    .get(key)
                    .ok_or_else(|| anyhow!("Unknown key {key:?} in placeholder {{{field}}}"))?,
                Value::Text(_) => bail!("Placeholder {{{field}}} indexes into text"),
            };
        }

        match value {
            Value::Text(text) => Ok(text.as_str()),
            Value::Map(_) => bail!("Placeholder {{{field}}} needs an index"),
        }
    }
}

/// Substitutes `{name}` and `{name[key]...}` placeholders in `template`.
///
/// `{{` and `}}` produce literal braces.
///
/// # Examples
///
/// ```
/// use minaret_contrib::widgets::label::{format, Values};
///
/// let space = Values::new().with("used", Values::new().with("gb", "12.5GB"));
/// let values = Values::new().with("space", space).with("volume_label", "/home");
/// let text = format("{volume_label}: {space[used][gb]}", &values).unwrap();
/// assert_eq!(text, "/home: 12.5GB");
/// ```
pub fn format(template: &str, values: &Values) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut field = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(c) => field.push(c),
                        None => bail!("Unterminated placeholder in {template:?}"),
                    }
                }
                out.push_str(values.lookup(&field)?);
            }
            c => out.push(c),
        }
    }
    Ok(out)
}

/// Truncates `text` to `max_chars` characters, appending `ellipsis` if
/// anything was cut.
pub fn truncate(text: &str, max_chars: usize, ellipsis: &str) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}{}", &text[..idx], ellipsis),
        None => text.to_owned(),
    }
}

/// Maps style classes to [`Attributes`], like a tiny stylesheet.
#[derive(Clone, Debug)]
pub struct Styles {
    base: Attributes,
    classes: HashMap<String, Attributes>,
}

impl Styles {
    pub fn new(base: Attributes) -> Styles {
        Styles {
            base,
            classes: HashMap::new(),
        }
    }

    pub fn with_class(mut self, class: impl Into<String>, attr: Attributes) -> Styles {
        self.classes.insert(class.into(), attr);
        self
    }

    pub fn base(&self) -> &Attributes {
        &self.base
    }

    /// Looks up a space separated class list.
    ///
    /// The whole list is tried first, then each class from last to first,
    /// falling back to the base attributes.
    pub fn get(&self, class: &str) -> &Attributes {
        self.classes
            .get(class)
            .or_else(|| {
                class
                    .split_whitespace()
                    .rev()
                    .find_map(|class| self.classes.get(class))
            })
            .unwrap_or(&self.base)
    }
}

/// What a click does.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Callback {
    /// Switch between `label` and `label_alt`.
    ToggleLabel,
    /// Show or hide the widget's detail card.
    ToggleCard,
    /// Re-render immediately.
    UpdateLabel,
    /// Re-fetch remote data, for widgets that have any.
    FetchData,
    DoNothing,
}

impl FromStr for Callback {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "toggle_label" => Ok(Callback::ToggleLabel),
            "toggle_card" | "toggle_group" => Ok(Callback::ToggleCard),
            "update_label" => Ok(Callback::UpdateLabel),
            "fetch_data" | "fetch_prayer_time_data" => Ok(Callback::FetchData),
            "do_nothing" => Ok(Callback::DoNothing),
            _ => Err(anyhow!("Unknown callback: {}", s)),
        }
    }
}

/// The callback bound to each mouse button.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Callbacks {
    pub on_left: Callback,
    pub on_middle: Callback,
    pub on_right: Callback,
}

impl Default for Callbacks {
    fn default() -> Self {
        Callbacks {
            on_left: Callback::ToggleLabel,
            on_middle: Callback::DoNothing,
            on_right: Callback::ToggleCard,
        }
    }
}

impl Callbacks {
    pub fn for_button(&self, button: MouseButton) -> Callback {
        match button {
            MouseButton::Left => self.on_left,
            MouseButton::Middle => self.on_middle,
            MouseButton::Right => self.on_right,
            _ => Callback::DoNothing,
        }
    }
}

/// The toggles shared by every widget: alternate label and detail card.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct View {
    pub alt: bool,
    pub card: bool,
}

impl View {
    /// Applies the toggle callbacks; anything else leaves the view alone.
    pub fn apply(&mut self, callback: Callback) {
        match callback {
            Callback::ToggleLabel => self.alt = !self.alt,
            Callback::ToggleCard => self.card = !self.card,
            Callback::UpdateLabel | Callback::FetchData | Callback::DoNothing => (),
        }
    }

    pub fn pick<'a>(&self, label: &'a LabelTemplate, label_alt: &'a LabelTemplate) -> &'a LabelTemplate {
        if self.alt {
            label_alt
        } else {
            label
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use minaret::text::{Color, Font, Padding};

    fn attr(fg_color: Color) -> Attributes {
        Attributes {
            font: Font::new("Sans 10"),
            fg_color,
            bg_color: None,
            padding: Padding::new(0.0, 0.0, 0.0, 0.0),
        }
    }

    #[test]
    fn parses_spans_and_text() {
        let template =
            LabelTemplate::parse(r#"<span class="prayer-icon">X</span> {next_prayer} <span>Y</span> in {time_until}"#)
                .unwrap();
        assert_eq!(
            template.parts(),
            &[
                Part::Icon {
                    class: "prayer-icon".into(),
                    content: "X".into()
                },
                Part::Text("{next_prayer}".into()),
                Part::Icon {
                    class: "icon".into(),
                    content: "Y".into()
                },
                Part::Text("in {time_until}".into()),
            ]
        );
    }

    #[test]
    fn parses_single_quoted_classes_and_skips_blank_text() {
        let template = LabelTemplate::parse("  <span class='bt'> B </span>   ").unwrap();
        assert_eq!(
            template.parts(),
            &[Part::Icon {
                class: "bt".into(),
                content: "B".into()
            }]
        );
    }

    #[test]
    fn formats_nested_placeholders_and_escapes() {
        let space = Values::new().with(
            "free",
            Values::new().with("percent", "40.0%").with("gb", "100.0GB"),
        );
        let values = Values::new().with("space", space).with("volume_label", "/");
        let text = format("{{{volume_label}}} {space[free][percent]} of {space[free][gb]}", &values).unwrap();
        assert_eq!(text, "{/} 40.0% of 100.0GB");
    }

    #[test]
    fn format_reports_bad_placeholders() {
        let values = Values::new()
            .with("icon", "B")
            .with("space", Values::new().with("used", "1"));
        assert!(format("{device}", &values).is_err());
        assert!(format("{icon[0]}", &values).is_err());
        assert!(format("{space}", &values).is_err());
        assert!(format("{space[free]}", &values).is_err());
        assert!(format("{space[used", &values).is_err());
        assert!(format("{icon", &values).is_err());
        assert_eq!(format("no placeholders }", &values).unwrap(), "no placeholders }");
    }

    #[test]
    fn truncates_on_characters() {
        assert_eq!(truncate("Headphones", 4, "..."), "Head...");
        assert_eq!(truncate("Buds", 4, "..."), "Buds");
        assert_eq!(truncate("ÄÖÜß", 2, "…"), "ÄÖ…");
    }

    #[test]
    fn styles_prefer_the_last_matching_class() {
        let styles = Styles::new(attr(Color::white()))
            .with_class("icon", attr(Color::blue()))
            .with_class("prayer-time-soon", attr(Color::yellow()));

        assert_eq!(styles.get("label").fg_color, Color::white());
        assert_eq!(styles.get("icon").fg_color, Color::blue());
        assert_eq!(styles.get("label prayer-time-soon").fg_color, Color::yellow());
        assert_eq!(styles.get("icon prayer-time-soon").fg_color, Color::yellow());
        assert_eq!(styles.get("icon prayer-time-active").fg_color, Color::blue());
    }

    #[test]
    fn render_styles_parts_by_class() {
        let styles = Styles::new(attr(Color::white())).with_class("battery-low", attr(Color::red()));
        let template = LabelTemplate::parse("<span>B</span> {name}").unwrap();
        let values = Values::new().with("name", "Buds");

        let texts = template
            .render(&styles, Some("battery-low"), |part| match part {
                Part::Icon { content, .. } => Ok(content.clone()),
                Part::Text(text) => format(text, &values),
            })
            .unwrap();

        assert_eq!(texts.len(), 2);
        assert_eq!(texts[0].text, "B");
        assert_eq!(texts[1].text, "Buds");
        assert!(texts.iter().all(|text| text.attr.fg_color == Color::red()));
    }

    #[test]
    fn callbacks_parse_and_bind_to_buttons() {
        assert_eq!("toggle_group".parse::<Callback>().unwrap(), Callback::ToggleCard);
        assert_eq!(
            "fetch_prayer_time_data".parse::<Callback>().unwrap(),
            Callback::FetchData
        );
        assert!("explode".parse::<Callback>().is_err());

        let callbacks = Callbacks::default();
        assert_eq!(callbacks.for_button(MouseButton::Left), Callback::ToggleLabel);
        assert_eq!(callbacks.for_button(MouseButton::Right), Callback::ToggleCard);
        assert_eq!(callbacks.for_button(MouseButton::ScrollUp), Callback::DoNothing);
    }

    #[test]
    fn view_toggles() {
        let mut view = View::default();
        view.apply(Callback::ToggleLabel);
        view.apply(Callback::ToggleCard);
        view.apply(Callback::FetchData);
        assert_eq!(view, View { alt: true, card: true });
        view.apply(Callback::ToggleLabel);
        assert!(!view.alt);
    }
}
