use std::f64;
use std::rc::Rc;

use anyhow::{anyhow, Context, Result};
use log::{debug, trace};
use ordered_float::OrderedFloat;
use xcb_util::ewmh;

use crate::text::{ComputedText, Text};
use crate::widgets::MouseButton;

fn get_root_visual_type(
    conn: &xcb::Connection,
    screen: &xcb::Screen<'_>,
) -> Result<xcb::Visualtype> {
    for root in conn.get_setup().roots() {
        for allowed_depth in root.allowed_depths() {
            for visual in allowed_depth.visuals() {
                if visual.visual_id() == screen.root_visual() {
                    return Ok(visual);
                }
            }
        }
    }
    Err(anyhow!("No visual type found for the root window"))
}

/// Creates a `cairo::Surface` for the XCB window with the given `id`.
fn cairo_surface_for_xcb_window(
    conn: &xcb::Connection,
    screen: &xcb::Screen<'_>,
    id: u32,
    width: i32,
    height: i32,
) -> Result<cairo::XCBSurface> {
    let cairo_conn = unsafe {
        cairo::XCBConnection::from_raw_none(conn.get_raw_conn() as *mut cairo_sys::xcb_connection_t)
    };
    let mut visual_type = get_root_visual_type(conn, screen)?;
    let visual = unsafe {
        cairo::XCBVisualType::from_raw_none(
            &mut visual_type.base as *mut xcb::ffi::xcb_visualtype_t
                as *mut cairo_sys::xcb_visualtype_t,
        )
    };
    let drawable = cairo::XCBDrawable(id);
    let surface = cairo::XCBSurface::create(&cairo_conn, &drawable, &visual, width, height)
        .map_err(|status| anyhow!("XCBSurface::create: {}", status))?;
    Ok(surface)
}

fn create_surface(
    conn: &xcb::Connection,
    screen_idx: usize,
    window_id: u32,
    height: u16,
    width: Option<u16>,
    offset: Offset,
) -> Result<(u16, cairo::XCBSurface)> {
    let screen = conn
        .get_setup()
        .roots()
        .nth(screen_idx)
        .ok_or_else(|| anyhow!("Invalid screen"))?;
    let values = [
        (xcb::CW_BACK_PIXEL, screen.black_pixel()),
        (
            xcb::CW_EVENT_MASK,
            xcb::EVENT_MASK_EXPOSURE | xcb::EVENT_MASK_BUTTON_PRESS,
        ),
    ];

    let width = width.unwrap_or_else(|| screen.width_in_pixels());

    xcb::create_window(
        conn,
        xcb::COPY_FROM_PARENT as u8,
        window_id,
        screen.root(),
        offset.x,
        offset.y,
        width,
        height,
        0,
        xcb::WINDOW_CLASS_INPUT_OUTPUT as u16,
        screen.root_visual(),
        &values,
    );

    let surface = cairo_surface_for_xcb_window(
        conn,
        &screen,
        window_id,
        i32::from(width),
        i32::from(height),
    )?;

    Ok((width, surface))
}

/// An enum specifying the position of the bar.
///
/// Passed to [`Minaret::new()`] when constructing a [`Minaret`] instance.
///
/// [`Minaret::new()`]: struct.Minaret.html#method.new
/// [`Minaret`]: struct.Minaret.html
///
/// # Examples
///
/// ```
/// # use minaret::{Minaret, Position};
/// let mut bar = Minaret::new(Position::Top);
/// ```
#[derive(Clone, Debug)]
pub enum Position {
    /// Position the bar at the top of the screen.
    Top,
    /// Position the bar at the bottom of the screen.
    Bottom,
}

/// A struct specifying the `x` and `y` offset
#[derive(Default, Clone, Copy)]
pub struct Offset {
    pub x: i16,
    pub y: i16,
}

pub struct Bar {
    position: Position,

    conn: Rc<ewmh::Connection>,
    screen_idx: usize,
    window_id: u32,

    surface: cairo::XCBSurface,
    width: u16,
    height: u16,
    offset: Offset,

    contents: Vec<Vec<ComputedText>>,
}

impl Bar {
    pub fn new(position: Position, width: Option<u16>, offset: Offset) -> Result<Bar> {
        let (conn, screen_idx) =
            xcb::Connection::connect(None).context("Failed to connect to X server")?;
        let screen_idx = screen_idx as usize;
        let window_id = conn.generate_id();

        // We don't actually care about how tall our initial window is - we'll resize
        // our window once we know how big it needs to be. However, it seems to need
        // to be bigger than 0px, or either Xcb/Cairo (or maybe QTile?) gets upset.
        let height = 1;
        let (width, surface) = create_surface(&conn, screen_idx, window_id, height, width, offset)?;

        let ewmh_conn = ewmh::Connection::connect(conn)
            .map_err(|(e, _)| e)
            .context("Failed to wrap xcb::Connection in ewmh::Connection")?;

        let bar = Bar {
            conn: Rc::new(ewmh_conn),
            window_id,
            screen_idx,
            surface,
            width,
            height,
            offset,
            position,
            contents: Vec::new(),
        };
        bar.set_ewmh_properties();

        // The window is mapped by update_bar_height() once the first content
        // has been laid out. Mapping a 1px window renders nothing.
        bar.flush();

        Ok(bar)
    }

    fn flush(&self) {
        self.conn.flush();
    }

    fn map_window(&self) {
        xcb::map_window(&self.conn, self.window_id);
    }

    fn set_ewmh_properties(&self) {
        ewmh::set_wm_window_type(
            &self.conn,
            self.window_id,
            &[self.conn.WM_WINDOW_TYPE_DOCK()],
        );

        // TODO: Update _WM_STRUT_PARTIAL if the height/position of the bar changes?
        let mut strut_partial = ewmh::StrutPartial {
            left: 0,
            right: 0,
            top: 0,
            bottom: 0,
            left_start_y: 0,
            left_end_y: 0,
            right_start_y: 0,
            right_end_y: 0,
            top_start_x: 0,
            top_end_x: 0,
            bottom_start_x: 0,
            bottom_end_x: 0,
        };
        match self.position {
            Position::Top => strut_partial.top = u32::from(self.height),
            Position::Bottom => strut_partial.bottom = u32::from(self.height),
        }
        ewmh::set_wm_strut_partial(&self.conn, self.window_id, strut_partial);
    }

    fn screen(&self) -> Result<xcb::Screen<'_>> {
        let screen = self
            .conn
            .get_setup()
            .roots()
            .nth(self.screen_idx)
            .ok_or_else(|| anyhow!("Invalid screen"))?;
        Ok(screen)
    }

    fn update_bar_height(&mut self, height: u16) -> Result<()> {
        if self.height != height {
            self.height = height;

            // If we're at the bottom of the screen, we'll need to update the
            // position of the window.
            let y = match self.position {
                Position::Top => self.offset.y.max(0) as u16,
                Position::Bottom => {
                    let h = (self.screen()?.height_in_pixels() - self.height) as i32;
                    h.checked_add(self.offset.y as i32).unwrap_or(h).max(0) as u16
                }
            };

            // Update the height/position of the XCB window and the height of the Cairo surface.
            let values = [
                (xcb::CONFIG_WINDOW_Y as u16, u32::from(y)),
                (xcb::CONFIG_WINDOW_HEIGHT as u16, u32::from(self.height)),
                (xcb::CONFIG_WINDOW_STACK_MODE as u16, xcb::STACK_MODE_ABOVE),
            ];
            xcb::configure_window(&self.conn, self.window_id, &values);
            self.map_window();
            self.surface
                .set_size(i32::from(self.width), i32::from(self.height))
                .map_err(|status| anyhow!("XCBSurface::set_size: {}", status))?;

            // Update EWMH properties - we might need to reserve more or less space.
            self.set_ewmh_properties();
        }

        Ok(())
    }

    // Returns the connection to the X server.
    //
    // The owner of the `Bar` is responsible for polling this for events,
    // passing each to `Bar::process_event()`.
    pub fn connection(&self) -> &Rc<ewmh::Connection> {
        &self.conn
    }

    // Process an X event received from the `Bar::connection()`.
    //
    // Returns the index of the widget that was clicked and the button used,
    // if the event was a button press over one of the widgets.
    pub fn process_event(
        &mut self,
        event: xcb::GenericEvent,
    ) -> Result<Option<(usize, MouseButton)>> {
        match event.response_type() & !0x80 {
            xcb::EXPOSE => {
                debug!("Redrawing entire bar - expose event");
                self.redraw_entire_bar()?;
                Ok(None)
            }
            xcb::BUTTON_PRESS => {
                let press: &xcb::ButtonPressEvent = unsafe { xcb::cast_event(&event) };
                let button = MouseButton::from(press.detail());
                let x = f64::from(press.event_x());
                let hit = self.widget_at(x).map(|idx| (idx, button));
                trace!("Button press {:?} at x={} hit {:?}", button, x, hit);
                Ok(hit)
            }
            _ => Ok(None),
        }
    }

    // Returns the index of the widget whose content covers `x`.
    pub fn widget_at(&self, x: f64) -> Option<usize> {
        widget_at(&self.contents, x)
    }

    // Add a new widget's content to the `Bar`.
    //
    // Returns the index of the widget within the bar, so that subsequent
    // updates can be made by calling `Bar::update_content()`.
    pub fn add_content(&mut self, content: Vec<Text>) -> Result<usize> {
        let idx = self.contents.len();
        self.contents.push(Vec::new());
        self.update_content(idx, content)?;
        Ok(idx)
    }

    // Updates an existing widget's content in the `Bar`.
    pub fn update_content(&mut self, idx: usize, content: Vec<Text>) -> Result<()> {
        // If the text is the same, don't bother re-computing the text or
        // redrawing it. This is a spurious wake-up.
        let old = &self.contents[idx];
        if &content == old {
            return Ok(());
        }

        let mut new = content
            .into_iter()
            .map(|text| text.compute(&self.surface))
            .collect::<Result<Vec<_>>>()?;

        let error_margin = f64::EPSILON; // Use an epsilon for comparison

        // If there are any new texts or any non-stretch texts changed size,
        // we'll redraw all texts.
        let redraw_entire_bar = old.len() != new.len()
            || old
                .iter()
                .zip(&new)
                .any(|(old, new)| ((old.width - new.width).abs() > error_margin) && !new.stretch);

        // Steal dimenions from old ComputedText. If we need new dimensions,
        // they'll be recomputed by redraw_entire_bar().
        for (new, old) in new.iter_mut().zip(old.iter()) {
            new.x = old.x;
            new.y = old.y;
            new.height = old.height;
            // Only use width for stretch widgets.
            if new.stretch {
                new.width = old.width;
            }
        }

        self.contents[idx] = new;

        if !redraw_entire_bar {
            trace!("Redrawing widget {}", idx);
            self.redraw_content(idx)?;
        } else {
            debug!("Redrawing entire bar - widget {} changed size", idx);
            self.redraw_entire_bar()?;
        }

        Ok(())
    }

    fn redraw_content(&mut self, idx: usize) -> Result<()> {
        for text in &mut self.contents[idx] {
            text.render(&self.surface)?;
        }

        self.flush();

        Ok(())
    }

    pub fn redraw_entire_bar(&mut self) -> Result<()> {
        self.recompute_dimensions()?;

        for idx in 0..self.contents.len() {
            self.redraw_content(idx)?;
        }
        Ok(())
    }

    fn recompute_dimensions(&mut self) -> Result<()> {
        let height = layout(&mut self.contents, f64::from(self.width));
        self.update_bar_height(height as u16)
    }
}

// Lays out every widget's texts left to right across a bar `bar_width`
// pixels wide, returning the height of the bar.
//
// All texts take the height of the tallest one. Non-stretch texts keep their
// natural width; the remaining width is shared evenly between stretch texts.
fn layout(contents: &mut [Vec<ComputedText>], bar_width: f64) -> f64 {
    let height = contents
        .iter()
        .flatten()
        .map(|text| text.height)
        .max_by_key(|height| OrderedFloat(*height))
        .unwrap_or(0.0);
    for text in contents.iter_mut().flatten() {
        text.height = height;
    }

    let used: f64 = contents
        .iter()
        .flatten()
        .filter(|text| !text.stretch)
        .map(|text| text.width)
        .sum();
    let remaining = (bar_width - used).max(0.0);

    let stretches_count = contents.iter().flatten().filter(|text| text.stretch).count();
    if stretches_count > 0 {
        let stretch_width = remaining / (stretches_count as f64);
        for text in contents.iter_mut().flatten().filter(|text| text.stretch) {
            text.width = stretch_width;
        }
    }

    let mut x = 0.0;
    for text in contents.iter_mut().flatten() {
        text.x = x;
        x += text.width;
    }

    height
}

fn widget_at(contents: &[Vec<ComputedText>], x: f64) -> Option<usize> {
    contents
        .iter()
        .position(|texts| texts.iter().any(|text| text.contains_x(x)))
}

#[cfg(test)]
mod test {
    use super::{layout, widget_at};
    use crate::text::{Attributes, Color, ComputedText, Font, Padding};

    fn computed(width: f64, height: f64, stretch: bool) -> ComputedText {
        ComputedText {
            attr: Attributes {
                font: Font::new("Sans 10"),
                fg_color: Color::white(),
                bg_color: None,
                padding: Padding::new(0.0, 0.0, 0.0, 0.0),
            },
            text: String::new(),
            stretch,
            x: 0.0,
            y: 0.0,
            width,
            height,
            markup: false,
        }
    }

    #[test]
    fn stretch_texts_share_remaining_width() {
        let mut contents = vec![
            vec![computed(100.0, 20.0, false)],
            vec![computed(0.0, 18.0, true)],
            vec![computed(50.0, 24.0, false), computed(0.0, 10.0, true)],
        ];

        let height = layout(&mut contents, 1000.0);

        assert_eq!(height, 24.0);
        assert!(contents.iter().flatten().all(|text| text.height == 24.0));
        assert_eq!(contents[1][0].width, 425.0);
        assert_eq!(contents[2][1].width, 425.0);
        assert_eq!(contents[1][0].x, 100.0);
        assert_eq!(contents[2][0].x, 525.0);
        assert_eq!(contents[2][1].x, 575.0);
    }

    #[test]
    fn hit_test_finds_owning_widget() {
        let mut contents = vec![
            vec![computed(100.0, 20.0, false)],
            vec![],
            vec![computed(40.0, 20.0, false), computed(60.0, 20.0, false)],
        ];
        layout(&mut contents, 200.0);

        assert_eq!(widget_at(&contents, 0.0), Some(0));
        assert_eq!(widget_at(&contents, 99.9), Some(0));
        assert_eq!(widget_at(&contents, 100.0), Some(2));
        assert_eq!(widget_at(&contents, 199.0), Some(2));
        assert_eq!(widget_at(&contents, 200.0), None);
    }
}
