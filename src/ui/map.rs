/// Damage marker map
/// Plots the visible, located records on a Web-Mercator canvas with
/// drag-to-pan, wheel zoom and click-to-select. Base tiles are not drawn.
use iced::mouse::{self, Cursor};
use iced::widget::canvas::{self, Path, Program, Stroke};
use iced::{Color, Point, Rectangle, Renderer, Size, Theme};

use crate::state::data::DamageSize;
use crate::state::view::Marker;
use crate::Message;

const TILE_SIZE: f64 = 256.0;
const MIN_ZOOM: f32 = 3.0;
const MAX_ZOOM: f32 = 19.0;
/// Zoom used when focusing a selected record
pub const FOCUS_ZOOM: f32 = 16.0;

const MARKER_RADIUS: f32 = 8.0;
const MARKER_WEIGHT: f32 = 2.0;
const SELECTED_RADIUS: f32 = 12.0;
const SELECTED_WEIGHT: f32 = 4.0;

/// Marker colour by damage size
pub fn marker_color(size: Option<DamageSize>) -> Color {
    match size {
        Some(DamageSize::Large) => Color::from_rgb8(0xef, 0x44, 0x44),
        Some(DamageSize::Medium) => Color::from_rgb8(0xf5, 0x9e, 0x0b),
        Some(DamageSize::Small) => Color::from_rgb8(0x10, 0xb9, 0x81),
        None => Color::from_rgb8(0x6b, 0x72, 0x80),
    }
}

/// World pixel coordinates of a lat/lng at `zoom`
fn project(lat: f64, lng: f64, zoom: f32) -> (f64, f64) {
    let world = TILE_SIZE * 2f64.powf(zoom as f64);
    let lat_rad = lat.clamp(-85.0511, 85.0511).to_radians();
    let x = (lng + 180.0) / 360.0 * world;
    let y = (1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / std::f64::consts::PI) / 2.0 * world;
    (x, y)
}

/// Inverse of `project`
fn unproject(x: f64, y: f64, zoom: f32) -> (f64, f64) {
    let world = TILE_SIZE * 2f64.powf(zoom as f64);
    let lng = x / world * 360.0 - 180.0;
    let n = std::f64::consts::PI * (1.0 - 2.0 * y / world);
    let lat = n.sinh().atan().to_degrees();
    (lat, lng)
}

/// Centre and zoom of the map
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapViewport {
    pub center: (f64, f64),
    pub zoom: f32,
}

impl MapViewport {
    pub fn new(center: (f64, f64), zoom: f32) -> Self {
        Self {
            center,
            zoom: zoom.clamp(MIN_ZOOM, MAX_ZOOM),
        }
    }

    /// Screen position of a coordinate inside a canvas of `size`
    pub fn to_screen(&self, lat: f64, lng: f64, size: Size) -> Point {
        let (cx, cy) = project(self.center.0, self.center.1, self.zoom);
        let (x, y) = project(lat, lng, self.zoom);
        Point::new(
            (x - cx) as f32 + size.width / 2.0,
            (y - cy) as f32 + size.height / 2.0,
        )
    }

    /// Move the map by a screen-space drag delta
    pub fn pan_by(&mut self, delta: cgmath::Vector2<f32>) {
        let (cx, cy) = project(self.center.0, self.center.1, self.zoom);
        self.center = unproject(cx - delta.x as f64, cy - delta.y as f64, self.zoom);
    }

    pub fn zoom_by(&mut self, delta: f32) {
        self.zoom = (self.zoom + delta).clamp(MIN_ZOOM, MAX_ZOOM);
    }

    /// Centre on a record, zooming in to at least `FOCUS_ZOOM`
    pub fn focus(&mut self, lat: f64, lng: f64) {
        self.center = (lat, lng);
        self.zoom = self.zoom.max(FOCUS_ZOOM);
    }
}

/// Canvas program drawing one frame of markers
pub struct DamageMap<'a> {
    pub markers: &'a [Marker],
    pub viewport: MapViewport,
}

impl DamageMap<'_> {
    /// Topmost marker under `position` (canvas-relative)
    fn marker_at(&self, position: Point, size: Size) -> Option<&Marker> {
        self.markers.iter().rev().find(|marker| {
            let center = self.viewport.to_screen(marker.lat, marker.lng, size);
            let radius = if marker.selected {
                SELECTED_RADIUS
            } else {
                MARKER_RADIUS
            };
            center.distance(position) <= radius + 2.0
        })
    }
}

impl Program<Message> for DamageMap<'_> {
    type State = DragState;

    fn draw(
        &self,
        _state: &Self::State,
        renderer: &Renderer,
        _theme: &Theme,
        bounds: Rectangle,
        _cursor: Cursor,
    ) -> Vec<canvas::Geometry> {
        let mut frame = canvas::Frame::new(renderer, bounds.size());
        frame.fill_rectangle(Point::ORIGIN, bounds.size(), Color::from_rgb8(0x11, 0x18, 0x27));

        // selected marker last so it sits on top
        let ordered = self
            .markers
            .iter()
            .filter(|m| !m.selected)
            .chain(self.markers.iter().filter(|m| m.selected));

        for marker in ordered {
            let center = self.viewport.to_screen(marker.lat, marker.lng, bounds.size());
            let (radius, weight) = if marker.selected {
                (SELECTED_RADIUS, SELECTED_WEIGHT)
            } else {
                (MARKER_RADIUS, MARKER_WEIGHT)
            };
            let color = marker_color(marker.size);
            let circle = Path::circle(center, radius);
            frame.fill(&circle, Color { a: 0.8, ..color });
            frame.stroke(
                &circle,
                Stroke::default().with_color(color).with_width(weight),
            );
        }

        vec![frame.into_geometry()]
    }

    fn update(
        &self,
        state: &mut Self::State,
        event: canvas::Event,
        bounds: Rectangle,
        cursor: Cursor,
    ) -> (canvas::event::Status, Option<Message>) {
        match event {
            canvas::Event::Mouse(mouse::Event::WheelScrolled { delta }) => {
                if cursor.is_over(bounds) {
                    let zoom_delta = match delta {
                        mouse::ScrollDelta::Lines { y, .. } => y * 0.5,
                        mouse::ScrollDelta::Pixels { y, .. } => y * 0.01,
                    };
                    return (
                        canvas::event::Status::Captured,
                        Some(Message::MapZoomed(zoom_delta)),
                    );
                }
            }

            // click on a marker selects it, anywhere else starts a drag
            canvas::Event::Mouse(mouse::Event::ButtonPressed(mouse::Button::Left)) => {
                if let Some(position) = cursor.position_in(bounds) {
                    if let Some(marker) = self.marker_at(position, bounds.size()) {
                        return (
                            canvas::event::Status::Captured,
                            Some(Message::SelectDamage(marker.id.clone())),
                        );
                    }
                    state.is_dragging = true;
                    state.last_position = cursor.position();
                    return (canvas::event::Status::Captured, None);
                }
            }

            canvas::Event::Mouse(mouse::Event::ButtonReleased(mouse::Button::Left)) => {
                if state.is_dragging {
                    state.is_dragging = false;
                    state.last_position = None;
                    return (canvas::event::Status::Captured, None);
                }
            }

            canvas::Event::Mouse(mouse::Event::CursorMoved { .. }) => {
                if state.is_dragging {
                    if let (Some(current), Some(last)) = (cursor.position(), state.last_position) {
                        let delta = cgmath::Vector2::new(current.x - last.x, current.y - last.y);
                        state.last_position = Some(current);
                        return (
                            canvas::event::Status::Captured,
                            Some(Message::MapPanned(delta)),
                        );
                    }
                }
            }

            _ => {}
        }

        (canvas::event::Status::Ignored, None)
    }

    fn mouse_interaction(
        &self,
        state: &Self::State,
        bounds: Rectangle,
        cursor: Cursor,
    ) -> mouse::Interaction {
        match cursor.position_in(bounds) {
            Some(_) if state.is_dragging => mouse::Interaction::Grabbing,
            Some(position) if self.marker_at(position, bounds.size()).is_some() => {
                mouse::Interaction::Pointer
            }
            Some(_) => mouse::Interaction::Grab,
            None => mouse::Interaction::default(),
        }
    }
}

/// State for drag interactions
#[derive(Debug, Clone, Default)]
pub struct DragState {
    pub is_dragging: bool,
    pub last_position: Option<Point>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_center_projects_to_canvas_middle() {
        let viewport = MapViewport::new((35.5732, 139.3704), 13.0);
        let point = viewport.to_screen(35.5732, 139.3704, Size::new(800.0, 600.0));
        assert_eq!(point, Point::new(400.0, 300.0));
    }

    #[test]
    fn test_north_is_up_and_east_is_right() {
        let viewport = MapViewport::new((35.5732, 139.3704), 13.0);
        let size = Size::new(800.0, 600.0);
        let north_east = viewport.to_screen(35.60, 139.40, size);
        assert!(north_east.x > 400.0);
        assert!(north_east.y < 300.0);
    }

    #[test]
    fn test_project_round_trip() {
        let (x, y) = project(35.5720, 139.3680, 15.0);
        let (lat, lng) = unproject(x, y, 15.0);
        assert!(close(lat, 35.5720));
        assert!(close(lng, 139.3680));
    }

    #[test]
    fn test_pan_moves_center_opposite_to_drag() {
        let mut viewport = MapViewport::new((35.5732, 139.3704), 13.0);
        viewport.pan_by(cgmath::Vector2::new(100.0, 0.0));
        assert!(viewport.center.1 < 139.3704);
        assert!(close(viewport.center.0, 35.5732));
    }

    #[test]
    fn test_focus_and_zoom_clamp() {
        let mut viewport = MapViewport::new((35.0, 139.0), 13.0);
        viewport.focus(35.5610, 139.3930);
        assert_eq!(viewport.center, (35.5610, 139.3930));
        assert_eq!(viewport.zoom, FOCUS_ZOOM);

        viewport.zoom_by(10.0);
        assert_eq!(viewport.zoom, MAX_ZOOM);
        viewport.focus(35.0, 139.0);
        assert_eq!(viewport.zoom, MAX_ZOOM);
    }

    #[test]
    fn test_hit_test_prefers_topmost_marker() {
        let markers = vec![
            Marker {
                id: "a".into(),
                lat: 35.0,
                lng: 139.0,
                size: None,
                selected: false,
            },
            Marker {
                id: "b".into(),
                lat: 35.0,
                lng: 139.0,
                size: Some(DamageSize::Large),
                selected: false,
            },
        ];
        let map = DamageMap {
            markers: &markers,
            viewport: MapViewport::new((35.0, 139.0), 13.0),
        };
        let size = Size::new(200.0, 200.0);
        assert_eq!(map.marker_at(Point::new(103.0, 100.0), size).map(|m| m.id.as_str()), Some("b"));
        assert!(map.marker_at(Point::new(150.0, 150.0), size).is_none());
    }

    #[test]
    fn test_marker_colors() {
        assert_eq!(marker_color(Some(DamageSize::Large)), Color::from_rgb8(0xef, 0x44, 0x44));
        assert_eq!(marker_color(None), Color::from_rgb8(0x6b, 0x72, 0x80));
    }
}
