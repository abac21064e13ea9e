use iced::mouse;
use iced::widget::canvas::{self, Frame, Geometry, Path, Stroke, Text};
use iced::{Color, Point, Rectangle, Size, Vector};

use crate::api::PumpAction;
use crate::editor::{Editor, Gesture, Key, Mode, Panel};
use crate::flow::Flow;
use crate::graph::Graph;
use crate::hit::{self, Hit};
use crate::layout::{BBox, DEFAULT_VIEWPORT};
use crate::model::{Node, NodeKind};
use crate::ports::{self, PORT_RADIUS, PortSide};
use crate::Message;

/// Messages the canvas publishes. Pointer positions are already in layout units.
#[derive(Debug, Clone)]
pub enum BoardMessage {
    PointerDown(Point),
    PointerMoved(Point),
    PointerUp(Point),
    Key(Key),
    ToggleEdit,
    ToggleConnect,
    AutoArrange,
    Refresh,
    PumpCommand(PumpAction),
}

/// Everything the rendering surface reads each frame.
pub struct Board {
    pub graph: Graph,
    pub editor: Editor,
    /// Framed region; recomputed on fetch and auto-arrange, not while dragging.
    pub viewbox: BBox,
    pub alert: Option<String>,
    pub loading: bool,
}

impl Board {
    pub fn new(graph: Graph) -> Self {
        Self {
            graph,
            editor: Editor::default(),
            viewbox: DEFAULT_VIEWPORT,
            alert: None,
            loading: false,
        }
    }
}

/// Canvas-local camera and pointer state. Pan and zoom never reach the model.
#[derive(Debug, Clone, Copy)]
pub struct Camera {
    zoom: f32,
    pan: Vector,
    interaction: Interaction,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            zoom: 1.0,
            pan: Vector::ZERO,
            interaction: Interaction::None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub enum Interaction {
    #[default]
    None,
    Pointing,
    Panning { last_pos: Point },
}

impl Camera {
    fn scale(&self, viewbox: &BBox, size: Size) -> f32 {
        let fit = (size.width / viewbox.w).min(size.height / viewbox.h);
        fit.max(0.01) * self.zoom
    }

    fn to_world(&self, viewbox: &BBox, size: Size, screen: Point) -> Point {
        let scale = self.scale(viewbox, size);
        Point::new(
            (screen.x - self.pan.x) / scale + viewbox.min_x,
            (screen.y - self.pan.y) / scale + viewbox.min_y,
        )
    }

    /// Zoom towards `cursor`, keeping the point under it fixed.
    fn zoom_at(&mut self, viewbox: &BBox, size: Size, cursor: Point, delta: f32) {
        let anchor = self.to_world(viewbox, size, cursor);
        self.zoom = (self.zoom * (1.0 + delta * 0.1)).clamp(0.25, 4.0);
        let scale = self.scale(viewbox, size);
        self.pan = Vector::new(
            cursor.x - (anchor.x - viewbox.min_x) * scale,
            cursor.y - (anchor.y - viewbox.min_y) * scale,
        );
    }
}

fn publish(message: BoardMessage) -> Option<canvas::Action<Message>> {
    Some(canvas::Action::publish(Message::Board(message)))
}

impl canvas::Program<Message> for Board {
    type State = Camera;

    fn draw(
        &self,
        camera: &Self::State,
        renderer: &iced::Renderer,
        _theme: &iced::Theme,
        bounds: Rectangle,
        _cursor: mouse::Cursor,
    ) -> Vec<Geometry> {
        let mut background = Frame::new(renderer, bounds.size());
        background.fill_rectangle(Point::ORIGIN, bounds.size(), palette::BACKGROUND);

        let mut world = Frame::new(renderer, bounds.size());
        world.translate(camera.pan);
        world.scale(camera.scale(&self.viewbox, bounds.size()));
        world.translate(Vector::new(-self.viewbox.min_x, -self.viewbox.min_y));

        for group in self.graph.groups() {
            draw_location(&mut world, group.bounds, &group.name);
        }

        let selected = self.editor.selected_edge();
        for edge in self.graph.edges() {
            if let Some((start, end)) = hit::edge_endpoints(&self.graph, edge) {
                let flow = self.graph.flow(edge.id);
                draw_pipe(&mut world, start, end, flow, selected == Some(edge.id));
            }
        }

        let show_ports = self.editor.mode() == Mode::Connect;
        for node in self.graph.nodes() {
            draw_node(&mut world, node, show_ports);
        }

        if let Gesture::Connecting { from, cursor } = self.editor.gesture() {
            if let Some(node) = self.graph.node(&from.node_id) {
                let start = ports::anchor(node, PortSide::Out, &from.port_id);
                draw_pending_pipe(&mut world, start, *cursor);
            }
        }

        let mut overlay = Frame::new(renderer, bounds.size());
        draw_mode_badge(&mut overlay, self.editor.mode(), self.loading);
        if let Some(panel) = self.editor.panel() {
            draw_panel(&mut overlay, bounds.size(), &self.graph, panel);
        }
        if let Some(alert) = &self.alert {
            draw_alert(&mut overlay, bounds.size(), alert);
        }

        vec![
            background.into_geometry(),
            world.into_geometry(),
            overlay.into_geometry(),
        ]
    }

    fn update(
        &self,
        camera: &mut Self::State,
        event: &iced::Event,
        bounds: Rectangle,
        cursor: mouse::Cursor,
    ) -> Option<canvas::Action<Message>> {
        if let iced::Event::Keyboard(iced::keyboard::Event::KeyPressed { key, modifiers, .. }) = event {
            use iced::keyboard::Key as K;
            use iced::keyboard::key::Named;

            if modifiers.control() || modifiers.alt() {
                return None;
            }
            return match key.as_ref() {
                K::Named(Named::Delete) | K::Named(Named::Backspace) => {
                    publish(BoardMessage::Key(Key::Delete))
                }
                K::Named(Named::Escape) => publish(BoardMessage::Key(Key::Escape)),
                K::Character("e") | K::Character("E") => publish(BoardMessage::ToggleEdit),
                K::Character("c") | K::Character("C") => publish(BoardMessage::ToggleConnect),
                K::Character("a") | K::Character("A") => publish(BoardMessage::AutoArrange),
                K::Character("r") | K::Character("R") => publish(BoardMessage::Refresh),
                K::Character("1") => publish(BoardMessage::PumpCommand(PumpAction::Start)),
                K::Character("0") => publish(BoardMessage::PumpCommand(PumpAction::Stop)),
                _ => None,
            };
        }

        let cursor_position = cursor.position_in(bounds)?;
        let size = bounds.size();
        let world_position = camera.to_world(&self.viewbox, size, cursor_position);

        match event {
            iced::Event::Mouse(mouse::Event::ButtonPressed(mouse::Button::Left)) => {
                let side = (self.editor.mode() == Mode::Connect).then_some(PortSide::Out);
                camera.interaction = match hit::hit_test(&self.graph, world_position, side) {
                    Hit::None => Interaction::Panning {
                        last_pos: cursor_position,
                    },
                    _ => Interaction::Pointing,
                };
                publish(BoardMessage::PointerDown(world_position))
            }
            iced::Event::Mouse(mouse::Event::ButtonReleased(mouse::Button::Left)) => {
                camera.interaction = Interaction::None;
                publish(BoardMessage::PointerUp(world_position))
            }
            iced::Event::Mouse(mouse::Event::CursorMoved { .. }) => match camera.interaction {
                Interaction::Panning { last_pos } => {
                    camera.pan = camera.pan + (cursor_position - last_pos);
                    camera.interaction = Interaction::Panning {
                        last_pos: cursor_position,
                    };
                    Some(canvas::Action::request_redraw())
                }
                Interaction::Pointing => publish(BoardMessage::PointerMoved(world_position)),
                Interaction::None => None,
            },
            iced::Event::Mouse(mouse::Event::WheelScrolled { delta }) => {
                let scroll = match delta {
                    mouse::ScrollDelta::Lines { y, .. } => *y,
                    mouse::ScrollDelta::Pixels { y, .. } => *y / 100.0,
                };
                camera.zoom_at(&self.viewbox, size, cursor_position, scroll);
                Some(canvas::Action::request_redraw())
            }
            _ => None,
        }
    }

    fn mouse_interaction(
        &self,
        camera: &Self::State,
        bounds: Rectangle,
        cursor: mouse::Cursor,
    ) -> mouse::Interaction {
        let Some(position) = cursor.position_in(bounds) else {
            return mouse::Interaction::default();
        };
        match (camera.interaction, self.editor.gesture()) {
            (Interaction::Panning { .. }, _) | (_, Gesture::Dragging { .. }) => {
                mouse::Interaction::Grabbing
            }
            (_, Gesture::Connecting { .. }) => mouse::Interaction::Crosshair,
            _ => {
                let world = camera.to_world(&self.viewbox, bounds.size(), position);
                match (self.editor.mode(), hit::hit_test(&self.graph, world, None)) {
                    (Mode::Connect, Hit::Port(_)) => mouse::Interaction::Crosshair,
                    (Mode::View, Hit::Node(_) | Hit::Location(_)) => mouse::Interaction::Pointer,
                    (Mode::Edit | Mode::Connect, Hit::Node(_)) => mouse::Interaction::Grab,
                    (Mode::Edit | Mode::Connect, Hit::Edge(_)) => mouse::Interaction::Pointer,
                    _ => mouse::Interaction::default(),
                }
            }
        }
    }
}

mod palette {
    use iced::Color;

    pub const BACKGROUND: Color = Color::from_rgb(0.075, 0.075, 0.085);
    pub const NODE_BG: Color = Color::from_rgb(0.11, 0.11, 0.13);
    pub const NODE_BORDER: Color = Color::from_rgb(0.30, 0.30, 0.36);
    pub const LOCATION_BG: Color = Color::from_rgba(1.0, 1.0, 1.0, 0.035);

    pub const PORT_OUT: Color = Color::from_rgb(0.92, 0.65, 0.25);
    pub const PORT_IN: Color = Color::from_rgb(0.30, 0.75, 0.85);

    pub const WATER: Color = Color::from_rgb(0.25, 0.60, 0.95);
    pub const PIPE_IDLE: Color = Color::from_rgb(0.35, 0.37, 0.42);
    pub const PIPE_FLOWING: Color = Color::from_rgb(0.30, 0.75, 0.95);
    pub const PIPE_FLOWING_GLOW: Color = Color::from_rgba(0.30, 0.75, 0.95, 0.2);
    pub const PIPE_SELECTED: Color = Color::from_rgb(0.92, 0.65, 0.25);

    pub const ONLINE: Color = Color::from_rgb(0.35, 0.75, 0.45);
    pub const OFFLINE: Color = Color::from_rgb(0.85, 0.35, 0.35);
    pub const UNKNOWN: Color = Color::from_rgb(0.55, 0.55, 0.60);

    pub const TEXT_PRIMARY: Color = Color::from_rgb(0.92, 0.92, 0.94);
    pub const TEXT_SECONDARY: Color = Color::from_rgb(0.55, 0.55, 0.60);
}

fn rounded_rect(pos: Point, size: Size, radius: f32) -> Path {
    Path::new(|builder| {
        let r = radius.min(size.width / 2.0).min(size.height / 2.0);
        let (x, y, w, h) = (pos.x, pos.y, size.width, size.height);

        builder.move_to(Point::new(x + r, y));
        builder.line_to(Point::new(x + w - r, y));
        builder.arc_to(Point::new(x + w, y), Point::new(x + w, y + r), r);
        builder.line_to(Point::new(x + w, y + h - r));
        builder.arc_to(Point::new(x + w, y + h), Point::new(x + w - r, y + h), r);
        builder.line_to(Point::new(x + r, y + h));
        builder.arc_to(Point::new(x, y + h), Point::new(x, y + h - r), r);
        builder.line_to(Point::new(x, y + r));
        builder.arc_to(Point::new(x, y), Point::new(x + r, y), r);
        builder.close();
    })
}

fn label(frame: &mut Frame, content: impl Into<String>, position: Point, size: f32, color: Color) {
    frame.fill_text(Text {
        content: content.into(),
        position,
        color,
        size: iced::Pixels(size),
        ..Text::default()
    });
}

fn draw_location(frame: &mut Frame, bounds: Rectangle, name: &str) {
    let path = rounded_rect(bounds.position(), bounds.size(), 14.0);
    frame.fill(&path, palette::LOCATION_BG);
    frame.stroke(
        &path,
        Stroke::default()
            .with_color(Color::from_rgba(1.0, 1.0, 1.0, 0.08))
            .with_width(1.0),
    );
    label(
        frame,
        name,
        Point::new(bounds.x + 10.0, bounds.y + 6.0),
        11.0,
        palette::TEXT_SECONDARY,
    );
}

fn pipe_path(start: Point, end: Point) -> Path {
    let (ctrl1, ctrl2) = hit::pipe_controls(start, end);
    Path::new(|builder| {
        builder.move_to(start);
        builder.bezier_curve_to(ctrl1, ctrl2, end);
    })
}

fn draw_pipe(frame: &mut Frame, start: Point, end: Point, flow: Flow, selected: bool) {
    let path = pipe_path(start, end);
    let flowing = flow.on;

    if flowing {
        frame.stroke(
            &path,
            Stroke::default()
                .with_color(palette::PIPE_FLOWING_GLOW)
                .with_width(4.0 + 4.0 * f32::from(flow.strength))
                .with_line_cap(canvas::LineCap::Round),
        );
    }

    let color = match (selected, flowing) {
        (true, _) => palette::PIPE_SELECTED,
        (false, true) => palette::PIPE_FLOWING,
        (false, false) => palette::PIPE_IDLE,
    };
    frame.stroke(
        &path,
        Stroke::default()
            .with_color(color)
            .with_width(if selected { 4.0 } else { 3.0 })
            .with_line_cap(canvas::LineCap::Round),
    );
}

fn draw_pending_pipe(frame: &mut Frame, start: Point, end: Point) {
    let path = pipe_path(start, end);
    frame.stroke(
        &path,
        Stroke::default()
            .with_color(Color::from_rgba(1.0, 1.0, 1.0, 0.1))
            .with_width(10.0)
            .with_line_cap(canvas::LineCap::Round),
    );
    frame.stroke(
        &path,
        Stroke::default()
            .with_color(palette::PORT_OUT)
            .with_width(3.0)
            .with_line_cap(canvas::LineCap::Round),
    );
    frame.fill(&Path::circle(end, 6.0), Color::from_rgba(1.0, 1.0, 1.0, 0.3));
    frame.fill(&Path::circle(end, 3.0), palette::PORT_OUT);
}

fn status_color(online: Option<bool>) -> Color {
    match online {
        Some(true) => palette::ONLINE,
        Some(false) => palette::OFFLINE,
        None => palette::UNKNOWN,
    }
}

fn draw_node(frame: &mut Frame, node: &Node, show_ports: bool) {
    let body = hit::node_bounds(node);
    let center = node.position;
    let border = Stroke::default()
        .with_color(palette::NODE_BORDER)
        .with_width(1.5);

    match node.kind {
        NodeKind::Tank => {
            let shell = rounded_rect(body.position(), body.size(), 8.0);
            frame.fill(&shell, palette::NODE_BG);
            if let Some(level) = node.level_display() {
                let height = body.height * level / 100.0;
                let water = Rectangle::new(
                    Point::new(body.x + 3.0, body.y + body.height - height),
                    Size::new(body.width - 6.0, (height - 3.0).max(0.0)),
                );
                frame.fill(&rounded_rect(water.position(), water.size(), 5.0), palette::WATER);
                label(
                    frame,
                    format!("{level:.0}%"),
                    Point::new(center.x - 12.0, center.y - 6.0),
                    11.0,
                    palette::TEXT_PRIMARY,
                );
            }
            frame.stroke(&shell, border);
        }
        NodeKind::Pump => {
            let circle = Path::circle(center, body.width / 2.0);
            let running = crate::flow::is_running_pump(node);
            frame.fill(&circle, palette::NODE_BG);
            frame.stroke(&circle, border);
            let rotor = if running { palette::PIPE_FLOWING } else { palette::PIPE_IDLE };
            frame.fill(&Path::circle(center, body.width / 5.0), rotor);
        }
        NodeKind::Valve => {
            let bowtie = Path::new(|builder| {
                builder.move_to(Point::new(body.x, body.y));
                builder.line_to(Point::new(body.x + body.width, body.y + body.height));
                builder.line_to(Point::new(body.x + body.width, body.y));
                builder.line_to(Point::new(body.x, body.y + body.height));
                builder.close();
            });
            frame.fill(&bowtie, palette::NODE_BG);
            frame.stroke(&bowtie, border);
        }
        NodeKind::Manifold => {
            let bar = rounded_rect(body.position(), body.size(), 6.0);
            frame.fill(&bar, palette::NODE_BG);
            frame.stroke(&bar, border);
        }
    }

    frame.fill(
        &Path::circle(Point::new(body.x + body.width - 4.0, body.y + 4.0), 4.0),
        status_color(node.online),
    );

    let max_chars = 18;
    let name = if node.name.chars().count() > max_chars {
        format!("{}…", node.name.chars().take(max_chars - 1).collect::<String>())
    } else {
        node.name.clone()
    };
    label(
        frame,
        name,
        Point::new(body.x, body.y + body.height + 6.0),
        12.0,
        palette::TEXT_PRIMARY,
    );

    let set = ports::ports(node.kind);
    for (side, color) in [(PortSide::In, palette::PORT_IN), (PortSide::Out, palette::PORT_OUT)] {
        for port_id in set.side(side) {
            if let Some(pos) = ports::port_position(node, port_id) {
                let radius = if show_ports { PORT_RADIUS } else { PORT_RADIUS / 2.0 };
                frame.fill(&Path::circle(pos, radius), color);
            }
        }
    }
}

fn draw_mode_badge(frame: &mut Frame, mode: Mode, loading: bool) {
    let text = match mode {
        Mode::View => "VIEW  ·  E edit  ·  R refresh",
        Mode::Edit => "EDIT  ·  C connect  ·  A auto-arrange  ·  Del remove pipe",
        Mode::Connect => "EDIT + CONNECT  ·  drag from an outlet to an inlet",
    };
    frame.fill(
        &rounded_rect(Point::new(12.0, 12.0), Size::new(420.0, 28.0), 6.0),
        Color::from_rgba(0.0, 0.0, 0.0, 0.45),
    );
    label(frame, text, Point::new(22.0, 19.0), 12.0, palette::TEXT_PRIMARY);
    if loading {
        label(frame, "Loading…", Point::new(444.0, 19.0), 12.0, palette::TEXT_SECONDARY);
    }
}

fn draw_panel(frame: &mut Frame, size: Size, graph: &Graph, panel: &Panel) {
    let lines: Vec<String> = match panel {
        Panel::Node(id) => {
            let Some(node) = graph.node(id) else {
                return;
            };
            let mut lines = vec![
                node.name.clone(),
                format!("Type: {}", node.kind.as_str()),
                format!("State: {}", node.state.as_deref().unwrap_or("—")),
            ];
            if let Some(level) = node.level_display() {
                lines.push(format!("Level: {level:.1}%"));
            }
            if let Some(location) = &node.location_name {
                lines.push(format!("Location: {location}"));
            }
            if node.kind == NodeKind::Pump {
                lines.push("1 start  ·  0 stop".to_string());
            }
            lines
        }
        Panel::Location(key) => {
            let Some(group) = graph.groups().iter().find(|g| &g.key == key) else {
                return;
            };
            let online = group
                .members
                .iter()
                .filter(|id| graph.node(id).is_some_and(|n| n.online == Some(true)))
                .count();
            vec![
                group.name.clone(),
                format!("Equipment: {}", group.members.len()),
                format!("Online: {online}"),
            ]
        }
    };

    let width = 260.0;
    let line_height = 22.0;
    let height = lines.len() as f32 * line_height + 40.0;
    let origin = Point::new(size.width - width - 16.0, 56.0);
    frame.fill(
        &rounded_rect(origin, Size::new(width, height), 10.0),
        Color::from_rgb(0.12, 0.12, 0.14),
    );
    for (i, line) in lines.into_iter().enumerate() {
        let (text_size, color) = if i == 0 {
            (15.0, palette::TEXT_PRIMARY)
        } else {
            (12.0, palette::TEXT_SECONDARY)
        };
        label(
            frame,
            line,
            Point::new(origin.x + 16.0, origin.y + 16.0 + i as f32 * line_height),
            text_size,
            color,
        );
    }
    label(
        frame,
        "Esc to close",
        Point::new(origin.x + 16.0, origin.y + height - 20.0),
        10.0,
        Color::from_rgba(1.0, 1.0, 1.0, 0.4),
    );
}

fn draw_alert(frame: &mut Frame, size: Size, alert: &str) {
    let width = (size.width - 32.0).min(520.0);
    let origin = Point::new((size.width - width) / 2.0, size.height - 56.0);
    frame.fill(
        &rounded_rect(origin, Size::new(width, 36.0), 8.0),
        Color::from_rgba(0.45, 0.12, 0.12, 0.92),
    );
    label(
        frame,
        format!("{alert}  (Esc)"),
        Point::new(origin.x + 14.0, origin.y + 11.0),
        12.0,
        palette::TEXT_PRIMARY,
    );
}
