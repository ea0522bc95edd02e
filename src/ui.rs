use crate::api::Decision;
use crate::join::JoinFlow;
use crate::models::DeviceStatus;
use crate::render::{Level, NodeRef, Transition};
use crate::session::{Command, SessionHandle};
use crate::view::{ConsoleView, SharedView};
use eframe::egui;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

const NODE_RADIUS: f32 = 9.0;
const ROUTER_RADIUS: f32 = 16.0;

fn status_color(status: DeviceStatus) -> egui::Color32 {
    match status {
        DeviceStatus::Online => egui::Color32::from_rgb(25, 135, 84),
        DeviceStatus::Offline => egui::Color32::from_rgb(108, 117, 125),
        DeviceStatus::Pending => egui::Color32::from_rgb(255, 193, 7),
        DeviceStatus::Intruder => egui::Color32::from_rgb(220, 53, 69),
    }
}

fn level_color(level: Level) -> egui::Color32 {
    match level {
        Level::Info => egui::Color32::from_rgb(13, 110, 253),
        Level::Success => egui::Color32::from_rgb(25, 135, 84),
        Level::Warning => egui::Color32::from_rgb(204, 150, 0),
        Level::Danger => egui::Color32::from_rgb(200, 50, 50),
    }
}

/// Pulse factor in 0..=1 for a running transition.
fn pulse(transition: Transition, started: Instant) -> f32 {
    let period = match transition {
        Transition::OnlineGlow => 1.2,
        Transition::PendingPulse => 1.0,
        Transition::IntruderFlash => 0.8,
    };
    let phase = started.elapsed().as_secs_f32() / period;
    0.5 - 0.5 * (phase * std::f32::consts::TAU).cos()
}

pub struct NetworkConsoleApp {
    view: SharedView,
    session: SessionHandle,
    poll_interval: Duration,
    intruders_tab: bool,
}

impl NetworkConsoleApp {
    pub fn new(
        _cc: &eframe::CreationContext<'_>,
        view: SharedView,
        session: SessionHandle,
        poll_interval: Duration,
    ) -> Self {
        session.send(Command::Start);
        Self {
            view,
            session,
            poll_interval,
            intruders_tab: false,
        }
    }

    fn render_header(&self, ui: &mut egui::Ui, view: &ConsoleView) {
        ui.horizontal(|ui| {
            ui.add_space(10.0);

            // Title
            ui.heading("🖧 Network Access Console");
            ui.add_space(20.0);
            ui.label(&view.network_name);

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                ui.add_space(10.0);

                // Session status
                if view.session_active {
                    ui.colored_label(
                        egui::Color32::from_rgb(25, 135, 84),
                        format!(
                            "▶ Session active - Polling every {}s",
                            self.poll_interval.as_secs()
                        ),
                    );
                } else {
                    ui.colored_label(egui::Color32::GRAY, "ℹ Session not started");
                }
            });
        });

        ui.add_space(5.0);
        ui.separator();
    }

    fn info_box(ui: &mut egui::Ui, title: &str, value: String) {
        egui::Frame::none()
            .fill(egui::Color32::from_rgb(240, 240, 240))
            .stroke(egui::Stroke::new(1.0, egui::Color32::from_rgb(200, 200, 200)))
            .inner_margin(15.0)
            .show(ui, |ui| {
                ui.set_width(180.0);
                ui.vertical(|ui| {
                    ui.label(egui::RichText::new(title).strong());
                    ui.label(
                        egui::RichText::new(value)
                            .size(16.0)
                            .color(egui::Color32::from_rgb(50, 50, 50)),
                    );
                });
            });
    }

    fn render_info_panel(&self, ui: &mut egui::Ui, view: &ConsoleView) {
        ui.horizontal(|ui| {
            ui.add_space(5.0);
            Self::info_box(ui, "👥 Members", view.member_count.to_string());
            ui.add_space(5.0);
            Self::info_box(ui, "📨 Pending Requests", view.badges.requests.to_string());
            ui.add_space(5.0);
            Self::info_box(ui, "🔔 Alerts", view.badges.total().to_string());
        });
    }

    fn render_control_buttons(&self, ui: &mut egui::Ui, view: &ConsoleView) {
        ui.horizontal(|ui| {
            ui.add_space(5.0);

            let start = egui::Button::new(
                egui::RichText::new("▶ Start Session").color(egui::Color32::WHITE),
            )
            .fill(egui::Color32::from_rgb(0, 120, 215));
            if ui
                .add_enabled_ui(!view.session_active, |ui| ui.add_sized([140.0, 35.0], start))
                .inner
                .clicked()
            {
                self.session.send(Command::Start);
            }

            ui.add_space(5.0);

            let end = egui::Button::new(
                egui::RichText::new("■ End Session").color(egui::Color32::WHITE),
            )
            .fill(egui::Color32::from_rgb(200, 50, 50));
            if ui
                .add_enabled_ui(view.session_active, |ui| ui.add_sized([140.0, 35.0], end))
                .inner
                .clicked()
            {
                self.session.send(Command::Stop);
            }

            ui.add_space(5.0);

            // Refresh Button
            if ui
                .add_sized(
                    [120.0, 35.0],
                    egui::Button::new(egui::RichText::new("🔄 Refresh").color(egui::Color32::BLACK))
                        .fill(egui::Color32::from_rgb(230, 230, 230)),
                )
                .clicked()
            {
                self.session.send(Command::Refresh);
            }
        });
    }

    fn render_graph(&self, ui: &mut egui::Ui, view: &ConsoleView) {
        let size = ui.available_size();
        let (response, painter) = ui.allocate_painter(size, egui::Sense::click());
        let rect = response.rect;
        painter.rect_filled(rect, 4.0, egui::Color32::from_rgb(33, 37, 41));

        let scale = 0.5 * rect.width().min(rect.height()) - 2.0 * ROUTER_RADIUS;
        let to_screen = |pos: egui::Pos2| rect.center() + pos.to_vec2() * scale;
        let router = rect.center();

        // edges first so nodes sit on top
        for (node, entry) in &view.nodes {
            if *node != NodeRef::Router {
                painter.line_segment(
                    [router, to_screen(entry.pos)],
                    egui::Stroke::new(1.0, egui::Color32::from_white_alpha(60)),
                );
            }
        }

        let pointer = response.hover_pos();
        let mut hovered = None;
        for (node, entry) in &view.nodes {
            let center = to_screen(entry.pos);
            let (radius, mut color) = match node {
                NodeRef::Router => (ROUTER_RADIUS, egui::Color32::from_rgb(13, 110, 253)),
                _ => (NODE_RADIUS, status_color(entry.status)),
            };
            if entry.status == DeviceStatus::Offline && *node != NodeRef::Router {
                color = color.gamma_multiply(0.6);
            }
            if let Some((transition, started)) = entry.transition {
                let glow = pulse(transition, started);
                painter.circle_filled(center, radius + 4.0 * glow, color.gamma_multiply(0.35));
            }
            painter.circle_filled(center, radius, color);

            let is_hovered = pointer.map_or(false, |p| p.distance(center) <= radius + 2.0);
            let border = if is_hovered {
                egui::Stroke::new(2.0, egui::Color32::WHITE)
            } else {
                egui::Stroke::new(1.5, egui::Color32::from_white_alpha(100))
            };
            painter.circle_stroke(center, radius, border);
            if is_hovered {
                hovered = Some(*node);
                painter.text(
                    center - egui::vec2(0.0, radius + 4.0),
                    egui::Align2::CENTER_BOTTOM,
                    &entry.label,
                    egui::FontId::proportional(12.0),
                    egui::Color32::WHITE,
                );
            }
        }

        if response.clicked() {
            if let Some(node) = hovered {
                self.session.send(Command::Select(node));
            }
        }
    }

    fn render_sidebar(&mut self, ui: &mut egui::Ui, view: &ConsoleView) {
        ui.horizontal(|ui| {
            if ui
                .selectable_label(
                    !self.intruders_tab,
                    format!("Join Requests ({})", view.badges.requests),
                )
                .clicked()
            {
                self.intruders_tab = false;
            }
            let intruder_label = if view.badges.intruder_badge_visible {
                egui::RichText::new(format!("Intruders ({})", view.badges.intruders))
                    .color(egui::Color32::from_rgb(220, 53, 69))
            } else {
                egui::RichText::new("Intruders")
            };
            if ui.selectable_label(self.intruders_tab, intruder_label).clicked() {
                self.intruders_tab = true;
                self.session.send(Command::AcknowledgeIntruders);
            }
        });
        ui.separator();

        egui::ScrollArea::vertical().show(ui, |ui| {
            if self.intruders_tab {
                for alert in &view.alerts {
                    egui::Frame::none()
                        .fill(egui::Color32::from_rgb(255, 240, 240))
                        .inner_margin(8.0)
                        .show(ui, |ui| {
                            ui.set_width(ui.available_width());
                            ui.label(
                                egui::RichText::new(format!("Intruder from IP: {}", alert.ip_address))
                                    .strong(),
                            );
                            ui.label(format!("MAC: {}", alert.mac_address));
                            ui.label(format!("Note: {}", alert.note));
                            ui.small(&alert.detected_at);
                        });
                    ui.add_space(2.0);
                }
                return;
            }

            for row in &view.requests {
                egui::Frame::none()
                    .fill(egui::Color32::from_rgb(250, 250, 250))
                    .inner_margin(8.0)
                    .show(ui, |ui| {
                        ui.set_width(ui.available_width());
                        ui.horizontal(|ui| {
                            ui.vertical(|ui| {
                                ui.label(egui::RichText::new(&row.user_email).strong());
                                ui.label(format!("Device: {}", row.device));
                                ui.small(format!("IP: {}", row.ip_address));
                                ui.small(&row.requested_at);
                            });
                            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                                if ui
                                    .button(egui::RichText::new("✖").color(egui::Color32::from_rgb(200, 50, 50)))
                                    .clicked()
                                {
                                    self.session.send(Command::Decide(row.id, Decision::Reject));
                                }
                                if ui
                                    .button(egui::RichText::new("✔").color(egui::Color32::from_rgb(50, 150, 50)))
                                    .clicked()
                                {
                                    self.session.send(Command::Decide(row.id, Decision::Approve));
                                }
                            });
                        });
                    });
                ui.add_space(2.0);
            }
        });
    }

    fn render_toasts(ctx: &egui::Context, view: &ConsoleView) {
        egui::Area::new("toasts")
            .anchor(egui::Align2::RIGHT_TOP, egui::vec2(-12.0, 12.0))
            .show(ctx, |ui| {
                for toast in &view.toasts {
                    egui::Frame::none()
                        .fill(level_color(toast.level))
                        .rounding(6.0)
                        .inner_margin(10.0)
                        .show(ui, |ui| {
                            ui.set_max_width(280.0);
                            ui.label(egui::RichText::new(&toast.title).strong().color(egui::Color32::WHITE));
                            ui.label(egui::RichText::new(&toast.body).color(egui::Color32::WHITE));
                        });
                    ui.add_space(6.0);
                }
            });
    }
}

impl eframe::App for NetworkConsoleApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let view = self.view.clone();
        let mut view = view.lock();
        view.prune_toasts(Instant::now());

        egui::SidePanel::right("sidebar")
            .default_width(300.0)
            .show(ctx, |ui| {
                ui.add_space(10.0);
                self.render_sidebar(ui, &view);
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.add_space(10.0);

            self.render_header(ui, &view);
            ui.add_space(15.0);

            self.render_info_panel(ui, &view);
            ui.add_space(15.0);

            self.render_control_buttons(ui, &view);
            ui.add_space(15.0);

            self.render_graph(ui, &view);
        });

        Self::render_toasts(ctx, &view);
        drop(view);

        // Request repaint for smooth updates
        ctx.request_repaint_after(Duration::from_millis(100));
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        self.session.send(Command::Shutdown);
    }
}

pub struct JoinApp {
    flow: Arc<Mutex<JoinFlow>>,
    outgoing: mpsc::UnboundedSender<String>,
    device_input: String,
}

impl JoinApp {
    pub fn new(
        _cc: &eframe::CreationContext<'_>,
        flow: Arc<Mutex<JoinFlow>>,
        outgoing: mpsc::UnboundedSender<String>,
    ) -> Self {
        let device_input = flow
            .lock()
            .map(|f| f.device_id.map(|id| id.to_string()).unwrap_or_default())
            .unwrap_or_default();
        Self {
            flow,
            outgoing,
            device_input,
        }
    }
}

impl eframe::App for JoinApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let mut flow = self.flow.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.add_space(10.0);
            ui.heading("🔑 Join Network");
            ui.add_space(10.0);

            ui.horizontal(|ui| {
                ui.label("Device ID:");
                if ui.text_edit_singleline(&mut self.device_input).changed() {
                    flow.device_id = self.device_input.trim().parse().ok();
                }
            });
            ui.add_space(10.0);

            let (message, level) = flow.status();
            egui::Frame::none()
                .fill(level_color(level).gamma_multiply(0.15))
                .stroke(egui::Stroke::new(1.0, level_color(level)))
                .inner_margin(12.0)
                .show(ui, |ui| {
                    ui.set_width(ui.available_width());
                    ui.colored_label(level_color(level), format!("ℹ {}", message));
                });
            ui.add_space(10.0);

            let button = egui::Button::new(
                egui::RichText::new("Request Access").color(egui::Color32::WHITE),
            )
            .fill(egui::Color32::from_rgb(0, 120, 215));
            if ui
                .add_enabled_ui(flow.can_submit(), |ui| ui.add_sized([160.0, 35.0], button))
                .inner
                .clicked()
            {
                if let Some(frame) = flow.begin_send() {
                    let _ = self.outgoing.send(frame);
                }
            }
        });

        drop(flow);
        ctx.request_repaint_after(Duration::from_millis(200));
    }
}
