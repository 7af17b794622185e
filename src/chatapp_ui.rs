use eframe::egui;

use crate::chatapp::ChatApp;
use crate::llamacli::CommandRunner;
use crate::transcript::{Message, Role};

const SEND_BUTTON_WIDTH: f32 = 60.0;
const INPUT_ID: &str = "chat_input";

impl<R: CommandRunner + 'static> eframe::App for ChatApp<R> {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // Drain finished replies and schedule the next poll
        self.tick(ctx);

        // Top menu bar
        egui::TopBottomPanel::top("menu_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                if ui.button("☰").clicked() {
                    self.show_settings = !self.show_settings;
                    if self.show_settings {
                        self.load_settings_form();
                    }
                }
                ui.label("AI Chatbot");
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    let has_messages = !self.transcript.is_empty();
                    if ui.add_enabled(has_messages, egui::Button::new("Copy")).clicked() {
                        let text = self.transcript.render_plain();
                        ui.output_mut(|o| o.copied_text = text);
                    }
                });
            });
        });

        // Settings window
        if self.show_settings {
            self.show_settings_window(ctx);
        }

        // Input area, pinned below the transcript
        egui::TopBottomPanel::bottom("input_bar").show(ctx, |ui| {
            ui.add_space(6.0);
            self.render_input_row(ui);
            self.render_status(ui);
            ui.add_space(4.0);
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            self.render_transcript(ui);
        });
    }
}

impl<R: CommandRunner + 'static> ChatApp<R> {
    fn render_transcript(&mut self, ui: &mut egui::Ui) {
        let scroll = self.transcript.take_scroll_request();
        egui::ScrollArea::vertical()
            .auto_shrink([false; 2])
            .stick_to_bottom(true)
            .show(ui, |ui| {
                for message in self.transcript.messages() {
                    render_message(ui, message);
                    ui.add_space(8.0);
                }
                if scroll {
                    ui.scroll_to_cursor(Some(egui::Align::BOTTOM));
                }
            });
    }

    fn render_input_row(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            // Text input
            let width = (ui.available_width() - SEND_BUTTON_WIDTH).max(0.0);
            let response = ui.add_sized(
                [width, 24.0],
                egui::TextEdit::singleline(&mut self.input)
                    .id(egui::Id::new(INPUT_ID))
                    .hint_text("Type your message here... (Press Enter to send)")
                    .font(egui::TextStyle::Body),
            );
            // A single-line edit gives up focus on Enter
            let enter = response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));

            // Send button
            if ui.button("Send").clicked() || enter {
                self.submit();
                response.request_focus();
            }
        });
    }

    fn render_status(&self, ui: &mut egui::Ui) {
        let Some(status) = status_text(self.dispatcher.in_flight(), self.dispatcher.backlog_len())
        else {
            return;
        };
        ui.horizontal(|ui| {
            ui.spinner();
            ui.label(status);
        });
    }

    pub fn show_settings_window(&mut self, ctx: &egui::Context) {
        let mut show_settings = self.show_settings;
        egui::Window::new("Settings")
            .open(&mut show_settings)
            .resizable(false)
            .default_width(400.0)
            .show(ctx, |ui| {
                ui.heading("llama-cli");
                ui.add_space(8.0);

                egui::Grid::new("llama_settings_grid")
                    .num_columns(2)
                    .spacing([8.0, 4.0])
                    .show(ui, |ui| {
                        ui.label("Executable:");
                        ui.text_edit_singleline(&mut self.executable);
                        ui.end_row();

                        ui.label("Model:");
                        ui.text_edit_singleline(&mut self.model);
                        ui.end_row();

                        ui.label("Threads:");
                        ui.add(egui::DragValue::new(&mut self.threads).clamp_range(1..=256))
                            .on_hover_text("Passed to llama-cli as -t");
                        ui.end_row();

                        ui.label("Max replies in flight:");
                        ui.add(egui::DragValue::new(&mut self.max_in_flight).clamp_range(1..=64))
                            .on_hover_text("Further messages wait until a reply arrives");
                        ui.end_row();
                    });

                ui.add_space(8.0);

                ui.horizontal(|ui| {
                    if ui.button("Apply").clicked() {
                        self.apply_settings();
                    }
                    if ui.button("Reset to Default").clicked() {
                        self.reset_to_defaults();
                    }
                });

                // Display error message if present
                if let Some(error) = &self.settings_error {
                    ui.colored_label(egui::Color32::RED, error);
                }

                ui.separator();
                ui.label("Current: ").on_hover_text("The command used for the next message");
                ui.label(self.dispatcher.invoker_settings().command_line("<prompt>"));
            });

        self.show_settings = show_settings;
    }
}

fn status_text(in_flight: usize, waiting: usize) -> Option<String> {
    if in_flight == 0 && waiting == 0 {
        return None;
    }
    let noun = if in_flight == 1 { "reply" } else { "replies" };
    if waiting > 0 {
        Some(format!("Waiting for {in_flight} {noun}, {waiting} queued"))
    } else {
        Some(format!("Waiting for {in_flight} {noun}"))
    }
}

fn render_message(ui: &mut egui::Ui, message: &Message) {
    let label = egui::RichText::new(format!("{}: ", message.label())).strong();
    match message.role() {
        Role::Error => {
            ui.label(label.color(egui::Color32::RED));
            ui.label(egui::RichText::new(message.text()).color(egui::Color32::RED));
        }
        Role::User | Role::Assistant => {
            ui.label(label);
            ui.add(egui::Label::new(message.text()).wrap(true));
        }
    }
}
