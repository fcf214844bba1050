use std::cell::RefCell;
use std::rc::Rc;

use eframe::egui;
use egui_plot::{Bar, BarChart, Plot};

use crate::config::ViewerConfig;
use crate::controller::Controller;
use crate::error::ViewerError;
use crate::inference::DecodedImage;

/// Latest frame pushed by the adapter, waiting to be uploaded.
#[derive(Clone, Default)]
pub struct FrameSlot {
    pending: Rc<RefCell<Option<DecodedImage>>>,
}

impl FrameSlot {
    /// Replaces any frame not yet shown.
    pub fn present(&self, image: &DecodedImage) {
        *self.pending.borrow_mut() = Some(image.clone());
    }

    pub fn take(&self) -> Option<DecodedImage> {
        self.pending.borrow_mut().take()
    }
}

fn to_color_image(image: &DecodedImage) -> egui::ColorImage {
    egui::ColorImage::from_rgb([image.width, image.height], &image.pixels)
}

pub struct ViewerApp {
    controller: Controller,
    frames: FrameSlot,
    texture: Option<egui::TextureHandle>,
    slider_values: Vec<i32>,
    config: ViewerConfig,
    status: String,
}

impl ViewerApp {
    /// Subscribes the display to `controller` and renders the first frame.
    pub fn new(mut controller: Controller, config: ViewerConfig) -> Self {
        let frames = FrameSlot::default();
        let sink = frames.clone();
        controller
            .adapter_mut()
            .subscribe(move |image| sink.present(image));

        let status = match controller.start() {
            Ok(()) => "Decoded validation sample".to_string(),
            Err(e) => {
                tracing::warn!("initial decode failed: {e}");
                e.to_string()
            }
        };
        let mut app = Self {
            controller,
            frames,
            texture: None,
            slider_values: Vec::new(),
            config,
            status,
        };
        app.sync_sliders();
        app
    }

    fn sync_sliders(&mut self) {
        self.slider_values = (0..self.controller.controls().len())
            .map(|c| self.controller.slider_position(c).unwrap_or(0))
            .collect();
    }

    fn handle_result(&mut self, result: Result<(), ViewerError>, action: &str) {
        match result {
            Ok(()) => {
                self.status = match self.controller.adapter().last_image() {
                    Some(image) => format!("{action} ({}x{})", image.width, image.height),
                    None => action.to_string(),
                };
            }
            Err(e @ ViewerError::Index { .. }) => {
                debug_assert!(false, "{e}");
                tracing::warn!("ignoring control event: {e}");
            }
            Err(e) => {
                tracing::warn!("render skipped: {e}");
                self.status = e.to_string();
            }
        }
    }

    fn upload_frame(&mut self, ctx: &egui::Context) {
        let Some(image) = self.frames.take() else {
            return;
        };
        let color = to_color_image(&image);
        match &mut self.texture {
            Some(texture) => texture.set(color, egui::TextureOptions::NEAREST),
            None => {
                self.texture = Some(ctx.load_texture("decoded", color, egui::TextureOptions::NEAREST));
            }
        }
    }

    fn draw_sliders(&mut self, ui: &mut egui::Ui) {
        let range = self.config.slider_range();
        for control in 0..self.slider_values.len() {
            let Some(binding) = self.controller.controls().get(control) else {
                continue;
            };
            let label = binding.label.clone();
            let index = binding.index;
            let changed = ui
                .horizontal(|ui| {
                    ui.label(&label);
                    let resp = ui.add(egui::Slider::new(&mut self.slider_values[control], range.clone()));
                    let value = self
                        .controller
                        .adapter()
                        .latent()
                        .coordinate(index)
                        .unwrap_or_default();
                    ui.label(format!("{value:+.3}"));
                    resp.changed()
                })
                .inner;
            if changed {
                let value = self.slider_values[control];
                let result = self.controller.on_control_changed(control, value);
                self.handle_result(result, &format!("{label} = {value}"));
            }
        }
        ui.separator();
        ui.horizontal(|ui| {
            if ui.button("Reset to sample").clicked() {
                let result = self.controller.reset();
                self.handle_result(result, "Reset to validation sample");
                self.sync_sliders();
            }
            if ui.button("Randomize").clicked() {
                let result = self.controller.randomize(&mut rand::thread_rng(), range.clone());
                self.handle_result(result, "Randomized controls");
                self.sync_sliders();
            }
        });
    }

    fn draw_canvas(&self, ui: &mut egui::Ui) {
        let size = egui::vec2(self.config.canvas_size, self.config.canvas_size);
        match &self.texture {
            Some(texture) => {
                let sized = egui::load::SizedTexture::new(texture.id(), size);
                ui.add(egui::Image::new(sized));
            }
            None => {
                ui.allocate_space(size);
            }
        }
    }

    fn draw_latent_plot(&self, ui: &mut egui::Ui) {
        let latent = self.controller.adapter().latent();
        let controlled: Vec<usize> = self.controller.controls().iter().map(|b| b.index).collect();
        let bars = latent
            .as_slice()
            .iter()
            .enumerate()
            .map(|(i, &v)| {
                let color = if controlled.contains(&i) {
                    egui::Color32::from_rgb(0, 200, 120)
                } else {
                    egui::Color32::GRAY
                };
                Bar::new(i as f64, v as f64).width(0.8).fill(color)
            })
            .collect();
        Plot::new("latent")
            .height(120.0)
            .allow_drag(false)
            .allow_zoom(false)
            .allow_scroll(false)
            .show(ui, |plot_ui| plot_ui.bar_chart(BarChart::new(bars)));
    }
}

impl eframe::App for ViewerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        egui::SidePanel::left("controls").show(ctx, |ui| {
            ui.heading("Latent coordinates");
            egui::ScrollArea::vertical().show(ui, |ui| {
                self.draw_sliders(ui);
            });
        });
        // after the sliders so a change made this frame is shown immediately
        self.upload_frame(ctx);
        egui::TopBottomPanel::bottom("latent_plot").show(ctx, |ui| {
            self.draw_latent_plot(ui);
        });
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.label(&self.status);
            ui.separator();
            self.draw_canvas(ui);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OverlayStyle;
    use crate::inference::InferenceAdapter;
    use crate::inference::tests::SyntheticDecoder;
    use crate::latent::{ControlMap, LatentState};

    fn app(decoder: SyntheticDecoder) -> ViewerApp {
        let adapter = InferenceAdapter::new(
            Box::new(decoder),
            LatentState::from_sample(16).unwrap(),
            OverlayStyle::default(),
        );
        let controller = Controller::new(adapter, ControlMap::leading(16), 1.0).unwrap();
        ViewerApp::new(controller, ViewerConfig::default())
    }

    #[test]
    fn startup_pushes_first_frame_and_seeds_sliders() {
        let app = app(SyntheticDecoder::new(64, 8, -5.0));
        assert!(app.frames.take().is_some());
        assert_eq!(app.slider_values.len(), 16);
        assert_eq!(app.slider_values[0], -1);
    }

    #[test]
    fn successful_change_updates_status() {
        let mut app = app(SyntheticDecoder::new(64, 8, -5.0));
        let result = app.controller.on_control_changed(1, 2);
        app.handle_result(result, "z2 = 2");
        assert_eq!(app.status, "z2 = 2 (8x8)");
    }

    #[test]
    fn failed_render_reports_and_keeps_frame() {
        let decoder = SyntheticDecoder::new(64, 8, -5.0);
        let failing = decoder.failing.clone();
        let mut app = app(decoder);
        let first = app.frames.take();
        assert!(first.is_some());

        failing.set(true);
        let result = app.controller.on_control_changed(0, 3);
        app.handle_result(result, "z1 = 3");
        assert!(app.status.contains("decoder unavailable"));
        assert_eq!(app.frames.take(), None);
        assert_eq!(app.controller.adapter().last_image().cloned(), first);
    }

    #[cfg(not(debug_assertions))]
    #[test]
    fn bad_control_index_is_ignored_in_release() {
        let mut app = app(SyntheticDecoder::new(64, 8, -5.0));
        let before = app.status.clone();
        let result = app.controller.on_control_changed(16, 0);
        app.handle_result(result, "z17 = 0");
        assert_eq!(app.status, before);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic]
    fn bad_control_index_is_fatal_in_debug() {
        let mut app = app(SyntheticDecoder::new(64, 8, -5.0));
        let result = app.controller.on_control_changed(16, 0);
        app.handle_result(result, "z17 = 0");
    }

    #[test]
    fn slot_keeps_only_latest_frame() {
        let slot = FrameSlot::default();
        let frame = |v: u8| DecodedImage {
            width: 1,
            height: 1,
            pixels: vec![v; 3],
        };
        slot.present(&frame(1));
        slot.present(&frame(2));
        assert_eq!(slot.take(), Some(frame(2)));
        assert_eq!(slot.take(), None);
    }

    #[test]
    fn color_image_matches_dimensions() {
        let image = DecodedImage {
            width: 2,
            height: 3,
            pixels: vec![10; 18],
        };
        let color = to_color_image(&image);
        assert_eq!(color.size, [2, 3]);
        assert_eq!(color.pixels[5], egui::Color32::from_rgb(10, 10, 10));
    }
}
