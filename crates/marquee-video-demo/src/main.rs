//! marquee-video demo.
//!
//! A vertically scrolling feed of looping video cells. Cells start
//! playback when they scroll into view and stop when they scroll away,
//! exercising the appear/disappear lifecycle the widget is built for.
//!
//! Without the `ffmpeg` feature the cells play a moving test pattern.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use eframe::egui;
use marquee_video::{VideoView, VideoViewDelegate, VideoViewExt};

/// Sample videos for the feed: (title, url)
const SAMPLE_VIDEOS: &[(&str, &str)] = &[
    (
        "Big Buck Bunny",
        "https://download.blender.org/peach/bigbuckbunny_movies/BigBuckBunny_320x180.mp4",
    ),
    (
        "Sintel",
        "https://commondatastorage.googleapis.com/gtv-videos-bucket/sample/Sintel.mp4",
    ),
    (
        "Elephant's Dream",
        "https://archive.org/download/ElephantsDream/ed_hd.mp4",
    ),
];

fn main() -> eframe::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("marquee_video=debug".parse().unwrap())
                .add_directive("marquee_video_core=debug".parse().unwrap()),
        )
        .init();

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([480.0, 800.0])
            .with_title("marquee-video demo"),
        ..Default::default()
    };

    eframe::run_native(
        "marquee-video demo",
        options,
        Box::new(|_cc| Ok(Box::new(DemoApp::new()))),
    )
}

/// Records delegate callbacks so each cell can show live progress.
#[derive(Default)]
struct ProgressProbe {
    duration_ms: AtomicU64,
    frames: AtomicU64,
    last_pts_ms: AtomicU64,
}

impl VideoViewDelegate for ProgressProbe {
    fn duration_loaded(&self, duration: Duration) {
        tracing::info!("Delegate: duration loaded ({:?})", duration);
        self.duration_ms
            .store(duration.as_millis() as u64, Ordering::Relaxed);
    }

    fn frame_rendered(&self, pts: Duration) {
        self.frames.fetch_add(1, Ordering::Relaxed);
        self.last_pts_ms
            .store(pts.as_millis() as u64, Ordering::Relaxed);
    }
}

struct FeedCell {
    title: &'static str,
    view: VideoView,
    probe: Arc<ProgressProbe>,
    visible: bool,
}

impl FeedCell {
    fn new(title: &'static str, url: &str) -> Self {
        let probe = Arc::new(ProgressProbe::default());
        let mut view = VideoView::new(url).with_looping(true);
        view.set_delegate(&probe);
        Self {
            title,
            view,
            probe,
            visible: false,
        }
    }
}

struct DemoApp {
    cells: Vec<FeedCell>,
}

impl DemoApp {
    fn new() -> Self {
        let cells = SAMPLE_VIDEOS
            .iter()
            .map(|(title, url)| FeedCell::new(title, url))
            .collect();
        Self { cells }
    }
}

impl eframe::App for DemoApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        egui::CentralPanel::default().show(ctx, |ui| {
            egui::ScrollArea::vertical().show(ui, |ui| {
                for cell in &mut self.cells {
                    ui.heading(cell.title);

                    let width = ui.available_width();
                    let size = egui::vec2(width, width * 9.0 / 16.0);
                    let response = ui.video_view(&mut cell.view, size);

                    // Drive the lifecycle from cell visibility, the way a
                    // list host would from cell recycling callbacks.
                    let now_visible = ui.is_rect_visible(response.rect);
                    if now_visible && !cell.visible {
                        cell.view.on_appear();
                    } else if !now_visible && cell.visible {
                        cell.view.on_disappear();
                    }
                    cell.visible = now_visible;

                    let duration_ms = cell.probe.duration_ms.load(Ordering::Relaxed);
                    let frames = cell.probe.frames.load(Ordering::Relaxed);
                    let pts_ms = cell.probe.last_pts_ms.load(Ordering::Relaxed);
                    ui.label(format!(
                        "{:?} | {:.1}s / {:.1}s | {} frames | {} loops",
                        cell.view.state(),
                        pts_ms as f64 / 1000.0,
                        duration_ms as f64 / 1000.0,
                        frames,
                        cell.view.loops_completed(),
                    ));
                    if let Some(err) = cell.view.last_error() {
                        ui.colored_label(egui::Color32::RED, err.to_string());
                    }

                    ui.add_space(16.0);
                }
            });
        });
    }
}
