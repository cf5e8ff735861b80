mod render_util;

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use gpui::{
    AnyView, App, Bounds, Context, RenderImage, SharedString, Task, TitlebarOptions, Window,
    WindowBounds, WindowOptions, div, img, prelude::*, px, rgb, size,
};
use gpui_component::{
    Root,
    button::{Button, ButtonVariants},
};
use image::{Frame as ImageFrame, ImageBuffer, Rgba};

use crate::{
    config::AppConfig,
    pipeline::{
        camera,
        detector::{ModelStatus, ort_model_factory},
        overlay::{CanvasText, LABEL_FONT_PX},
    },
    view::ViewController,
};

const WINDOW_TITLE: &str = "FrameAI";
const POLL_INTERVAL: Duration = Duration::from_millis(16);
const LABEL_COLOR: u32 = 0x00ffff;
const BACKGROUND: u32 = 0x111318;

pub fn launch_ui(cx: &mut App, config: AppConfig) -> Result<()> {
    let window_size = size(
        px(config.display_width + 64.0),
        px(config.display_width * 0.75 + 160.0),
    );
    let options = WindowOptions {
        window_bounds: Some(WindowBounds::Windowed(Bounds::centered(
            None,
            window_size,
            cx,
        ))),
        titlebar: Some(TitlebarOptions {
            title: Some(WINDOW_TITLE.into()),
            ..Default::default()
        }),
        ..Default::default()
    };

    cx.open_window(options, move |window, cx| {
        let view = cx.new(|cx| DetectorView::new(&config, window, cx));
        let view: AnyView = view.into();
        cx.new(|cx| Root::new(view, window, cx))
    })?;

    cx.on_window_closed(|cx| {
        if cx.windows().is_empty() {
            cx.quit();
        }
    })
    .detach();
    cx.activate(true);

    Ok(())
}

struct DetectorView {
    controller: ViewController,
    display_width: f32,
    video: Option<Arc<RenderImage>>,
    video_size: Option<(u32, u32)>,
    overlay: Option<Arc<RenderImage>>,
    labels: Vec<CanvasText>,
    _poll: Task<()>,
}

impl DetectorView {
    fn new(config: &AppConfig, window: &mut Window, cx: &mut Context<Self>) -> Self {
        let controller = ViewController::mount(
            config,
            camera::default_backend(),
            ort_model_factory(config),
        );

        Self {
            controller,
            display_width: config.display_width,
            video: None,
            video_size: None,
            overlay: None,
            labels: Vec::new(),
            _poll: Self::start_polling(window, cx),
        }
    }

    fn start_polling(window: &mut Window, cx: &mut Context<Self>) -> Task<()> {
        cx.spawn_in(window, async move |this, cx| {
            loop {
                cx.background_executor().timer(POLL_INTERVAL).await;
                let updated = this.update_in(cx, |view, window, cx| view.refresh(window, cx));
                if updated.is_err() {
                    break;
                }
            }
        })
    }

    fn refresh(&mut self, window: &mut Window, cx: &mut Context<Self>) {
        let update = self.controller.poll();
        if update.is_empty() {
            return;
        }

        if let Some(frame) = update.video {
            self.video_size = Some((frame.width, frame.height));
            if let Some(image) = render_util::frame_to_image(&frame) {
                if let Some(old) = self.video.replace(image) {
                    let _ = window.drop_image(old);
                }
            }
        }

        if let Some(overlay) = update.overlay {
            let image = render_util::overlay_to_image(&overlay);
            if let Some(old) = std::mem::replace(&mut self.overlay, image) {
                let _ = window.drop_image(old);
            }
            self.labels = overlay.labels;
        }

        cx.notify();
    }

    fn status_text(&self) -> Option<SharedString> {
        if self.controller.is_loading() {
            return Some("模型加载中…".into());
        }
        if let ModelStatus::Failed(message) = self.controller.model_status() {
            return Some(format!("模型加载失败：{message}").into());
        }
        None
    }

    fn render_stage(&self) -> impl IntoElement {
        let (frame_width, frame_height) = self.video_size.unwrap_or((4, 3));
        let scale = self.display_width / frame_width.max(1) as f32;

        let mut stage = div()
            .relative()
            .overflow_hidden()
            .w(px(self.display_width))
            .h(px(frame_height as f32 * scale))
            .bg(rgb(0x000000));

        if let Some(video) = &self.video {
            stage = stage.child(img(video.clone()).absolute().top_0().left_0().size_full());
        }
        if let Some(overlay) = &self.overlay {
            stage = stage.child(img(overlay.clone()).absolute().top_0().left_0().size_full());
        }

        // Overlay labels are baseline-anchored in frame pixels.
        stage.children(self.labels.iter().map(|label| {
            div()
                .absolute()
                .left(px(label.x * scale))
                .top(px(label.y * scale - LABEL_FONT_PX))
                .text_size(px(LABEL_FONT_PX))
                .text_color(rgb(LABEL_COLOR))
                .whitespace_nowrap()
                .child(SharedString::from(label.text.clone()))
        }))
    }
}

impl Render for DetectorView {
    fn render(&mut self, _window: &mut Window, cx: &mut Context<Self>) -> impl IntoElement {
        let toggle = Button::new("toggle-camera")
            .primary()
            .label("切换摄像头")
            .on_click(cx.listener(|view, _, _window, cx| {
                view.controller.toggle_facing();
                cx.notify();
            }));

        let facing = SharedString::from(self.controller.facing().label());
        let camera_error = self
            .controller
            .camera_error()
            .map(|message| SharedString::from(format!("摄像头不可用：{message}")));

        div()
            .size_full()
            .flex()
            .flex_col()
            .items_center()
            .gap_3()
            .p_4()
            .bg(rgb(BACKGROUND))
            .text_color(rgb(0xffffff))
            .child(
                div()
                    .flex()
                    .flex_row()
                    .items_center()
                    .gap_3()
                    .child(toggle)
                    .child(facing),
            )
            .children(self.status_text().map(|text| div().text_sm().child(text)))
            .children(camera_error.map(|text| div().text_sm().text_color(rgb(0xff6b6b)).child(text)))
            .when(!self.controller.video_bound(), |this| {
                this.child(div().text_sm().child("未连接摄像头"))
            })
            .child(self.render_stage())
    }
}
