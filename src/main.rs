//! dist_bridge 演示程序
//!
//! 按配置创建后端设备，经 Recorder → Recording → Context 完整走几帧
//! 清屏与填充矩形的提交流程，最后输出资源追踪计数。
//!
//! # 使用方法
//!
//! ```bash
//! # 使用配置文件
//! cargo run
//!
//! # 命令行覆盖
//! cargo run -- --backend dawn --frames 10 --async
//! ```
//!
//! # 流程概览
//!
//! ```text
//! ┌──────────────┐
//! │ BackendContext│  显式选择设备
//! └──────┬───────┘
//!        │ Context::make
//! ┌──────▼───────┐
//! │   Context    │◄─────────────┐
//! └──────┬───────┘              │ insert_recording / submit
//!        │ make_recorder        │
//! ┌──────▼───────┐  snap  ┌─────┴──────┐
//! │   Recorder   ├───────►│ Recording  │
//! └──────┬───────┘        └────────────┘
//!        │ surface::make
//! ┌──────▼───────┐
//! │   Surface    │  canvas 录制命令
//! └──────────────┘
//! ```

use std::sync::Arc;

use anyhow::{bail, Context as _, Result};
use tracing::{debug, info, warn};

use dist_bridge::core::{log, Config};
use dist_bridge::gpu::{
    surface, BackendContext, Color4f, Context, ContextOptions, IRect, ImageInfo, RecorderOptions,
    ResourceKind, ResourceTracker, SyncToCpu,
};

/// 应用程序入口点
///
/// # 初始化流程
///
/// 1. 加载配置文件（config.toml）并应用命令行参数
/// 2. 初始化日志系统
/// 3. 显式创建后端设备与 Context
/// 4. 录制并提交若干帧
fn main() -> Result<()> {
    // 1. 加载配置（在初始化日志之前）
    let mut config = Config::from_file_or_default("config.toml");
    config.apply_args(std::env::args());
    config.validate().context("invalid configuration")?;

    // 2. 初始化日志系统
    let log_file = config
        .logging
        .file_output
        .then_some(config.logging.log_file.as_str());
    log::init_logger(config.logging.level, config.logging.file_output, log_file);
    info!(version = env!("CARGO_PKG_VERSION"), "dist_bridge demo starting");
    info!(
        backend = config.graphics.backend.name(),
        width = config.surface.width,
        height = config.surface.height,
        frames = config.surface.frames,
        sync = config.surface.sync,
        "Configuration loaded"
    );

    let tracker = ResourceTracker::new();
    run(&config, &tracker)?;

    info!(live = ?tracker, "Resource counts after teardown");
    if !tracker.all_released() {
        bail!("{} objects were not released", tracker.total_live());
    }
    info!("All objects released");
    Ok(())
}

fn run(config: &Config, tracker: &Arc<ResourceTracker>) -> Result<()> {
    // 3. 显式创建设备
    let backend = BackendContext::from_config(&config.graphics)
        .with_context(|| format!("failed to create the {} device", config.graphics.backend.name()))?;

    let options = ContextOptions::from(&config.context)
        .with_tracker(Arc::clone(tracker))
        .with_label("demo");
    let mut context = Context::make(&backend, Some(&options)).context("failed to create context")?;
    let mut recorder = context
        .make_recorder(Some(&RecorderOptions::from(&config.recorder)))
        .context("failed to create recorder")?;

    let info = ImageInfo::new(
        (config.surface.width as i32, config.surface.height as i32),
        config.surface.color_type,
        Default::default(),
        None,
    );
    let mut surface = surface::make(&mut recorder, &info, None, None).context("failed to create surface")?;
    info!(
        surface = surface.id(),
        budget_used = recorder.gpu_budget_used(),
        "Render target allocated"
    );

    let sync = SyncToCpu::from(config.surface.sync);
    let palette = [Color4f::RED, Color4f::GREEN, Color4f::BLUE];

    // 4. 录制并提交
    for frame in 0..config.surface.frames {
        let color = palette[frame as usize % palette.len()];
        let inset = (frame as i32 + 1) * 8;
        let rect = IRect::from_ltrb(inset, inset, surface.width() - inset, surface.height() - inset);

        let mut canvas = surface.canvas();
        canvas.clear(color)?;
        canvas.draw_rect(rect, Color4f::WHITE)?;

        let recording = recorder.snap()?;
        debug!(frame, commands = recording.command_count(), "Frame recorded");

        if !context.insert_recording(recording) || !context.submit(Some(sync)) {
            let reason = context
                .last_error()
                .map(ToString::to_string)
                .unwrap_or_else(|| "unknown".into());
            bail!("frame {} failed: {}", frame, reason);
        }
        context.check_async_work_completion();
        info!(
            frame,
            submitted = context.submitted_fence().value(),
            completed = context.completed_fence().value(),
            "Frame submitted"
        );
    }

    let mut pixels = vec![0u8; info.compute_byte_size(info.min_row_bytes())];
    if context.read_pixels(&surface, &mut pixels, info.min_row_bytes()) {
        info!(first_pixel = ?&pixels[..info.bytes_per_pixel()], "Read back final frame");
    } else if let Some(err) = context.last_error() {
        warn!(error = %err, "Pixel read-back unavailable");
    }

    info!(
        contexts = tracker.live(ResourceKind::Context),
        recorders = tracker.live(ResourceKind::Recorder),
        surfaces = tracker.live(ResourceKind::Surface),
        render_targets = tracker.live(ResourceKind::RenderTarget),
        "Live objects before teardown"
    );
    Ok(())
}
