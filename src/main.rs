//! AGIStrife - janela e thread de apresentação

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use agistrife::config::{Config, Preferences};
use agistrife::demo::{DemoMachine, GAME_ID, KEY_ESCAPE, KEY_RESTORE, KEY_SAVE};
use agistrife::registers::{RegisterFile, SharedRegisterFile, TickSource, FLAG_SOUND_ON, VAR_LAST_CHAR};
use agistrife::runtime::{InterpreterParts, RunLoop, TeardownReport};
use agistrife::saved_games::FsSavedGameStore;
use agistrife::sound::{AudioCompletionSignal, MutePlayer, RodioWavePlayer, WavePlayer};
use agistrife::video::adapter::{blit_scaled, save_screenshot};
use agistrife::video::{FrameBufferPipeline, FramePresenter, SpriteSnapshots, PICTURE_HEIGHT, PICTURE_WIDTH};
use anyhow::{Context, Result};
use log::{info, warn};
use minifb::{Key, KeyRepeat, Window, WindowOptions};

const DEFAULT_CONFIG: &str = "agistrife.ron";

/// Abre o dispositivo de áudio ou cai para o backend mudo.
fn open_audio() -> Box<dyn WavePlayer> {
    match RodioWavePlayer::new() {
        Ok(player) => Box::new(player),
        Err(e) => {
            warn!("{}; continuing without sound", e);
            Box::new(MutePlayer::new())
        }
    }
}

/// Teclas viram `LAST_CHAR`, como o interpretador espera.
fn handle_input(window: &Window, registers: &dyn RegisterFile) {
    let mapping: [(Key, u8); 3] = [(Key::Escape, KEY_ESCAPE), (Key::S, KEY_SAVE), (Key::R, KEY_RESTORE)];
    for (key, code) in mapping {
        if window.is_key_pressed(key, KeyRepeat::No) {
            registers.set_var(VAR_LAST_CHAR, code);
        }
    }
}

fn take_screenshot(presenter: &mut FramePresenter, config: &Config, count: &mut u32) {
    let path: PathBuf = PathBuf::from(format!("screenshot_{:03}.png", *count));
    let frame = presenter.acquire_for_display();
    match save_screenshot(&frame, config.palette, &path) {
        Ok(()) => {
            info!("Screenshot saved to {}", path.display());
            *count += 1;
        }
        Err(e) => warn!("{:#}", e),
    }
}

fn main() -> Result<()> {
    // Inicializa logging
    env_logger::init();

    let config_path: PathBuf = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));

    let mut preferences: Preferences = Preferences::load(config_path.clone())
        .with_context(|| format!("Failed to load preferences: {}", config_path.display()))?;
    preferences.update(|c| c.last_game_id = Some(GAME_ID.to_string()));
    let config: Config = preferences.config().clone();

    println!("AGIStrife - AGI runtime demo");
    println!("  ESC: quit   S: save   R: restore   F12: screenshot");
    println!();

    // Estado compartilhado entre as threads
    let registers: Arc<SharedRegisterFile> = Arc::new(SharedRegisterFile::new());
    registers.set_flag(FLAG_SOUND_ON, config.sound_enabled);

    let (producer, mut presenter) = FrameBufferPipeline::new(PICTURE_WIDTH, PICTURE_HEIGHT);
    let audio = AudioCompletionSignal::new(open_audio(), registers.clone());

    let parts = InterpreterParts {
        registers: registers.clone(),
        producer,
        audio,
        sprites: SpriteSnapshots::new(),
        preferences: Some(preferences),
        saved_games: Some(Box::new(FsSavedGameStore::new(config.saved_games_root.clone()))),
    };
    let mut run_loop: RunLoop = RunLoop::start(Box::new(DemoMachine::new()), parts)
        .context("Failed to start interpreter thread")?;

    // Pixels AGI são duas vezes mais largos que altos.
    let scale_y: usize = config.window_scale.max(1);
    let scale_x: usize = scale_y * 2;
    let window_width: usize = PICTURE_WIDTH * scale_x;
    let window_height: usize = PICTURE_HEIGHT * scale_y;
    let mut buffer: Vec<u32> = vec![0u32; window_width * window_height];

    let mut window: Window = Window::new("AGIStrife", window_width, window_height, WindowOptions::default())
        .context("Failed to create window")?;

    let mut ticks: TickSource = TickSource::with_rate(Instant::now(), config.tick_rate);
    let target_frame_time: Duration = Duration::from_nanos(16_666_667);
    let mut screenshots: u32 = 0;

    // Loop principal (thread de apresentação)
    while window.is_open() && run_loop.is_running() {
        let frame_start: Instant = Instant::now();

        if ticks.advance(frame_start, registers.as_ref()) > 0 {
            run_loop.animation_tick();
        }

        handle_input(&window, registers.as_ref());

        if window.is_key_pressed(Key::F12, KeyRepeat::No) {
            take_screenshot(&mut presenter, &config, &mut screenshots);
        }

        {
            let frame = presenter.acquire_for_display();
            blit_scaled(&frame, config.palette, &mut buffer, scale_x, scale_y);
        }

        window
            .update_with_buffer(&buffer, window_width, window_height)
            .context("Failed to update window buffer")?;

        let elapsed: Duration = frame_start.elapsed();
        if elapsed < target_frame_time {
            std::thread::sleep(target_frame_time - elapsed);
        }
    }

    if run_loop.is_running() {
        info!("Window closed - stopping interpreter");
        run_loop.stop();
    }
    let report: TeardownReport = run_loop.join();

    info!(
        "Exit: {:?}, ticks: {}, frames: {}, teardown: {:?}",
        report.reason, report.ticks_run, report.frames_published, report.steps
    );
    if !report.is_complete() {
        warn!("Teardown incomplete: {:?}", report.steps);
    }

    println!("Goodbye!");
    Ok(())
}
