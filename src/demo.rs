// src/demo.rs

//! Máquina de demonstração.
//!
//! Não interpreta scripts AGI: desenha um cenário com faixas de prioridade,
//! move um sprite que quica nas bordas (com apagar/redesenhar pelo fundo
//! salvo), toca um bipe a cada batida e mostra os segundos do relógio do jogo
//! numa barra no topo.

use std::sync::Arc;

use anyhow::Context;
use log::{debug, info};

use crate::registers::{RegisterFile, VAR_LAST_CHAR, VAR_SECONDS};
use crate::runtime::{Halt, Machine, Step, TickContext};
use crate::saved_games::{restore_game, save_game};
use crate::sound::wave::square_wave_wav;
use crate::video::{Rect, Surface};

pub const KEY_ESCAPE: u8 = 27;
pub const KEY_SAVE: u8 = b's';
pub const KEY_RESTORE: u8 = b'r';

/// Flag gravada quando o bipe termina.
pub const BEEP_DONE_FLAG: usize = 200;

/// Variáveis com a posição do sprite (salvas junto com o jogo).
pub const VAR_SPRITE_X: usize = 100;
pub const VAR_SPRITE_Y: usize = 101;

/// Id usado nos arquivos de jogo salvo.
pub const GAME_ID: &str = "DEMO";
const SAVE_SLOT: u32 = 1;

const SPRITE_OBJECT: usize = 0;
const SPRITE_SIZE: usize = 8;
const SPRITE_COLOR: u8 = 14;
const SPRITE_PRIORITY: u8 = 15;

const CLOCK_ROW_HEIGHT: usize = 2;
const CLOCK_COLOR: u8 = 15;

pub struct DemoMachine {
    dx: i32,
    dy: i32,
    background_drawn: bool,
    beep: Arc<[u8]>,
}

impl Default for DemoMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl DemoMachine {
    pub fn new() -> Self {
        Self {
            dx: 1,
            dy: 1,
            background_drawn: false,
            beep: Arc::from(square_wave_wav(880, 60, 22050)),
        }
    }

    /// Trata a última tecla. Retorna `Err(Halt::Quit)` no Escape.
    fn handle_key(&mut self, ctx: &mut TickContext<'_>) -> Step {
        let key: u8 = ctx.registers.get_var(VAR_LAST_CHAR);
        if key == 0 {
            return Ok(());
        }
        ctx.registers.set_var(VAR_LAST_CHAR, 0);

        match key {
            KEY_ESCAPE => {
                info!("Escape pressed, quitting");
                return Err(Halt::Quit);
            }
            KEY_SAVE => {
                if let Some(store) = ctx.saved_games {
                    let saved = save_game(store, GAME_ID, SAVE_SLOT, "Demo", ctx.registers)
                        .context("Failed to save demo state")?;
                    debug!("Save requested: {}", saved);
                }
            }
            KEY_RESTORE => {
                if let Some(store) = ctx.saved_games {
                    let restored =
                        restore_game(store, GAME_ID, SAVE_SLOT, ctx.registers, ctx.audio, ctx.sprites)
                            .context("Failed to restore demo state")?;
                    if restored {
                        self.background_drawn = false;
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn sprite_bounds(registers: &dyn RegisterFile) -> Rect {
        // A posição é guardada com deslocamento para caber em u8 e permitir
        // sair um pouco pela esquerda/topo.
        let x = registers.get_var(VAR_SPRITE_X) as i32 - SPRITE_SIZE as i32 / 2;
        let y = registers.get_var(VAR_SPRITE_Y) as i32 - SPRITE_SIZE as i32 / 2;
        Rect::new(x, y, SPRITE_SIZE, SPRITE_SIZE)
    }

    /// Avança o sprite; retorna `true` se bateu numa borda.
    fn move_sprite(&mut self, registers: &dyn RegisterFile, surface: &Surface) -> bool {
        let half = SPRITE_SIZE as i32 / 2;
        let max_x = surface.width as i32 - half;
        let max_y = surface.height as i32 - half;

        let mut x = registers.get_var(VAR_SPRITE_X) as i32 + self.dx;
        let mut y = registers.get_var(VAR_SPRITE_Y) as i32 + self.dy;
        let mut bounced = false;

        if x <= 0 || x >= max_x {
            self.dx = -self.dx;
            x = x.clamp(0, max_x);
            bounced = true;
        }
        if y <= 0 || y >= max_y {
            self.dy = -self.dy;
            y = y.clamp(0, max_y);
            bounced = true;
        }

        registers.set_var(VAR_SPRITE_X, x.clamp(0, 255) as u8);
        registers.set_var(VAR_SPRITE_Y, y.clamp(0, 255) as u8);
        bounced
    }
}

/// Cenário: faixas horizontais, prioridade crescendo para baixo.
pub fn draw_background(surface: &mut Surface) {
    let band_height = (surface.height / 8).max(1);
    for y in 0..surface.height {
        let band = (y / band_height) as u8;
        let color = 1 + band % 6;
        let priority = 4 + band.min(10);
        surface.fill_rect(Rect::new(0, y as i32, surface.width, 1), color, priority);
    }
}

fn draw_sprite(surface: &mut Surface, bounds: Rect) {
    for dy in 0..bounds.height as i32 {
        for dx in 0..bounds.width as i32 {
            // Moldura com o miolo transparente.
            let edge = dx == 0 || dy == 0 || dx == bounds.width as i32 - 1 || dy == bounds.height as i32 - 1;
            if edge {
                surface.set_pixel(bounds.x + dx, bounds.y + dy, SPRITE_COLOR, SPRITE_PRIORITY);
            }
        }
    }
}

fn draw_clock(surface: &mut Surface, seconds: u8) {
    let width = (seconds as usize * surface.width / 60).min(surface.width);
    surface.fill_rect(Rect::new(0, 0, surface.width, CLOCK_ROW_HEIGHT), 0, 4);
    surface.fill_rect(Rect::new(0, 0, width, CLOCK_ROW_HEIGHT), CLOCK_COLOR, 4);
}

impl Machine for DemoMachine {
    fn tick(&mut self, ctx: &mut TickContext<'_>) -> Step {
        self.handle_key(ctx)?;

        if self.background_drawn {
            ctx.sprites.restore_all(ctx.surface).map_err(anyhow::Error::from)?;
        } else {
            draw_background(ctx.surface);
            ctx.sprites.clear();
            if ctx.registers.get_var(VAR_SPRITE_X) == 0 {
                ctx.registers.set_var(VAR_SPRITE_X, (ctx.surface.width / 2) as u8);
                ctx.registers.set_var(VAR_SPRITE_Y, (ctx.surface.height / 2) as u8);
            }
            self.background_drawn = true;
        }

        draw_clock(ctx.surface, ctx.registers.get_var(VAR_SECONDS));

        if self.move_sprite(ctx.registers, ctx.surface) && !ctx.audio.is_playing() {
            ctx.audio.play(Arc::clone(&self.beep), BEEP_DONE_FLAG);
        }

        let bounds = Self::sprite_bounds(ctx.registers);
        ctx.sprites.capture(SPRITE_OBJECT, ctx.surface, bounds);
        draw_sprite(ctx.surface, bounds);
        Ok(())
    }

    fn shutdown(&mut self) {
        debug!("Demo machine shutting down");
    }
}
