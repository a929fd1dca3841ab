// src/runtime/mod.rs

//! Thread do interpretador: laço de ticks, encerramento cooperativo e a
//! ordem de liberação dos recursos.

pub mod abort;
pub mod run_loop;

pub use abort::{AbortSignal, Halt, Step};
pub use run_loop::{ExitReason, InterpreterParts, RunLoop, TeardownReport, TeardownSteps};

use crate::registers::RegisterFile;
use crate::saved_games::SavedGameStore;
use crate::sound::AudioCompletionSignal;
use crate::video::{SpriteSnapshots, Surface};

/// O que o interpretador enxerga durante um tick.
pub struct TickContext<'a> {
    pub registers: &'a dyn RegisterFile,
    /// Superfície de escrita deste tick. Só vira visível no `publish`.
    pub surface: &'a mut Surface,
    pub sprites: &'a mut SpriteSnapshots,
    pub audio: &'a mut AudioCompletionSignal,
    /// Deve ser consultado em todo laço de espera ativa.
    pub abort: &'a AbortSignal,
    pub saved_games: Option<&'a dyn SavedGameStore>,
    /// Número deste tick desde o início da thread (começa em 0).
    pub tick: u64,
}

/// Uma máquina que executa um tick do jogo por vez.
///
/// Um `Err(Halt::Quit)` encerra a thread sem publicar o tick em andamento.
pub trait Machine: Send {
    fn tick(&mut self, ctx: &mut TickContext<'_>) -> Step;

    /// Chamado uma vez, antes da liberação dos recursos.
    fn shutdown(&mut self) {}
}
