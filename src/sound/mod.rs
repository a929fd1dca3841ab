// src/sound/mod.rs

//! Som: reprodução de WAV e sinalização de término via flag.
//!
//! O interpretador pede um som informando a flag que deve virar `true` quando
//! ele acabar. Scripts costumam esperar essa flag em laço, então ela precisa
//! ser gravada sempre, exatamente uma vez: no fim natural, num `stop`, ou
//! imediatamente quando não há dispositivo de áudio.

pub mod completion;
pub mod mute;
pub mod rodio_player;
pub mod wave;

pub use completion::Completion;
pub use mute::MutePlayer;
pub use rodio_player::RodioWavePlayer;

use std::sync::Arc;

use log::{debug, trace, warn};
use thiserror::Error;

use crate::registers::{RegisterFile, FLAG_SOUND_ON};

/// Erros do subsistema de áudio.
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Dispositivo de áudio indisponível: {0}")]
    DeviceUnavailable(String),

    #[error("Falha ao decodificar o WAV: {0}")]
    Decode(String),

    #[error("Thread de áudio encerrada")]
    WorkerGone,

    #[error("Falha ao iniciar a thread de áudio: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Capacidade de tocar dados WAV, implementada por plataforma.
///
/// O backend recebe um [`Completion`] e deve chamá-lo quando o som terminar
/// naturalmente. Não precisa se preocupar com `stop`/`reset`: o
/// [`AudioCompletionSignal`] cuida da flag nesses casos.
pub trait WavePlayer: Send {
    /// Começa a tocar `wave_data` de forma assíncrona.
    fn play_wave_data(&mut self, wave_data: Arc<[u8]>, on_end: Completion) -> Result<(), AudioError>;

    /// Pede para parar. Com `wait`, só retorna depois que o backend parou.
    fn stop_playing(&mut self, wait: bool);

    /// Volta ao estado inicial (troca de sala, jogo restaurado).
    fn reset(&mut self);

    /// Libera o dispositivo de áudio.
    fn dispose(&mut self);
}

/// Liga pedidos de som às flags de término no banco de registradores.
pub struct AudioCompletionSignal {
    player: Box<dyn WavePlayer>,
    registers: Arc<dyn RegisterFile>,
    pending: Option<Completion>,
    /// Flag do último pedido de som, mesmo já concluído.
    last_flag: Option<usize>,
    disposed: bool,
}

impl AudioCompletionSignal {
    pub fn new(player: Box<dyn WavePlayer>, registers: Arc<dyn RegisterFile>) -> Self {
        Self {
            player,
            registers,
            pending: None,
            last_flag: None,
            disposed: false,
        }
    }

    /// Toca `payload` e grava `true` em `completion_flag` ao terminar.
    ///
    /// Qualquer som anterior é parado antes (e sua flag é gravada). Se o som
    /// estiver desligado (flag SOUNDON) ou o dispositivo falhar, a flag é
    /// gravada imediatamente.
    pub fn play(&mut self, payload: Arc<[u8]>, completion_flag: usize) {
        self.stop(true);

        self.registers.set_flag(completion_flag, false);
        self.last_flag = Some(completion_flag);
        let completion = Completion::new(Arc::clone(&self.registers), completion_flag);

        if self.disposed || !self.sound_enabled() {
            completion.complete();
            return;
        }

        match self.player.play_wave_data(payload, completion.clone()) {
            Ok(()) => {
                debug!("Playing sound, completion flag {}", completion_flag);
                self.pending = Some(completion);
            }
            Err(e) => {
                warn!("Sound playback unavailable ({}); completing flag {} immediately", e, completion_flag);
                completion.complete();
            }
        }
    }

    /// Para o som atual e garante que a flag de término seja gravada.
    ///
    /// Com `wait = true`, só retorna depois que a gravação da flag foi
    /// aplicada. Com `wait = false`, nunca bloqueia; se a thread de áudio
    /// estiver gravando a flag nesse instante, ela termina o trabalho.
    pub fn stop(&mut self, wait: bool) {
        let Some(completion) = self.pending.take() else {
            return;
        };

        self.player.stop_playing(wait);
        if wait {
            completion.complete();
        } else if completion.try_complete().is_none() {
            trace!("Completion flag {} busy, audio thread finishes it", completion.flag());
        }
    }

    /// Descarta o som pendente sem gravar sua flag e deixa a flag do último
    /// pedido em `false`, tenha ele terminado ou não. Nenhuma conclusão
    /// pendente dispara depois disso.
    pub fn reset(&mut self) {
        if let Some(completion) = self.pending.take() {
            completion.cancel();
        }
        if let Some(flag) = self.last_flag {
            self.registers.set_flag(flag, false);
        }
        self.player.reset();
    }

    /// Indica se há um som tocando cuja flag ainda não foi gravada.
    pub fn is_playing(&self) -> bool {
        self.pending.as_ref().is_some_and(|c| c.is_armed())
    }

    /// Para tudo e libera o dispositivo. Pedidos posteriores completam na hora.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.stop(true);
        self.player.dispose();
        self.disposed = true;
    }

    fn sound_enabled(&self) -> bool {
        FLAG_SOUND_ON >= self.registers.flag_count() || self.registers.get_flag(FLAG_SOUND_ON)
    }
}

impl Drop for AudioCompletionSignal {
    fn drop(&mut self) {
        self.dispose();
    }
}
