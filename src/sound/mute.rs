use std::sync::Arc;

use super::{AudioError, Completion, WavePlayer};

/// Backend sem dispositivo: todo som termina no instante em que começa.
#[derive(Default)]
pub struct MutePlayer;

impl MutePlayer {
    pub fn new() -> Self {
        Self
    }
}

impl WavePlayer for MutePlayer {
    fn play_wave_data(&mut self, _wave_data: Arc<[u8]>, on_end: Completion) -> Result<(), AudioError> {
        on_end.complete();
        Ok(())
    }

    fn stop_playing(&mut self, _wait: bool) {}

    fn reset(&mut self) {}

    fn dispose(&mut self) {}
}
