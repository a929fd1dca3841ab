// src/sound/rodio_player.rs

//! Backend de áudio com `rodio`.
//!
//! O stream de saída não é `Send` em todas as plataformas, então uma thread
//! dedicada abre o dispositivo e é dona dele até o fim. O resto do programa
//! conversa com ela por um canal de comandos.

use std::io::Cursor;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, info, warn};
use rodio::{Decoder, OutputStream, OutputStreamBuilder, Sink};

use super::{AudioError, Completion, WavePlayer};

/// Intervalo de verificação do fim natural do som.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

enum Command {
    Play { data: Arc<[u8]>, on_end: Completion },
    Stop { ack: Option<Sender<()>> },
    Reset,
    Shutdown,
}

/// Som em reprodução na thread de áudio.
struct Playing {
    sink: Sink,
    on_end: Completion,
}

pub struct RodioWavePlayer {
    commands: Sender<Command>,
    handle: Option<JoinHandle<()>>,
}

impl RodioWavePlayer {
    /// Abre o dispositivo padrão numa thread própria.
    ///
    /// Retorna [`AudioError::DeviceUnavailable`] se não houver saída de áudio;
    /// o chamador pode então usar o [`super::MutePlayer`].
    pub fn new() -> Result<Self, AudioError> {
        let (tx, rx) = unbounded();
        let (ready_tx, ready_rx) = bounded(1);

        let handle: JoinHandle<()> = thread::Builder::new()
            .name("audio".into())
            .spawn(move || audio_thread(rx, ready_tx))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                info!("Audio device opened");
                Ok(Self {
                    commands: tx,
                    handle: Some(handle),
                })
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(AudioError::WorkerGone)
            }
        }
    }

    fn shutdown(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = self.commands.send(Command::Shutdown);
            if handle.join().is_err() {
                warn!("Audio thread panicked");
            }
        }
    }
}

impl WavePlayer for RodioWavePlayer {
    fn play_wave_data(&mut self, wave_data: Arc<[u8]>, on_end: Completion) -> Result<(), AudioError> {
        self.commands
            .send(Command::Play { data: wave_data, on_end })
            .map_err(|_| AudioError::WorkerGone)
    }

    fn stop_playing(&mut self, wait: bool) {
        if wait {
            let (ack_tx, ack_rx) = bounded(1);
            if self.commands.send(Command::Stop { ack: Some(ack_tx) }).is_ok() {
                let _ = ack_rx.recv();
            }
        } else {
            let _ = self.commands.send(Command::Stop { ack: None });
        }
    }

    fn reset(&mut self) {
        let _ = self.commands.send(Command::Reset);
    }

    fn dispose(&mut self) {
        self.shutdown();
    }
}

impl Drop for RodioWavePlayer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn audio_thread(commands: Receiver<Command>, ready: Sender<Result<(), AudioError>>) {
    let stream: OutputStream = match OutputStreamBuilder::open_default_stream() {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready.send(Err(AudioError::DeviceUnavailable(e.to_string())));
            return;
        }
    };
    let _ = ready.send(Ok(()));

    let mut current: Option<Playing> = None;

    loop {
        match commands.recv_timeout(POLL_INTERVAL) {
            Ok(Command::Play { data, on_end }) => {
                // AGI só toca um som por vez.
                if let Some(previous) = current.take() {
                    previous.sink.stop();
                    previous.on_end.complete();
                }

                match Decoder::new(Cursor::new(data)) {
                    Ok(source) => {
                        let sink = Sink::connect_new(stream.mixer());
                        sink.append(source);
                        current = Some(Playing { sink, on_end });
                    }
                    Err(e) => {
                        warn!("{}", AudioError::Decode(e.to_string()));
                        on_end.complete();
                    }
                }
            }
            Ok(Command::Stop { ack }) => {
                if let Some(playing) = current.take() {
                    playing.sink.stop();
                    playing.on_end.complete();
                }
                if let Some(ack) = ack {
                    let _ = ack.send(());
                }
            }
            Ok(Command::Reset) => {
                if let Some(playing) = current.take() {
                    playing.on_end.cancel();
                    playing.sink.stop();
                }
            }
            Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }

        let finished = current.as_ref().is_some_and(|playing| playing.sink.empty());
        if finished {
            if let Some(playing) = current.take() {
                playing.on_end.complete();
            }
        }
    }

    if let Some(playing) = current.take() {
        playing.sink.stop();
        playing.on_end.complete();
    }
    debug!("Audio thread stopped");
}
