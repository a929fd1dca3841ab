// src/runtime/run_loop.rs

//! Laço da thread do interpretador.
//!
//! A apresentação avisa a cada tick do relógio ([`RunLoop::animation_tick`]).
//! A thread executa um tick da máquina e publica a superfície de escrita.
//! Avisos que chegam com a máquina ocupada se fundem num só, para que um
//! interpretador lento nunca acumule atraso.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bitflags::bitflags;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use log::{debug, error, info, trace, warn};

use super::{AbortSignal, Halt, Machine, TickContext};
use crate::config::Preferences;
use crate::registers::RegisterFile;
use crate::saved_games::SavedGameStore;
use crate::sound::AudioCompletionSignal;
use crate::video::{FrameProducer, SpriteSnapshots};

/// Intervalo máximo sem olhar o sinal de encerramento quando não há ticks.
const IDLE_POLL: Duration = Duration::from_millis(20);

bitflags! {
    /// Etapas de encerramento concluídas, na ordem em que rodam.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct TeardownSteps: u8 {
        /// Canal de ticks fechado
        const STOP_TICKS  = 1 << 0;
        /// Som parado (flag gravada) e dispositivo liberado
        const AUDIO       = 1 << 1;
        /// Áreas de fundo dos sprites descartadas
        const SPRITES     = 1 << 2;
        /// Superfícies liberadas pelo produtor
        const FRAMEBUFFER = 1 << 3;
        /// Preferências gravadas
        const PREFERENCES = 1 << 4;
        /// Banco de registradores liberado
        const REGISTERS   = 1 << 5;
    }
}

/// Por que a thread saiu do laço.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExitReason {
    /// Comando de saída do jogo.
    Quit,
    /// Parada pedida de fora ([`RunLoop::stop`]).
    Stopped,
    /// Falha dentro de um tick.
    Fault(String),
    /// A thread terminou em pânico. O encerramento ordenado não rodou; só os
    /// `Drop` dos recursos (flag de som gravada, pipeline liberado).
    Panicked,
}

#[derive(Clone, Debug)]
pub struct TeardownReport {
    pub reason: ExitReason,
    pub steps: TeardownSteps,
    pub ticks_run: u64,
    pub frames_published: u64,
}

impl TeardownReport {
    pub fn is_complete(&self) -> bool {
        self.steps.is_all()
    }
}

/// Recursos entregues à thread do interpretador, liberados por ela no fim.
pub struct InterpreterParts {
    pub registers: Arc<dyn RegisterFile>,
    pub producer: FrameProducer,
    pub audio: AudioCompletionSignal,
    pub sprites: SpriteSnapshots,
    pub preferences: Option<Preferences>,
    pub saved_games: Option<Box<dyn SavedGameStore>>,
}

/// Controle da thread do interpretador, do lado da apresentação.
pub struct RunLoop {
    ticks: Option<Sender<()>>,
    abort: AbortSignal,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<TeardownReport>>,
}

impl RunLoop {
    /// Inicia a thread do interpretador.
    pub fn start(machine: Box<dyn Machine>, parts: InterpreterParts) -> std::io::Result<Self> {
        let (tx, rx) = bounded(1);
        let abort = AbortSignal::new();
        let running = Arc::new(AtomicBool::new(true));

        let worker = Worker {
            machine,
            parts,
            ticks: rx,
            abort: abort.clone(),
            ticks_run: 0,
        };
        let guard = RunningGuard(Arc::clone(&running));
        let handle: JoinHandle<TeardownReport> = thread::Builder::new()
            .name("interpreter".into())
            .spawn(move || {
                let _guard = guard;
                worker.run()
            })?;

        info!("Interpreter thread started");
        Ok(Self {
            ticks: Some(tx),
            abort,
            running,
            handle: Some(handle),
        })
    }

    /// Avisa que passou um tick do relógio. Retorna `false` se o
    /// interpretador não aceita mais ticks.
    pub fn animation_tick(&self) -> bool {
        let Some(ticks) = &self.ticks else {
            return false;
        };
        match ticks.try_send(()) {
            // Cheio: já existe um aviso pendente, este se funde a ele.
            Ok(()) | Err(TrySendError::Full(())) => true,
            Err(TrySendError::Disconnected(())) => false,
        }
    }

    /// Pede o encerramento. A thread sai no próximo ponto de espera.
    pub fn stop(&mut self) {
        self.abort.raise();
        self.ticks = None;
    }

    /// Indica se a thread ainda não terminou o encerramento.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn abort_signal(&self) -> &AbortSignal {
        &self.abort
    }

    /// Espera a thread terminar e retorna o relatório de encerramento.
    pub fn join(mut self) -> TeardownReport {
        self.join_inner()
    }

    fn join_inner(&mut self) -> TeardownReport {
        let panicked = TeardownReport {
            reason: ExitReason::Panicked,
            steps: TeardownSteps::empty(),
            ticks_run: 0,
            frames_published: 0,
        };
        match self.handle.take() {
            Some(handle) => handle.join().unwrap_or_else(|_| {
                error!("Interpreter thread panicked");
                panicked
            }),
            None => panicked,
        }
    }
}

impl Drop for RunLoop {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.stop();
            let _ = self.join_inner();
        }
    }
}

/// Baixa a flag `running` quando a thread sai, mesmo em pânico.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        if thread::panicking() {
            error!("Interpreter thread panicked, releasing resources");
        }
        self.0.store(false, Ordering::Release);
    }
}

struct Worker {
    machine: Box<dyn Machine>,
    parts: InterpreterParts,
    ticks: Receiver<()>,
    abort: AbortSignal,
    ticks_run: u64,
}

impl Worker {
    fn run(mut self) -> TeardownReport {
        let reason: ExitReason = self.run_ticks();
        self.teardown(reason)
    }

    fn run_ticks(&mut self) -> ExitReason {
        loop {
            match self.ticks.recv_timeout(IDLE_POLL) {
                Ok(()) => {}
                Err(RecvTimeoutError::Timeout) => {
                    if self.abort.is_raised() {
                        return ExitReason::Stopped;
                    }
                    continue;
                }
                Err(RecvTimeoutError::Disconnected) => return ExitReason::Stopped,
            }
            if self.abort.is_raised() {
                return ExitReason::Stopped;
            }

            match self.step() {
                Ok(()) => {
                    self.parts.producer.publish();
                    self.ticks_run += 1;
                }
                Err(Halt::Quit) => {
                    debug!("Leaving interpreter loop at tick {}", self.ticks_run);
                    // Com o sinal levantado, o Quit veio de um ponto de espera.
                    return if self.abort.is_raised() {
                        ExitReason::Stopped
                    } else {
                        ExitReason::Quit
                    };
                }
                Err(Halt::Fault(e)) => {
                    error!("Interpreter fault at tick {}: {:#}", self.ticks_run, e);
                    return ExitReason::Fault(format!("{:#}", e));
                }
            }
        }
    }

    /// Executa um tick da máquina sobre a superfície de escrita.
    fn step(&mut self) -> Result<(), Halt> {
        let parts = &mut self.parts;
        let mut surface = parts.producer.begin_write();
        let mut ctx = TickContext {
            registers: parts.registers.as_ref(),
            surface: &mut *surface,
            sprites: &mut parts.sprites,
            audio: &mut parts.audio,
            abort: &self.abort,
            saved_games: parts.saved_games.as_deref(),
            tick: self.ticks_run,
        };
        trace!("Running tick {}", self.ticks_run);
        self.machine.tick(&mut ctx)
    }

    fn teardown(self, reason: ExitReason) -> TeardownReport {
        let Worker {
            mut machine,
            parts,
            ticks,
            ticks_run,
            ..
        } = self;
        let InterpreterParts {
            registers,
            producer,
            mut audio,
            mut sprites,
            preferences,
            saved_games,
        } = parts;
        let mut steps = TeardownSteps::empty();

        drop(ticks);
        steps |= TeardownSteps::STOP_TICKS;

        machine.shutdown();

        audio.stop(true);
        audio.dispose();
        drop(audio);
        steps |= TeardownSteps::AUDIO;

        sprites.clear();
        steps |= TeardownSteps::SPRITES;

        let frames_published: u64 = producer.pipeline().frames_published();
        producer.dispose();
        steps |= TeardownSteps::FRAMEBUFFER;

        match preferences {
            Some(mut prefs) => match prefs.flush() {
                Ok(()) => steps |= TeardownSteps::PREFERENCES,
                Err(e) => warn!("Failed to save preferences: {}", e),
            },
            None => steps |= TeardownSteps::PREFERENCES,
        }

        drop(saved_games);
        drop(registers);
        steps |= TeardownSteps::REGISTERS;

        info!(
            "Interpreter stopped ({:?}) after {} tick(s), {} frame(s)",
            reason, ticks_run, frames_published
        );
        TeardownReport {
            reason,
            steps,
            ticks_run,
            frames_published,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::registers::{SharedRegisterFile, FLAG_SOUND_ON};
    use crate::sound::{AudioError, Completion, MutePlayer, WavePlayer};
    use crate::video::{FrameBufferPipeline, FramePresenter, Rect, SnapshotError};
    use anyhow::anyhow;
    use parking_lot::Mutex;

    /// Backend que nunca termina sozinho; só o `stop` grava a flag.
    struct EndlessPlayer {
        playing: Arc<Mutex<Vec<Completion>>>,
    }

    impl WavePlayer for EndlessPlayer {
        fn play_wave_data(&mut self, _data: Arc<[u8]>, on_end: Completion) -> Result<(), AudioError> {
            self.playing.lock().push(on_end);
            Ok(())
        }
        fn stop_playing(&mut self, _wait: bool) {}
        fn reset(&mut self) {}
        fn dispose(&mut self) {}
    }

    fn make_parts(
        regs: Arc<SharedRegisterFile>,
        player: Box<dyn WavePlayer>,
        preferences: Option<Preferences>,
    ) -> (InterpreterParts, FramePresenter) {
        let (producer, presenter) = FrameBufferPipeline::new(16, 16);
        let audio = AudioCompletionSignal::new(player, regs.clone());
        (
            InterpreterParts {
                registers: regs,
                producer,
                audio,
                sprites: SpriteSnapshots::new(),
                preferences,
                saved_games: None,
            },
            presenter,
        )
    }

    /// Avisa ticks até a thread parar (ou desistir).
    fn drive(run_loop: &RunLoop, max_ticks: usize) {
        for _ in 0..max_ticks {
            if !run_loop.is_running() {
                break;
            }
            run_loop.animation_tick();
            thread::sleep(Duration::from_millis(1));
        }
    }

    /// Desenha um sprite por tick; no segundo tick sai no meio do desenho.
    struct QuitMidDraw;

    impl Machine for QuitMidDraw {
        fn tick(&mut self, ctx: &mut TickContext<'_>) -> Result<(), Halt> {
            let bounds = Rect::new(ctx.tick as i32 * 4, 2, 4, 4);
            if ctx.tick > 0 {
                ctx.sprites.restore_all(ctx.surface).map_err(anyhow::Error::from)?;
            }
            ctx.sprites.capture(0, ctx.surface, bounds);

            if ctx.tick == 0 {
                ctx.surface.fill_rect(bounds, 12, 4);
                ctx.audio.play(Arc::from(vec![0u8; 8]), 60);
                return Ok(());
            }

            ctx.surface.set_pixel(bounds.x, bounds.y, 12, 4);
            Err(Halt::Quit)
        }
    }

    /// Segunda execução: não deve sobrar nenhuma área de fundo.
    struct CheckCleanStart {
        seen: Arc<Mutex<Option<bool>>>,
    }

    impl Machine for CheckCleanStart {
        fn tick(&mut self, ctx: &mut TickContext<'_>) -> Result<(), Halt> {
            let clean = ctx.sprites.is_empty()
                && ctx.sprites.restore(0, ctx.surface) == Err(SnapshotError::UnknownObject(0));
            *self.seen.lock() = Some(clean);
            Err(Halt::Quit)
        }
    }

    #[test]
    fn test_quit_mid_draw_runs_full_teardown() {
        let regs = Arc::new(SharedRegisterFile::new());
        regs.set_flag(FLAG_SOUND_ON, true);

        let prefs_path = std::env::temp_dir()
            .join(format!("agistrife_runloop_{}", std::process::id()))
            .join("prefs.ron");
        let mut prefs = Preferences::new(Config::default(), prefs_path.clone());
        prefs.update(|c| c.window_scale = 4);

        let playing = Arc::new(Mutex::new(Vec::new()));
        let player = EndlessPlayer {
            playing: Arc::clone(&playing),
        };
        let (parts, mut presenter) = make_parts(regs.clone(), Box::new(player), Some(prefs));

        let run_loop = RunLoop::start(Box::new(QuitMidDraw), parts).unwrap();
        drive(&run_loop, 500);
        let report = run_loop.join();

        assert_eq!(report.reason, ExitReason::Quit);
        assert!(report.is_complete());
        assert_eq!(report.ticks_run, 1);
        assert_eq!(report.frames_published, 1);

        // O som que nunca terminaria teve a flag gravada no encerramento.
        assert_eq!(playing.lock().len(), 1);
        assert!(regs.get_flag(60));

        // Só o primeiro tick ficou visível; o desenho interrompido não.
        assert!(presenter.pipeline().is_disposed());
        let frame = presenter.acquire_for_display();
        assert_eq!(frame.pixel(0, 2), Some((12, 4)));
        assert_eq!(frame.pixel(4, 2), Some((0, 0)));
        drop(frame);

        assert_eq!(Config::load(&prefs_path).unwrap().window_scale, 4);
        let _ = std::fs::remove_dir_all(prefs_path.parent().unwrap());

        // Nova inicialização com o mesmo banco.
        let seen = Arc::new(Mutex::new(None));
        let (parts, _presenter) = make_parts(regs, Box::new(MutePlayer::new()), None);
        let run_loop = RunLoop::start(
            Box::new(CheckCleanStart {
                seen: Arc::clone(&seen),
            }),
            parts,
        )
        .unwrap();
        drive(&run_loop, 500);
        assert!(run_loop.join().is_complete());
        assert_eq!(*seen.lock(), Some(true));
    }

    struct Counter;

    impl Machine for Counter {
        fn tick(&mut self, ctx: &mut TickContext<'_>) -> Result<(), Halt> {
            ctx.registers.increment_var(40);
            Ok(())
        }
    }

    #[test]
    fn test_stop_from_presentation() {
        let regs = Arc::new(SharedRegisterFile::new());
        let (parts, _presenter) = make_parts(regs.clone(), Box::new(MutePlayer::new()), None);
        let mut run_loop = RunLoop::start(Box::new(Counter), parts).unwrap();

        drive(&run_loop, 5);
        run_loop.stop();
        assert!(!run_loop.animation_tick());

        let report = run_loop.join();
        assert_eq!(report.reason, ExitReason::Stopped);
        assert!(report.is_complete());
        assert_eq!(report.ticks_run, regs.get_var(40) as u64);
    }

    /// Espera ativa numa variável que ninguém vai mudar.
    struct SpinForever;

    impl Machine for SpinForever {
        fn tick(&mut self, ctx: &mut TickContext<'_>) -> Result<(), Halt> {
            while ctx.registers.get_var(50) == 0 {
                ctx.abort.check()?;
                thread::yield_now();
            }
            Ok(())
        }
    }

    #[test]
    fn test_stop_interrupts_spin_wait() {
        let regs = Arc::new(SharedRegisterFile::new());
        let (parts, _presenter) = make_parts(regs, Box::new(MutePlayer::new()), None);
        let mut run_loop = RunLoop::start(Box::new(SpinForever), parts).unwrap();

        run_loop.animation_tick();
        thread::sleep(Duration::from_millis(20));
        run_loop.stop();

        let report = run_loop.join();
        assert_eq!(report.reason, ExitReason::Stopped);
        assert!(report.is_complete());
        assert_eq!(report.frames_published, 0);
    }

    struct Faulty;

    impl Machine for Faulty {
        fn tick(&mut self, _ctx: &mut TickContext<'_>) -> Result<(), Halt> {
            Err(anyhow!("unknown opcode 0xFF").into())
        }
    }

    #[test]
    fn test_fault_still_tears_down() {
        let regs = Arc::new(SharedRegisterFile::new());
        let (parts, presenter) = make_parts(regs, Box::new(MutePlayer::new()), None);
        let run_loop = RunLoop::start(Box::new(Faulty), parts).unwrap();
        drive(&run_loop, 500);

        let report = run_loop.join();
        assert!(matches!(report.reason, ExitReason::Fault(ref msg) if msg.contains("0xFF")));
        assert!(report.is_complete());
        assert!(presenter.pipeline().is_disposed());
    }

    /// Lê uma variável fora do banco no segundo tick (erro de programação).
    struct OutOfRange;

    impl Machine for OutOfRange {
        fn tick(&mut self, ctx: &mut TickContext<'_>) -> Result<(), Halt> {
            if ctx.tick == 0 {
                ctx.audio.play(Arc::from(vec![0u8; 8]), 61);
                return Ok(());
            }
            let count = ctx.registers.var_count();
            ctx.registers.get_var(count + 1);
            Ok(())
        }
    }

    #[test]
    fn test_panicking_tick_is_visible_to_presentation() {
        let regs = Arc::new(SharedRegisterFile::new());
        regs.set_flag(FLAG_SOUND_ON, true);
        let playing = Arc::new(Mutex::new(Vec::new()));
        let player = EndlessPlayer {
            playing: Arc::clone(&playing),
        };
        let (parts, presenter) = make_parts(regs.clone(), Box::new(player), None);
        let run_loop = RunLoop::start(Box::new(OutOfRange), parts).unwrap();

        drive(&run_loop, 500);
        for _ in 0..500 {
            if !run_loop.is_running() {
                break;
            }
            thread::sleep(Duration::from_millis(1));
        }

        assert!(!run_loop.is_running());
        assert!(presenter.pipeline().is_disposed());
        assert_eq!(playing.lock().len(), 1);
        assert!(regs.get_flag(61));

        let report = run_loop.join();
        assert_eq!(report.reason, ExitReason::Panicked);
        assert!(!report.is_complete());
    }

    #[test]
    fn test_drop_stops_thread() {
        let regs = Arc::new(SharedRegisterFile::new());
        let (parts, presenter) = make_parts(regs, Box::new(MutePlayer::new()), None);
        let run_loop = RunLoop::start(Box::new(Counter), parts).unwrap();
        drop(run_loop);
        assert!(presenter.pipeline().is_disposed());
    }
}
