// src/video/pipeline.rs

//! Pipeline de framebuffer com buffer triplo.
//!
//! Três superfícies do mesmo tamanho giram entre três papéis:
//!
//! - **escrita**: preenchida pela thread do interpretador durante o tick;
//! - **pronta**: último quadro publicado, ainda não pego pela apresentação;
//! - **exibição**: lida pela thread de apresentação.
//!
//! Os papéis são trocados com um único `swap` atômico na palavra que guarda
//! o índice da superfície pronta (mais um bit de "novo quadro"). O produtor
//! é dono exclusivo do índice de escrita e o apresentador do índice de
//! exibição, então os três índices formam sempre uma permutação de {0, 1, 2}:
//! a superfície de escrita nunca é a mesma que está sendo exibida.
//!
//! Cada superfície tem seu próprio `RwLock`, mas pela rotação acima esses locks
//! nunca disputam entre as threads: o produtor só trava para escrita a
//! superfície que o apresentador não pode ter.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use log::{debug, trace};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::surface::Surface;

/// Bit que marca a superfície pronta como quadro ainda não exibido.
const FRESH_BIT: u8 = 0b100;
const INDEX_MASK: u8 = 0b011;

/// Estado compartilhado entre produtor e apresentador.
pub struct FrameBufferPipeline {
    surfaces: [RwLock<Surface>; 3],
    ready: AtomicU8,
    frames_published: AtomicU64,
    disposed: AtomicBool,
}

impl FrameBufferPipeline {
    /// Aloca as três superfícies e retorna as duas pontas do pipeline.
    ///
    /// Papéis iniciais: escrita = 0, pronta = 1, exibição = 2.
    pub fn new(width: usize, height: usize) -> (FrameProducer, FramePresenter) {
        let shared = Arc::new(Self {
            surfaces: [
                RwLock::new(Surface::new(width, height)),
                RwLock::new(Surface::new(width, height)),
                RwLock::new(Surface::new(width, height)),
            ],
            ready: AtomicU8::new(1),
            frames_published: AtomicU64::new(0),
            disposed: AtomicBool::new(false),
        });

        debug!("Allocated triple-buffered pipeline {}x{}", width, height);

        (
            FrameProducer {
                shared: Arc::clone(&shared),
                write: 0,
            },
            FramePresenter { shared, display: 2 },
        )
    }

    /// Índice da superfície atualmente no papel "pronta".
    pub fn ready_index(&self) -> usize {
        (self.ready.load(Ordering::Acquire) & INDEX_MASK) as usize
    }

    pub fn frames_published(&self) -> u64 {
        self.frames_published.load(Ordering::Acquire)
    }

    /// Indica se o produtor já liberou o pipeline (interpretador parado).
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

/// Ponta do interpretador: escreve e publica quadros.
pub struct FrameProducer {
    shared: Arc<FrameBufferPipeline>,
    write: usize,
}

/// Acesso exclusivo à superfície de escrita.
pub struct WriteSurfaceHandle<'a> {
    index: usize,
    guard: RwLockWriteGuard<'a, Surface>,
}

impl WriteSurfaceHandle<'_> {
    pub fn index(&self) -> usize {
        self.index
    }
}

impl Deref for WriteSurfaceHandle<'_> {
    type Target = Surface;

    fn deref(&self) -> &Surface {
        &self.guard
    }
}

impl DerefMut for WriteSurfaceHandle<'_> {
    fn deref_mut(&mut self) -> &mut Surface {
        &mut self.guard
    }
}

impl FrameProducer {
    /// Retorna a superfície no papel de escrita.
    pub fn begin_write(&mut self) -> WriteSurfaceHandle<'_> {
        WriteSurfaceHandle {
            index: self.write,
            guard: self.shared.surfaces[self.write].write(),
        }
    }

    pub fn write_index(&self) -> usize {
        self.write
    }

    /// Publica a superfície de escrita como o quadro mais recente.
    ///
    /// A superfície que estava "pronta" passa a ser a nova superfície de
    /// escrita e recebe uma cópia do quadro recém-publicado, para que o
    /// desenho incremental (apagar/redesenhar sprites) continue do ponto em
    /// que parou. Nunca espera pela apresentação.
    pub fn publish(&mut self) {
        let published = self.write;
        let previous = self
            .shared
            .ready
            .swap(published as u8 | FRESH_BIT, Ordering::AcqRel);
        self.write = (previous & INDEX_MASK) as usize;

        let frame = self.shared.frames_published.fetch_add(1, Ordering::AcqRel) + 1;
        trace!("Published surface {} (frame {}), next write {}", published, frame, self.write);

        let source = self.shared.surfaces[published].read();
        let mut target = self.shared.surfaces[self.write].write();
        target.copy_from(&source);
    }

    /// Acesso ao estado compartilhado (diagnóstico).
    pub fn pipeline(&self) -> &FrameBufferPipeline {
        &self.shared
    }

    /// Libera a ponta do produtor. As superfícies são liberadas juntas quando
    /// o apresentador também for descartado.
    pub fn dispose(self) {
        debug!(
            "Framebuffer pipeline disposed after {} frame(s)",
            self.shared.frames_published()
        );
    }
}

/// Descartar o produtor (inclusive num pânico da thread do interpretador)
/// marca o pipeline como liberado.
impl Drop for FrameProducer {
    fn drop(&mut self) {
        self.shared.disposed.store(true, Ordering::Release);
    }
}

/// Ponta da apresentação: lê o quadro mais recente.
pub struct FramePresenter {
    shared: Arc<FrameBufferPipeline>,
    display: usize,
}

/// Acesso de leitura à superfície de exibição.
pub struct ReadSurfaceHandle<'a> {
    index: usize,
    guard: RwLockReadGuard<'a, Surface>,
}

impl ReadSurfaceHandle<'_> {
    pub fn index(&self) -> usize {
        self.index
    }
}

impl Deref for ReadSurfaceHandle<'_> {
    type Target = Surface;

    fn deref(&self) -> &Surface {
        &self.guard
    }
}

impl FramePresenter {
    /// Retorna o quadro publicado mais recente.
    ///
    /// Chamadas repetidas sem um novo `publish()` retornam a mesma superfície.
    pub fn acquire_for_display(&mut self) -> ReadSurfaceHandle<'_> {
        if self.shared.ready.load(Ordering::Acquire) & FRESH_BIT != 0 {
            let previous = self.shared.ready.swap(self.display as u8, Ordering::AcqRel);
            self.display = (previous & INDEX_MASK) as usize;
        }

        ReadSurfaceHandle {
            index: self.display,
            guard: self.shared.surfaces[self.display].read(),
        }
    }

    pub fn display_index(&self) -> usize {
        self.display
    }

    /// Indica se há um quadro publicado que ainda não foi pego.
    pub fn has_fresh_frame(&self) -> bool {
        self.shared.ready.load(Ordering::Acquire) & FRESH_BIT != 0
    }

    pub fn pipeline(&self) -> &FrameBufferPipeline {
        &self.shared
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn assert_distinct_roles(producer: &FrameProducer, presenter: &FramePresenter) {
        let write = producer.write_index();
        let display = presenter.display_index();
        let ready = producer.pipeline().ready_index();
        assert_ne!(write, display, "write and display roles aliased");
        assert_ne!(write, ready);
        assert_ne!(ready, display);
    }

    #[test]
    fn test_initial_roles() {
        let (producer, presenter) = FrameBufferPipeline::new(4, 4);
        assert_eq!(producer.write_index(), 0);
        assert_eq!(producer.pipeline().ready_index(), 1);
        assert_eq!(presenter.display_index(), 2);
    }

    #[test]
    fn test_publish_rotates_roles() {
        let (mut producer, mut presenter) = FrameBufferPipeline::new(4, 4);

        producer.begin_write().clear(7, 0);
        producer.publish();

        // A antiga "pronta" (1) vira escrita; o quadro escrito (0) será exibido.
        assert_eq!(producer.write_index(), 1);
        let shown = presenter.acquire_for_display();
        assert_eq!(shown.index(), 0);
        assert!(shown.visual.iter().all(|&c| c == 7));
        drop(shown);
        assert_distinct_roles(&producer, &presenter);
    }

    #[test]
    fn test_acquire_is_idempotent() {
        let (mut producer, mut presenter) = FrameBufferPipeline::new(4, 4);
        producer.publish();
        let first = presenter.acquire_for_display().index();
        let second = presenter.acquire_for_display().index();
        assert_eq!(first, second);
        assert!(!presenter.has_fresh_frame());
    }

    #[test]
    fn test_acquire_without_publish_keeps_display() {
        let (_producer, mut presenter) = FrameBufferPipeline::new(4, 4);
        assert_eq!(presenter.acquire_for_display().index(), 2);
    }

    #[test]
    fn test_first_written_surface_is_eventually_displayed() {
        let (mut producer, mut presenter) = FrameBufferPipeline::new(4, 4);
        let first = producer.write_index();
        producer.begin_write().clear(1, 0);
        producer.publish();
        producer.begin_write().clear(2, 0);
        producer.publish();

        // Dois publish sem leitura: o mais recente vence.
        let shown = presenter.acquire_for_display();
        assert_eq!(shown.visual[0], 2);
        drop(shown);

        producer.publish();
        let shown = presenter.acquire_for_display();
        assert_eq!(shown.index(), first);
    }

    #[test]
    fn test_publish_carries_frame_forward() {
        let (mut producer, _presenter) = FrameBufferPipeline::new(4, 4);
        producer.begin_write().set_pixel(1, 1, 9, 4);
        producer.publish();
        let next = producer.begin_write();
        assert_eq!(next.pixel(1, 1), Some((9, 4)));
    }

    #[test]
    fn test_roles_never_alias_over_long_sequence() {
        let (mut producer, mut presenter) = FrameBufferPipeline::new(2, 2);
        // Padrão pseudo-aleatório de publish/acquire.
        let mut seed: u32 = 0x1234_5678;
        for _ in 0..2000 {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            if seed & 1 == 0 {
                producer.publish();
            } else {
                let handle = presenter.acquire_for_display();
                assert_ne!(handle.index(), producer.write_index());
            }
            assert_distinct_roles(&producer, &presenter);
        }
    }

    #[test]
    fn test_concurrent_frames_are_complete() {
        let (mut producer, mut presenter) = FrameBufferPipeline::new(64, 32);
        let frames: u8 = 200;

        let writer = thread::spawn(move || {
            for n in 1..=frames {
                producer.begin_write().clear(n, n);
                producer.publish();
            }
            producer.dispose();
        });

        let mut last_seen: u8 = 0;
        loop {
            let done = presenter.pipeline().is_disposed();
            let shown = presenter.acquire_for_display();
            let first = shown.visual[0];
            // Quadro inteiro consistente: nenhum pixel de outro quadro.
            assert!(shown.visual.iter().all(|&c| c == first));
            assert!(shown.priority.iter().all(|&p| p == first));
            assert!(first >= last_seen, "frames went backwards");
            last_seen = first;
            drop(shown);
            if done && !presenter.has_fresh_frame() {
                break;
            }
        }

        writer.join().unwrap();
        assert_eq!(presenter.acquire_for_display().visual[0], frames);
    }

    #[test]
    fn test_dispose_marks_pipeline() {
        let (producer, presenter) = FrameBufferPipeline::new(4, 4);
        assert!(!presenter.pipeline().is_disposed());
        producer.dispose();
        assert!(presenter.pipeline().is_disposed());
    }

    #[test]
    fn test_dropped_producer_marks_pipeline() {
        let (producer, presenter) = FrameBufferPipeline::new(4, 4);
        drop(producer);
        assert!(presenter.pipeline().is_disposed());
    }
}
