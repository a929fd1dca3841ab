// src/video/snapshot.rs

//! Área de fundo salva sob cada objeto animado.
//!
//! Antes de desenhar um sprite, o interpretador copia os pixels (visual e
//! prioridade) que ficarão debaixo dele. No tick seguinte a cópia é devolvida
//! à superfície, apagando o sprite, e só então o objeto é redesenhado na nova
//! posição. Ordem por tick e por sprite: capture → draw → restore.

use log::{trace, warn};
use thiserror::Error;

use super::surface::{Rect, Surface};

/// Erros de uso do snapshot (erros de programação do chamador).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("Restauração sem captura prévia")]
    NotCaptured,

    #[error("Superfície {actual:?} não corresponde à capturada {captured:?}")]
    SurfaceMismatch {
        captured: (usize, usize),
        actual: (usize, usize),
    },

    #[error("Objeto {0} não possui área de fundo salva")]
    UnknownObject(usize),
}

/// Cópia do fundo sob um sprite.
#[derive(Clone, Debug, Default)]
pub struct SpriteBackgroundSnapshot {
    /// Limites pedidos na captura (podem sair da tela).
    bounds: Rect,
    /// Limites efetivamente copiados, já recortados.
    clipped: Rect,
    surface_size: (usize, usize),
    visual: Vec<u8>,
    priority: Vec<u8>,
    captured: bool,
}

impl SpriteBackgroundSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copia o retângulo dos dois planos, substituindo qualquer captura
    /// anterior. O retângulo é recortado aos limites da superfície.
    pub fn capture(&mut self, surface: &Surface, bounds: Rect) {
        let clipped = bounds.clip(surface.width, surface.height);

        self.visual.clear();
        self.priority.clear();
        for row in 0..clipped.height {
            let start = (clipped.y as usize + row) * surface.width + clipped.x as usize;
            let end = start + clipped.width;
            self.visual.extend_from_slice(&surface.visual[start..end]);
            self.priority.extend_from_slice(&surface.priority[start..end]);
        }

        self.bounds = bounds;
        self.clipped = clipped;
        self.surface_size = (surface.width, surface.height);
        self.captured = true;
    }

    /// Devolve os pixels salvos à superfície, desfazendo o desenho do sprite.
    ///
    /// O recorte é exatamente o mesmo da captura. Depois de restaurado, o
    /// snapshot precisa ser capturado de novo antes de outro `restore`.
    pub fn restore(&mut self, surface: &mut Surface) -> Result<(), SnapshotError> {
        if !self.captured {
            debug_assert!(false, "sprite background restored without capture");
            return Err(SnapshotError::NotCaptured);
        }
        if self.surface_size != (surface.width, surface.height) {
            return Err(SnapshotError::SurfaceMismatch {
                captured: self.surface_size,
                actual: (surface.width, surface.height),
            });
        }

        let clipped = self.clipped;
        for row in 0..clipped.height {
            let start = (clipped.y as usize + row) * surface.width + clipped.x as usize;
            let end = start + clipped.width;
            let saved = row * clipped.width..(row + 1) * clipped.width;
            surface.visual[start..end].copy_from_slice(&self.visual[saved.clone()]);
            surface.priority[start..end].copy_from_slice(&self.priority[saved]);
        }

        self.captured = false;
        Ok(())
    }

    pub fn is_captured(&self) -> bool {
        self.captured
    }

    /// Indica se a captura atual não serve mais para `bounds` (posição ou
    /// tamanho mudou) e precisa ser refeita.
    pub fn is_stale(&self, bounds: Rect) -> bool {
        !self.captured || self.bounds != bounds
    }

    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    pub fn clipped_bounds(&self) -> Rect {
        self.clipped
    }

    /// Descarta a captura (objeto removido).
    pub fn discard(&mut self) {
        self.visual.clear();
        self.priority.clear();
        self.captured = false;
    }
}

/// Conjunto de snapshots, um por objeto animado.
#[derive(Default)]
pub struct SpriteSnapshots {
    slots: Vec<Option<SpriteBackgroundSnapshot>>,
    /// Ordem de captura; a restauração segue a ordem inversa.
    order: Vec<usize>,
}

impl SpriteSnapshots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Captura o fundo do objeto `object` antes de desenhá-lo.
    pub fn capture(&mut self, object: usize, surface: &Surface, bounds: Rect) {
        if object >= self.slots.len() {
            self.slots.resize_with(object + 1, || None);
        }
        self.slots[object]
            .get_or_insert_with(SpriteBackgroundSnapshot::new)
            .capture(surface, bounds);

        self.order.retain(|&o| o != object);
        self.order.push(object);
        trace!("Captured background of object {} at {:?}", object, bounds);
    }

    pub fn get(&self, object: usize) -> Option<&SpriteBackgroundSnapshot> {
        self.slots.get(object).and_then(|slot| slot.as_ref())
    }

    /// Restaura o fundo de um único objeto.
    pub fn restore(&mut self, object: usize, surface: &mut Surface) -> Result<(), SnapshotError> {
        let snapshot = self
            .slots
            .get_mut(object)
            .and_then(|slot| slot.as_mut())
            .ok_or(SnapshotError::UnknownObject(object))?;
        snapshot.restore(surface)?;
        self.order.retain(|&o| o != object);
        Ok(())
    }

    /// Restaura todos os fundos capturados, na ordem inversa do desenho.
    ///
    /// Um objeto que falha não interrompe os demais: ele continua pendente e
    /// o primeiro erro é retornado no fim.
    pub fn restore_all(&mut self, surface: &mut Surface) -> Result<(), SnapshotError> {
        let mut failed: Vec<usize> = Vec::new();
        let mut first_error: Option<SnapshotError> = None;

        while let Some(object) = self.order.pop() {
            let Some(snapshot) = self.slots.get_mut(object).and_then(|slot| slot.as_mut()) else {
                continue;
            };
            if let Err(e) = snapshot.restore(surface) {
                warn!("Background of object {} not restored: {}", object, e);
                failed.push(object);
                first_error.get_or_insert(e);
            }
        }

        // Volta à ordem de captura.
        failed.reverse();
        self.order = failed;
        first_error.map_or(Ok(()), Err)
    }

    /// Descarta o snapshot de um objeto removido.
    pub fn remove(&mut self, object: usize) {
        if let Some(slot) = self.slots.get_mut(object) {
            *slot = None;
        }
        self.order.retain(|&o| o != object);
    }

    /// Descarta tudo (troca de sala, jogo restaurado, encerramento).
    pub fn clear(&mut self) {
        self.slots.clear();
        self.order.clear();
    }

    /// Número de objetos com fundo capturado e ainda não restaurado.
    pub fn pending(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|slot| slot.is_none())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterned_surface(width: usize, height: usize) -> Surface {
        let mut s = Surface::new(width, height);
        for (i, px) in s.visual.iter_mut().enumerate() {
            *px = (i % 16) as u8;
        }
        for (i, px) in s.priority.iter_mut().enumerate() {
            *px = (i % 11) as u8 + 4;
        }
        s
    }

    fn draw_sprite(surface: &mut Surface, rect: Rect) {
        surface.fill_rect(rect, 15, 15);
    }

    #[test]
    fn test_capture_restore_is_identity() {
        let mut s = patterned_surface(32, 24);
        let before = s.clone();
        let mut snap = SpriteBackgroundSnapshot::new();
        snap.capture(&s, Rect::new(5, 6, 7, 8));
        snap.restore(&mut s).unwrap();
        assert_eq!(s, before);
    }

    #[test]
    fn test_restore_undoes_draw() {
        let mut s = patterned_surface(32, 24);
        let before = s.clone();
        let rect = Rect::new(10, 4, 6, 5);
        let mut snap = SpriteBackgroundSnapshot::new();
        snap.capture(&s, rect);
        draw_sprite(&mut s, rect);
        assert_ne!(s, before);
        snap.restore(&mut s).unwrap();
        assert_eq!(s, before);
    }

    #[test]
    fn test_clipped_sprite_partially_offscreen() {
        let mut s = patterned_surface(16, 16);
        let before = s.clone();
        let rect = Rect::new(12, -3, 8, 8);
        let mut snap = SpriteBackgroundSnapshot::new();
        snap.capture(&s, rect);
        assert_eq!(snap.clipped_bounds(), Rect::new(12, 0, 4, 5));
        draw_sprite(&mut s, rect);
        snap.restore(&mut s).unwrap();
        assert_eq!(s, before);
    }

    #[test]
    fn test_restore_without_capture_is_rejected() {
        let mut s = Surface::new(8, 8);
        let mut snap = SpriteBackgroundSnapshot::new();
        // Em debug o debug_assert dispara; em release vem o erro.
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| snap.restore(&mut s)));
        match result {
            Ok(outcome) => assert_eq!(outcome, Err(SnapshotError::NotCaptured)),
            Err(_) => assert!(cfg!(debug_assertions)),
        }
    }

    #[test]
    fn test_restore_on_other_surface_size_is_rejected() {
        let s = Surface::new(8, 8);
        let mut other = Surface::new(4, 4);
        let mut snap = SpriteBackgroundSnapshot::new();
        snap.capture(&s, Rect::new(0, 0, 2, 2));
        assert!(matches!(
            snap.restore(&mut other),
            Err(SnapshotError::SurfaceMismatch { .. })
        ));
    }

    #[test]
    fn test_stale_detection() {
        let s = Surface::new(8, 8);
        let mut snap = SpriteBackgroundSnapshot::new();
        let rect = Rect::new(1, 1, 2, 2);
        assert!(snap.is_stale(rect));
        snap.capture(&s, rect);
        assert!(!snap.is_stale(rect));
        assert!(snap.is_stale(Rect::new(2, 1, 2, 2)));
    }

    #[test]
    fn test_overlapping_sprites_restore_in_reverse_order() {
        let mut s = patterned_surface(32, 32);
        let before = s.clone();
        let mut set = SpriteSnapshots::new();

        let a = Rect::new(4, 4, 10, 10);
        let b = Rect::new(8, 8, 10, 10);
        set.capture(0, &s, a);
        draw_sprite(&mut s, a);
        set.capture(1, &s, b);
        s.fill_rect(b, 14, 14);

        assert_eq!(set.pending(), 2);
        set.restore_all(&mut s).unwrap();
        assert_eq!(s, before);
        assert_eq!(set.pending(), 0);
    }

    #[test]
    fn test_restore_all_keeps_going_after_failure() {
        let small = Surface::new(8, 8);
        let mut s = patterned_surface(32, 32);
        let before = s.clone();
        let mut set = SpriteSnapshots::new();

        let a = Rect::new(2, 2, 4, 4);
        let c = Rect::new(20, 20, 4, 4);
        set.capture(0, &s, a);
        draw_sprite(&mut s, a);
        // Objeto 1 capturado de outra superfície: não pode ser restaurado aqui.
        set.capture(1, &small, Rect::new(0, 0, 2, 2));
        set.capture(2, &s, c);
        draw_sprite(&mut s, c);

        assert!(matches!(
            set.restore_all(&mut s),
            Err(SnapshotError::SurfaceMismatch { .. })
        ));
        assert_eq!(s, before);
        assert_eq!(set.pending(), 1);
        assert!(set.get(1).is_some_and(|snap| snap.is_captured()));
    }

    #[test]
    fn test_unknown_object() {
        let mut s = Surface::new(4, 4);
        let mut set = SpriteSnapshots::new();
        assert_eq!(set.restore(3, &mut s), Err(SnapshotError::UnknownObject(3)));
    }

    #[test]
    fn test_clear_discards_everything() {
        let s = Surface::new(4, 4);
        let mut set = SpriteSnapshots::new();
        set.capture(2, &s, Rect::new(0, 0, 1, 1));
        assert!(!set.is_empty());
        set.clear();
        assert!(set.is_empty());
        assert_eq!(set.pending(), 0);
    }
}
