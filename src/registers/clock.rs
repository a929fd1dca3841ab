// src/registers/clock.rs

//! Fonte de ticks de tempo real.
//!
//! Roda na thread de apresentação, independente do ritmo do interpretador:
//! a cada 1/60 s de relógio de parede avança o contador total de ticks e, a
//! cada segundo completo, o relógio do jogo.

use std::time::{Duration, Instant};

use log::trace;

use super::{advance_game_clock, RegisterFile, TICKS_PER_SECOND};

/// Acumulador de tempo que converte tempo de parede em ticks.
pub struct TickSource {
    tick_length: Duration,
    ticks_per_second: u64,
    last_time: Instant,
    accumulated: Duration,
}

impl TickSource {
    /// Cria uma fonte com a taxa padrão de 60 Hz.
    pub fn new(now: Instant) -> Self {
        Self::with_rate(now, TICKS_PER_SECOND as u32)
    }

    pub fn with_rate(now: Instant, ticks_per_second: u32) -> Self {
        let rate = ticks_per_second.max(1);
        Self {
            tick_length: Duration::from_nanos(1_000_000_000 / rate as u64),
            ticks_per_second: rate as u64,
            last_time: now,
            accumulated: Duration::ZERO,
        }
    }

    /// Avança até `now`, aplicando todos os ticks completos ao banco.
    ///
    /// Se a chamada atrasou, os ticks perdidos são recuperados de uma vez,
    /// evitando que o relógio do jogo derive. Retorna quantos ticks foram
    /// aplicados; o chamador usa esse valor para disparar os ticks de
    /// animação do interpretador.
    pub fn advance(&mut self, now: Instant, regs: &dyn RegisterFile) -> u32 {
        self.accumulated += now.saturating_duration_since(self.last_time);
        self.last_time = now;

        let mut elapsed: u32 = 0;
        while self.accumulated >= self.tick_length {
            self.accumulated -= self.tick_length;
            let total = regs.increment_total_ticks();
            if total % self.ticks_per_second == 0 {
                advance_game_clock(regs);
            }
            elapsed += 1;
        }

        if elapsed > 0 {
            trace!("Advanced {} tick(s), total={}", elapsed, regs.get_total_ticks());
        }
        elapsed
    }

    pub fn tick_length(&self) -> Duration {
        self.tick_length
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::{SharedRegisterFile, VAR_SECONDS};

    #[test]
    fn test_no_tick_before_period() {
        let start = Instant::now();
        let regs = SharedRegisterFile::new();
        let mut source = TickSource::new(start);
        assert_eq!(source.advance(start + Duration::from_millis(10), &regs), 0);
        assert_eq!(regs.get_total_ticks(), 0);
    }

    #[test]
    fn test_catch_up_after_stall() {
        let start = Instant::now();
        let regs = SharedRegisterFile::new();
        let mut source = TickSource::new(start);

        // 100 ms a 60 Hz = 6 ticks completos.
        let ticks = source.advance(start + Duration::from_millis(100), &regs);
        assert_eq!(ticks, 6);
        assert_eq!(regs.get_total_ticks(), 6);
    }

    #[test]
    fn test_one_second_advances_game_clock() {
        let start = Instant::now();
        let regs = SharedRegisterFile::new();
        let mut source = TickSource::new(start);

        let mut now = start;
        for _ in 0..61 {
            now += source.tick_length();
            source.advance(now, &regs);
        }

        assert_eq!(regs.get_total_ticks(), 61);
        assert_eq!(regs.get_var(VAR_SECONDS), 1);
    }

    #[test]
    fn test_custom_rate_keeps_seconds() {
        let start = Instant::now();
        let regs = SharedRegisterFile::new();
        let mut source = TickSource::with_rate(start, 10);

        assert_eq!(source.advance(start + Duration::from_secs(1), &regs), 10);
        assert_eq!(regs.get_var(VAR_SECONDS), 1);
    }
}
