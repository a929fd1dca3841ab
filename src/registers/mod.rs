//! Banco de registradores compartilhado entre o interpretador e a apresentação.
//!
//! O banco guarda as flags, as variáveis de 8 bits e o contador total de ticks
//! do jogo AGI. As duas threads acessam os mesmos slots sem lock externo:
//!
//! - a thread do interpretador lê e escreve flags/variáveis enquanto executa
//!   os scripts (e pode ficar em espera ativa numa variável);
//! - a thread de apresentação incrementa o relógio e grava o estado de entrada.
//!
//! Duas implementações respeitam o mesmo contrato:
//! - [`SharedRegisterFile`]: memória compartilhada com tipos atômicos;
//! - [`ChannelRegisterFile`]: emulação por troca de mensagens, para ambientes
//!   sem memória compartilhada real.

pub mod channel;
pub mod clock;
pub mod shared;

pub use channel::{ChannelRegisterFile, RegisterHost};
pub use clock::TickSource;
pub use shared::SharedRegisterFile;

use bincode::{Decode, Encode};

/// Número de flags de um jogo AGI.
pub const NUM_FLAGS: usize = 256;

/// Número de variáveis de um jogo AGI.
pub const NUM_VARS: usize = 256;

/// Ticks por segundo do relógio interno.
pub const TICKS_PER_SECOND: u64 = 60;

// =====================================================
// FLAGS DE SISTEMA
// =====================================================

/// Estado do som (ligado/desligado).
pub const FLAG_SOUND_ON: usize = 9;

// =====================================================
// VARIÁVEIS DE SISTEMA
// =====================================================

pub const VAR_SECONDS: usize = 11;
pub const VAR_MINUTES: usize = 12;
pub const VAR_HOURS: usize = 13;
pub const VAR_DAYS: usize = 14;

/// Última tecla pressionada (escrita pela thread de apresentação).
pub const VAR_LAST_CHAR: usize = 19;

/// Contrato de acesso ao banco de registradores.
///
/// Todo método pode ser chamado concorrentemente pelas duas threads. Índices
/// fora do intervalo são erro de programação e causam pânico.
pub trait RegisterFile: Send + Sync {
    fn flag_count(&self) -> usize;
    fn var_count(&self) -> usize;

    fn get_flag(&self, index: usize) -> bool;
    fn set_flag(&self, index: usize, value: bool);

    fn get_var(&self, index: usize) -> u8;
    fn set_var(&self, index: usize, value: u8);

    /// Incrementa a variável (módulo 256) num único passo atômico e
    /// retorna o novo valor.
    fn increment_var(&self, index: usize) -> u8;

    fn get_total_ticks(&self) -> u64;

    /// Só deve ser usado ao restaurar um jogo salvo.
    fn set_total_ticks(&self, ticks: u64);

    /// Avança o contador total de ticks e retorna o novo valor.
    fn increment_total_ticks(&self) -> u64;

    /// Copia o estado atual (usado para salvar o jogo).
    fn snapshot(&self) -> RegisterSnapshot {
        RegisterSnapshot {
            flags: (0..self.flag_count()).map(|i| self.get_flag(i)).collect(),
            vars: (0..self.var_count()).map(|i| self.get_var(i)).collect(),
            total_ticks: self.get_total_ticks(),
        }
    }

    /// Aplica um snapshot salvo. Único caminho em que o contador de ticks
    /// pode voltar atrás.
    fn restore(&self, snapshot: &RegisterSnapshot) {
        for (i, &flag) in snapshot.flags.iter().take(self.flag_count()).enumerate() {
            self.set_flag(i, flag);
        }
        for (i, &var) in snapshot.vars.iter().take(self.var_count()).enumerate() {
            self.set_var(i, var);
        }
        self.set_total_ticks(snapshot.total_ticks);
    }
}

/// Cópia serializável do banco de registradores.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct RegisterSnapshot {
    pub flags: Vec<bool>,
    pub vars: Vec<u8>,
    pub total_ticks: u64,
}

/// Avança o relógio do jogo em um segundo, propagando o "vai um" para
/// minutos, horas e dias.
///
/// Roda na thread que conta os ticks, e não no interpretador, porque alguns
/// scripts esperam o relógio chegar a um valor dentro de um laço.
pub fn advance_game_clock(regs: &dyn RegisterFile) {
    if regs.increment_var(VAR_SECONDS) >= 60 {
        if regs.increment_var(VAR_MINUTES) >= 60 {
            if regs.increment_var(VAR_HOURS) >= 24 {
                regs.increment_var(VAR_DAYS);
                regs.set_var(VAR_HOURS, 0);
            }
            regs.set_var(VAR_MINUTES, 0);
        }
        regs.set_var(VAR_SECONDS, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_game_clock_carry() {
        let regs = SharedRegisterFile::new();
        regs.set_var(VAR_SECONDS, 59);
        regs.set_var(VAR_MINUTES, 59);
        regs.set_var(VAR_HOURS, 23);
        regs.set_var(VAR_DAYS, 2);

        advance_game_clock(&regs);

        assert_eq!(regs.get_var(VAR_SECONDS), 0);
        assert_eq!(regs.get_var(VAR_MINUTES), 0);
        assert_eq!(regs.get_var(VAR_HOURS), 0);
        assert_eq!(regs.get_var(VAR_DAYS), 3);
    }

    #[test]
    fn test_game_clock_plain_second() {
        let regs = SharedRegisterFile::new();
        regs.set_var(VAR_SECONDS, 10);
        advance_game_clock(&regs);
        assert_eq!(regs.get_var(VAR_SECONDS), 11);
        assert_eq!(regs.get_var(VAR_MINUTES), 0);
    }

    #[test]
    fn test_snapshot_restore() {
        let regs = SharedRegisterFile::new();
        regs.set_flag(3, true);
        regs.set_var(7, 99);
        regs.set_total_ticks(1234);
        let snap = regs.snapshot();

        let other = SharedRegisterFile::new();
        other.set_total_ticks(99_999);
        other.restore(&snap);

        assert!(other.get_flag(3));
        assert_eq!(other.get_var(7), 99);
        // Restaurar pode voltar o contador atrás.
        assert_eq!(other.get_total_ticks(), 1234);
        assert_eq!(other.snapshot(), snap);
    }
}
