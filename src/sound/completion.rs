// src/sound/completion.rs

//! Sinal de término de som, ligado a uma flag do banco de registradores.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::registers::RegisterFile;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    /// Aguardando o fim do som.
    Armed,
    /// Flag já foi gravada.
    Fired,
    /// Desarmado por reset; a flag nunca será gravada.
    Cancelled,
}

struct Inner {
    state: Mutex<State>,
    registers: Arc<dyn RegisterFile>,
    flag: usize,
}

/// Handle de uso único: grava `true` na flag de término no máximo uma vez.
///
/// Pode ser clonado e entregue à thread de áudio. A gravação da flag acontece
/// com o lock interno tomado, então quem chama [`Completion::complete`] depois
/// de outra thread já ter começado espera a gravação terminar.
#[derive(Clone)]
pub struct Completion {
    inner: Arc<Inner>,
}

impl Completion {
    pub fn new(registers: Arc<dyn RegisterFile>, flag: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::Armed),
                registers,
                flag,
            }),
        }
    }

    /// Grava a flag se ainda estiver armado. Retorna `true` se esta chamada
    /// foi a que gravou.
    pub fn complete(&self) -> bool {
        let mut state = self.inner.state.lock();
        Self::fire(&self.inner, &mut state)
    }

    /// Como [`Completion::complete`], mas sem bloquear. Se outra thread está
    /// no meio da gravação, retorna `None` e deixa que ela termine.
    pub fn try_complete(&self) -> Option<bool> {
        let mut state = self.inner.state.try_lock()?;
        Some(Self::fire(&self.inner, &mut state))
    }

    /// Desarma sem gravar a flag. Retorna `true` se ainda estava armado.
    pub fn cancel(&self) -> bool {
        let mut state = self.inner.state.lock();
        if *state == State::Armed {
            *state = State::Cancelled;
            true
        } else {
            false
        }
    }

    pub fn is_armed(&self) -> bool {
        *self.inner.state.lock() == State::Armed
    }

    pub fn has_fired(&self) -> bool {
        *self.inner.state.lock() == State::Fired
    }

    pub fn flag(&self) -> usize {
        self.inner.flag
    }

    fn fire(inner: &Inner, state: &mut State) -> bool {
        if *state != State::Armed {
            return false;
        }
        inner.registers.set_flag(inner.flag, true);
        *state = State::Fired;
        true
    }
}
