// src/runtime/abort.rs

//! Encerramento cooperativo do interpretador.
//!
//! Um comando de saída no meio de um script não desenrola a pilha: ele vira
//! [`Halt::Quit`], que sobe pela cadeia de chamadas com `?` até o topo do
//! laço do interpretador. O [`AbortSignal`] cobre o caso em que o pedido vem
//! de fora (janela fechada): o interpretador o consulta nos pontos de espera.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;

/// Motivo pelo qual o interpretador deixa de executar instruções.
#[derive(Debug, Error)]
pub enum Halt {
    /// Saída pedida pelo usuário. Não é erro.
    #[error("Saída solicitada")]
    Quit,

    /// Falha real dentro de um tick.
    #[error("Falha no interpretador: {0}")]
    Fault(#[from] anyhow::Error),
}

impl Halt {
    pub fn is_quit(&self) -> bool {
        matches!(self, Halt::Quit)
    }
}

/// Resultado de um passo do interpretador.
pub type Step<T = ()> = Result<T, Halt>;

/// Pedido de encerramento compartilhado entre as threads.
#[derive(Clone, Default, Debug)]
pub struct AbortSignal {
    raised: Arc<AtomicBool>,
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pede o encerramento. Pode ser chamado de qualquer thread, várias vezes.
    pub fn raise(&self) {
        self.raised.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }

    /// Ponto de espera: retorna [`Halt::Quit`] se o encerramento foi pedido.
    ///
    /// Scripts em espera ativa numa variável devem chamar isto a cada volta.
    pub fn check(&self) -> Step {
        if self.is_raised() {
            Err(Halt::Quit)
        } else {
            Ok(())
        }
    }
}
