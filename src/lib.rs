//! AGIStrife - núcleo de execução de um interpretador AGI
//!
//! Duas threads de longa duração dividem o trabalho:
//!
//! - a do **interpretador** executa um tick do jogo por vez ([`runtime`]),
//!   desenha na superfície de escrita e publica o quadro;
//! - a de **apresentação** conta o tempo ([`registers::TickSource`]), grava a
//!   entrada do teclado e mostra o último quadro publicado.
//!
//! Elas compartilham o banco de registradores ([`registers`]), o pipeline de
//! buffer triplo ([`video`]) e nada mais.

pub mod config;
pub mod demo;
pub mod registers;
pub mod runtime;
pub mod saved_games;
pub mod sound;
pub mod video;
