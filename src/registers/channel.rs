// src/registers/channel.rs

//! Emulação do banco de registradores por troca de mensagens.
//!
//! Usada quando as threads não podem compartilhar memória diretamente. Uma
//! thread "host" é a única dona dos vetores de flags e variáveis; os clientes
//! enviam pedidos por um canal e o host os aplica um de cada vez. Como só o
//! host toca nos dados, cada pedido (inclusive o incremento) é atômico.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use log::{debug, warn};

use super::{RegisterFile, NUM_FLAGS, NUM_VARS};

/// Pedidos atendidos pelo host.
enum Request {
    GetFlag(usize, Sender<bool>),
    SetFlag(usize, bool),
    GetVar(usize, Sender<u8>),
    SetVar(usize, u8),
    IncrementVar(usize, Sender<u8>),
    GetTotalTicks(Sender<u64>),
    SetTotalTicks(u64),
    IncrementTotalTicks(Sender<u64>),
    Shutdown,
}

/// Estado mantido exclusivamente pela thread host.
struct HostState {
    flags: Vec<bool>,
    vars: Vec<u8>,
    total_ticks: u64,
}

impl HostState {
    fn serve(mut self, requests: Receiver<Request>) {
        // Respostas com send() ignoram erro: o cliente pode ter desistido.
        for request in requests {
            match request {
                Request::GetFlag(i, reply) => {
                    let _ = reply.send(self.flags[i]);
                }
                Request::SetFlag(i, value) => self.flags[i] = value,
                Request::GetVar(i, reply) => {
                    let _ = reply.send(self.vars[i]);
                }
                Request::SetVar(i, value) => self.vars[i] = value,
                Request::IncrementVar(i, reply) => {
                    self.vars[i] = self.vars[i].wrapping_add(1);
                    let _ = reply.send(self.vars[i]);
                }
                Request::GetTotalTicks(reply) => {
                    let _ = reply.send(self.total_ticks);
                }
                Request::SetTotalTicks(ticks) => self.total_ticks = ticks,
                Request::IncrementTotalTicks(reply) => {
                    self.total_ticks += 1;
                    let _ = reply.send(self.total_ticks);
                }
                Request::Shutdown => break,
            }
        }
        debug!("Register host stopped");
    }
}

/// Dono da thread host. Ao ser descartado, encerra a thread.
pub struct RegisterHost {
    requests: Sender<Request>,
    handle: Option<JoinHandle<()>>,
}

impl RegisterHost {
    /// Inicia o host com o tamanho padrão do AGI e retorna o primeiro cliente.
    pub fn spawn() -> std::io::Result<(Self, ChannelRegisterFile)> {
        Self::spawn_with_sizes(NUM_FLAGS, NUM_VARS)
    }

    pub fn spawn_with_sizes(
        num_flags: usize,
        num_vars: usize,
    ) -> std::io::Result<(Self, ChannelRegisterFile)> {
        let (tx, rx) = unbounded();
        let state = HostState {
            flags: vec![false; num_flags],
            vars: vec![0; num_vars],
            total_ticks: 0,
        };

        let handle: JoinHandle<()> = thread::Builder::new()
            .name("register-host".into())
            .spawn(move || state.serve(rx))?;

        let client = ChannelRegisterFile {
            requests: tx.clone(),
            num_flags,
            num_vars,
            degraded: Arc::new(AtomicBool::new(false)),
        };

        Ok((
            Self {
                requests: tx,
                handle: Some(handle),
            },
            client,
        ))
    }

    /// Encerra o host e espera a thread terminar.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = self.requests.send(Request::Shutdown);
            if handle.join().is_err() {
                warn!("Register host thread panicked");
            }
        }
    }
}

impl Drop for RegisterHost {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Cliente do banco emulado. Pode ser clonado e enviado para outras threads.
#[derive(Clone)]
pub struct ChannelRegisterFile {
    requests: Sender<Request>,
    num_flags: usize,
    num_vars: usize,
    degraded: Arc<AtomicBool>,
}

impl ChannelRegisterFile {
    fn check_flag(&self, index: usize) {
        assert!(
            index < self.num_flags,
            "flag index {} out of range (0..{})",
            index,
            self.num_flags
        );
    }

    fn check_var(&self, index: usize) {
        assert!(
            index < self.num_vars,
            "var index {} out of range (0..{})",
            index,
            self.num_vars
        );
    }

    /// Marca o banco como degradado, avisando só na primeira vez.
    fn host_gone(&self) {
        if !self.degraded.swap(true, Ordering::Relaxed) {
            warn!("Register host is gone; register access degraded to no-ops");
        }
    }

    fn post(&self, request: Request) {
        if self.requests.send(request).is_err() {
            self.host_gone();
        }
    }

    fn ask<T: Default>(&self, make: impl FnOnce(Sender<T>) -> Request) -> T {
        let (reply_tx, reply_rx) = bounded(1);
        if self.requests.send(make(reply_tx)).is_err() {
            self.host_gone();
            return T::default();
        }
        match reply_rx.recv() {
            Ok(value) => value,
            Err(_) => {
                self.host_gone();
                T::default()
            }
        }
    }

    /// Indica se o host deixou de responder.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }
}

impl RegisterFile for ChannelRegisterFile {
    fn flag_count(&self) -> usize {
        self.num_flags
    }

    fn var_count(&self) -> usize {
        self.num_vars
    }

    fn get_flag(&self, index: usize) -> bool {
        self.check_flag(index);
        self.ask(|reply| Request::GetFlag(index, reply))
    }

    fn set_flag(&self, index: usize, value: bool) {
        self.check_flag(index);
        self.post(Request::SetFlag(index, value));
    }

    fn get_var(&self, index: usize) -> u8 {
        self.check_var(index);
        self.ask(|reply| Request::GetVar(index, reply))
    }

    fn set_var(&self, index: usize, value: u8) {
        self.check_var(index);
        self.post(Request::SetVar(index, value));
    }

    fn increment_var(&self, index: usize) -> u8 {
        self.check_var(index);
        self.ask(|reply| Request::IncrementVar(index, reply))
    }

    fn get_total_ticks(&self) -> u64 {
        self.ask(Request::GetTotalTicks)
    }

    fn set_total_ticks(&self, ticks: u64) {
        self.post(Request::SetTotalTicks(ticks));
    }

    fn increment_total_ticks(&self) -> u64 {
        self.ask(Request::IncrementTotalTicks)
    }
}
