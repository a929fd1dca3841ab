// src/registers/shared.rs

//! Banco de registradores em memória compartilhada (tipos atômicos).

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};

use super::{RegisterFile, NUM_FLAGS, NUM_VARS};

/// Banco de registradores baseado em atômicos.
///
/// Cada slot é atômico por si só: leituras e escritas de slots diferentes
/// nunca se bloqueiam, e `increment_var`/`increment_total_ticks` são
/// operações read-modify-write únicas.
pub struct SharedRegisterFile {
    flags: Box<[AtomicBool]>,
    vars: Box<[AtomicU8]>,
    total_ticks: AtomicU64,
}

impl SharedRegisterFile {
    /// Cria um banco com o tamanho padrão do AGI (256 flags, 256 variáveis).
    pub fn new() -> Self {
        Self::with_sizes(NUM_FLAGS, NUM_VARS)
    }

    pub fn with_sizes(num_flags: usize, num_vars: usize) -> Self {
        Self {
            flags: (0..num_flags).map(|_| AtomicBool::new(false)).collect(),
            vars: (0..num_vars).map(|_| AtomicU8::new(0)).collect(),
            total_ticks: AtomicU64::new(0),
        }
    }

    fn flag(&self, index: usize) -> &AtomicBool {
        match self.flags.get(index) {
            Some(flag) => flag,
            None => panic!("flag index {} out of range (0..{})", index, self.flags.len()),
        }
    }

    fn var(&self, index: usize) -> &AtomicU8 {
        match self.vars.get(index) {
            Some(var) => var,
            None => panic!("var index {} out of range (0..{})", index, self.vars.len()),
        }
    }
}

impl Default for SharedRegisterFile {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterFile for SharedRegisterFile {
    fn flag_count(&self) -> usize {
        self.flags.len()
    }

    fn var_count(&self) -> usize {
        self.vars.len()
    }

    fn get_flag(&self, index: usize) -> bool {
        self.flag(index).load(Ordering::Acquire)
    }

    fn set_flag(&self, index: usize, value: bool) {
        self.flag(index).store(value, Ordering::Release);
    }

    fn get_var(&self, index: usize) -> u8 {
        self.var(index).load(Ordering::Acquire)
    }

    fn set_var(&self, index: usize, value: u8) {
        self.var(index).store(value, Ordering::Release);
    }

    fn increment_var(&self, index: usize) -> u8 {
        // fetch_add em AtomicU8 já faz o wrap em 256.
        self.var(index).fetch_add(1, Ordering::AcqRel).wrapping_add(1)
    }

    fn get_total_ticks(&self) -> u64 {
        self.total_ticks.load(Ordering::Acquire)
    }

    fn set_total_ticks(&self, ticks: u64) {
        self.total_ticks.store(ticks, Ordering::Release);
    }

    fn increment_total_ticks(&self) -> u64 {
        self.total_ticks.fetch_add(1, Ordering::AcqRel) + 1
    }
}
