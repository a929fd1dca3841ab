// src/saved_games.rs

//! Jogos salvos.
//!
//! O armazenamento dos arquivos depende da plataforma e fica atrás do trait
//! [`SavedGameStore`]. O formato do conteúdo é comum a todas:
//!
//! ```text
//! 0..31   descrição (ISO-8859-1, terminada em NUL)
//! 33..40  id do jogo ("SQ2", "KQ3", ...), preenchido com NUL
//! 40..    estado dos registradores (bincode)
//! ```

use std::fs;
use std::path::PathBuf;
use std::time::UNIX_EPOCH;

use bincode::config;
use log::{debug, info, warn};
use thiserror::Error;

use crate::registers::{RegisterFile, RegisterSnapshot};
use crate::sound::AudioCompletionSignal;
use crate::video::SpriteSnapshots;

const DESCRIPTION_LEN: usize = 31;
const GAME_ID_OFFSET: usize = 33;
const GAME_ID_LEN: usize = 7;
const HEADER_LEN: usize = GAME_ID_OFFSET + GAME_ID_LEN;

/// Teto em bytes para o estado decodificado; um arquivo corrompido não pode
/// pedir alocações maiores que isso.
const STATE_LIMIT: usize = 64 * 1024;

fn state_config() -> impl config::Config {
    config::standard().with_limit::<STATE_LIMIT>()
}

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("Arquivo de jogo salvo muito curto ({0} bytes)")]
    TooShort(usize),

    #[error("Jogo salvo pertence a '{found}', esperado '{expected}'")]
    GameIdMismatch { expected: String, found: String },

    #[error("Falha ao codificar o estado: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("Falha ao decodificar o estado: {0}")]
    Decode(#[from] bincode::error::DecodeError),
}

/// Um jogo salvo, existente ou não.
#[derive(Clone, Debug, Default)]
pub struct SavedGame {
    pub num: u32,
    pub exists: bool,
    pub path: PathBuf,
    /// Última modificação, em segundos desde 1970.
    pub file_time: u64,
    pub description: String,
    pub data: Vec<u8>,
}

/// Leitura e escrita dos arquivos de jogo salvo, sem interpretar o conteúdo.
///
/// `false` e jogos inexistentes são resultados normais, repassados ao script.
pub trait SavedGameStore: Send {
    /// Cria a pasta do jogo. Não faz nada se ela já existir.
    fn create_folder_for_game(&self, game_id: &str) -> bool;

    /// Nome completo da pasta, só para exibição.
    fn folder_name_for_game(&self, game_id: &str) -> String;

    fn saved_game_by_number(&self, game_id: &str, num: u32) -> SavedGame;

    fn save_game(&self, saved_game: &SavedGame, data: &[u8]) -> bool;
}

/// Jogos salvos em disco: `<raiz>/<id>/<id>SG.<num>`.
pub struct FsSavedGameStore {
    root: PathBuf,
}

impl FsSavedGameStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    fn folder(&self, game_id: &str) -> PathBuf {
        self.root.join(game_id)
    }
}

impl SavedGameStore for FsSavedGameStore {
    fn create_folder_for_game(&self, game_id: &str) -> bool {
        match fs::create_dir_all(self.folder(game_id)) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to create saved game folder for {}: {}", game_id, e);
                false
            }
        }
    }

    fn folder_name_for_game(&self, game_id: &str) -> String {
        self.folder(game_id).display().to_string()
    }

    fn saved_game_by_number(&self, game_id: &str, num: u32) -> SavedGame {
        let path: PathBuf = self.folder(game_id).join(format!("{}SG.{}", game_id, num));
        let mut saved = SavedGame {
            num,
            path,
            ..SavedGame::default()
        };

        let data: Vec<u8> = match fs::read(&saved.path) {
            Ok(data) => data,
            Err(_) => return saved,
        };
        let Ok(header) = parse_header(&data) else {
            return saved;
        };
        if header.game_id != game_id {
            debug!("{} belongs to {}, ignoring", saved.path.display(), header.game_id);
            return saved;
        }

        saved.file_time = fs::metadata(&saved.path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map_or(0, |d| d.as_secs());
        saved.description = header.description;
        saved.data = data;
        saved.exists = true;
        saved
    }

    fn save_game(&self, saved_game: &SavedGame, data: &[u8]) -> bool {
        match fs::write(&saved_game.path, data) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to write {}: {}", saved_game.path.display(), e);
                false
            }
        }
    }
}

struct Header {
    description: String,
    game_id: String,
}

/// Lê um campo de texto ISO-8859-1 terminado em NUL.
fn latin1_field(bytes: &[u8]) -> String {
    bytes.iter().take_while(|&&b| b != 0).map(|&b| b as char).collect()
}

fn write_latin1_field(out: &mut [u8], text: &str) {
    let bytes = text.chars().map(|c| if (c as u32) <= 0xFF { c as u8 } else { b'?' });
    for (slot, byte) in out.iter_mut().zip(bytes) {
        *slot = byte;
    }
}

fn parse_header(data: &[u8]) -> Result<Header, SaveError> {
    if data.len() < HEADER_LEN {
        return Err(SaveError::TooShort(data.len()));
    }
    Ok(Header {
        description: latin1_field(&data[..DESCRIPTION_LEN]),
        game_id: latin1_field(&data[GAME_ID_OFFSET..HEADER_LEN]),
    })
}

/// Monta o conteúdo de um jogo salvo. Descrição e id longos demais são
/// truncados.
pub fn encode_saved_game(
    description: &str,
    game_id: &str,
    registers: &RegisterSnapshot,
) -> Result<Vec<u8>, SaveError> {
    let mut data: Vec<u8> = vec![0; HEADER_LEN];
    // O último byte da descrição fica NUL.
    write_latin1_field(&mut data[..DESCRIPTION_LEN - 1], description);
    write_latin1_field(&mut data[GAME_ID_OFFSET..HEADER_LEN], game_id);

    let state: Vec<u8> = bincode::encode_to_vec(registers, state_config())?;
    data.extend_from_slice(&state);
    Ok(data)
}

/// Separa descrição e estado, conferindo o id do jogo.
pub fn decode_saved_game(game_id: &str, data: &[u8]) -> Result<(String, RegisterSnapshot), SaveError> {
    let header: Header = parse_header(data)?;
    if header.game_id != game_id {
        return Err(SaveError::GameIdMismatch {
            expected: game_id.to_string(),
            found: header.game_id,
        });
    }

    let (snapshot, _): (RegisterSnapshot, usize) =
        bincode::decode_from_slice(&data[HEADER_LEN..], state_config())?;
    Ok((header.description, snapshot))
}

/// Salva o estado atual no slot `num`. Retorna `Ok(false)` se o
/// armazenamento recusou a gravação.
pub fn save_game(
    store: &dyn SavedGameStore,
    game_id: &str,
    num: u32,
    description: &str,
    registers: &dyn RegisterFile,
) -> Result<bool, SaveError> {
    if !store.create_folder_for_game(game_id) {
        return Ok(false);
    }

    let target: SavedGame = store.saved_game_by_number(game_id, num);
    let data: Vec<u8> = encode_saved_game(description, game_id, &registers.snapshot())?;
    let written = store.save_game(&target, &data);
    if written {
        info!("Saved game {} slot {} ({})", game_id, num, description);
    }
    Ok(written)
}

/// Restaura o slot `num`. Retorna `Ok(false)` se ele não existir.
///
/// Depois de aplicar os registradores, o som pendente é descartado e as
/// áreas de fundo dos sprites são esquecidas: elas pertencem à tela antiga.
pub fn restore_game(
    store: &dyn SavedGameStore,
    game_id: &str,
    num: u32,
    registers: &dyn RegisterFile,
    audio: &mut AudioCompletionSignal,
    sprites: &mut SpriteSnapshots,
) -> Result<bool, SaveError> {
    let saved: SavedGame = store.saved_game_by_number(game_id, num);
    if !saved.exists {
        debug!("No saved game {} in {}", num, store.folder_name_for_game(game_id));
        return Ok(false);
    }

    let (description, snapshot) = decode_saved_game(game_id, &saved.data)?;
    audio.reset();
    sprites.clear();
    registers.restore(&snapshot);

    info!("Restored game {} slot {} ({})", game_id, num, description);
    Ok(true)
}
