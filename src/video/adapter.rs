//! Adaptador de pixels da plataforma.
//!
//! Converte o plano visual (índices EGA) para o formato da janela
//! (0x00RRGGBB, usado pelo minifb) e grava capturas de tela em PNG.

use std::path::Path;

use anyhow::{Context, Result};
use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

use super::surface::Surface;

/// Paleta EGA padrão de 16 cores, em 0x00RRGGBB.
pub const EGA_PALETTE: [u32; 16] = [
    0x000000, 0x0000AA, 0x00AA00, 0x00AAAA, 0xAA0000, 0xAA00AA, 0xAA5500, 0xAAAAAA,
    0x555555, 0x5555FF, 0x55FF55, 0x55FFFF, 0xFF5555, 0xFF55FF, 0xFFFF55, 0xFFFFFF,
];

/// Converte um índice EGA para 0x00RRGGBB.
#[inline]
pub fn ega_to_rgb(index: u8) -> u32 {
    EGA_PALETTE[(index & 0x0F) as usize]
}

/// Paleta usada na conversão para a janela.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Palette {
    #[default]
    Ega,
    /// Tons de cinza pela luminância de cada cor EGA.
    Grayscale,
}

impl Palette {
    #[inline]
    pub fn rgb(self, index: u8) -> u32 {
        let rgb = ega_to_rgb(index);
        match self {
            Palette::Ega => rgb,
            Palette::Grayscale => {
                let r = (rgb >> 16) & 0xFF;
                let g = (rgb >> 8) & 0xFF;
                let b = rgb & 0xFF;
                let luma = (r * 299 + g * 587 + b * 114) / 1000;
                (luma << 16) | (luma << 8) | luma
            }
        }
    }
}

/// Copia a superfície para o buffer da janela, ampliando cada pixel AGI
/// para `scale_x` x `scale_y` pixels. Pixels do AGI são 2x1 na tela real.
pub fn blit_scaled(
    surface: &Surface,
    palette: Palette,
    buffer: &mut [u32],
    scale_x: usize,
    scale_y: usize,
) {
    let out_width = surface.width * scale_x;
    debug_assert!(buffer.len() >= out_width * surface.height * scale_y);

    for y in 0..surface.height {
        let src_row = &surface.visual[y * surface.width..(y + 1) * surface.width];
        for dy in 0..scale_y {
            let out_row = (y * scale_y + dy) * out_width;
            for (x, &index) in src_row.iter().enumerate() {
                let color = palette.rgb(index);
                let start = out_row + x * scale_x;
                buffer[start..start + scale_x].fill(color);
            }
        }
    }
}

/// Grava a superfície como PNG (captura de tela).
pub fn save_screenshot<P: AsRef<Path>>(surface: &Surface, palette: Palette, path: P) -> Result<()> {
    let path: &Path = path.as_ref();
    let image: RgbaImage = RgbaImage::from_fn(surface.width as u32, surface.height as u32, |x, y| {
        let index = surface.visual[y as usize * surface.width + x as usize];
        let rgb = palette.rgb(index);
        Rgba([(rgb >> 16) as u8, (rgb >> 8) as u8, rgb as u8, 0xFF])
    });

    image
        .save(path)
        .with_context(|| format!("Failed to save screenshot: {}", path.display()))?;
    Ok(())
}
