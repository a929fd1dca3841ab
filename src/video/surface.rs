/// Superfície de desenho: plano visual + plano de prioridade.
///
/// O plano visual guarda um índice da paleta EGA por pixel; o plano de
/// prioridade guarda a profundidade/colisão usada pelos objetos animados.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Surface {
    pub width: usize,
    pub height: usize,
    pub visual: Vec<u8>,
    pub priority: Vec<u8>,
}

/// Retângulo em coordenadas de pixel. Pode começar fora da superfície.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: usize,
    pub height: usize,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: usize, height: usize) -> Self {
        Self { x, y, width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Recorta o retângulo aos limites `width` x `height`.
    pub fn clip(&self, width: usize, height: usize) -> Rect {
        let x0 = (self.x as i64).clamp(0, width as i64);
        let y0 = (self.y as i64).clamp(0, height as i64);
        let x1 = (self.x as i64 + self.width as i64).clamp(0, width as i64);
        let y1 = (self.y as i64 + self.height as i64).clamp(0, height as i64);

        Rect {
            x: x0 as i32,
            y: y0 as i32,
            width: (x1 - x0).max(0) as usize,
            height: (y1 - y0).max(0) as usize,
        }
    }
}

impl Surface {
    /// Cria uma superfície limpa (cor 0, prioridade 0).
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            visual: vec![0; width * height],
            priority: vec![0; width * height],
        }
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width, self.height)
    }

    /// Limpa os dois planos.
    pub fn clear(&mut self, color: u8, priority: u8) {
        self.visual.fill(color);
        self.priority.fill(priority);
    }

    /// Define um pixel (com bounds check). Escritas fora da tela são
    /// ignoradas; alguns jogos desenham além da borda.
    pub fn set_pixel(&mut self, x: i32, y: i32, color: u8, priority: u8) {
        if let Some(index) = self.index_of(x, y) {
            self.visual[index] = color;
            self.priority[index] = priority;
        }
    }

    pub fn pixel(&self, x: i32, y: i32) -> Option<(u8, u8)> {
        self.index_of(x, y)
            .map(|index| (self.visual[index], self.priority[index]))
    }

    /// Preenche um retângulo (recortado) com cor e prioridade.
    pub fn fill_rect(&mut self, rect: Rect, color: u8, priority: u8) {
        let clipped = rect.clip(self.width, self.height);
        for row in 0..clipped.height {
            let start = (clipped.y as usize + row) * self.width + clipped.x as usize;
            self.visual[start..start + clipped.width].fill(color);
            self.priority[start..start + clipped.width].fill(priority);
        }
    }

    /// Copia o conteúdo de outra superfície do mesmo tamanho.
    pub fn copy_from(&mut self, other: &Surface) {
        debug_assert_eq!((self.width, self.height), (other.width, other.height));
        self.visual.copy_from_slice(&other.visual);
        self.priority.copy_from_slice(&other.priority);
    }

    fn index_of(&self, x: i32, y: i32) -> Option<usize> {
        if x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height {
            Some(y as usize * self.width + x as usize)
        } else {
            None
        }
    }
}
