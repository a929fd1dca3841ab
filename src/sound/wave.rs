//! Geração de WAV PCM em memória (tons simples para o demo e testes).

const BITS_PER_SAMPLE: u16 = 16;
const CHANNELS: u16 = 1;

/// Gera um WAV mono de 16 bits com uma onda quadrada.
pub fn square_wave_wav(frequency_hz: u32, duration_ms: u32, sample_rate: u32) -> Vec<u8> {
    let num_samples = (sample_rate as u64 * duration_ms as u64 / 1000) as u32;
    let half_period = (sample_rate / (2 * frequency_hz.max(1))).max(1);

    let mut samples: Vec<i16> = Vec::with_capacity(num_samples as usize);
    for i in 0..num_samples {
        let high = (i / half_period) % 2 == 0;
        samples.push(if high { 8000 } else { -8000 });
    }
    pcm16_wav(&samples, sample_rate)
}

/// Empacota amostras PCM de 16 bits num arquivo RIFF/WAVE.
pub fn pcm16_wav(samples: &[i16], sample_rate: u32) -> Vec<u8> {
    let block_align: u16 = CHANNELS * BITS_PER_SAMPLE / 8;
    let byte_rate: u32 = sample_rate * block_align as u32;
    let data_len: u32 = (samples.len() * 2) as u32;

    let mut out: Vec<u8> = Vec::with_capacity(44 + data_len as usize);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");

    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&CHANNELS.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());

    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    for sample in samples {
        out.extend_from_slice(&sample.to_le_bytes());
    }
    out
}
