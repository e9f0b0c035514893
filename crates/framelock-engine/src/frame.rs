use rayon::prelude::*;

use framelock_core::clip::FilterPreset;

use crate::error::{EngineError, Result};

// =============================================================================
// FrameBuffer
// =============================================================================

/// An owned RGBA pixel buffer. 4 bytes per pixel, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameBuffer {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl FrameBuffer {
    /// Create a new transparent black buffer.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0u8; width as usize * height as usize * 4],
        }
    }

    /// A buffer filled with one colour.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let mut frame = Self::new(width, height);
        frame.fill(rgba);
        frame
    }

    pub fn from_rgba_vec(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if data.len() != expected {
            return Err(EngineError::InvalidFrame(format!(
                "RGBA data length {} doesn't match {}x{}x4={}",
                data.len(),
                width,
                height,
                expected
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn fill(&mut self, rgba: [u8; 4]) {
        for pixel in self.data.chunks_exact_mut(4) {
            pixel.copy_from_slice(&rgba);
        }
    }

    /// Get pixel RGBA at (x, y). Panics if out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let idx = (y as usize * self.width as usize + x as usize) * 4;
        [
            self.data[idx],
            self.data[idx + 1],
            self.data[idx + 2],
            self.data[idx + 3],
        ]
    }

    /// Get mutable pixel RGBA at (x, y). Panics if out of bounds.
    pub fn pixel_mut(&mut self, x: u32, y: u32) -> &mut [u8] {
        let idx = (y as usize * self.width as usize + x as usize) * 4;
        &mut self.data[idx..idx + 4]
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// A copy with the colour filter applied. Alpha is preserved.
    pub fn filtered(&self, preset: FilterPreset) -> FrameBuffer {
        let mut out = self.clone();
        out.apply_filter(preset);
        out
    }

    pub fn apply_filter(&mut self, preset: FilterPreset) {
        let ops = color_ops(preset);
        if ops.is_empty() || self.is_empty() {
            return;
        }
        // Row-based parallelism to avoid rayon micro-task overhead
        let row_bytes = self.width as usize * 4;
        self.data.par_chunks_exact_mut(row_bytes).for_each(|row| {
            for pixel in row.chunks_exact_mut(4) {
                let rgb = apply_color_ops(
                    &ops,
                    [
                        pixel[0] as f32 / 255.0,
                        pixel[1] as f32 / 255.0,
                        pixel[2] as f32 / 255.0,
                    ],
                );
                for (channel, value) in pixel.iter_mut().zip(rgb) {
                    *channel = (value * 255.0).round().clamp(0.0, 255.0) as u8;
                }
            }
        });
    }
}

// =============================================================================
// Colour filters
// =============================================================================

/// One step of a colour filter, applied to normalized RGB.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColorOp {
    Matrix([[f32; 3]; 3]),
    Contrast(f32),
    Invert,
}

/// The fixed operation chain behind each preset.
pub fn color_ops(preset: FilterPreset) -> Vec<ColorOp> {
    match preset {
        FilterPreset::None => Vec::new(),
        FilterPreset::BlackWhite => vec![ColorOp::Matrix(grayscale_matrix(1.0))],
        FilterPreset::Sepia => vec![
            ColorOp::Matrix(sepia_matrix(0.4)),
            ColorOp::Contrast(1.2),
        ],
        FilterPreset::Invert => vec![ColorOp::Invert],
        FilterPreset::Vhs => vec![
            ColorOp::Matrix(saturate_matrix(2.0)),
            ColorOp::Contrast(1.3),
            ColorOp::Matrix(hue_rotate_matrix(-10.0)),
        ],
    }
}

pub fn apply_color_ops(ops: &[ColorOp], rgb: [f32; 3]) -> [f32; 3] {
    ops.iter().fold(rgb, |[r, g, b], op| {
        let out = match op {
            ColorOp::Matrix(m) => [
                m[0][0] * r + m[0][1] * g + m[0][2] * b,
                m[1][0] * r + m[1][1] * g + m[1][2] * b,
                m[2][0] * r + m[2][1] * g + m[2][2] * b,
            ],
            ColorOp::Contrast(c) => [
                (r - 0.5) * c + 0.5,
                (g - 0.5) * c + 0.5,
                (b - 0.5) * c + 0.5,
            ],
            ColorOp::Invert => [1.0 - r, 1.0 - g, 1.0 - b],
        };
        out.map(|v| v.clamp(0.0, 1.0))
    })
}

fn grayscale_matrix(amount: f32) -> [[f32; 3]; 3] {
    let k = 1.0 - amount.clamp(0.0, 1.0);
    [
        [0.2126 + 0.7874 * k, 0.7152 - 0.7152 * k, 0.0722 - 0.0722 * k],
        [0.2126 - 0.2126 * k, 0.7152 + 0.2848 * k, 0.0722 - 0.0722 * k],
        [0.2126 - 0.2126 * k, 0.7152 - 0.7152 * k, 0.0722 + 0.9278 * k],
    ]
}

fn sepia_matrix(amount: f32) -> [[f32; 3]; 3] {
    let k = 1.0 - amount.clamp(0.0, 1.0);
    [
        [0.393 + 0.607 * k, 0.769 - 0.769 * k, 0.189 - 0.189 * k],
        [0.349 - 0.349 * k, 0.686 + 0.314 * k, 0.168 - 0.168 * k],
        [0.272 - 0.272 * k, 0.534 - 0.534 * k, 0.131 + 0.869 * k],
    ]
}

fn saturate_matrix(s: f32) -> [[f32; 3]; 3] {
    [
        [0.213 + 0.787 * s, 0.715 - 0.715 * s, 0.072 - 0.072 * s],
        [0.213 - 0.213 * s, 0.715 + 0.285 * s, 0.072 - 0.072 * s],
        [0.213 - 0.213 * s, 0.715 - 0.715 * s, 0.072 + 0.928 * s],
    ]
}

fn hue_rotate_matrix(degrees: f32) -> [[f32; 3]; 3] {
    let (sin, cos) = degrees.to_radians().sin_cos();
    [
        [
            0.213 + cos * 0.787 - sin * 0.213,
            0.715 - cos * 0.715 - sin * 0.715,
            0.072 - cos * 0.072 + sin * 0.928,
        ],
        [
            0.213 - cos * 0.213 + sin * 0.143,
            0.715 + cos * 0.285 + sin * 0.140,
            0.072 - cos * 0.072 - sin * 0.283,
        ],
        [
            0.213 - cos * 0.213 - sin * 0.787,
            0.715 - cos * 0.715 + sin * 0.715,
            0.072 + cos * 0.928 + sin * 0.072,
        ],
    ]
}
