use bitvec::{BitArr, array::BitArray, slice::BitSlice};

pub const DISPLAY_WIDTH: usize = 64;
pub const DISPLAY_HEIGHT: usize = 32;

/// Monochrome 64x32 screen, stored row-major one bit per pixel.
pub struct Framebuffer {
    pixels: BitArr!(for DISPLAY_WIDTH * DISPLAY_HEIGHT),
}

impl Framebuffer {
    pub fn new() -> Self {
        Framebuffer {
            pixels: BitArray::ZERO,
        }
    }

    pub fn clear(&mut self) {
        self.pixels.fill(false);
    }

    /// Pixel at column `x`, row `y`. Coordinates wrap around the screen.
    pub fn pixel(&self, x: usize, y: usize) -> bool {
        self.pixels[Self::offset(x, y)]
    }

    pub fn rows(&self) -> impl Iterator<Item = &BitSlice> {
        self.pixels[..DISPLAY_WIDTH * DISPLAY_HEIGHT].chunks(DISPLAY_WIDTH)
    }

    pub fn lit_pixels(&self) -> usize {
        self.pixels.count_ones()
    }

    /// XORs `sprite` onto the screen with its top-left corner at (`x`, `y`).
    ///
    /// Each byte is one row, most significant bit leftmost. The start position
    /// always wraps; pixels running past an edge wrap too unless `clip` is set,
    /// in which case they are dropped. Returns true if any lit pixel was turned off.
    pub fn draw_sprite(&mut self, x: usize, y: usize, sprite: &[u8], clip: bool) -> bool {
        let x = x % DISPLAY_WIDTH;
        let y = y % DISPLAY_HEIGHT;
        let mut collision = false;

        for (row, &byte) in sprite.iter().enumerate() {
            let pixel_y = y + row;
            if clip && pixel_y >= DISPLAY_HEIGHT {
                break;
            }

            for bit in 0..8 {
                if (byte >> (7 - bit)) & 1 == 0 {
                    continue;
                }
                let pixel_x = x + bit;
                if clip && pixel_x >= DISPLAY_WIDTH {
                    break;
                }

                let index = Self::offset(pixel_x, pixel_y);
                let current_pixel = self.pixels[index];
                collision |= current_pixel;
                self.pixels.set(index, !current_pixel);
            }
        }
        collision
    }

    fn offset(x: usize, y: usize) -> usize {
        (y % DISPLAY_HEIGHT) * DISPLAY_WIDTH + (x % DISPLAY_WIDTH)
    }
}

impl Default for Framebuffer {
    fn default() -> Self {
        Self::new()
    }
}
