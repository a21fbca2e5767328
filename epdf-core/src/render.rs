use crate::error::{Error, Result};

/// RGBA8 bitmap produced by backends and consumed by render targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl RenderImage {
    /// Opaque white canvas.
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![255; width as usize * height as usize * 4],
        }
    }

    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        if pixels.len() != width as usize * height as usize * 4 {
            return Err(Error::InvalidArguments);
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        let px = self.pixels.get(offset..offset + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }

    /// Whether the buffer holds exactly `width * height` RGBA pixels.
    pub fn is_consistent(&self) -> bool {
        self.pixels.len() == self.width as usize * self.height as usize * 4
    }
}

/// Drawing surface handed to `render`. The core never looks inside it; backends
/// size their output from [`RenderTarget::size`] and hand the bitmap over.
pub trait RenderTarget {
    /// Width and height in pixels.
    fn size(&self) -> (u32, u32);

    fn draw(&mut self, image: &RenderImage) -> Result<()>;
}

impl RenderTarget for RenderImage {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Copies the overlapping top-left region of `image`.
    fn draw(&mut self, image: &RenderImage) -> Result<()> {
        if !self.is_consistent() || !image.is_consistent() {
            return Err(Error::InvalidArguments);
        }
        let cols = self.width.min(image.width) as usize;
        let rows = self.height.min(image.height);
        for row in 0..rows {
            let src = row as usize * image.width as usize * 4;
            let dst = row as usize * self.width as usize * 4;
            self.pixels[dst..dst + cols * 4].copy_from_slice(&image.pixels[src..src + cols * 4]);
        }
        Ok(())
    }
}

/// Rectangle in untransformed page units, origin at the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rectangle {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl Rectangle {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Same rectangle with the corners ordered so that `x1 <= x2` and `y1 <= y2`.
    pub fn normalized(self) -> Self {
        Self {
            x1: self.x1.min(self.x2),
            y1: self.y1.min(self.y2),
            x2: self.x1.max(self.x2),
            y2: self.y1.max(self.y2),
        }
    }

    pub fn width(&self) -> f64 {
        (self.x2 - self.x1).abs()
    }

    pub fn height(&self) -> f64 {
        (self.y2 - self.y1).abs()
    }
}

/// Identifies an image embedded in a page; the meaning of the id is backend-defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageId(pub usize);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draw_copies_overlapping_region() {
        let mut target = RenderImage::blank(2, 2);
        let source =
            RenderImage::from_rgba(3, 1, vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 9, 9, 9]).unwrap();

        target.draw(&source).unwrap();

        assert_eq!(target.pixel(0, 0), Some([1, 2, 3, 4]));
        assert_eq!(target.pixel(1, 0), Some([5, 6, 7, 8]));
        assert_eq!(target.pixel(0, 1), Some([255, 255, 255, 255]));
        assert_eq!(target.pixel(2, 0), None);
    }

    #[test]
    fn mismatched_buffers_are_rejected_instead_of_panicking() {
        let short = RenderImage {
            width: 4,
            height: 4,
            pixels: vec![0; 8],
        };
        let mut target = RenderImage::blank(2, 2);

        assert!(!short.is_consistent());
        assert_eq!(short.pixel(3, 3), None);
        assert_eq!(target.draw(&short), Err(Error::InvalidArguments));

        let mut short_target = short.clone();
        assert_eq!(
            short_target.draw(&RenderImage::blank(1, 1)),
            Err(Error::InvalidArguments)
        );
        assert_eq!(target.pixel(0, 0), Some([255, 255, 255, 255]));
    }

    #[test]
    fn from_rgba_rejects_mismatched_buffer() {
        assert_eq!(
            RenderImage::from_rgba(2, 2, vec![0; 3]),
            Err(Error::InvalidArguments)
        );
    }

    #[test]
    fn rectangle_normalization_orders_corners() {
        let rect = Rectangle::new(10.0, 40.0, 2.0, 5.0).normalized();
        assert_eq!(rect, Rectangle::new(2.0, 5.0, 10.0, 40.0));
        assert_eq!(rect.width(), 8.0);
        assert_eq!(rect.height(), 35.0);
    }
}
