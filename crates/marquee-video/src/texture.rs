//! Frame-to-texture upload.
//!
//! Decoded RGBA frames are converted to [`egui::ColorImage`] and uploaded
//! through a reused [`egui::TextureHandle`]. The asset's preferred
//! transform is applied here, on the CPU, so layout code downstream only
//! ever sees display-oriented pixels.

use egui::{Color32, ColorImage, Context, TextureHandle, TextureOptions};

use marquee_video_core::video::{CpuFrame, VideoTransform};

/// Owns the texture the view presents.
pub(crate) struct FrameTexture {
    handle: Option<TextureHandle>,
}

impl FrameTexture {
    pub fn new() -> Self {
        Self { handle: None }
    }

    /// Uploads a frame, applying the preferred transform.
    pub fn upload(&mut self, ctx: &Context, frame: &CpuFrame, transform: VideoTransform) {
        let image = color_image(frame, transform);
        match &mut self.handle {
            Some(handle) => handle.set(image, TextureOptions::LINEAR),
            None => {
                self.handle = Some(ctx.load_texture("video-frame", image, TextureOptions::LINEAR));
            }
        }
    }

    /// Returns the current texture, if a frame has been uploaded.
    pub fn handle(&self) -> Option<&TextureHandle> {
        self.handle.as_ref()
    }

    /// Drops the texture (reconfigure).
    pub fn clear(&mut self) {
        self.handle = None;
    }
}

fn color_image(frame: &CpuFrame, transform: VideoTransform) -> ColorImage {
    let image = ColorImage::from_rgba_unmultiplied(
        [frame.width as usize, frame.height as usize],
        &frame.data,
    );
    match transform {
        VideoTransform::Identity => image,
        VideoTransform::Rotate90 => rotate_image_90_cw(image),
        VideoTransform::Rotate180 => rotate_image_180(image),
        VideoTransform::Rotate270 => rotate_image_270_cw(image),
    }
}

fn rotate_image_90_cw(image: ColorImage) -> ColorImage {
    let ColorImage { size, pixels } = image;
    let (w, h) = (size[0], size[1]);
    let mut rotated = vec![Color32::TRANSPARENT; pixels.len()];
    for y in 0..h {
        for x in 0..w {
            // (x, y) -> (h - 1 - y, x) in the h-wide output
            rotated[x * h + (h - 1 - y)] = pixels[y * w + x];
        }
    }
    ColorImage {
        size: [h, w],
        pixels: rotated,
    }
}

fn rotate_image_180(image: ColorImage) -> ColorImage {
    let ColorImage { size, mut pixels } = image;
    pixels.reverse();
    ColorImage { size, pixels }
}

fn rotate_image_270_cw(image: ColorImage) -> ColorImage {
    let ColorImage { size, pixels } = image;
    let (w, h) = (size[0], size[1]);
    let mut rotated = vec![Color32::TRANSPARENT; pixels.len()];
    for y in 0..h {
        for x in 0..w {
            // (x, y) -> (y, w - 1 - x) in the h-wide output
            rotated[(w - 1 - x) * h + y] = pixels[y * w + x];
        }
    }
    ColorImage {
        size: [h, w],
        pixels: rotated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_pixel_frame() -> CpuFrame {
        // [red, green] in one row
        CpuFrame::new(2, 1, vec![255, 0, 0, 255, 0, 255, 0, 255])
    }

    #[test]
    fn test_identity_preserves_layout() {
        let image = color_image(&two_pixel_frame(), VideoTransform::Identity);
        assert_eq!(image.size, [2, 1]);
        assert_eq!(image.pixels[0], Color32::from_rgb(255, 0, 0));
        assert_eq!(image.pixels[1], Color32::from_rgb(0, 255, 0));
    }

    #[test]
    fn test_rotate_90_cw() {
        let image = color_image(&two_pixel_frame(), VideoTransform::Rotate90);
        // A horizontal [red, green] becomes a vertical [red; green]
        assert_eq!(image.size, [1, 2]);
        assert_eq!(image.pixels[0], Color32::from_rgb(255, 0, 0));
        assert_eq!(image.pixels[1], Color32::from_rgb(0, 255, 0));
    }

    #[test]
    fn test_rotate_180() {
        let image = color_image(&two_pixel_frame(), VideoTransform::Rotate180);
        assert_eq!(image.size, [2, 1]);
        assert_eq!(image.pixels[0], Color32::from_rgb(0, 255, 0));
        assert_eq!(image.pixels[1], Color32::from_rgb(255, 0, 0));
    }

    #[test]
    fn test_rotate_270_cw() {
        let image = color_image(&two_pixel_frame(), VideoTransform::Rotate270);
        // 270 cw == 90 ccw: [red, green] becomes [green; red]
        assert_eq!(image.size, [1, 2]);
        assert_eq!(image.pixels[0], Color32::from_rgb(0, 255, 0));
        assert_eq!(image.pixels[1], Color32::from_rgb(255, 0, 0));
    }

    #[test]
    fn test_rotations_compose_to_identity() {
        let frame = CpuFrame::new(
            3,
            2,
            (0..3 * 2 * 4).map(|i| i as u8).collect(),
        );
        let original = color_image(&frame, VideoTransform::Identity);
        let once = rotate_image_90_cw(original.clone());
        let twice = rotate_image_90_cw(once);
        let thrice = rotate_image_90_cw(twice);
        let full = rotate_image_90_cw(thrice);
        assert_eq!(full.size, original.size);
        assert_eq!(full.pixels, original.pixels);
    }
}
