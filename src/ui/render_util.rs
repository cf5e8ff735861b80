use super::{Arc, ImageBuffer, ImageFrame, RenderImage, Rgba};
use crate::{pipeline::overlay::OverlayFrame, types::Frame};

pub(super) fn frame_to_image(frame: &Frame) -> Option<Arc<RenderImage>> {
    rgba_to_image(frame.rgba.clone(), frame.width, frame.height)
}

pub(super) fn overlay_to_image(overlay: &OverlayFrame) -> Option<Arc<RenderImage>> {
    let (width, height) = overlay.image.dimensions();
    if width == 0 || height == 0 {
        return None;
    }
    rgba_to_image(overlay.image.as_raw().clone(), width, height)
}

// gpui expects BGRA.
fn rgba_to_image(mut pixels: Vec<u8>, width: u32, height: u32) -> Option<Arc<RenderImage>> {
    for px in pixels.chunks_exact_mut(4) {
        px.swap(0, 2);
    }

    let buffer = ImageBuffer::<Rgba<u8>, Vec<u8>>::from_raw(width, height, pixels)?;
    let frame = ImageFrame::new(buffer);

    Some(Arc::new(RenderImage::new(vec![frame])))
}
