use crate::Error;
use crate::engine::{Callback, PixelFormat, RenderContext, RenderTarget};
use gstreamer as gst;
use gstreamer_video as gst_video;
use parking_lot::Mutex;
use std::sync::Arc;
use yuv::{YuvBiPlanarImage, YuvConversionMode, YuvRange, YuvStandardMatrix};

/// Latest decoded sample, shared between the appsink and the render context.
#[derive(Debug, Default)]
pub(crate) struct FrameSlot {
    pub(crate) sample: Option<gst::Sample>,
    /// Bumped for every stored sample.
    pub(crate) serial: u64,
    /// Display aspect ratio forced through `video-aspect`.
    pub(crate) aspect_override: Option<f64>,
}

pub(crate) type SharedFrame = Arc<Mutex<FrameSlot>>;
pub(crate) type UpdateSlot = Arc<Mutex<Option<Callback>>>;

/// Called from the streaming thread for every new sample.
pub(crate) fn store_frame(frame: &SharedFrame, update: &UpdateSlot, sample: gst::Sample) {
    {
        let mut slot = frame.lock();
        slot.sample = Some(sample);
        slot.serial = slot.serial.wrapping_add(1);
    }

    let update = update.lock().clone();
    if let Some(update) = update {
        update();
    }
}

pub(crate) fn frame_size(frame: &SharedFrame) -> Option<(i32, i32)> {
    let slot = frame.lock();
    let caps = slot.sample.as_ref()?.caps()?;
    let s = caps.structure(0)?;
    Some((s.get::<i32>("width").ok()?, s.get::<i32>("height").ok()?))
}

/// Converted copy of the latest sample.
#[derive(Debug, Default)]
struct Converted {
    serial: Option<u64>,
    format: Option<PixelFormat>,
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

/// Renders the latest sample into caller-owned memory.
pub struct SoftwareRenderContext {
    frame: SharedFrame,
    update: UpdateSlot,
    converted: Converted,
}

impl SoftwareRenderContext {
    pub(crate) fn new(frame: SharedFrame, update: UpdateSlot) -> Self {
        Self {
            frame,
            update,
            converted: Converted::default(),
        }
    }

    /// Converts the stored sample if it changed since the last frame.
    /// Returns the aspect override that applies to it.
    fn refresh(&mut self, format: PixelFormat) -> Result<Option<f64>, Error> {
        let slot = self.frame.lock();
        let fresh = self.converted.serial == Some(slot.serial)
            && self.converted.format == Some(format);
        if !fresh {
            match slot.sample.as_ref() {
                Some(sample) => convert_nv12(sample, format, &mut self.converted)?,
                None => self.converted.pixels.clear(),
            }
            self.converted.serial = Some(slot.serial);
            self.converted.format = Some(format);
        }
        Ok(slot.aspect_override)
    }
}

impl RenderContext for SoftwareRenderContext {
    fn render(&mut self, target: RenderTarget<'_>) -> Result<(), Error> {
        let RenderTarget::Software {
            pixels,
            width,
            height,
            stride,
            format,
            flip_y,
        } = target
        else {
            return Err(Error::UnsupportedTarget);
        };
        if stride < width as usize * 4 || pixels.len() < stride * height as usize {
            return Err(Error::UnsupportedTarget);
        }

        let aspect_override = self.refresh(format)?;
        let src = &self.converted;
        let aspect = aspect_override.unwrap_or(if src.height > 0 {
            src.width as f64 / src.height as f64
        } else {
            1.0
        });

        blit_fitted(
            Image {
                pixels: &src.pixels,
                width: src.width,
                height: src.height,
            },
            pixels,
            width,
            height,
            stride,
            aspect,
            flip_y,
        );
        Ok(())
    }

    fn set_update_callback(&mut self, callback: Option<Callback>) {
        *self.update.lock() = callback;
    }
}

impl Drop for SoftwareRenderContext {
    fn drop(&mut self) {
        *self.update.lock() = None;
    }
}

fn convert_nv12(sample: &gst::Sample, format: PixelFormat, out: &mut Converted) -> Result<(), Error> {
    let caps = sample.caps().ok_or(Error::Caps)?;
    let info = gst_video::VideoInfo::from_caps(caps).map_err(|_| Error::Caps)?;
    let buffer = sample.buffer().ok_or(Error::Caps)?;
    let map = buffer.map_readable().map_err(|_| Error::Caps)?;
    let data = map.as_slice();

    let width = info.width();
    let height = info.height();
    let y_stride = info.stride()[0] as u32;
    let uv_stride = info.stride()[1] as u32;
    let y_offset = info.offset()[0];
    let uv_offset = info.offset()[1];

    let y_plane = data
        .get(y_offset..y_offset + y_stride as usize * height as usize)
        .ok_or(Error::Caps)?;
    let uv_plane = data
        .get(uv_offset..uv_offset + uv_stride as usize * height.div_ceil(2) as usize)
        .ok_or(Error::Caps)?;

    let image = YuvBiPlanarImage {
        y_plane,
        y_stride,
        uv_plane,
        uv_stride,
        width,
        height,
    };

    let colorimetry = info.colorimetry();
    let range = if colorimetry.range() == gst_video::VideoColorRange::Range0_255 {
        YuvRange::Full
    } else {
        YuvRange::Limited
    };
    let matrix = if colorimetry.matrix() == gst_video::VideoColorMatrix::Bt601 {
        YuvStandardMatrix::Bt601
    } else {
        YuvStandardMatrix::Bt709
    };

    out.pixels.resize(width as usize * height as usize * 4, 0);
    let rgba_stride = width * 4;
    let converted = match format {
        PixelFormat::Rgba => yuv::yuv_nv12_to_rgba(
            &image,
            &mut out.pixels,
            rgba_stride,
            range,
            matrix,
            YuvConversionMode::Balanced,
        ),
        PixelFormat::Bgra => yuv::yuv_nv12_to_bgra(
            &image,
            &mut out.pixels,
            rgba_stride,
            range,
            matrix,
            YuvConversionMode::Balanced,
        ),
    };
    if let Err(err) = converted {
        log::warn!("NV12 conversion failed: {err:?}");
        out.pixels.fill(0);
    }

    out.width = width;
    out.height = height;
    Ok(())
}

/// Tightly packed 4-byte-per-pixel image.
struct Image<'a> {
    pixels: &'a [u8],
    width: u32,
    height: u32,
}

/// Scales `src` with nearest-neighbour sampling into the largest centred
/// rectangle of `dst` with the given display `aspect`. The rest of `dst` is
/// cleared to opaque black.
fn blit_fitted(
    src: Image<'_>,
    dst: &mut [u8],
    dst_width: u32,
    dst_height: u32,
    dst_stride: usize,
    aspect: f64,
    flip_y: bool,
) {
    for row in 0..dst_height as usize {
        for px in dst[row * dst_stride..][..dst_width as usize * 4].chunks_exact_mut(4) {
            px.copy_from_slice(&[0, 0, 0, 255]);
        }
    }

    let expected = src.width as usize * src.height as usize * 4;
    if src.width == 0 || src.height == 0 || src.pixels.len() < expected || dst_width == 0 || dst_height == 0 {
        return;
    }

    let (dw, dh) = (dst_width as f64, dst_height as f64);
    let (fit_w, fit_h) = if dw / dh > aspect {
        ((dh * aspect).round(), dh)
    } else {
        (dw, (dw / aspect).round())
    };
    let fit_w = (fit_w as u32).clamp(1, dst_width);
    let fit_h = (fit_h as u32).clamp(1, dst_height);
    let x0 = (dst_width - fit_w) / 2;
    let y0 = (dst_height - fit_h) / 2;

    for y in 0..fit_h {
        let sy = (y as u64 * src.height as u64 / fit_h as u64) as usize;
        let out_y = if flip_y {
            dst_height - 1 - (y0 + y)
        } else {
            y0 + y
        } as usize;
        let out_row = &mut dst[out_y * dst_stride..];
        for x in 0..fit_w {
            let sx = (x as u64 * src.width as u64 / fit_w as u64) as usize;
            let from = (sy * src.width as usize + sx) * 4;
            let to = (x0 + x) as usize * 4;
            out_row[to..to + 4].copy_from_slice(&src.pixels[from..from + 4]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: [u8; 4] = [255, 0, 0, 255];
    const GREEN: [u8; 4] = [0, 255, 0, 255];
    const BLACK: [u8; 4] = [0, 0, 0, 255];

    fn pixel(buf: &[u8], stride: usize, x: usize, y: usize) -> [u8; 4] {
        let at = y * stride + x * 4;
        [buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]
    }

    #[test]
    fn wide_source_is_letterboxed() {
        let src: Vec<u8> = [RED, GREEN].concat();
        let mut dst = vec![7u8; 4 * 4 * 4];

        blit_fitted(
            Image { pixels: &src, width: 2, height: 1 },
            &mut dst,
            4,
            4,
            16,
            2.0,
            false,
        );

        assert_eq!(pixel(&dst, 16, 0, 0), BLACK);
        assert_eq!(pixel(&dst, 16, 0, 1), RED);
        assert_eq!(pixel(&dst, 16, 3, 2), GREEN);
        assert_eq!(pixel(&dst, 16, 3, 3), BLACK);
    }

    #[test]
    fn flip_reverses_rows() {
        let src: Vec<u8> = [RED, GREEN].concat();
        let mut dst = vec![0u8; 2 * 4 * 4];

        blit_fitted(
            Image { pixels: &src, width: 1, height: 2 },
            &mut dst,
            1,
            2,
            4,
            0.5,
            true,
        );

        assert_eq!(pixel(&dst, 4, 0, 0), GREEN);
        assert_eq!(pixel(&dst, 4, 0, 1), RED);
    }

    #[test]
    fn missing_frame_clears_to_black() {
        let mut dst = vec![9u8; 3 * 2 * 4];

        blit_fitted(
            Image { pixels: &[], width: 0, height: 0 },
            &mut dst,
            3,
            2,
            12,
            1.0,
            false,
        );

        assert!(dst.chunks_exact(4).all(|px| px == BLACK));
    }

    #[test]
    fn stride_padding_is_left_untouched() {
        let src = RED.to_vec();
        let mut dst = vec![5u8; 2 * 8];

        blit_fitted(
            Image { pixels: &src, width: 1, height: 1 },
            &mut dst,
            1,
            2,
            8,
            0.5,
            false,
        );

        assert_eq!(&dst[4..8], &[5, 5, 5, 5]);
        assert_eq!(pixel(&dst, 8, 0, 0), RED);
        assert_eq!(pixel(&dst, 8, 0, 1), RED);
    }

    #[test]
    fn software_context_rejects_framebuffers() {
        let mut context = SoftwareRenderContext::new(
            Arc::new(Mutex::new(FrameSlot::default())),
            Arc::new(Mutex::new(None)),
        );

        let err = context
            .render(RenderTarget::Framebuffer {
                fbo: 1,
                width: 4,
                height: 4,
                flip_y: true,
            })
            .unwrap_err();

        assert!(matches!(err, Error::UnsupportedTarget));
    }

    #[test]
    fn software_context_without_frames_renders_black() {
        let mut context = SoftwareRenderContext::new(
            Arc::new(Mutex::new(FrameSlot::default())),
            Arc::new(Mutex::new(None)),
        );
        let mut pixels = vec![1u8; 2 * 2 * 4];

        context
            .render(RenderTarget::Software {
                pixels: &mut pixels,
                width: 2,
                height: 2,
                stride: 8,
                format: PixelFormat::Bgra,
                flip_y: false,
            })
            .unwrap();

        assert!(pixels.chunks_exact(4).all(|px| px == BLACK));
    }

    #[test]
    fn dropping_the_context_clears_the_update_callback() {
        let update: UpdateSlot = Arc::new(Mutex::new(None));
        let mut context =
            SoftwareRenderContext::new(Arc::new(Mutex::new(FrameSlot::default())), Arc::clone(&update));

        context.set_update_callback(Some(Arc::new(|| {})));
        assert!(update.lock().is_some());
        drop(context);
        assert!(update.lock().is_none());
    }
}
