// Drawing primitives over a softbuffer framebuffer (u32 per pixel, 0x00RRGGBB).

use crate::codec::{Frame, Rect};

/// Pack RGB into softbuffer u32 format: 0x00RRGGBB.
pub const fn rgb(r: u8, g: u8, b: u8) -> u32 {
    (r as u32) << 16 | (g as u32) << 8 | b as u32
}

pub const BG_COLOR: u32 = rgb(0, 0, 0);
pub const ERROR_BG: u32 = rgb(64, 0, 0);
pub const ERROR_MARK: u32 = rgb(255, 80, 80);

/// Rows actually present in `buf`, never more than `buf_h`.
fn rows(buf: &[u32], stride: u32, buf_h: u32) -> u32 {
    if stride == 0 {
        return 0;
    }
    buf_h.min((buf.len() / stride as usize) as u32)
}

/// Fill a rectangle, clipped to the buffer.
pub fn fill_rect(buf: &mut [u32], stride: u32, buf_h: u32, rect: Rect, color: u32) {
    let buf_h = rows(buf, stride, buf_h);
    let x_end = rect.right().min(stride);
    let y_end = rect.bottom().min(buf_h);
    for y in rect.y.min(y_end)..y_end {
        let row = (y * stride) as usize;
        buf[row + rect.x.min(x_end) as usize..row + x_end as usize].fill(color);
    }
}

/// Copy a decoded frame to its placement and clear the margins around it.
/// Parts outside the buffer (frame sized for a larger box) are clipped.
pub fn draw_frame(buf: &mut [u32], stride: u32, buf_h: u32, frame: &Frame) {
    let buf_h = rows(buf, stride, buf_h);
    let p = frame.placement;
    let x_end = p.right().min(stride);
    let y_end = p.bottom().min(buf_h);
    if p.x < x_end {
        let cols = (x_end - p.x) as usize;
        for y in p.y..y_end {
            let src = ((y - p.y) * p.width) as usize;
            let dst = (y * stride + p.x) as usize;
            buf[dst..dst + cols].copy_from_slice(&frame.pixels[src..src + cols]);
        }
    }
    for &cl in &frame.cleared {
        fill_rect(buf, stride, buf_h, cl, BG_COLOR);
    }
}

/// Shown instead of pixels for a picture that failed to load.
pub fn draw_error(buf: &mut [u32], stride: u32, buf_h: u32) {
    buf.fill(ERROR_BG);
    let buf_h = rows(buf, stride, buf_h);
    let side = stride.min(buf_h) / 4;
    if side == 0 {
        return;
    }
    let x0 = (stride - side) / 2;
    let y0 = (buf_h - side) / 2;
    // Two diagonals, three pixels thick.
    for i in 0..side {
        let row = ((y0 + i) * stride) as usize;
        for d in (i..i + 3).filter(|&d| d < side) {
            buf[row + (x0 + d) as usize] = ERROR_MARK;
            buf[row + (x0 + side - 1 - d) as usize] = ERROR_MARK;
        }
    }
}
