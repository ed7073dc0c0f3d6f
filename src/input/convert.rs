//! YUV420P ↔ RGB 转换 (BT.601 全范围, 定点运算)

/// YUV420P 平面布局
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlaneLayout {
    pub width: usize,
    pub height: usize,
    pub y_stride: usize,
    pub uv_stride: usize,
}

impl PlaneLayout {
    pub fn chroma_width(&self) -> usize {
        (self.width + 1) / 2
    }

    pub fn chroma_height(&self) -> usize {
        (self.height + 1) / 2
    }

    /// 各平面所需的最小字节数 (y, uv)
    pub fn plane_sizes(&self) -> (usize, usize) {
        (
            self.y_stride * self.height,
            self.uv_stride * self.chroma_height(),
        )
    }

    pub fn is_valid(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.y_stride >= self.width
            && self.uv_stride >= self.chroma_width()
    }
}

/// YUV420P → RGB24 (rgb 长度为 width * height * 3)
pub fn yuv420p_to_rgb(layout: &PlaneLayout, y: &[u8], u: &[u8], v: &[u8], rgb: &mut [u8]) {
    let mut out_idx = 0;
    for row in 0..layout.height {
        let y_row = row * layout.y_stride;
        let uv_row = (row >> 1) * layout.uv_stride;

        for x in 0..layout.width {
            let y_val = y[y_row + x] as i32;
            let u_val = u[uv_row + (x >> 1)] as i32 - 128;
            let v_val = v[uv_row + (x >> 1)] as i32 - 128;

            rgb[out_idx] = (y_val + ((v_val * 179) >> 7)).clamp(0, 255) as u8;
            rgb[out_idx + 1] = (y_val - ((u_val * 44) >> 7) - ((v_val * 91) >> 7)).clamp(0, 255) as u8;
            rgb[out_idx + 2] = (y_val + ((u_val * 227) >> 7)).clamp(0, 255) as u8;
            out_idx += 3;
        }
    }
}

/// RGB24 → YUV420P, 色度取 2x2 块平均
pub fn rgb_to_yuv420p(layout: &PlaneLayout, rgb: &[u8], y: &mut [u8], u: &mut [u8], v: &mut [u8]) {
    let width = layout.width;
    for row in 0..layout.height {
        let y_row = row * layout.y_stride;
        for x in 0..width {
            let p = (row * width + x) * 3;
            let (r, g, b) = (rgb[p] as i32, rgb[p + 1] as i32, rgb[p + 2] as i32);
            y[y_row + x] = ((77 * r + 150 * g + 29 * b + 128) >> 8).clamp(0, 255) as u8;
        }
    }

    for cy in 0..layout.chroma_height() {
        let uv_row = cy * layout.uv_stride;
        for cx in 0..layout.chroma_width() {
            let (mut r, mut g, mut b, mut n) = (0i32, 0i32, 0i32, 0i32);
            for row in (cy * 2)..(cy * 2 + 2).min(layout.height) {
                for x in (cx * 2)..(cx * 2 + 2).min(width) {
                    let p = (row * width + x) * 3;
                    r += rgb[p] as i32;
                    g += rgb[p + 1] as i32;
                    b += rgb[p + 2] as i32;
                    n += 1;
                }
            }
            let (r, g, b) = (r / n, g / n, b / n);
            u[uv_row + cx] = (((-43 * r - 85 * g + 128 * b + 128) >> 8) + 128).clamp(0, 255) as u8;
            v[uv_row + cx] = (((128 * r - 107 * g - 21 * b + 128) >> 8) + 128).clamp(0, 255) as u8;
        }
    }
}
