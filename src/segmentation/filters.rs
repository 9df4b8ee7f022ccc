//! Per-pixel image filters on (H, W) float intensity arrays.
//!
//! All filters return an array of the input's shape. Gradient operators scale
//! 8-bit intensities to [0, 1] first. Gaussian, median, Canny and non-local
//! means run on the image rounded to 8 bits.

use image::{GrayImage, Luma};
use imageproc::edges::canny as canny_edges;
use imageproc::filter::{gaussian_blur_f32, median_filter};
use ndarray::Array2;

const SOBEL: [f32; 3] = [1.0, 2.0, 1.0];
const SCHARR: [f32; 3] = [3.0, 10.0, 3.0];
const PREWITT: [f32; 3] = [1.0, 1.0, 1.0];

/// Half-sample symmetric border: `d c b a | a b c d | d c b a`.
fn reflect(i: isize, n: usize) -> usize {
    let n = n as isize;
    let period = 2 * n;
    let m = i.rem_euclid(period);
    (if m >= n { period - 1 - m } else { m }) as usize
}

/// Mirror border without repeating the edge: `d c b | a b c d | c b a`.
fn reflect101(i: isize, n: usize) -> usize {
    if n == 1 {
        return 0;
    }
    let n = n as isize;
    let period = 2 * n - 2;
    let m = i.rem_euclid(period);
    (if m >= n { period - m } else { m }) as usize
}

/// Correlate with a 3x3 kernel `k[dy + 1][dx + 1]`.
fn correlate3x3(
    image: &Array2<f32>,
    kernel: &[[f32; 3]; 3],
    border: fn(isize, usize) -> usize,
) -> Array2<f32> {
    let (h, w) = image.dim();
    Array2::from_shape_fn((h, w), |(y, x)| {
        let mut acc = 0.0;
        for (ky, row) in kernel.iter().enumerate() {
            let sy = border(y as isize + ky as isize - 1, h);
            for (kx, weight) in row.iter().enumerate() {
                if *weight == 0.0 {
                    continue;
                }
                let sx = border(x as isize + kx as isize - 1, w);
                acc += weight * image[[sy, sx]];
            }
        }
        acc
    })
}

/// Discrete 4-neighbour Laplacian.
pub fn laplacian(image: &Array2<f32>) -> Array2<f32> {
    let kernel = [[0.0, 1.0, 0.0], [1.0, -4.0, 1.0], [0.0, 1.0, 0.0]];
    correlate3x3(image, &kernel, reflect101)
}

fn gradient_magnitude(image: &Array2<f32>, smooth: [f32; 3]) -> Array2<f32> {
    let norm: f32 = smooth.iter().sum();
    let s = smooth.map(|v| v / norm);
    let horizontal = [s, [0.0; 3], [-s[0], -s[1], -s[2]]];
    let vertical = [
        [s[0], 0.0, -s[0]],
        [s[1], 0.0, -s[1]],
        [s[2], 0.0, -s[2]],
    ];

    let scaled = image.mapv(|v| v / 255.0);
    let gy = correlate3x3(&scaled, &horizontal, reflect);
    let gx = correlate3x3(&scaled, &vertical, reflect);

    let mut out = gx;
    out.zip_mut_with(&gy, |a, &b| *a = ((*a * *a + b * b) / 2.0).sqrt());
    out
}

pub fn sobel(image: &Array2<f32>) -> Array2<f32> {
    gradient_magnitude(image, SOBEL)
}

pub fn scharr(image: &Array2<f32>) -> Array2<f32> {
    gradient_magnitude(image, SCHARR)
}

pub fn prewitt(image: &Array2<f32>) -> Array2<f32> {
    gradient_magnitude(image, PREWITT)
}

/// Gaussian blur of the 8-bit image; the result is 8-bit like its input.
pub fn gaussian(image: &Array2<f32>, sigma: f32) -> Array2<f32> {
    from_gray_image(&gaussian_blur_f32(&to_gray_image(image), sigma))
}

/// 3x3 median of the 8-bit image. Borders repeat the edge pixel.
pub fn median3(image: &Array2<f32>) -> Array2<f32> {
    from_gray_image(&median_filter(&to_gray_image(image), 1, 1))
}

pub fn to_gray_image(image: &Array2<f32>) -> GrayImage {
    let (h, w) = image.dim();
    GrayImage::from_fn(w as u32, h as u32, |x, y| {
        Luma([image[[y as usize, x as usize]].round().clamp(0.0, 255.0) as u8])
    })
}

fn from_gray_image(gray: &GrayImage) -> Array2<f32> {
    let (w, h) = gray.dimensions();
    Array2::from_shape_fn((h as usize, w as usize), |(y, x)| {
        gray.get_pixel(x as u32, y as u32)[0] as f32
    })
}

/// Binary (0 / 255) edge map by hysteresis thresholding on the 8-bit image.
pub fn canny(image: &Array2<f32>, low: f32, high: f32) -> Array2<f32> {
    from_gray_image(&canny_edges(&to_gray_image(image), low, high))
}

/// Non-local means denoising on the 8-bit image.
///
/// `h` is the filter strength, `patch` and `search` are window side lengths
/// (odd). Patch distances are box sums over a per-offset integral image, so
/// the cost is `search^2` passes over the image rather than
/// `search^2 * patch^2`.
pub fn non_local_means(image: &Array2<f32>, h: f32, patch: usize, search: usize) -> Array2<f32> {
    let (height, width) = image.dim();
    let pr = (patch / 2) as isize;
    let sr = (search / 2) as isize;
    let pad = pr + sr;

    let quantized = image.mapv(|v| v.round().clamp(0.0, 255.0));
    let padded = Array2::from_shape_fn(
        (height + 2 * pad as usize, width + 2 * pad as usize),
        |(y, x)| {
            quantized[[
                reflect101(y as isize - pad, height),
                reflect101(x as isize - pad, width),
            ]]
        },
    );

    // patch centres span the image; their patches span it plus pr on each side
    let rh = height + 2 * pr as usize;
    let rw = width + 2 * pr as usize;
    let origin = (pad - pr) as usize;
    let patch_area = (patch * patch) as f64;
    let h2 = (h as f64) * (h as f64);

    let mut numerator = Array2::<f64>::zeros((height, width));
    let mut denominator = Array2::<f64>::zeros((height, width));
    let mut integral = Array2::<f64>::zeros((rh + 1, rw + 1));

    for oy in -sr..=sr {
        for ox in -sr..=sr {
            for y in 0..rh {
                let mut row_sum = 0.0;
                for x in 0..rw {
                    let py = origin + y;
                    let px = origin + x;
                    let qy = (py as isize + oy) as usize;
                    let qx = (px as isize + ox) as usize;
                    let d = (padded[[py, px]] - padded[[qy, qx]]) as f64;
                    row_sum += d * d;
                    integral[[y + 1, x + 1]] = integral[[y, x + 1]] + row_sum;
                }
            }

            let side = patch;
            for y in 0..height {
                for x in 0..width {
                    let ssd = integral[[y + side, x + side]] - integral[[y, x + side]]
                        - integral[[y + side, x]]
                        + integral[[y, x]];
                    let weight = (-(ssd / patch_area) / h2).exp();
                    let qy = (y as isize + pad + oy) as usize;
                    let qx = (x as isize + pad + ox) as usize;
                    numerator[[y, x]] += weight * padded[[qy, qx]] as f64;
                    denominator[[y, x]] += weight;
                }
            }
        }
    }

    let mut out = Array2::<f32>::zeros((height, width));
    ndarray::Zip::from(&mut out)
        .and(&numerator)
        .and(&denominator)
        .for_each(|o, &n, &d| *o = (n / d).round() as f32);
    out
}

/// Distance of each pixel centre from the image centre, scaled so the
/// corners sit at 1.
pub fn radial_distance(height: usize, width: usize) -> Array2<f32> {
    Array2::from_shape_fn((height, width), |(y, x)| {
        let xc = 2.0 * ((x as f32 + 0.5) / width as f32 - 0.5);
        let yc = 2.0 * ((y as f32 + 0.5) / height as f32 - 0.5);
        ((xc * xc + yc * yc).sqrt() / std::f32::consts::SQRT_2).clamp(0.0, 1.0)
    })
}
