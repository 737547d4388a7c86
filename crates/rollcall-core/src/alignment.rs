//! Face alignment via a 4-DOF similarity transform.
//!
//! Maps detected landmarks onto the five InsightFace reference points and
//! resamples the face into a canonical 112×112 RGB crop. Jittered crops
//! (mirror, 1px shifts) are produced from the same transform.

use image::{Rgb, RgbImage};

/// ArcFace reference landmarks for a 112×112 output.
pub const REFERENCE_LANDMARKS_112: [(f32, f32); 5] = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth
    (70.7299, 92.2041), // right mouth
];

pub const ALIGNED_SIZE: u32 = 112;

/// Perturbation applied to the canonical crop before embedding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Jitter {
    pub mirror: bool,
    pub dx: f32,
    pub dy: f32,
}

impl Jitter {
    pub const NONE: Jitter = Jitter { mirror: false, dx: 0.0, dy: 0.0 };
}

/// Deterministic jitter schedule: the plain crop, its mirror, then shifts
/// of growing radius cycling right, left, down, up.
///
/// A count of zero is treated as one.
pub fn jitter_schedule(count: u32) -> Vec<Jitter> {
    let count = count.max(1) as usize;
    let mut schedule = Vec::with_capacity(count);
    schedule.push(Jitter::NONE);
    if count > 1 {
        schedule.push(Jitter { mirror: true, ..Jitter::NONE });
    }
    for k in 0..count.saturating_sub(2) {
        let radius = (k / 4 + 1) as f32;
        let (dx, dy) = match k % 4 {
            0 => (radius, 0.0),
            1 => (-radius, 0.0),
            2 => (0.0, radius),
            _ => (0.0, -radius),
        };
        schedule.push(Jitter { mirror: false, dx, dy });
    }
    schedule
}

/// 2D similarity transform: `u = a·x − b·y + tx`, `v = b·x + a·y + ty`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Similarity {
    pub a: f32,
    pub b: f32,
    pub tx: f32,
    pub ty: f32,
}

impl Similarity {
    /// Least-squares similarity taking `from` points onto `to` points.
    ///
    /// Closed form: with both point sets centered, the complex scale-rotation
    /// is `Σ conj(from)·to / Σ |from|²`.
    pub fn estimate(from: &[(f32, f32); 5], to: &[(f32, f32); 5]) -> Self {
        let (fcx, fcy) = centroid(from);
        let (tcx, tcy) = centroid(to);

        let mut num_a = 0.0f32;
        let mut num_b = 0.0f32;
        let mut denom = 0.0f32;
        for (&(fx, fy), &(tx, ty)) in from.iter().zip(to.iter()) {
            let (x, y) = (fx - fcx, fy - fcy);
            let (u, v) = (tx - tcx, ty - tcy);
            num_a += x * u + y * v;
            num_b += x * v - y * u;
            denom += x * x + y * y;
        }

        // Degenerate landmarks (all coincident): translate only.
        let (a, b) = if denom > f32::EPSILON { (num_a / denom, num_b / denom) } else { (1.0, 0.0) };

        Self {
            a,
            b,
            tx: tcx - (a * fcx - b * fcy),
            ty: tcy - (b * fcx + a * fcy),
        }
    }

    pub fn apply(&self, (x, y): (f32, f32)) -> (f32, f32) {
        (self.a * x - self.b * y + self.tx, self.b * x + self.a * y + self.ty)
    }
}

fn centroid(points: &[(f32, f32); 5]) -> (f32, f32) {
    let n = points.len() as f32;
    let (sx, sy) = points.iter().fold((0.0, 0.0), |(sx, sy), &(x, y)| (sx + x, sy + y));
    (sx / n, sy / n)
}

/// Bilinear RGB sample; out-of-bounds neighbours contribute black.
fn sample_bilinear(image: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let (x0, y0) = (x0 as i64, y0 as i64);

    let fetch = |px: i64, py: i64| -> [f32; 3] {
        if px >= 0 && py >= 0 && (px as u64) < image.width() as u64 && (py as u64) < image.height() as u64 {
            let Rgb(c) = *image.get_pixel(px as u32, py as u32);
            [c[0] as f32, c[1] as f32, c[2] as f32]
        } else {
            [0.0; 3]
        }
    };

    let tl = fetch(x0, y0);
    let tr = fetch(x0 + 1, y0);
    let bl = fetch(x0, y0 + 1);
    let br = fetch(x0 + 1, y0 + 1);

    let mut out = [0u8; 3];
    for c in 0..3 {
        let top = tl[c] * (1.0 - fx) + tr[c] * fx;
        let bottom = bl[c] * (1.0 - fx) + br[c] * fx;
        out[c] = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    Rgb(out)
}

/// Align a detected face to a canonical 112×112 RGB crop.
///
/// The transform is estimated from the reference positions to the detected
/// landmarks, so each output pixel maps directly to a source location.
pub fn align_face(image: &RgbImage, landmarks: &[(f32, f32); 5], jitter: Jitter) -> RgbImage {
    let to_source = Similarity::estimate(&REFERENCE_LANDMARKS_112, landmarks);
    let last = (ALIGNED_SIZE - 1) as f32;

    RgbImage::from_fn(ALIGNED_SIZE, ALIGNED_SIZE, |ox, oy| {
        let cx = if jitter.mirror { last - ox as f32 } else { ox as f32 };
        let (sx, sy) = to_source.apply((cx + jitter.dx, oy as f32 + jitter.dy));
        sample_bilinear(image, sx, sy)
    })
}
