//! Image preprocessing.
//!
//! The training chain mirrors the usual ImageNet recipe: random resized crop,
//! random affine, color jitter, horizontal flip and gaussian blur, followed by
//! conversion to a normalized `[3, H, W]` array. Every random draw goes through
//! the caller's RNG.

use burn::config::Config;
use image::{
    imageops::{self, FilterType},
    Rgb, RgbImage,
};
use ndarray::Array3;
use rand::{seq::SliceRandom, Rng};

use crate::error::{self, Error};

pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

const CROP_ATTEMPTS: usize = 10;

/// Preprocessing applied to the held-out split.
#[derive(Config, Debug, PartialEq)]
pub enum EvalTransform {
    /// Exact resize, no randomness.
    Deterministic,
    /// Same stochastic chain as training.
    Augmented,
}

#[derive(Config, Debug)]
pub struct AugmentationConfig {
    #[config(default = 224)]
    pub image_size: usize,

    #[config(default = "[0.8, 1.0]")]
    pub crop_scale: [f64; 2],

    #[config(default = "[0.75, 4.0 / 3.0]")]
    pub crop_ratio: [f64; 2],

    /// Maximum rotation in degrees.
    #[config(default = 15.0)]
    pub degrees: f64,

    /// Maximum translation as a fraction of width and height.
    #[config(default = "[0.1, 0.1]")]
    pub translate: [f64; 2],

    /// Maximum horizontal shear in degrees.
    #[config(default = 10.0)]
    pub shear: f64,

    #[config(default = 0.2)]
    pub brightness: f64,

    #[config(default = 0.2)]
    pub contrast: f64,

    #[config(default = 0.2)]
    pub saturation: f64,

    #[config(default = 0.1)]
    pub hue: f64,

    #[config(default = 0.5)]
    pub flip_probability: f64,

    #[config(default = 5)]
    pub blur_kernel_size: usize,

    #[config(default = "[0.1, 2.0]")]
    pub blur_sigma: [f64; 2],

    #[config(default = "IMAGENET_MEAN")]
    pub mean: [f32; 3],

    #[config(default = "IMAGENET_STD")]
    pub std: [f32; 3],
}

impl AugmentationConfig {
    pub fn validate(&self) -> error::Result<()> {
        let fail = |reason: String| Err(Error::Config(reason));

        if self.image_size == 0 {
            return fail("image size must be positive".into());
        }
        if !(0.0 < self.crop_scale[0] && self.crop_scale[0] <= self.crop_scale[1])
            || self.crop_scale[1] > 1.0
        {
            return fail(format!("invalid crop scale {:?}", self.crop_scale));
        }
        if !(0.0 < self.crop_ratio[0] && self.crop_ratio[0] <= self.crop_ratio[1]) {
            return fail(format!("invalid crop ratio {:?}", self.crop_ratio));
        }
        if self.degrees < 0.0 || self.shear < 0.0 {
            return fail("rotation and shear ranges must be non-negative".into());
        }
        if self.translate.iter().any(|t| !(0.0..=1.0).contains(t)) {
            return fail(format!("invalid translation {:?}", self.translate));
        }
        if [self.brightness, self.contrast, self.saturation]
            .iter()
            .any(|f| *f < 0.0)
        {
            return fail("jitter factors must be non-negative".into());
        }
        if !(0.0..=0.5).contains(&self.hue) {
            return fail(format!("hue jitter must be in [0, 0.5], got {}", self.hue));
        }
        if !(0.0..=1.0).contains(&self.flip_probability) {
            return fail(format!(
                "flip probability must be in [0, 1], got {}",
                self.flip_probability
            ));
        }
        if self.blur_kernel_size == 0 || self.blur_kernel_size % 2 == 0 {
            return fail(format!(
                "blur kernel size must be odd, got {}",
                self.blur_kernel_size
            ));
        }
        if !(0.0 < self.blur_sigma[0] && self.blur_sigma[0] <= self.blur_sigma[1]) {
            return fail(format!("invalid blur sigma {:?}", self.blur_sigma));
        }
        if self.std.iter().any(|s| *s <= 0.0) {
            return fail(format!("normalization std must be positive, got {:?}", self.std));
        }

        Ok(())
    }

    /// The stochastic chain used on training samples.
    pub fn init_training(&self) -> Pipeline {
        let size = self.image_size as u32;

        self.pipeline(vec![
            Augmentation::RandomResizedCrop(RandomResizedCrop {
                size,
                scale: self.crop_scale,
                ratio: self.crop_ratio,
            }),
            Augmentation::RandomAffine(RandomAffine {
                degrees: self.degrees,
                translate: self.translate,
                shear: self.shear,
            }),
            Augmentation::ColorJitter(ColorJitter {
                brightness: self.brightness as f32,
                contrast: self.contrast as f32,
                saturation: self.saturation as f32,
                hue: self.hue as f32,
            }),
            Augmentation::HorizontalFlip(HorizontalFlip {
                probability: self.flip_probability,
            }),
            Augmentation::GaussianBlur(GaussianBlur {
                kernel_size: self.blur_kernel_size,
                sigma: self.blur_sigma,
            }),
        ])
    }

    pub fn init_evaluation(&self, transform: &EvalTransform) -> Pipeline {
        match transform {
            EvalTransform::Deterministic => self.pipeline(vec![Augmentation::Resize(Resize {
                size: self.image_size as u32,
            })]),
            EvalTransform::Augmented => self.init_training(),
        }
    }

    fn pipeline(&self, steps: Vec<Augmentation>) -> Pipeline {
        Pipeline {
            steps,
            mean: self.mean,
            std: self.std,
        }
    }
}

/// Ordered image transforms followed by tensor conversion and normalization.
#[derive(Debug, Clone)]
pub struct Pipeline {
    steps: Vec<Augmentation>,
    mean: [f32; 3],
    std: [f32; 3],
}

impl Pipeline {
    pub fn apply<R: Rng + ?Sized>(&self, image: RgbImage, rng: &mut R) -> Array3<f32> {
        let image = self
            .steps
            .iter()
            .fold(image, |image, step| step.apply(image, rng));

        self.to_tensor(&image)
    }

    pub fn is_stochastic(&self) -> bool {
        self.steps
            .iter()
            .any(|step| !matches!(step, Augmentation::Resize(_)))
    }

    /// Channel-first layout, scaled to [0, 1] then standardized per channel.
    fn to_tensor(&self, image: &RgbImage) -> Array3<f32> {
        let (width, height) = image.dimensions();

        Array3::from_shape_fn(
            (3, height as usize, width as usize),
            |(channel, y, x)| {
                let value = image.get_pixel(x as u32, y as u32)[channel] as f32 / 255.;
                (value - self.mean[channel]) / self.std[channel]
            },
        )
    }
}

#[derive(Debug, Clone)]
pub enum Augmentation {
    RandomResizedCrop(RandomResizedCrop),
    RandomAffine(RandomAffine),
    ColorJitter(ColorJitter),
    HorizontalFlip(HorizontalFlip),
    GaussianBlur(GaussianBlur),
    Resize(Resize),
}

impl Augmentation {
    fn apply<R: Rng + ?Sized>(&self, image: RgbImage, rng: &mut R) -> RgbImage {
        match self {
            Augmentation::RandomResizedCrop(crop) => crop.apply(image, rng),
            Augmentation::RandomAffine(affine) => affine.apply(image, rng),
            Augmentation::ColorJitter(jitter) => jitter.apply(image, rng),
            Augmentation::HorizontalFlip(flip) => flip.apply(image, rng),
            Augmentation::GaussianBlur(blur) => blur.apply(image, rng),
            Augmentation::Resize(resize) => resize.apply(image),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RandomResizedCrop {
    pub size: u32,
    pub scale: [f64; 2],
    pub ratio: [f64; 2],
}

impl RandomResizedCrop {
    fn apply<R: Rng + ?Sized>(&self, image: RgbImage, rng: &mut R) -> RgbImage {
        let (x, y, width, height) = self.window(image.width(), image.height(), rng);
        let crop = imageops::crop_imm(&image, x, y, width, height).to_image();

        imageops::resize(&crop, self.size, self.size, FilterType::Triangle)
    }

    /// Picks `(x, y, width, height)` covering a random share of the area with a
    /// random aspect ratio, falling back to a centre crop.
    fn window<R: Rng + ?Sized>(&self, width: u32, height: u32, rng: &mut R) -> (u32, u32, u32, u32) {
        let area = width as f64 * height as f64;
        let log_ratio = [self.ratio[0].ln(), self.ratio[1].ln()];

        for _ in 0..CROP_ATTEMPTS {
            let target_area = area * rng.gen_range(self.scale[0]..=self.scale[1]);
            let aspect = rng.gen_range(log_ratio[0]..=log_ratio[1]).exp();

            let w = (target_area * aspect).sqrt().round() as u32;
            let h = (target_area / aspect).sqrt().round() as u32;
            if 0 < w && w <= width && 0 < h && h <= height {
                let x = rng.gen_range(0..=width - w);
                let y = rng.gen_range(0..=height - h);
                return (x, y, w, h);
            }
        }

        let aspect = width as f64 / height as f64;
        let (w, h) = if aspect < self.ratio[0] {
            (width, ((width as f64 / self.ratio[0]).round() as u32).clamp(1, height))
        } else if aspect > self.ratio[1] {
            (((height as f64 * self.ratio[1]).round() as u32).clamp(1, width), height)
        } else {
            (width, height)
        };

        ((width - w) / 2, (height - h) / 2, w, h)
    }
}

#[derive(Debug, Clone)]
pub struct RandomAffine {
    pub degrees: f64,
    pub translate: [f64; 2],
    pub shear: f64,
}

impl RandomAffine {
    fn apply<R: Rng + ?Sized>(&self, image: RgbImage, rng: &mut R) -> RgbImage {
        let (width, height) = image.dimensions();

        let angle = rng.gen_range(-self.degrees..=self.degrees).to_radians();
        let max_dx = self.translate[0] * width as f64;
        let max_dy = self.translate[1] * height as f64;
        let dx = rng.gen_range(-max_dx..=max_dx).round();
        let dy = rng.gen_range(-max_dy..=max_dy).round();
        let shear = rng.gen_range(-self.shear..=self.shear).to_radians();

        warp_affine(&image, angle, shear, [dx, dy])
    }
}

/// Rotation composed with an x-shear about the image centre, then a
/// translation. Sampled by inverse mapping with nearest neighbour, black fill.
fn warp_affine(image: &RgbImage, angle: f64, shear: f64, offset: [f64; 2]) -> RgbImage {
    let (width, height) = image.dimensions();
    let cx = (width as f64 - 1.) / 2.;
    let cy = (height as f64 - 1.) / 2.;

    let (sin, cos) = angle.sin_cos();
    let tan = shear.tan();
    // [[a, b], [c, d]] = rotation * [[1, -tan], [0, 1]]
    let (a, b, c, d) = (cos, -cos * tan - sin, sin, -sin * tan + cos);
    let det = a * d - b * c;
    let (ia, ib, ic, id) = (d / det, -b / det, -c / det, a / det);

    RgbImage::from_fn(width, height, |x, y| {
        let u = x as f64 - cx - offset[0];
        let v = y as f64 - cy - offset[1];
        let sx = (ia * u + ib * v + cx).round();
        let sy = (ic * u + id * v + cy).round();

        if sx >= 0. && sy >= 0. && sx < width as f64 && sy < height as f64 {
            *image.get_pixel(sx as u32, sy as u32)
        } else {
            Rgb([0, 0, 0])
        }
    })
}

#[derive(Debug, Clone, Copy)]
enum Jitter {
    Brightness,
    Contrast,
    Saturation,
    Hue,
}

#[derive(Debug, Clone)]
pub struct ColorJitter {
    pub brightness: f32,
    pub contrast: f32,
    pub saturation: f32,
    pub hue: f32,
}

impl ColorJitter {
    fn apply<R: Rng + ?Sized>(&self, mut image: RgbImage, rng: &mut R) -> RgbImage {
        let mut order = [
            Jitter::Brightness,
            Jitter::Contrast,
            Jitter::Saturation,
            Jitter::Hue,
        ];
        order.shuffle(rng);

        for jitter in order {
            match jitter {
                Jitter::Brightness if self.brightness > 0. => {
                    adjust_brightness(&mut image, factor(self.brightness, rng))
                }
                Jitter::Contrast if self.contrast > 0. => {
                    adjust_contrast(&mut image, factor(self.contrast, rng))
                }
                Jitter::Saturation if self.saturation > 0. => {
                    adjust_saturation(&mut image, factor(self.saturation, rng))
                }
                Jitter::Hue if self.hue > 0. => {
                    adjust_hue(&mut image, rng.gen_range(-self.hue..=self.hue))
                }
                _ => {}
            }
        }

        image
    }
}

fn factor<R: Rng + ?Sized>(strength: f32, rng: &mut R) -> f32 {
    rng.gen_range((1. - strength).max(0.)..=1. + strength)
}

fn luma(pixel: &Rgb<u8>) -> f32 {
    0.299 * pixel[0] as f32 + 0.587 * pixel[1] as f32 + 0.114 * pixel[2] as f32
}

fn blend(value: u8, base: f32, factor: f32) -> u8 {
    (base + factor * (value as f32 - base)).round().clamp(0., 255.) as u8
}

fn adjust_brightness(image: &mut RgbImage, factor: f32) {
    for pixel in image.pixels_mut() {
        pixel.0 = pixel.0.map(|value| blend(value, 0., factor));
    }
}

fn adjust_contrast(image: &mut RgbImage, factor: f32) {
    let count = (image.width() * image.height()).max(1) as f32;
    let mean = image.pixels().map(luma).sum::<f32>() / count;

    for pixel in image.pixels_mut() {
        pixel.0 = pixel.0.map(|value| blend(value, mean, factor));
    }
}

fn adjust_saturation(image: &mut RgbImage, factor: f32) {
    for pixel in image.pixels_mut() {
        let gray = luma(pixel);
        pixel.0 = pixel.0.map(|value| blend(value, gray, factor));
    }
}

/// Rotates hue by `shift` turns.
fn adjust_hue(image: &mut RgbImage, shift: f32) {
    for pixel in image.pixels_mut() {
        let [h, s, v] = rgb_to_hsv(pixel.0);
        pixel.0 = hsv_to_rgb([(h + shift).rem_euclid(1.), s, v]);
    }
}

/// Hue, saturation and value in [0, 1].
fn rgb_to_hsv(rgb: [u8; 3]) -> [f32; 3] {
    let [r, g, b] = rgb.map(|c| c as f32 / 255.);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let hue = if delta == 0. {
        0.
    } else if max == r {
        ((g - b) / delta).rem_euclid(6.)
    } else if max == g {
        (b - r) / delta + 2.
    } else {
        (r - g) / delta + 4.
    };
    let saturation = if max == 0. { 0. } else { delta / max };

    [hue / 6., saturation, max]
}

fn hsv_to_rgb([h, s, v]: [f32; 3]) -> [u8; 3] {
    let sector = h * 6.;
    let chroma = v * s;
    let x = chroma * (1. - (sector.rem_euclid(2.) - 1.).abs());
    let m = v - chroma;

    let (r, g, b) = match sector as u32 {
        0 => (chroma, x, 0.),
        1 => (x, chroma, 0.),
        2 => (0., chroma, x),
        3 => (0., x, chroma),
        4 => (x, 0., chroma),
        _ => (chroma, 0., x),
    };

    [r, g, b].map(|c| ((c + m) * 255.).round().clamp(0., 255.) as u8)
}

#[derive(Debug, Clone)]
pub struct HorizontalFlip {
    pub probability: f64,
}

impl HorizontalFlip {
    fn apply<R: Rng + ?Sized>(&self, image: RgbImage, rng: &mut R) -> RgbImage {
        if rng.gen_bool(self.probability) {
            imageops::flip_horizontal(&image)
        } else {
            image
        }
    }
}

#[derive(Debug, Clone)]
pub struct GaussianBlur {
    pub kernel_size: usize,
    pub sigma: [f64; 2],
}

impl GaussianBlur {
    fn apply<R: Rng + ?Sized>(&self, image: RgbImage, rng: &mut R) -> RgbImage {
        let sigma = rng.gen_range(self.sigma[0]..=self.sigma[1]);
        let kernel = gaussian_kernel(self.kernel_size, sigma);

        let image = convolve(&image, &kernel, Axis::Horizontal);
        convolve(&image, &kernel, Axis::Vertical)
    }
}

fn gaussian_kernel(size: usize, sigma: f64) -> Vec<f32> {
    let half = (size as f64 - 1.) / 2.;
    let weights: Vec<f64> = (0..size)
        .map(|i| {
            let x = i as f64 - half;
            (-(x * x) / (2. * sigma * sigma)).exp()
        })
        .collect();
    let total: f64 = weights.iter().sum();

    weights.into_iter().map(|w| (w / total) as f32).collect()
}

#[derive(Debug, Clone, Copy)]
enum Axis {
    Horizontal,
    Vertical,
}

fn convolve(image: &RgbImage, kernel: &[f32], axis: Axis) -> RgbImage {
    let (width, height) = image.dimensions();
    let radius = (kernel.len() / 2) as i64;

    RgbImage::from_fn(width, height, |x, y| {
        let mut sum = [0f32; 3];
        for (k, weight) in kernel.iter().enumerate() {
            let offset = k as i64 - radius;
            let (sx, sy) = match axis {
                Axis::Horizontal => (reflect(x as i64 + offset, width), y),
                Axis::Vertical => (x, reflect(y as i64 + offset, height)),
            };
            let pixel = image.get_pixel(sx, sy);
            for (channel, acc) in sum.iter_mut().enumerate() {
                *acc += weight * pixel[channel] as f32;
            }
        }

        Rgb(sum.map(|v| v.round().clamp(0., 255.) as u8))
    })
}

/// Mirror index into `0..len` without repeating the edge pixel.
fn reflect(index: i64, len: u32) -> u32 {
    let len = len as i64;
    if len == 1 {
        return 0;
    }

    let period = 2 * (len - 1);
    let index = index.rem_euclid(period);
    (if index >= len { period - index } else { index }) as u32
}

#[derive(Debug, Clone)]
pub struct Resize {
    pub size: u32,
}

impl Resize {
    fn apply(&self, image: RgbImage) -> RgbImage {
        imageops::resize(&image, self.size, self.size, FilterType::Triangle)
    }
}
