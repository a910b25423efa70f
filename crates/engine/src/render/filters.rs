use super::image::{Color, Image};
use super::viewport::ViewportRect;

const GAUSSIAN_WEIGHTS: [f32; 5] = [1.0 / 16.0, 4.0 / 16.0, 6.0 / 16.0, 4.0 / 16.0, 1.0 / 16.0];
const BOX_TAPS: u32 = 4;
/// Distortion offsets are stored in [-1, 1] and scaled to this many destination pixels.
const MAX_DISTORT_PIXELS: f32 = 8.0;
/// Effects red channel range over which the composite blends toward the blurred image.
const DOF_NEAR: f32 = 0.35;
const DOF_FAR: f32 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlurAxis {
    Horizontal,
    Vertical,
}

/// Resamples `src` over the whole of `dst`.
pub fn stretch_copy(src: &Image, dst: &mut Image) {
    let (width, height) = dst.size();
    stretch_into(src, dst, ViewportRect::full(width, height));
}

/// Resamples `src` into the `rect` region of `dst`, leaving the rest untouched.
pub fn stretch_into(src: &Image, dst: &mut Image, rect: ViewportRect) {
    if rect.width == 0 || rect.height == 0 {
        return;
    }
    for row in 0..rect.height {
        let v = (row as f32 + 0.5) / rect.height as f32;
        for col in 0..rect.width {
            let u = (col as f32 + 0.5) / rect.width as f32;
            dst.set(rect.x + col, rect.y + row, src.sample(u, v));
        }
    }
}

/// Averages a 4x4 block of `src` per `dst` texel. Intended for quarter-size targets.
pub fn box_downsample(src: &Image, dst: &mut Image) {
    let (width, height) = dst.size();
    if width == 0 || height == 0 || src.width() == 0 || src.height() == 0 {
        return;
    }
    let step_x = src.width() as f32 / width as f32;
    let step_y = src.height() as f32 / height as f32;
    for y in 0..height {
        let base_y = (y as f32 * step_y) as i64;
        for x in 0..width {
            let base_x = (x as f32 * step_x) as i64;
            let mut sum = [0.0f32; 4];
            for dy in 0..BOX_TAPS as i64 {
                for dx in 0..BOX_TAPS as i64 {
                    let texel = src.get_clamped(base_x + dx, base_y + dy);
                    accumulate(&mut sum, texel, 1.0);
                }
            }
            let taps = (BOX_TAPS * BOX_TAPS) as f32;
            dst.set(x, y, scale(sum, 1.0 / taps));
        }
    }
}

/// One direction of the separable 5-tap Gaussian. `dst` takes the size of `src`.
pub fn gaussian_blur(src: &Image, dst: &mut Image, axis: BlurAxis) {
    let (width, height) = dst.size();
    for y in 0..height {
        for x in 0..width {
            let mut sum = [0.0f32; 4];
            for (tap, weight) in GAUSSIAN_WEIGHTS.iter().enumerate() {
                let offset = tap as i64 - 2;
                let texel = match axis {
                    BlurAxis::Horizontal => src.get_clamped(x as i64 + offset, y as i64),
                    BlurAxis::Vertical => src.get_clamped(x as i64, y as i64 + offset),
                };
                accumulate(&mut sum, texel, *weight);
            }
            dst.set(x, y, sum);
        }
    }
}

/// Bright pass: raises each color channel to `power`, so only near-saturated texels
/// survive into the bloom chain.
pub fn threshold(src: &Image, dst: &mut Image, power: f32) {
    let (width, height) = dst.size();
    for y in 0..height {
        let v = (y as f32 + 0.5) / height as f32;
        for x in 0..width {
            let u = (x as f32 + 0.5) / width as f32;
            let texel = src.sample(u, v);
            dst.set(
                x,
                y,
                [
                    texel[0].max(0.0).powf(power),
                    texel[1].max(0.0).powf(power),
                    texel[2].max(0.0).powf(power),
                    texel[3],
                ],
            );
        }
    }
}

/// Inputs of the final depth-of-field composite.
#[derive(Debug, Clone, Copy)]
pub struct CompositeInputs<'a> {
    pub color: &'a Image,
    pub blurred: &'a Image,
    pub bloom: Option<&'a Image>,
    pub glow: Option<&'a Image>,
    pub effects: Option<&'a Image>,
    pub distort: [Option<&'a Image>; 2],
}

/// Warps the color image by the distortion offsets, blends toward the blurred image
/// by effects depth, then adds bloom and glow.
pub fn dof_composite(inputs: CompositeInputs<'_>, dst: &mut Image) {
    let (width, height) = dst.size();
    if width == 0 || height == 0 {
        return;
    }
    for y in 0..height {
        let v = (y as f32 + 0.5) / height as f32;
        for x in 0..width {
            let u = (x as f32 + 0.5) / width as f32;

            let mut offset = (0.0f32, 0.0f32);
            for distort in inputs.distort.iter().flatten() {
                let texel = distort.sample(u, v);
                offset.0 += texel[0] * MAX_DISTORT_PIXELS / width as f32;
                offset.1 += texel[1] * MAX_DISTORT_PIXELS / height as f32;
            }
            let warped_u = u + offset.0;
            let warped_v = v + offset.1;

            let sharp = inputs.color.sample(warped_u, warped_v);
            let blur_amount = inputs
                .effects
                .map(|effects| {
                    let depth = effects.sample(warped_u, warped_v)[0];
                    ((depth - DOF_NEAR) / (DOF_FAR - DOF_NEAR)).clamp(0.0, 1.0)
                })
                .unwrap_or(0.0);
            let soft = inputs.blurred.sample(warped_u, warped_v);
            let mut out = [
                sharp[0] + (soft[0] - sharp[0]) * blur_amount,
                sharp[1] + (soft[1] - sharp[1]) * blur_amount,
                sharp[2] + (soft[2] - sharp[2]) * blur_amount,
                1.0,
            ];
            for additive in [inputs.bloom, inputs.glow].into_iter().flatten() {
                let texel = additive.sample(u, v);
                out[0] += texel[0];
                out[1] += texel[1];
                out[2] += texel[2];
            }
            dst.set(x, y, out);
        }
    }
}

fn accumulate(sum: &mut Color, texel: Color, weight: f32) {
    for (total, channel) in sum.iter_mut().zip(texel) {
        *total += channel * weight;
    }
}

fn scale(color: Color, factor: f32) -> Color {
    [
        color[0] * factor,
        color[1] * factor,
        color[2] * factor,
        color[3] * factor,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::image::BLACK;

    #[test]
    fn stretch_into_fills_only_the_rectangle() {
        let src = Image::filled(2, 2, [1.0, 1.0, 1.0, 1.0]);
        let mut dst = Image::filled(6, 6, BLACK);
        stretch_into(&src, &mut dst, ViewportRect::cropped(6, 6, 1));
        assert_eq!(dst.get(0, 0), BLACK);
        assert_eq!(dst.get(1, 1), [1.0, 1.0, 1.0, 1.0]);
        assert_eq!(dst.get(4, 4), [1.0, 1.0, 1.0, 1.0]);
        assert_eq!(dst.get(5, 5), BLACK);
    }

    #[test]
    fn box_downsample_averages_blocks() {
        let mut src = Image::filled(8, 4, BLACK);
        for y in 0..4 {
            for x in 0..4 {
                src.set(x, y, [1.0, 1.0, 1.0, 1.0]);
            }
        }
        let mut dst = Image::new(2, 1);
        box_downsample(&src, &mut dst);
        assert!((dst.get(0, 0)[0] - 1.0).abs() < 0.0001);
        assert!(dst.get(1, 0)[0].abs() < 0.0001);
    }

    #[test]
    fn gaussian_preserves_flat_fields_and_spreads_impulses() {
        let flat = Image::filled(6, 6, [0.5, 0.5, 0.5, 1.0]);
        let mut blurred = Image::new(6, 6);
        gaussian_blur(&flat, &mut blurred, BlurAxis::Vertical);
        assert!((blurred.get(3, 3)[0] - 0.5).abs() < 0.0001);

        let mut impulse = Image::filled(5, 1, BLACK);
        impulse.set(2, 0, [1.0, 1.0, 1.0, 1.0]);
        let mut spread = Image::new(5, 1);
        gaussian_blur(&impulse, &mut spread, BlurAxis::Horizontal);
        assert!((spread.get(2, 0)[0] - 6.0 / 16.0).abs() < 0.0001);
        assert!((spread.get(0, 0)[0] - 1.0 / 16.0).abs() < 0.0001);
    }

    #[test]
    fn threshold_crushes_midtones() {
        let src = Image::filled(1, 1, [1.0, 0.5, 0.0, 1.0]);
        let mut dst = Image::new(1, 1);
        threshold(&src, &mut dst, 5.0);
        let texel = dst.get(0, 0);
        assert!((texel[0] - 1.0).abs() < 0.0001);
        assert!((texel[1] - 0.03125).abs() < 0.0001);
    }

    #[test]
    fn composite_without_effects_is_a_straight_copy_plus_bloom() {
        let color = Image::filled(4, 4, [0.25, 0.25, 0.25, 1.0]);
        let blurred = Image::filled(1, 1, [1.0, 0.0, 0.0, 1.0]);
        let bloom = Image::filled(1, 1, [0.5, 0.0, 0.0, 1.0]);
        let mut dst = Image::new(4, 4);
        dof_composite(
            CompositeInputs {
                color: &color,
                blurred: &blurred,
                bloom: Some(&bloom),
                glow: None,
                effects: None,
                distort: [None, None],
            },
            &mut dst,
        );
        let texel = dst.get(2, 2);
        assert!((texel[0] - 0.75).abs() < 0.0001);
        assert!((texel[1] - 0.25).abs() < 0.0001);
    }

    #[test]
    fn far_effects_depth_selects_blurred_image() {
        let color = Image::filled(2, 2, BLACK);
        let blurred = Image::filled(1, 1, [1.0, 1.0, 1.0, 1.0]);
        let effects = Image::filled(2, 2, [1.0, 0.0, 0.0, 0.0]);
        let mut dst = Image::new(2, 2);
        dof_composite(
            CompositeInputs {
                color: &color,
                blurred: &blurred,
                bloom: None,
                glow: None,
                effects: Some(&effects),
                distort: [None, None],
            },
            &mut dst,
        );
        assert!((dst.get(0, 0)[0] - 1.0).abs() < 0.0001);
    }
}
