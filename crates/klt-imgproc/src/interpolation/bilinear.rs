use klt_image::Image;

/// Sample a single channel image at a sub-pixel location.
///
/// The integer part of the coordinates picks the top-left pixel and the
/// fractional part weights it with its right, bottom and bottom-right
/// neighbours. Neighbour indices are clamped to the last row and column.
///
/// # Arguments
///
/// * `image` - The image to sample, must not be empty.
/// * `u` - The x coordinate, expected in `[0, cols - 1]`.
/// * `v` - The y coordinate, expected in `[0, rows - 1]`.
///
/// # Returns
///
/// The interpolated value.
pub fn bilinear_interpolation(image: &Image<f32, 1>, u: f32, v: f32) -> f32 {
    let (rows, cols) = (image.rows(), image.cols());

    let iu = (u.max(0.0) as usize).min(cols - 1);
    let iv = (v.max(0.0) as usize).min(rows - 1);

    let frac_u = u - iu as f32;
    let frac_v = v - iv as f32;

    let iu1 = (iu + 1).min(cols - 1);
    let iv1 = (iv + 1).min(rows - 1);

    let val00 = image.at(iu, iv);
    let val01 = image.at(iu1, iv);
    let val10 = image.at(iu, iv1);
    let val11 = image.at(iu1, iv1);

    (1.0 - frac_u) * (1.0 - frac_v) * val00
        + frac_u * (1.0 - frac_v) * val01
        + (1.0 - frac_u) * frac_v * val10
        + frac_u * frac_v * val11
}

#[cfg(test)]
mod tests {
    use super::bilinear_interpolation;
    use approx::assert_relative_eq;
    use klt_image::{Image, ImageError};

    #[test]
    fn bilinear_integer_coordinates() -> Result<(), ImageError> {
        let image = Image::<f32, 1>::from_size_fn([4, 3].into(), |x, y, _| (y * 4 + x) as f32)?;
        assert_eq!(bilinear_interpolation(&image, 2.0, 1.0), 6.0);
        assert_eq!(bilinear_interpolation(&image, 3.0, 2.0), 11.0);

        Ok(())
    }

    #[test]
    fn bilinear_fractional_coordinates() -> Result<(), ImageError> {
        let image = Image::<f32, 1>::new([2, 2].into(), vec![0.0, 1.0, 2.0, 3.0])?;
        assert_relative_eq!(bilinear_interpolation(&image, 0.5, 0.5), 1.5);
        assert_relative_eq!(bilinear_interpolation(&image, 0.25, 0.0), 0.25);
        assert_relative_eq!(bilinear_interpolation(&image, 0.0, 0.75), 1.5);

        Ok(())
    }
}
