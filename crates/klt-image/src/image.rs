use crate::error::ImageError;

/// Image size in pixels
///
/// A struct to represent the size of an image in pixels.
///
/// # Examples
///
/// ```
/// use klt_image::ImageSize;
///
/// let image_size = ImageSize {
///   width: 10,
///   height: 20,
/// };
///
/// assert_eq!(image_size.width, 10);
/// assert_eq!(image_size.height, 20);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageSize {
    /// Width of the image in pixels
    pub width: usize,
    /// Height of the image in pixels
    pub height: usize,
}

impl ImageSize {
    /// Number of pixels covered by the size.
    pub fn area(&self) -> usize {
        self.width * self.height
    }
}

impl std::fmt::Display for ImageSize {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "ImageSize {{ width: {}, height: {} }}",
            self.width, self.height
        )
    }
}

impl From<[usize; 2]> for ImageSize {
    fn from(size: [usize; 2]) -> Self {
        ImageSize {
            width: size[0],
            height: size[1],
        }
    }
}

/// Represents an image with pixel data.
///
/// The pixels are stored contiguously in row-major order with interleaved
/// channels, i.e. the value of channel `c` at column `x` and row `y` lives at
/// `(y * width + x) * CHANNELS + c`.
#[derive(Clone, Debug, PartialEq)]
pub struct Image<T, const CHANNELS: usize> {
    size: ImageSize,
    data: Vec<T>,
}

impl<T, const CHANNELS: usize> Image<T, CHANNELS> {
    /// Create a new image from pixel data.
    ///
    /// # Arguments
    ///
    /// * `size` - The size of the image in pixels.
    /// * `data` - The pixel data of the image.
    ///
    /// # Errors
    ///
    /// If the length of the pixel data does not match the image size, an error is returned.
    ///
    /// # Examples
    ///
    /// ```
    /// use klt_image::{Image, ImageSize};
    ///
    /// let image = Image::<u8, 3>::new(
    ///    ImageSize {
    ///       width: 10,
    ///       height: 20,
    ///    },
    ///    vec![0u8; 10 * 20 * 3],
    /// ).unwrap();
    ///
    /// assert_eq!(image.size().width, 10);
    /// assert_eq!(image.size().height, 20);
    /// assert_eq!(image.as_slice().len(), 600);
    /// ```
    pub fn new(size: ImageSize, data: Vec<T>) -> Result<Self, ImageError> {
        // check if the data length matches the image size
        if data.len() != size.area() * CHANNELS {
            return Err(ImageError::InvalidChannelShape(
                data.len(),
                size.area() * CHANNELS,
            ));
        }

        Ok(Self { size, data })
    }

    /// Create a new image with the given size and default pixel data.
    ///
    /// # Arguments
    ///
    /// * `size` - The size of the image in pixels.
    /// * `val` - The default value of the pixel data.
    ///
    /// # Examples
    ///
    /// ```
    /// use klt_image::{Image, ImageSize};
    ///
    /// let image = Image::<f32, 1>::from_size_val(
    ///   ImageSize {
    ///     width: 10,
    ///     height: 20,
    ///   }, 0.0).unwrap();
    ///
    /// assert_eq!(image.size().width, 10);
    /// assert_eq!(image.size().height, 20);
    /// ```
    pub fn from_size_val(size: ImageSize, val: T) -> Result<Self, ImageError>
    where
        T: Clone,
    {
        let data = vec![val; size.area() * CHANNELS];
        Image::new(size, data)
    }

    /// Create a new image by evaluating `f(x, y, channel)` for every pixel.
    ///
    /// Mostly used to render synthetic test patterns.
    pub fn from_size_fn(
        size: ImageSize,
        f: impl Fn(usize, usize, usize) -> T,
    ) -> Result<Self, ImageError> {
        let mut data = Vec::with_capacity(size.area() * CHANNELS);
        for y in 0..size.height {
            for x in 0..size.width {
                for c in 0..CHANNELS {
                    data.push(f(x, y, c));
                }
            }
        }
        Image::new(size, data)
    }

    /// Get the size of the image in pixels.
    pub fn size(&self) -> ImageSize {
        self.size
    }

    /// Get the number of columns of the image.
    pub fn cols(&self) -> usize {
        self.size.width
    }

    /// Get the number of rows of the image.
    pub fn rows(&self) -> usize {
        self.size.height
    }

    /// Get the width of the image in pixels.
    pub fn width(&self) -> usize {
        self.size.width
    }

    /// Get the height of the image in pixels.
    pub fn height(&self) -> usize {
        self.size.height
    }

    /// Get the pixel data as a flat slice.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Get the pixel data as a flat mutable slice.
    pub fn as_slice_mut(&mut self) -> &mut [T] {
        &mut self.data
    }
}

impl Image<f32, 1> {
    /// Get the pixel at column `x` and row `y` of a single channel image without
    /// channel bookkeeping.
    ///
    /// PRECONDITION: `x < width` and `y < height`.
    #[inline]
    pub fn at(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.size.width + x]
    }

    /// Get a row of a single channel image.
    #[inline]
    pub fn row(&self, y: usize) -> &[f32] {
        let start = y * self.size.width;
        &self.data[start..start + self.size.width]
    }
}

#[cfg(test)]
mod tests {
    use crate::image::{Image, ImageError, ImageSize};

    #[test]
    fn image_size() {
        let image_size = ImageSize {
            width: 10,
            height: 20,
        };
        assert_eq!(image_size.width, 10);
        assert_eq!(image_size.height, 20);
        assert_eq!(image_size.area(), 200);
    }

    #[test]
    fn image_smoke() -> Result<(), ImageError> {
        let image = Image::<u8, 3>::new(
            ImageSize {
                width: 10,
                height: 20,
            },
            vec![0u8; 10 * 20 * 3],
        )?;
        assert_eq!(image.size().width, 10);
        assert_eq!(image.size().height, 20);
        assert_eq!(image.as_slice().len(), 600);

        Ok(())
    }

    #[test]
    fn image_invalid_length() {
        let image = Image::<f32, 1>::new([4, 4].into(), vec![0.0; 15]);
        assert_eq!(image, Err(ImageError::InvalidChannelShape(15, 16)));
    }

    #[test]
    fn image_from_size_fn() -> Result<(), ImageError> {
        let image = Image::<f32, 1>::from_size_fn([3, 2].into(), |x, y, _| (y * 10 + x) as f32)?;
        assert_eq!(image.at(2, 1), 12.0);
        assert_eq!(image.row(1), &[10.0, 11.0, 12.0]);

        Ok(())
    }
}
