mod kernels;
pub use kernels::{ConvolutionKernel, GaussianKernels, KernelCache, MAX_KERNEL_WIDTH, SIGMA_TOLERANCE};

mod ops;
pub use ops::{gaussian_blur, spatial_gradient};

mod separable_filter;
pub use separable_filter::{convolve_horizontal, convolve_vertical, separable_filter};
