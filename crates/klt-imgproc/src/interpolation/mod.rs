mod bilinear;
pub use bilinear::bilinear_interpolation;
