#![doc = env!("CARGO_PKG_DESCRIPTION")]

#[doc(inline)]
pub use klt_image as image;

#[doc(inline)]
pub use klt_imgproc as imgproc;

#[doc(inline)]
pub use klt_tracking as tracking;
