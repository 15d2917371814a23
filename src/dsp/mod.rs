pub mod ambiguity;
pub mod cfar;
pub mod doa;
pub mod doppler;
pub mod fft;
pub mod processor;
pub mod range;
