//! Signal processing: phase correction, resampling, spectrograms.

pub mod filter;
pub mod phase;
pub mod resample;
pub mod spectrogram;
