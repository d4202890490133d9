pub mod output;
pub mod ring;

pub use output::AudioOutput;
pub use ring::FrameRing;
