// Audio module - container detection, duration probing and chapter metadata

pub mod chapters;
pub mod detection;
pub mod probe;

pub use chapters::build_chapters;
pub use detection::AudioContainer;
pub use probe::DurationProber;
