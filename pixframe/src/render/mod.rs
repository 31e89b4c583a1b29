pub mod canvas;
pub mod frames;
#[cfg(feature = "hardware")]
pub mod led_matrix;
