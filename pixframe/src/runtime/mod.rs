pub mod display_state;
pub mod events;
pub mod frame_clock;
pub mod playback;
pub mod storage;
