//! Client core for a video-conferencing app: local video effects (virtual
//! background, gesture recognition) and the room state behind the grid.

pub mod capture;
pub mod compositing;
pub mod config;
pub mod effects;
pub mod frame;
pub mod gesture;
pub mod output;
pub mod room;
pub mod segmentation;
