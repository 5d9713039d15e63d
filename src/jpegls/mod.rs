//! Pure Rust JPEG-LS (ITU-T T.87) lossless encoder.
//!
//! Produces a complete JPEG-LS interchange stream (SOI..EOI) from raw
//! samples. Only NEAR=0 (lossless) is used in production; the NEAR
//! parameter is still threaded through the error and reconstruction path.

mod bitwriter;
mod context;
mod encoder;
mod golomb;
mod markers;
mod params;
mod predictor;
mod runmode;

pub use bitwriter::BitWriter;
pub use context::{Context, ContextModel};
pub use encoder::{encode_from_bytes, encode_grayscale, encode_grayscale16, Encoder};
pub use golomb::{
    compute_prediction_error, encode_golomb, map_error_value, reduce_error, reconstruct_sample,
};
pub use markers::{FrameInfo, ScanInfo};
pub use params::{Params, CONTEXT_COUNT, J_TABLE, MAX_K, RUN_CONTEXT_COUNT};
pub use predictor::{compute_gradients, is_run_mode, predict, Neighborhood};
