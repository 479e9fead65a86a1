//! Multi-track mixing engine
//!
//! Per track: source → gain → pan, summed on the mix bus:
//! master gain → spectrum analyzer → output sink.
//! - Node graph rendered by a cpal output stream or offline
//! - Mute/solo/volume/pan resolution with smoothed parameter ramps
//! - Play/stop lifecycle with rollback on partial failure
//! - Spectrum sampling for display

pub mod buffer;
pub mod bus;
pub mod context;
pub mod device;
pub mod engine;
pub mod envelope;
pub mod factory;
pub mod graph;
pub mod mixer;
pub mod nodes;
pub mod param;
pub mod sampler;
pub mod spectrum;
pub mod ticker;
pub mod track;
pub mod transport;
