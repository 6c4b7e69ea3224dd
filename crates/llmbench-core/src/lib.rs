//! Benchmark execution: per-model attempts, parallel/sequential fan-out and
//! resource sampling while requests are in flight.

pub mod runner;
pub mod sampler;

pub use runner::{BenchmarkRunner, ProbeFactory};
pub use sampler::{summarize, ResourceProbe, ResourceSample, ResourceSampler, SamplerHandle};
