//! Waveform compilation
//!
//! A timing code usually repeats a handful of mark and space lengths many
//! times. Instead of uploading one waveform per element, the compiler
//! uploads one segment per *distinct* mark length and one per distinct space
//! length, then describes the transmission as a chain of segment handles.
//!
//! Compilation runs in two stages:
//!
//! 1. [`WaveformPlan::new`] is pure: it finds the distinct values, renders
//!    the mark bursts and lays out the chain in terms of [`SegmentKey`]s.
//! 2. [`compile`] registers every planned segment through a
//!    [`SegmentRegistrar`] and resolves the chain to device handles.
//!
//! The registrar is whatever owns the device connection; this crate never
//! talks to hardware itself.

use std::collections::{HashMap, HashSet};
use std::future::Future;

use tracing::debug;

use crate::carrier::synthesize;
use crate::timing::{CarrierParams, Element, PlaybackChain, PulseBurst, SegmentHandle, TimingSequence};

/// Planned segment, identified by kind and duration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentKey {
    /// Carrier burst of the given length
    Mark(u32),
    /// Silence of the given length
    Space(u32),
}

impl From<Element> for SegmentKey {
    fn from(element: Element) -> Self {
        match element {
            Element::Mark(us) => SegmentKey::Mark(us),
            Element::Space(us) => SegmentKey::Space(us),
        }
    }
}

/// Device-independent description of a compiled timing code
#[derive(Debug, Clone, PartialEq)]
pub struct WaveformPlan {
    marks: Vec<(u32, Vec<PulseBurst>)>,
    spaces: Vec<u32>,
    chain: Vec<SegmentKey>,
}

impl WaveformPlan {
    /// Plan segments for `seq`, keeping distinct values in first-seen order
    pub fn new(seq: &TimingSequence, params: &CarrierParams) -> Self {
        let mut seen: HashSet<u32> = HashSet::new();
        let marks: Vec<(u32, Vec<PulseBurst>)> = seq
            .marks()
            .filter(|us| seen.insert(*us))
            .map(|us| (us, synthesize(params, us)))
            .collect();

        seen.clear();
        let spaces: Vec<u32> = seq.spaces().filter(|us| seen.insert(*us)).collect();

        let chain = seq.elements().map(SegmentKey::from).collect();

        Self {
            marks,
            spaces,
            chain,
        }
    }

    /// Distinct marks with their rendered carrier bursts
    pub fn marks(&self) -> &[(u32, Vec<PulseBurst>)] {
        &self.marks
    }

    /// Distinct space lengths
    pub fn spaces(&self) -> &[u32] {
        &self.spaces
    }

    /// Transmission order
    pub fn chain(&self) -> &[SegmentKey] {
        &self.chain
    }

    /// Number of segments the device has to hold for this code
    pub fn segment_count(&self) -> usize {
        self.marks.len() + self.spaces.len()
    }
}

/// Uploads waveform segments on behalf of the compiler
pub trait SegmentRegistrar {
    /// Error raised by the device side
    type Error;

    /// Register a carrier burst as a reusable segment
    fn register_burst(
        &mut self,
        pulses: &[PulseBurst],
    ) -> impl Future<Output = Result<SegmentHandle, Self::Error>> + Send;

    /// Register a pure wait of `duration_us` as a reusable segment
    fn register_silence(
        &mut self,
        duration_us: u32,
    ) -> impl Future<Output = Result<SegmentHandle, Self::Error>> + Send;
}

/// Register the segments of `seq` and build its playback chain
///
/// Stops at the first registration error. Segments registered before the
/// failure stay with the registrar, which is responsible for releasing them.
pub async fn compile<R>(
    seq: &TimingSequence,
    params: &CarrierParams,
    registrar: &mut R,
) -> Result<PlaybackChain, R::Error>
where
    R: SegmentRegistrar,
{
    let plan = WaveformPlan::new(seq, params);
    compile_plan(&plan, registrar).await
}

/// Register an already computed plan and resolve its chain
pub async fn compile_plan<R>(plan: &WaveformPlan, registrar: &mut R) -> Result<PlaybackChain, R::Error>
where
    R: SegmentRegistrar,
{
    let mut handles: HashMap<SegmentKey, SegmentHandle> = HashMap::with_capacity(plan.segment_count());

    for (us, pulses) in plan.marks() {
        let handle = registrar.register_burst(pulses).await?;
        debug!("Mark {}us -> segment {} ({} pulses)", us, handle.0, pulses.len());
        handles.insert(SegmentKey::Mark(*us), handle);
    }

    for &us in plan.spaces() {
        let handle = registrar.register_silence(us).await?;
        debug!("Space {}us -> segment {}", us, handle.0);
        handles.insert(SegmentKey::Space(us), handle);
    }

    // Every key in the chain was registered above
    let chain = plan.chain().iter().map(|key| handles[key]).collect();

    Ok(PlaybackChain::new(chain))
}
