//! Keyframe gate: parameter-set cache and decoder configuration data

use bytes::{Bytes, BytesMut};
use tracing::debug;

use crate::config::{DecoderPriority, DecoderSettings};
use crate::types::{CodecFamily, Nalu, NaluKind};

/// Everything needed to configure a hardware decoder for one stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecConfig {
    pub family: CodecFamily,
    pub mime: &'static str,
    pub low_latency: bool,
    pub priority: DecoderPriority,
    /// Codec-specific data buffers, start codes included.
    ///
    /// H.264 carries SPS then PPS as two buffers; H.265 carries
    /// VPS, SPS and PPS concatenated into one.
    pub csd: Vec<Bytes>,
}

/// Most recent parameter set of each type for a single codec family
#[derive(Debug, Default, Clone)]
pub struct KeyframeGate {
    family: Option<CodecFamily>,
    vps: Option<Bytes>,
    sps: Option<Bytes>,
    pps: Option<Bytes>,
}

impl KeyframeGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache a parameter set, overwriting the previous one of the same type.
    ///
    /// Returns whether the unit was cached. A parameter set from a different
    /// codec family clears the cache first so mixed sets never coexist.
    pub fn observe(&mut self, nalu: &Nalu) -> bool {
        let kind = nalu.kind();
        let family = nalu.family();
        if !kind.is_parameter_set() || (kind == NaluKind::Vps && family != CodecFamily::H265) {
            return false;
        }

        if self.family.is_some_and(|cached| cached != family) {
            debug!(from = ?self.family, to = %family, "Codec family changed, clearing parameter sets");
            self.reset();
        }
        self.family = Some(family);

        let data = Some(nalu.data().clone());
        match kind {
            NaluKind::Vps => self.vps = data,
            NaluKind::Sps => self.sps = data,
            _ => self.pps = data,
        }
        true
    }

    /// Whether every parameter set required by `family` is cached
    pub fn is_ready(&self, family: CodecFamily) -> bool {
        self.family == Some(family)
            && family
                .required_parameter_sets()
                .iter()
                .all(|kind| self.parameter_set(*kind).is_some())
    }

    pub fn family(&self) -> Option<CodecFamily> {
        self.family
    }

    pub fn parameter_set(&self, kind: NaluKind) -> Option<&Bytes> {
        match kind {
            NaluKind::Vps => self.vps.as_ref(),
            NaluKind::Sps => self.sps.as_ref(),
            NaluKind::Pps => self.pps.as_ref(),
            _ => None,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Build decoder configuration from the cached sets, if complete
    pub fn codec_config(&self, settings: &DecoderSettings) -> Option<CodecConfig> {
        let family = self.family?;
        if !self.is_ready(family) {
            return None;
        }

        let csd = match family {
            CodecFamily::H264 => vec![self.sps.clone()?, self.pps.clone()?],
            CodecFamily::H265 => {
                let (vps, sps, pps) = (self.vps.as_ref()?, self.sps.as_ref()?, self.pps.as_ref()?);
                let mut joined = BytesMut::with_capacity(vps.len() + sps.len() + pps.len());
                joined.extend_from_slice(vps);
                joined.extend_from_slice(sps);
                joined.extend_from_slice(pps);
                vec![joined.freeze()]
            }
        };

        Some(CodecConfig {
            family,
            mime: family.mime(),
            low_latency: settings.low_latency,
            priority: settings.priority,
            csd,
        })
    }
}
