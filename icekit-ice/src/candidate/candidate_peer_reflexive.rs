use super::*;

/// The config required to create a new peer reflexive candidate.
#[derive(Default)]
pub struct CandidatePeerReflexiveConfig {
    pub base_config: CandidateConfig,

    /// Base of a local peer reflexive candidate. Left empty for remote ones
    /// learned from the source of an inbound check.
    pub rel_addr: String,
    pub rel_port: u16,
}

impl CandidatePeerReflexiveConfig {
    /// Creates a new peer reflective candidate.
    pub fn new_candidate_peer_reflexive(self) -> Result<Candidate> {
        let related_address = parse_related_address(&self.rel_addr, self.rel_port)?;

        self.base_config.build(
            CandidateType::PeerReflexive,
            related_address,
            related_address,
        )
    }
}
