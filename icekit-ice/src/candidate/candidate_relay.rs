use super::*;

/// The config required to create a new relayed candidate.
#[derive(Default)]
pub struct CandidateRelayConfig {
    pub base_config: CandidateConfig,

    /// The mapped address of the allocation, informational only.
    pub rel_addr: String,
    pub rel_port: u16,
}

impl CandidateRelayConfig {
    /// Creates a new relay candidate. Its base is the relayed address itself.
    pub fn new_candidate_relay(self) -> Result<Candidate> {
        let related_address = parse_related_address(&self.rel_addr, self.rel_port)?;

        self.base_config
            .build(CandidateType::Relay, related_address, None)
    }
}
