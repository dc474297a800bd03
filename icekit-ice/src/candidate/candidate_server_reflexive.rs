use super::*;

/// The config required to create a new server reflexive candidate.
#[derive(Default)]
pub struct CandidateServerReflexiveConfig {
    pub base_config: CandidateConfig,

    /// The host address the binding was obtained from; becomes the base.
    pub rel_addr: String,
    pub rel_port: u16,
}

impl CandidateServerReflexiveConfig {
    /// Creates a new server reflective candidate.
    pub fn new_candidate_server_reflexive(self) -> Result<Candidate> {
        let related_address = parse_related_address(&self.rel_addr, self.rel_port)?
            .ok_or_else(|| {
                Error::ErrRelatedAddressRequired(CandidateType::ServerReflexive.to_string())
            })?;

        self.base_config.build(
            CandidateType::ServerReflexive,
            Some(related_address),
            Some(related_address),
        )
    }
}
