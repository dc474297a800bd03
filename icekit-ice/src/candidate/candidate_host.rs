use super::*;

/// The config required to create a new host candidate.
#[derive(Default)]
pub struct CandidateHostConfig {
    pub base_config: CandidateConfig,
}

impl CandidateHostConfig {
    /// Creates a new host candidate.
    pub fn new_candidate_host(self) -> Result<Candidate> {
        self.base_config.build(CandidateType::Host, None, None)
    }
}
