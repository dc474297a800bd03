use super::*;
use crate::arena::Arena;
use crate::candidate::candidate_host::*;
use crate::candidate::candidate_pair::*;
use crate::candidate::*;
use shared::error::Result;

use std::collections::HashSet;

fn host(address: &str, port: u16, component: u16) -> Result<Candidate> {
    CandidateHostConfig {
        base_config: CandidateConfig {
            address: address.to_owned(),
            port,
            component,
            ..Default::default()
        },
    }
    .new_candidate_host()
}

/// One checklist per component, each with two pairs of distinct foundations.
fn checklists(components: &[u16]) -> Result<Vec<Checklist>> {
    let mut candidates = Arena::new();
    let mut out = vec![];
    for &component in components {
        let port = 5000 + component;
        let remote = candidates.insert(host("10.0.0.9", port, component)?);
        let mut cl = Checklist::new(component);
        let mut pairs = vec![];
        for addr in ["10.0.0.1", "10.0.0.2"] {
            let local = candidates.insert(host(addr, port, component)?);
            if let (Some(l), Some(r)) = (candidates.get(local), candidates.get(remote)) {
                pairs.push(CandidatePair::new(local, l, remote, r, true));
            }
        }
        cl.seed(pairs);
        out.push(cl);
    }
    Ok(out)
}

#[test]
fn test_scheduler_round_robin() -> Result<()> {
    let mut cls = checklists(&[1, 2])?;
    let mut thawed = HashSet::new();
    for cl in &mut cls {
        // Separate sets so both components start with Waiting pairs.
        thawed.clear();
        cl.initial_thaw(&mut thawed);
    }

    let mut s = CheckScheduler::new(Duration::from_millis(250));
    let got: Vec<usize> = (0..4)
        .filter_map(|_| s.next_check(&cls))
        .map(|(i, _)| i)
        .collect();
    assert_eq!(got, vec![0, 1, 0, 1], "alternates between checklists");

    let first = s.next_check(&cls).map(|(_, id)| id);
    assert_eq!(first, cls[0].next_waiting_pair());

    Ok(())
}

#[test]
fn test_scheduler_skips_finished_checklists() -> Result<()> {
    let mut cls = checklists(&[1, 2])?;
    for cl in &mut cls {
        cl.initial_thaw(&mut HashSet::new());
    }
    cls[0].fail();

    let mut s = CheckScheduler::new(Duration::from_millis(250));
    for _ in 0..3 {
        assert_eq!(s.next_check(&cls).map(|(i, _)| i), Some(1));
    }

    cls[1].fail();
    assert_eq!(s.next_check(&cls), None);

    Ok(())
}

#[test]
fn test_scheduler_frozen_fallback() -> Result<()> {
    let cls = checklists(&[1])?;
    let mut s = CheckScheduler::new(Duration::from_millis(500));

    assert_eq!(cls[0].next_waiting_pair(), None);
    let got = s.next_check(&cls);
    assert_eq!(got, cls[0].next_frozen_pair().map(|id| (0, id)));

    Ok(())
}

#[test]
fn test_scheduler_tick() {
    let t0 = Instant::now();
    let ta = Duration::from_millis(250);
    let mut s = CheckScheduler::new(ta);

    assert!(!s.tick(t0), "not started");
    assert_eq!(s.poll_timeout(), None);

    s.start(t0);
    assert!(s.tick(t0));
    assert_eq!(s.poll_timeout(), Some(t0 + ta));
    assert!(!s.tick(t0 + Duration::from_millis(249)));
    assert!(s.tick(t0 + ta));

    s.set_ta(Duration::from_millis(100));
    assert_eq!(s.poll_timeout(), Some(t0 + ta + Duration::from_millis(100)));

    s.stop();
    assert!(!s.is_running());
    assert!(!s.tick(t0 + Duration::from_secs(10)));
}

#[test]
fn test_scheduler_resume_keeps_pacing() {
    let t0 = Instant::now();
    let ta = Duration::from_millis(250);
    let mut s = CheckScheduler::new(ta);

    s.resume(t0);
    assert_eq!(s.poll_timeout(), Some(t0), "never ticked, fires right away");
    assert!(s.tick(t0));

    s.stop();
    s.resume(t0 + Duration::from_millis(100));
    assert_eq!(s.poll_timeout(), Some(t0 + ta), "one interval after the last tick");

    s.resume(t0 + Duration::from_secs(5));
    assert_eq!(s.poll_timeout(), Some(t0 + ta), "an armed tick is kept");

    s.stop();
    s.resume(t0 + Duration::from_secs(5));
    assert_eq!(s.poll_timeout(), Some(t0 + Duration::from_secs(5)));
}
