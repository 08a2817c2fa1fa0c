use super::sinks::{BridgeStatsSink, ConsensusStatsSink, DirreqStatsSink, HealthSink};
use crate::parse::{DirreqObservation, FlagTallies};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use log::{trace, warn};
use std::collections::{BTreeMap, BTreeSet};

/// Relay flag tallies, one per consensus.
#[derive(Debug, Default)]
pub struct ConsensusStats {
    tallies: BTreeMap<NaiveDateTime, FlagTallies>,
}

impl ConsensusStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tallies(&self) -> &BTreeMap<NaiveDateTime, FlagTallies> {
        &self.tallies
    }

    /// One line per consensus seen, or `None` if none was.
    pub fn summary(&self) -> Option<String> {
        let (first, _) = self.tallies.first_key_value()?;
        let (last, latest) = self.tallies.last_key_value()?;
        Some(format!(
            "{} consensuses from {} to {}; latest has {} running relays ({} exit, {} fast, {} guard, {} stable)",
            self.tallies.len(),
            first,
            last,
            latest.running,
            latest.exit,
            latest.fast,
            latest.guard,
            latest.stable
        ))
    }
}

impl ConsensusStatsSink for ConsensusStats {
    fn add_consensus_results(&mut self, valid_after: NaiveDateTime, tallies: FlagTallies) {
        if self.tallies.insert(valid_after, tallies).is_none() {
            trace!("Added consensus results for {}", valid_after);
        }
    }
}

/// Hashed identities of every relay seen in a consensus.
///
/// Bridge statistics use them to discard bridges that also run as public relays.
#[derive(Debug, Default)]
pub struct BridgeStats {
    hashed_relays: BTreeSet<String>,
}

impl BridgeStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_relay(&self, hashed_identity: &str) -> bool {
        self.hashed_relays.contains(&hashed_identity.to_uppercase())
    }

    pub fn len(&self) -> usize {
        self.hashed_relays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashed_relays.is_empty()
    }
}

impl BridgeStatsSink for BridgeStats {
    fn add_hashed_relay(&mut self, hashed_identity: &str) {
        self.hashed_relays.insert(hashed_identity.to_uppercase());
    }
}

/// Directory request observations, one per directory and day.
#[derive(Debug, Default)]
pub struct DirreqStats {
    observations: BTreeMap<(String, Option<NaiveDate>), DirreqObservation>,
}

impl DirreqStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, directory: &str, date: Option<NaiveDate>) -> Option<&DirreqObservation> {
        self.observations.get(&(directory.to_string(), date))
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}

impl DirreqStatsSink for DirreqStats {
    /// Adds an observation, replacing a different one for the same directory and day.
    fn add_obs(&mut self, observation: DirreqObservation) {
        let key = (observation.directory.clone(), observation.date);
        match self.observations.get(&key) {
            Some(known) if *known == observation => {}
            Some(known) => {
                warn!(
                    "Directory request numbers of {} on {:?} changed from {:?} to {:?}, overwriting",
                    key.0, key.1, known.requests, observation.requests
                );
                self.observations.insert(key, observation);
            }
            None => {
                trace!("Adding directory request numbers of {} on {:?}", key.0, key.1);
                self.observations.insert(key, observation);
            }
        }
    }
}

/// Tracks which consensuses and votes we have, to report gaps in what the
/// authorities publish.
#[derive(Debug, Default)]
pub struct NetworkHealth {
    consensuses: BTreeSet<NaiveDateTime>,
    votes: BTreeMap<NaiveDateTime, BTreeSet<String>>,
}

/// A consensus older than this is reported as stale.
pub const MAX_CONSENSUS_AGE: i64 = 3 * 60 * 60;

impl NetworkHealth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Problems with the documents seen so far, as of `now`.
    pub fn check(&self, now: NaiveDateTime) -> Vec<String> {
        let mut problems = Vec::new();
        let Some(latest) = self.consensuses.last() else {
            problems.push("No consensus seen".to_string());
            return problems;
        };
        if now - *latest > Duration::seconds(MAX_CONSENSUS_AGE) {
            problems.push(format!("Latest consensus valid after {} is stale", latest));
        }
        let voters = self.votes.get(latest).map_or(0, BTreeSet::len);
        let most_voters = self.votes.values().map(BTreeSet::len).max().unwrap_or(0);
        if voters < most_voters {
            problems.push(format!(
                "Only {} of {} authorities voted for consensus valid after {}",
                voters, most_voters, latest
            ));
        }
        problems
    }
}

impl HealthSink for NetworkHealth {
    fn process_consensus(&mut self, valid_after: NaiveDateTime, _raw: &[u8]) {
        self.consensuses.insert(valid_after);
    }

    fn process_vote(&mut self, valid_after: NaiveDateTime, dir_source: &str, _raw: &[u8]) {
        self.votes
            .entry(valid_after)
            .or_default()
            .insert(dir_source.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hour(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn observation(us: i64) -> DirreqObservation {
        DirreqObservation {
            directory: "8522EB98C91496E80EC238E732594D1509158E77".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, 1),
            requests: [("us".to_string(), us), ("zy".to_string(), us)].into_iter().collect(),
            share: "1.25".to_string(),
        }
    }

    #[test]
    fn test_consensus_summary() {
        let mut stats = ConsensusStats::new();
        assert_eq!(stats.summary(), None);
        stats.add_consensus_results(hour(0), FlagTallies::default());
        stats.add_consensus_results(
            hour(1),
            FlagTallies {
                running: 2,
                fast: 2,
                guard: 1,
                ..Default::default()
            },
        );
        let summary = stats.summary().unwrap();
        assert!(summary.starts_with("2 consensuses"));
        assert!(summary.contains("2 running relays (0 exit, 2 fast, 1 guard, 0 stable)"));
    }

    #[test]
    fn test_bridge_stats_ignores_case() {
        let mut stats = BridgeStats::new();
        stats.add_hashed_relay("6768033E216468247BD031A0A2D9876D79818F8F");
        stats.add_hashed_relay("6768033e216468247bd031a0a2d9876d79818f8f");
        assert_eq!(stats.len(), 1);
        assert!(stats.is_relay("6768033e216468247bd031a0a2d9876d79818f8f"));
        assert!(!stats.is_relay("0000000000000000000000000000000000000000"));
    }

    #[test]
    fn test_dirreq_stats_overwrites_per_directory_and_day() {
        let mut stats = DirreqStats::new();
        stats.add_obs(observation(10));
        stats.add_obs(observation(10));
        assert_eq!(stats.len(), 1);
        stats.add_obs(observation(12));
        assert_eq!(stats.len(), 1);
        let known = stats
            .get("8522EB98C91496E80EC238E732594D1509158E77", NaiveDate::from_ymd_opt(2024, 1, 1))
            .unwrap();
        assert_eq!(known.requests["us"], 12);
    }

    #[test]
    fn test_health_reports_stale_consensus_and_missing_votes() {
        let mut health = NetworkHealth::new();
        assert_eq!(health.check(hour(0)), vec!["No consensus seen".to_string()]);

        health.process_vote(hour(0), "A", b"");
        health.process_vote(hour(0), "B", b"");
        health.process_consensus(hour(0), b"");
        health.process_vote(hour(1), "A", b"");
        health.process_consensus(hour(1), b"");
        assert_eq!(health.check(hour(2)).len(), 1);
        assert!(health.check(hour(2))[0].starts_with("Only 1 of 2"));
        assert_eq!(health.check(hour(5)).len(), 2);
    }
}
