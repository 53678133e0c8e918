//! Simulated cluster of nodes electing a leader over timer tasks.

use crate::actions::{ElectionTimeout, Heartbeat};
use crate::config::ClusterConfig;
use crate::report::SimulationReport;
use crate::SimulatorError;
use metronome_core::{TimerScheduler, UniformJitter};
use metronome_dispatch_sync::SyncDispatch;
use metronome_simulation::ManualScheduler;
use metronome_task::{RepeatedTimerTask, TimerTaskConfig};
use parking_lot::Mutex;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info};

type ElectionTimer = RepeatedTimerTask<ElectionTimeout, ManualScheduler, SyncDispatch>;
type HeartbeatTimer = RepeatedTimerTask<Heartbeat, ManualScheduler, SyncDispatch>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Follower,
    Leader,
}

/// Counters accumulated over a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClusterStats {
    pub elections: u64,
    pub heartbeats: u64,
    pub crashes: u64,
}

struct NodeState {
    role: Role,
    term: u64,
}

struct Node {
    id: usize,
    state: Mutex<NodeState>,
    election: ElectionTimer,
    heartbeat: HeartbeatTimer,
}

/// State reachable from timer actions.
pub(crate) struct Shared {
    nodes: Vec<Node>,
    stats: Mutex<ClusterStats>,
}

impl Shared {
    fn leader(&self) -> Option<usize> {
        self.nodes
            .iter()
            .filter_map(|node| {
                let state = node.state.lock();
                (state.role == Role::Leader).then_some((state.term, node.id))
            })
            .max()
            .map(|(_, id)| id)
    }

    fn max_term(&self) -> u64 {
        self.nodes
            .iter()
            .map(|node| node.state.lock().term)
            .max()
            .unwrap_or(0)
    }

    pub(crate) fn on_election_timeout(&self, id: usize) {
        let term = self.max_term() + 1;
        {
            let mut state = self.nodes[id].state.lock();
            state.term = term;
            state.role = Role::Leader;
        }
        self.stats.lock().elections += 1;
        info!(node = id, term, "Elected leader");

        let node = &self.nodes[id];
        node.election.stop();
        node.heartbeat.start();
        self.broadcast(id, term);
    }

    pub(crate) fn on_heartbeat(&self, id: usize) {
        let term = {
            let state = self.nodes[id].state.lock();
            if state.role != Role::Leader {
                return;
            }
            state.term
        };
        if self.max_term() > term {
            debug!(node = id, term, "Stale leader stepping down");
            self.step_down(id);
            return;
        }

        self.stats.lock().heartbeats += 1;
        self.broadcast(id, term);
    }

    /// Deliver a leader's term to every other node and restart their
    /// election countdowns.
    fn broadcast(&self, leader: usize, term: u64) {
        for node in self.nodes.iter().filter(|node| node.id != leader) {
            let was_leader = {
                let mut state = node.state.lock();
                if state.term > term {
                    continue;
                }
                state.term = term;
                std::mem::replace(&mut state.role, Role::Follower) == Role::Leader
            };
            if was_leader {
                debug!(node = node.id, term, "Deposed by newer leader");
                node.heartbeat.stop();
                node.election.start();
            }
            node.election.reset();
        }
    }

    fn step_down(&self, id: usize) {
        let node = &self.nodes[id];
        node.state.lock().role = Role::Follower;
        node.heartbeat.stop();
        node.election.start();
    }

    fn crash_leader(&self) -> Option<usize> {
        let id = self.leader()?;
        self.step_down(id);
        self.stats.lock().crashes += 1;
        info!(node = id, "Leader crashed, rejoining as follower");
        Some(id)
    }

    fn destroy_all(&self) {
        for node in &self.nodes {
            node.heartbeat.destroy();
            node.election.destroy();
        }
    }

    fn describe(&self) -> Vec<(String, String)> {
        self.nodes
            .iter()
            .flat_map(|node| {
                [
                    (node.election.name().to_string(), node.election.describe()),
                    (node.heartbeat.name().to_string(), node.heartbeat.describe()),
                ]
            })
            .collect()
    }
}

/// A deterministic cluster of nodes on one virtual clock.
///
/// Each node owns an election-timeout task and a heartbeat task. All fires
/// run inline on the thread advancing the clock, so a run is a pure function
/// of the configuration and seed.
pub struct Cluster {
    config: ClusterConfig,
    scheduler: Arc<ManualScheduler>,
    shared: Arc<Shared>,
    fires: usize,
}

impl Cluster {
    pub fn new(config: ClusterConfig) -> Result<Self, SimulatorError> {
        config.validate()?;
        let scheduler = Arc::new(ManualScheduler::new());

        let shared = Arc::new_cyclic(|weak: &Weak<Shared>| {
            let nodes = (0..config.nodes)
                .map(|id| {
                    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
                    rng.set_stream(id as u64);

                    let election = RepeatedTimerTask::new(
                        TimerTaskConfig::new(format!("node-{id}/election"), config.election_timeout),
                        ElectionTimeout::new(
                            id,
                            weak.clone(),
                            UniformJitter::new(config.election_jitter),
                            rng,
                        ),
                        Arc::clone(&scheduler),
                        SyncDispatch::new(),
                    );
                    let heartbeat = RepeatedTimerTask::new(
                        TimerTaskConfig::new(format!("node-{id}/heartbeat"), config.heartbeat_interval),
                        Heartbeat::new(id, weak.clone()),
                        Arc::clone(&scheduler),
                        SyncDispatch::new(),
                    );

                    Node {
                        id,
                        state: Mutex::new(NodeState {
                            role: Role::Follower,
                            term: 0,
                        }),
                        election,
                        heartbeat,
                    }
                })
                .collect();

            Shared {
                nodes,
                stats: Mutex::new(ClusterStats::default()),
            }
        });

        info!(
            nodes = config.nodes,
            seed = config.seed,
            election_timeout = ?config.election_timeout,
            heartbeat_interval = ?config.heartbeat_interval,
            "Cluster created"
        );

        Ok(Self {
            config,
            scheduler,
            shared,
            fires: 0,
        })
    }

    /// Start every node's election countdown.
    pub fn start(&self) {
        for node in &self.shared.nodes {
            node.election.start();
        }
    }

    /// Advance virtual time by `duration`, crashing the leader at the
    /// configured interval.
    pub fn run_for(&mut self, duration: Duration) -> SimulationReport {
        let end = self.scheduler.elapsed() + duration;

        if let Some(every) = self.config.crash_every {
            let mut next_crash = self.scheduler.elapsed() + every;
            while next_crash <= end {
                self.fires += self.scheduler.advance_to(next_crash);
                self.shared.crash_leader();
                next_crash += every;
            }
        }
        self.fires += self.scheduler.advance_to(end);

        self.report()
    }

    pub fn report(&self) -> SimulationReport {
        SimulationReport {
            elapsed: self.scheduler.elapsed(),
            fires: self.fires,
            stats: self.stats(),
            leader: self.leader(),
            term: self.shared.max_term(),
            tasks: self.shared.describe(),
        }
    }

    pub fn leader(&self) -> Option<usize> {
        self.shared.leader()
    }

    pub fn role(&self, node: usize) -> Option<Role> {
        self.shared.nodes.get(node).map(|node| node.state.lock().role)
    }

    pub fn stats(&self) -> ClusterStats {
        *self.shared.stats.lock()
    }

    pub fn scheduler(&self) -> &ManualScheduler {
        &self.scheduler
    }

    /// Destroy every task and verify each was finalized exactly once and
    /// nothing is left armed.
    pub fn shutdown(self) -> Result<(), SimulatorError> {
        self.shared.destroy_all();

        for node in &self.shared.nodes {
            let counts = [
                (node.election.name(), node.election.action().finalize_count()),
                (node.heartbeat.name(), node.heartbeat.action().finalize_count()),
            ];
            for (task, count) in counts {
                if count != 1 {
                    return Err(SimulatorError::FinalizeCount {
                        task: task.to_string(),
                        count,
                    });
                }
            }
        }

        match self.scheduler.pending() {
            0 => {
                info!(tasks = self.shared.nodes.len() * 2, "All timer tasks finalized");
                Ok(())
            }
            leaked => Err(SimulatorError::LeakedTimers(leaked)),
        }
    }
}

impl Drop for Cluster {
    fn drop(&mut self) {
        self.shared.destroy_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    #[test]
    fn test_single_leader_holds_without_crashes() {
        let mut cluster = Cluster::new(ClusterConfig::new(5).with_seed(7)).unwrap();
        cluster.start();
        let report = cluster.run_for(Duration::from_secs(2));

        assert_eq!(report.stats.elections, 1);
        assert!(report.stats.heartbeats > 0);
        let leader = report.leader.unwrap();
        assert_eq!(cluster.role(leader), Some(Role::Leader));
        assert_eq!(
            (0..5).filter(|&n| cluster.role(n) == Some(Role::Leader)).count(),
            1
        );
        cluster.shutdown().unwrap();
    }

    #[test]
    fn test_crashes_trigger_reelection() {
        let config = ClusterConfig::new(3)
            .with_seed(11)
            .with_crash_every(ms(500));
        let mut cluster = Cluster::new(config).unwrap();
        cluster.start();
        let report = cluster.run_for(Duration::from_secs(2));

        assert_eq!(report.stats.crashes, 4);
        assert!(report.stats.elections >= 4, "{:?}", report.stats);
        assert!(report.term >= 4);
        cluster.shutdown().unwrap();
    }

    #[test]
    fn test_same_seed_same_run() {
        let run = |seed| {
            let config = ClusterConfig::new(4)
                .with_seed(seed)
                .with_crash_every(ms(300));
            let mut cluster = Cluster::new(config).unwrap();
            cluster.start();
            let report = cluster.run_for(Duration::from_secs(3));
            cluster.shutdown().unwrap();
            (report.stats, report.leader, report.term, report.tasks)
        };

        assert_eq!(run(42), run(42));
    }

    #[test]
    fn test_at_most_one_registration_per_task() {
        let config = ClusterConfig::new(5).with_crash_every(ms(250));
        let mut cluster = Cluster::new(config).unwrap();
        cluster.start();
        cluster.run_for(Duration::from_secs(2));

        // One election timer per node, one heartbeat for the leader.
        assert!(cluster.scheduler().pending() <= 6);
        cluster.shutdown().unwrap();
    }

    #[test]
    fn test_drop_without_shutdown_is_clean() {
        let mut cluster = Cluster::new(ClusterConfig::new(2)).unwrap();
        cluster.start();
        cluster.run_for(ms(400));
        drop(cluster);
    }
}
