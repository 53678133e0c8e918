use crate::cluster::ClusterStats;
use std::time::Duration;

/// Outcome of a simulation run.
#[derive(Debug, Clone)]
pub struct SimulationReport {
    /// Virtual time elapsed since the cluster was created.
    pub elapsed: Duration,
    /// Timer fires delivered by the virtual clock.
    pub fires: usize,
    pub stats: ClusterStats,
    pub leader: Option<usize>,
    /// Highest term seen by any node.
    pub term: u64,
    /// `(task name, describe line)` for every timer task.
    pub tasks: Vec<(String, String)>,
}

impl SimulationReport {
    /// Print a human-readable summary, optionally with one line per task.
    pub fn print_summary(&self, with_tasks: bool) {
        println!("\nCluster Simulation Report");
        println!("=========================\n");
        println!("  Virtual time:  {:?}", self.elapsed);
        println!("  Timer fires:   {}", self.fires);
        println!("  Elections:     {}", self.stats.elections);
        println!("  Heartbeats:    {}", self.stats.heartbeats);
        println!("  Crashes:       {}", self.stats.crashes);
        match self.leader {
            Some(leader) => println!("  Leader:        node-{leader} (term {})", self.term),
            None => println!("  Leader:        none (term {})", self.term),
        }

        if with_tasks {
            println!("\nTimer tasks:");
            for (name, description) in &self.tasks {
                println!("  {name:<20} {description}");
            }
        }
    }
}
